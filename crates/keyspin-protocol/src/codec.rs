use std::collections::HashMap;
use std::sync::OnceLock;

use crate::ir::{ChatRequest, ChatResponse, StreamChunk};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unknown format: {0}")]
    UnknownFormat(String),
    #[error("failed to decode {format} {kind}: {source}")]
    Decode {
        format: &'static str,
        kind: &'static str,
        source: serde_json::Error,
    },
    #[error("failed to encode {format} {kind}: {source}")]
    Encode {
        format: &'static str,
        kind: &'static str,
        source: serde_json::Error,
    },
}

impl CodecError {
    pub(crate) fn decode(format: &'static str, kind: &'static str, source: serde_json::Error) -> Self {
        Self::Decode {
            format,
            kind,
            source,
        }
    }

    pub(crate) fn encode(format: &'static str, kind: &'static str, source: serde_json::Error) -> Self {
        Self::Encode {
            format,
            kind,
            source,
        }
    }
}

/// One wire format's full contract: request, response and stream-chunk
/// codecs plus stream framing and path remapping.
pub trait FormatCodec: Send + Sync {
    fn name(&self) -> &'static str;

    fn parse_request(&self, body: &[u8]) -> Result<ChatRequest, CodecError>;
    fn build_request(&self, req: &ChatRequest) -> Result<Vec<u8>, CodecError>;

    fn parse_response(&self, body: &[u8]) -> Result<ChatResponse, CodecError>;
    fn build_response(&self, resp: &ChatResponse) -> Result<Vec<u8>, CodecError>;

    fn parse_stream_chunk(&self, chunk: &[u8]) -> Result<StreamChunk, CodecError>;
    /// `Ok(None)` means the chunk has no representation in this format
    /// and must not be emitted downstream.
    fn build_stream_chunk(&self, chunk: &StreamChunk) -> Result<Option<Vec<u8>>, CodecError>;

    /// Framing events emitted before the first converted chunk.
    fn start_stream_events(&self, model: &str, id: &str) -> Vec<Vec<u8>>;
    /// Framing events emitted after the upstream stream ends.
    fn end_stream_events(&self) -> Vec<Vec<u8>>;

    /// Remap a client-relative action path to this format's API path.
    fn api_path(&self, action: &str) -> String;
}

fn registry() -> &'static HashMap<&'static str, &'static dyn FormatCodec> {
    static REGISTRY: OnceLock<HashMap<&'static str, &'static dyn FormatCodec>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut table: HashMap<&'static str, &'static dyn FormatCodec> = HashMap::new();
        table.insert("openai", &crate::openai::OpenAiCodec);
        table.insert("anthropic", &crate::anthropic::AnthropicCodec);
        table.insert("gemini", &crate::gemini::GeminiCodec);
        table.insert("openai_responses", &crate::openai_responses::OpenAiResponsesCodec);
        table
    })
}

pub fn codec(name: &str) -> Result<&'static dyn FormatCodec, CodecError> {
    registry()
        .get(name)
        .copied()
        .ok_or_else(|| CodecError::UnknownFormat(name.to_string()))
}

pub fn format_names() -> Vec<&'static str> {
    let mut names: Vec<_> = registry().keys().copied().collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_all_four_formats() {
        for name in ["openai", "anthropic", "gemini", "openai_responses"] {
            let codec = codec(name).unwrap();
            assert_eq!(codec.name(), name);
        }
    }

    #[test]
    fn unknown_format_is_an_error() {
        assert!(matches!(
            codec("cohere"),
            Err(CodecError::UnknownFormat(_))
        ));
    }
}
