use crate::codec::{codec, CodecError, FormatCodec};

/// Fold the upstream `api_format` vocabulary onto the client-side
/// format names used by the codec registry.
pub fn normalize_format(format: &str) -> &str {
    match format {
        "openai_compatible" => "openai",
        "anthropic_native" => "anthropic",
        "gemini_native" => "gemini",
        other => other,
    }
}

pub fn needs_conversion(client_format: &str, api_format: &str) -> bool {
    if client_format.is_empty() || client_format == "none" {
        return false;
    }
    normalize_format(client_format) != normalize_format(api_format)
}

enum Inner {
    Passthrough,
    Pair {
        source: &'static dyn FormatCodec,
        target: &'static dyn FormatCodec,
    },
}

/// Translates request, response, and stream chunks from `source` to
/// `target` through the IR. Collapses to a byte-for-byte passthrough
/// when either side is `none`/empty or both normalise to the same name.
pub struct Converter {
    inner: Inner,
}

impl Converter {
    pub fn new(source: &str, target: &str) -> Result<Self, CodecError> {
        let src = normalize_format(source);
        let tgt = normalize_format(target);
        if src.is_empty() || src == "none" || tgt.is_empty() || tgt == "none" || src == tgt {
            return Ok(Self {
                inner: Inner::Passthrough,
            });
        }
        Ok(Self {
            inner: Inner::Pair {
                source: codec(src)?,
                target: codec(tgt)?,
            },
        })
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self.inner, Inner::Passthrough)
    }

    pub fn convert_request(&self, body: &[u8]) -> Result<Vec<u8>, CodecError> {
        match &self.inner {
            Inner::Passthrough => Ok(body.to_vec()),
            Inner::Pair { source, target } => {
                let ir = source.parse_request(body)?;
                target.build_request(&ir)
            }
        }
    }

    pub fn convert_response(&self, body: &[u8]) -> Result<Vec<u8>, CodecError> {
        match &self.inner {
            Inner::Passthrough => Ok(body.to_vec()),
            Inner::Pair { source, target } => {
                let ir = source.parse_response(body)?;
                target.build_response(&ir)
            }
        }
    }

    /// `Ok(None)` means the chunk must be skipped: either it carried
    /// nothing (empty delta, no stop reason, no framing flags) or the
    /// target format has no event for it.
    pub fn convert_stream_chunk(&self, payload: &[u8]) -> Result<Option<Vec<u8>>, CodecError> {
        match &self.inner {
            Inner::Passthrough => Ok(Some(payload.to_vec())),
            Inner::Pair { source, target } => {
                let chunk = source.parse_stream_chunk(payload)?;
                if chunk.is_empty() {
                    return Ok(None);
                }
                target.build_stream_chunk(&chunk)
            }
        }
    }

    /// Parse a source chunk without building, for callers that need the
    /// IR view (the stream translator peeks at id/model).
    pub fn parse_stream_chunk(
        &self,
        payload: &[u8],
    ) -> Result<Option<crate::ir::StreamChunk>, CodecError> {
        match &self.inner {
            Inner::Passthrough => Ok(None),
            Inner::Pair { source, .. } => source.parse_stream_chunk(payload).map(Some),
        }
    }

    pub fn build_stream_chunk(
        &self,
        chunk: &crate::ir::StreamChunk,
    ) -> Result<Option<Vec<u8>>, CodecError> {
        match &self.inner {
            Inner::Passthrough => Ok(None),
            Inner::Pair { target, .. } => target.build_stream_chunk(chunk),
        }
    }

    pub fn start_stream_events(&self, model: &str, id: &str) -> Vec<Vec<u8>> {
        match &self.inner {
            Inner::Passthrough => Vec::new(),
            Inner::Pair { target, .. } => target.start_stream_events(model, id),
        }
    }

    pub fn end_stream_events(&self) -> Vec<Vec<u8>> {
        match &self.inner {
            Inner::Passthrough => Vec::new(),
            Inner::Pair { target, .. } => target.end_stream_events(),
        }
    }

    pub fn api_path(&self, action: &str) -> String {
        match &self.inner {
            Inner::Passthrough => action.to_string(),
            Inner::Pair { target, .. } => target.api_path(action),
        }
    }
}

/// Per-connection streaming state on top of a [`Converter`]: emits the
/// target format's start framing exactly once before the first chunk and
/// its end framing exactly once when the upstream closes (or sends the
/// `[DONE]` sentinel).
pub struct StreamTranslator<'a> {
    converter: &'a Converter,
    started: bool,
    finished: bool,
    model: String,
    id: String,
}

impl<'a> StreamTranslator<'a> {
    pub fn new(converter: &'a Converter) -> Self {
        Self {
            converter,
            started: false,
            finished: false,
            model: String::new(),
            id: String::new(),
        }
    }

    /// Translate one upstream `data:` payload into zero or more target
    /// event payloads (framing not included).
    pub fn on_payload(&mut self, payload: &[u8]) -> Result<Vec<Vec<u8>>, CodecError> {
        let Some(chunk) = self.converter.parse_stream_chunk(payload)? else {
            return Ok(vec![payload.to_vec()]);
        };

        if self.model.is_empty() && !chunk.model.is_empty() {
            self.model = chunk.model.clone();
        }
        if self.id.is_empty() && !chunk.id.is_empty() {
            self.id = chunk.id.clone();
        }

        let mut events = Vec::new();
        if !self.started {
            self.started = true;
            events.extend(self.converter.start_stream_events(&self.model, &self.id));
        }

        if chunk.is_empty() {
            return Ok(events);
        }
        // The start framing already announced the first chunk; don't let
        // the target codec emit a second opening event for it.
        let mut chunk = chunk;
        chunk.is_first = false;
        if let Some(built) = self.converter.build_stream_chunk(&chunk)? {
            events.push(built);
        }
        Ok(events)
    }

    /// End framing, emitted at most once.
    pub fn finish(&mut self) -> Vec<Vec<u8>> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        if !self.started {
            // Nothing was ever emitted; don't close a stream we never opened.
            return Vec::new();
        }
        self.converter.end_stream_events()
    }
}
