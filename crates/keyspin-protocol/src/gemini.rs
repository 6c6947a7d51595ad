use serde::{Deserialize, Serialize};

use crate::codec::{CodecError, FormatCodec};
use crate::ir::{ChatMessage, ChatRequest, ChatResponse, Role, StopReason, StreamChunk, Usage};

pub struct GeminiCodec;

const FORMAT: &str = "gemini";

/// Resolved late by the dispatcher against the request body's `model`.
pub const MODEL_PLACEHOLDER: &str = "{model}";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Request {
    contents: Vec<Content>,
    #[serde(
        rename = "generationConfig",
        skip_serializing_if = "Option::is_none"
    )]
    generation_config: Option<GenerationConfig>,
    #[serde(
        rename = "systemInstruction",
        skip_serializing_if = "Option::is_none"
    )]
    system_instruction: Option<Content>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GenerationConfig {
    #[serde(
        rename = "maxOutputTokens",
        default,
        skip_serializing_if = "is_zero"
    )]
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(
        rename = "stopSequences",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    stop_sequences: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Response {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", skip_serializing_if = "Option::is_none")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Candidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Content>,
    #[serde(
        rename = "finishReason",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    finish_reason: String,
    #[serde(default)]
    index: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u32,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        Role::User => "user",
    }
}

fn parse_finish_reason(reason: &str) -> StopReason {
    match reason {
        "MAX_TOKENS" => StopReason::Length,
        "SAFETY" => StopReason::ContentFilter,
        _ => StopReason::Stop,
    }
}

fn finish_reason(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Stop => "STOP",
        StopReason::Length => "MAX_TOKENS",
        StopReason::ContentFilter => "SAFETY",
    }
}

impl FormatCodec for GeminiCodec {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn parse_request(&self, body: &[u8]) -> Result<ChatRequest, CodecError> {
        let req: Request = serde_json::from_slice(body)
            .map_err(|e| CodecError::decode(FORMAT, "request", e))?;

        let mut out = ChatRequest::default();

        if let Some(instruction) = req.system_instruction {
            if let Some(part) = instruction.parts.into_iter().next() {
                out.system = part.text;
            }
        }

        for content in req.contents {
            out.messages.push(ChatMessage {
                role: Role::from_wire(&content.role),
                content: content.parts.into_iter().map(|p| p.text).collect(),
            });
        }

        if let Some(config) = req.generation_config {
            out.max_tokens = config.max_output_tokens;
            out.temperature = config.temperature;
            out.top_p = config.top_p;
            out.stop = config.stop_sequences;
        }

        Ok(out)
    }

    fn build_request(&self, req: &ChatRequest) -> Result<Vec<u8>, CodecError> {
        let wire = Request {
            contents: req
                .messages
                .iter()
                .map(|msg| Content {
                    role: wire_role(msg.role).to_string(),
                    parts: vec![Part {
                        text: msg.content.clone(),
                    }],
                })
                .collect(),
            system_instruction: (!req.system.is_empty()).then(|| Content {
                role: String::new(),
                parts: vec![Part {
                    text: req.system.clone(),
                }],
            }),
            generation_config: Some(GenerationConfig {
                max_output_tokens: req.max_tokens,
                temperature: req.temperature,
                top_p: req.top_p,
                stop_sequences: req.stop.clone(),
            }),
        };

        serde_json::to_vec(&wire).map_err(|e| CodecError::encode(FORMAT, "request", e))
    }

    fn parse_response(&self, body: &[u8]) -> Result<ChatResponse, CodecError> {
        let resp: Response = serde_json::from_slice(body)
            .map_err(|e| CodecError::decode(FORMAT, "response", e))?;

        let mut out = ChatResponse {
            id: String::new(),
            model: String::new(),
            role: Role::Assistant,
            content: String::new(),
            stop_reason: None,
            usage: None,
        };

        if let Some(candidate) = resp.candidates.into_iter().next() {
            if let Some(content) = candidate.content {
                out.content = content.parts.into_iter().map(|p| p.text).collect();
                out.role = Role::from_wire(&content.role);
            }
            if !candidate.finish_reason.is_empty() {
                out.stop_reason = Some(parse_finish_reason(&candidate.finish_reason));
            }
        }

        if let Some(usage) = resp.usage_metadata {
            out.usage = Some(Usage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
            });
        }

        Ok(out)
    }

    fn build_response(&self, resp: &ChatResponse) -> Result<Vec<u8>, CodecError> {
        let wire = Response {
            candidates: vec![Candidate {
                index: 0,
                finish_reason: finish_reason(resp.stop_reason.unwrap_or(StopReason::Stop))
                    .to_string(),
                content: Some(Content {
                    role: wire_role(resp.role).to_string(),
                    parts: vec![Part {
                        text: resp.content.clone(),
                    }],
                }),
            }],
            usage_metadata: resp.usage.map(|u| UsageMetadata {
                prompt_token_count: u.input_tokens,
                candidates_token_count: u.output_tokens,
                total_token_count: u.total_tokens,
            }),
        };

        serde_json::to_vec(&wire).map_err(|e| CodecError::encode(FORMAT, "response", e))
    }

    fn parse_stream_chunk(&self, chunk: &[u8]) -> Result<StreamChunk, CodecError> {
        let resp: Response = serde_json::from_slice(chunk)
            .map_err(|e| CodecError::decode(FORMAT, "stream chunk", e))?;

        let mut out = StreamChunk::default();
        if let Some(candidate) = resp.candidates.into_iter().next() {
            if let Some(content) = candidate.content {
                out.delta = content.parts.into_iter().map(|p| p.text).collect();
                out.role = Some(Role::from_wire(&content.role));
            }
            if !candidate.finish_reason.is_empty() {
                out.stop_reason = Some(parse_finish_reason(&candidate.finish_reason));
                out.is_last = true;
            }
        }

        Ok(out)
    }

    fn build_stream_chunk(&self, chunk: &StreamChunk) -> Result<Option<Vec<u8>>, CodecError> {
        let wire = Response {
            candidates: vec![Candidate {
                index: 0,
                finish_reason: chunk
                    .stop_reason
                    .map(|r| finish_reason(r).to_string())
                    .unwrap_or_default(),
                content: Some(Content {
                    role: "model".to_string(),
                    parts: vec![Part {
                        text: chunk.delta.clone(),
                    }],
                }),
            }],
            usage_metadata: None,
        };

        serde_json::to_vec(&wire)
            .map(Some)
            .map_err(|e| CodecError::encode(FORMAT, "stream chunk", e))
    }

    // Gemini streams have no start/end framing.
    fn start_stream_events(&self, _model: &str, _id: &str) -> Vec<Vec<u8>> {
        Vec::new()
    }

    fn end_stream_events(&self) -> Vec<Vec<u8>> {
        Vec::new()
    }

    fn api_path(&self, action: &str) -> String {
        match action {
            "chat/completions" | "v1/chat/completions" => {
                format!("v1beta/models/{MODEL_PLACEHOLDER}:generateContent")
            }
            _ => action.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_role_maps_to_assistant_and_back() {
        let body = br#"{"contents":[{"role":"user","parts":[{"text":"hi"}]},{"role":"model","parts":[{"text":"yo"}]}]}"#;
        let req = GeminiCodec.parse_request(body).unwrap();
        assert_eq!(req.messages[1].role, Role::Assistant);

        let built = GeminiCodec.build_request(&req).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&built).unwrap();
        assert_eq!(value["contents"][1]["role"], "model");
    }

    #[test]
    fn generation_config_carries_sampling_knobs() {
        let body = br#"{"contents":[],"generationConfig":{"maxOutputTokens":64,"temperature":0.5,"topP":0.9,"stopSequences":["x"]}}"#;
        let req = GeminiCodec.parse_request(body).unwrap();
        assert_eq!(req.max_tokens, 64);
        assert_eq!(req.temperature, Some(0.5));
        assert_eq!(req.stop, vec!["x".to_string()]);
    }

    #[test]
    fn finish_reasons_use_the_uppercase_vocabulary() {
        assert_eq!(parse_finish_reason("STOP"), StopReason::Stop);
        assert_eq!(parse_finish_reason("MAX_TOKENS"), StopReason::Length);
        assert_eq!(parse_finish_reason("SAFETY"), StopReason::ContentFilter);
        assert_eq!(finish_reason(StopReason::ContentFilter), "SAFETY");
    }

    #[test]
    fn chat_completions_path_gets_the_model_placeholder() {
        assert_eq!(
            GeminiCodec.api_path("chat/completions"),
            "v1beta/models/{model}:generateContent"
        );
        assert_eq!(
            GeminiCodec.api_path("v1beta/models/g:countTokens"),
            "v1beta/models/g:countTokens"
        );
    }

    #[test]
    fn stream_chunk_with_finish_reason_is_last() {
        let body = br#"{"candidates":[{"content":{"role":"model","parts":[{"text":"tail"}]},"finishReason":"STOP","index":0}]}"#;
        let chunk = GeminiCodec.parse_stream_chunk(body).unwrap();
        assert!(chunk.is_last);
        assert_eq!(chunk.delta, "tail");
        assert_eq!(chunk.stop_reason, Some(StopReason::Stop));
    }
}
