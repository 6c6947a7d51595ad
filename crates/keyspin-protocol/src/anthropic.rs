use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::codec::{CodecError, FormatCodec};
use crate::ir::{ChatMessage, ChatRequest, ChatResponse, Role, StopReason, StreamChunk, Usage};

pub struct AnthropicCodec;

const FORMAT: &str = "anthropic";

/// Anthropic refuses requests without `max_tokens`; used when the IR
/// carries no limit.
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize, Deserialize)]
struct Request {
    model: String,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<Prompt>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RequestMessage {
    role: String,
    content: Prompt,
}

/// `system` and message `content` arrive either as a bare string or as
/// an array of typed blocks; only `text` blocks survive.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Prompt {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Prompt {
    fn into_text(self) -> String {
        match self {
            Prompt::Text(text) => text,
            Prompt::Blocks(blocks) => blocks
                .into_iter()
                .filter(|block| block.kind == "text")
                .map(|block| block.text)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Response {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    role: String,
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<WireUsage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<StreamMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_reason: Option<String>,
}

fn parse_stop_reason(reason: &str) -> StopReason {
    match reason {
        "max_tokens" => StopReason::Length,
        "stop_sequence" => StopReason::ContentFilter,
        _ => StopReason::Stop,
    }
}

fn stop_reason(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Stop => "end_turn",
        StopReason::Length => "max_tokens",
        StopReason::ContentFilter => "stop_sequence",
    }
}

impl FormatCodec for AnthropicCodec {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn parse_request(&self, body: &[u8]) -> Result<ChatRequest, CodecError> {
        let req: Request = serde_json::from_slice(body)
            .map_err(|e| CodecError::decode(FORMAT, "request", e))?;

        Ok(ChatRequest {
            model: req.model,
            system: req.system.map(Prompt::into_text).unwrap_or_default(),
            messages: req
                .messages
                .into_iter()
                .map(|msg| ChatMessage {
                    role: Role::from_wire(&msg.role),
                    content: msg.content.into_text(),
                })
                .collect(),
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream,
            stop: req.stop_sequences,
        })
    }

    fn build_request(&self, req: &ChatRequest) -> Result<Vec<u8>, CodecError> {
        let wire = Request {
            model: req.model.clone(),
            messages: req
                .messages
                .iter()
                .map(|msg| RequestMessage {
                    role: msg.role.as_str().to_string(),
                    content: Prompt::Text(msg.content.clone()),
                })
                .collect(),
            system: (!req.system.is_empty()).then(|| Prompt::Text(req.system.clone())),
            max_tokens: if req.max_tokens > 0 {
                req.max_tokens
            } else {
                DEFAULT_MAX_TOKENS
            },
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream,
            stop_sequences: req.stop.clone(),
        };

        serde_json::to_vec(&wire).map_err(|e| CodecError::encode(FORMAT, "request", e))
    }

    fn parse_response(&self, body: &[u8]) -> Result<ChatResponse, CodecError> {
        let resp: Response = serde_json::from_slice(body)
            .map_err(|e| CodecError::decode(FORMAT, "response", e))?;

        Ok(ChatResponse {
            id: resp.id,
            model: resp.model,
            role: Role::from_wire(&resp.role),
            content: resp
                .content
                .into_iter()
                .filter(|block| block.kind == "text")
                .map(|block| block.text)
                .collect(),
            stop_reason: resp.stop_reason.as_deref().map(parse_stop_reason),
            usage: resp.usage.map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            }),
        })
    }

    fn build_response(&self, resp: &ChatResponse) -> Result<Vec<u8>, CodecError> {
        let reason = resp.stop_reason.unwrap_or(StopReason::Stop);
        let usage = resp.usage.unwrap_or_default();
        let wire = Response {
            id: resp.id.clone(),
            kind: "message".to_string(),
            role: "assistant".to_string(),
            model: resp.model.clone(),
            stop_reason: Some(stop_reason(reason).to_string()),
            stop_sequence: None,
            content: vec![ContentBlock {
                kind: "text".to_string(),
                text: resp.content.clone(),
            }],
            usage: Some(WireUsage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            }),
        };

        serde_json::to_vec(&wire).map_err(|e| CodecError::encode(FORMAT, "response", e))
    }

    fn parse_stream_chunk(&self, chunk: &[u8]) -> Result<StreamChunk, CodecError> {
        let event: StreamEvent = serde_json::from_slice(chunk)
            .map_err(|e| CodecError::decode(FORMAT, "stream event", e))?;

        let mut out = StreamChunk::default();
        match event.kind.as_str() {
            "message_start" => {
                if let Some(message) = event.message {
                    out.id = message.id;
                    out.model = message.model;
                    if !message.role.is_empty() {
                        out.role = Some(Role::from_wire(&message.role));
                    }
                }
                out.is_first = true;
            }
            "content_block_delta" => {
                if let Some(delta) = event.delta {
                    out.delta = delta.text;
                }
            }
            "message_delta" => {
                if let Some(reason) = event.delta.and_then(|d| d.stop_reason) {
                    out.stop_reason = Some(parse_stop_reason(&reason));
                    out.is_last = true;
                }
            }
            "message_stop" => {
                out.is_last = true;
            }
            _ => {}
        }

        Ok(out)
    }

    fn build_stream_chunk(&self, chunk: &StreamChunk) -> Result<Option<Vec<u8>>, CodecError> {
        let event = if !chunk.delta.is_empty() {
            StreamEvent {
                kind: "content_block_delta".to_string(),
                index: Some(0),
                delta: Some(StreamDelta {
                    kind: "text_delta".to_string(),
                    text: chunk.delta.clone(),
                    stop_reason: None,
                }),
                ..Default::default()
            }
        } else if let Some(reason) = chunk.stop_reason {
            StreamEvent {
                kind: "message_delta".to_string(),
                delta: Some(StreamDelta {
                    stop_reason: Some(stop_reason(reason).to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }
        } else if chunk.is_first {
            StreamEvent {
                kind: "message_start".to_string(),
                message: Some(StreamMessage {
                    id: chunk.id.clone(),
                    kind: "message".to_string(),
                    role: "assistant".to_string(),
                    model: chunk.model.clone(),
                }),
                ..Default::default()
            }
        } else {
            return Ok(None);
        };

        serde_json::to_vec(&event)
            .map(Some)
            .map_err(|e| CodecError::encode(FORMAT, "stream event", e))
    }

    fn start_stream_events(&self, model: &str, id: &str) -> Vec<Vec<u8>> {
        let message_start = json!({
            "type": "message_start",
            "message": {
                "id": id,
                "type": "message",
                "role": "assistant",
                "model": model,
                "content": [],
            },
        });
        let content_block_start = json!({
            "type": "content_block_start",
            "index": 0,
            "content_block": {"type": "text", "text": ""},
        });
        vec![
            message_start.to_string().into_bytes(),
            content_block_start.to_string().into_bytes(),
        ]
    }

    fn end_stream_events(&self) -> Vec<Vec<u8>> {
        vec![
            json!({"type": "content_block_stop", "index": 0})
                .to_string()
                .into_bytes(),
            json!({"type": "message_stop"}).to_string().into_bytes(),
        ]
    }

    fn api_path(&self, action: &str) -> String {
        match action {
            "chat/completions" | "v1/chat/completions" => "v1/messages".to_string(),
            _ => action.to_string(),
        }
    }
}
