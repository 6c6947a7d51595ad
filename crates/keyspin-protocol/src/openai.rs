use serde::{Deserialize, Serialize};

use crate::codec::{CodecError, FormatCodec};
use crate::ir::{ChatMessage, ChatRequest, ChatResponse, Role, StopReason, StreamChunk, Usage};
use crate::unix_now;

pub struct OpenAiCodec;

const FORMAT: &str = "openai";

#[derive(Debug, Serialize, Deserialize)]
struct Request {
    model: String,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "is_false")]
    stream: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RequestMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Response {
    #[serde(default)]
    id: String,
    object: String,
    created: i64,
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<WireUsage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Choice {
    index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    object: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    delta: Option<ChunkDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChunkDelta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    role: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    content: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn parse_finish_reason(reason: &str) -> StopReason {
    match reason {
        "length" => StopReason::Length,
        "content_filter" => StopReason::ContentFilter,
        _ => StopReason::Stop,
    }
}

fn finish_reason(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Stop => "stop",
        StopReason::Length => "length",
        StopReason::ContentFilter => "content_filter",
    }
}

impl FormatCodec for OpenAiCodec {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn parse_request(&self, body: &[u8]) -> Result<ChatRequest, CodecError> {
        let req: Request = serde_json::from_slice(body)
            .map_err(|e| CodecError::decode(FORMAT, "request", e))?;

        let mut out = ChatRequest {
            model: req.model,
            stream: req.stream,
            stop: req.stop,
            temperature: req.temperature,
            top_p: req.top_p,
            max_tokens: req.max_tokens.unwrap_or(0),
            ..Default::default()
        };

        // A `system` role message anywhere in the list becomes the IR
        // system prompt instead of a conversation turn.
        for msg in req.messages {
            if msg.role == "system" {
                out.system = msg.content;
            } else {
                out.messages.push(ChatMessage {
                    role: Role::from_wire(&msg.role),
                    content: msg.content,
                });
            }
        }

        Ok(out)
    }

    fn build_request(&self, req: &ChatRequest) -> Result<Vec<u8>, CodecError> {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if !req.system.is_empty() {
            messages.push(RequestMessage {
                role: "system".to_string(),
                content: req.system.clone(),
            });
        }
        for msg in &req.messages {
            messages.push(RequestMessage {
                role: msg.role.as_str().to_string(),
                content: msg.content.clone(),
            });
        }

        let wire = Request {
            model: req.model.clone(),
            messages,
            max_tokens: (req.max_tokens > 0).then_some(req.max_tokens),
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream,
            stop: req.stop.clone(),
        };

        serde_json::to_vec(&wire).map_err(|e| CodecError::encode(FORMAT, "request", e))
    }

    fn parse_response(&self, body: &[u8]) -> Result<ChatResponse, CodecError> {
        let resp: Response = serde_json::from_slice(body)
            .map_err(|e| CodecError::decode(FORMAT, "response", e))?;

        let mut out = ChatResponse {
            id: resp.id,
            model: resp.model,
            role: Role::Assistant,
            content: String::new(),
            stop_reason: None,
            usage: None,
        };

        if let Some(choice) = resp.choices.into_iter().next() {
            if let Some(message) = choice.message {
                out.content = message.content;
                out.role = Role::from_wire(&message.role);
            }
            out.stop_reason = choice.finish_reason.as_deref().map(parse_finish_reason);
        }

        if let Some(usage) = resp.usage {
            out.usage = Some(Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            });
        }

        Ok(out)
    }

    fn build_response(&self, resp: &ChatResponse) -> Result<Vec<u8>, CodecError> {
        let reason = resp.stop_reason.unwrap_or(StopReason::Stop);
        let wire = Response {
            id: resp.id.clone(),
            object: "chat.completion".to_string(),
            created: unix_now(),
            model: resp.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: Some(Message {
                    role: resp.role.as_str().to_string(),
                    content: resp.content.clone(),
                }),
                finish_reason: Some(finish_reason(reason).to_string()),
            }],
            usage: resp.usage.map(|u| WireUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.total_tokens,
            }),
        };

        serde_json::to_vec(&wire).map_err(|e| CodecError::encode(FORMAT, "response", e))
    }

    fn parse_stream_chunk(&self, chunk: &[u8]) -> Result<StreamChunk, CodecError> {
        let wire: WireChunk = serde_json::from_slice(chunk)
            .map_err(|e| CodecError::decode(FORMAT, "stream chunk", e))?;

        let mut out = StreamChunk {
            id: wire.id,
            model: wire.model,
            ..Default::default()
        };

        if let Some(choice) = wire.choices.into_iter().next() {
            if let Some(delta) = choice.delta {
                out.delta = delta.content;
                if !delta.role.is_empty() {
                    out.role = Some(Role::from_wire(&delta.role));
                }
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                if !reason.is_empty() {
                    out.stop_reason = Some(parse_finish_reason(reason));
                    out.is_last = true;
                }
            }
        }

        Ok(out)
    }

    fn build_stream_chunk(&self, chunk: &StreamChunk) -> Result<Option<Vec<u8>>, CodecError> {
        let mut choice = ChunkChoice {
            index: 0,
            delta: Some(ChunkDelta {
                role: chunk.role.map(|r| r.as_str().to_string()).unwrap_or_default(),
                content: chunk.delta.clone(),
            }),
            finish_reason: None,
        };
        if let Some(reason) = chunk.stop_reason {
            choice.finish_reason = Some(finish_reason(reason).to_string());
            choice.delta = Some(ChunkDelta::default());
        }

        let wire = WireChunk {
            id: chunk.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: unix_now(),
            model: chunk.model.clone(),
            choices: vec![choice],
        };

        serde_json::to_vec(&wire)
            .map(Some)
            .map_err(|e| CodecError::encode(FORMAT, "stream chunk", e))
    }

    fn start_stream_events(&self, _model: &str, _id: &str) -> Vec<Vec<u8>> {
        Vec::new()
    }

    fn end_stream_events(&self) -> Vec<Vec<u8>> {
        // The SSE sentinel, framed by the dispatcher as `data: [DONE]`.
        vec![b"[DONE]".to_vec()]
    }

    fn api_path(&self, action: &str) -> String {
        match action {
            "v1/messages" | "messages" | "v1/chat/completions" => "chat/completions".to_string(),
            _ => action.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_is_lifted_out_of_the_turn_list() {
        let body = br#"{"model":"gpt-x","messages":[{"role":"system","content":"S"},{"role":"user","content":"hi"}]}"#;
        let req = OpenAiCodec.parse_request(body).unwrap();
        assert_eq!(req.system, "S");
        assert_eq!(req.messages, vec![ChatMessage::user("hi")]);
        assert_eq!(req.max_tokens, 0);
    }

    #[test]
    fn build_request_prepends_system() {
        let req = ChatRequest {
            model: "gpt-x".into(),
            system: "S".into(),
            messages: vec![ChatMessage::user("hello")],
            max_tokens: 100,
            ..Default::default()
        };
        let body = OpenAiCodec.build_request(&req).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][0]["content"], "S");
        assert_eq!(value["max_tokens"], 100);
    }

    #[test]
    fn finish_reason_maps_to_normalised_stop() {
        let body = br#"{"id":"x","object":"chat.completion","created":1,"model":"m","choices":[{"index":0,"message":{"role":"assistant","content":"hi"},"finish_reason":"length"}]}"#;
        let resp = OpenAiCodec.parse_response(body).unwrap();
        assert_eq!(resp.stop_reason, Some(StopReason::Length));
        assert_eq!(resp.content, "hi");
    }

    #[test]
    fn final_chunk_carries_stop_and_empty_delta() {
        let chunk = StreamChunk {
            id: "x".into(),
            stop_reason: Some(StopReason::Stop),
            ..Default::default()
        };
        let built = OpenAiCodec.build_stream_chunk(&chunk).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&built).unwrap();
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(value["object"], "chat.completion.chunk");
    }

    #[test]
    fn end_events_are_the_done_sentinel() {
        assert_eq!(OpenAiCodec.end_stream_events(), vec![b"[DONE]".to_vec()]);
    }

    #[test]
    fn anthropic_action_remaps_to_chat_completions() {
        assert_eq!(OpenAiCodec.api_path("v1/messages"), "chat/completions");
        assert_eq!(OpenAiCodec.api_path("v1/embeddings"), "v1/embeddings");
    }
}
