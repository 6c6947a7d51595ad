use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::codec::{CodecError, FormatCodec};
use crate::ir::{ChatMessage, ChatRequest, ChatResponse, Role, StopReason, StreamChunk, Usage};
use crate::unix_now;

/// Codec for the OpenAI Responses API (`v1/responses`).
pub struct OpenAiResponsesCodec;

const FORMAT: &str = "openai_responses";

#[derive(Debug, Serialize, Deserialize)]
struct Request {
    model: String,
    input: Input,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    instructions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

/// `input` is either a bare string (one user message) or a list of
/// message items.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Input {
    Text(String),
    Items(Vec<InputItem>),
}

#[derive(Debug, Serialize, Deserialize)]
struct InputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<InputContent>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum InputContent {
    Text(String),
    Parts(Vec<InputPart>),
}

#[derive(Debug, Serialize, Deserialize)]
struct InputPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl InputContent {
    fn into_text(self) -> String {
        match self {
            InputContent::Text(text) => text,
            InputContent::Parts(parts) => parts
                .into_iter()
                .filter(|part| part.kind == "input_text" || part.kind == "text")
                .map(|part| part.text)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Response {
    #[serde(default)]
    id: String,
    object: String,
    created_at: i64,
    #[serde(default)]
    model: String,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<WireUsage>,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    role: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    status: String,
    #[serde(default)]
    content: Vec<OutputPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OutputPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    delta: String,
    response: Option<StreamResponse>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    status: String,
}

fn status_to_stop(status: &str) -> StopReason {
    match status {
        "incomplete" => StopReason::Length,
        _ => StopReason::Stop,
    }
}

fn stop_to_status(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Stop => "completed",
        StopReason::Length | StopReason::ContentFilter => "incomplete",
    }
}

fn short_id(prefix: &str, len: usize) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &hex[..len])
}

impl FormatCodec for OpenAiResponsesCodec {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn parse_request(&self, body: &[u8]) -> Result<ChatRequest, CodecError> {
        let req: Request = serde_json::from_slice(body)
            .map_err(|e| CodecError::decode(FORMAT, "request", e))?;

        let mut out = ChatRequest {
            model: req.model,
            system: req.instructions,
            max_tokens: req.max_output_tokens.unwrap_or(0),
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream,
            ..Default::default()
        };

        match req.input {
            Input::Text(text) => out.messages.push(ChatMessage::user(text)),
            Input::Items(items) => {
                for item in items {
                    if item.kind != "message" {
                        continue;
                    }
                    let content = item.content.map(InputContent::into_text).unwrap_or_default();
                    if item.role == "system" {
                        out.system = content;
                    } else {
                        out.messages.push(ChatMessage {
                            role: Role::from_wire(&item.role),
                            content,
                        });
                    }
                }
            }
        }

        Ok(out)
    }

    fn build_request(&self, req: &ChatRequest) -> Result<Vec<u8>, CodecError> {
        let mut items: Vec<InputItem> = req
            .messages
            .iter()
            .map(|msg| InputItem {
                kind: "message".to_string(),
                role: msg.role.as_str().to_string(),
                content: Some(InputContent::Text(msg.content.clone())),
            })
            .collect();

        // A single message collapses to the bare-string form.
        let input = if items.len() == 1 {
            match items.remove(0).content {
                Some(content) => Input::Text(content.into_text()),
                None => Input::Text(String::new()),
            }
        } else {
            Input::Items(items)
        };

        let wire = Request {
            model: req.model.clone(),
            input,
            instructions: req.system.clone(),
            max_output_tokens: (req.max_tokens > 0).then_some(req.max_tokens),
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream,
        };

        serde_json::to_vec(&wire).map_err(|e| CodecError::encode(FORMAT, "request", e))
    }

    fn parse_response(&self, body: &[u8]) -> Result<ChatResponse, CodecError> {
        let resp: Response = serde_json::from_slice(body)
            .map_err(|e| CodecError::decode(FORMAT, "response", e))?;

        let content = resp
            .output
            .iter()
            .filter(|item| item.kind == "message" && item.role == "assistant")
            .flat_map(|item| item.content.iter())
            .filter(|part| part.kind == "output_text")
            .map(|part| part.text.as_str())
            .collect();

        Ok(ChatResponse {
            id: resp.id,
            model: resp.model,
            role: Role::Assistant,
            content,
            stop_reason: (!resp.status.is_empty()).then(|| status_to_stop(&resp.status)),
            usage: resp.usage.map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    fn build_response(&self, resp: &ChatResponse) -> Result<Vec<u8>, CodecError> {
        let wire = Response {
            id: resp.id.clone(),
            object: "response".to_string(),
            created_at: unix_now(),
            model: resp.model.clone(),
            status: stop_to_status(resp.stop_reason.unwrap_or(StopReason::Stop)).to_string(),
            output: vec![OutputItem {
                kind: "message".to_string(),
                id: short_id("msg_", 12),
                role: "assistant".to_string(),
                status: "completed".to_string(),
                content: vec![OutputPart {
                    kind: "output_text".to_string(),
                    text: resp.content.clone(),
                }],
            }],
            usage: resp.usage.map(|u| WireUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
                total_tokens: u.total_tokens,
            }),
        };

        serde_json::to_vec(&wire).map_err(|e| CodecError::encode(FORMAT, "response", e))
    }

    fn parse_stream_chunk(&self, chunk: &[u8]) -> Result<StreamChunk, CodecError> {
        let event: StreamEvent = serde_json::from_slice(chunk)
            .map_err(|e| CodecError::decode(FORMAT, "stream event", e))?;

        let mut out = StreamChunk::default();
        match event.kind.as_str() {
            "response.created" => {
                out.is_first = true;
                out.role = Some(Role::Assistant);
                if let Some(resp) = event.response {
                    out.id = resp.id;
                    out.model = resp.model;
                }
            }
            "response.output_text.delta" => {
                out.delta = event.delta;
            }
            "response.done" => {
                out.is_last = true;
                let status = event.response.map(|r| r.status).unwrap_or_default();
                out.stop_reason = Some(status_to_stop(&status));
            }
            // Structural and unknown events carry nothing.
            _ => {}
        }

        Ok(out)
    }

    fn build_stream_chunk(&self, chunk: &StreamChunk) -> Result<Option<Vec<u8>>, CodecError> {
        let event = if chunk.is_first {
            json!({
                "type": "response.created",
                "response": {
                    "id": chunk.id,
                    "object": "response",
                    "created_at": unix_now(),
                    "model": chunk.model,
                    "status": "in_progress",
                    "output": [],
                },
            })
        } else if let Some(reason) = chunk.stop_reason {
            json!({
                "type": "response.done",
                "response": {
                    "id": chunk.id,
                    "object": "response",
                    "created_at": unix_now(),
                    "model": chunk.model,
                    "status": stop_to_status(reason),
                    "output": [],
                },
            })
        } else if !chunk.delta.is_empty() {
            json!({
                "type": "response.output_text.delta",
                "item_id": short_id("item_", 8),
                "output_index": 0,
                "content_index": 0,
                "delta": chunk.delta,
            })
        } else {
            return Ok(None);
        };

        Ok(Some(event.to_string().into_bytes()))
    }

    fn start_stream_events(&self, model: &str, id: &str) -> Vec<Vec<u8>> {
        let id = if id.is_empty() {
            short_id("resp_", 12)
        } else {
            id.to_string()
        };
        let item_id = short_id("item_", 8);

        let created = json!({
            "type": "response.created",
            "response": {
                "id": id,
                "object": "response",
                "created_at": unix_now(),
                "model": model,
                "status": "in_progress",
                "output": [],
            },
        });
        let item_added = json!({
            "type": "response.output_item.added",
            "output_index": 0,
            "item": {
                "type": "message",
                "id": item_id,
                "role": "assistant",
                "status": "in_progress",
                "content": [],
            },
        });
        let part_added = json!({
            "type": "response.content_part.added",
            "item_id": item_id,
            "output_index": 0,
            "content_index": 0,
            "part": {"type": "output_text", "text": ""},
        });

        vec![
            created.to_string().into_bytes(),
            item_added.to_string().into_bytes(),
            part_added.to_string().into_bytes(),
        ]
    }

    fn end_stream_events(&self) -> Vec<Vec<u8>> {
        vec![json!({"type": "response.done"}).to_string().into_bytes()]
    }

    fn api_path(&self, action: &str) -> String {
        match action {
            "v1/responses" | "responses" => "v1/chat/completions".to_string(),
            _ => action.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_input_becomes_a_user_message() {
        let body = br#"{"model":"gpt-x","input":"hello"}"#;
        let req = OpenAiResponsesCodec.parse_request(body).unwrap();
        assert_eq!(req.messages, vec![ChatMessage::user("hello")]);
    }

    #[test]
    fn item_input_extracts_system_and_text_parts() {
        let body = br#"{"model":"gpt-x","input":[
            {"type":"message","role":"system","content":"S"},
            {"type":"message","role":"user","content":[{"type":"input_text","text":"a"},{"type":"text","text":"b"}]},
            {"type":"reasoning","role":"assistant","content":"dropped"}
        ],"max_output_tokens":7}"#;
        let req = OpenAiResponsesCodec.parse_request(body).unwrap();
        assert_eq!(req.system, "S");
        assert_eq!(req.messages, vec![ChatMessage::user("ab")]);
        assert_eq!(req.max_tokens, 7);
    }

    #[test]
    fn single_message_collapses_to_string_input() {
        let req = ChatRequest {
            model: "gpt-x".into(),
            messages: vec![ChatMessage::user("hi")],
            ..Default::default()
        };
        let body = OpenAiResponsesCodec.build_request(&req).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["input"], "hi");
    }

    #[test]
    fn response_concatenates_output_text() {
        let body = br#"{"id":"r1","object":"response","created_at":1,"model":"m","status":"completed","output":[
            {"type":"message","id":"m1","role":"assistant","content":[{"type":"output_text","text":"he"},{"type":"output_text","text":"llo"}]}
        ]}"#;
        let resp = OpenAiResponsesCodec.parse_response(body).unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(resp.stop_reason, Some(StopReason::Stop));
    }

    #[test]
    fn stream_prelude_has_three_events() {
        let events = OpenAiResponsesCodec.start_stream_events("m", "r1");
        assert_eq!(events.len(), 3);
        let kinds: Vec<String> = events
            .iter()
            .map(|e| {
                serde_json::from_slice::<serde_json::Value>(e).unwrap()["type"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "response.created",
                "response.output_item.added",
                "response.content_part.added"
            ]
        );
    }

    #[test]
    fn structural_stream_events_parse_to_empty_chunks() {
        let body = br#"{"type":"response.content_part.done","item_id":"i"}"#;
        let chunk = OpenAiResponsesCodec.parse_stream_chunk(body).unwrap();
        assert!(chunk.is_empty());
    }

    #[test]
    fn responses_action_remaps_to_chat_completions() {
        assert_eq!(
            OpenAiResponsesCodec.api_path("v1/responses"),
            "v1/chat/completions"
        );
    }
}
