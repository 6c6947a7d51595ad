use serde::{Deserialize, Serialize};

/// Normalised stop-reason vocabulary shared by every codec.
///
/// Each codec maps its own wire values onto this set when parsing and
/// back when building; unknown upstream values collapse to `Stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    Length,
    ContentFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Wire roles other than `assistant`/`model` are treated as user turns.
    pub fn from_wire(role: &str) -> Self {
        match role {
            "assistant" | "model" => Role::Assistant,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Format-agnostic chat request.
///
/// `system` is the concatenated system prompt (empty when absent) and
/// `max_tokens == 0` means the client did not set a limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    #[serde(default)]
    pub system: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub stop: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// Format-agnostic chat response; `content` is the concatenation of all
/// text blocks the upstream produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub model: String,
    pub role: Role,
    pub content: String,
    pub stop_reason: Option<StopReason>,
    pub usage: Option<Usage>,
}

/// One normalised streaming increment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub role: Option<Role>,
    #[serde(default)]
    pub delta: String,
    pub stop_reason: Option<StopReason>,
    #[serde(skip)]
    pub is_first: bool,
    #[serde(skip)]
    pub is_last: bool,
}

impl StreamChunk {
    /// A chunk that carries neither text nor framing information; the
    /// converter drops these instead of emitting empty events.
    pub fn is_empty(&self) -> bool {
        self.delta.is_empty() && self.stop_reason.is_none() && !self.is_first && !self.is_last
    }
}
