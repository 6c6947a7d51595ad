//! Wire-format codecs for the four supported LLM chat protocols, the
//! format-agnostic intermediate representation they share, and the
//! converter that routes one format into another for requests,
//! responses, and SSE streams.

pub mod anthropic;
pub mod codec;
pub mod convert;
pub mod gemini;
pub mod ir;
pub mod openai;
pub mod openai_responses;
pub mod sse;

pub use codec::{codec, format_names, CodecError, FormatCodec};
pub use convert::{needs_conversion, normalize_format, Converter, StreamTranslator};
pub use ir::{ChatMessage, ChatRequest, ChatResponse, Role, StopReason, StreamChunk, Usage};
pub use sse::{SseLine, SseScanner};

pub(crate) fn unix_now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
