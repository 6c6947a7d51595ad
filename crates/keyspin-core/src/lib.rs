//! The per-request proxy pipeline: proxy auth, key rotation, credential
//! injection, upstream dispatch, and the two inbound pipelines (LLM and
//! generic) built from those pieces.

pub mod auth;
pub mod bootstrap;
pub mod dispatch;
pub mod error;
pub mod forward;
pub mod generic;
pub mod handler;
pub mod rotate;
pub mod state;
pub mod upstream;

pub use auth::ProxyAuth;
pub use dispatch::Dispatcher;
pub use error::ProxyError;
pub use generic::generic_handler;
pub use handler::llm_handler;
pub use rotate::KeyRotator;
pub use state::AppState;
pub use upstream::{
    UpstreamBody, UpstreamClient, UpstreamClientConfig, UpstreamError, UpstreamRequest,
    UpstreamResponse, WreqUpstreamClient,
};
