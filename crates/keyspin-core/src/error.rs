use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use keyspin_cache::CacheError;
use keyspin_protocol::CodecError;
use keyspin_storage::StoreError;

/// Everything the request pipeline can refuse a request for. Each kind
/// carries enough context for the client-facing `detail` message.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("slug must be non-empty and contain no '/' or whitespace")]
    BadSlug,

    #[error("{kind} service configuration with slug '{slug}' not found or inactive")]
    ConfigNotFound { kind: &'static str, slug: String },

    #[error("invalid proxy key. Provide it via {expected}")]
    AuthFailed { expected: &'static str },

    #[error("method not allowed. This path only accepts {required}, but received {received}")]
    MethodNotAllowed { required: String, received: String },

    #[error("no active API keys for this service")]
    NoActiveKeys,

    #[error("unsupported API format '{0}'")]
    UnsupportedFormat(String),

    #[error("failed to convert request format: {0}")]
    TranslateFailed(#[from] CodecError),

    #[error("failed to rotate API key")]
    CounterUnavailable(#[source] CacheError),

    #[error("service configuration store unavailable")]
    StoreUnavailable(#[source] StoreError),

    #[error("bad gateway: {0}")]
    UpstreamUnavailable(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadSlug
            | ProxyError::NoActiveKeys
            | ProxyError::UnsupportedFormat(_)
            | ProxyError::TranslateFailed(_) => StatusCode::BAD_REQUEST,
            ProxyError::ConfigNotFound { .. } => StatusCode::NOT_FOUND,
            ProxyError::AuthFailed { .. } => StatusCode::UNAUTHORIZED,
            ProxyError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::CounterUnavailable(_) | ProxyError::StoreUnavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let detail = match &self {
            // Don't leak transport detail to clients; logs carry it.
            ProxyError::UpstreamUnavailable(_) => "Bad Gateway".to_string(),
            other => other.to_string(),
        };
        (self.status(), Json(json!({ "detail": detail }))).into_response()
    }
}
