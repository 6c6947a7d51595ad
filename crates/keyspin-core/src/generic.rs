use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use keyspin_common::ServiceKind;
use keyspin_protocol::Converter;

use crate::auth::GENERIC_EXPECTED;
use crate::error::ProxyError;
use crate::forward::{
    append_query, assemble_generic_url, filter_request_headers, inject_generic_key,
};
use crate::handler::{parse_query, validate_slug, CREDENTIAL_HEADERS};
use crate::state::AppState;
use crate::upstream::UpstreamRequest;

/// The generic pipeline: method-locked passthrough with key rotation
/// but no body translation.
pub async fn generic_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id = Uuid::new_v4().to_string();
    match generic_pipeline(&state, &trace_id, &path, method, uri, headers, body).await {
        Ok(response) => response,
        Err(err) => {
            warn!(
                event = "generic_request_rejected",
                trace_id = %trace_id,
                path = %path,
                error = %err,
            );
            err.into_response()
        }
    }
}

async fn generic_pipeline(
    state: &AppState,
    trace_id: &str,
    path: &str,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    // First segment selects the config, the rest rides along to the
    // target URL.
    let path = path.trim_start_matches('/');
    let (slug, suffix) = match path.split_once('/') {
        Some((slug, suffix)) => (slug, suffix),
        None => (path, ""),
    };
    validate_slug(slug)?;

    state
        .auth
        .check_header(&headers, "x-proxy-key", GENERIC_EXPECTED)?;

    let config = state
        .store
        .lookup(slug, ServiceKind::Generic)
        .await
        .map_err(ProxyError::StoreUnavailable)?
        .ok_or_else(|| ProxyError::ConfigNotFound {
            kind: "generic",
            slug: slug.to_string(),
        })?;

    let required = config.method.clone().unwrap_or_default();
    if required.is_empty() || !method.as_str().eq_ignore_ascii_case(&required) {
        return Err(ProxyError::MethodNotAllowed {
            required: required.to_ascii_uppercase(),
            received: method.to_string(),
        });
    }

    let upstream_key = state.rotator.next_key(&config).await?;

    let mut out_headers = filter_request_headers(&headers, CREDENTIAL_HEADERS);
    let mut query = parse_query(&uri);
    inject_generic_key(&config, &mut out_headers, &mut query, &upstream_key);

    let target_url = config.target_url.clone().unwrap_or_default();
    let url = assemble_generic_url(&target_url, suffix);
    info!(
        event = "upstream_dispatch",
        trace_id = %trace_id,
        slug = %slug,
        method = %method,
        url = %url,
    );
    let url = append_query(&url, &query);

    let passthrough = Converter::new("none", "none")?;
    state
        .dispatcher
        .forward(
            UpstreamRequest {
                method: method.to_string(),
                url,
                headers: out_headers,
                body,
            },
            passthrough,
        )
        .await
}
