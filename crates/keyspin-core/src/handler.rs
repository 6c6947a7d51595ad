use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use keyspin_common::ServiceKind;
use keyspin_protocol::{normalize_format, Converter};

use crate::auth::{ANTHROPIC_EXPECTED, GEMINI_EXPECTED};
use crate::error::ProxyError;
use crate::forward::{append_query, assemble_llm_url, filter_request_headers, inject_key};
use crate::state::AppState;
use crate::upstream::UpstreamRequest;

/// Headers that may carry the inbound proxy credential; all of them are
/// stripped before forwarding regardless of which one authenticated.
pub(crate) const CREDENTIAL_HEADERS: &[&str] =
    &["authorization", "x-api-key", "x-goog-api-key", "x-proxy-key"];

pub(crate) fn validate_slug(slug: &str) -> Result<(), ProxyError> {
    if slug.is_empty() || slug.contains('/') || slug.chars().any(char::is_whitespace) {
        return Err(ProxyError::BadSlug);
    }
    Ok(())
}

pub(crate) fn parse_query(uri: &Uri) -> Vec<(String, String)> {
    uri.query()
        .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
        .unwrap_or_default()
}

/// The LLM pipeline: slug → config → auth → translate → rotate →
/// inject → dispatch.
pub async fn llm_handler(
    State(state): State<Arc<AppState>>,
    Path((slug, action)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id = Uuid::new_v4().to_string();
    match llm_pipeline(&state, &trace_id, &slug, action, method, uri, headers, body).await {
        Ok(response) => response,
        Err(err) => {
            warn!(
                event = "llm_request_rejected",
                trace_id = %trace_id,
                slug = %slug,
                error = %err,
            );
            err.into_response()
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn llm_pipeline(
    state: &AppState,
    trace_id: &str,
    slug: &str,
    action: String,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    validate_slug(slug)?;
    let action = action.trim_start_matches('/').to_string();

    let config = state
        .store
        .lookup(slug, ServiceKind::Llm)
        .await
        .map_err(ProxyError::StoreUnavailable)?
        .ok_or_else(|| ProxyError::ConfigNotFound {
            kind: "LLM",
            slug: slug.to_string(),
        })?;

    let api_format = normalize_format(&config.api_format).to_string();
    if !matches!(api_format.as_str(), "openai" | "anthropic" | "gemini") {
        return Err(ProxyError::UnsupportedFormat(config.api_format.clone()));
    }

    // The inbound credential lives where the *client's* protocol puts
    // it; when no translation is configured that is the upstream's
    // protocol too.
    let client_format = config.output_format.clone();
    let auth_format = if client_format.is_empty() || client_format == "none" {
        api_format.clone()
    } else {
        normalize_format(&client_format).to_string()
    };
    let body = match auth_format.as_str() {
        "anthropic" => {
            state
                .auth
                .check_header(&headers, "x-api-key", ANTHROPIC_EXPECTED)?;
            body
        }
        "gemini" => {
            state
                .auth
                .check_header(&headers, "x-goog-api-key", GEMINI_EXPECTED)?;
            body
        }
        _ => state.auth.check_bearer_or_body(&headers, body)?,
    };

    let request_converter = Converter::new(&client_format, &config.api_format)?;
    let original_body = body.clone();
    let (body, action) = if request_converter.is_passthrough() {
        (body, action)
    } else {
        info!(
            event = "request_converted",
            trace_id = %trace_id,
            from = %client_format,
            to = %config.api_format,
        );
        let converted = request_converter.convert_request(&body)?;
        (Bytes::from(converted), request_converter.api_path(&action))
    };

    let upstream_key = state.rotator.next_key(&config).await?;

    let mut out_headers = filter_request_headers(&headers, CREDENTIAL_HEADERS);
    let mut query = parse_query(&uri);
    inject_key(
        &config,
        &api_format,
        &mut out_headers,
        &mut query,
        &upstream_key,
    );

    let base_url = config.target_base_url.clone().unwrap_or_default();
    let url = assemble_llm_url(&base_url, &action, &[body.as_ref(), original_body.as_ref()]);
    info!(
        event = "upstream_dispatch",
        trace_id = %trace_id,
        slug = %slug,
        method = %method,
        url = %url,
    );
    let url = append_query(&url, &query);

    let response_converter = Converter::new(&config.api_format, &client_format)?;
    state
        .dispatcher
        .forward(
            UpstreamRequest {
                method: method.to_string(),
                url,
                headers: out_headers,
                body,
            },
            response_converter,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_validation_rejects_separators_and_whitespace() {
        assert!(validate_slug("demo").is_ok());
        assert!(validate_slug("demo-2_x").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("with space").is_err());
        assert!(validate_slug("with/slash").is_err());
        assert!(validate_slug("tab\there").is_err());
    }

    #[test]
    fn query_parsing_keeps_pair_order() {
        let uri: Uri = "/llm/demo/v1/x?a=1&b=two".parse().unwrap();
        assert_eq!(
            parse_query(&uri),
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two".to_string())
            ]
        );
    }
}
