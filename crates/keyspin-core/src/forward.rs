use axum::http::header::{HeaderMap, HeaderName, HeaderValue};

use keyspin_common::{KeyLocation, ServiceConfig};

/// Headers that must not travel from the client to the upstream.
const REQUEST_HOP_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "te",
    "upgrade",
    "user-agent",
];

/// Headers that must not travel from the upstream back to the client.
/// `content-length` is dropped too: the body may be rewritten by the
/// converter, so the server recomputes it.
const RESPONSE_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

pub type Headers = Vec<(String, String)>;

pub fn filter_request_headers(headers: &HeaderMap, extra_drop: &[&str]) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.as_str().to_ascii_lowercase();
            if REQUEST_HOP_HEADERS.contains(&name.as_str()) {
                return None;
            }
            if extra_drop.iter().any(|drop| drop.eq_ignore_ascii_case(&name)) {
                return None;
            }
            let value = value.to_str().ok()?;
            Some((name, value.to_string()))
        })
        .collect()
}

pub fn filter_response_headers(headers: &Headers) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let lower = name.to_ascii_lowercase();
        if RESPONSE_HOP_HEADERS.contains(&lower.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(lower.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            out.insert(name, value);
        }
    }
    out
}

/// Default credential header per upstream wire format (normalised
/// names).
pub fn default_key_name(api_format: &str) -> &'static str {
    match api_format {
        "anthropic" => "x-api-key",
        "gemini" => "x-goog-api-key",
        _ => "Authorization",
    }
}

/// Place the rotated upstream credential into the outbound request per
/// the config's location and name. OpenAI-compatible header injection
/// gets the `Bearer ` prefix; Anthropic upstreams additionally get the
/// pinned `anthropic-version`.
pub fn inject_key(
    config: &ServiceConfig,
    api_format: &str,
    headers: &mut Headers,
    query: &mut Vec<(String, String)>,
    upstream_key: &str,
) {
    let key_name = config
        .api_key_name
        .as_deref()
        .unwrap_or_else(|| default_key_name(api_format));

    match config.api_key_location {
        KeyLocation::Header => {
            let value = if api_format == "openai" {
                format!("Bearer {upstream_key}")
            } else {
                upstream_key.to_string()
            };
            headers.push((key_name.to_ascii_lowercase(), value));
        }
        KeyLocation::Query => {
            query.push((key_name.to_string(), upstream_key.to_string()));
        }
    }

    if api_format == "anthropic" {
        headers.push(("anthropic-version".to_string(), "2023-06-01".to_string()));
    }
}

/// Credential injection for the generic pipeline: only when the config
/// names a key explicitly.
pub fn inject_generic_key(
    config: &ServiceConfig,
    headers: &mut Headers,
    query: &mut Vec<(String, String)>,
    upstream_key: &str,
) {
    let Some(key_name) = config.api_key_name.as_deref() else {
        return;
    };
    match config.api_key_location {
        KeyLocation::Header => {
            headers.push((key_name.to_ascii_lowercase(), upstream_key.to_string()));
        }
        KeyLocation::Query => {
            query.push((key_name.to_string(), upstream_key.to_string()));
        }
    }
}

/// Final upstream URL for the LLM pipeline.
///
/// Joins base and action with exactly one `/`, elides the duplicated
/// `v1/` segment for OpenAI-style bases, and substitutes the literal
/// `{model}` placeholder from the first body candidate whose top-level
/// `model` field resolves. Callers pass the converted body first and
/// the client's original second, since some target formats (Gemini)
/// carry the model in the path rather than the body. An unresolvable
/// placeholder is left alone for the upstream to reject.
pub fn assemble_llm_url(base_url: &str, action: &str, bodies: &[&[u8]]) -> String {
    let base = base_url.trim_end_matches('/');
    let mut action = action.trim_start_matches('/').to_string();

    if base.ends_with("/v1") && action.starts_with("v1/") {
        action = action.split_off(3);
    }

    if action.contains("{model}") {
        if let Some(model) = bodies.iter().find_map(|body| extract_model(body)) {
            action = action.replace("{model}", &model);
        }
    }

    format!("{base}/{action}")
}

fn extract_model(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value.get("model")?.as_str().map(str::to_string)
}

/// Final upstream URL for the generic pipeline: the configured target
/// with the request's path suffix appended, inserting a `/` when
/// neither side carries one.
pub fn assemble_generic_url(target_url: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return target_url.to_string();
    }
    if target_url.ends_with('/') || suffix.starts_with('/') {
        format!("{target_url}{suffix}")
    } else {
        format!("{target_url}/{suffix}")
    }
}

/// Append query pairs to a URL.
pub fn append_query(url: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let encoded = serde_urlencoded::to_string(query).unwrap_or_default();
    if encoded.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use keyspin_common::{ApiKey, ServiceKind};

    fn config(location: KeyLocation, name: Option<&str>) -> ServiceConfig {
        ServiceConfig {
            id: 1,
            name: "c".into(),
            slug: "c".into(),
            kind: ServiceKind::Llm,
            api_key_location: location,
            api_key_name: name.map(String::from),
            is_active: true,
            method: None,
            target_url: None,
            target_base_url: None,
            api_format: "openai_compatible".into(),
            output_format: "none".into(),
            keys: vec![ApiKey {
                id: 1,
                value: "k".into(),
                is_active: true,
            }],
        }
    }

    #[test]
    fn hop_by_hop_and_credential_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("proxy.local"));
        headers.insert("content-length", HeaderValue::from_static("42"));
        headers.insert("user-agent", HeaderValue::from_static("curl"));
        headers.insert("authorization", HeaderValue::from_static("Bearer g1"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let filtered = filter_request_headers(&headers, &["authorization"]);
        assert_eq!(filtered, vec![("accept".to_string(), "application/json".to_string())]);
    }

    #[test]
    fn openai_header_injection_gets_bearer_prefix() {
        let mut headers = Headers::new();
        let mut query = Vec::new();
        inject_key(&config(KeyLocation::Header, None), "openai", &mut headers, &mut query, "K1");
        assert_eq!(headers, vec![("authorization".to_string(), "Bearer K1".to_string())]);
        assert!(query.is_empty());
    }

    #[test]
    fn anthropic_injection_pins_the_api_version() {
        let mut headers = Headers::new();
        let mut query = Vec::new();
        inject_key(&config(KeyLocation::Header, None), "anthropic", &mut headers, &mut query, "K1");
        assert!(headers.contains(&("x-api-key".to_string(), "K1".to_string())));
        assert!(headers.contains(&("anthropic-version".to_string(), "2023-06-01".to_string())));
    }

    #[test]
    fn query_location_appends_the_named_parameter() {
        let mut headers = Headers::new();
        let mut query = Vec::new();
        inject_key(
            &config(KeyLocation::Query, Some("key")),
            "gemini",
            &mut headers,
            &mut query,
            "K1",
        );
        assert!(headers.is_empty());
        assert_eq!(query, vec![("key".to_string(), "K1".to_string())]);
    }

    #[test]
    fn v1_segment_is_not_duplicated() {
        assert_eq!(
            assemble_llm_url("https://api.openai.com/v1", "v1/chat/completions", &[b"{}"]),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            assemble_llm_url("https://api.openai.com/", "v1/chat/completions", &[b"{}"]),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn model_placeholder_resolves_from_the_body() {
        let url = assemble_llm_url(
            "https://generativelanguage.googleapis.com",
            "v1beta/models/{model}:generateContent",
            &[br#"{"model":"gemini-1.5-flash"}"#],
        );
        assert!(url.ends_with("/v1beta/models/gemini-1.5-flash:generateContent"));
    }

    #[test]
    fn model_placeholder_falls_back_to_the_next_candidate() {
        let url = assemble_llm_url(
            "https://g",
            "v1beta/models/{model}:generateContent",
            &[br#"{"contents":[]}"#, br#"{"model":"gemini-pro"}"#],
        );
        assert!(url.ends_with("/v1beta/models/gemini-pro:generateContent"));
    }

    #[test]
    fn unresolvable_placeholder_is_left_for_the_upstream() {
        let url = assemble_llm_url(
            "https://g",
            "v1beta/models/{model}:generateContent",
            &[b"{}"],
        );
        assert!(url.contains("{model}"));
    }

    #[test]
    fn generic_suffix_join_inserts_one_slash() {
        assert_eq!(assemble_generic_url("https://t/api", "x/y"), "https://t/api/x/y");
        assert_eq!(assemble_generic_url("https://t/api/", "x"), "https://t/api/x");
        assert_eq!(assemble_generic_url("https://t/api", ""), "https://t/api");
    }

    #[test]
    fn query_appends_with_the_right_separator() {
        assert_eq!(
            append_query("https://u/p", &[("a".into(), "1".into())]),
            "https://u/p?a=1"
        );
        assert_eq!(
            append_query("https://u/p?x=0", &[("a".into(), "1".into())]),
            "https://u/p?x=0&a=1"
        );
    }
}
