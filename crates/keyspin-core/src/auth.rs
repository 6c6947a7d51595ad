use axum::http::HeaderMap;
use bytes::Bytes;

use keyspin_common::GlobalConfig;

use crate::error::ProxyError;

pub const OPENAI_EXPECTED: &str =
    "'Authorization: Bearer <key>' header or 'api_key' in JSON body";
pub const ANTHROPIC_EXPECTED: &str = "the 'x-api-key' header";
pub const GEMINI_EXPECTED: &str = "the 'x-goog-api-key' header";
pub const GENERIC_EXPECTED: &str = "the 'X-Proxy-Key' header";

/// Validates inbound proxy credentials against the globally configured
/// set. Upstream keys never pass through here.
#[derive(Debug, Clone)]
pub struct ProxyAuth {
    keys: Vec<String>,
}

impl ProxyAuth {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    pub fn from_global(global: &GlobalConfig) -> Self {
        Self::new(global.proxy_keys().into_iter().map(String::from).collect())
    }

    fn matches(&self, candidate: &str) -> bool {
        self.keys.iter().any(|key| constant_time_eq(key, candidate))
    }

    /// Header-only schemes (Anthropic, Gemini, generic).
    pub fn check_header(
        &self,
        headers: &HeaderMap,
        header_name: &str,
        expected: &'static str,
    ) -> Result<(), ProxyError> {
        let presented = headers
            .get(header_name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !presented.is_empty() && self.matches(presented) {
            return Ok(());
        }
        Err(ProxyError::AuthFailed { expected })
    }

    /// OpenAI-compatible scheme: `Authorization: Bearer <k>` preferred,
    /// top-level `api_key` in the JSON body as fallback. The `api_key`
    /// field is stripped from the body whenever it is present so it can
    /// never leak upstream; the (possibly rewritten) body is returned.
    pub fn check_bearer_or_body(
        &self,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Bytes, ProxyError> {
        let mut authorized = false;

        if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            if let Some(token) = value.trim().strip_prefix("Bearer ") {
                authorized = self.matches(token.trim());
            }
        }

        let mut body = body;
        if !body.is_empty() {
            if let Ok(mut json) =
                serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&body)
            {
                if let Some(value) = json.remove("api_key") {
                    if !authorized {
                        if let Some(key) = value.as_str() {
                            authorized = self.matches(key);
                        }
                    }
                    if let Ok(rewritten) = serde_json::to_vec(&json) {
                        body = Bytes::from(rewritten);
                    }
                }
            }
        }

        if authorized {
            Ok(body)
        } else {
            Err(ProxyError::AuthFailed {
                expected: OPENAI_EXPECTED,
            })
        }
    }
}

/// Length leaks; contents don't.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
