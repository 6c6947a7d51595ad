use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

use keyspin_common::GlobalConfig;
use keyspin_core::{
    AppState, UpstreamBody, UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse,
};
use keyspin_storage::{ConfigStore, NewServiceConfig, SeaOrmConfigStore};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_count(&self, name: &str) -> usize {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .count()
    }
}

/// Scripted upstream: pops one prepared response per call and records
/// what the dispatcher sent.
pub struct MockUpstream {
    pub requests: Mutex<Vec<RecordedRequest>>,
    responses: Mutex<Vec<UpstreamResponse>>,
}

impl MockUpstream {
    pub fn new(responses: Vec<UpstreamResponse>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(responses),
        })
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl UpstreamClient for MockUpstream {
    fn send<'a>(
        &'a self,
        req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamError>> + Send + 'a>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(RecordedRequest {
                method: req.method,
                url: req.url,
                headers: req.headers,
                body: req.body,
            });
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(UpstreamError {
                    message: "mock upstream has no scripted response".to_string(),
                });
            }
            Ok(responses.remove(0))
        })
    }
}

pub fn json_upstream_response(status: u16, body: &str) -> UpstreamResponse {
    UpstreamResponse {
        status,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: UpstreamBody::Bytes(Bytes::from(body.to_string())),
    }
}

pub fn sse_upstream_response(frames: &str) -> UpstreamResponse {
    let (tx, rx) = mpsc::channel(16);
    let payload = Bytes::from(frames.to_string());
    tokio::spawn(async move {
        let _ = tx.send(payload).await;
    });
    UpstreamResponse {
        status: 200,
        headers: vec![(
            "content-type".to_string(),
            "text/event-stream".to_string(),
        )],
        body: UpstreamBody::Stream(rx),
    }
}

pub fn global_config() -> GlobalConfig {
    GlobalConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        global_proxy_keys: "G1, G2".to_string(),
        public_base_url: "http://localhost:8000".to_string(),
        dsn: "sqlite::memory:".to_string(),
        redis_url: None,
        proxy_timeout_secs: 30,
    }
}

pub struct ConfigSpec {
    pub slug: &'static str,
    pub kind: &'static str,
    pub method: Option<&'static str>,
    pub target_url: Option<&'static str>,
    pub target_base_url: Option<&'static str>,
    pub api_format: Option<&'static str>,
    pub output_format: Option<&'static str>,
    pub api_key_location: Option<&'static str>,
    pub api_key_name: Option<&'static str>,
    pub keys: Vec<(&'static str, bool)>,
}

impl Default for ConfigSpec {
    fn default() -> Self {
        Self {
            slug: "demo",
            kind: "llm",
            method: None,
            target_url: None,
            target_base_url: Some("https://upstream.example.com"),
            api_format: Some("openai_compatible"),
            output_format: None,
            api_key_location: None,
            api_key_name: None,
            keys: vec![("K1", true)],
        }
    }
}

pub async fn state_with(
    specs: Vec<ConfigSpec>,
    upstream: Arc<MockUpstream>,
) -> Arc<AppState> {
    let db = keyspin_storage::connect("sqlite::memory:").await.unwrap();
    keyspin_storage::sync_schema(&db).await.unwrap();
    let store = SeaOrmConfigStore::new(db);

    for spec in specs {
        let config = store
            .create(NewServiceConfig {
                name: format!("cfg-{}", spec.slug),
                slug: spec.slug.to_string(),
                kind: spec.kind.to_string(),
                api_key_location: spec.api_key_location.map(String::from),
                api_key_name: spec.api_key_name.map(String::from),
                is_active: true,
                method: spec.method.map(String::from),
                target_url: spec.target_url.map(String::from),
                target_base_url: spec.target_base_url.map(String::from),
                api_format: spec.api_format.map(String::from),
                output_format: spec.output_format.map(String::from),
            })
            .await
            .unwrap();
        for (value, is_active) in spec.keys {
            store.add_key(config.id, value, is_active).await.unwrap();
        }
    }

    Arc::new(AppState::new(
        global_config(),
        Arc::new(store),
        Arc::new(keyspin_cache::MemoryCache::new()),
        upstream,
    ))
}

pub async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).to_string()
}
