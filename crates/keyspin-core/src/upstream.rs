use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use keyspin_common::GlobalConfig;

use crate::forward::Headers;

#[derive(Debug, thiserror::Error)]
#[error("upstream transport error: {message}")]
pub struct UpstreamError {
    pub message: String,
}

#[derive(Debug)]
pub struct UpstreamRequest {
    pub method: String,
    /// Full URL, query string included.
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
}

/// Body handle chosen by the client from the upstream `Content-Type`:
/// SSE responses arrive as a channel fed by a pump task, everything
/// else fully buffered.
pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(mpsc::Receiver<Bytes>),
}

pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> &str {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
            .unwrap_or_default()
    }
}

/// Object-safe upstream HTTP capability so the dispatcher can be driven
/// by a scripted fake in tests.
pub trait UpstreamClient: Send + Sync {
    fn send<'a>(
        &'a self,
        req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamError>> + Send + 'a>>;
}

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub stream_idle_timeout: Duration,
}

impl UpstreamClientConfig {
    pub fn from_global(global: &GlobalConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(global.proxy_timeout_secs),
            ..Self::default()
        }
    }
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(300),
            stream_idle_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct WreqUpstreamClient {
    client: wreq::Client,
    stream_idle_timeout: Duration,
}

impl WreqUpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        let client = wreq::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .read_timeout(config.stream_idle_timeout)
            .build()?;
        Ok(Self {
            client,
            stream_idle_timeout: config.stream_idle_timeout,
        })
    }
}

fn to_wreq_method(method: &str) -> wreq::Method {
    match method {
        "GET" => wreq::Method::GET,
        "PUT" => wreq::Method::PUT,
        "PATCH" => wreq::Method::PATCH,
        "DELETE" => wreq::Method::DELETE,
        "HEAD" => wreq::Method::HEAD,
        "OPTIONS" => wreq::Method::OPTIONS,
        _ => wreq::Method::POST,
    }
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(
        &'a self,
        req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self.client.request(to_wreq_method(&req.method), &req.url);
            for (name, value) in &req.headers {
                builder = builder.header(name, value);
            }
            if !req.body.is_empty() {
                builder = builder.body(req.body);
            }

            let resp = builder.send().await.map_err(|e| UpstreamError {
                message: e.to_string(),
            })?;

            let status = resp.status().as_u16();
            let headers: Headers = resp
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();

            let is_sse = headers
                .iter()
                .any(|(name, value)| {
                    name.eq_ignore_ascii_case("content-type")
                        && value.contains("text/event-stream")
                });

            if !is_sse {
                let body = resp.bytes().await.map_err(|e| UpstreamError {
                    message: e.to_string(),
                })?;
                return Ok(UpstreamResponse {
                    status,
                    headers,
                    body: UpstreamBody::Bytes(body),
                });
            }

            // Pump the SSE body through a channel; an idle upstream or
            // a gone receiver both end the task.
            let idle = self.stream_idle_timeout;
            let (tx, rx) = mpsc::channel::<Bytes>(16);
            tokio::spawn(async move {
                let mut stream = resp.bytes_stream();
                loop {
                    let next = match tokio::time::timeout(idle, stream.next()).await {
                        Ok(next) => next,
                        Err(_) => break,
                    };
                    let Some(item) = next else { break };
                    let Ok(chunk) = item else { break };
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
            });

            Ok(UpstreamResponse {
                status,
                headers,
                body: UpstreamBody::Stream(rx),
            })
        })
    }
}
