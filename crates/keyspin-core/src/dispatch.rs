use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::warn;

use keyspin_protocol::{Converter, SseLine, SseScanner, StreamTranslator};

use crate::error::ProxyError;
use crate::forward::{filter_response_headers, Headers};
use crate::upstream::{UpstreamBody, UpstreamClient, UpstreamRequest, UpstreamResponse};

const CHANNEL_DEPTH: usize = 16;

/// Issues the outbound request and turns the upstream's answer into the
/// client response, driving the converter for bodies and SSE streams.
pub struct Dispatcher {
    client: Arc<dyn UpstreamClient>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn UpstreamClient>) -> Self {
        Self { client }
    }

    pub async fn forward(
        &self,
        target: UpstreamRequest,
        converter: Converter,
    ) -> Result<Response, ProxyError> {
        let response = self
            .client
            .send(target)
            .await
            .map_err(|e| ProxyError::UpstreamUnavailable(e.message))?;

        let status =
            StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

        match response {
            UpstreamResponse {
                body: UpstreamBody::Bytes(body),
                headers,
                ..
            } => Ok(json_response(status, &headers, body, &converter)),
            UpstreamResponse {
                body: UpstreamBody::Stream(rx),
                headers,
                ..
            } => Ok(sse_response(status, &headers, rx, converter)),
        }
    }
}

fn json_response(
    status: StatusCode,
    upstream_headers: &Headers,
    body: Bytes,
    converter: &Converter,
) -> Response {
    let mut headers = filter_response_headers(upstream_headers);
    let body = if converter.is_passthrough() {
        body
    } else {
        match converter.convert_response(&body) {
            Ok(converted) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Bytes::from(converted)
            }
            // Conversion failure falls back to the verbatim upstream
            // body with its original content type.
            Err(err) => {
                warn!(event = "response_convert_failed", error = %err);
                body
            }
        }
    };

    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    resp
}

fn sse_response(
    status: StatusCode,
    upstream_headers: &Headers,
    upstream_rx: mpsc::Receiver<Bytes>,
    converter: Converter,
) -> Response {
    let mut headers = filter_response_headers(upstream_headers);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

    let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_DEPTH);
    if converter.is_passthrough() {
        tokio::spawn(pipe_raw(upstream_rx, tx));
    } else {
        tokio::spawn(pipe_converted(upstream_rx, tx, converter));
    }

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    let mut resp = Response::new(Body::from_stream(stream));
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    resp
}

async fn pipe_raw(mut upstream: mpsc::Receiver<Bytes>, tx: mpsc::Sender<Bytes>) {
    while let Some(chunk) = upstream.recv().await {
        // A failed send means the client went away; stop reading so the
        // upstream connection is released.
        if tx.send(chunk).await.is_err() {
            break;
        }
    }
}

async fn pipe_converted(
    mut upstream: mpsc::Receiver<Bytes>,
    tx: mpsc::Sender<Bytes>,
    converter: Converter,
) {
    let mut scanner = SseScanner::new();
    let mut translator = StreamTranslator::new(&converter);

    while let Some(chunk) = upstream.recv().await {
        let lines = match scanner.push_bytes(&chunk) {
            Ok(lines) => lines,
            Err(err) => {
                warn!(event = "stream_aborted", error = %err);
                break;
            }
        };
        for line in lines {
            if !emit_line(&tx, &mut translator, line).await {
                return;
            }
        }
    }

    if let Some(line) = scanner.finish() {
        if !emit_line(&tx, &mut translator, line).await {
            return;
        }
    }
    for event in translator.finish() {
        if tx.send(frame(&event)).await.is_err() {
            break;
        }
    }
}

/// Returns `false` once the downstream receiver is gone.
async fn emit_line(
    tx: &mpsc::Sender<Bytes>,
    translator: &mut StreamTranslator<'_>,
    line: SseLine,
) -> bool {
    match line {
        SseLine::Blank => tx.send(Bytes::from_static(b"\n")).await.is_ok(),
        // The sentinel closes the stream in the target's own framing;
        // only OpenAI-family targets re-emit `[DONE]`.
        SseLine::Done => {
            for event in translator.finish() {
                if tx.send(frame(&event)).await.is_err() {
                    return false;
                }
            }
            true
        }
        SseLine::Data(payload) => match translator.on_payload(payload.as_bytes()) {
            Ok(events) => {
                for event in events {
                    if tx.send(frame(&event)).await.is_err() {
                        return false;
                    }
                }
                true
            }
            Err(err) => {
                warn!(event = "chunk_convert_failed", error = %err);
                tx.send(Bytes::from(format!("data: {payload}\n")))
                    .await
                    .is_ok()
            }
        },
        SseLine::Other(line) => tx.send(Bytes::from(format!("{line}\n"))).await.is_ok(),
    }
}

fn frame(event: &[u8]) -> Bytes {
    let mut framed = Vec::with_capacity(event.len() + 8);
    framed.extend_from_slice(b"data: ");
    framed.extend_from_slice(event);
    framed.extend_from_slice(b"\n\n");
    Bytes::from(framed)
}
