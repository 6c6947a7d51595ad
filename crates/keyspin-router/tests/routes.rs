use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use keyspin_cache::MemoryCache;
use keyspin_common::GlobalConfig;
use keyspin_core::{
    AppState, UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse,
};
use keyspin_router::{admin_router, proxy_router};
use keyspin_storage::SeaOrmConfigStore;

/// Routing-level tests never reach the upstream.
struct UnreachableUpstream;

impl UpstreamClient for UnreachableUpstream {
    fn send<'a>(
        &'a self,
        _req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamError>> + Send + 'a>> {
        Box::pin(async {
            panic!("route tests must not dispatch upstream");
        })
    }
}

async fn test_state() -> Arc<AppState> {
    let db = keyspin_storage::connect("sqlite::memory:").await.unwrap();
    keyspin_storage::sync_schema(&db).await.unwrap();
    let global = GlobalConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        global_proxy_keys: "G1".to_string(),
        public_base_url: "http://proxy.example.com".to_string(),
        dsn: "sqlite::memory:".to_string(),
        redis_url: None,
        proxy_timeout_secs: 30,
    };
    Arc::new(AppState::new(
        global,
        Arc::new(SeaOrmConfigStore::new(db)),
        Arc::new(MemoryCache::new()),
        Arc::new(UnreachableUpstream),
    ))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn encoded_whitespace_in_the_slug_is_a_bad_request() {
    let app = proxy_router(test_state().await);
    let response = app
        .oneshot(
            Request::get("/llm/with%20space/anything")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let value = body_json(response).await;
    assert!(value["detail"].as_str().unwrap().contains("slug"));
}

#[tokio::test]
async fn root_route_greets() {
    let app = proxy_router(test_state().await);
    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_app_config_echoes_the_public_base_url() {
    let app = admin_router(test_state().await);
    let response = app
        .oneshot(Request::get("/app-config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value = body_json(response).await;
    assert_eq!(value["proxy_public_base_url"], "http://proxy.example.com");
}

#[tokio::test]
async fn admin_crud_round_trip_masks_key_values() {
    let app = admin_router(test_state().await);

    let create = Request::post("/proxy-configs")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"name":"demo","slug":"demo","kind":"LLM","target_base_url":"https://u","api_format":"openai_compatible"}"#,
        ))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    // Kind is normalised on write.
    assert_eq!(created["kind"], "llm");
    let id = created["id"].as_i64().unwrap();

    let add_key = Request::post(format!("/proxy-configs/{id}/keys"))
        .header("content-type", "application/json")
        .body(Body::from(r#"{"key_value":"sk-abcdef123456789xyz"}"#))
        .unwrap();
    let response = app.clone().oneshot(add_key).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let key = body_json(response).await;
    assert_eq!(key["key_value"], "sk-abc*****xyz");

    let list = Request::get(format!("/proxy-configs/{id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(list).await.unwrap();
    let config = body_json(response).await;
    assert_eq!(config["api_keys"][0]["key_value"], "sk-abc*****xyz");

    let destroy = Request::delete(format!("/proxy-configs/{id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(destroy).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let gone = Request::get(format!("/proxy-configs/{id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(gone).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
