use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use keyspin_common::{mask_key, ApiKey, KeyLocation, ServiceConfig};
use keyspin_core::AppState;
use keyspin_storage::{NewServiceConfig, ServiceConfigPatch, StoreError};

pub fn admin_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/app-config", get(app_config))
        .route("/proxy-configs", post(create_config).get(list_configs))
        .route(
            "/proxy-configs/{id}",
            get(get_config).put(update_config).delete(delete_config),
        )
        .route("/proxy-configs/{id}/keys", get(list_keys).post(create_key))
        .route("/keys/{key_id}", patch(update_key).delete(delete_key))
        .with_state(state)
}

/// Key values never leave the admin surface unmasked.
#[derive(Debug, Serialize)]
struct KeyView {
    id: i32,
    key_value: String,
    is_active: bool,
}

impl From<ApiKey> for KeyView {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            key_value: mask_key(&key.value),
            is_active: key.is_active,
        }
    }
}

#[derive(Debug, Serialize)]
struct ConfigView {
    id: i32,
    name: String,
    slug: String,
    kind: String,
    api_key_location: KeyLocation,
    api_key_name: Option<String>,
    is_active: bool,
    method: Option<String>,
    target_url: Option<String>,
    target_base_url: Option<String>,
    api_format: String,
    output_format: String,
    api_keys: Vec<KeyView>,
}

impl From<ServiceConfig> for ConfigView {
    fn from(config: ServiceConfig) -> Self {
        Self {
            id: config.id,
            name: config.name,
            slug: config.slug,
            kind: config.kind.as_str().to_string(),
            api_key_location: config.api_key_location,
            api_key_name: config.api_key_name,
            is_active: config.is_active,
            method: config.method,
            target_url: config.target_url,
            target_base_url: config.target_base_url,
            api_format: config.api_format,
            output_format: config.output_format,
            api_keys: config.keys.into_iter().map(KeyView::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NewKey {
    key_value: String,
    #[serde(default = "default_true")]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct KeyPatch {
    is_active: bool,
}

fn default_true() -> bool {
    true
}

fn store_error(err: StoreError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": err.to_string() })),
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": "not found" })),
    )
        .into_response()
}

async fn app_config(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let global = state.global.load();
    Json(json!({ "proxy_public_base_url": global.public_base_url }))
}

async fn create_config(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewServiceConfig>,
) -> Response {
    match state.store.create(body).await {
        Ok(config) => (StatusCode::CREATED, Json(ConfigView::from(config))).into_response(),
        Err(err) => store_error(err),
    }
}

async fn list_configs(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list().await {
        Ok(configs) => {
            let views: Vec<ConfigView> = configs.into_iter().map(ConfigView::from).collect();
            Json(views).into_response()
        }
        Err(err) => store_error(err),
    }
}

async fn get_config(State(state): State<Arc<AppState>>, Path(id): Path<i32>) -> Response {
    match state.store.get(id).await {
        Ok(Some(config)) => Json(ConfigView::from(config)).into_response(),
        Ok(None) => not_found(),
        Err(err) => store_error(err),
    }
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<ServiceConfigPatch>,
) -> Response {
    match state.store.update(id, body).await {
        Ok(Some(config)) => Json(ConfigView::from(config)).into_response(),
        Ok(None) => not_found(),
        Err(err) => store_error(err),
    }
}

async fn delete_config(State(state): State<Arc<AppState>>, Path(id): Path<i32>) -> Response {
    match state.store.delete(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(),
        Err(err) => store_error(err),
    }
}

async fn list_keys(State(state): State<Arc<AppState>>, Path(id): Path<i32>) -> Response {
    match state.store.list_keys(id).await {
        Ok(keys) => {
            let views: Vec<KeyView> = keys.into_iter().map(KeyView::from).collect();
            Json(views).into_response()
        }
        Err(err) => store_error(err),
    }
}

async fn create_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<NewKey>,
) -> Response {
    match state.store.add_key(id, &body.key_value, body.is_active).await {
        Ok(key) => (StatusCode::CREATED, Json(KeyView::from(key))).into_response(),
        Err(err) => store_error(err),
    }
}

async fn update_key(
    State(state): State<Arc<AppState>>,
    Path(key_id): Path<i32>,
    Json(body): Json<KeyPatch>,
) -> Response {
    match state.store.set_key_active(key_id, body.is_active).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(),
        Err(err) => store_error(err),
    }
}

async fn delete_key(State(state): State<Arc<AppState>>, Path(key_id): Path<i32>) -> Response {
    match state.store.delete_key(key_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(),
        Err(err) => store_error(err),
    }
}
