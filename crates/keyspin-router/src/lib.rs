//! HTTP wiring: the two proxy pipelines and the admin CRUD surface.

use std::sync::Arc;

use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::json;

use keyspin_core::{generic_handler, llm_handler, AppState};

mod admin;

pub use admin::admin_router;

pub fn proxy_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/llm/{slug}/{*action}", any(llm_handler))
        .route("/proxy/{*slug}", any(generic_handler))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to keyspin" }))
}
