use axum::{extract::State, Json};
use serde_json::{json, Value};
use server_core::RouterState;
use services::{AppService, Jwks};
use std::sync::Arc;

pub async fn ping_handler() -> Json<Value> {
  Json(json!({"message": "pong"}))
}

/// Publishes this process's Ed25519 public key. The gateway serves the same
/// document for its own key pair.
pub async fn jwks_handler(State(state): State<Arc<dyn RouterState>>) -> Json<Jwks> {
  Json(state.app_service().key_service().jwks())
}
