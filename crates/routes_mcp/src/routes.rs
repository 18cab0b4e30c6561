use crate::{handle_message, JsonRpcError, JsonRpcResponse};
use axum::{
  body::Body,
  extract::{Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
  Extension, Router,
};
use futures::{Stream, StreamExt};
use objs::UserContext;
use serde::Deserialize;
use serde_json::Value;
use server_core::{sse_event, RawSse, RouterState, SessionManager};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_stream::wrappers::ReceiverStream;

pub const MCP_ENDPOINT: &str = "/v1/mcp";

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
  #[serde(rename = "sessionId")]
  pub session_id: Option<String>,
}

/// The MCP transport surface: one endpoint, two modes.
pub fn mcp_router(state: Arc<dyn RouterState>) -> Router {
  Router::new()
    .route(MCP_ENDPOINT, post(handle_post).get(handle_sse))
    .with_state(state)
}

/// Same routes without state applied, for composition in the server binary.
pub fn mcp_routes() -> Router<Arc<dyn RouterState>> {
  Router::new().route(MCP_ENDPOINT, post(handle_post).get(handle_sse))
}

async fn handle_post(
  State(state): State<Arc<dyn RouterState>>,
  Query(query): Query<SessionQuery>,
  Extension(ctx): Extension<UserContext>,
  body: String,
) -> Response {
  match query.session_id {
    None => inline_response(&state, &ctx, &body).await,
    Some(session_id) => session_response(&state, &ctx, session_id, body).await,
  }
}

async fn inline_response(
  state: &Arc<dyn RouterState>,
  ctx: &UserContext,
  body: &str,
) -> Response {
  match handle_message(state, ctx, body).await {
    Some(response) => json_response(StatusCode::OK, &response),
    // notifications have no payload to return
    None => StatusCode::ACCEPTED.into_response(),
  }
}

async fn session_response(
  state: &Arc<dyn RouterState>,
  ctx: &UserContext,
  session_id: String,
  body: String,
) -> Response {
  let session_manager = state.session_manager();
  if !session_manager.has_session(&session_id) {
    return StatusCode::NOT_FOUND.into_response();
  }

  let state = Arc::clone(state);
  let ctx = ctx.clone();
  tokio::spawn(async move {
    if let Some(response) = handle_message(&state, &ctx, &body).await {
      let payload = serde_json::to_string(&response)
        .unwrap_or_else(|_| fallback_internal_error(&response.id));
      if let Err(err) = state.session_manager().send_message(&session_id, &payload) {
        tracing::debug!(session_id = %session_id, error = %err, "response for closed session discarded");
      }
    }
  });
  StatusCode::ACCEPTED.into_response()
}

fn fallback_internal_error(id: &Value) -> String {
  serde_json::to_string(&JsonRpcResponse::error(
    id.clone(),
    JsonRpcError::internal("response serialization failed"),
  ))
  .expect("static error response serializes")
}

/// SSE body that unregisters its session when the client goes away.
struct SessionStream {
  inner: ReceiverStream<String>,
  session_manager: Arc<SessionManager>,
  session_id: String,
}

impl Stream for SessionStream {
  type Item = String;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    Pin::new(&mut self.inner).poll_next(cx)
  }
}

impl Drop for SessionStream {
  fn drop(&mut self) {
    self.session_manager.remove_session(&self.session_id);
  }
}

async fn handle_sse(State(state): State<Arc<dyn RouterState>>) -> Response {
  let session_manager = state.session_manager();
  let (session_id, rx) = session_manager.create_session();

  // the first frame tells the client where to POST
  let endpoint = format!("{MCP_ENDPOINT}?sessionId={session_id}");
  let first = sse_event("endpoint", &endpoint);
  let stream = SessionStream {
    inner: ReceiverStream::new(rx),
    session_manager: Arc::clone(&session_manager),
    session_id,
  };
  let stream = futures::stream::once(async move { first }).chain(stream);
  RawSse::new(stream).into_response()
}

fn json_response(status: StatusCode, response: &JsonRpcResponse) -> Response {
  let body = serde_json::to_string(response)
    .unwrap_or_else(|_| fallback_internal_error(&response.id));
  Response::builder()
    .status(status)
    .header("Content-Type", "application/json")
    .body(Body::from(body))
    .unwrap()
}
