use auth_middleware::{authz_middleware, rate_limit_middleware, RateLimiter};
use axum::{middleware::from_fn, middleware::from_fn_with_state, Router};
use routes_app::{management_routes, public_routes};
use routes_mcp::mcp_routes;
use server_core::RouterState;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Assembles the protocol-server router: every `/v1` route sits behind the
/// authorizer (outer) and the rate limiter (inner, so it sees the resolved
/// user); utility routes stay open.
pub fn build_router(state: Arc<dyn RouterState>, rate_limiter: Arc<RateLimiter>) -> Router {
  let protected = Router::new()
    .merge(management_routes())
    .merge(mcp_routes())
    .layer(from_fn(
      move |req: axum::extract::Request, next: axum::middleware::Next| {
        let limiter = Arc::clone(&rate_limiter);
        rate_limit_middleware(limiter, req, next)
      },
    ))
    .layer(from_fn_with_state(state.clone(), authz_middleware));

  Router::new()
    .merge(public_routes())
    .merge(protected)
    .layer(TraceLayer::new_for_http())
    .layer(CatchPanicLayer::custom(handle_panic))
    .with_state(state)
}

/// Recovery: a panicking handler becomes a generic 500 and a security event;
/// no panic detail reaches the client.
fn handle_panic(
  err: Box<dyn std::any::Any + Send + 'static>,
) -> axum::http::Response<http_body_util::Full<bytes::Bytes>> {
  let detail = if let Some(s) = err.downcast_ref::<String>() {
    s.clone()
  } else if let Some(s) = err.downcast_ref::<&str>() {
    (*s).to_string()
  } else {
    "unknown panic".to_string()
  };
  tracing::error!(security_event = true, panic = %detail, "request handler panicked");
  axum::http::Response::builder()
    .status(500)
    .header("Content-Type", "application/json")
    .body(http_body_util::Full::from(
      r#"{"error":"INTERNAL_ERROR","message":"internal server error"}"#,
    ))
    .expect("static response builds")
}

#[cfg(test)]
mod tests {
  use crate::build_router;
  use auth_middleware::{RateLimiter, HEADER_GATEWAY_TOKEN};
  use axum::body::Body;
  use axum::http::{Request, StatusCode};
  use chrono::Utc;
  use http_body_util::BodyExt;
  use modules::test_utils::stub_registry;
  use objs::GatewayClaims;
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use serde_json::{json, Value};
  use server_core::{DefaultRouterState, RouterState};
  use services::test_utils::{test_key_service, TestAppServiceBuilder};
  use std::sync::Arc;
  use std::time::Duration;
  use tower::ServiceExt;

  async fn full_router() -> (axum::Router, mockito::ServerGuard) {
    let key_service = test_key_service();
    let mut jwks_server = mockito::Server::new_async().await;
    jwks_server
      .mock("GET", "/jwks.json")
      .with_status(200)
      .with_body(serde_json::to_string(&key_service.jwks()).unwrap())
      .create_async()
      .await;

    let app = TestAppServiceBuilder::default()
      .gateway_jwks_url(format!("{}/jwks.json", jwks_server.url()))
      .build()
      .await;
    let state: Arc<dyn RouterState> =
      Arc::new(DefaultRouterState::new(app.app_service(), stub_registry()));
    let router = build_router(
      state,
      Arc::new(RateLimiter::new(100, Duration::from_secs(1))),
    );
    (router, jwks_server)
  }

  fn gateway_token() -> String {
    let key_service = test_key_service();
    let claims = GatewayClaims::for_external_id(
      "idp|alice",
      Some("alice@example.com".to_string()),
      Utc::now(),
    );
    key_service.sign(&claims).unwrap()
  }

  #[rstest]
  #[tokio::test]
  async fn test_ping_is_open() -> anyhow::Result<()> {
    let (router, _jwks) = full_router().await;
    let response = router
      .oneshot(Request::get("/ping").body(Body::empty())?)
      .await?;
    assert_eq!(StatusCode::OK, response.status());
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_protected_routes_require_gateway_token() -> anyhow::Result<()> {
    let (router, _jwks) = full_router().await;
    // a raw Authorization header is NOT accepted by the protocol server
    let response = router
      .oneshot(
        Request::get("/v1/me/profile")
          .header("authorization", "Bearer some-end-user-token")
          .body(Body::empty())?,
      )
      .await?;
    assert_eq!(StatusCode::UNAUTHORIZED, response.status());
    let body: Value =
      serde_json::from_slice(&response.into_body().collect().await?.to_bytes())?;
    assert_eq!("MISSING_GATEWAY_TOKEN", body["error"]);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_end_to_end_mcp_initialize_via_gateway_token() -> anyhow::Result<()> {
    let (router, _jwks) = full_router().await;
    let response = router
      .oneshot(
        Request::post("/v1/mcp")
          .header(HEADER_GATEWAY_TOKEN, gateway_token())
          .header("content-type", "application/json")
          .body(Body::from(
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}).to_string(),
          ))?,
      )
      .await?;
    assert_eq!(StatusCode::OK, response.status());
    let body: Value =
      serde_json::from_slice(&response.into_body().collect().await?.to_bytes())?;
    assert_eq!("2025-03-26", body["result"]["protocolVersion"]);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_rate_limit_applies_to_authenticated_user() -> anyhow::Result<()> {
    let key_service = test_key_service();
    let mut jwks_server = mockito::Server::new_async().await;
    jwks_server
      .mock("GET", "/jwks.json")
      .with_status(200)
      .with_body(serde_json::to_string(&key_service.jwks()).unwrap())
      .create_async()
      .await;
    let app = TestAppServiceBuilder::default()
      .gateway_jwks_url(format!("{}/jwks.json", jwks_server.url()))
      .build()
      .await;
    let state: Arc<dyn RouterState> =
      Arc::new(DefaultRouterState::new(app.app_service(), stub_registry()));
    let router = build_router(
      state,
      Arc::new(RateLimiter::new(2, Duration::from_secs(60))),
    );

    let token = gateway_token();
    for _ in 0..2 {
      let response = router
        .clone()
        .oneshot(
          Request::get("/v1/me/profile")
            .header(HEADER_GATEWAY_TOKEN, &token)
            .body(Body::empty())?,
        )
        .await?;
      assert_eq!(StatusCode::OK, response.status());
    }
    let response = router
      .oneshot(
        Request::get("/v1/me/profile")
          .header(HEADER_GATEWAY_TOKEN, &token)
          .body(Body::empty())?,
      )
      .await?;
    assert_eq!(StatusCode::TOO_MANY_REQUESTS, response.status());
    assert_eq!("1", response.headers()["retry-after"]);
    Ok(())
  }
}
