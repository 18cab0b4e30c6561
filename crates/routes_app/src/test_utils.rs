use crate::management_routes;
use axum::{body::Body, http::Response, Extension, Router};
use http_body_util::BodyExt;
use objs::{User, UserContext, UserRole};
use server_core::test_utils::{test_router_state, TestRouterState};
use server_core::RouterState;
use services::test_utils::seed_user;
use services::{AppService, UserService};
use tower::ServiceExt;

pub async fn body_json(response: Response<Body>) -> anyhow::Result<serde_json::Value> {
  let bytes = response.into_body().collect().await?.to_bytes();
  Ok(serde_json::from_slice(&bytes)?)
}

async fn build(role: UserRole) -> (Router, User, TestRouterState) {
  let harness = test_router_state().await;
  let user = seed_user(harness.app.db(), "alice").await;
  let mut ctx: UserContext = harness
    .state
    .app_service()
    .user_service()
    .load_user_context(&user.id, "req-test")
    .await
    .expect("context loads");
  ctx.role = role;
  let router = management_routes()
    .with_state(harness.state.clone())
    .layer(Extension(ctx));
  (router, user, harness)
}

/// Management router with a seeded regular user attached as UserContext.
pub async fn authed_router() -> (Router, User, TestRouterState) {
  build(UserRole::User).await
}

pub async fn admin_router() -> (Router, User, TestRouterState) {
  build(UserRole::Admin).await
}

/// Re-runs the oneshot against a router clone, for multi-request tests.
pub async fn send(
  router: &Router,
  request: axum::http::Request<Body>,
) -> anyhow::Result<Response<Body>> {
  Ok(router.clone().oneshot(request).await?)
}
