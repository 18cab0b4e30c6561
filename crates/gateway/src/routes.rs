use crate::{
  authenticate, error_response, forward, mint_gateway_token, unauthorized_response, GatewayError,
  GatewayState,
};
use axum::{
  extract::{Request, State},
  response::{IntoResponse, Response},
  routing::get,
  Json, Router,
};
use serde_json::{json, Value};
use services::Jwks;

/// The public edge surface: utility documents plus a catch-all authenticated
/// proxy to the protocol server.
pub fn gateway_router(state: GatewayState) -> Router {
  Router::new()
    .route("/ping", get(ping_handler))
    .route("/.well-known/jwks.json", get(jwks_handler))
    .route(
      "/v1/mcp/.well-known/oauth-protected-resource",
      get(protected_resource_handler),
    )
    .route(
      "/v1/mcp/.well-known/oauth-authorization-server",
      get(authorization_server_handler),
    )
    .fallback(proxy_handler)
    .with_state(state)
}

async fn ping_handler() -> Json<Value> {
  Json(json!({"message": "pong"}))
}

async fn jwks_handler(State(state): State<GatewayState>) -> Json<Jwks> {
  Json(state.key_service.jwks())
}

/// RFC 9728 protected-resource metadata: tells MCP clients which
/// authorization server guards this resource.
async fn protected_resource_handler(State(state): State<GatewayState>) -> Json<Value> {
  Json(json!({
    "resource": format!("{}/v1/mcp", state.setting_service.public_origin()),
    "authorization_servers": [state.setting_service.idp_issuer()],
    "scopes_supported": ["openid", "profile", "email"],
    "bearer_methods_supported": ["header"],
  }))
}

/// RFC 8414 document proxied from the IdP so clients need only one origin.
async fn authorization_server_handler(State(state): State<GatewayState>) -> Response {
  let url = format!(
    "{}/.well-known/oauth-authorization-server",
    state.setting_service.idp_issuer()
  );
  match state.http_client.get(&url).send().await {
    Ok(response) if response.status().is_success() => match response.json::<Value>().await {
      Ok(doc) => Json(doc).into_response(),
      Err(err) => error_response(&GatewayError::Upstream(err.to_string())),
    },
    Ok(response) => error_response(&GatewayError::Upstream(format!(
      "idp returned {}",
      response.status()
    ))),
    Err(err) => error_response(&GatewayError::Upstream(err.to_string())),
  }
}

/// Everything else: authenticate, mint a gateway token, forward.
async fn proxy_handler(State(state): State<GatewayState>, req: Request) -> Response {
  let claims = match authenticate(&state, req.headers()).await {
    Ok(claims) => claims,
    Err(err) => {
      tracing::warn!(security_event = true, error = %err, "edge authentication failed");
      return unauthorized_response(&err, &state.resource_metadata_url());
    }
  };
  let token = match mint_gateway_token(&state, &claims) {
    Ok(token) => token,
    Err(err) => return error_response(&err),
  };
  match forward(&state, req, &token).await {
    Ok(response) => response,
    Err(err) => error_response(&err),
  }
}
