use crate::{GatewayError, GatewayState};
use axum::{
  body::Body,
  extract::Request,
  response::Response,
};
use services::generate_request_id;
use std::time::Duration;

pub const HEADER_GATEWAY_TOKEN: &str = "X-Gateway-Token";
pub const HEADER_REQUEST_ID: &str = "X-Request-ID";

/// Hard ceiling on one gateway→server round trip. GET requests are exempt:
/// their responses may be long-lived SSE streams.
const PROXY_TIMEOUT: Duration = Duration::from_secs(30);

/// Hop-by-hop headers that must not be forwarded either way.
const HOP_HEADERS: &[&str] = &[
  "connection",
  "keep-alive",
  "proxy-authenticate",
  "proxy-authorization",
  "te",
  "trailers",
  "transfer-encoding",
  "upgrade",
  "host",
  "content-length",
];

/// Forwards the (already authenticated) request to the protocol server,
/// replacing the client's credentials with a gateway token.
pub async fn forward(
  state: &GatewayState,
  req: Request,
  gateway_token: &str,
) -> Result<Response, GatewayError> {
  let (parts, body) = req.into_parts();
  let path_and_query = parts
    .uri
    .path_and_query()
    .map(|pq| pq.as_str())
    .unwrap_or("/");
  let url = format!("{}{path_and_query}", state.setting_service.server_url());

  let request_id = parts
    .headers
    .get(HEADER_REQUEST_ID)
    .and_then(|v| v.to_str().ok())
    .map(ToString::to_string)
    .unwrap_or_else(generate_request_id);

  let body = axum::body::to_bytes(body, usize::MAX)
    .await
    .map_err(|e| GatewayError::Internal(e.to_string()))?;

  let mut upstream = state
    .http_client
    .request(parts.method.clone(), &url)
    .body(body.to_vec());
  if parts.method != axum::http::Method::GET {
    upstream = upstream.timeout(PROXY_TIMEOUT);
  }
  for (name, value) in parts.headers.iter() {
    let lower = name.as_str().to_ascii_lowercase();
    if lower == "authorization" || HOP_HEADERS.contains(&lower.as_str()) {
      continue;
    }
    upstream = upstream.header(name, value);
  }
  upstream = upstream
    .header(HEADER_GATEWAY_TOKEN, gateway_token)
    .header(HEADER_REQUEST_ID, &request_id);

  let response = upstream
    .send()
    .await
    .map_err(|e| GatewayError::Upstream(e.to_string()))?;

  let mut builder = Response::builder().status(response.status().as_u16());
  for (name, value) in response.headers() {
    if HOP_HEADERS.contains(&name.as_str().to_ascii_lowercase().as_str()) {
      continue;
    }
    builder = builder.header(name, value);
  }
  // stream the upstream body through, SSE included
  let stream = response.bytes_stream();
  builder
    .body(Body::from_stream(stream))
    .map_err(|e| GatewayError::Internal(e.to_string()))
}
