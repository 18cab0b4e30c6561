use axum::{
  body::Body,
  response::{IntoResponse, Response},
};
use objs::{AppError, ErrorType};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
  #[error("missing bearer credentials")]
  MissingCredentials,
  #[error("credentials could not be verified")]
  InvalidCredentials(String),
  #[error("api key has been revoked")]
  KeyRevoked,
  #[error("api key is expired")]
  KeyExpired,
  #[error("upstream request failed: {0}")]
  Upstream(String),
  #[error("internal gateway error: {0}")]
  Internal(String),
}

impl AppError for GatewayError {
  fn error_type(&self) -> ErrorType {
    match self {
      GatewayError::MissingCredentials
      | GatewayError::InvalidCredentials(_)
      | GatewayError::KeyRevoked
      | GatewayError::KeyExpired => ErrorType::Authentication,
      GatewayError::Upstream(_) => ErrorType::InternalServer,
      GatewayError::Internal(_) => ErrorType::InternalServer,
    }
  }

  fn code(&self) -> String {
    match self {
      GatewayError::MissingCredentials => "MISSING_CREDENTIALS",
      GatewayError::InvalidCredentials(_) => "INVALID_CREDENTIALS",
      GatewayError::KeyRevoked => "API_KEY_REVOKED",
      GatewayError::KeyExpired => "API_KEY_EXPIRED",
      GatewayError::Upstream(_) => "UPSTREAM_ERROR",
      GatewayError::Internal(_) => "INTERNAL_ERROR",
    }
    .to_string()
  }
}

/// 401 challenges carry the RFC 9728 pointer so MCP clients can discover the
/// authorization server; details of the failure stay in the logs.
pub fn unauthorized_response(error: &GatewayError, resource_metadata_url: &str) -> Response {
  let body = json!({
    "error": error.code(),
    "message": "authentication required",
  });
  Response::builder()
    .status(401)
    .header("Content-Type", "application/json")
    .header(
      "WWW-Authenticate",
      format!(r#"Bearer resource_metadata="{resource_metadata_url}""#),
    )
    .body(Body::from(body.to_string()))
    .unwrap()
}

pub fn error_response(error: &GatewayError) -> Response {
  let body = json!({"error": error.code(), "message": error.to_string()});
  (
    axum::http::StatusCode::from_u16(error.status())
      .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
    [("Content-Type", "application/json")],
    body.to_string(),
  )
    .into_response()
}
