use crate::AppError;
use axum::{
  body::Body,
  response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Wire form of every management-API error: `{error: <CODE>, message: <text>}`
/// plus the HTTP status carried out-of-band.
#[derive(Debug, Serialize, Deserialize, thiserror::Error)]
pub struct ApiError {
  #[serde(skip)]
  pub status: u16,
  pub error: String,
  pub message: String,
}

impl std::fmt::Display for ApiError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.error, self.message)
  }
}

impl ApiError {
  pub fn new(status: u16, error: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      status,
      error: error.into(),
      message: message.into(),
    }
  }
}

impl<T: AppError + 'static> From<T> for ApiError {
  fn from(value: T) -> Self {
    ApiError {
      status: value.status(),
      error: value.code(),
      message: value.to_string(),
    }
  }
}

impl From<Box<dyn AppError>> for ApiError {
  fn from(value: Box<dyn AppError>) -> Self {
    ApiError {
      status: value.status(),
      error: value.code(),
      message: value.to_string(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let body = serde_json::to_string(&self)
      .unwrap_or_else(|_| r#"{"error":"INTERNAL_ERROR","message":"serialization failed"}"#.into());
    Response::builder()
      .status(self.status)
      .header("Content-Type", "application/json")
      .body(Body::from(body))
      .unwrap()
  }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
  fn from(value: axum::extract::rejection::JsonRejection) -> Self {
    ApiError::new(400, "INVALID_BODY", value.body_text())
  }
}
