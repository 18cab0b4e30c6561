use axum::http::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr, Default)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorType {
  Validation,
  BadRequest,
  Authentication,
  Forbidden,
  NotFound,
  TooManyRequests,
  InvalidAppState,
  InternalServer,
  #[default]
  Unknown,
}

impl ErrorType {
  pub fn status(&self) -> u16 {
    match self {
      ErrorType::Validation | ErrorType::BadRequest => StatusCode::BAD_REQUEST.as_u16(),
      ErrorType::Authentication => StatusCode::UNAUTHORIZED.as_u16(),
      ErrorType::Forbidden => StatusCode::FORBIDDEN.as_u16(),
      ErrorType::NotFound => StatusCode::NOT_FOUND.as_u16(),
      ErrorType::TooManyRequests => StatusCode::TOO_MANY_REQUESTS.as_u16(),
      ErrorType::InvalidAppState | ErrorType::InternalServer | ErrorType::Unknown => {
        StatusCode::INTERNAL_SERVER_ERROR.as_u16()
      }
    }
  }
}

/// Metadata every application error carries so the transport layer can map it
/// to an HTTP status and a stable machine-readable code.
pub trait AppError: std::error::Error + Send + Sync + 'static {
  fn error_type(&self) -> ErrorType;

  fn code(&self) -> String;

  fn status(&self) -> u16 {
    self.error_type().status()
  }
}

impl<T: AppError + 'static> From<T> for Box<dyn AppError> {
  fn from(error: T) -> Self {
    Box::new(error)
  }
}

impl std::error::Error for Box<dyn AppError> {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    (**self).source()
  }
}
