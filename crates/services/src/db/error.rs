use objs::{AppError, ErrorType};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
  #[error("database error: {0}")]
  Sqlx(#[from] sqlx::Error),
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
  #[error("stored row is malformed: {0}")]
  Corrupt(String),
}

impl AppError for DbError {
  fn error_type(&self) -> ErrorType {
    ErrorType::InternalServer
  }

  fn code(&self) -> String {
    "DB_ERROR".to_string()
  }
}
