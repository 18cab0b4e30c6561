use axum::{
  extract::{Query, State},
  Extension, Json,
};
use chrono::NaiveDate;
use objs::{ApiError, AppError, ErrorType, UsageSummary, UserContext};
use serde::Deserialize;
use server_core::RouterState;
use services::AppService;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum UsageRouteError {
  #[error("invalid date '{value}', expected YYYY-MM-DD")]
  InvalidDate { value: String },
}

impl AppError for UsageRouteError {
  fn error_type(&self) -> ErrorType {
    ErrorType::BadRequest
  }

  fn code(&self) -> String {
    "INVALID_PERIOD".to_string()
  }
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
  pub start: String,
  pub end: String,
}

fn parse_date(value: &str) -> Result<NaiveDate, UsageRouteError> {
  NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| UsageRouteError::InvalidDate {
    value: value.to_string(),
  })
}

/// `GET /v1/me/usage?start=YYYY-MM-DD&end=YYYY-MM-DD`, end exclusive.
pub async fn usage_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  Query(query): Query<UsageQuery>,
) -> Result<Json<UsageSummary>, ApiError> {
  let start = parse_date(&query.start)?;
  let end = parse_date(&query.end)?;
  let summary = state
    .app_service()
    .usage_service()
    .usage_summary(&ctx.user_id, start, end)
    .await?;
  Ok(Json(summary))
}
