use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetaTool {
  Run,
  Batch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UsageDetail {
  pub module: String,
  pub tool: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub task_id: Option<String>,
}

/// Append-only record of one meta-tool invocation; `details` holds one entry
/// per executed sub-task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
  pub id: String,
  pub user_id: String,
  pub meta_tool: MetaTool,
  pub request_id: String,
  pub details: Vec<UsageDetail>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UsagePeriod {
  pub start: NaiveDate,
  pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UsageSummary {
  pub total_used: i64,
  pub by_module: HashMap<String, i64>,
  pub period: UsagePeriod,
}
