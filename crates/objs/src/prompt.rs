use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User-owned prompt exposed over MCP `prompts/list` / `prompts/get`.
/// `name` is unique per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Prompt {
  pub id: String,
  pub user_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub module_name: Option<String>,
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub content: String,
  pub enabled: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}
