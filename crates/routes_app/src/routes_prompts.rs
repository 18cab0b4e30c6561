use axum::{
  extract::{Path, State},
  http::StatusCode,
  Extension, Json,
};
use axum_extra::extract::WithRejection;
use objs::{ApiError, AppError, ErrorType, Prompt, UserContext};
use serde::{Deserialize, Serialize};
use server_core::RouterState;
use services::db::PromptRepository;
use services::AppService;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PromptRouteError {
  #[error("prompt '{0}' not found")]
  NotFound(String),
  #[error("a prompt named '{0}' already exists")]
  NameExists(String),
}

impl AppError for PromptRouteError {
  fn error_type(&self) -> ErrorType {
    match self {
      PromptRouteError::NotFound(_) => ErrorType::NotFound,
      PromptRouteError::NameExists(_) => ErrorType::BadRequest,
    }
  }

  fn code(&self) -> String {
    match self {
      PromptRouteError::NotFound(_) => "PROMPT_NOT_FOUND".to_string(),
      PromptRouteError::NameExists(_) => "PROMPT_NAME_EXISTS".to_string(),
    }
  }
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PromptPayload {
  pub name: String,
  #[serde(default)]
  pub module_name: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  pub content: String,
  #[serde(default = "default_enabled")]
  pub enabled: bool,
}

fn default_enabled() -> bool {
  true
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PromptListResponse {
  pub prompts: Vec<Prompt>,
}

pub async fn list_prompts_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
) -> Result<Json<PromptListResponse>, ApiError> {
  let prompts = state
    .app_service()
    .db_service()
    .list_prompts(&ctx.user_id)
    .await?;
  Ok(Json(PromptListResponse { prompts }))
}

pub async fn get_prompt_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  Path(id): Path<String>,
) -> Result<Json<Prompt>, ApiError> {
  let prompt = state
    .app_service()
    .db_service()
    .get_prompt(&ctx.user_id, &id)
    .await?
    .ok_or(PromptRouteError::NotFound(id))?;
  Ok(Json(prompt))
}

pub async fn create_prompt_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  WithRejection(Json(payload), _): WithRejection<Json<PromptPayload>, ApiError>,
) -> Result<(StatusCode, Json<Prompt>), ApiError> {
  let db_service = state.app_service().db_service();
  if db_service
    .get_prompt_by_name(&ctx.user_id, &payload.name)
    .await?
    .is_some()
  {
    return Err(PromptRouteError::NameExists(payload.name).into());
  }

  let now = state.app_service().time_service().utc_now();
  let prompt = Prompt {
    id: Uuid::new_v4().to_string(),
    user_id: ctx.user_id.clone(),
    module_name: payload.module_name,
    name: payload.name,
    description: payload.description,
    content: payload.content,
    enabled: payload.enabled,
    created_at: now,
    updated_at: now,
  };
  db_service.create_prompt(&prompt).await?;
  Ok((StatusCode::CREATED, Json(prompt)))
}

pub async fn update_prompt_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  Path(id): Path<String>,
  WithRejection(Json(payload), _): WithRejection<Json<PromptPayload>, ApiError>,
) -> Result<Json<Prompt>, ApiError> {
  let db_service = state.app_service().db_service();
  let existing = db_service
    .get_prompt(&ctx.user_id, &id)
    .await?
    .ok_or_else(|| PromptRouteError::NotFound(id.clone()))?;

  // renames must not collide with another prompt of the same user
  if payload.name != existing.name
    && db_service
      .get_prompt_by_name(&ctx.user_id, &payload.name)
      .await?
      .is_some()
  {
    return Err(PromptRouteError::NameExists(payload.name).into());
  }

  let mut updated = existing;
  updated.name = payload.name;
  updated.module_name = payload.module_name;
  updated.description = payload.description;
  updated.content = payload.content;
  updated.enabled = payload.enabled;
  db_service.update_prompt(&updated).await?;
  Ok(Json(updated))
}

pub async fn delete_prompt_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
  let deleted = state
    .app_service()
    .db_service()
    .delete_prompt(&ctx.user_id, &id)
    .await?;
  if !deleted {
    return Err(PromptRouteError::NotFound(id).into());
  }
  Ok(StatusCode::NO_CONTENT)
}
