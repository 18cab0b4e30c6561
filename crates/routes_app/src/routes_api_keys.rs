use axum::{
  extract::{Path, State},
  http::StatusCode,
  Extension, Json,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Duration, Utc};
use objs::{ApiError, ApiKey, ApiKeyClaims, AppError, ErrorType, UserContext, API_KEY_PREFIX};
use serde::{Deserialize, Serialize};
use server_core::RouterState;
use services::db::ApiKeyRepository;
use services::{AppService, KeyServiceError, RevocationCache};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ApiKeyRouteError {
  #[error("api key '{0}' not found")]
  NotFound(String),
  #[error("signing failed: {0}")]
  Signing(#[from] KeyServiceError),
}

impl AppError for ApiKeyRouteError {
  fn error_type(&self) -> ErrorType {
    match self {
      ApiKeyRouteError::NotFound(_) => ErrorType::NotFound,
      ApiKeyRouteError::Signing(_) => ErrorType::InternalServer,
    }
  }

  fn code(&self) -> String {
    match self {
      ApiKeyRouteError::NotFound(_) => "API_KEY_NOT_FOUND".to_string(),
      ApiKeyRouteError::Signing(_) => "API_KEY_SIGNING_FAILED".to_string(),
    }
  }
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CreateApiKeyRequest {
  pub display_name: String,
  #[serde(default)]
  pub expires_in_days: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CreateApiKeyResponse {
  pub id: String,
  pub display_name: String,
  /// The full key, returned exactly once at creation.
  pub key: String,
  pub key_prefix: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub expires_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiKeyListResponse {
  pub api_keys: Vec<ApiKey>,
}

pub async fn list_api_keys_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
) -> Result<Json<ApiKeyListResponse>, ApiError> {
  let api_keys = state
    .app_service()
    .db_service()
    .list_api_keys(&ctx.user_id)
    .await?;
  Ok(Json(ApiKeyListResponse { api_keys }))
}

pub async fn create_api_key_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  WithRejection(Json(payload), _): WithRejection<Json<CreateApiKeyRequest>, ApiError>,
) -> Result<(StatusCode, Json<CreateApiKeyResponse>), ApiError> {
  let app_service = state.app_service();
  let key_service = app_service.key_service();
  let now = app_service.time_service().utc_now();

  let id = Uuid::new_v4().to_string();
  let expires_at = payload
    .expires_in_days
    .map(|days| now + Duration::days(days));
  let claims = ApiKeyClaims {
    sub: ctx.user_id.clone(),
    kid: id.clone(),
    iat: now.timestamp(),
    exp: expires_at.map(|at| at.timestamp()),
  };
  let jwt = key_service.sign(&claims).map_err(ApiKeyRouteError::from)?;
  let key = format!("{API_KEY_PREFIX}{jwt}");
  let key_prefix = key.chars().take(12).collect::<String>();

  let row = ApiKey {
    id: id.clone(),
    user_id: ctx.user_id.clone(),
    jwt_kid: key_service.kid().to_string(),
    key_prefix: key_prefix.clone(),
    display_name: payload.display_name.clone(),
    expires_at,
    last_used_at: None,
    created_at: now,
  };
  app_service.db_service().create_api_key(&row).await?;

  Ok((
    StatusCode::CREATED,
    Json(CreateApiKeyResponse {
      id,
      display_name: payload.display_name,
      key,
      key_prefix,
      expires_at,
      created_at: now,
    }),
  ))
}

pub async fn get_api_key_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  Path(id): Path<String>,
) -> Result<Json<ApiKey>, ApiError> {
  let key = state
    .app_service()
    .db_service()
    .get_api_key(&ctx.user_id, &id)
    .await?
    .ok_or(ApiKeyRouteError::NotFound(id))?;
  Ok(Json(key))
}

/// Deletion is immediate: the row disappears and the shared revocation cache
/// entry is dropped so in-flight verifiers re-check the database.
pub async fn delete_api_key_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
  let app_service = state.app_service();
  let deleted = app_service
    .db_service()
    .delete_api_key(&ctx.user_id, &id)
    .await?;
  if !deleted {
    return Err(ApiKeyRouteError::NotFound(id).into());
  }
  app_service.revocation_cache().invalidate(&id);
  Ok(StatusCode::NO_CONTENT)
}
