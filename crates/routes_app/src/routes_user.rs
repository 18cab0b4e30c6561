use axum::{extract::State, Extension, Json};
use axum_extra::extract::WithRejection;
use objs::{ApiError, User, UserContext};
use serde_json::Value;
use server_core::RouterState;
use services::db::UserRepository;
use services::AppService;
use std::sync::Arc;

pub async fn get_profile_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
) -> Result<Json<User>, ApiError> {
  let user = state
    .app_service()
    .user_service()
    .get_user(&ctx.user_id)
    .await?;
  Ok(Json(user))
}

pub async fn update_settings_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  WithRejection(Json(settings), _): WithRejection<Json<Value>, ApiError>,
) -> Result<Json<User>, ApiError> {
  let app_service = state.app_service();
  app_service
    .db_service()
    .update_user_settings(&ctx.user_id, &settings)
    .await?;
  let user = app_service.user_service().get_user(&ctx.user_id).await?;
  Ok(Json(user))
}

/// Idempotent: the authorizer has already upserted the user by external id,
/// so registration just returns the canonical row.
pub async fn register_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
) -> Result<Json<User>, ApiError> {
  let user = state
    .app_service()
    .user_service()
    .get_user(&ctx.user_id)
    .await?;
  Ok(Json(user))
}
