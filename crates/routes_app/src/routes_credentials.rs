use axum::{
  extract::{Path, State},
  http::StatusCode,
  Extension, Json,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use objs::{ApiError, AppError, AuthType, CredentialBlob, ErrorType, UserContext};
use modules::ModuleHandler;
use serde::{Deserialize, Serialize};
use server_core::RouterState;
use services::db::CredentialRepository;
use services::AppService;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CredentialRouteError {
  #[error("module '{0}' is not registered")]
  UnknownModule(String),
  #[error("no credential stored for module '{0}'")]
  NotLinked(String),
}

impl AppError for CredentialRouteError {
  fn error_type(&self) -> ErrorType {
    match self {
      CredentialRouteError::UnknownModule(_) => ErrorType::BadRequest,
      CredentialRouteError::NotLinked(_) => ErrorType::NotFound,
    }
  }

  fn code(&self) -> String {
    match self {
      CredentialRouteError::UnknownModule(_) => "UNKNOWN_MODULE".to_string(),
      CredentialRouteError::NotLinked(_) => "CREDENTIAL_NOT_FOUND".to_string(),
    }
  }
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CredentialResponse {
  pub module_name: String,
  pub auth_type: AuthType,
  pub has_refresh_token: bool,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CredentialListResponse {
  pub credentials: Vec<CredentialSummaryDto>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CredentialSummaryDto {
  pub module_name: String,
  pub auth_type: AuthType,
  pub updated_at: DateTime<Utc>,
}

pub async fn list_credentials_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
) -> Result<Json<CredentialListResponse>, ApiError> {
  let summaries = state
    .app_service()
    .credential_service()
    .list(&ctx.user_id)
    .await?;
  Ok(Json(CredentialListResponse {
    credentials: summaries
      .into_iter()
      .map(|s| CredentialSummaryDto {
        module_name: s.module_name,
        auth_type: s.auth_type,
        updated_at: s.updated_at,
      })
      .collect(),
  }))
}

pub async fn get_credential_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  Path(module): Path<String>,
) -> Result<Json<CredentialResponse>, ApiError> {
  let app_service = state.app_service();
  let blob = app_service
    .credential_service()
    .get(&ctx.user_id, &module)
    .await?
    .ok_or_else(|| CredentialRouteError::NotLinked(module.clone()))?;
  let row = app_service
    .db_service()
    .get_credential(&ctx.user_id, &module)
    .await?
    .ok_or_else(|| CredentialRouteError::NotLinked(module.clone()))?;
  Ok(Json(CredentialResponse {
    module_name: module,
    auth_type: blob.auth_type,
    has_refresh_token: blob.refresh_token.is_some(),
    updated_at: row.updated_at,
  }))
}

/// Stores (or replaces) the credential for one module. On first link the
/// module's default tool settings are seeded inside the same transaction.
pub async fn put_credential_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  Path(module): Path<String>,
  WithRejection(Json(blob), _): WithRejection<Json<CredentialBlob>, ApiError>,
) -> Result<(StatusCode, Json<CredentialResponse>), ApiError> {
  let handler = state
    .registry()
    .get(&module)
    .ok_or_else(|| CredentialRouteError::UnknownModule(module.clone()))?;
  let app_service = state.app_service();
  app_service
    .credential_service()
    .upsert(&ctx.user_id, handler.definition(), &blob)
    .await?;

  let row = app_service
    .db_service()
    .get_credential(&ctx.user_id, &module)
    .await?
    .ok_or_else(|| CredentialRouteError::NotLinked(module.clone()))?;
  Ok((
    StatusCode::CREATED,
    Json(CredentialResponse {
      module_name: module,
      auth_type: blob.auth_type,
      has_refresh_token: blob.refresh_token.is_some(),
      updated_at: row.updated_at,
    }),
  ))
}

pub async fn delete_credential_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  Path(module): Path<String>,
) -> Result<StatusCode, ApiError> {
  state
    .app_service()
    .credential_service()
    .delete(&ctx.user_id, &module)
    .await?;
  Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
  use crate::test_utils::{authed_router, body_json, send};
  use axum::body::Body;
  use axum::http::{Request, StatusCode};
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use serde_json::json;

  fn put_credential(module: &str, body: serde_json::Value) -> Request<Body> {
    Request::put(format!("/v1/me/credentials/{module}"))
      .header("content-type", "application/json")
      .body(Body::from(body.to_string()))
      .unwrap()
  }

  #[rstest]
  #[tokio::test]
  async fn test_put_list_delete_credential() -> anyhow::Result<()> {
    let (router, _user, _harness) = authed_router().await;

    let response = send(
      &router,
      put_credential("notion", json!({"auth_type": "api_key", "access_token": "sk-1"})),
    )
    .await?;
    assert_eq!(StatusCode::CREATED, response.status());
    let body = body_json(response).await?;
    assert_eq!("api_key", body["auth_type"]);
    // the secret never comes back
    assert!(body.get("access_token").is_none());

    let response = send(&router, Request::get("/v1/me/credentials").body(Body::empty())?).await?;
    let body = body_json(response).await?;
    assert_eq!(1, body["credentials"].as_array().unwrap().len());

    let response = send(
      &router,
      Request::delete("/v1/me/credentials/notion").body(Body::empty())?,
    )
    .await?;
    assert_eq!(StatusCode::NO_CONTENT, response.status());

    let response = send(
      &router,
      Request::get("/v1/me/credentials/notion").body(Body::empty())?,
    )
    .await?;
    assert_eq!(StatusCode::NOT_FOUND, response.status());
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_put_unknown_module_rejected() -> anyhow::Result<()> {
    let (router, _user, _harness) = authed_router().await;
    let response = send(
      &router,
      put_credential("slack", json!({"auth_type": "api_key", "access_token": "x"})),
    )
    .await?;
    assert_eq!(StatusCode::BAD_REQUEST, response.status());
    let body = body_json(response).await?;
    assert_eq!("UNKNOWN_MODULE", body["error"]);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_first_link_seeds_tool_settings() -> anyhow::Result<()> {
    let (router, user, harness) = authed_router().await;
    send(
      &router,
      put_credential("notion", json!({"auth_type": "api_key", "access_token": "sk-1"})),
    )
    .await?;

    use services::db::ToolSettingRepository;
    let settings = harness
      .app
      .db()
      .list_tool_settings_for_module(&user.id, "notion")
      .await?;
    // stub notion module: search + get_page read-only (enabled), delete_page disabled
    assert_eq!(3, settings.len());
    let enabled: Vec<_> = settings.iter().filter(|s| s.enabled).collect();
    assert_eq!(2, enabled.len());
    Ok(())
  }
}
