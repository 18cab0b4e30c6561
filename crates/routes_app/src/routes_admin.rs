use axum::{
  extract::{Path, State},
  http::StatusCode,
  Extension, Json,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use objs::{ApiError, AppError, ErrorType, UserContext, UserRole};
use serde::{Deserialize, Serialize};
use server_core::RouterState;
use services::db::CredentialRepository;
use services::{AppService, OAuthAppMasked};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AdminRouteError {
  #[error("admin role required")]
  Forbidden,
  #[error("no oauth app configured for provider '{0}'")]
  NotFound(String),
}

impl AppError for AdminRouteError {
  fn error_type(&self) -> ErrorType {
    match self {
      AdminRouteError::Forbidden => ErrorType::Forbidden,
      AdminRouteError::NotFound(_) => ErrorType::NotFound,
    }
  }

  fn code(&self) -> String {
    match self {
      AdminRouteError::Forbidden => "FORBIDDEN".to_string(),
      AdminRouteError::NotFound(_) => "OAUTH_APP_NOT_FOUND".to_string(),
    }
  }
}

fn require_admin(ctx: &UserContext) -> Result<(), AdminRouteError> {
  if ctx.role != UserRole::Admin {
    return Err(AdminRouteError::Forbidden);
  }
  Ok(())
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UpsertOAuthAppRequest {
  pub client_id: String,
  pub client_secret: String,
  pub redirect_uri: String,
  #[serde(default = "default_true")]
  pub enabled: bool,
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct OAuthAppListResponse {
  pub apps: Vec<OAuthAppMasked>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ConsentDto {
  pub user_id: String,
  pub module_name: String,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ConsentListResponse {
  pub consents: Vec<ConsentDto>,
}

pub async fn list_oauth_apps_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
) -> Result<Json<OAuthAppListResponse>, ApiError> {
  require_admin(&ctx)?;
  let apps = state.app_service().oauth_app_service().list().await?;
  Ok(Json(OAuthAppListResponse { apps }))
}

pub async fn get_oauth_app_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  Path(provider): Path<String>,
) -> Result<Json<OAuthAppMasked>, ApiError> {
  require_admin(&ctx)?;
  let app = state
    .app_service()
    .oauth_app_service()
    .get(&provider)
    .await?
    .ok_or(AdminRouteError::NotFound(provider))?;
  Ok(Json(app))
}

pub async fn put_oauth_app_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  Path(provider): Path<String>,
  WithRejection(Json(payload), _): WithRejection<Json<UpsertOAuthAppRequest>, ApiError>,
) -> Result<Json<OAuthAppMasked>, ApiError> {
  require_admin(&ctx)?;
  let app = state
    .app_service()
    .oauth_app_service()
    .upsert(
      &provider,
      &payload.client_id,
      &payload.client_secret,
      &payload.redirect_uri,
      payload.enabled,
    )
    .await?;
  Ok(Json(app))
}

pub async fn delete_oauth_app_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  Path(provider): Path<String>,
) -> Result<StatusCode, ApiError> {
  require_admin(&ctx)?;
  state
    .app_service()
    .oauth_app_service()
    .delete(&provider)
    .await?;
  Ok(StatusCode::NO_CONTENT)
}

/// Which users hold credentials per provider; ids and timestamps only.
pub async fn list_consents_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
) -> Result<Json<ConsentListResponse>, ApiError> {
  require_admin(&ctx)?;
  let consents = state
    .app_service()
    .db_service()
    .list_credential_consents()
    .await?
    .into_iter()
    .map(|(user_id, module_name, updated_at)| ConsentDto {
      user_id,
      module_name,
      updated_at,
    })
    .collect();
  Ok(Json(ConsentListResponse { consents }))
}

#[cfg(test)]
mod tests {
  use crate::test_utils::{admin_router, authed_router, body_json, send};
  use axum::body::Body;
  use axum::http::{Request, StatusCode};
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use serde_json::json;

  fn put_app(provider: &str) -> Request<Body> {
    Request::put(format!("/v1/admin/oauth/apps/{provider}"))
      .header("content-type", "application/json")
      .body(Body::from(
        json!({
          "client_id": "client-1",
          "client_secret": "s3cret",
          "redirect_uri": "https://portal.test/cb"
        })
        .to_string(),
      ))
      .unwrap()
  }

  #[rstest]
  #[tokio::test]
  async fn test_non_admin_is_forbidden() -> anyhow::Result<()> {
    let (router, _user, _harness) = authed_router().await;
    let response = send(&router, put_app("github")).await?;
    assert_eq!(StatusCode::FORBIDDEN, response.status());
    let body = body_json(response).await?;
    assert_eq!("FORBIDDEN", body["error"]);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_admin_upsert_masks_secret() -> anyhow::Result<()> {
    let (router, _user, _harness) = admin_router().await;
    let response = send(&router, put_app("github")).await?;
    assert_eq!(StatusCode::OK, response.status());
    let body = body_json(response).await?;
    assert_eq!("client-1", body["client_id"]);
    assert!(body.get("client_secret").is_none());
    assert!(body.get("encrypted_client_secret").is_none());

    let response = send(
      &router,
      Request::get("/v1/admin/oauth/apps").body(Body::empty())?,
    )
    .await?;
    let body = body_json(response).await?;
    assert_eq!(1, body["apps"].as_array().unwrap().len());
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_consents_listing() -> anyhow::Result<()> {
    let (router, user, _harness) = admin_router().await;
    // link a credential through the user-facing API
    send(
      &router,
      Request::put("/v1/me/credentials/notion")
        .header("content-type", "application/json")
        .body(Body::from(
          json!({"auth_type": "api_key", "access_token": "sk"}).to_string(),
        ))?,
    )
    .await?;

    let body = body_json(
      send(
        &router,
        Request::get("/v1/admin/oauth/consents").body(Body::empty())?,
      )
      .await?,
    )
    .await?;
    let consents = body["consents"].as_array().unwrap();
    assert_eq!(1, consents.len());
    assert_eq!(user.id, consents[0]["user_id"]);
    assert_eq!("notion", consents[0]["module_name"]);
    Ok(())
  }
}
