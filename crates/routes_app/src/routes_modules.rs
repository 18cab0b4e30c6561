use axum::{
  extract::{Path, State},
  Extension, Json,
};
use axum_extra::extract::WithRejection;
use modules::ModuleHandler;
use objs::{
  validate_module_description, ApiError, AppError, ErrorType, ModuleSetting, ModuleStatus,
  ToolAnnotations, UserContext, DEFAULT_LANGUAGE,
};
use serde::{Deserialize, Serialize};
use server_core::RouterState;
use services::db::{CredentialRepository, ToolSettingRepository};
use services::AppService;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ModuleRouteError {
  #[error("module '{0}' is not registered")]
  UnknownModule(String),
  #[error("module '{0}' has no linked credential")]
  NotLinked(String),
  #[error("tool '{tool}' does not belong to module '{module}'")]
  ForeignTool { module: String, tool: String },
  #[error("{0}")]
  InvalidDescription(String),
}

impl AppError for ModuleRouteError {
  fn error_type(&self) -> ErrorType {
    match self {
      ModuleRouteError::UnknownModule(_) => ErrorType::NotFound,
      ModuleRouteError::NotLinked(_) => ErrorType::BadRequest,
      ModuleRouteError::ForeignTool { .. } => ErrorType::BadRequest,
      ModuleRouteError::InvalidDescription(_) => ErrorType::Validation,
    }
  }

  fn code(&self) -> String {
    match self {
      ModuleRouteError::UnknownModule(_) => "UNKNOWN_MODULE".to_string(),
      ModuleRouteError::NotLinked(_) => "MODULE_NOT_LINKED".to_string(),
      ModuleRouteError::ForeignTool { .. } => "FOREIGN_TOOL".to_string(),
      ModuleRouteError::InvalidDescription(_) => "INVALID_DESCRIPTION".to_string(),
    }
  }
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ModuleConfigResponse {
  pub modules: Vec<ModuleConfigDto>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ModuleConfigDto {
  pub module: String,
  pub status: ModuleStatus,
  pub description: String,
  pub linked: bool,
  pub tools: Vec<ToolConfigDto>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ToolConfigDto {
  pub id: String,
  pub name: String,
  pub description: Option<String>,
  pub annotations: ToolAnnotations,
  pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UpdateToolsRequest {
  #[serde(default)]
  pub enabled_tools: Vec<String>,
  #[serde(default)]
  pub disabled_tools: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UpdateDescriptionRequest {
  pub description: String,
}

/// Full per-user module configuration: every registered module, whether a
/// credential is linked, and the user's current tool toggles.
pub async fn modules_config_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
) -> Result<Json<ModuleConfigResponse>, ApiError> {
  let app_service = state.app_service();
  let db_service = app_service.db_service();

  let linked: HashMap<String, ()> = db_service
    .list_credentials(&ctx.user_id)
    .await?
    .into_iter()
    .map(|row| (row.module_name, ()))
    .collect();
  let settings: HashMap<String, bool> = db_service
    .list_tool_settings(&ctx.user_id)
    .await?
    .into_iter()
    .map(|s| (s.tool_id, s.enabled))
    .collect();

  let mut modules = Vec::new();
  for definition in state.registry().definitions() {
    let description = ctx
      .module_descriptions
      .get(&definition.name)
      .cloned()
      .or_else(|| {
        definition
          .description(DEFAULT_LANGUAGE)
          .map(ToString::to_string)
      })
      .unwrap_or_default();
    let tools = definition
      .tools
      .iter()
      .map(|tool| {
        let id = tool.id(&definition.name);
        ToolConfigDto {
          enabled: settings.get(&id).copied().unwrap_or(false),
          id,
          name: tool.name.clone(),
          description: tool.description(DEFAULT_LANGUAGE).map(ToString::to_string),
          annotations: tool.annotations.clone(),
        }
      })
      .collect();
    modules.push(ModuleConfigDto {
      module: definition.name.clone(),
      status: definition.status,
      description,
      linked: linked.contains_key(&definition.name),
      tools,
    });
  }
  Ok(Json(ModuleConfigResponse { modules }))
}

pub async fn update_module_tools_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  Path(name): Path<String>,
  WithRejection(Json(payload), _): WithRejection<Json<UpdateToolsRequest>, ApiError>,
) -> Result<Json<ModuleConfigResponse>, ApiError> {
  let handler = state
    .registry()
    .get(&name)
    .ok_or_else(|| ModuleRouteError::UnknownModule(name.clone()))?;
  let definition = handler.definition();

  let known: Vec<String> = definition.tool_ids();
  for tool_id in payload.enabled_tools.iter().chain(&payload.disabled_tools) {
    if !known.contains(tool_id) {
      return Err(
        ModuleRouteError::ForeignTool {
          module: name.clone(),
          tool: tool_id.clone(),
        }
        .into(),
      );
    }
  }

  let app_service = state.app_service();
  let db_service = app_service.db_service();
  // settings rows exist only once a credential was linked
  if db_service
    .get_credential(&ctx.user_id, &name)
    .await?
    .is_none()
  {
    return Err(ModuleRouteError::NotLinked(name).into());
  }

  db_service
    .set_tools_enabled(
      &ctx.user_id,
      &name,
      &payload.enabled_tools,
      &payload.disabled_tools,
    )
    .await?;

  modules_config_handler(State(state), Extension(ctx)).await
}

pub async fn update_module_description_handler(
  State(state): State<Arc<dyn RouterState>>,
  Extension(ctx): Extension<UserContext>,
  Path(name): Path<String>,
  WithRejection(Json(payload), _): WithRejection<Json<UpdateDescriptionRequest>, ApiError>,
) -> Result<Json<ModuleSetting>, ApiError> {
  if state.registry().get(&name).is_none() {
    return Err(ModuleRouteError::UnknownModule(name).into());
  }
  validate_module_description(&payload.description)
    .map_err(ModuleRouteError::InvalidDescription)?;

  let setting = ModuleSetting {
    user_id: ctx.user_id.clone(),
    module_name: name,
    description: payload.description,
  };
  state
    .app_service()
    .db_service()
    .upsert_module_setting(&setting)
    .await?;
  Ok(Json(setting))
}

#[cfg(test)]
mod tests {
  use crate::test_utils::{authed_router, body_json, send};
  use axum::body::Body;
  use axum::http::{Request, StatusCode};
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use serde_json::json;

  async fn link_notion(router: &axum::Router) -> anyhow::Result<()> {
    let response = send(
      router,
      Request::put("/v1/me/credentials/notion")
        .header("content-type", "application/json")
        .body(Body::from(
          json!({"auth_type": "api_key", "access_token": "sk"}).to_string(),
        ))?,
    )
    .await?;
    assert_eq!(StatusCode::CREATED, response.status());
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_config_lists_all_registered_modules() -> anyhow::Result<()> {
    let (router, _user, _harness) = authed_router().await;
    let response = send(
      &router,
      Request::get("/v1/me/modules/config").body(Body::empty())?,
    )
    .await?;
    let body = body_json(response).await?;
    let modules = body["modules"].as_array().unwrap();
    assert_eq!(2, modules.len());
    assert_eq!(false, modules[0]["linked"]);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_toggle_tools_after_link() -> anyhow::Result<()> {
    let (router, _user, _harness) = authed_router().await;
    link_notion(&router).await?;

    let response = send(
      &router,
      Request::put("/v1/me/modules/notion/tools")
        .header("content-type", "application/json")
        .body(Body::from(
          json!({"enabled_tools": ["notion:delete_page"], "disabled_tools": ["notion:search"]})
            .to_string(),
        ))?,
    )
    .await?;
    assert_eq!(StatusCode::OK, response.status());
    let body = body_json(response).await?;
    let notion = body["modules"]
      .as_array()
      .unwrap()
      .iter()
      .find(|m| m["module"] == "notion")
      .unwrap()
      .clone();
    let tool = |id: &str| {
      notion["tools"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["id"] == id)
        .unwrap()["enabled"]
        .clone()
    };
    assert_eq!(json!(true), tool("notion:delete_page"));
    assert_eq!(json!(false), tool("notion:search"));
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_toggle_without_link_rejected() -> anyhow::Result<()> {
    let (router, _user, _harness) = authed_router().await;
    let response = send(
      &router,
      Request::put("/v1/me/modules/notion/tools")
        .header("content-type", "application/json")
        .body(Body::from(json!({"enabled_tools": ["notion:search"]}).to_string()))?,
    )
    .await?;
    assert_eq!(StatusCode::BAD_REQUEST, response.status());
    let body = body_json(response).await?;
    assert_eq!("MODULE_NOT_LINKED", body["error"]);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_foreign_tool_rejected() -> anyhow::Result<()> {
    let (router, _user, _harness) = authed_router().await;
    link_notion(&router).await?;
    let response = send(
      &router,
      Request::put("/v1/me/modules/notion/tools")
        .header("content-type", "application/json")
        .body(Body::from(json!({"enabled_tools": ["github:get_repo"]}).to_string()))?,
    )
    .await?;
    assert_eq!(StatusCode::BAD_REQUEST, response.status());
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_description_length_enforced() -> anyhow::Result<()> {
    let (router, _user, _harness) = authed_router().await;
    let response = send(
      &router,
      Request::put("/v1/me/modules/notion/description")
        .header("content-type", "application/json")
        .body(Body::from(json!({"description": "a".repeat(257)}).to_string()))?,
    )
    .await?;
    assert_eq!(StatusCode::BAD_REQUEST, response.status());

    let response = send(
      &router,
      Request::put("/v1/me/modules/notion/description")
        .header("content-type", "application/json")
        .body(Body::from(json!({"description": "my notes"}).to_string()))?,
    )
    .await?;
    assert_eq!(StatusCode::OK, response.status());
    Ok(())
  }
}
