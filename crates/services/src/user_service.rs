use crate::db::{DbError, DbService, TimeService, UserRepository};
use chrono::Duration;
use objs::{to_tool_settings_map, AppError, ErrorType, GatewayClaims, User, UserContext};
use std::collections::HashMap;
use std::sync::Arc;

/// Daily limit applied when a user's plan row is missing; deliberately tight.
const FALLBACK_DAILY_LIMIT: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
  #[error("user '{0}' not found")]
  UserNotFound(String),
  #[error("gateway token carries neither user_id nor external_id")]
  MissingIdentity,
  #[error(transparent)]
  Db(#[from] DbError),
}

impl AppError for UserServiceError {
  fn error_type(&self) -> ErrorType {
    match self {
      UserServiceError::UserNotFound(_) => ErrorType::Authentication,
      UserServiceError::MissingIdentity => ErrorType::Authentication,
      UserServiceError::Db(e) => e.error_type(),
    }
  }

  fn code(&self) -> String {
    match self {
      UserServiceError::UserNotFound(_) => "USER_NOT_FOUND".to_string(),
      UserServiceError::MissingIdentity => "INVALID_GATEWAY_TOKEN".to_string(),
      UserServiceError::Db(e) => e.code(),
    }
  }
}

type Result<T> = std::result::Result<T, UserServiceError>;

#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait::async_trait]
pub trait UserService: Send + Sync + std::fmt::Debug {
  /// Idempotent registration keyed by external id.
  async fn register(&self, external_id: &str, email: &str) -> Result<User>;

  /// Maps verified gateway claims to the internal user id. The API-key path
  /// carries `user_id` directly; the JWT path upserts by external id.
  async fn resolve_user_id(&self, claims: &GatewayClaims) -> Result<String>;

  async fn get_user(&self, user_id: &str) -> Result<User>;

  /// Loads the per-request authorization context: profile, plan limit,
  /// today's usage and the enabled-tool map.
  async fn load_user_context(&self, user_id: &str, request_id: &str) -> Result<UserContext>;
}

#[derive(Debug)]
pub struct DefaultUserService {
  db_service: Arc<dyn DbService>,
  time_service: Arc<dyn TimeService>,
  console_url: Option<String>,
}

impl DefaultUserService {
  pub fn new(
    db_service: Arc<dyn DbService>,
    time_service: Arc<dyn TimeService>,
    console_url: Option<String>,
  ) -> Self {
    Self {
      db_service,
      time_service,
      console_url,
    }
  }
}

#[async_trait::async_trait]
impl UserService for DefaultUserService {
  async fn register(&self, external_id: &str, email: &str) -> Result<User> {
    Ok(
      self
        .db_service
        .upsert_user_by_external_id(external_id, email)
        .await?,
    )
  }

  async fn resolve_user_id(&self, claims: &GatewayClaims) -> Result<String> {
    if let Some(user_id) = &claims.user_id {
      return Ok(user_id.clone());
    }
    let Some(external_id) = &claims.external_id else {
      return Err(UserServiceError::MissingIdentity);
    };
    let email = claims.email.as_deref().unwrap_or_default();
    let user = self
      .db_service
      .upsert_user_by_external_id(external_id, email)
      .await?;
    Ok(user.id)
  }

  async fn get_user(&self, user_id: &str) -> Result<User> {
    self
      .db_service
      .get_user_by_id(user_id)
      .await?
      .ok_or_else(|| UserServiceError::UserNotFound(user_id.to_string()))
  }

  async fn load_user_context(&self, user_id: &str, request_id: &str) -> Result<UserContext> {
    let today = self.time_service.utc_now().date_naive();
    let day_start = today.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc();

    // profile, plan, today's usage and settings are read in one transaction;
    // a credential upsert racing this load cannot produce a torn context
    let snapshot = self
      .db_service
      .load_user_context_snapshot(user_id, day_start, day_start + Duration::days(1))
      .await?
      .ok_or_else(|| UserServiceError::UserNotFound(user_id.to_string()))?;
    let user = snapshot.user;

    let daily_limit = match snapshot.plan {
      Some(plan) => plan.daily_limit,
      None => {
        tracing::warn!(plan_id = %user.plan_id, "plan not found, applying fallback limit");
        FALLBACK_DAILY_LIMIT
      }
    };

    // a module stays listed (possibly with zero enabled tools) as long as the
    // user has settings rows for it, so a fully-disabled module reports
    // TOOL_DISABLED rather than MODULE_NOT_ENABLED
    let mut enabled_tools: HashMap<String, Vec<String>> = HashMap::new();
    for (module, tools) in to_tool_settings_map(&snapshot.tool_settings) {
      let mut enabled: Vec<String> = tools
        .into_iter()
        .filter_map(|(tool_id, enabled)| enabled.then_some(tool_id))
        .collect();
      enabled.sort();
      enabled_tools.insert(module, enabled);
    }

    let module_descriptions = snapshot
      .module_settings
      .into_iter()
      .map(|s| (s.module_name, s.description))
      .collect();

    Ok(UserContext {
      user_id: user.id,
      account_status: user.account_status,
      role: user.role,
      plan_id: user.plan_id,
      daily_used: snapshot.daily_used,
      daily_limit,
      enabled_tools,
      module_descriptions,
      request_id: request_id.to_string(),
      console_url: self.console_url.clone(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::{DefaultUserService, UserService, UserServiceError};
  use crate::db::{CredentialRepository, DbService, ToolSettingRepository, UsageRepository};
  use crate::test_utils::{seed_user, test_db_service};
  use chrono::Utc;
  use objs::{
    CredentialRow, GatewayClaims, MetaTool, ModuleSetting, ToolSetting, UsageDetail, UsageRecord,
  };
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use std::sync::Arc;

  fn service(db: Arc<dyn DbService>) -> DefaultUserService {
    DefaultUserService::new(
      db,
      Arc::new(crate::db::DefaultTimeService),
      Some("https://console.test".to_string()),
    )
  }

  #[rstest]
  #[tokio::test]
  async fn test_resolve_user_id_prefers_direct_claim() -> anyhow::Result<()> {
    let db = test_db_service().await;
    let service = service(Arc::new((*db).clone()));
    let claims = GatewayClaims::for_user_id("direct-id", Utc::now());
    assert_eq!("direct-id", service.resolve_user_id(&claims).await?);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_resolve_user_id_upserts_external() -> anyhow::Result<()> {
    let db = test_db_service().await;
    let service = service(Arc::new((*db).clone()));
    let claims =
      GatewayClaims::for_external_id("idp|new", Some("new@example.com".to_string()), Utc::now());

    let first = service.resolve_user_id(&claims).await?;
    let second = service.resolve_user_id(&claims).await?;
    assert_eq!(first, second);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_resolve_user_id_no_identity_rejected() -> anyhow::Result<()> {
    let db = test_db_service().await;
    let service = service(Arc::new((*db).clone()));
    let mut claims = GatewayClaims::for_user_id("x", Utc::now());
    claims.user_id = None;
    assert!(matches!(
      service.resolve_user_id(&claims).await,
      Err(UserServiceError::MissingIdentity)
    ));
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_load_user_context_assembles_all_parts() -> anyhow::Result<()> {
    let db = test_db_service().await;
    let user = seed_user(&db, "alice").await;
    let db_arc: Arc<dyn DbService> = Arc::new((*db).clone());

    // linked notion module with one enabled + one disabled tool
    let now = Utc::now();
    db_arc
      .upsert_credential(
        &CredentialRow {
          user_id: user.id.clone(),
          module_name: "notion".to_string(),
          encrypted_blob: "v1:x".to_string(),
          key_version: 1,
          created_at: now,
          updated_at: now,
        },
        &[
          ToolSetting {
            user_id: user.id.clone(),
            module_name: "notion".to_string(),
            tool_id: "notion:search".to_string(),
            enabled: true,
          },
          ToolSetting {
            user_id: user.id.clone(),
            module_name: "notion".to_string(),
            tool_id: "notion:delete_page".to_string(),
            enabled: false,
          },
        ],
      )
      .await?;
    db_arc
      .upsert_module_setting(&ModuleSetting {
        user_id: user.id.clone(),
        module_name: "notion".to_string(),
        description: "my workspace".to_string(),
      })
      .await?;
    // two usage rows today
    for _ in 0..2 {
      db_arc
        .insert_usage_record(&UsageRecord {
          id: uuid::Uuid::new_v4().to_string(),
          user_id: user.id.clone(),
          meta_tool: MetaTool::Run,
          request_id: "r".to_string(),
          details: vec![UsageDetail {
            module: "notion".to_string(),
            tool: "search".to_string(),
            task_id: None,
          }],
          created_at: now,
        })
        .await?;
    }

    let service = service(db_arc);
    let ctx = service.load_user_context(&user.id, "req-42").await?;

    assert_eq!(2, ctx.daily_used);
    assert_eq!(50, ctx.daily_limit);
    assert_eq!(vec!["notion".to_string()], ctx.enabled_modules());
    assert_eq!(
      vec!["notion:search".to_string()],
      ctx.enabled_tools["notion"]
    );
    assert_eq!("my workspace", ctx.module_descriptions["notion"]);
    assert_eq!("req-42", ctx.request_id);
    assert_eq!(Some("https://console.test".to_string()), ctx.console_url);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_load_user_context_unknown_user() -> anyhow::Result<()> {
    let db = test_db_service().await;
    let service = service(Arc::new((*db).clone()));
    assert!(matches!(
      service.load_user_context("ghost", "req").await,
      Err(UserServiceError::UserNotFound(_))
    ));
    Ok(())
  }
}
