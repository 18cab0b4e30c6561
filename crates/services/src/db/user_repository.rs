use crate::db::{DbError, SqliteDbService};
use chrono::{DateTime, Utc};
use objs::{AccountStatus, ModuleSetting, Plan, ToolSetting, User, UserRole};
use sqlx::query_as;
use std::str::FromStr;
use uuid::Uuid;

type UserTuple = (
  String,
  String,
  String,
  String,
  String,
  String,
  String,
  DateTime<Utc>,
  DateTime<Utc>,
);

fn user_from_tuple(row: UserTuple) -> Result<User, DbError> {
  let (id, external_id, email, account_status, plan_id, role, settings, created_at, updated_at) =
    row;
  let account_status = AccountStatus::from_str(&account_status)
    .map_err(|_| DbError::Corrupt(format!("unknown account status: {account_status}")))?;
  let role = UserRole::from_str(&role)
    .map_err(|_| DbError::Corrupt(format!("unknown role: {role}")))?;
  let settings = serde_json::from_str(&settings).unwrap_or(serde_json::Value::Null);
  Ok(User {
    id,
    external_id,
    email,
    account_status,
    plan_id,
    role,
    settings,
    created_at,
    updated_at,
  })
}

const SELECT_USER: &str = r#"
  SELECT
    id, external_id, email, account_status, plan_id, role, settings,
    created_at, updated_at
  FROM users
"#;

/// Everything the authorizer reads for one request, taken in a single
/// transaction so concurrent credential or tool-setting writes cannot
/// produce a torn view.
#[derive(Debug, Clone, PartialEq)]
pub struct UserContextSnapshot {
  pub user: User,
  pub plan: Option<Plan>,
  pub daily_used: i64,
  pub tool_settings: Vec<ToolSetting>,
  pub module_settings: Vec<ModuleSetting>,
}

#[async_trait::async_trait]
pub trait UserRepository: Send + Sync + std::fmt::Debug {
  /// Idempotent registration: creates the user on first sight of an external
  /// id, otherwise returns the existing row unchanged.
  async fn upsert_user_by_external_id(
    &self,
    external_id: &str,
    email: &str,
  ) -> Result<User, DbError>;

  async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, DbError>;

  async fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>, DbError>;

  async fn update_user_settings(
    &self,
    user_id: &str,
    settings: &serde_json::Value,
  ) -> Result<(), DbError>;

  async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>, DbError>;

  /// One-transaction read of profile, plan, usage count over
  /// `[day_start, day_end)` and the user's tool/module settings. Returns
  /// None when the user does not exist.
  async fn load_user_context_snapshot(
    &self,
    user_id: &str,
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
  ) -> Result<Option<UserContextSnapshot>, DbError>;
}

#[async_trait::async_trait]
impl UserRepository for SqliteDbService {
  async fn upsert_user_by_external_id(
    &self,
    external_id: &str,
    email: &str,
  ) -> Result<User, DbError> {
    if let Some(existing) = self.get_user_by_external_id(external_id).await? {
      return Ok(existing);
    }

    let now = self.time_service.utc_now();
    let id = Uuid::new_v4().to_string();
    // Concurrent first-auth races resolve through the UNIQUE constraint on
    // external_id; the loser re-reads the winner's row.
    sqlx::query(
      r#"
      INSERT OR IGNORE INTO users
        (id, external_id, email, account_status, plan_id, role, settings, created_at, updated_at)
      VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&id)
    .bind(external_id)
    .bind(email)
    .bind(AccountStatus::Active.to_string())
    .bind("free")
    .bind(UserRole::User.to_string())
    .bind("{}")
    .bind(now)
    .bind(now)
    .execute(&self.pool)
    .await?;

    self
      .get_user_by_external_id(external_id)
      .await?
      .ok_or_else(|| DbError::Corrupt(format!("user vanished after upsert: {external_id}")))
  }

  async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, DbError> {
    let row = query_as::<_, UserTuple>(&format!("{SELECT_USER} WHERE id = ?"))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    row.map(user_from_tuple).transpose()
  }

  async fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>, DbError> {
    let row = query_as::<_, UserTuple>(&format!("{SELECT_USER} WHERE external_id = ?"))
      .bind(external_id)
      .fetch_optional(&self.pool)
      .await?;
    row.map(user_from_tuple).transpose()
  }

  async fn update_user_settings(
    &self,
    user_id: &str,
    settings: &serde_json::Value,
  ) -> Result<(), DbError> {
    let now = self.time_service.utc_now();
    sqlx::query("UPDATE users SET settings = ?, updated_at = ? WHERE id = ?")
      .bind(settings.to_string())
      .bind(now)
      .bind(user_id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>, DbError> {
    let row = query_as::<_, (String, String, i64)>(
      "SELECT id, name, daily_limit FROM plans WHERE id = ?",
    )
    .bind(plan_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row.map(|(id, name, daily_limit)| Plan {
      id,
      name,
      daily_limit,
    }))
  }

  async fn load_user_context_snapshot(
    &self,
    user_id: &str,
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
  ) -> Result<Option<UserContextSnapshot>, DbError> {
    let mut tx = self.pool.begin().await?;

    let user_row = query_as::<_, UserTuple>(&format!("{SELECT_USER} WHERE id = ?"))
      .bind(user_id)
      .fetch_optional(&mut *tx)
      .await?;
    let Some(user_row) = user_row else {
      tx.commit().await?;
      return Ok(None);
    };
    let user = user_from_tuple(user_row)?;

    let plan = query_as::<_, (String, String, i64)>(
      "SELECT id, name, daily_limit FROM plans WHERE id = ?",
    )
    .bind(&user.plan_id)
    .fetch_optional(&mut *tx)
    .await?
    .map(|(id, name, daily_limit)| Plan {
      id,
      name,
      daily_limit,
    });

    let daily_used = sqlx::query_scalar::<_, i64>(
      r#"
      SELECT COUNT(*) FROM usage_records
      WHERE user_id = ? AND created_at >= ? AND created_at < ?
      "#,
    )
    .bind(user_id)
    .bind(day_start)
    .bind(day_end)
    .fetch_one(&mut *tx)
    .await?;

    let tool_settings = query_as::<_, (String, String, String, bool)>(
      r#"
      SELECT user_id, module_name, tool_id, enabled
      FROM tool_settings
      WHERE user_id = ?
      ORDER BY module_name, tool_id
      "#,
    )
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .map(|(user_id, module_name, tool_id, enabled)| ToolSetting {
      user_id,
      module_name,
      tool_id,
      enabled,
    })
    .collect();

    let module_settings = query_as::<_, (String, String, String)>(
      r#"
      SELECT user_id, module_name, description
      FROM module_settings
      WHERE user_id = ?
      ORDER BY module_name
      "#,
    )
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .map(|(user_id, module_name, description)| ModuleSetting {
      user_id,
      module_name,
      description,
    })
    .collect();

    tx.commit().await?;
    Ok(Some(UserContextSnapshot {
      user,
      plan,
      daily_used,
      tool_settings,
      module_settings,
    }))
  }
}
