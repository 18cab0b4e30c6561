use crate::db::{DbError, SqliteDbService};
use chrono::{DateTime, Utc};
use objs::ApiKey;
use sqlx::query_as;

type ApiKeyTuple = (
  String,
  String,
  String,
  String,
  String,
  Option<DateTime<Utc>>,
  Option<DateTime<Utc>>,
  DateTime<Utc>,
);

fn api_key_from_tuple(row: ApiKeyTuple) -> ApiKey {
  let (id, user_id, jwt_kid, key_prefix, display_name, expires_at, last_used_at, created_at) = row;
  ApiKey {
    id,
    user_id,
    jwt_kid,
    key_prefix,
    display_name,
    expires_at,
    last_used_at,
    created_at,
  }
}

const SELECT_API_KEY: &str = r#"
  SELECT id, user_id, jwt_kid, key_prefix, display_name, expires_at, last_used_at, created_at
  FROM api_keys
"#;

#[async_trait::async_trait]
pub trait ApiKeyRepository: Send + Sync + std::fmt::Debug {
  async fn create_api_key(&self, key: &ApiKey) -> Result<(), DbError>;

  async fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKey>, DbError>;

  async fn get_api_key(&self, user_id: &str, id: &str) -> Result<Option<ApiKey>, DbError>;

  /// Unscoped lookup used by the gateway's revocation check.
  async fn get_api_key_by_id(&self, id: &str) -> Result<Option<ApiKey>, DbError>;

  /// Returns true when a row was deleted.
  async fn delete_api_key(&self, user_id: &str, id: &str) -> Result<bool, DbError>;

  async fn touch_api_key_last_used(
    &self,
    id: &str,
    at: DateTime<Utc>,
  ) -> Result<(), DbError>;
}

#[async_trait::async_trait]
impl ApiKeyRepository for SqliteDbService {
  async fn create_api_key(&self, key: &ApiKey) -> Result<(), DbError> {
    sqlx::query(
      r#"
      INSERT INTO api_keys
        (id, user_id, jwt_kid, key_prefix, display_name, expires_at, last_used_at, created_at)
      VALUES (?, ?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&key.id)
    .bind(&key.user_id)
    .bind(&key.jwt_kid)
    .bind(&key.key_prefix)
    .bind(&key.display_name)
    .bind(key.expires_at)
    .bind(key.last_used_at)
    .bind(key.created_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKey>, DbError> {
    let rows = query_as::<_, ApiKeyTuple>(&format!(
      "{SELECT_API_KEY} WHERE user_id = ? ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(api_key_from_tuple).collect())
  }

  async fn get_api_key(&self, user_id: &str, id: &str) -> Result<Option<ApiKey>, DbError> {
    let row = query_as::<_, ApiKeyTuple>(&format!(
      "{SELECT_API_KEY} WHERE user_id = ? AND id = ?"
    ))
    .bind(user_id)
    .bind(id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row.map(api_key_from_tuple))
  }

  async fn get_api_key_by_id(&self, id: &str) -> Result<Option<ApiKey>, DbError> {
    let row = query_as::<_, ApiKeyTuple>(&format!("{SELECT_API_KEY} WHERE id = ?"))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(row.map(api_key_from_tuple))
  }

  async fn delete_api_key(&self, user_id: &str, id: &str) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM api_keys WHERE user_id = ? AND id = ?")
      .bind(user_id)
      .bind(id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  async fn touch_api_key_last_used(
    &self,
    id: &str,
    at: DateTime<Utc>,
  ) -> Result<(), DbError> {
    sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
      .bind(at)
      .bind(id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}
