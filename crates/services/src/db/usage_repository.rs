use crate::db::{DbError, SqliteDbService};
use chrono::{DateTime, Utc};
use objs::{MetaTool, UsageRecord};
use sqlx::query_as;
use std::str::FromStr;

#[async_trait::async_trait]
pub trait UsageRepository: Send + Sync + std::fmt::Debug {
  async fn insert_usage_record(&self, record: &UsageRecord) -> Result<(), DbError>;

  /// Row count in `[start, end)`; one row per executed sub-task.
  async fn count_usage_in_range(
    &self,
    user_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<i64, DbError>;

  async fn list_usage_in_range(
    &self,
    user_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<UsageRecord>, DbError>;
}

#[async_trait::async_trait]
impl UsageRepository for SqliteDbService {
  async fn insert_usage_record(&self, record: &UsageRecord) -> Result<(), DbError> {
    let details = serde_json::to_string(&record.details)
      .map_err(|e| DbError::Corrupt(format!("unserializable usage details: {e}")))?;
    sqlx::query(
      r#"
      INSERT INTO usage_records (id, user_id, meta_tool, request_id, details, created_at)
      VALUES (?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&record.id)
    .bind(&record.user_id)
    .bind(record.meta_tool.to_string())
    .bind(&record.request_id)
    .bind(details)
    .bind(record.created_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn count_usage_in_range(
    &self,
    user_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
      r#"
      SELECT COUNT(*) FROM usage_records
      WHERE user_id = ? AND created_at >= ? AND created_at < ?
      "#,
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_one(&self.pool)
    .await?;
    Ok(count)
  }

  async fn list_usage_in_range(
    &self,
    user_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<UsageRecord>, DbError> {
    let rows = query_as::<_, (String, String, String, String, String, DateTime<Utc>)>(
      r#"
      SELECT id, user_id, meta_tool, request_id, details, created_at
      FROM usage_records
      WHERE user_id = ? AND created_at >= ? AND created_at < ?
      ORDER BY created_at
      "#,
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(&self.pool)
    .await?;

    rows
      .into_iter()
      .map(|(id, user_id, meta_tool, request_id, details, created_at)| {
        let meta_tool = MetaTool::from_str(&meta_tool)
          .map_err(|_| DbError::Corrupt(format!("unknown meta tool: {meta_tool}")))?;
        let details = serde_json::from_str(&details)
          .map_err(|e| DbError::Corrupt(format!("malformed usage details: {e}")))?;
        Ok(UsageRecord {
          id,
          user_id,
          meta_tool,
          request_id,
          details,
          created_at,
        })
      })
      .collect()
  }
}
