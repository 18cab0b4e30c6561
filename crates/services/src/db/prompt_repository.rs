use crate::db::{DbError, SqliteDbService};
use chrono::{DateTime, Utc};
use objs::Prompt;
use sqlx::query_as;

type PromptTuple = (
  String,
  String,
  Option<String>,
  String,
  Option<String>,
  String,
  bool,
  DateTime<Utc>,
  DateTime<Utc>,
);

fn prompt_from_tuple(row: PromptTuple) -> Prompt {
  let (id, user_id, module_name, name, description, content, enabled, created_at, updated_at) =
    row;
  Prompt {
    id,
    user_id,
    module_name,
    name,
    description,
    content,
    enabled,
    created_at,
    updated_at,
  }
}

const SELECT_PROMPT: &str = r#"
  SELECT id, user_id, module_name, name, description, content, enabled, created_at, updated_at
  FROM prompts
"#;

#[async_trait::async_trait]
pub trait PromptRepository: Send + Sync + std::fmt::Debug {
  async fn create_prompt(&self, prompt: &Prompt) -> Result<(), DbError>;

  async fn list_prompts(&self, user_id: &str) -> Result<Vec<Prompt>, DbError>;

  async fn get_prompt(&self, user_id: &str, id: &str) -> Result<Option<Prompt>, DbError>;

  async fn get_prompt_by_name(
    &self,
    user_id: &str,
    name: &str,
  ) -> Result<Option<Prompt>, DbError>;

  async fn update_prompt(&self, prompt: &Prompt) -> Result<(), DbError>;

  async fn delete_prompt(&self, user_id: &str, id: &str) -> Result<bool, DbError>;
}

#[async_trait::async_trait]
impl PromptRepository for SqliteDbService {
  async fn create_prompt(&self, prompt: &Prompt) -> Result<(), DbError> {
    sqlx::query(
      r#"
      INSERT INTO prompts
        (id, user_id, module_name, name, description, content, enabled, created_at, updated_at)
      VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&prompt.id)
    .bind(&prompt.user_id)
    .bind(&prompt.module_name)
    .bind(&prompt.name)
    .bind(&prompt.description)
    .bind(&prompt.content)
    .bind(prompt.enabled)
    .bind(prompt.created_at)
    .bind(prompt.updated_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn list_prompts(&self, user_id: &str) -> Result<Vec<Prompt>, DbError> {
    let rows = query_as::<_, PromptTuple>(&format!(
      "{SELECT_PROMPT} WHERE user_id = ? ORDER BY name"
    ))
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(prompt_from_tuple).collect())
  }

  async fn get_prompt(&self, user_id: &str, id: &str) -> Result<Option<Prompt>, DbError> {
    let row = query_as::<_, PromptTuple>(&format!(
      "{SELECT_PROMPT} WHERE user_id = ? AND id = ?"
    ))
    .bind(user_id)
    .bind(id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row.map(prompt_from_tuple))
  }

  async fn get_prompt_by_name(
    &self,
    user_id: &str,
    name: &str,
  ) -> Result<Option<Prompt>, DbError> {
    let row = query_as::<_, PromptTuple>(&format!(
      "{SELECT_PROMPT} WHERE user_id = ? AND name = ?"
    ))
    .bind(user_id)
    .bind(name)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row.map(prompt_from_tuple))
  }

  async fn update_prompt(&self, prompt: &Prompt) -> Result<(), DbError> {
    let now = self.time_service.utc_now();
    let result = sqlx::query(
      r#"
      UPDATE prompts
      SET module_name = ?, name = ?, description = ?, content = ?, enabled = ?, updated_at = ?
      WHERE user_id = ? AND id = ?
      "#,
    )
    .bind(&prompt.module_name)
    .bind(&prompt.name)
    .bind(&prompt.description)
    .bind(&prompt.content)
    .bind(prompt.enabled)
    .bind(now)
    .bind(&prompt.user_id)
    .bind(&prompt.id)
    .execute(&self.pool)
    .await?;
    if result.rows_affected() == 0 {
      return Err(DbError::Sqlx(sqlx::Error::RowNotFound));
    }
    Ok(())
  }

  async fn delete_prompt(&self, user_id: &str, id: &str) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM prompts WHERE user_id = ? AND id = ?")
      .bind(user_id)
      .bind(id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }
}
