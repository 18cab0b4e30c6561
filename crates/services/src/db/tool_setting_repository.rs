use crate::db::{DbError, SqliteDbService};
use objs::{ModuleSetting, ToolSetting};
use sqlx::query_as;

#[async_trait::async_trait]
pub trait ToolSettingRepository: Send + Sync + std::fmt::Debug {
  async fn list_tool_settings(&self, user_id: &str) -> Result<Vec<ToolSetting>, DbError>;

  async fn list_tool_settings_for_module(
    &self,
    user_id: &str,
    module_name: &str,
  ) -> Result<Vec<ToolSetting>, DbError>;

  /// Flips enablement for the given tool ids. Rows are updated in place;
  /// tool ids without an existing row are ignored (settings exist only for
  /// modules the user has linked).
  async fn set_tools_enabled(
    &self,
    user_id: &str,
    module_name: &str,
    enabled: &[String],
    disabled: &[String],
  ) -> Result<(), DbError>;

  async fn upsert_module_setting(&self, setting: &ModuleSetting) -> Result<(), DbError>;

  async fn list_module_settings(&self, user_id: &str) -> Result<Vec<ModuleSetting>, DbError>;
}

#[async_trait::async_trait]
impl ToolSettingRepository for SqliteDbService {
  async fn list_tool_settings(&self, user_id: &str) -> Result<Vec<ToolSetting>, DbError> {
    let rows = query_as::<_, (String, String, String, bool)>(
      r#"
      SELECT user_id, module_name, tool_id, enabled
      FROM tool_settings
      WHERE user_id = ?
      ORDER BY module_name, tool_id
      "#,
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(
      rows
        .into_iter()
        .map(|(user_id, module_name, tool_id, enabled)| ToolSetting {
          user_id,
          module_name,
          tool_id,
          enabled,
        })
        .collect(),
    )
  }

  async fn list_tool_settings_for_module(
    &self,
    user_id: &str,
    module_name: &str,
  ) -> Result<Vec<ToolSetting>, DbError> {
    let rows = query_as::<_, (String, String, String, bool)>(
      r#"
      SELECT user_id, module_name, tool_id, enabled
      FROM tool_settings
      WHERE user_id = ? AND module_name = ?
      ORDER BY tool_id
      "#,
    )
    .bind(user_id)
    .bind(module_name)
    .fetch_all(&self.pool)
    .await?;
    Ok(
      rows
        .into_iter()
        .map(|(user_id, module_name, tool_id, enabled)| ToolSetting {
          user_id,
          module_name,
          tool_id,
          enabled,
        })
        .collect(),
    )
  }

  async fn set_tools_enabled(
    &self,
    user_id: &str,
    module_name: &str,
    enabled: &[String],
    disabled: &[String],
  ) -> Result<(), DbError> {
    let mut tx = self.pool.begin().await?;
    for (tool_ids, value) in [(enabled, true), (disabled, false)] {
      for tool_id in tool_ids {
        sqlx::query(
          r#"
          UPDATE tool_settings
          SET enabled = ?
          WHERE user_id = ? AND module_name = ? AND tool_id = ?
          "#,
        )
        .bind(value)
        .bind(user_id)
        .bind(module_name)
        .bind(tool_id)
        .execute(&mut *tx)
        .await?;
      }
    }
    tx.commit().await?;
    Ok(())
  }

  async fn upsert_module_setting(&self, setting: &ModuleSetting) -> Result<(), DbError> {
    sqlx::query(
      r#"
      INSERT INTO module_settings (user_id, module_name, description)
      VALUES (?, ?, ?)
      ON CONFLICT (user_id, module_name)
      DO UPDATE SET description = excluded.description
      "#,
    )
    .bind(&setting.user_id)
    .bind(&setting.module_name)
    .bind(&setting.description)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn list_module_settings(&self, user_id: &str) -> Result<Vec<ModuleSetting>, DbError> {
    let rows = query_as::<_, (String, String, String)>(
      r#"
      SELECT user_id, module_name, description
      FROM module_settings
      WHERE user_id = ?
      ORDER BY module_name
      "#,
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(
      rows
        .into_iter()
        .map(|(user_id, module_name, description)| ModuleSetting {
          user_id,
          module_name,
          description,
        })
        .collect(),
    )
  }
}
