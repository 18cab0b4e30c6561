use crate::db::{DbError, SqliteDbService};
use objs::ModuleDef;

#[async_trait::async_trait]
pub trait ModuleRepository: Send + Sync + std::fmt::Debug {
  /// Boot-time sync of registry metadata so the console can render tool
  /// descriptors without calling the server.
  async fn upsert_module_meta(&self, module: &ModuleDef) -> Result<(), DbError>;

  async fn list_module_meta(&self) -> Result<Vec<ModuleDef>, DbError>;
}

#[async_trait::async_trait]
impl ModuleRepository for SqliteDbService {
  async fn upsert_module_meta(&self, module: &ModuleDef) -> Result<(), DbError> {
    let meta = serde_json::to_string(module)
      .map_err(|e| DbError::Corrupt(format!("unserializable module meta: {e}")))?;
    let now = self.time_service.utc_now();
    sqlx::query(
      r#"
      INSERT INTO modules (name, status, meta, updated_at)
      VALUES (?, ?, ?, ?)
      ON CONFLICT (name)
      DO UPDATE SET status = excluded.status,
                    meta = excluded.meta,
                    updated_at = excluded.updated_at
      "#,
    )
    .bind(&module.name)
    .bind(module.status.to_string())
    .bind(meta)
    .bind(now)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn list_module_meta(&self) -> Result<Vec<ModuleDef>, DbError> {
    let rows = sqlx::query_as::<_, (String,)>("SELECT meta FROM modules ORDER BY name")
      .fetch_all(&self.pool)
      .await?;
    rows
      .into_iter()
      .map(|(meta,)| {
        serde_json::from_str(&meta)
          .map_err(|e| DbError::Corrupt(format!("malformed module meta: {e}")))
      })
      .collect()
  }
}
