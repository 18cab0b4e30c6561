use crate::db::{
  ApiKeyRepository, CredentialRepository, DbError, ModuleRepository, PromptRepository,
  TimeService, ToolSettingRepository, UsageRepository, UserRepository,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Super-trait combining all repository sub-traits. Any type implementing all
/// sub-traits implements DbService via the blanket impl below.
pub trait DbService:
  UserRepository
  + CredentialRepository
  + ToolSettingRepository
  + ApiKeyRepository
  + UsageRepository
  + PromptRepository
  + ModuleRepository
  + Send
  + Sync
  + std::fmt::Debug
{
}

impl<T> DbService for T where
  T: UserRepository
    + CredentialRepository
    + ToolSettingRepository
    + ApiKeyRepository
    + UsageRepository
    + PromptRepository
    + ModuleRepository
    + Send
    + Sync
    + std::fmt::Debug
{
}

#[derive(Debug, Clone)]
pub struct SqliteDbService {
  pub(crate) pool: SqlitePool,
  pub(crate) time_service: Arc<dyn TimeService>,
}

impl SqliteDbService {
  pub fn new(pool: SqlitePool, time_service: Arc<dyn TimeService>) -> Self {
    Self { pool, time_service }
  }

  pub async fn migrate(&self) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(&self.pool).await?;
    Ok(())
  }
}
