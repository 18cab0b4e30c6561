mod app;
mod envs;

pub use app::*;
pub use envs::*;

use crate::db::{DbPool, SqliteDbService, TimeService};
use chrono::{DateTime, Timelike, Utc};
use objs::User;
use std::sync::Arc;
use tempfile::TempDir;

/// A frozen clock for deterministic repository tests.
#[derive(Debug, Clone)]
pub struct FrozenTimeService(DateTime<Utc>);

impl Default for FrozenTimeService {
  fn default() -> Self {
    let now = Utc::now();
    Self(now.with_nanosecond(0).unwrap_or(now))
  }
}

impl FrozenTimeService {
  pub fn at(instant: DateTime<Utc>) -> Self {
    Self(instant)
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.0
  }
}

impl TimeService for FrozenTimeService {
  fn utc_now(&self) -> DateTime<Utc> {
    self.0
  }
}

/// File-backed sqlite service with migrations applied; the temp dir lives as
/// long as the value.
pub struct TestDbService {
  service: SqliteDbService,
  _temp_dir: TempDir,
}

impl std::ops::Deref for TestDbService {
  type Target = SqliteDbService;

  fn deref(&self) -> &Self::Target {
    &self.service
  }
}

pub async fn test_db_service() -> TestDbService {
  test_db_service_with_time(Arc::new(FrozenTimeService::default())).await
}

pub async fn test_db_service_with_time(time_service: Arc<dyn TimeService>) -> TestDbService {
  let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
  let url = format!("sqlite://{}/test.sqlite", temp_dir.path().display());
  let pool = DbPool::connect(&url).await.expect("failed to open test db");
  let service = SqliteDbService::new(pool, time_service);
  service.migrate().await.expect("migrations failed");
  TestDbService {
    service,
    _temp_dir: temp_dir,
  }
}

pub async fn seed_user(service: &SqliteDbService, tag: &str) -> User {
  use crate::db::UserRepository;
  service
    .upsert_user_by_external_id(&format!("idp|{tag}"), &format!("{tag}@example.com"))
    .await
    .expect("failed to seed user")
}
