use crate::db::{DbError, DbService, TimeService, UsageRepository};
use chrono::{DateTime, NaiveDate, Utc};
use objs::{AppError, ErrorType, MetaTool, UsageDetail, UsagePeriod, UsageRecord, UsageSummary};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum UsageServiceError {
  #[error("invalid usage period: start {start} is not before end {end}")]
  InvalidPeriod { start: NaiveDate, end: NaiveDate },
  #[error(transparent)]
  Db(#[from] DbError),
}

impl AppError for UsageServiceError {
  fn error_type(&self) -> ErrorType {
    match self {
      UsageServiceError::InvalidPeriod { .. } => ErrorType::BadRequest,
      UsageServiceError::Db(e) => e.error_type(),
    }
  }

  fn code(&self) -> String {
    match self {
      UsageServiceError::InvalidPeriod { .. } => "INVALID_PERIOD".to_string(),
      UsageServiceError::Db(e) => e.code(),
    }
  }
}

type Result<T> = std::result::Result<T, UsageServiceError>;

pub trait UsageService: Send + Sync + std::fmt::Debug {
  /// Fire-and-forget append of one usage row. The write runs on a spawned
  /// task off the response path; persistence failure is logged, never
  /// surfaced.
  fn record(
    &self,
    user_id: &str,
    meta_tool: MetaTool,
    request_id: &str,
    details: Vec<UsageDetail>,
  );

  /// Aggregation over `[start, end)`.
  fn usage_summary<'a>(
    &'a self,
    user_id: &'a str,
    start: NaiveDate,
    end: NaiveDate,
  ) -> BoxFuture<'a, Result<UsageSummary>>;
}

/// `record` must stay synchronous so dispatchers can fire it without
/// awaiting; the read side is a boxed future rather than async_trait to keep
/// the trait object-safe alongside it.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

#[derive(Debug)]
pub struct DefaultUsageService {
  db_service: Arc<dyn DbService>,
  time_service: Arc<dyn TimeService>,
}

impl DefaultUsageService {
  pub fn new(db_service: Arc<dyn DbService>, time_service: Arc<dyn TimeService>) -> Self {
    Self {
      db_service,
      time_service,
    }
  }

  fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc();
    let end = start + chrono::Duration::days(1);
    (start, end)
  }
}

impl UsageService for DefaultUsageService {
  fn record(
    &self,
    user_id: &str,
    meta_tool: MetaTool,
    request_id: &str,
    details: Vec<UsageDetail>,
  ) {
    let record = UsageRecord {
      id: Uuid::new_v4().to_string(),
      user_id: user_id.to_string(),
      meta_tool,
      request_id: request_id.to_string(),
      details,
      created_at: self.time_service.utc_now(),
    };
    let db_service = Arc::clone(&self.db_service);
    tokio::spawn(async move {
      if let Err(err) = db_service.insert_usage_record(&record).await {
        tracing::warn!(
          request_id = %record.request_id,
          error = %err,
          "failed to persist usage record"
        );
      }
    });
  }

  fn usage_summary<'a>(
    &'a self,
    user_id: &'a str,
    start: NaiveDate,
    end: NaiveDate,
  ) -> BoxFuture<'a, Result<UsageSummary>> {
    Box::pin(async move {
      if start >= end {
        return Err(UsageServiceError::InvalidPeriod { start, end });
      }
      let range_start = Self::day_bounds(start).0;
      let range_end = Self::day_bounds(end).0;
      let records = self
        .db_service
        .list_usage_in_range(user_id, range_start, range_end)
        .await?;

      let total_used = records.len() as i64;
      let mut by_module: HashMap<String, i64> = HashMap::new();
      for record in &records {
        for detail in &record.details {
          *by_module.entry(detail.module.clone()).or_insert(0) += 1;
        }
      }
      Ok(UsageSummary {
        total_used,
        by_module,
        period: UsagePeriod { start, end },
      })
    })
  }
}

#[cfg(test)]
mod tests {
  use super::{DefaultUsageService, UsageService, UsageServiceError};
  use crate::db::{DbService, UsageRepository};
  use crate::test_utils::{seed_user, test_db_service};
  use chrono::{Duration, NaiveDate, Utc};
  use objs::{MetaTool, UsageDetail};
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use std::sync::Arc;

  fn detail(module: &str, tool: &str) -> UsageDetail {
    UsageDetail {
      module: module.to_string(),
      tool: tool.to_string(),
      task_id: None,
    }
  }

  #[rstest]
  #[tokio::test]
  async fn test_record_appends_row_asynchronously() -> anyhow::Result<()> {
    let db = test_db_service().await;
    let user = seed_user(&db, "alice").await;
    let db_arc: Arc<dyn DbService> = Arc::new((*db).clone());
    let service =
      DefaultUsageService::new(db_arc.clone(), Arc::new(crate::db::DefaultTimeService));

    service.record(&user.id, MetaTool::Run, "req-1", vec![detail("notion", "search")]);

    // the write happens on a spawned task; poll briefly
    let mut count = 0;
    for _ in 0..50 {
      count = db_arc
        .count_usage_in_range(
          &user.id,
          Utc::now() - Duration::hours(1),
          Utc::now() + Duration::hours(1),
        )
        .await?;
      if count > 0 {
        break;
      }
      tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(1, count);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_summary_counts_rows_and_unpacks_details() -> anyhow::Result<()> {
    let db = test_db_service().await;
    let user = seed_user(&db, "alice").await;
    let db_arc: Arc<dyn DbService> = Arc::new((*db).clone());
    let service =
      DefaultUsageService::new(db_arc.clone(), Arc::new(crate::db::DefaultTimeService));

    let today = Utc::now().date_naive();
    for (module, tool, task) in [
      ("notion", "search", None),
      ("notion", "search", Some("t1".to_string())),
      ("github", "get_repo", Some("t2".to_string())),
    ] {
      let record = objs::UsageRecord {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        meta_tool: if task.is_some() { MetaTool::Batch } else { MetaTool::Run },
        request_id: "req-1".to_string(),
        details: vec![UsageDetail {
          module: module.to_string(),
          tool: tool.to_string(),
          task_id: task,
        }],
        created_at: Utc::now(),
      };
      db_arc.insert_usage_record(&record).await?;
    }

    let summary = service
      .usage_summary(&user.id, today, today + Duration::days(1))
      .await?;
    assert_eq!(3, summary.total_used);
    assert_eq!(Some(&2), summary.by_module.get("notion"));
    assert_eq!(Some(&1), summary.by_module.get("github"));
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_summary_rejects_inverted_period() -> anyhow::Result<()> {
    let db = test_db_service().await;
    let service = DefaultUsageService::new(
      Arc::new((*db).clone()),
      Arc::new(crate::db::DefaultTimeService),
    );
    let start = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    let end = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
    let result = service.usage_summary("u", start, end).await;
    assert!(matches!(result, Err(UsageServiceError::InvalidPeriod { .. })));
    Ok(())
  }
}
