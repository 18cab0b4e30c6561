use crate::db::UsageRepository;
use crate::test_utils::{seed_user, test_db_service};
use chrono::{DateTime, Duration, Utc};
use objs::{MetaTool, UsageDetail, UsageRecord};
use pretty_assertions::assert_eq;
use rstest::rstest;
use uuid::Uuid;

fn record(user_id: &str, module: &str, tool: &str, at: DateTime<Utc>) -> UsageRecord {
  UsageRecord {
    id: Uuid::new_v4().to_string(),
    user_id: user_id.to_string(),
    meta_tool: MetaTool::Run,
    request_id: "req-1".to_string(),
    details: vec![UsageDetail {
      module: module.to_string(),
      tool: tool.to_string(),
      task_id: None,
    }],
    created_at: at,
  }
}

#[rstest]
#[tokio::test]
async fn test_count_usage_in_range_half_open() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let user = seed_user(&service, "alice").await;
  let start = Utc::now();

  service
    .insert_usage_record(&record(&user.id, "notion", "search", start))
    .await?;
  service
    .insert_usage_record(&record(&user.id, "notion", "search", start + Duration::hours(1)))
    .await?;
  // outside the window
  service
    .insert_usage_record(&record(&user.id, "notion", "search", start + Duration::days(2)))
    .await?;

  let count = service
    .count_usage_in_range(&user.id, start, start + Duration::days(1))
    .await?;
  assert_eq!(2, count);
  Ok(())
}

#[rstest]
#[tokio::test]
async fn test_list_usage_round_trips_details() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let user = seed_user(&service, "alice").await;
  let at = Utc::now();

  let mut original = record(&user.id, "github", "list_issues", at);
  original.meta_tool = MetaTool::Batch;
  original.details[0].task_id = Some("t-1".to_string());
  service.insert_usage_record(&original).await?;

  let rows = service
    .list_usage_in_range(&user.id, at - Duration::minutes(1), at + Duration::minutes(1))
    .await?;
  assert_eq!(1, rows.len());
  assert_eq!(original.details, rows[0].details);
  assert_eq!(MetaTool::Batch, rows[0].meta_tool);
  Ok(())
}

#[rstest]
#[tokio::test]
async fn test_usage_is_per_user() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let alice = seed_user(&service, "alice").await;
  let bob = seed_user(&service, "bob").await;
  let now = Utc::now();

  service
    .insert_usage_record(&record(&alice.id, "notion", "search", now))
    .await?;

  let count = service
    .count_usage_in_range(&bob.id, now - Duration::hours(1), now + Duration::hours(1))
    .await?;
  assert_eq!(0, count);
  Ok(())
}
