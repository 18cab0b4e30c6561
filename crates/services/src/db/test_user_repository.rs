use crate::db::{CredentialRepository, UsageRepository, UserRepository};
use crate::test_utils::test_db_service;
use chrono::{Duration, Utc};
use objs::{AccountStatus, CredentialRow, MetaTool, ToolSetting, UsageDetail, UsageRecord, UserRole};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

#[rstest]
#[tokio::test]
async fn test_upsert_user_is_idempotent() -> anyhow::Result<()> {
  let service = test_db_service().await;

  let first = service
    .upsert_user_by_external_id("idp|alice", "alice@example.com")
    .await?;
  let second = service
    .upsert_user_by_external_id("idp|alice", "alice@example.com")
    .await?;

  assert_eq!(first.id, second.id);
  assert_eq!(AccountStatus::Active, first.account_status);
  assert_eq!(UserRole::User, first.role);
  assert_eq!("free", first.plan_id);
  Ok(())
}

#[rstest]
#[tokio::test]
async fn test_distinct_external_ids_get_distinct_users() -> anyhow::Result<()> {
  let service = test_db_service().await;

  let alice = service
    .upsert_user_by_external_id("idp|alice", "alice@example.com")
    .await?;
  let bob = service
    .upsert_user_by_external_id("idp|bob", "bob@example.com")
    .await?;

  assert_ne!(alice.id, bob.id);
  Ok(())
}

#[rstest]
#[tokio::test]
async fn test_get_user_by_id_and_settings_update() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let user = service
    .upsert_user_by_external_id("idp|carol", "carol@example.com")
    .await?;

  service
    .update_user_settings(&user.id, &json!({"timezone": "UTC"}))
    .await?;

  let fetched = service.get_user_by_id(&user.id).await?.unwrap();
  assert_eq!(json!({"timezone": "UTC"}), fetched.settings);
  Ok(())
}

#[rstest]
#[tokio::test]
async fn test_get_plan_seeded_master_data() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let plan = service.get_plan("free").await?.unwrap();
  assert_eq!(50, plan.daily_limit);
  assert!(service.get_plan("nonexistent").await?.is_none());
  Ok(())
}

#[rstest]
#[tokio::test]
async fn test_context_snapshot_assembles_all_reads() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let user = service
    .upsert_user_by_external_id("idp|alice", "alice@example.com")
    .await?;
  let now = Utc::now();

  service
    .upsert_credential(
      &CredentialRow {
        user_id: user.id.clone(),
        module_name: "notion".to_string(),
        encrypted_blob: "v1:x".to_string(),
        key_version: 1,
        created_at: now,
        updated_at: now,
      },
      &[ToolSetting {
        user_id: user.id.clone(),
        module_name: "notion".to_string(),
        tool_id: "notion:search".to_string(),
        enabled: true,
      }],
    )
    .await?;
  service
    .insert_usage_record(&UsageRecord {
      id: uuid::Uuid::new_v4().to_string(),
      user_id: user.id.clone(),
      meta_tool: MetaTool::Run,
      request_id: "req-1".to_string(),
      details: vec![UsageDetail {
        module: "notion".to_string(),
        tool: "search".to_string(),
        task_id: None,
      }],
      created_at: now,
    })
    .await?;

  let snapshot = service
    .load_user_context_snapshot(&user.id, now - Duration::hours(1), now + Duration::hours(1))
    .await?
    .unwrap();
  assert_eq!(user.id, snapshot.user.id);
  assert_eq!(50, snapshot.plan.unwrap().daily_limit);
  assert_eq!(1, snapshot.daily_used);
  assert_eq!(1, snapshot.tool_settings.len());
  assert!(snapshot.module_settings.is_empty());
  Ok(())
}

#[rstest]
#[tokio::test]
async fn test_context_snapshot_unknown_user_is_none() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let now = Utc::now();
  let snapshot = service
    .load_user_context_snapshot("ghost", now - Duration::hours(1), now)
    .await?;
  assert!(snapshot.is_none());
  Ok(())
}
