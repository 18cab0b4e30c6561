use crate::db::PromptRepository;
use crate::test_utils::{seed_user, test_db_service};
use chrono::Utc;
use objs::Prompt;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn prompt(id: &str, user_id: &str, name: &str) -> Prompt {
  Prompt {
    id: id.to_string(),
    user_id: user_id.to_string(),
    module_name: None,
    name: name.to_string(),
    description: Some("summarize my day".to_string()),
    content: "Summarize today's events from my calendar.".to_string(),
    enabled: true,
    created_at: Utc::now(),
    updated_at: Utc::now(),
  }
}

#[rstest]
#[tokio::test]
async fn test_prompt_crud() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let user = seed_user(&service, "alice").await;

  service.create_prompt(&prompt("p-1", &user.id, "daily-summary")).await?;

  let by_name = service
    .get_prompt_by_name(&user.id, "daily-summary")
    .await?
    .unwrap();
  assert_eq!("p-1", by_name.id);

  let mut updated = by_name.clone();
  updated.enabled = false;
  service.update_prompt(&updated).await?;
  let fetched = service.get_prompt(&user.id, "p-1").await?.unwrap();
  assert!(!fetched.enabled);

  assert!(service.delete_prompt(&user.id, "p-1").await?);
  assert!(service.get_prompt(&user.id, "p-1").await?.is_none());
  Ok(())
}

#[rstest]
#[tokio::test]
async fn test_prompt_name_unique_per_user() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let alice = seed_user(&service, "alice").await;
  let bob = seed_user(&service, "bob").await;

  service.create_prompt(&prompt("p-1", &alice.id, "shared-name")).await?;
  // same name for another user is fine
  service.create_prompt(&prompt("p-2", &bob.id, "shared-name")).await?;
  // duplicate for the same user is rejected
  let result = service.create_prompt(&prompt("p-3", &alice.id, "shared-name")).await;
  assert!(result.is_err());
  Ok(())
}
