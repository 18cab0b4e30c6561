use crate::db::ApiKeyRepository;
use crate::test_utils::{seed_user, test_db_service};
use chrono::{Duration, Utc};
use objs::ApiKey;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn api_key(id: &str, user_id: &str) -> ApiKey {
  ApiKey {
    id: id.to_string(),
    user_id: user_id.to_string(),
    jwt_kid: "signing-key-1".to_string(),
    key_prefix: "mpt_eyJh".to_string(),
    display_name: "ci key".to_string(),
    expires_at: None,
    last_used_at: None,
    created_at: Utc::now(),
  }
}

#[rstest]
#[tokio::test]
async fn test_create_list_get_delete() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let user = seed_user(&service, "alice").await;

  service.create_api_key(&api_key("key-1", &user.id)).await?;
  service.create_api_key(&api_key("key-2", &user.id)).await?;

  let keys = service.list_api_keys(&user.id).await?;
  assert_eq!(2, keys.len());

  let fetched = service.get_api_key(&user.id, "key-1").await?.unwrap();
  assert_eq!("ci key", fetched.display_name);

  assert!(service.delete_api_key(&user.id, "key-1").await?);
  assert!(!service.delete_api_key(&user.id, "key-1").await?);
  assert!(service.get_api_key_by_id("key-1").await?.is_none());
  Ok(())
}

#[rstest]
#[tokio::test]
async fn test_delete_requires_owning_user() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let alice = seed_user(&service, "alice").await;
  let bob = seed_user(&service, "bob").await;

  service.create_api_key(&api_key("key-1", &alice.id)).await?;

  assert!(!service.delete_api_key(&bob.id, "key-1").await?);
  assert!(service.get_api_key_by_id("key-1").await?.is_some());
  Ok(())
}

#[rstest]
#[tokio::test]
async fn test_touch_last_used() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let user = seed_user(&service, "alice").await;
  service.create_api_key(&api_key("key-1", &user.id)).await?;

  let at = Utc::now() + Duration::seconds(5);
  service.touch_api_key_last_used("key-1", at).await?;

  let fetched = service.get_api_key_by_id("key-1").await?.unwrap();
  assert!(fetched.last_used_at.is_some());
  Ok(())
}
