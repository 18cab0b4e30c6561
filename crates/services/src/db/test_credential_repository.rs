use crate::db::{CredentialRepository, ToolSettingRepository};
use crate::test_utils::{seed_user, test_db_service};
use chrono::Utc;
use objs::{CredentialRow, OAuthApp, ToolSetting};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn credential_row(user_id: &str, module: &str, blob: &str) -> CredentialRow {
  CredentialRow {
    user_id: user_id.to_string(),
    module_name: module.to_string(),
    encrypted_blob: blob.to_string(),
    key_version: 1,
    created_at: Utc::now(),
    updated_at: Utc::now(),
  }
}

fn setting(user_id: &str, module: &str, tool: &str, enabled: bool) -> ToolSetting {
  ToolSetting {
    user_id: user_id.to_string(),
    module_name: module.to_string(),
    tool_id: format!("{module}:{tool}"),
    enabled,
  }
}

#[rstest]
#[tokio::test]
async fn test_upsert_seeds_settings_only_on_first_link() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let user = seed_user(&service, "alice").await;

  let defaults = vec![
    setting(&user.id, "notion", "search", true),
    setting(&user.id, "notion", "delete_page", false),
  ];
  service
    .upsert_credential(&credential_row(&user.id, "notion", "v1:aaa"), &defaults)
    .await?;

  // user flips delete_page on
  service
    .set_tools_enabled(&user.id, "notion", &["notion:delete_page".to_string()], &[])
    .await?;

  // relink must not reset the user's choice
  service
    .upsert_credential(&credential_row(&user.id, "notion", "v1:bbb"), &defaults)
    .await?;

  let settings = service.list_tool_settings_for_module(&user.id, "notion").await?;
  let delete_page = settings
    .iter()
    .find(|s| s.tool_id == "notion:delete_page")
    .unwrap();
  assert!(delete_page.enabled);

  let row = service.get_credential(&user.id, "notion").await?.unwrap();
  assert_eq!("v1:bbb", row.encrypted_blob);
  Ok(())
}

#[rstest]
#[tokio::test]
async fn test_delete_credential_is_scoped_to_user() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let alice = seed_user(&service, "alice").await;
  let bob = seed_user(&service, "bob").await;

  service
    .upsert_credential(&credential_row(&alice.id, "github", "v1:alice"), &[])
    .await?;
  service
    .upsert_credential(&credential_row(&bob.id, "github", "v1:bob"), &[])
    .await?;

  service.delete_credential(&alice.id, "github").await?;

  assert!(service.get_credential(&alice.id, "github").await?.is_none());
  assert!(service.get_credential(&bob.id, "github").await?.is_some());
  Ok(())
}

#[rstest]
#[tokio::test]
async fn test_update_credential_blob_single_row() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let user = seed_user(&service, "alice").await;
  service
    .upsert_credential(&credential_row(&user.id, "google_calendar", "v1:old"), &[])
    .await?;

  service
    .update_credential_blob(&user.id, "google_calendar", "v1:new", 1)
    .await?;

  let row = service.get_credential(&user.id, "google_calendar").await?.unwrap();
  assert_eq!("v1:new", row.encrypted_blob);
  Ok(())
}

#[rstest]
#[tokio::test]
async fn test_oauth_app_round_trip() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let app = OAuthApp {
    provider: "google_calendar".to_string(),
    client_id: "client-1".to_string(),
    encrypted_client_secret: "v1:secret".to_string(),
    redirect_uri: "https://portal.test/oauth/callback".to_string(),
    enabled: true,
  };
  service.upsert_oauth_app(&app).await?;

  let fetched = service.get_oauth_app("google_calendar").await?.unwrap();
  assert_eq!(app, fetched);

  service.delete_oauth_app("google_calendar").await?;
  assert!(service.get_oauth_app("google_calendar").await?.is_none());
  Ok(())
}

#[rstest]
#[tokio::test]
async fn test_consents_listing_excludes_ciphertext() -> anyhow::Result<()> {
  let service = test_db_service().await;
  let user = seed_user(&service, "alice").await;
  service
    .upsert_credential(&credential_row(&user.id, "notion", "v1:zzz"), &[])
    .await?;

  let consents = service.list_credential_consents().await?;
  assert_eq!(1, consents.len());
  assert_eq!((user.id.clone(), "notion".to_string()), (consents[0].0.clone(), consents[0].1.clone()));
  Ok(())
}
