use crate::db::{CredentialRepository, DbError, DbService};
use crate::encryption::{Cipher, EncryptionError, KEY_VERSION};
use chrono::{DateTime, Utc};
use objs::{AppError, AuthType, CredentialBlob, CredentialRow, ErrorType, ModuleDef, ToolSetting};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CredentialServiceError {
  #[error("no credential stored for module '{0}'")]
  NotFound(String),
  #[error(transparent)]
  Db(#[from] DbError),
  #[error(transparent)]
  Encryption(#[from] EncryptionError),
  #[error("stored credential for module '{0}' is malformed")]
  Malformed(String),
}

impl AppError for CredentialServiceError {
  fn error_type(&self) -> ErrorType {
    match self {
      CredentialServiceError::NotFound(_) => ErrorType::NotFound,
      CredentialServiceError::Db(e) => e.error_type(),
      CredentialServiceError::Encryption(e) => e.error_type(),
      CredentialServiceError::Malformed(_) => ErrorType::InternalServer,
    }
  }

  fn code(&self) -> String {
    match self {
      CredentialServiceError::NotFound(_) => "CREDENTIAL_NOT_FOUND".to_string(),
      CredentialServiceError::Db(e) => e.code(),
      CredentialServiceError::Encryption(e) => e.code(),
      CredentialServiceError::Malformed(_) => "CREDENTIAL_MALFORMED".to_string(),
    }
  }
}

type Result<T> = std::result::Result<T, CredentialServiceError>;

/// Listing entry for `GET /v1/me/credentials`: metadata only, no secrets.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialSummary {
  pub module_name: String,
  pub auth_type: AuthType,
  pub updated_at: DateTime<Utc>,
}

#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait::async_trait]
pub trait CredentialService: Send + Sync + std::fmt::Debug {
  /// Encrypts and stores the blob. On the first link of a module the default
  /// tool settings are seeded in the same transaction: read-only tools
  /// enabled, everything else disabled.
  async fn upsert(
    &self,
    user_id: &str,
    module: &ModuleDef,
    blob: &CredentialBlob,
  ) -> Result<()>;

  async fn get(&self, user_id: &str, module_name: &str) -> Result<Option<CredentialBlob>>;

  async fn list(&self, user_id: &str) -> Result<Vec<CredentialSummary>>;

  async fn delete(&self, user_id: &str, module_name: &str) -> Result<()>;

  /// Refresh writeback: re-encrypts and overwrites the stored blob.
  async fn replace_blob(
    &self,
    user_id: &str,
    module_name: &str,
    blob: &CredentialBlob,
  ) -> Result<()>;
}

#[derive(Debug)]
pub struct DefaultCredentialService {
  db_service: Arc<dyn DbService>,
  cipher: Cipher,
}

impl DefaultCredentialService {
  pub fn new(db_service: Arc<dyn DbService>, cipher: Cipher) -> Self {
    Self { db_service, cipher }
  }

  fn decrypt_blob(&self, row: &CredentialRow) -> Result<CredentialBlob> {
    let plaintext = self.cipher.decrypt(&row.encrypted_blob)?;
    serde_json::from_str(&plaintext)
      .map_err(|_| CredentialServiceError::Malformed(row.module_name.clone()))
  }

  fn encrypt_blob(&self, blob: &CredentialBlob) -> Result<String> {
    let plaintext = serde_json::to_string(blob)
      .map_err(|_| CredentialServiceError::Malformed("<unserializable>".to_string()))?;
    Ok(self.cipher.encrypt(&plaintext)?)
  }

  fn default_settings(user_id: &str, module: &ModuleDef) -> Vec<ToolSetting> {
    module
      .tools
      .iter()
      .map(|tool| ToolSetting {
        user_id: user_id.to_string(),
        module_name: module.name.clone(),
        tool_id: tool.id(&module.name),
        enabled: tool.is_read_only(),
      })
      .collect()
  }
}

#[async_trait::async_trait]
impl CredentialService for DefaultCredentialService {
  async fn upsert(
    &self,
    user_id: &str,
    module: &ModuleDef,
    blob: &CredentialBlob,
  ) -> Result<()> {
    let encrypted_blob = self.encrypt_blob(blob)?;
    let now = Utc::now();
    let row = CredentialRow {
      user_id: user_id.to_string(),
      module_name: module.name.clone(),
      encrypted_blob,
      key_version: KEY_VERSION,
      created_at: now,
      updated_at: now,
    };
    let defaults = Self::default_settings(user_id, module);
    self.db_service.upsert_credential(&row, &defaults).await?;
    Ok(())
  }

  async fn get(&self, user_id: &str, module_name: &str) -> Result<Option<CredentialBlob>> {
    let row = self.db_service.get_credential(user_id, module_name).await?;
    row.map(|row| self.decrypt_blob(&row)).transpose()
  }

  async fn list(&self, user_id: &str) -> Result<Vec<CredentialSummary>> {
    let rows = self.db_service.list_credentials(user_id).await?;
    let mut summaries = Vec::with_capacity(rows.len());
    for row in rows {
      let blob = self.decrypt_blob(&row)?;
      summaries.push(CredentialSummary {
        module_name: row.module_name,
        auth_type: blob.auth_type,
        updated_at: row.updated_at,
      });
    }
    Ok(summaries)
  }

  async fn delete(&self, user_id: &str, module_name: &str) -> Result<()> {
    self.db_service.delete_credential(user_id, module_name).await?;
    Ok(())
  }

  async fn replace_blob(
    &self,
    user_id: &str,
    module_name: &str,
    blob: &CredentialBlob,
  ) -> Result<()> {
    let encrypted_blob = self.encrypt_blob(blob)?;
    self
      .db_service
      .update_credential_blob(user_id, module_name, &encrypted_blob, KEY_VERSION)
      .await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::{CredentialService, DefaultCredentialService};
  use crate::db::ToolSettingRepository;
  use crate::encryption::Cipher;
  use crate::test_utils::{seed_user, test_db_service};
  use objs::{test_utils::test_module, CredentialBlob};
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use std::sync::Arc;

  fn cipher() -> Cipher {
    Cipher::new(b"test-master-key-0123456789abcdef")
  }

  #[rstest]
  #[tokio::test]
  async fn test_upsert_get_round_trip() -> anyhow::Result<()> {
    let db = test_db_service().await;
    let user = seed_user(&db, "alice").await;
    let service = DefaultCredentialService::new(Arc::new((*db).clone()), cipher());
    let module = test_module("notion", &[("search", true), ("delete_page", false)]);

    let blob = CredentialBlob::oauth2("access-1", Some("refresh-1".to_string()), Some(9999));
    service.upsert(&user.id, &module, &blob).await?;

    let fetched = service.get(&user.id, "notion").await?.unwrap();
    assert_eq!(blob, fetched);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_upsert_seeds_read_only_defaults() -> anyhow::Result<()> {
    let db = test_db_service().await;
    let user = seed_user(&db, "alice").await;
    let service = DefaultCredentialService::new(Arc::new((*db).clone()), cipher());
    let module = test_module("notion", &[("search", true), ("delete_page", false)]);

    service
      .upsert(&user.id, &module, &CredentialBlob::api_key("sk-1"))
      .await?;

    let settings = db.list_tool_settings_for_module(&user.id, "notion").await?;
    assert_eq!(2, settings.len());
    let by_id: std::collections::HashMap<_, _> = settings
      .into_iter()
      .map(|s| (s.tool_id.clone(), s.enabled))
      .collect();
    assert_eq!(Some(&true), by_id.get("notion:search"));
    assert_eq!(Some(&false), by_id.get("notion:delete_page"));
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_stored_blob_is_not_plaintext() -> anyhow::Result<()> {
    let db = test_db_service().await;
    let user = seed_user(&db, "alice").await;
    let service = DefaultCredentialService::new(Arc::new((*db).clone()), cipher());
    let module = test_module("github", &[("get_repo", true)]);

    service
      .upsert(&user.id, &module, &CredentialBlob::api_key("ghp_supersecret"))
      .await?;

    use crate::db::CredentialRepository;
    let row = db.get_credential(&user.id, "github").await?.unwrap();
    assert!(row.encrypted_blob.starts_with("v1:"));
    assert!(!row.encrypted_blob.contains("ghp_supersecret"));
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_delete_then_get_none() -> anyhow::Result<()> {
    let db = test_db_service().await;
    let user = seed_user(&db, "alice").await;
    let service = DefaultCredentialService::new(Arc::new((*db).clone()), cipher());
    let module = test_module("github", &[("get_repo", true)]);

    service
      .upsert(&user.id, &module, &CredentialBlob::api_key("ghp_x"))
      .await?;
    service.delete(&user.id, "github").await?;
    assert!(service.get(&user.id, "github").await?.is_none());
    Ok(())
  }
}
