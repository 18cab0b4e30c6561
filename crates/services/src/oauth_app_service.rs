use crate::db::{CredentialRepository, DbError, DbService};
use crate::encryption::{Cipher, EncryptionError};
use objs::{AppError, ErrorType, OAuthApp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum OAuthAppServiceError {
  #[error("no oauth app configured for provider '{0}'")]
  NotFound(String),
  #[error(transparent)]
  Db(#[from] DbError),
  #[error(transparent)]
  Encryption(#[from] EncryptionError),
}

impl AppError for OAuthAppServiceError {
  fn error_type(&self) -> ErrorType {
    match self {
      OAuthAppServiceError::NotFound(_) => ErrorType::NotFound,
      OAuthAppServiceError::Db(e) => e.error_type(),
      OAuthAppServiceError::Encryption(e) => e.error_type(),
    }
  }

  fn code(&self) -> String {
    match self {
      OAuthAppServiceError::NotFound(_) => "OAUTH_APP_NOT_FOUND".to_string(),
      OAuthAppServiceError::Db(e) => e.code(),
      OAuthAppServiceError::Encryption(e) => e.code(),
    }
  }
}

type Result<T> = std::result::Result<T, OAuthAppServiceError>;

/// Admin-facing view: the client secret never leaves the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct OAuthAppMasked {
  pub provider: String,
  pub client_id: String,
  pub redirect_uri: String,
  pub enabled: bool,
}

impl From<OAuthApp> for OAuthAppMasked {
  fn from(value: OAuthApp) -> Self {
    Self {
      provider: value.provider,
      client_id: value.client_id,
      redirect_uri: value.redirect_uri,
      enabled: value.enabled,
    }
  }
}

#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait::async_trait]
pub trait OAuthAppService: Send + Sync + std::fmt::Debug {
  async fn upsert(
    &self,
    provider: &str,
    client_id: &str,
    client_secret: &str,
    redirect_uri: &str,
    enabled: bool,
  ) -> Result<OAuthAppMasked>;

  async fn get(&self, provider: &str) -> Result<Option<OAuthAppMasked>>;

  async fn list(&self) -> Result<Vec<OAuthAppMasked>>;

  async fn delete(&self, provider: &str) -> Result<()>;
}

#[derive(Debug)]
pub struct DefaultOAuthAppService {
  db_service: Arc<dyn DbService>,
  cipher: Cipher,
}

impl DefaultOAuthAppService {
  pub fn new(db_service: Arc<dyn DbService>, cipher: Cipher) -> Self {
    Self { db_service, cipher }
  }
}

#[async_trait::async_trait]
impl OAuthAppService for DefaultOAuthAppService {
  async fn upsert(
    &self,
    provider: &str,
    client_id: &str,
    client_secret: &str,
    redirect_uri: &str,
    enabled: bool,
  ) -> Result<OAuthAppMasked> {
    let app = OAuthApp {
      provider: provider.to_string(),
      client_id: client_id.to_string(),
      encrypted_client_secret: self.cipher.encrypt(client_secret)?,
      redirect_uri: redirect_uri.to_string(),
      enabled,
    };
    self.db_service.upsert_oauth_app(&app).await?;
    Ok(app.into())
  }

  async fn get(&self, provider: &str) -> Result<Option<OAuthAppMasked>> {
    Ok(
      self
        .db_service
        .get_oauth_app(provider)
        .await?
        .map(OAuthAppMasked::from),
    )
  }

  async fn list(&self) -> Result<Vec<OAuthAppMasked>> {
    Ok(
      self
        .db_service
        .list_oauth_apps()
        .await?
        .into_iter()
        .map(OAuthAppMasked::from)
        .collect(),
    )
  }

  async fn delete(&self, provider: &str) -> Result<()> {
    self.db_service.delete_oauth_app(provider).await?;
    Ok(())
  }
}
