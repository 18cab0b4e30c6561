use crate::db::{CredentialRepository, DbError, DbService, TimeService};
use crate::encryption::{Cipher, EncryptionError};
use crate::{CredentialService, CredentialServiceError};
use oauth2::{basic::BasicTokenType, EmptyExtraTokenFields, StandardTokenResponse, TokenResponse};
use objs::{AppError, AuthType, CredentialBlob, ErrorType};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Tokens expiring within this window are refreshed before use.
pub const REFRESH_SKEW_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum TokenBrokerError {
  #[error("no credential stored for module '{0}'")]
  CredentialNotFound(String),
  #[error("stored oauth2 credential for module '{0}' has no refresh token")]
  NoRefreshToken(String),
  #[error("no oauth app configured for provider '{0}'")]
  OAuthAppNotConfigured(String),
  #[error("oauth app for provider '{0}' is disabled")]
  OAuthAppDisabled(String),
  #[error("token refresh for module '{module}' failed: {reason}")]
  RefreshFailed { module: String, reason: String },
  #[error(transparent)]
  Credential(#[from] CredentialServiceError),
  #[error(transparent)]
  Db(#[from] DbError),
  #[error(transparent)]
  Encryption(#[from] EncryptionError),
}

impl AppError for TokenBrokerError {
  fn error_type(&self) -> ErrorType {
    match self {
      TokenBrokerError::CredentialNotFound(_) => ErrorType::NotFound,
      TokenBrokerError::NoRefreshToken(_)
      | TokenBrokerError::OAuthAppNotConfigured(_)
      | TokenBrokerError::OAuthAppDisabled(_) => ErrorType::InvalidAppState,
      TokenBrokerError::RefreshFailed { .. } => ErrorType::InternalServer,
      TokenBrokerError::Credential(e) => e.error_type(),
      TokenBrokerError::Db(e) => e.error_type(),
      TokenBrokerError::Encryption(e) => e.error_type(),
    }
  }

  fn code(&self) -> String {
    match self {
      TokenBrokerError::CredentialNotFound(_) => "CREDENTIAL_NOT_FOUND".to_string(),
      TokenBrokerError::NoRefreshToken(_) => "REFRESH_TOKEN_MISSING".to_string(),
      TokenBrokerError::OAuthAppNotConfigured(_) => "OAUTH_APP_NOT_CONFIGURED".to_string(),
      TokenBrokerError::OAuthAppDisabled(_) => "OAUTH_APP_DISABLED".to_string(),
      TokenBrokerError::RefreshFailed { .. } => "TOKEN_REFRESH_FAILED".to_string(),
      TokenBrokerError::Credential(e) => e.code(),
      TokenBrokerError::Db(e) => e.code(),
      TokenBrokerError::Encryption(e) => e.code(),
    }
  }
}

type Result<T> = std::result::Result<T, TokenBrokerError>;

/// Maps a provider name to its OAuth2 token endpoint. Separated out so tests
/// can point refreshes at a local mock server.
pub trait TokenEndpointResolver: Send + Sync + std::fmt::Debug {
  fn token_endpoint(&self, provider: &str) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct DefaultTokenEndpointResolver;

impl TokenEndpointResolver for DefaultTokenEndpointResolver {
  fn token_endpoint(&self, provider: &str) -> Option<String> {
    let url = match provider {
      "google_calendar" => "https://oauth2.googleapis.com/token",
      "github" => "https://github.com/login/oauth/access_token",
      "notion" => "https://api.notion.com/v1/oauth/token",
      "jira" => "https://auth.atlassian.com/oauth/token",
      _ => return None,
    };
    Some(url.to_string())
  }
}

#[derive(Debug)]
pub struct FixedTokenEndpointResolver {
  url: String,
}

impl FixedTokenEndpointResolver {
  pub fn new(url: impl Into<String>) -> Self {
    Self { url: url.into() }
  }
}

impl TokenEndpointResolver for FixedTokenEndpointResolver {
  fn token_endpoint(&self, _provider: &str) -> Option<String> {
    Some(self.url.clone())
  }
}

#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait::async_trait]
pub trait TokenBroker: Send + Sync + std::fmt::Debug {
  /// Returns a credential whose access token is valid for at least
  /// `REFRESH_SKEW_SECS`. OAuth2 credentials close to expiry are refreshed
  /// transparently; all other auth types pass through unchanged.
  async fn get_module_token(&self, user_id: &str, module: &str) -> Result<CredentialBlob>;
}

#[derive(Debug)]
pub struct DefaultTokenBroker {
  credential_service: Arc<dyn CredentialService>,
  db_service: Arc<dyn DbService>,
  time_service: Arc<dyn TimeService>,
  endpoint_resolver: Arc<dyn TokenEndpointResolver>,
  cipher: Cipher,
  client: reqwest::Client,
  /// Single-flight guard per `(user_id, module)`; concurrent refreshers block
  /// on the first and then observe its writeback.
  locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl DefaultTokenBroker {
  pub fn new(
    credential_service: Arc<dyn CredentialService>,
    db_service: Arc<dyn DbService>,
    time_service: Arc<dyn TimeService>,
    endpoint_resolver: Arc<dyn TokenEndpointResolver>,
    cipher: Cipher,
  ) -> Self {
    Self {
      credential_service,
      db_service,
      time_service,
      endpoint_resolver,
      cipher,
      client: reqwest::Client::new(),
      locks: RwLock::new(HashMap::new()),
    }
  }

  async fn refresh_lock(&self, key: &str) -> Arc<Mutex<()>> {
    {
      let locks = self.locks.read().await;
      if let Some(lock) = locks.get(key) {
        return Arc::clone(lock);
      }
    }
    let mut locks = self.locks.write().await;
    if let Some(lock) = locks.get(key) {
      return Arc::clone(lock);
    }
    let lock = Arc::new(Mutex::new(()));
    locks.insert(key.to_string(), Arc::clone(&lock));
    lock
  }

  async fn refresh(
    &self,
    user_id: &str,
    module: &str,
    stored: CredentialBlob,
  ) -> Result<CredentialBlob> {
    let refresh_token = stored
      .refresh_token
      .clone()
      .ok_or_else(|| TokenBrokerError::NoRefreshToken(module.to_string()))?;

    let app = self
      .db_service
      .get_oauth_app(module)
      .await?
      .ok_or_else(|| TokenBrokerError::OAuthAppNotConfigured(module.to_string()))?;
    if !app.enabled {
      return Err(TokenBrokerError::OAuthAppDisabled(module.to_string()));
    }
    let client_secret = self.cipher.decrypt(&app.encrypted_client_secret)?;
    let token_url = self
      .endpoint_resolver
      .token_endpoint(module)
      .ok_or_else(|| TokenBrokerError::OAuthAppNotConfigured(module.to_string()))?;

    let params = [
      ("grant_type", "refresh_token"),
      ("refresh_token", refresh_token.as_str()),
      ("client_id", app.client_id.as_str()),
      ("client_secret", client_secret.as_str()),
    ];
    let response = self
      .client
      .post(&token_url)
      .header("Accept", "application/json")
      .form(&params)
      .send()
      .await
      .map_err(|e| TokenBrokerError::RefreshFailed {
        module: module.to_string(),
        reason: e.to_string(),
      })?;

    if !response.status().is_success() {
      // stored credential is left untouched on provider failure
      return Err(TokenBrokerError::RefreshFailed {
        module: module.to_string(),
        reason: format!("token endpoint returned {}", response.status()),
      });
    }

    let token_response: StandardTokenResponse<EmptyExtraTokenFields, BasicTokenType> = response
      .json()
      .await
      .map_err(|e| TokenBrokerError::RefreshFailed {
        module: module.to_string(),
        reason: format!("malformed token response: {e}"),
      })?;

    let now = self.time_service.utc_now();
    let mut refreshed = stored;
    refreshed.access_token = Some(token_response.access_token().secret().to_string());
    refreshed.expires_at = token_response
      .expires_in()
      .map(|d| now.timestamp() + d.as_secs() as i64);
    // providers may omit the refresh token on rotation; keep the old one
    if let Some(new_refresh) = token_response.refresh_token() {
      refreshed.refresh_token = Some(new_refresh.secret().to_string());
    }
    if let Some(scope) = token_response.scopes() {
      refreshed.scope = Some(
        scope
          .iter()
          .map(|s| s.as_str())
          .collect::<Vec<_>>()
          .join(" "),
      );
    }

    self
      .credential_service
      .replace_blob(user_id, module, &refreshed)
      .await?;
    tracing::debug!(module, "refreshed oauth2 token");
    Ok(refreshed)
  }
}

#[async_trait::async_trait]
impl TokenBroker for DefaultTokenBroker {
  async fn get_module_token(&self, user_id: &str, module: &str) -> Result<CredentialBlob> {
    let stored = self
      .credential_service
      .get(user_id, module)
      .await?
      .ok_or_else(|| TokenBrokerError::CredentialNotFound(module.to_string()))?;

    if stored.auth_type != AuthType::Oauth2 {
      return Ok(stored);
    }
    let now = self.time_service.utc_now();
    if !stored.expires_within(now, REFRESH_SKEW_SECS) {
      return Ok(stored);
    }

    let lock = self.refresh_lock(&format!("{user_id}/{module}")).await;
    let _guard = lock.lock().await;

    // a concurrent caller may have refreshed while we queued on the lock
    let stored = self
      .credential_service
      .get(user_id, module)
      .await?
      .ok_or_else(|| TokenBrokerError::CredentialNotFound(module.to_string()))?;
    if !stored.expires_within(self.time_service.utc_now(), REFRESH_SKEW_SECS) {
      return Ok(stored);
    }

    self.refresh(user_id, module, stored).await
  }
}

#[cfg(test)]
mod tests {
  use super::{
    DefaultTokenBroker, FixedTokenEndpointResolver, TokenBroker, TokenBrokerError,
  };
  use crate::db::{CredentialRepository, DbService};
  use crate::encryption::Cipher;
  use crate::test_utils::{seed_user, test_db_service};
  use crate::{CredentialService, DefaultCredentialService};
  use chrono::Utc;
  use objs::{test_utils::test_module, CredentialBlob, OAuthApp};
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use serde_json::json;
  use std::sync::Arc;

  fn cipher() -> Cipher {
    Cipher::new(b"test-master-key-0123456789abcdef")
  }

  async fn setup(
    server_url: &str,
  ) -> (
    crate::test_utils::TestDbService,
    Arc<dyn CredentialService>,
    DefaultTokenBroker,
    String,
  ) {
    let db = test_db_service().await;
    let user = seed_user(&db, "alice").await;
    let db_arc: Arc<dyn DbService> = Arc::new((*db).clone());
    let credential_service: Arc<dyn CredentialService> = Arc::new(
      DefaultCredentialService::new(db_arc.clone(), cipher()),
    );
    let broker = DefaultTokenBroker::new(
      credential_service.clone(),
      db_arc.clone(),
      Arc::new(crate::db::DefaultTimeService),
      Arc::new(FixedTokenEndpointResolver::new(server_url)),
      cipher(),
    );
    db_arc
      .upsert_oauth_app(&OAuthApp {
        provider: "google_calendar".to_string(),
        client_id: "client-1".to_string(),
        encrypted_client_secret: cipher().encrypt("hunter2").unwrap(),
        redirect_uri: "https://portal.test/callback".to_string(),
        enabled: true,
      })
      .await
      .unwrap();
    (db, credential_service, broker, user.id)
  }

  #[rstest]
  #[tokio::test]
  async fn test_missing_credential_errors() -> anyhow::Result<()> {
    let (_db, _creds, broker, user_id) = setup("http://127.0.0.1:1/token").await;
    let result = broker.get_module_token(&user_id, "google_calendar").await;
    assert!(matches!(
      result,
      Err(TokenBrokerError::CredentialNotFound(_))
    ));
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_non_oauth2_passes_through() -> anyhow::Result<()> {
    let (_db, creds, broker, user_id) = setup("http://127.0.0.1:1/token").await;
    let module = test_module("github", &[("get_repo", true)]);
    creds
      .upsert(&user_id, &module, &CredentialBlob::api_key("ghp_token"))
      .await?;

    let blob = broker.get_module_token(&user_id, "github").await?;
    assert_eq!(Some("ghp_token".to_string()), blob.access_token);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_fresh_oauth2_token_not_refreshed() -> anyhow::Result<()> {
    let (_db, creds, broker, user_id) = setup("http://127.0.0.1:1/token").await;
    let module = test_module("google_calendar", &[("list_events", true)]);
    let blob = CredentialBlob::oauth2(
      "fresh-token",
      Some("refresh-1".to_string()),
      Some(Utc::now().timestamp() + 3600),
    );
    creds.upsert(&user_id, &module, &blob).await?;

    // endpoint is unreachable; a refresh attempt would fail loudly
    let result = broker.get_module_token(&user_id, "google_calendar").await?;
    assert_eq!(Some("fresh-token".to_string()), result.access_token);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_expired_token_refreshes_and_preserves_refresh_token() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/token")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(
        json!({
          "access_token": "new-access",
          "token_type": "Bearer",
          "expires_in": 3600
        })
        .to_string(),
      )
      .expect(1)
      .create_async()
      .await;

    let (_db, creds, broker, user_id) = setup(&format!("{}/token", server.url())).await;
    let module = test_module("google_calendar", &[("list_events", true)]);
    let blob = CredentialBlob::oauth2(
      "stale-access",
      Some("keep-me".to_string()),
      Some(Utc::now().timestamp() - 10),
    );
    creds.upsert(&user_id, &module, &blob).await?;

    let refreshed = broker.get_module_token(&user_id, "google_calendar").await?;
    assert_eq!(Some("new-access".to_string()), refreshed.access_token);
    // response omitted refresh_token: the stored one is preserved
    assert_eq!(Some("keep-me".to_string()), refreshed.refresh_token);
    assert!(refreshed.expires_at.unwrap() > Utc::now().timestamp() + 3000);

    // writeback is visible to a fresh read
    let stored = creds.get(&user_id, "google_calendar").await?.unwrap();
    assert_eq!(Some("new-access".to_string()), stored.access_token);
    mock.assert_async().await;
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_concurrent_refresh_single_flight() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/token")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(
        json!({
          "access_token": "new-access",
          "token_type": "Bearer",
          "expires_in": 3600,
          "refresh_token": "rotated"
        })
        .to_string(),
      )
      .expect(1)
      .create_async()
      .await;

    let (_db, creds, broker, user_id) = setup(&format!("{}/token", server.url())).await;
    let module = test_module("google_calendar", &[("list_events", true)]);
    creds
      .upsert(
        &user_id,
        &module,
        &CredentialBlob::oauth2(
          "stale",
          Some("refresh-1".to_string()),
          Some(Utc::now().timestamp() - 10),
        ),
      )
      .await?;

    let broker = Arc::new(broker);
    let mut handles = Vec::new();
    for _ in 0..20 {
      let broker = Arc::clone(&broker);
      let user_id = user_id.clone();
      handles.push(tokio::spawn(async move {
        broker.get_module_token(&user_id, "google_calendar").await
      }));
    }
    for handle in handles {
      let blob = handle.await??;
      assert_eq!(Some("new-access".to_string()), blob.access_token);
    }
    // exactly one POST reached the provider
    mock.assert_async().await;
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_provider_failure_preserves_stored_credential() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/token")
      .with_status(500)
      .with_body("upstream broken")
      .create_async()
      .await;

    let (_db, creds, broker, user_id) = setup(&format!("{}/token", server.url())).await;
    let module = test_module("google_calendar", &[("list_events", true)]);
    let original = CredentialBlob::oauth2(
      "stale",
      Some("refresh-1".to_string()),
      Some(Utc::now().timestamp() - 10),
    );
    creds.upsert(&user_id, &module, &original).await?;

    let result = broker.get_module_token(&user_id, "google_calendar").await;
    assert!(matches!(result, Err(TokenBrokerError::RefreshFailed { .. })));

    let stored = creds.get(&user_id, "google_calendar").await?.unwrap();
    assert_eq!(original, stored);
    Ok(())
  }
}
