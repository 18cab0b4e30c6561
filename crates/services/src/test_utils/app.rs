use crate::db::{DbService, DefaultTimeService, SqliteDbService};
use crate::test_utils::{test_db_service, test_setting_service, TestDbService};
use crate::{
  AppService, Cipher, DefaultAppService, DefaultCredentialService, DefaultOAuthAppService,
  DefaultTokenBroker, DefaultUsageService, DefaultUserService, FixedTokenEndpointResolver,
  JwksClient, KeyService, MokaRevocationCache,
};
use std::sync::Arc;

/// Master key every test cipher shares.
pub const TEST_MASTER_KEY: &[u8] = b"test-master-key-0123456789abcdef";

/// Ed25519 seed shared by all test key services ("secret-seed-for-tests-…").
pub const TEST_SIGNING_SEED_B64: &str = "c2VjcmV0LXNlZWQtZm9yLXRlc3RzLTAxMjM0NTY3ODk=";

pub fn test_cipher() -> Cipher {
  Cipher::new(TEST_MASTER_KEY)
}

pub fn test_key_service() -> Arc<KeyService> {
  Arc::new(KeyService::from_seed_base64(TEST_SIGNING_SEED_B64).expect("test seed is valid"))
}

/// Fully-wired AppService over a throwaway sqlite database. The gateway JWKS
/// client and provider token endpoint can be pointed at a mockito server.
pub struct TestAppService {
  app_service: Arc<DefaultAppService>,
  db: TestDbService,
}

impl TestAppService {
  pub fn app_service(&self) -> Arc<dyn AppService> {
    self.app_service.clone()
  }

  pub fn db(&self) -> &SqliteDbService {
    &self.db
  }
}

#[derive(Default)]
pub struct TestAppServiceBuilder {
  gateway_jwks_url: Option<String>,
  token_endpoint: Option<String>,
  console_url: Option<String>,
}

impl TestAppServiceBuilder {
  pub fn gateway_jwks_url(mut self, url: impl Into<String>) -> Self {
    self.gateway_jwks_url = Some(url.into());
    self
  }

  pub fn token_endpoint(mut self, url: impl Into<String>) -> Self {
    self.token_endpoint = Some(url.into());
    self
  }

  pub fn console_url(mut self, url: impl Into<String>) -> Self {
    self.console_url = Some(url.into());
    self
  }

  pub async fn build(self) -> TestAppService {
    let db = test_db_service().await;
    let db_arc: Arc<dyn DbService> = Arc::new((*db).clone());
    let time_service = Arc::new(DefaultTimeService);
    let cipher = test_cipher();

    let credential_service = Arc::new(DefaultCredentialService::new(
      db_arc.clone(),
      cipher.clone(),
    ));
    let token_broker = Arc::new(DefaultTokenBroker::new(
      credential_service.clone(),
      db_arc.clone(),
      time_service.clone(),
      Arc::new(FixedTokenEndpointResolver::new(
        self
          .token_endpoint
          .unwrap_or_else(|| "http://127.0.0.1:1/token".to_string()),
      )),
      cipher.clone(),
    ));
    let usage_service = Arc::new(DefaultUsageService::new(
      db_arc.clone(),
      time_service.clone(),
    ));
    let user_service = Arc::new(DefaultUserService::new(
      db_arc.clone(),
      time_service.clone(),
      self.console_url,
    ));
    let gateway_jwks = JwksClient::new(
      self
        .gateway_jwks_url
        .unwrap_or_else(|| "http://127.0.0.1:1/jwks.json".to_string()),
    );
    let oauth_app_service = Arc::new(DefaultOAuthAppService::new(
      db_arc.clone(),
      cipher.clone(),
    ));

    let app_service = Arc::new(DefaultAppService::new(
      test_setting_service(),
      db_arc,
      time_service,
      credential_service,
      token_broker,
      usage_service,
      user_service,
      Arc::new(MokaRevocationCache::default()),
      oauth_app_service,
      test_key_service(),
      gateway_jwks,
    ));
    TestAppService { app_service, db }
  }
}

pub async fn test_app_service() -> TestAppService {
  TestAppServiceBuilder::default().build().await
}
