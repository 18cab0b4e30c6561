use crate::db::{DbService, TimeService};
use crate::{
  CredentialService, JwksClient, KeyService, OAuthAppService, RevocationCache, SettingService,
  TokenBroker, UsageService, UserService,
};
use derive_new::new;
use std::sync::Arc;

/// Composite registry of every service a request handler may need. Built once
/// at boot and shared behind an Arc.
pub trait AppService: std::fmt::Debug + Send + Sync {
  fn setting_service(&self) -> Arc<dyn SettingService>;

  fn db_service(&self) -> Arc<dyn DbService>;

  fn time_service(&self) -> Arc<dyn TimeService>;

  fn credential_service(&self) -> Arc<dyn CredentialService>;

  fn token_broker(&self) -> Arc<dyn TokenBroker>;

  fn usage_service(&self) -> Arc<dyn UsageService>;

  fn user_service(&self) -> Arc<dyn UserService>;

  /// API-key revocation state shared with the deletion endpoint.
  fn revocation_cache(&self) -> Arc<dyn RevocationCache>;

  fn oauth_app_service(&self) -> Arc<dyn OAuthAppService>;

  fn key_service(&self) -> Arc<KeyService>;

  /// JWKS of the gateway process, used to verify gateway tokens.
  fn gateway_jwks(&self) -> Arc<JwksClient>;
}

#[derive(Debug, Clone, new)]
pub struct DefaultAppService {
  setting_service: Arc<dyn SettingService>,
  db_service: Arc<dyn DbService>,
  time_service: Arc<dyn TimeService>,
  credential_service: Arc<dyn CredentialService>,
  token_broker: Arc<dyn TokenBroker>,
  usage_service: Arc<dyn UsageService>,
  user_service: Arc<dyn UserService>,
  revocation_cache: Arc<dyn RevocationCache>,
  oauth_app_service: Arc<dyn OAuthAppService>,
  key_service: Arc<KeyService>,
  gateway_jwks: Arc<JwksClient>,
}

impl AppService for DefaultAppService {
  fn setting_service(&self) -> Arc<dyn SettingService> {
    self.setting_service.clone()
  }

  fn db_service(&self) -> Arc<dyn DbService> {
    self.db_service.clone()
  }

  fn time_service(&self) -> Arc<dyn TimeService> {
    self.time_service.clone()
  }

  fn credential_service(&self) -> Arc<dyn CredentialService> {
    self.credential_service.clone()
  }

  fn token_broker(&self) -> Arc<dyn TokenBroker> {
    self.token_broker.clone()
  }

  fn usage_service(&self) -> Arc<dyn UsageService> {
    self.usage_service.clone()
  }

  fn user_service(&self) -> Arc<dyn UserService> {
    self.user_service.clone()
  }

  fn revocation_cache(&self) -> Arc<dyn RevocationCache> {
    self.revocation_cache.clone()
  }

  fn oauth_app_service(&self) -> Arc<dyn OAuthAppService> {
    self.oauth_app_service.clone()
  }

  fn key_service(&self) -> Arc<KeyService> {
    self.key_service.clone()
  }

  fn gateway_jwks(&self) -> Arc<JwksClient> {
    self.gateway_jwks.clone()
  }
}
