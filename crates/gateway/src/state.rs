use services::db::{DbService, TimeService};
use services::{JwksClient, KeyService, RevocationCache, SettingService};
use std::sync::Arc;

/// Everything the edge process needs. The key service doubles as verifier
/// for API-key JWTs: both processes are provisioned with the same signing
/// seed, so the local JWKS covers keys minted by the protocol server.
#[derive(Debug, Clone)]
pub struct GatewayState {
  pub setting_service: Arc<dyn SettingService>,
  pub db_service: Arc<dyn DbService>,
  pub time_service: Arc<dyn TimeService>,
  pub key_service: Arc<KeyService>,
  pub idp_jwks: Arc<JwksClient>,
  pub revocation_cache: Arc<dyn RevocationCache>,
  pub http_client: reqwest::Client,
}

impl GatewayState {
  pub fn new(
    setting_service: Arc<dyn SettingService>,
    db_service: Arc<dyn DbService>,
    time_service: Arc<dyn TimeService>,
    key_service: Arc<KeyService>,
    idp_jwks: Arc<JwksClient>,
    revocation_cache: Arc<dyn RevocationCache>,
  ) -> Self {
    Self {
      setting_service,
      db_service,
      time_service,
      key_service,
      idp_jwks,
      revocation_cache,
      http_client: reqwest::Client::new(),
    }
  }

  /// URL of the RFC 9728 protected-resource document, advertised in 401
  /// challenges so MCP clients can start the linking flow.
  pub fn resource_metadata_url(&self) -> String {
    format!(
      "{}/v1/mcp/.well-known/oauth-protected-resource",
      self.setting_service.public_origin()
    )
  }
}
