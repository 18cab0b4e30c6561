use objs::{AppError, ErrorType};
use std::sync::Arc;

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_ENCRYPTION_KEY: &str = "PORTAL_ENCRYPTION_KEY";
pub const ENV_SIGNING_KEY: &str = "PORTAL_SIGNING_KEY";
pub const ENV_IDP_ISSUER: &str = "PORTAL_IDP_ISSUER";
pub const ENV_IDP_JWKS_URL: &str = "PORTAL_IDP_JWKS_URL";
pub const ENV_SERVER_URL: &str = "PORTAL_SERVER_URL";
pub const ENV_GATEWAY_JWKS_URL: &str = "PORTAL_GATEWAY_JWKS_URL";
pub const ENV_CONSOLE_URL: &str = "PORTAL_CONSOLE_URL";
pub const ENV_PUBLIC_ORIGIN: &str = "PORTAL_PUBLIC_ORIGIN";
pub const ENV_HOST: &str = "PORTAL_HOST";
pub const ENV_PORT: &str = "PORTAL_PORT";
pub const ENV_RATE_LIMIT_RPS: &str = "PORTAL_RATE_LIMIT_RPS";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 9300;
const DEFAULT_RATE_LIMIT_RPS: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum SettingError {
  #[error("required environment variable '{0}' is not set")]
  MissingVar(String),
  #[error("environment variable '{key}' is invalid: {reason}")]
  InvalidVar { key: String, reason: String },
}

impl AppError for SettingError {
  fn error_type(&self) -> ErrorType {
    ErrorType::InvalidAppState
  }

  fn code(&self) -> String {
    "INVALID_CONFIGURATION".to_string()
  }
}

/// Thin indirection over the process environment so tests can inject values.
pub trait EnvWrapper: Send + Sync + std::fmt::Debug {
  fn var(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct DefaultEnvWrapper;

impl EnvWrapper for DefaultEnvWrapper {
  fn var(&self, key: &str) -> Option<String> {
    std::env::var(key).ok()
  }
}

#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait SettingService: Send + Sync + std::fmt::Debug {
  fn database_url(&self) -> String;

  fn encryption_key(&self) -> String;

  fn signing_key_seed(&self) -> String;

  fn idp_issuer(&self) -> String;

  fn idp_jwks_url(&self) -> String;

  fn server_url(&self) -> String;

  fn gateway_jwks_url(&self) -> String;

  fn console_url(&self) -> Option<String>;

  fn public_origin(&self) -> String;

  fn host(&self) -> String;

  fn port(&self) -> u16;

  fn rate_limit_rps(&self) -> u32;
}

/// Environment snapshot taken once at boot; missing required keys fail fast.
#[derive(Debug)]
pub struct DefaultSettingService {
  database_url: String,
  encryption_key: String,
  signing_key_seed: String,
  idp_issuer: String,
  idp_jwks_url: String,
  server_url: String,
  gateway_jwks_url: String,
  console_url: Option<String>,
  public_origin: String,
  host: String,
  port: u16,
  rate_limit_rps: u32,
}

impl DefaultSettingService {
  pub fn from_env(env: Arc<dyn EnvWrapper>) -> Result<Self, SettingError> {
    let required = |key: &str| {
      env
        .var(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| SettingError::MissingVar(key.to_string()))
    };

    let port = match env.var(ENV_PORT) {
      Some(raw) => raw.parse::<u16>().map_err(|e| SettingError::InvalidVar {
        key: ENV_PORT.to_string(),
        reason: e.to_string(),
      })?,
      None => DEFAULT_PORT,
    };
    let rate_limit_rps = match env.var(ENV_RATE_LIMIT_RPS) {
      Some(raw) => raw.parse::<u32>().map_err(|e| SettingError::InvalidVar {
        key: ENV_RATE_LIMIT_RPS.to_string(),
        reason: e.to_string(),
      })?,
      None => DEFAULT_RATE_LIMIT_RPS,
    };

    Ok(Self {
      database_url: required(ENV_DATABASE_URL)?,
      encryption_key: required(ENV_ENCRYPTION_KEY)?,
      signing_key_seed: required(ENV_SIGNING_KEY)?,
      idp_issuer: required(ENV_IDP_ISSUER)?,
      idp_jwks_url: required(ENV_IDP_JWKS_URL)?,
      server_url: required(ENV_SERVER_URL)?,
      gateway_jwks_url: required(ENV_GATEWAY_JWKS_URL)?,
      console_url: env.var(ENV_CONSOLE_URL).filter(|v| !v.trim().is_empty()),
      public_origin: required(ENV_PUBLIC_ORIGIN)?,
      host: env.var(ENV_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string()),
      port,
      rate_limit_rps,
    })
  }
}

impl SettingService for DefaultSettingService {
  fn database_url(&self) -> String {
    self.database_url.clone()
  }

  fn encryption_key(&self) -> String {
    self.encryption_key.clone()
  }

  fn signing_key_seed(&self) -> String {
    self.signing_key_seed.clone()
  }

  fn idp_issuer(&self) -> String {
    self.idp_issuer.clone()
  }

  fn idp_jwks_url(&self) -> String {
    self.idp_jwks_url.clone()
  }

  fn server_url(&self) -> String {
    self.server_url.clone()
  }

  fn gateway_jwks_url(&self) -> String {
    self.gateway_jwks_url.clone()
  }

  fn console_url(&self) -> Option<String> {
    self.console_url.clone()
  }

  fn public_origin(&self) -> String {
    self.public_origin.clone()
  }

  fn host(&self) -> String {
    self.host.clone()
  }

  fn port(&self) -> u16 {
    self.port
  }

  fn rate_limit_rps(&self) -> u32 {
    self.rate_limit_rps
  }
}

#[cfg(test)]
mod tests {
  use super::{DefaultSettingService, SettingError};
  use crate::test_utils::EnvWrapperStub;
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use std::sync::Arc;

  fn full_env() -> Vec<(&'static str, &'static str)> {
    vec![
      ("DATABASE_URL", "sqlite::memory:"),
      ("PORTAL_ENCRYPTION_KEY", "a-key"),
      ("PORTAL_SIGNING_KEY", "a-seed"),
      ("PORTAL_IDP_ISSUER", "https://idp.test"),
      ("PORTAL_IDP_JWKS_URL", "https://idp.test/jwks.json"),
      ("PORTAL_SERVER_URL", "http://server:9400"),
      ("PORTAL_GATEWAY_JWKS_URL", "http://gateway:9300/.well-known/jwks.json"),
      ("PORTAL_PUBLIC_ORIGIN", "https://portal.test"),
    ]
  }

  #[rstest]
  fn test_from_env_defaults() -> anyhow::Result<()> {
    let env = EnvWrapperStub::new(&full_env());
    let settings = DefaultSettingService::from_env(Arc::new(env))?;
    use crate::SettingService;
    assert_eq!(9300, settings.port());
    assert_eq!("0.0.0.0", settings.host());
    assert_eq!(10, settings.rate_limit_rps());
    assert_eq!(None, settings.console_url());
    Ok(())
  }

  #[rstest]
  fn test_missing_required_var_fails_fast() {
    let mut vars = full_env();
    vars.retain(|(k, _)| *k != "PORTAL_ENCRYPTION_KEY");
    let env = EnvWrapperStub::new(&vars);
    let result = DefaultSettingService::from_env(Arc::new(env));
    assert!(matches!(result, Err(SettingError::MissingVar(key)) if key == "PORTAL_ENCRYPTION_KEY"));
  }

  #[rstest]
  fn test_invalid_port_rejected() {
    let mut vars = full_env();
    vars.push(("PORTAL_PORT", "not-a-port"));
    let env = EnvWrapperStub::new(&vars);
    assert!(matches!(
      DefaultSettingService::from_env(Arc::new(env)),
      Err(SettingError::InvalidVar { .. })
    ));
  }
}
