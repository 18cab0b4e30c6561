use crate::{EnvWrapper, SettingService};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// HashMap-backed environment for setting-service tests.
#[derive(Debug, Default)]
pub struct EnvWrapperStub {
  vars: Mutex<HashMap<String, String>>,
}

impl EnvWrapperStub {
  pub fn new(vars: &[(&str, &str)]) -> Self {
    Self {
      vars: Mutex::new(
        vars
          .iter()
          .map(|(k, v)| (k.to_string(), v.to_string()))
          .collect(),
      ),
    }
  }
}

impl EnvWrapper for EnvWrapperStub {
  fn var(&self, key: &str) -> Option<String> {
    self.vars.lock().unwrap().get(key).cloned()
  }
}

/// A fully-populated setting service for tests; every URL points at
/// localhost and keys are fixed test vectors.
pub fn test_setting_service() -> Arc<dyn SettingService> {
  let env = EnvWrapperStub::new(&[
    ("DATABASE_URL", "sqlite::memory:"),
    (
      "PORTAL_ENCRYPTION_KEY",
      "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=",
    ),
    (
      "PORTAL_SIGNING_KEY",
      "c2VjcmV0LXNlZWQtZm9yLXRlc3RzLTAxMjM0NTY3ODk=",
    ),
    ("PORTAL_IDP_ISSUER", "https://idp.test"),
    ("PORTAL_IDP_JWKS_URL", "https://idp.test/jwks.json"),
    ("PORTAL_SERVER_URL", "http://127.0.0.1:9400"),
    (
      "PORTAL_GATEWAY_JWKS_URL",
      "http://127.0.0.1:9300/.well-known/jwks.json",
    ),
    ("PORTAL_PUBLIC_ORIGIN", "http://127.0.0.1:9300"),
  ]);
  Arc::new(
    crate::DefaultSettingService::from_env(Arc::new(env)).expect("test settings are complete"),
  )
}
