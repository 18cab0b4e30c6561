use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuthType {
  Oauth1,
  Oauth2,
  ApiKey,
  Basic,
}

/// Decrypted credential material for one `(user, module)` pair. The field set
/// depends on `auth_type`; anything provider-specific rides in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBlob {
  pub auth_type: AuthType,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub access_token: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub refresh_token: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub token_type: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub scope: Option<String>,
  /// Unix seconds at which the access token expires.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub expires_at: Option<i64>,
  #[serde(flatten)]
  pub extra: HashMap<String, serde_json::Value>,
}

impl CredentialBlob {
  pub fn api_key(token: impl Into<String>) -> Self {
    Self {
      auth_type: AuthType::ApiKey,
      access_token: Some(token.into()),
      refresh_token: None,
      token_type: None,
      scope: None,
      expires_at: None,
      extra: HashMap::new(),
    }
  }

  pub fn oauth2(
    access_token: impl Into<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
  ) -> Self {
    Self {
      auth_type: AuthType::Oauth2,
      access_token: Some(access_token.into()),
      refresh_token,
      token_type: Some("Bearer".to_string()),
      scope: None,
      expires_at,
      extra: HashMap::new(),
    }
  }

  /// True when the token expires within `skew_secs` of `now` (or already has).
  /// Credentials without an expiry never report as expiring.
  pub fn expires_within(&self, now: DateTime<Utc>, skew_secs: i64) -> bool {
    match self.expires_at {
      Some(expires_at) => expires_at <= now.timestamp() + skew_secs,
      None => false,
    }
  }
}

/// Per-provider OAuth client registration used when refreshing tokens.
/// `encrypted_client_secret` is AEAD ciphertext; the plaintext secret never
/// leaves the token broker.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthApp {
  pub provider: String,
  pub client_id: String,
  pub encrypted_client_secret: String,
  pub redirect_uri: String,
  pub enabled: bool,
}

/// Persisted (encrypted) credential row metadata. Plaintext never appears here.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialRow {
  pub user_id: String,
  pub module_name: String,
  pub encrypted_blob: String,
  pub key_version: i64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::CredentialBlob;
  use chrono::Utc;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn test_expires_within_skew() {
    let now = Utc::now();
    let blob = CredentialBlob::oauth2("tok", None, Some(now.timestamp() + 30));
    assert!(blob.expires_within(now, 60));
    assert!(!blob.expires_within(now, 10));
  }

  #[rstest]
  fn test_no_expiry_never_expires() {
    let blob = CredentialBlob::api_key("sk-123");
    assert!(!blob.expires_within(Utc::now(), i64::MAX / 2));
  }

  #[rstest]
  fn test_blob_serde_round_trip_preserves_extra() {
    let mut blob = CredentialBlob::oauth2("tok", Some("ref".to_string()), Some(42));
    blob
      .extra
      .insert("workspace_id".to_string(), serde_json::json!("ws-1"));
    let text = serde_json::to_string(&blob).unwrap();
    let parsed: CredentialBlob = serde_json::from_str(&text).unwrap();
    assert_eq!(blob, parsed);
  }
}
