use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix carried by every issued API key; the remainder is a signed JWT.
pub const API_KEY_PREFIX: &str = "mpt_";

/// Issuer claim of gateway tokens minted at the edge.
pub const GATEWAY_TOKEN_ISSUER: &str = "gateway";

/// Lifetime of a gateway token in seconds.
pub const GATEWAY_TOKEN_TTL_SECS: i64 = 30;

/// Server-side metadata for an issued API key. The key itself is never stored;
/// only this row plus the JWT signature tie a presented key to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiKey {
  pub id: String,
  pub user_id: String,
  pub jwt_kid: String,
  pub key_prefix: String,
  pub display_name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub expires_at: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_used_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
}

/// Claims inside an API-key JWT. `kid` here is the API-key row id, not the
/// signing key id (which lives in the JWT header).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyClaims {
  pub sub: String,
  pub kid: String,
  pub iat: i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub exp: Option<i64>,
}

/// Claims inside a gateway token. Exactly one of `user_id` / `external_id`
/// is set, depending on which edge authentication path produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayClaims {
  pub iss: String,
  pub iat: i64,
  pub exp: i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub external_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
}

impl GatewayClaims {
  pub fn for_user_id(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
    Self {
      iss: GATEWAY_TOKEN_ISSUER.to_string(),
      iat: now.timestamp(),
      exp: now.timestamp() + GATEWAY_TOKEN_TTL_SECS,
      user_id: Some(user_id.into()),
      external_id: None,
      email: None,
    }
  }

  pub fn for_external_id(
    external_id: impl Into<String>,
    email: Option<String>,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      iss: GATEWAY_TOKEN_ISSUER.to_string(),
      iat: now.timestamp(),
      exp: now.timestamp() + GATEWAY_TOKEN_TTL_SECS,
      user_id: None,
      external_id: Some(external_id.into()),
      email,
    }
  }
}

/// Subset of claims the gateway reads from an IdP-issued end-user JWT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdpClaims {
  pub sub: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  pub exp: i64,
}
