use base64::{
  engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64_URL},
  Engine,
};
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::SigningKey;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use objs::{AppError, ErrorType};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// How long a fetched JWKS document is trusted before a background refetch.
pub const JWKS_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum KeyServiceError {
  #[error("signing key seed must be 32 bytes of base64")]
  InvalidSeed,
  #[error("jwt error: {0}")]
  Jwt(#[from] jsonwebtoken::errors::Error),
  #[error("jwks fetch failed: {0}")]
  JwksFetch(String),
  #[error("no key with kid '{0}' in jwks")]
  UnknownKid(String),
  #[error("unsupported jwk key type: {0}")]
  UnsupportedKeyType(String),
}

impl AppError for KeyServiceError {
  fn error_type(&self) -> ErrorType {
    match self {
      KeyServiceError::InvalidSeed => ErrorType::InvalidAppState,
      KeyServiceError::Jwt(_) | KeyServiceError::UnknownKid(_) => ErrorType::Authentication,
      KeyServiceError::JwksFetch(_) | KeyServiceError::UnsupportedKeyType(_) => {
        ErrorType::InternalServer
      }
    }
  }

  fn code(&self) -> String {
    match self {
      KeyServiceError::InvalidSeed => "INVALID_SIGNING_KEY",
      KeyServiceError::Jwt(_) | KeyServiceError::UnknownKid(_) => "INVALID_TOKEN",
      KeyServiceError::JwksFetch(_) => "JWKS_FETCH_FAILED",
      KeyServiceError::UnsupportedKeyType(_) => "UNSUPPORTED_KEY_TYPE",
    }
    .to_string()
  }
}

type Result<T> = std::result::Result<T, KeyServiceError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
  pub kty: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub crv: Option<String>,
  /// Ed25519 public key, base64url.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub x: Option<String>,
  /// RSA modulus / exponent, base64url.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub n: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub e: Option<String>,
  pub kid: String,
  #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
  pub use_: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub alg: Option<String>,
}

impl Jwk {
  pub fn to_decoding_key(&self) -> Result<(DecodingKey, Algorithm)> {
    match self.kty.as_str() {
      "OKP" => {
        let x = self
          .x
          .as_deref()
          .ok_or_else(|| KeyServiceError::UnsupportedKeyType("OKP without x".to_string()))?;
        Ok((DecodingKey::from_ed_components(x)?, Algorithm::EdDSA))
      }
      "RSA" => {
        let (n, e) = match (self.n.as_deref(), self.e.as_deref()) {
          (Some(n), Some(e)) => (n, e),
          _ => {
            return Err(KeyServiceError::UnsupportedKeyType(
              "RSA without n/e".to_string(),
            ))
          }
        };
        let alg = match self.alg.as_deref() {
          Some("RS384") => Algorithm::RS384,
          Some("RS512") => Algorithm::RS512,
          _ => Algorithm::RS256,
        };
        Ok((DecodingKey::from_rsa_components(n, e)?, alg))
      }
      other => Err(KeyServiceError::UnsupportedKeyType(other.to_string())),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwks {
  pub keys: Vec<Jwk>,
}

impl Jwks {
  pub fn find(&self, kid: &str) -> Option<&Jwk> {
    self.keys.iter().find(|k| k.kid == kid)
  }
}

/// Process-wide Ed25519 key pair. Signs both API-key JWTs (protocol server)
/// and gateway tokens (gateway); the public half is published at
/// `/.well-known/jwks.json`.
pub struct KeyService {
  encoding_key: EncodingKey,
  decoding_key: DecodingKey,
  public_key_b64: String,
  kid: String,
}

impl std::fmt::Debug for KeyService {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("KeyService").field("kid", &self.kid).finish()
  }
}

impl KeyService {
  pub fn from_seed_base64(seed_b64: &str) -> Result<Self> {
    let seed = BASE64
      .decode(seed_b64.trim())
      .map_err(|_| KeyServiceError::InvalidSeed)?;
    let seed: [u8; 32] = seed.try_into().map_err(|_| KeyServiceError::InvalidSeed)?;
    let signing_key = SigningKey::from_bytes(&seed);

    let der = signing_key
      .to_pkcs8_der()
      .map_err(|_| KeyServiceError::InvalidSeed)?;
    let encoding_key = EncodingKey::from_ed_der(der.as_bytes());

    let public = signing_key.verifying_key().to_bytes();
    let public_key_b64 = BASE64_URL.encode(public);
    let decoding_key = DecodingKey::from_ed_components(&public_key_b64)?;

    // kid is derived from the public key so it is stable across restarts
    let digest = Sha256::digest(public);
    let kid = hex_encode(&digest[..8]);

    Ok(Self {
      encoding_key,
      decoding_key,
      public_key_b64,
      kid,
    })
  }

  pub fn kid(&self) -> &str {
    &self.kid
  }

  pub fn jwks(&self) -> Jwks {
    Jwks {
      keys: vec![Jwk {
        kty: "OKP".to_string(),
        crv: Some("Ed25519".to_string()),
        x: Some(self.public_key_b64.clone()),
        n: None,
        e: None,
        kid: self.kid.clone(),
        use_: Some("sig".to_string()),
        alg: Some("EdDSA".to_string()),
      }],
    }
  }

  pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String> {
    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(self.kid.clone());
    Ok(jsonwebtoken::encode(&header, claims, &self.encoding_key)?)
  }

  pub fn verify<T: DeserializeOwned>(&self, token: &str, validation: &Validation) -> Result<T> {
    let data = jsonwebtoken::decode::<T>(token, &self.decoding_key, validation)?;
    Ok(data.claims)
  }
}

struct CachedJwks {
  fetched_at: Instant,
  jwks: Jwks,
}

/// Fetches and caches a remote JWKS document. Unknown kids force an immediate
/// refetch (key rotation); when the refetch fails a previously cached
/// document keeps serving.
pub struct JwksClient {
  url: String,
  client: reqwest::Client,
  ttl: Duration,
  cache: RwLock<Option<CachedJwks>>,
}

impl std::fmt::Debug for JwksClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("JwksClient").field("url", &self.url).finish()
  }
}

impl JwksClient {
  pub fn new(url: impl Into<String>) -> Arc<Self> {
    Self::with_ttl(url, JWKS_CACHE_TTL)
  }

  pub fn with_ttl(url: impl Into<String>, ttl: Duration) -> Arc<Self> {
    Arc::new(Self {
      url: url.into(),
      client: reqwest::Client::new(),
      ttl,
      cache: RwLock::new(None),
    })
  }

  async fn fetch(&self) -> Result<Jwks> {
    let response = self
      .client
      .get(&self.url)
      .send()
      .await
      .map_err(|e| KeyServiceError::JwksFetch(e.to_string()))?;
    if !response.status().is_success() {
      return Err(KeyServiceError::JwksFetch(format!(
        "jwks endpoint returned {}",
        response.status()
      )));
    }
    response
      .json::<Jwks>()
      .await
      .map_err(|e| KeyServiceError::JwksFetch(e.to_string()))
  }

  /// Resolves the decoding key for `kid`, consulting the cache first.
  pub async fn decoding_key(&self, kid: &str) -> Result<(DecodingKey, Algorithm)> {
    {
      let cache = self.cache.read().await;
      if let Some(cached) = cache.as_ref() {
        if cached.fetched_at.elapsed() < self.ttl {
          if let Some(jwk) = cached.jwks.find(kid) {
            return jwk.to_decoding_key();
          }
          // fall through: unknown kid forces refetch
        }
      }
    }

    let mut cache = self.cache.write().await;
    // another writer may have refreshed while we waited
    if let Some(cached) = cache.as_ref() {
      if cached.fetched_at.elapsed() < self.ttl {
        if let Some(jwk) = cached.jwks.find(kid) {
          return jwk.to_decoding_key();
        }
      }
    }

    match self.fetch().await {
      Ok(jwks) => {
        *cache = Some(CachedJwks {
          fetched_at: Instant::now(),
          jwks,
        });
      }
      Err(err) => {
        // stale cache beats no cache
        if cache.is_none() {
          return Err(err);
        }
        tracing::warn!(url = %self.url, error = %err, "jwks refetch failed, serving stale cache");
      }
    }

    let cached = cache.as_ref().expect("cache populated above");
    cached
      .jwks
      .find(kid)
      .ok_or_else(|| KeyServiceError::UnknownKid(kid.to_string()))?
      .to_decoding_key()
  }
}

fn hex_encode(bytes: &[u8]) -> String {
  bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// 128-bit random request id, lowercase hex.
pub fn generate_request_id() -> String {
  use rand::RngCore;
  let mut bytes = [0u8; 16];
  rand::rng().fill_bytes(&mut bytes);
  hex_encode(&bytes)
}
