use aes_gcm::{
  aead::{Aead, KeyInit},
  Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use objs::{AppError, ErrorType};
use pbkdf2::pbkdf2_hmac;
use rand::{rng, RngCore};
use sha2::Sha256;

const SALT_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const PBKDF2_ITERATIONS: u32 = 1000;

/// Version of the ciphertext layout; bumped when the key or format rotates.
pub const KEY_VERSION: i64 = 1;
const VERSION_PREFIX: &str = "v1";

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
  #[error("encryption failed")]
  EncryptionFailed,
  #[error("decryption failed")]
  DecryptionFailed,
  #[error("invalid ciphertext format: {0}")]
  InvalidFormat(String),
  #[error("encryption key must be 32 bytes of base64")]
  InvalidKey,
}

impl AppError for EncryptionError {
  fn error_type(&self) -> ErrorType {
    ErrorType::InternalServer
  }

  fn code(&self) -> String {
    "ENCRYPTION_ERROR".to_string()
  }
}

type Result<T> = std::result::Result<T, EncryptionError>;

/// AES-256-GCM over a PBKDF2-derived key. Ciphertext is
/// `v1:<b64 salt>:<b64 nonce>:<b64 data>` so the key may rotate behind a new
/// version prefix without rewriting stored rows first.
#[derive(Clone)]
pub struct Cipher {
  master_key: Vec<u8>,
}

impl std::fmt::Debug for Cipher {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Cipher").finish_non_exhaustive()
  }
}

impl Cipher {
  pub fn new(master_key: impl AsRef<[u8]>) -> Self {
    Self {
      master_key: master_key.as_ref().to_vec(),
    }
  }

  pub fn from_base64(key_b64: &str) -> Result<Self> {
    let key = BASE64
      .decode(key_b64)
      .map_err(|_| EncryptionError::InvalidKey)?;
    if key.len() != 32 {
      return Err(EncryptionError::InvalidKey);
    }
    Ok(Self::new(key))
  }

  fn derive_key(&self, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(&self.master_key, salt, PBKDF2_ITERATIONS, &mut key);
    key
  }

  pub fn encrypt(&self, plaintext: &str) -> Result<String> {
    let mut salt = [0u8; SALT_SIZE];
    let mut nonce = [0u8; NONCE_SIZE];
    rng().fill_bytes(&mut salt);
    rng().fill_bytes(&mut nonce);

    let key = self.derive_key(&salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let encrypted = cipher
      .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
      .map_err(|_| EncryptionError::EncryptionFailed)?;

    Ok(format!(
      "{VERSION_PREFIX}:{}:{}:{}",
      BASE64.encode(salt),
      BASE64.encode(nonce),
      BASE64.encode(encrypted)
    ))
  }

  pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
    let parts: Vec<&str> = ciphertext.split(':').collect();
    let [version, salt, nonce, data] = parts.as_slice() else {
      return Err(EncryptionError::InvalidFormat(
        "expected 4 colon-separated segments".to_string(),
      ));
    };
    if *version != VERSION_PREFIX {
      return Err(EncryptionError::InvalidFormat(format!(
        "unknown ciphertext version: {version}"
      )));
    }

    let salt = BASE64
      .decode(salt)
      .map_err(|_| EncryptionError::InvalidFormat("invalid salt".to_string()))?;
    let nonce = BASE64
      .decode(nonce)
      .map_err(|_| EncryptionError::InvalidFormat("invalid nonce".to_string()))?;
    let data = BASE64
      .decode(data)
      .map_err(|_| EncryptionError::InvalidFormat("invalid data".to_string()))?;

    let key = self.derive_key(&salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let decrypted = cipher
      .decrypt(Nonce::from_slice(&nonce), data.as_ref())
      .map_err(|_| EncryptionError::DecryptionFailed)?;

    String::from_utf8(decrypted)
      .map_err(|_| EncryptionError::InvalidFormat("invalid utf-8 in plaintext".to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::{Cipher, EncryptionError};
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn cipher() -> Cipher {
    Cipher::new(b"test-master-key-0123456789abcdef")
  }

  #[rstest]
  #[case("")]
  #[case("short")]
  #[case(r#"{"auth_type":"oauth2","access_token":"ya29.a0AfH6"}"#)]
  fn test_encrypt_decrypt_round_trip(#[case] plaintext: &str) -> anyhow::Result<()> {
    let cipher = cipher();
    let encrypted = cipher.encrypt(plaintext)?;
    assert!(encrypted.starts_with("v1:"));
    assert_eq!(plaintext, cipher.decrypt(&encrypted)?);
    Ok(())
  }

  #[rstest]
  fn test_same_plaintext_distinct_ciphertexts() -> anyhow::Result<()> {
    let cipher = cipher();
    let a = cipher.encrypt("secret")?;
    let b = cipher.encrypt("secret")?;
    assert_ne!(a, b);
    Ok(())
  }

  #[rstest]
  fn test_wrong_key_fails() -> anyhow::Result<()> {
    let encrypted = cipher().encrypt("secret")?;
    let other = Cipher::new(b"other-master-key-0123456789abcde");
    assert!(matches!(
      other.decrypt(&encrypted),
      Err(EncryptionError::DecryptionFailed)
    ));
    Ok(())
  }

  #[rstest]
  #[case("not-even-close")]
  #[case("v2:a:b:c")]
  #[case("v1:!!!:!!!:!!!")]
  fn test_malformed_ciphertext_rejected(#[case] input: &str) {
    assert!(matches!(
      cipher().decrypt(input),
      Err(EncryptionError::InvalidFormat(_))
    ));
  }

  #[rstest]
  fn test_from_base64_requires_32_bytes() {
    assert!(Cipher::from_base64("dG9vLXNob3J0").is_err());
    assert!(
      Cipher::from_base64("MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=").is_ok()
    );
  }
}
