use mini_moka::sync::Cache;
use std::time::Duration;

/// How long a positive database check is trusted. A deleted key can keep
/// authenticating on a replica that missed the invalidation for at most this
/// long.
pub const REVOCATION_CACHE_TTL: Duration = Duration::from_secs(30);

/// Remembers which API-key ids recently passed the revocation check against
/// the api_keys table. The management API drops an entry the instant a key
/// is deleted; everywhere else staleness is bounded by the TTL.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait RevocationCache: Send + Sync + std::fmt::Debug {
  /// Records that the key row exists and is not expired.
  fn mark_valid(&self, api_key_id: &str);

  /// True when a sufficiently fresh positive check is on record.
  fn is_valid(&self, api_key_id: &str) -> bool;

  /// Forgets a key id immediately, forcing the next presenter of that key
  /// back to the database.
  fn invalidate(&self, api_key_id: &str);
}

#[derive(Debug)]
pub struct MokaRevocationCache {
  cache: Cache<String, ()>,
}

impl Default for MokaRevocationCache {
  fn default() -> Self {
    Self::with_ttl(REVOCATION_CACHE_TTL)
  }
}

impl MokaRevocationCache {
  pub fn with_ttl(ttl: Duration) -> Self {
    Self {
      cache: Cache::builder().time_to_live(ttl).build(),
    }
  }
}

impl RevocationCache for MokaRevocationCache {
  fn mark_valid(&self, api_key_id: &str) {
    self.cache.insert(api_key_id.to_string(), ());
  }

  fn is_valid(&self, api_key_id: &str) -> bool {
    self.cache.contains_key(&api_key_id.to_string())
  }

  fn invalidate(&self, api_key_id: &str) {
    self.cache.invalidate(&api_key_id.to_string());
  }
}

#[cfg(test)]
mod tests {
  use crate::{MokaRevocationCache, RevocationCache};
  use std::time::Duration;

  #[test]
  fn test_mark_then_invalidate() {
    let cache = MokaRevocationCache::default();
    assert!(!cache.is_valid("key-1"));

    cache.mark_valid("key-1");
    assert!(cache.is_valid("key-1"));
    assert!(!cache.is_valid("key-2"));

    cache.invalidate("key-1");
    assert!(!cache.is_valid("key-1"));
  }

  #[tokio::test]
  async fn test_positive_check_expires_after_ttl() {
    let cache = MokaRevocationCache::with_ttl(Duration::from_millis(50));
    cache.mark_valid("key-1");
    assert!(cache.is_valid("key-1"));
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!cache.is_valid("key-1"));
  }
}
