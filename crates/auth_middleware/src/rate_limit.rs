use axum::{
  body::Body,
  extract::Request,
  http::StatusCode,
  middleware::Next,
  response::{IntoResponse, Response},
};
use objs::UserContext;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How long a user's ring may sit idle before the eviction task drops it.
const IDLE_EVICTION: Duration = Duration::from_secs(300);
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Per-replica sliding-window request cap keyed by user id. An availability
/// guard, not a quota mechanism; the daily quota lives in the authorizer.
#[derive(Debug)]
pub struct RateLimiter {
  max_requests: usize,
  window: Duration,
  clients: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
  pub fn new(max_requests: usize, window: Duration) -> Self {
    Self {
      max_requests,
      window,
      clients: Mutex::new(HashMap::new()),
    }
  }

  pub fn per_second(max_requests: u32) -> Self {
    Self::new(max_requests as usize, Duration::from_secs(1))
  }

  /// Returns true when the request is admitted. Timestamps are pruned on
  /// every check; the mutex is held only for the map operation.
  pub fn check(&self, user_id: &str) -> bool {
    let now = Instant::now();
    let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
    let timestamps = clients.entry(user_id.to_string()).or_default();
    timestamps.retain(|t| now.duration_since(*t) < self.window);
    if timestamps.len() >= self.max_requests {
      return false;
    }
    timestamps.push(now);
    true
  }

  /// Drops entries whose newest timestamp is older than `idle`.
  pub fn evict_idle(&self, idle: Duration) {
    let now = Instant::now();
    let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
    clients.retain(|_, timestamps| {
      timestamps
        .last()
        .is_some_and(|t| now.duration_since(*t) < idle)
    });
  }

  pub fn tracked_users(&self) -> usize {
    self
      .clients
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .len()
  }

  /// Background task bounding memory for idle users.
  pub fn spawn_eviction(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
    let limiter = Arc::clone(self);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
      loop {
        ticker.tick().await;
        limiter.evict_idle(IDLE_EVICTION);
      }
    })
  }
}

/// Middleware applying the limiter to the authenticated user. Must run after
/// the authorizer so the UserContext extension is present; anonymous
/// requests (well-known documents, ping) pass through.
pub async fn rate_limit_middleware(
  limiter: Arc<RateLimiter>,
  req: Request,
  next: Next,
) -> Response {
  let Some(ctx) = req.extensions().get::<UserContext>() else {
    return next.run(req).await;
  };
  if !limiter.check(&ctx.user_id) {
    tracing::warn!(user_id = %ctx.user_id, "rate limit exceeded");
    return rate_limited_response();
  }
  next.run(req).await
}

fn rate_limited_response() -> Response {
  let body = r#"{"error":"RATE_LIMIT_EXCEEDED","message":"too many requests, retry shortly"}"#;
  (
    StatusCode::TOO_MANY_REQUESTS,
    [
      ("Retry-After", "1"),
      ("Content-Type", "application/json"),
    ],
    Body::from(body),
  )
    .into_response()
}
