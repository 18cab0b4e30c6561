use objs::{AppError, ErrorType};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};

/// Outbound buffer per SSE session; a full buffer drops messages rather than
/// blocking the protocol server.
pub const SESSION_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
  #[error("unknown session '{0}'")]
  NotFound(String),
}

impl AppError for SessionError {
  fn error_type(&self) -> ErrorType {
    ErrorType::NotFound
  }

  fn code(&self) -> String {
    "SESSION_NOT_FOUND".to_string()
  }
}

/// Long-lived per-client state for the SSE transport: session id → bounded
/// outbound channel. Sessions live exactly as long as their SSE connection.
#[derive(Debug, Default)]
pub struct SessionManager {
  sessions: Mutex<HashMap<String, Sender<String>>>,
}

impl SessionManager {
  /// Registers a new session and hands back its id and the receiving half
  /// that feeds the SSE body.
  pub fn create_session(&self) -> (String, Receiver<String>) {
    let session_id = random_session_id();
    let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
    self
      .sessions
      .lock()
      .expect("session table poisoned")
      .insert(session_id.clone(), tx);
    (session_id, rx)
  }

  pub fn remove_session(&self, session_id: &str) {
    self
      .sessions
      .lock()
      .expect("session table poisoned")
      .remove(session_id);
  }

  pub fn has_session(&self, session_id: &str) -> bool {
    self
      .sessions
      .lock()
      .expect("session table poisoned")
      .contains_key(session_id)
  }

  /// Queues a `message` event. Never blocks: a full buffer drops the message
  /// with a warning (the client is expected to reconnect), a vanished
  /// receiver unregisters the session.
  pub fn send_message(&self, session_id: &str, payload: &str) -> Result<(), SessionError> {
    let frame = sse_event("message", payload);
    let sender = {
      let sessions = self.sessions.lock().expect("session table poisoned");
      sessions
        .get(session_id)
        .cloned()
        .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?
    };
    match sender.try_send(frame) {
      Ok(()) => Ok(()),
      Err(TrySendError::Full(_)) => {
        tracing::warn!(session_id, "sse buffer full, dropping message");
        Ok(())
      }
      Err(TrySendError::Closed(_)) => {
        self.remove_session(session_id);
        Err(SessionError::NotFound(session_id.to_string()))
      }
    }
  }

  pub fn session_count(&self) -> usize {
    self.sessions.lock().expect("session table poisoned").len()
  }
}

/// Formats one SSE frame.
pub fn sse_event(event: &str, data: &str) -> String {
  format!("event: {event}\ndata: {data}\n\n")
}

fn random_session_id() -> String {
  let mut bytes = [0u8; 16];
  rand::rng().fill_bytes(&mut bytes);
  bytes.iter().map(|b| format!("{b:02x}")).collect()
}
