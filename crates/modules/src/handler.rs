use objs::{AppError, ErrorType, ModuleDef};
use serde_json::Value;
use services::{TokenBroker, TokenBrokerError};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
  #[error("unknown tool '{tool}' in module '{module}'")]
  UnknownTool { module: String, tool: String },
  #[error("invalid params for '{tool}': {reason}")]
  InvalidParams { tool: String, reason: String },
  #[error(transparent)]
  Broker(#[from] TokenBrokerError),
  /// Provider-side failure: surfaced to the caller as a tool error
  /// (`isError: true`), never as an internal fault.
  #[error("provider returned {status}: {body}")]
  Provider { status: u16, body: String },
  #[error("network error calling provider: {0}")]
  Network(String),
}

impl ModuleError {
  /// True for failures the MCP layer reports inside the tool result rather
  /// than as a JSON-RPC error.
  pub fn is_execution_error(&self) -> bool {
    matches!(
      self,
      ModuleError::Provider { .. } | ModuleError::Network(_) | ModuleError::Broker(_)
    )
  }
}

impl From<reqwest::Error> for ModuleError {
  fn from(value: reqwest::Error) -> Self {
    ModuleError::Network(value.to_string())
  }
}

impl AppError for ModuleError {
  fn error_type(&self) -> ErrorType {
    match self {
      ModuleError::UnknownTool { .. } | ModuleError::InvalidParams { .. } => ErrorType::BadRequest,
      ModuleError::Broker(e) => e.error_type(),
      ModuleError::Provider { .. } | ModuleError::Network(_) => ErrorType::InternalServer,
    }
  }

  fn code(&self) -> String {
    match self {
      ModuleError::UnknownTool { .. } => "UNKNOWN_TOOL".to_string(),
      ModuleError::InvalidParams { .. } => "INVALID_PARAMS".to_string(),
      ModuleError::Broker(e) => e.code(),
      ModuleError::Provider { .. } => "PROVIDER_ERROR".to_string(),
      ModuleError::Network(_) => "PROVIDER_UNREACHABLE".to_string(),
    }
  }
}

/// Per-invocation context handed to a module handler. The handler pulls its
/// credential through the broker, which refreshes transparently.
pub struct ModuleContext {
  pub user_id: String,
  pub request_id: String,
  pub token_broker: Arc<dyn TokenBroker>,
}

impl ModuleContext {
  pub fn new(
    user_id: impl Into<String>,
    request_id: impl Into<String>,
    token_broker: Arc<dyn TokenBroker>,
  ) -> Self {
    Self {
      user_id: user_id.into(),
      request_id: request_id.into(),
      token_broker,
    }
  }
}

/// Contract every provider module implements: declarative tool descriptors,
/// an executor returning raw provider JSON, and a per-tool compact projection
/// for LLM consumption.
#[async_trait::async_trait]
pub trait ModuleHandler: Send + Sync {
  fn definition(&self) -> &ModuleDef;

  async fn run(&self, ctx: &ModuleContext, tool: &str, params: &Value)
    -> Result<String, ModuleError>;

  /// Maps raw JSON output to a terse, stable textual projection. Falls back
  /// to the raw text when the payload does not parse.
  fn compact(&self, tool: &str, json_text: &str) -> String;
}

/// Shared helper: required string parameter lookup.
pub fn required_str<'a>(params: &'a Value, tool: &str, key: &str) -> Result<&'a str, ModuleError> {
  params
    .get(key)
    .and_then(Value::as_str)
    .filter(|s| !s.is_empty())
    .ok_or_else(|| ModuleError::InvalidParams {
      tool: tool.to_string(),
      reason: format!("missing required parameter '{key}'"),
    })
}

/// Shared helper: turn a provider response into `Ok(body)` or a provider
/// error that keeps status and body for the tool result.
pub async fn provider_body(response: reqwest::Response) -> Result<String, ModuleError> {
  let status = response.status();
  let body = response.text().await?;
  if status.is_success() {
    Ok(body)
  } else {
    Err(ModuleError::Provider {
      status: status.as_u16(),
      body,
    })
  }
}
