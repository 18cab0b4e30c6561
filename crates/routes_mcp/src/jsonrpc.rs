use objs::AuthzError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const PERMISSION_DENIED: i64 = -32001;
pub const USAGE_LIMIT_EXCEEDED: i64 = -32002;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
  pub jsonrpc: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<Value>,
  pub method: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub params: Option<Value>,
}

impl JsonRpcRequest {
  pub fn is_notification(&self) -> bool {
    self.id.is_none()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
  pub code: i64,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data: Option<Value>,
}

impl JsonRpcError {
  pub fn new(code: i64, message: impl Into<String>) -> Self {
    Self {
      code,
      message: message.into(),
      data: None,
    }
  }

  pub fn invalid_params(message: impl Into<String>) -> Self {
    Self::new(INVALID_PARAMS, message)
  }

  pub fn method_not_found(method: &str) -> Self {
    Self::new(METHOD_NOT_FOUND, format!("method not found: {method}"))
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::new(INTERNAL_ERROR, message)
  }

  pub fn parse_error() -> Self {
    Self::new(PARSE_ERROR, "parse error")
  }
}

/// Authorizer failures map onto the two application codes; anything else is
/// an internal fault.
impl From<AuthzError> for JsonRpcError {
  fn from(value: AuthzError) -> Self {
    let code = match &value {
      AuthzError::UsageLimitExceeded { .. } => USAGE_LIMIT_EXCEEDED,
      AuthzError::ModuleNotEnabled(_) | AuthzError::ToolDisabled(_) => PERMISSION_DENIED,
      AuthzError::AccountNotActive(_) => INTERNAL_ERROR,
    };
    Self::new(code, value.to_string())
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
  pub jsonrpc: String,
  pub id: Value,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
  pub fn success(id: Value, result: Value) -> Self {
    Self {
      jsonrpc: JSONRPC_VERSION.to_string(),
      id,
      result: Some(result),
      error: None,
    }
  }

  pub fn error(id: Value, error: JsonRpcError) -> Self {
    Self {
      jsonrpc: JSONRPC_VERSION.to_string(),
      id,
      result: None,
      error: Some(error),
    }
  }
}

// MCP result payloads

pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";
pub const SERVER_NAME: &str = "mcp-portal";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
  pub protocol_version: String,
  pub capabilities: ServerCapabilities,
  pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
  pub tools: Value,
  pub prompts: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
  pub name: String,
  pub version: String,
}

impl InitializeResult {
  pub fn current() -> Self {
    Self {
      protocol_version: MCP_PROTOCOL_VERSION.to_string(),
      capabilities: ServerCapabilities {
        tools: serde_json::json!({}),
        prompts: serde_json::json!({}),
      },
      server_info: ServerInfo {
        name: SERVER_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
      },
    }
  }
}

/// Wire form of a tool in `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub input_schema: Value,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub annotations: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
  pub tools: Vec<McpTool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
  pub content: Vec<ContentItem>,
  pub is_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
  Text { text: String },
}

impl CallToolResult {
  pub fn text(text: impl Into<String>) -> Self {
    Self {
      content: vec![ContentItem::Text { text: text.into() }],
      is_error: false,
    }
  }

  pub fn error_text(text: impl Into<String>) -> Self {
    Self {
      content: vec![ContentItem::Text { text: text.into() }],
      is_error: true,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsListResult {
  pub prompts: Vec<PromptInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptInfo {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptResult {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub messages: Vec<PromptMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
  pub role: String,
  pub content: PromptContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptContent {
  Text { text: String },
}
