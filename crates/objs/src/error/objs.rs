use crate::{AccountStatus, AppError, ErrorType};

/// Authorization failures shared by the MCP dispatcher and the management API.
/// Codes are stable and surfaced verbatim in the REST envelope.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AuthzError {
  #[error("Module '{0}' is not enabled for your account")]
  ModuleNotEnabled(String),
  #[error("Tool '{0}' is not enabled for your account")]
  ToolDisabled(String),
  #[error("{}", usage_limit_message(.used, .limit, .console_url))]
  UsageLimitExceeded {
    used: i64,
    limit: i64,
    console_url: Option<String>,
  },
  #[error("account is not active, current status: {0}")]
  AccountNotActive(AccountStatus),
}

fn usage_limit_message(used: &i64, limit: &i64, console_url: &Option<String>) -> String {
  match console_url {
    Some(url) => format!("daily usage limit reached ({used}/{limit}), upgrade your plan at {url}"),
    None => format!("daily usage limit reached ({used}/{limit})"),
  }
}

impl AppError for AuthzError {
  fn error_type(&self) -> ErrorType {
    match self {
      AuthzError::ModuleNotEnabled(_) | AuthzError::ToolDisabled(_) => ErrorType::Forbidden,
      AuthzError::UsageLimitExceeded { .. } => ErrorType::TooManyRequests,
      AuthzError::AccountNotActive(_) => ErrorType::Forbidden,
    }
  }

  fn code(&self) -> String {
    match self {
      AuthzError::ModuleNotEnabled(_) => "MODULE_NOT_ENABLED",
      AuthzError::ToolDisabled(_) => "TOOL_DISABLED",
      AuthzError::UsageLimitExceeded { .. } => "USAGE_LIMIT_EXCEEDED",
      AuthzError::AccountNotActive(_) => "ACCOUNT_NOT_ACTIVE",
    }
    .to_string()
  }
}

#[cfg(test)]
mod tests {
  use crate::{AppError, AuthzError};
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  #[case(
    AuthzError::ToolDisabled("notion:delete_page".to_string()),
    "TOOL_DISABLED",
    403,
    "Tool 'notion:delete_page' is not enabled for your account"
  )]
  #[case(
    AuthzError::ModuleNotEnabled("jira".to_string()),
    "MODULE_NOT_ENABLED",
    403,
    "Module 'jira' is not enabled for your account"
  )]
  #[case(
    AuthzError::UsageLimitExceeded { used: 50, limit: 50, console_url: None },
    "USAGE_LIMIT_EXCEEDED",
    429,
    "daily usage limit reached (50/50)"
  )]
  fn test_authz_error_metadata(
    #[case] error: AuthzError,
    #[case] code: &str,
    #[case] status: u16,
    #[case] message: &str,
  ) {
    assert_eq!(code, error.code());
    assert_eq!(status, error.status());
    assert_eq!(message, error.to_string());
  }

  #[rstest]
  fn test_usage_limit_message_includes_console_url() {
    let error = AuthzError::UsageLimitExceeded {
      used: 51,
      limit: 50,
      console_url: Some("https://console.example.com/billing".to_string()),
    };
    assert_eq!(
      "daily usage limit reached (51/50), upgrade your plan at https://console.example.com/billing",
      error.to_string()
    );
  }
}
