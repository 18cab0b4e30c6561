use crate::{AccountStatus, AuthzError, UserRole};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything the dispatcher needs to authorize one request, loaded fresh
/// from the database by the authorizer middleware. Never cached across
/// requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
  pub user_id: String,
  pub account_status: AccountStatus,
  pub role: UserRole,
  pub plan_id: String,
  pub daily_used: i64,
  pub daily_limit: i64,
  /// module name -> enabled tool ids ("module:tool")
  pub enabled_tools: HashMap<String, Vec<String>>,
  /// module name -> user-supplied description
  pub module_descriptions: HashMap<String, String>,
  pub request_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub console_url: Option<String>,
}

impl UserContext {
  pub fn enabled_modules(&self) -> Vec<String> {
    let mut modules: Vec<String> = self.enabled_tools.keys().cloned().collect();
    modules.sort();
    modules
  }

  pub fn has_module(&self, module: &str) -> bool {
    self.enabled_tools.contains_key(module)
  }

  /// Permission and quota gate for one tool invocation. `credit_cost = 0`
  /// checks permission only (batch pre-flight).
  pub fn can_access_tool(
    &self,
    module: &str,
    tool: &str,
    credit_cost: i64,
  ) -> Result<(), AuthzError> {
    let tools = self
      .enabled_tools
      .get(module)
      .ok_or_else(|| AuthzError::ModuleNotEnabled(module.to_string()))?;
    let tool_id = format!("{module}:{tool}");
    if !tools.iter().any(|t| t == &tool_id) {
      return Err(AuthzError::ToolDisabled(tool_id));
    }
    if credit_cost > 0 && self.daily_used + credit_cost > self.daily_limit {
      return Err(AuthzError::UsageLimitExceeded {
        used: self.daily_used,
        limit: self.daily_limit,
        console_url: self.console_url.clone(),
      });
    }
    Ok(())
  }

  /// Aggregate quota gate used by `batch` pre-flight: no reservation is
  /// taken, the instantaneous count decides.
  pub fn check_quota(&self, credit_cost: i64) -> Result<(), AuthzError> {
    if self.daily_used + credit_cost > self.daily_limit {
      return Err(AuthzError::UsageLimitExceeded {
        used: self.daily_used,
        limit: self.daily_limit,
        console_url: self.console_url.clone(),
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use crate::{test_utils::user_context, AuthzError};
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn test_can_access_tool_happy_path() {
    let ctx = user_context(&[("notion", &["notion:search"])], 5, 50);
    assert_eq!(Ok(()), ctx.can_access_tool("notion", "search", 1));
  }

  #[rstest]
  fn test_can_access_tool_module_not_enabled() {
    let ctx = user_context(&[("notion", &["notion:search"])], 5, 50);
    assert_eq!(
      Err(AuthzError::ModuleNotEnabled("jira".to_string())),
      ctx.can_access_tool("jira", "search", 1)
    );
  }

  #[rstest]
  fn test_can_access_tool_tool_disabled() {
    let ctx = user_context(&[("notion", &["notion:search"])], 5, 50);
    assert_eq!(
      Err(AuthzError::ToolDisabled("notion:delete_page".to_string())),
      ctx.can_access_tool("notion", "delete_page", 1)
    );
  }

  #[rstest]
  #[case(50, 50, true)]
  #[case(49, 50, false)]
  fn test_can_access_tool_quota_edge(
    #[case] used: i64,
    #[case] limit: i64,
    #[case] denied: bool,
  ) {
    let ctx = user_context(&[("notion", &["notion:search"])], used, limit);
    let result = ctx.can_access_tool("notion", "search", 1);
    assert_eq!(denied, result.is_err());
  }

  #[rstest]
  fn test_zero_credit_cost_skips_quota() {
    let ctx = user_context(&[("notion", &["notion:search"])], 50, 50);
    assert_eq!(Ok(()), ctx.can_access_tool("notion", "search", 0));
  }

  #[rstest]
  fn test_enabled_modules_sorted() {
    let ctx = user_context(
      &[("notion", &["notion:search"]), ("github", &["github:get_repo"])],
      0,
      50,
    );
    assert_eq!(vec!["github".to_string(), "notion".to_string()], ctx.enabled_modules());
  }
}
