use crate::{
  AccountStatus, ModuleDef, ModuleStatus, ToolAnnotations, ToolDescriptor, User, UserContext,
  UserRole,
};
use chrono::Utc;
use std::collections::HashMap;

pub fn test_user(id: &str) -> User {
  User {
    id: id.to_string(),
    external_id: format!("idp|{id}"),
    email: format!("{id}@example.com"),
    account_status: AccountStatus::Active,
    plan_id: "free".to_string(),
    role: UserRole::User,
    settings: serde_json::json!({}),
    created_at: Utc::now(),
    updated_at: Utc::now(),
  }
}

/// Builds a UserContext with the given `(module, enabled tool ids)` pairs.
pub fn user_context(modules: &[(&str, &[&str])], daily_used: i64, daily_limit: i64) -> UserContext {
  let enabled_tools = modules
    .iter()
    .map(|(module, tools)| {
      (
        module.to_string(),
        tools.iter().map(|t| t.to_string()).collect(),
      )
    })
    .collect();
  UserContext {
    user_id: "test-user".to_string(),
    account_status: AccountStatus::Active,
    role: UserRole::User,
    plan_id: "free".to_string(),
    daily_used,
    daily_limit,
    enabled_tools,
    module_descriptions: HashMap::new(),
    request_id: "deadbeefdeadbeefdeadbeefdeadbeef".to_string(),
    console_url: None,
  }
}

pub fn test_tool(name: &str, read_only: bool) -> ToolDescriptor {
  ToolDescriptor {
    name: name.to_string(),
    descriptions: HashMap::from([("en".to_string(), format!("{name} tool"))]),
    annotations: if read_only {
      ToolAnnotations::read_only()
    } else {
      ToolAnnotations::destructive()
    },
    input_schema: serde_json::json!({
      "type": "object",
      "properties": {"q": {"type": "string"}},
    }),
  }
}

pub fn test_module(name: &str, tools: &[(&str, bool)]) -> ModuleDef {
  ModuleDef {
    name: name.to_string(),
    status: ModuleStatus::Active,
    descriptions: HashMap::from([("en".to_string(), format!("{name} module"))]),
    tools: tools
      .iter()
      .map(|(tool, read_only)| test_tool(tool, *read_only))
      .collect(),
  }
}
