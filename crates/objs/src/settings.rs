use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_MODULE_DESCRIPTION_LEN: usize = 256;

/// Per-user enablement of a single tool. Rows exist only for `(user, module)`
/// pairs that have (or once had) a linked credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ToolSetting {
  pub user_id: String,
  pub module_name: String,
  pub tool_id: String,
  pub enabled: bool,
}

/// Optional user-supplied annotation for a module, surfaced by
/// `get_module_schema` in place of the default description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ModuleSetting {
  pub user_id: String,
  pub module_name: String,
  pub description: String,
}

/// Collapses a settings list into `module -> tool_id -> enabled`. The last
/// occurrence of a `(module, tool)` pair wins.
pub fn to_tool_settings_map(settings: &[ToolSetting]) -> HashMap<String, HashMap<String, bool>> {
  let mut map: HashMap<String, HashMap<String, bool>> = HashMap::new();
  for setting in settings {
    map
      .entry(setting.module_name.clone())
      .or_default()
      .insert(setting.tool_id.clone(), setting.enabled);
  }
  map
}

pub fn validate_module_description(description: &str) -> Result<(), String> {
  if description.chars().count() > MAX_MODULE_DESCRIPTION_LEN {
    return Err(format!(
      "description too long: {} chars (max {})",
      description.chars().count(),
      MAX_MODULE_DESCRIPTION_LEN
    ));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::{to_tool_settings_map, validate_module_description, ToolSetting};
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn setting(module: &str, tool: &str, enabled: bool) -> ToolSetting {
    ToolSetting {
      user_id: "u1".to_string(),
      module_name: module.to_string(),
      tool_id: tool.to_string(),
      enabled,
    }
  }

  #[rstest]
  fn test_to_tool_settings_map_empty() {
    assert!(to_tool_settings_map(&[]).is_empty());
  }

  #[rstest]
  fn test_to_tool_settings_map_last_occurrence_wins() {
    let settings = vec![
      setting("notion", "notion:search", true),
      setting("notion", "notion:create_page", false),
      setting("github", "github:get_repo", true),
      setting("notion", "notion:search", false),
    ];
    let map = to_tool_settings_map(&settings);
    assert_eq!(Some(&false), map["notion"].get("notion:search"));
    assert_eq!(Some(&false), map["notion"].get("notion:create_page"));
    assert_eq!(Some(&true), map["github"].get("github:get_repo"));
  }

  #[rstest]
  fn test_validate_module_description_bounds() {
    assert!(validate_module_description(&"a".repeat(256)).is_ok());
    assert!(validate_module_description(&"a".repeat(257)).is_err());
  }
}
