use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModuleStatus {
  Active,
  Beta,
  Deprecated,
}

/// Semantic hints attached to a tool descriptor. All fields are optional;
/// absence falls back to the MCP defaults (readOnly=false, destructive=true,
/// idempotent=false, openWorld=true).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub read_only_hint: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub destructive_hint: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub idempotent_hint: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub open_world_hint: Option<bool>,
}

impl ToolAnnotations {
  pub fn read_only() -> Self {
    Self {
      read_only_hint: Some(true),
      destructive_hint: Some(false),
      ..Self::default()
    }
  }

  pub fn destructive() -> Self {
    Self {
      read_only_hint: Some(false),
      destructive_hint: Some(true),
      ..Self::default()
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ToolDescriptor {
  pub name: String,
  pub descriptions: HashMap<String, String>,
  #[serde(default)]
  pub annotations: ToolAnnotations,
  #[schema(value_type = Object)]
  pub input_schema: serde_json::Value,
}

impl ToolDescriptor {
  /// Stable tool id of the form `{module}:{name}`.
  pub fn id(&self, module: &str) -> String {
    format!("{}:{}", module, self.name)
  }

  pub fn description(&self, language: &str) -> Option<&str> {
    self
      .descriptions
      .get(language)
      .or_else(|| self.descriptions.get(DEFAULT_LANGUAGE))
      .map(String::as_str)
  }

  pub fn is_read_only(&self) -> bool {
    self.annotations.read_only_hint == Some(true)
  }

  /// A tool is dangerous unless it is explicitly read-only or explicitly
  /// non-destructive.
  pub fn is_dangerous(&self) -> bool {
    self.annotations.read_only_hint != Some(true)
      && self.annotations.destructive_hint != Some(false)
  }
}

/// Module master data: the declarative part of a registered module, persisted
/// at boot so the console can render tool metadata without a server round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ModuleDef {
  pub name: String,
  pub status: ModuleStatus,
  pub descriptions: HashMap<String, String>,
  pub tools: Vec<ToolDescriptor>,
}

impl ModuleDef {
  pub fn description(&self, language: &str) -> Option<&str> {
    self
      .descriptions
      .get(language)
      .or_else(|| self.descriptions.get(DEFAULT_LANGUAGE))
      .map(String::as_str)
  }

  pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
    self.tools.iter().find(|t| t.name == name)
  }

  pub fn tool_ids(&self) -> Vec<String> {
    self.tools.iter().map(|t| t.id(&self.name)).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::{ToolAnnotations, ToolDescriptor};
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use serde_json::json;
  use std::collections::HashMap;

  fn tool(annotations: ToolAnnotations) -> ToolDescriptor {
    ToolDescriptor {
      name: "search".to_string(),
      descriptions: HashMap::from([("en".to_string(), "Search".to_string())]),
      annotations,
      input_schema: json!({"type": "object"}),
    }
  }

  #[rstest]
  #[case(ToolAnnotations::default(), true)]
  #[case(ToolAnnotations { read_only_hint: Some(true), ..Default::default() }, false)]
  #[case(ToolAnnotations { destructive_hint: Some(false), ..Default::default() }, false)]
  #[case(ToolAnnotations { read_only_hint: Some(false), destructive_hint: Some(true), ..Default::default() }, true)]
  #[case(ToolAnnotations { read_only_hint: Some(false), ..Default::default() }, true)]
  fn test_is_dangerous_defaults(#[case] annotations: ToolAnnotations, #[case] expected: bool) {
    assert_eq!(expected, tool(annotations).is_dangerous());
  }

  #[rstest]
  fn test_tool_id_and_description_fallback() {
    let tool = tool(ToolAnnotations::read_only());
    assert_eq!("notion:search", tool.id("notion"));
    assert_eq!(Some("Search"), tool.description("ja"));
    assert_eq!(Some("Search"), tool.description("en"));
  }

  #[rstest]
  fn test_annotations_serialize_camel_case() {
    let annotations = ToolAnnotations::read_only();
    let value = serde_json::to_value(&annotations).unwrap();
    assert_eq!(json!({"readOnlyHint": true, "destructiveHint": false}), value);
  }
}
