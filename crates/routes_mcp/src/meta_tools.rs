use crate::McpTool;
use objs::UserContext;
use serde::Deserialize;
use serde_json::{json, Value};

pub const META_TOOL_GET_MODULE_SCHEMA: &str = "get_module_schema";
pub const META_TOOL_RUN: &str = "run";
pub const META_TOOL_BATCH: &str = "batch";

/// Upper bound on well-formed commands per `batch` call.
pub const MAX_BATCH_COMMANDS: usize = 10;

/// The three meta-tools are the entire `tools/list` surface; the `module`
/// enums are narrowed to what the caller may actually touch, so the listing
/// stays small no matter how many modules are registered.
pub fn meta_tool_descriptors(ctx: &UserContext) -> Vec<McpTool> {
  let modules = ctx.enabled_modules();
  vec![
    McpTool {
      name: META_TOOL_GET_MODULE_SCHEMA.to_string(),
      description: Some(
        "Get the enabled tool descriptors and description for one or more modules".to_string(),
      ),
      input_schema: json!({
        "type": "object",
        "properties": {
          "module": {
            "oneOf": [
              {"type": "string", "enum": modules.clone()},
              {"type": "array", "items": {"type": "string", "enum": modules.clone()}}
            ]
          }
        },
        "required": ["module"]
      }),
      annotations: Some(json!({"readOnlyHint": true})),
    },
    McpTool {
      name: META_TOOL_RUN.to_string(),
      description: Some("Execute one tool of a module".to_string()),
      input_schema: json!({
        "type": "object",
        "properties": {
          "module": {"type": "string", "enum": modules},
          "tool": {"type": "string"},
          "params": {"type": "object"},
          "format": {"type": "string", "enum": ["compact", "json"], "default": "compact"}
        },
        "required": ["module", "tool"]
      }),
      annotations: None,
    },
    McpTool {
      name: META_TOOL_BATCH.to_string(),
      description: Some(format!(
        "Execute up to {MAX_BATCH_COMMANDS} commands, one JSON object per line: \
         {{\"module\",\"tool\",\"params\",\"task_id\"?}}"
      )),
      input_schema: json!({
        "type": "object",
        "properties": {
          "commands": {"type": "string", "description": "Newline-delimited JSON commands"}
        },
        "required": ["commands"]
      }),
      annotations: None,
    },
  ]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchCommand {
  pub module: String,
  pub tool: String,
  #[serde(default)]
  pub params: Value,
  #[serde(default)]
  pub task_id: Option<String>,
}

/// Splits the newline-delimited command stream. Blank lines are skipped, and
/// malformed lines are skipped rather than rejected, so a caller cannot
/// distinguish a typo from an intentional no-op; the size limit counts only
/// well-formed commands.
pub fn parse_batch_commands(commands: &str) -> Vec<BatchCommand> {
  commands
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .filter_map(|line| serde_json::from_str::<BatchCommand>(line).ok())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::{meta_tool_descriptors, parse_batch_commands};
  use objs::test_utils::user_context;
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use serde_json::json;

  #[rstest]
  fn test_parse_skips_blank_and_malformed_lines() {
    let input = r#"
      {"module":"notion","tool":"search","params":{"q":"a"}}

      this is not json
      {"module":"github","tool":"get_repo","task_id":"t1"}
    "#;
    let commands = parse_batch_commands(input);
    assert_eq!(2, commands.len());
    assert_eq!("notion", commands[0].module);
    assert_eq!(Some("t1".to_string()), commands[1].task_id);
  }

  #[rstest]
  fn test_parse_empty_input() {
    assert!(parse_batch_commands("").is_empty());
    assert!(parse_batch_commands("\n\n  \n").is_empty());
  }

  #[rstest]
  fn test_descriptors_narrow_module_enum() {
    let ctx = user_context(&[("notion", &["notion:search"])], 0, 50);
    let tools = meta_tool_descriptors(&ctx);
    assert_eq!(3, tools.len());
    let schema_tool = &tools[0];
    assert_eq!(
      json!(["notion"]),
      schema_tool.input_schema["properties"]["module"]["oneOf"][0]["enum"]
    );
    let run_tool = &tools[1];
    assert_eq!(
      json!(["notion"]),
      run_tool.input_schema["properties"]["module"]["enum"]
    );
  }
}
