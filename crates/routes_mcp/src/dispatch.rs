use crate::{
  meta_tool_descriptors, parse_batch_commands, BatchCommand, CallToolResult, GetPromptResult,
  InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, PromptContent, PromptInfo,
  PromptMessage, PromptsListResult, ToolsListResult, JSONRPC_VERSION, INVALID_REQUEST,
  MAX_BATCH_COMMANDS, META_TOOL_BATCH, META_TOOL_GET_MODULE_SCHEMA, META_TOOL_RUN,
};
use modules::{ModuleContext, ModuleError, ModuleHandler};
use objs::{MetaTool, UsageDetail, UserContext, DEFAULT_LANGUAGE};
use serde_json::{json, Value};
use server_core::RouterState;
use services::db::PromptRepository;
use services::AppService;
use std::sync::Arc;

/// Entry point shared by both transports: raw text in, optional response out
/// (notifications produce nothing).
pub async fn handle_message(
  state: &Arc<dyn RouterState>,
  ctx: &UserContext,
  raw: &str,
) -> Option<JsonRpcResponse> {
  let request: JsonRpcRequest = match serde_json::from_str(raw) {
    Ok(request) => request,
    Err(_) => {
      return Some(JsonRpcResponse::error(
        Value::Null,
        JsonRpcError::parse_error(),
      ))
    }
  };
  handle_request(state, ctx, request).await
}

pub async fn handle_request(
  state: &Arc<dyn RouterState>,
  ctx: &UserContext,
  request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
  if request.jsonrpc != JSONRPC_VERSION {
    return Some(JsonRpcResponse::error(
      request.id.unwrap_or(Value::Null),
      JsonRpcError::new(INVALID_REQUEST, "unsupported jsonrpc version"),
    ));
  }

  let id = request.id.clone();
  let result = match request.method.as_str() {
    "initialize" => Ok(serde_json::to_value(InitializeResult::current()).expect("serializable")),
    "initialized" | "notifications/initialized" => return None,
    "tools/list" => Ok(
      serde_json::to_value(ToolsListResult {
        tools: meta_tool_descriptors(ctx),
      })
      .expect("serializable"),
    ),
    "tools/call" => handle_tools_call(state, ctx, request.params).await,
    "prompts/list" => prompts_list(state, ctx).await,
    "prompts/get" => prompts_get(state, ctx, request.params).await,
    method => Err(JsonRpcError::method_not_found(method)),
  };

  let id = match id {
    Some(id) => id,
    // notifications never get a response, even on error
    None => return None,
  };
  Some(match result {
    Ok(value) => JsonRpcResponse::success(id, value),
    Err(error) => JsonRpcResponse::error(id, error),
  })
}

async fn handle_tools_call(
  state: &Arc<dyn RouterState>,
  ctx: &UserContext,
  params: Option<Value>,
) -> Result<Value, JsonRpcError> {
  let params = params.unwrap_or_else(|| json!({}));
  let name = params
    .get("name")
    .and_then(Value::as_str)
    .ok_or_else(|| JsonRpcError::invalid_params("missing tool name"))?;
  let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

  let result = match name {
    META_TOOL_GET_MODULE_SCHEMA => get_module_schema(state, ctx, &args).await?,
    META_TOOL_RUN => run_tool(state, ctx, &args).await?,
    META_TOOL_BATCH => batch_tool(state, ctx, &args).await?,
    other => {
      return Err(JsonRpcError::invalid_params(format!(
        "unknown tool: {other}"
      )))
    }
  };
  Ok(serde_json::to_value(result).expect("serializable"))
}

async fn get_module_schema(
  state: &Arc<dyn RouterState>,
  ctx: &UserContext,
  args: &Value,
) -> Result<CallToolResult, JsonRpcError> {
  let requested: Vec<String> = match args.get("module") {
    Some(Value::String(module)) => vec![module.clone()],
    Some(Value::Array(items)) => items
      .iter()
      .filter_map(|v| v.as_str().map(ToString::to_string))
      .collect(),
    _ => {
      return Err(JsonRpcError::invalid_params(
        "'module' must be a string or an array of strings",
      ))
    }
  };
  if requested.is_empty() {
    return Err(JsonRpcError::invalid_params("no modules requested"));
  }

  let registry = state.registry();
  let mut modules = Vec::with_capacity(requested.len());
  for module_name in requested {
    let enabled = ctx
      .enabled_tools
      .get(&module_name)
      .ok_or_else(|| JsonRpcError::from(objs::AuthzError::ModuleNotEnabled(module_name.clone())))?;
    let handler = registry
      .get(&module_name)
      .ok_or_else(|| JsonRpcError::invalid_params(format!("unknown module: {module_name}")))?;
    let definition = handler.definition();

    let tools: Vec<Value> = definition
      .tools
      .iter()
      .filter(|tool| enabled.contains(&tool.id(&module_name)))
      .map(|tool| {
        json!({
          "id": tool.id(&module_name),
          "name": tool.name,
          "description": tool.description(DEFAULT_LANGUAGE),
          "annotations": tool.annotations,
          "inputSchema": tool.input_schema,
        })
      })
      .collect();

    // user-supplied description wins over the module default
    let description = ctx
      .module_descriptions
      .get(&module_name)
      .cloned()
      .or_else(|| definition.description(DEFAULT_LANGUAGE).map(ToString::to_string))
      .unwrap_or_default();

    modules.push(json!({
      "module": module_name,
      "status": definition.status,
      "description": description,
      "tools": tools,
    }));
  }

  let payload = json!({"modules": modules});
  Ok(CallToolResult::text(
    serde_json::to_string_pretty(&payload).expect("serializable"),
  ))
}

async fn run_tool(
  state: &Arc<dyn RouterState>,
  ctx: &UserContext,
  args: &Value,
) -> Result<CallToolResult, JsonRpcError> {
  let module = args
    .get("module")
    .and_then(Value::as_str)
    .ok_or_else(|| JsonRpcError::invalid_params("missing 'module'"))?;
  let tool = args
    .get("tool")
    .and_then(Value::as_str)
    .ok_or_else(|| JsonRpcError::invalid_params("missing 'tool'"))?;
  let params = args.get("params").cloned().unwrap_or_else(|| json!({}));
  let format = args.get("format").and_then(Value::as_str).unwrap_or("compact");

  ctx.can_access_tool(module, tool, 1)?;

  let handler = state
    .registry()
    .get(module)
    .ok_or_else(|| JsonRpcError::invalid_params(format!("unknown module: {module}")))?;
  let app_service = state.app_service();
  let module_ctx = ModuleContext::new(
    ctx.user_id.clone(),
    ctx.request_id.clone(),
    app_service.token_broker(),
  );

  match handler.run(&module_ctx, tool, &params).await {
    Ok(json_text) => {
      let text = if format == "json" {
        json_text
      } else {
        handler.compact(tool, &json_text)
      };
      app_service.usage_service().record(
        &ctx.user_id,
        MetaTool::Run,
        &ctx.request_id,
        vec![UsageDetail {
          module: module.to_string(),
          tool: tool.to_string(),
          task_id: None,
        }],
      );
      Ok(CallToolResult::text(text))
    }
    Err(err) if err.is_execution_error() => {
      tracing::debug!(request_id = %ctx.request_id, module, tool, error = %err, "tool execution failed");
      Ok(CallToolResult::error_text(err.to_string()))
    }
    Err(ModuleError::UnknownTool { module, tool }) => Err(JsonRpcError::invalid_params(format!(
      "unknown tool '{tool}' in module '{module}'"
    ))),
    Err(ModuleError::InvalidParams { reason, .. }) => Err(JsonRpcError::invalid_params(reason)),
    Err(err) => Err(JsonRpcError::internal(err.to_string())),
  }
}

async fn batch_tool(
  state: &Arc<dyn RouterState>,
  ctx: &UserContext,
  args: &Value,
) -> Result<CallToolResult, JsonRpcError> {
  let commands_str = args
    .get("commands")
    .and_then(Value::as_str)
    .ok_or_else(|| JsonRpcError::invalid_params("missing 'commands'"))?;
  let commands = parse_batch_commands(commands_str);
  if commands.len() > MAX_BATCH_COMMANDS {
    return Err(JsonRpcError::invalid_params(format!(
      "batch too large: {} commands (max {MAX_BATCH_COMMANDS})",
      commands.len()
    )));
  }

  // all-or-nothing pre-flight: the caller learns only that something was
  // denied, the specifics go to the security log
  let denied: Vec<String> = commands
    .iter()
    .filter_map(|command| {
      ctx
        .can_access_tool(&command.module, &command.tool, 0)
        .err()
        .map(|err| {
          use objs::AppError;
          format!("{}:{}({})", command.module, command.tool, err.code())
        })
    })
    .collect();
  if !denied.is_empty() {
    tracing::warn!(
      security_event = true,
      request_id = %ctx.request_id,
      denied_tools = ?denied,
      "batch rejected by pre-flight permission check"
    );
    return Err(JsonRpcError::new(
      crate::PERMISSION_DENIED,
      "batch rejected: one or more tools are not permitted",
    ));
  }

  // instantaneous quota check, no reservation: two racing batches may both
  // pass; accepted as best-effort
  ctx.check_quota(commands.len() as i64)?;

  let app_service = state.app_service();
  let registry = state.registry();
  let mut results = Vec::with_capacity(commands.len());
  for command in &commands {
    results.push(execute_batch_command(state, ctx, &registry, command).await);
  }
  for (command, result) in commands.iter().zip(&results) {
    if result["status"] == "ok" {
      app_service.usage_service().record(
        &ctx.user_id,
        MetaTool::Batch,
        &ctx.request_id,
        vec![UsageDetail {
          module: command.module.clone(),
          tool: command.tool.clone(),
          task_id: command.task_id.clone(),
        }],
      );
    }
  }

  Ok(CallToolResult::text(
    serde_json::to_string_pretty(&json!({"results": results})).expect("serializable"),
  ))
}

async fn execute_batch_command(
  state: &Arc<dyn RouterState>,
  ctx: &UserContext,
  registry: &Arc<modules::ModuleRegistry>,
  command: &BatchCommand,
) -> Value {
  let mut entry = json!({
    "module": command.module,
    "tool": command.tool,
  });
  if let Some(task_id) = &command.task_id {
    entry["task_id"] = json!(task_id);
  }

  let Some(handler) = registry.get(&command.module) else {
    entry["status"] = json!("error");
    entry["error"] = json!(format!("unknown module: {}", command.module));
    return entry;
  };
  let module_ctx = ModuleContext::new(
    ctx.user_id.clone(),
    ctx.request_id.clone(),
    state.app_service().token_broker(),
  );
  match handler.run(&module_ctx, &command.tool, &command.params).await {
    Ok(json_text) => {
      entry["status"] = json!("ok");
      entry["output"] = json!(handler.compact(&command.tool, &json_text));
    }
    Err(err) => {
      entry["status"] = json!("error");
      entry["error"] = json!(err.to_string());
    }
  }
  entry
}

async fn prompts_list(
  state: &Arc<dyn RouterState>,
  ctx: &UserContext,
) -> Result<Value, JsonRpcError> {
  let prompts = state
    .app_service()
    .db_service()
    .list_prompts(&ctx.user_id)
    .await
    .map_err(|e| JsonRpcError::internal(e.to_string()))?;
  let prompts = prompts
    .into_iter()
    .filter(|p| p.enabled)
    .map(|p| PromptInfo {
      name: p.name,
      description: p.description,
    })
    .collect();
  Ok(serde_json::to_value(PromptsListResult { prompts }).expect("serializable"))
}

async fn prompts_get(
  state: &Arc<dyn RouterState>,
  ctx: &UserContext,
  params: Option<Value>,
) -> Result<Value, JsonRpcError> {
  let params = params.unwrap_or_else(|| json!({}));
  let name = params
    .get("name")
    .and_then(Value::as_str)
    .ok_or_else(|| JsonRpcError::invalid_params("missing prompt name"))?;

  let prompt = state
    .app_service()
    .db_service()
    .get_prompt_by_name(&ctx.user_id, name)
    .await
    .map_err(|e| JsonRpcError::internal(e.to_string()))?;
  let prompt = match prompt {
    Some(prompt) if prompt.enabled => prompt,
    _ => {
      return Err(JsonRpcError::invalid_params(format!(
        "unknown prompt: {name}"
      )))
    }
  };

  let result = GetPromptResult {
    description: prompt.description,
    messages: vec![PromptMessage {
      role: "user".to_string(),
      content: PromptContent::Text {
        text: prompt.content,
      },
    }],
  };
  Ok(serde_json::to_value(result).expect("serializable"))
}

#[cfg(test)]
mod tests {
  use crate::{handle_message, handle_request, JsonRpcRequest};
  use chrono::Utc;
  use objs::test_utils::user_context;
  use objs::Prompt;
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use serde_json::{json, Value};
  use server_core::test_utils::test_router_state;
  use services::db::PromptRepository;
  use services::AppService;

  fn request(method: &str, params: Value) -> JsonRpcRequest {
    JsonRpcRequest {
      jsonrpc: "2.0".to_string(),
      id: Some(json!(1)),
      method: method.to_string(),
      params: Some(params),
    }
  }

  fn notion_ctx(daily_used: i64, daily_limit: i64) -> objs::UserContext {
    user_context(
      &[("notion", &["notion:search", "notion:get_page"])],
      daily_used,
      daily_limit,
    )
  }

  #[rstest]
  #[tokio::test]
  async fn test_initialize_result() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let ctx = notion_ctx(0, 50);
    let response = handle_request(&harness.state, &ctx, request("initialize", json!({})))
      .await
      .unwrap();
    let result = response.result.unwrap();
    assert_eq!("2025-03-26", result["protocolVersion"]);
    assert_eq!("mcp-portal", result["serverInfo"]["name"]);
    assert!(result["capabilities"]["tools"].is_object());
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_initialized_notification_is_silent() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let ctx = notion_ctx(0, 50);
    let mut req = request("initialized", json!({}));
    req.id = None;
    assert!(handle_request(&harness.state, &ctx, req).await.is_none());
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_tools_list_exactly_three_meta_tools() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let ctx = notion_ctx(0, 50);
    let response = handle_request(&harness.state, &ctx, request("tools/list", json!({})))
      .await
      .unwrap();
    let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(vec!["get_module_schema", "run", "batch"], names);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_unknown_method() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let ctx = notion_ctx(0, 50);
    let response = handle_request(&harness.state, &ctx, request("resources/list", json!({})))
      .await
      .unwrap();
    assert_eq!(-32601, response.error.unwrap().code);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_parse_error_returns_32700() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let ctx = notion_ctx(0, 50);
    let response = handle_message(&harness.state, &ctx, "{not json").await.unwrap();
    assert_eq!(-32700, response.error.unwrap().code);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_run_success_records_usage_and_compacts() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let user = services::test_utils::seed_user(harness.app.db(), "alice").await;
    let mut ctx = notion_ctx(0, 50);
    ctx.user_id = user.id.clone();

    let response = handle_request(
      &harness.state,
      &ctx,
      request(
        "tools/call",
        json!({"name": "run", "arguments": {"module": "notion", "tool": "search", "params": {"q": "todo"}}}),
      ),
    )
    .await
    .unwrap();
    let result = response.result.unwrap();
    assert_eq!(false, result["isError"]);
    assert_eq!("compact:{\"ok\":true}", result["content"][0]["text"]);

    // usage row lands asynchronously
    let db = harness.app.app_service().db_service();
    let mut count = 0;
    for _ in 0..50 {
      count = services::db::UsageRepository::count_usage_in_range(
        db.as_ref(),
        &user.id,
        Utc::now() - chrono::Duration::hours(1),
        Utc::now() + chrono::Duration::hours(1),
      )
      .await?;
      if count > 0 {
        break;
      }
      tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(1, count);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_run_format_json_skips_compact() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let ctx = notion_ctx(0, 50);
    let response = handle_request(
      &harness.state,
      &ctx,
      request(
        "tools/call",
        json!({"name": "run", "arguments": {"module": "notion", "tool": "search", "params": {}, "format": "json"}}),
      ),
    )
    .await
    .unwrap();
    assert_eq!(
      "{\"ok\":true}",
      response.result.unwrap()["content"][0]["text"]
    );
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_run_disabled_tool_denied_no_usage() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let user = services::test_utils::seed_user(harness.app.db(), "alice").await;
    let mut ctx = notion_ctx(0, 50);
    ctx.user_id = user.id.clone();

    let response = handle_request(
      &harness.state,
      &ctx,
      request(
        "tools/call",
        json!({"name": "run", "arguments": {"module": "notion", "tool": "delete_page", "params": {}}}),
      ),
    )
    .await
    .unwrap();
    let error = response.error.unwrap();
    assert_eq!(-32001, error.code);
    assert_eq!(
      "Tool 'notion:delete_page' is not enabled for your account",
      error.message
    );

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let db = harness.app.app_service().db_service();
    let count = services::db::UsageRepository::count_usage_in_range(
      db.as_ref(),
      &user.id,
      Utc::now() - chrono::Duration::hours(1),
      Utc::now() + chrono::Duration::hours(1),
    )
    .await?;
    assert_eq!(0, count);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_run_provider_failure_is_tool_error_not_rpc_error() -> anyhow::Result<()> {
    use modules::test_utils::StubModule;
    use modules::{ModuleHandler, ModuleRegistry};
    use server_core::{DefaultRouterState, RouterState};
    use std::sync::Arc;

    let app = services::test_utils::test_app_service().await;
    let failing = Arc::new(StubModule::new("notion", &[("search", true)]).failing());
    let state: Arc<dyn RouterState> = Arc::new(DefaultRouterState::new(
      app.app_service(),
      Arc::new(ModuleRegistry::new(vec![
        failing.clone() as Arc<dyn ModuleHandler>
      ])),
    ));
    let ctx = user_context(&[("notion", &["notion:search"])], 0, 50);

    let response = handle_request(
      &state,
      &ctx,
      request(
        "tools/call",
        json!({"name": "run", "arguments": {"module": "notion", "tool": "search", "params": {}}}),
      ),
    )
    .await
    .unwrap();
    // provider failure is a tool-level error, never a JSON-RPC error
    assert!(response.error.is_none());
    let result = response.result.unwrap();
    assert_eq!(true, result["isError"]);
    assert!(result["content"][0]["text"]
      .as_str()
      .unwrap()
      .contains("upstream exploded"));
    assert_eq!(1, failing.calls());
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_run_quota_exhausted_is_32002() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let ctx = notion_ctx(50, 50);
    let response = handle_request(
      &harness.state,
      &ctx,
      request(
        "tools/call",
        json!({"name": "run", "arguments": {"module": "notion", "tool": "search", "params": {}}}),
      ),
    )
    .await
    .unwrap();
    assert_eq!(-32002, response.error.unwrap().code);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_batch_partial_denial_vague_message() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let ctx = notion_ctx(0, 50);
    let commands = "{\"module\":\"notion\",\"tool\":\"search\"}\n{\"module\":\"notion\",\"tool\":\"delete_page\"}";
    let response = handle_request(
      &harness.state,
      &ctx,
      request("tools/call", json!({"name": "batch", "arguments": {"commands": commands}})),
    )
    .await
    .unwrap();
    let error = response.error.unwrap();
    assert_eq!(-32001, error.code);
    // the public message must not leak which tool was denied
    assert_eq!(
      "batch rejected: one or more tools are not permitted",
      error.message
    );
    assert!(!error.message.contains("delete_page"));
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_batch_too_large() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let ctx = notion_ctx(0, 50);
    let commands: Vec<String> = (0..11)
      .map(|_| "{\"module\":\"notion\",\"tool\":\"search\"}".to_string())
      .collect();
    let response = handle_request(
      &harness.state,
      &ctx,
      request(
        "tools/call",
        json!({"name": "batch", "arguments": {"commands": commands.join("\n")}}),
      ),
    )
    .await
    .unwrap();
    let error = response.error.unwrap();
    assert_eq!(-32602, error.code);
    assert_eq!("batch too large: 11 commands (max 10)", error.message);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_batch_aggregate_quota() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    // 2 commands but only 1 credit left
    let ctx = notion_ctx(49, 50);
    let commands = "{\"module\":\"notion\",\"tool\":\"search\"}\n{\"module\":\"notion\",\"tool\":\"get_page\"}";
    let response = handle_request(
      &harness.state,
      &ctx,
      request("tools/call", json!({"name": "batch", "arguments": {"commands": commands}})),
    )
    .await
    .unwrap();
    assert_eq!(-32002, response.error.unwrap().code);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_batch_executes_with_task_ids() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let user = services::test_utils::seed_user(harness.app.db(), "alice").await;
    let mut ctx = notion_ctx(0, 50);
    ctx.user_id = user.id.clone();
    let commands = "{\"module\":\"notion\",\"tool\":\"search\",\"task_id\":\"t1\"}\nnot-json\n{\"module\":\"notion\",\"tool\":\"get_page\",\"task_id\":\"t2\"}";

    let response = handle_request(
      &harness.state,
      &ctx,
      request("tools/call", json!({"name": "batch", "arguments": {"commands": commands}})),
    )
    .await
    .unwrap();
    let result = response.result.unwrap();
    assert_eq!(false, result["isError"]);
    let payload: Value =
      serde_json::from_str(result["content"][0]["text"].as_str().unwrap())?;
    let results = payload["results"].as_array().unwrap();
    // malformed line skipped, both well-formed commands executed
    assert_eq!(2, results.len());
    assert_eq!("t1", results[0]["task_id"]);
    assert_eq!("ok", results[0]["status"]);
    assert_eq!("t2", results[1]["task_id"]);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_prompts_list_and_get() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let user = services::test_utils::seed_user(harness.app.db(), "alice").await;
    let mut ctx = notion_ctx(0, 50);
    ctx.user_id = user.id.clone();

    let db = harness.app.app_service().db_service();
    for (id, name, enabled) in [("p1", "daily", true), ("p2", "hidden", false)] {
      db.create_prompt(&Prompt {
        id: id.to_string(),
        user_id: user.id.clone(),
        module_name: None,
        name: name.to_string(),
        description: None,
        content: format!("content of {name}"),
        enabled,
        created_at: Utc::now(),
        updated_at: Utc::now(),
      })
      .await?;
    }

    let response = handle_request(&harness.state, &ctx, request("prompts/list", json!({})))
      .await
      .unwrap();
    let prompts = response.result.unwrap()["prompts"].as_array().unwrap().clone();
    assert_eq!(1, prompts.len());
    assert_eq!("daily", prompts[0]["name"]);

    let response = handle_request(
      &harness.state,
      &ctx,
      request("prompts/get", json!({"name": "daily"})),
    )
    .await
    .unwrap();
    let result = response.result.unwrap();
    assert_eq!("user", result["messages"][0]["role"]);
    assert_eq!("content of daily", result["messages"][0]["content"]["text"]);

    // disabled prompt behaves like an unknown one
    let response = handle_request(
      &harness.state,
      &ctx,
      request("prompts/get", json!({"name": "hidden"})),
    )
    .await
    .unwrap();
    assert_eq!(-32602, response.error.unwrap().code);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_get_module_schema_filters_to_enabled() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let mut ctx = notion_ctx(0, 50);
    ctx
      .module_descriptions
      .insert("notion".to_string(), "my custom workspace".to_string());

    let response = handle_request(
      &harness.state,
      &ctx,
      request(
        "tools/call",
        json!({"name": "get_module_schema", "arguments": {"module": "notion"}}),
      ),
    )
    .await
    .unwrap();
    let result = response.result.unwrap();
    let payload: Value =
      serde_json::from_str(result["content"][0]["text"].as_str().unwrap())?;
    let module = &payload["modules"][0];
    assert_eq!("notion", module["module"]);
    assert_eq!("my custom workspace", module["description"]);
    let ids: Vec<&str> = module["tools"]
      .as_array()
      .unwrap()
      .iter()
      .map(|t| t["id"].as_str().unwrap())
      .collect();
    // delete_page is registered but not enabled for the user
    assert_eq!(vec!["notion:search", "notion:get_page"], ids);
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_get_module_schema_inaccessible_module() -> anyhow::Result<()> {
    let harness = test_router_state().await;
    let ctx = notion_ctx(0, 50);
    let response = handle_request(
      &harness.state,
      &ctx,
      request(
        "tools/call",
        json!({"name": "get_module_schema", "arguments": {"module": "github"}}),
      ),
    )
    .await
    .unwrap();
    assert_eq!(-32001, response.error.unwrap().code);
    Ok(())
  }
}
