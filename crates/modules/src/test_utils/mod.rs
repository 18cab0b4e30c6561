use crate::{ModuleContext, ModuleError, ModuleHandler, ModuleRegistry};
use objs::test_utils::test_module;
use objs::ModuleDef;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Canned module handler: returns a fixed JSON payload per call and counts
/// invocations. Lets protocol tests run without provider HTTP.
pub struct StubModule {
  definition: ModuleDef,
  response: String,
  fail_with_provider_error: bool,
  calls: AtomicUsize,
}

impl StubModule {
  pub fn new(name: &str, tools: &[(&str, bool)]) -> Self {
    Self {
      definition: test_module(name, tools),
      response: r#"{"ok":true}"#.to_string(),
      fail_with_provider_error: false,
      calls: AtomicUsize::new(0),
    }
  }

  pub fn with_response(mut self, response: impl Into<String>) -> Self {
    self.response = response.into();
    self
  }

  pub fn failing(mut self) -> Self {
    self.fail_with_provider_error = true;
    self
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait::async_trait]
impl ModuleHandler for StubModule {
  fn definition(&self) -> &ModuleDef {
    &self.definition
  }

  async fn run(
    &self,
    _ctx: &ModuleContext,
    tool: &str,
    _params: &Value,
  ) -> Result<String, ModuleError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.definition.tool(tool).is_none() {
      return Err(ModuleError::UnknownTool {
        module: self.definition.name.clone(),
        tool: tool.to_string(),
      });
    }
    if self.fail_with_provider_error {
      return Err(ModuleError::Provider {
        status: 502,
        body: "upstream exploded".to_string(),
      });
    }
    Ok(self.response.clone())
  }

  fn compact(&self, _tool: &str, json_text: &str) -> String {
    format!("compact:{json_text}")
  }
}

/// Registry with a notion-shaped and a github-shaped stub, mirroring the
/// builtin set without any network surface.
pub fn stub_registry() -> Arc<ModuleRegistry> {
  Arc::new(ModuleRegistry::new(vec![
    Arc::new(StubModule::new(
      "notion",
      &[("search", true), ("get_page", true), ("delete_page", false)],
    )),
    Arc::new(StubModule::new(
      "github",
      &[("search_repos", true), ("get_repo", true), ("create_issue", false)],
    )),
  ]))
}
