use crate::{provider_body, required_str, ModuleContext, ModuleError, ModuleHandler};
use objs::{ModuleDef, ModuleStatus, ToolAnnotations, ToolDescriptor};
use serde_json::{json, Value};
use services::TokenBroker;
use std::collections::HashMap;

const GITHUB_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "mcp-portal";

pub struct GithubModule {
  definition: ModuleDef,
  base_url: String,
  client: reqwest::Client,
}

impl Default for GithubModule {
  fn default() -> Self {
    Self::with_base_url(GITHUB_API_BASE)
  }
}

impl GithubModule {
  pub fn with_base_url(base_url: impl Into<String>) -> Self {
    Self {
      definition: github_definition(),
      base_url: base_url.into(),
      client: reqwest::Client::new(),
    }
  }

  async fn bearer(&self, ctx: &ModuleContext) -> Result<String, ModuleError> {
    let credential = ctx
      .token_broker
      .get_module_token(&ctx.user_id, &self.definition.name)
      .await?;
    Ok(credential.access_token.unwrap_or_default())
  }
}

fn en(text: &str) -> HashMap<String, String> {
  HashMap::from([("en".to_string(), text.to_string())])
}

fn github_definition() -> ModuleDef {
  ModuleDef {
    name: "github".to_string(),
    status: ModuleStatus::Active,
    descriptions: en("Search repositories and manage issues on GitHub"),
    tools: vec![
      ToolDescriptor {
        name: "search_repos".to_string(),
        descriptions: en("Search repositories by keyword"),
        annotations: ToolAnnotations::read_only(),
        input_schema: json!({
          "type": "object",
          "properties": {
            "q": {"type": "string", "description": "Search query"},
            "per_page": {"type": "integer", "minimum": 1, "maximum": 50}
          },
          "required": ["q"]
        }),
      },
      ToolDescriptor {
        name: "get_repo".to_string(),
        descriptions: en("Fetch one repository by owner/name"),
        annotations: ToolAnnotations::read_only(),
        input_schema: json!({
          "type": "object",
          "properties": {
            "owner": {"type": "string"},
            "repo": {"type": "string"}
          },
          "required": ["owner", "repo"]
        }),
      },
      ToolDescriptor {
        name: "list_issues".to_string(),
        descriptions: en("List open issues of a repository"),
        annotations: ToolAnnotations::read_only(),
        input_schema: json!({
          "type": "object",
          "properties": {
            "owner": {"type": "string"},
            "repo": {"type": "string"}
          },
          "required": ["owner", "repo"]
        }),
      },
      ToolDescriptor {
        name: "create_issue".to_string(),
        descriptions: en("Open a new issue"),
        annotations: ToolAnnotations {
          read_only_hint: Some(false),
          destructive_hint: Some(false),
          idempotent_hint: Some(false),
          open_world_hint: Some(true),
        },
        input_schema: json!({
          "type": "object",
          "properties": {
            "owner": {"type": "string"},
            "repo": {"type": "string"},
            "title": {"type": "string"},
            "body": {"type": "string"}
          },
          "required": ["owner", "repo", "title"]
        }),
      },
    ],
  }
}

#[async_trait::async_trait]
impl ModuleHandler for GithubModule {
  fn definition(&self) -> &ModuleDef {
    &self.definition
  }

  async fn run(
    &self,
    ctx: &ModuleContext,
    tool: &str,
    params: &Value,
  ) -> Result<String, ModuleError> {
    let token = self.bearer(ctx).await?;
    let response = match tool {
      "search_repos" => {
        let query = required_str(params, tool, "q")?;
        let per_page = params.get("per_page").and_then(Value::as_u64).unwrap_or(10);
        self
          .client
          .get(format!("{}/search/repositories", self.base_url))
          .query(&[("q", query), ("per_page", &per_page.to_string())])
          .bearer_auth(&token)
          .header("User-Agent", USER_AGENT)
          .send()
          .await?
      }
      "get_repo" => {
        let owner = required_str(params, tool, "owner")?;
        let repo = required_str(params, tool, "repo")?;
        self
          .client
          .get(format!("{}/repos/{owner}/{repo}", self.base_url))
          .bearer_auth(&token)
          .header("User-Agent", USER_AGENT)
          .send()
          .await?
      }
      "list_issues" => {
        let owner = required_str(params, tool, "owner")?;
        let repo = required_str(params, tool, "repo")?;
        self
          .client
          .get(format!("{}/repos/{owner}/{repo}/issues", self.base_url))
          .bearer_auth(&token)
          .header("User-Agent", USER_AGENT)
          .send()
          .await?
      }
      "create_issue" => {
        let owner = required_str(params, tool, "owner")?;
        let repo = required_str(params, tool, "repo")?;
        let title = required_str(params, tool, "title")?;
        let body = params.get("body").and_then(Value::as_str).unwrap_or("");
        self
          .client
          .post(format!("{}/repos/{owner}/{repo}/issues", self.base_url))
          .bearer_auth(&token)
          .header("User-Agent", USER_AGENT)
          .json(&json!({"title": title, "body": body}))
          .send()
          .await?
      }
      other => {
        return Err(ModuleError::UnknownTool {
          module: self.definition.name.clone(),
          tool: other.to_string(),
        })
      }
    };
    provider_body(response).await
  }

  fn compact(&self, tool: &str, json_text: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(json_text) else {
      return json_text.to_string();
    };
    match tool {
      "search_repos" => {
        let items = value
          .pointer("/items")
          .and_then(Value::as_array)
          .cloned()
          .unwrap_or_default();
        let mut lines = vec!["full_name,stars,description".to_string()];
        for item in &items {
          lines.push(format!(
            "{},{},{}",
            item.pointer("/full_name").and_then(Value::as_str).unwrap_or(""),
            item
              .pointer("/stargazers_count")
              .and_then(Value::as_u64)
              .unwrap_or(0),
            item
              .pointer("/description")
              .and_then(Value::as_str)
              .unwrap_or(""),
          ));
        }
        lines.join("\n")
      }
      "get_repo" => format!(
        "full_name,stars,open_issues,default_branch\n{},{},{},{}",
        value.pointer("/full_name").and_then(Value::as_str).unwrap_or(""),
        value
          .pointer("/stargazers_count")
          .and_then(Value::as_u64)
          .unwrap_or(0),
        value
          .pointer("/open_issues_count")
          .and_then(Value::as_u64)
          .unwrap_or(0),
        value
          .pointer("/default_branch")
          .and_then(Value::as_str)
          .unwrap_or(""),
      ),
      "list_issues" => {
        let items = value.as_array().cloned().unwrap_or_default();
        let mut lines = vec!["number,state,title".to_string()];
        for item in &items {
          lines.push(format!(
            "{},{},{}",
            item.pointer("/number").and_then(Value::as_u64).unwrap_or(0),
            item.pointer("/state").and_then(Value::as_str).unwrap_or(""),
            item.pointer("/title").and_then(Value::as_str).unwrap_or(""),
          ));
        }
        lines.join("\n")
      }
      "create_issue" => format!(
        "number,url\n{},{}",
        value.pointer("/number").and_then(Value::as_u64).unwrap_or(0),
        value.pointer("/html_url").and_then(Value::as_str).unwrap_or(""),
      ),
      _ => json_text.to_string(),
    }
  }
}
