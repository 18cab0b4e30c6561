use crate::{provider_body, required_str, ModuleContext, ModuleError, ModuleHandler};
use objs::{ModuleDef, ModuleStatus, ToolAnnotations, ToolDescriptor};
use serde_json::{json, Value};
use services::TokenBroker;
use std::collections::HashMap;

const NOTION_API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

pub struct NotionModule {
  definition: ModuleDef,
  base_url: String,
  client: reqwest::Client,
}

impl Default for NotionModule {
  fn default() -> Self {
    Self::with_base_url(NOTION_API_BASE)
  }
}

impl NotionModule {
  pub fn with_base_url(base_url: impl Into<String>) -> Self {
    Self {
      definition: notion_definition(),
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

fn notion_definition() -> ModuleDef {
  ModuleDef {
    name: "notion".to_string(),
    status: ModuleStatus::Active,
    descriptions: en("Search and edit pages in Notion workspaces"),
    tools: vec![
      ToolDescriptor {
        name: "search".to_string(),
        descriptions: en("Search pages and databases by title"),
        annotations: ToolAnnotations::read_only(),
        input_schema: json!({
          "type": "object",
          "properties": {
            "q": {"type": "string", "description": "Search query"},
            "page_size": {"type": "integer", "minimum": 1, "maximum": 100}
          },
          "required": ["q"]
        }),
      },
      ToolDescriptor {
        name: "get_page".to_string(),
        descriptions: en("Fetch a page by id"),
        annotations: ToolAnnotations::read_only(),
        input_schema: json!({
          "type": "object",
          "properties": {
            "page_id": {"type": "string", "description": "Page id"}
          },
          "required": ["page_id"]
        }),
      },
      ToolDescriptor {
        name: "create_page".to_string(),
        descriptions: en("Create a page under a parent page"),
        annotations: ToolAnnotations {
          read_only_hint: Some(false),
          destructive_hint: Some(false),
          idempotent_hint: Some(false),
          open_world_hint: Some(true),
        },
        input_schema: json!({
          "type": "object",
          "properties": {
            "parent_page_id": {"type": "string"},
            "title": {"type": "string"}
          },
          "required": ["parent_page_id", "title"]
        }),
      },
      ToolDescriptor {
        name: "delete_page".to_string(),
        descriptions: en("Archive (delete) a page"),
        annotations: ToolAnnotations::destructive(),
        input_schema: json!({
          "type": "object",
          "properties": {
            "page_id": {"type": "string"}
          },
          "required": ["page_id"]
        }),
      },
    ],
  }
}

fn page_title(page: &Value) -> String {
  // title lives at different paths for pages vs databases
  let candidates = [
    page.pointer("/properties/title/title"),
    page.pointer("/properties/Name/title"),
    page.pointer("/title"),
  ];
  for candidate in candidates.into_iter().flatten() {
    if let Some(parts) = candidate.as_array() {
      let title: String = parts
        .iter()
        .filter_map(|p| p.pointer("/plain_text").and_then(Value::as_str))
        .collect();
      if !title.is_empty() {
        return title;
      }
    }
  }
  "(untitled)".to_string()
}

#[async_trait::async_trait]
impl ModuleHandler for NotionModule {
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
      "search" => {
        let query = required_str(params, tool, "q")?;
        let page_size = params.get("page_size").and_then(Value::as_u64).unwrap_or(10);
        self
          .client
          .post(format!("{}/search", self.base_url))
          .bearer_auth(&token)
          .header("Notion-Version", NOTION_VERSION)
          .json(&json!({"query": query, "page_size": page_size}))
          .send()
          .await?
      }
      "get_page" => {
        let page_id = required_str(params, tool, "page_id")?;
        self
          .client
          .get(format!("{}/pages/{page_id}", self.base_url))
          .bearer_auth(&token)
          .header("Notion-Version", NOTION_VERSION)
          .send()
          .await?
      }
      "create_page" => {
        let parent = required_str(params, tool, "parent_page_id")?;
        let title = required_str(params, tool, "title")?;
        self
          .client
          .post(format!("{}/pages", self.base_url))
          .bearer_auth(&token)
          .header("Notion-Version", NOTION_VERSION)
          .json(&json!({
            "parent": {"page_id": parent},
            "properties": {
              "title": {"title": [{"text": {"content": title}}]}
            }
          }))
          .send()
          .await?
      }
      "delete_page" => {
        let page_id = required_str(params, tool, "page_id")?;
        self
          .client
          .patch(format!("{}/pages/{page_id}", self.base_url))
          .bearer_auth(&token)
          .header("Notion-Version", NOTION_VERSION)
          .json(&json!({"archived": true}))
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
      "search" => {
        let results = value
          .pointer("/results")
          .and_then(Value::as_array)
          .cloned()
          .unwrap_or_default();
        let mut lines = vec!["id,object,title,url".to_string()];
        for item in &results {
          lines.push(format!(
            "{},{},{},{}",
            item.pointer("/id").and_then(Value::as_str).unwrap_or(""),
            item.pointer("/object").and_then(Value::as_str).unwrap_or(""),
            page_title(item),
            item.pointer("/url").and_then(Value::as_str).unwrap_or(""),
          ));
        }
        lines.join("\n")
      }
      "get_page" | "create_page" | "delete_page" => {
        format!(
          "id,archived,title,url\n{},{},{},{}",
          value.pointer("/id").and_then(Value::as_str).unwrap_or(""),
          value
            .pointer("/archived")
            .and_then(Value::as_bool)
            .unwrap_or(false),
          page_title(&value),
          value.pointer("/url").and_then(Value::as_str).unwrap_or(""),
        )
      }
      _ => json_text.to_string(),
    }
  }
}
