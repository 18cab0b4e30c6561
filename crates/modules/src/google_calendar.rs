use crate::{provider_body, required_str, ModuleContext, ModuleError, ModuleHandler};
use objs::{ModuleDef, ModuleStatus, ToolAnnotations, ToolDescriptor};
use serde_json::{json, Value};
use services::TokenBroker;
use std::collections::HashMap;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

pub struct GoogleCalendarModule {
  definition: ModuleDef,
  base_url: String,
  client: reqwest::Client,
}

impl Default for GoogleCalendarModule {
  fn default() -> Self {
    Self::with_base_url(CALENDAR_API_BASE)
  }
}

impl GoogleCalendarModule {
  pub fn with_base_url(base_url: impl Into<String>) -> Self {
    Self {
      definition: calendar_definition(),
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

fn calendar_definition() -> ModuleDef {
  ModuleDef {
    name: "google_calendar".to_string(),
    status: ModuleStatus::Active,
    descriptions: en("Read and create events on Google Calendar"),
    tools: vec![
      ToolDescriptor {
        name: "list_events".to_string(),
        descriptions: en("List upcoming events of a calendar"),
        annotations: ToolAnnotations::read_only(),
        input_schema: json!({
          "type": "object",
          "properties": {
            "calendar_id": {"type": "string", "default": "primary"},
            "max_results": {"type": "integer", "minimum": 1, "maximum": 50}
          }
        }),
      },
      ToolDescriptor {
        name: "create_event".to_string(),
        descriptions: en("Create an event"),
        annotations: ToolAnnotations {
          read_only_hint: Some(false),
          destructive_hint: Some(false),
          idempotent_hint: Some(false),
          open_world_hint: Some(true),
        },
        input_schema: json!({
          "type": "object",
          "properties": {
            "calendar_id": {"type": "string", "default": "primary"},
            "summary": {"type": "string"},
            "start": {"type": "string", "description": "RFC3339 start time"},
            "end": {"type": "string", "description": "RFC3339 end time"}
          },
          "required": ["summary", "start", "end"]
        }),
      },
      ToolDescriptor {
        name: "delete_event".to_string(),
        descriptions: en("Delete an event"),
        annotations: ToolAnnotations::destructive(),
        input_schema: json!({
          "type": "object",
          "properties": {
            "calendar_id": {"type": "string", "default": "primary"},
            "event_id": {"type": "string"}
          },
          "required": ["event_id"]
        }),
      },
    ],
  }
}

fn calendar_id(params: &Value) -> &str {
  params
    .get("calendar_id")
    .and_then(Value::as_str)
    .filter(|s| !s.is_empty())
    .unwrap_or("primary")
}

#[async_trait::async_trait]
impl ModuleHandler for GoogleCalendarModule {
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
    let calendar = calendar_id(params);
    let response = match tool {
      "list_events" => {
        let max_results = params
          .get("max_results")
          .and_then(Value::as_u64)
          .unwrap_or(10);
        self
          .client
          .get(format!("{}/calendars/{calendar}/events", self.base_url))
          .query(&[
            ("maxResults", max_results.to_string().as_str()),
            ("singleEvents", "true"),
            ("orderBy", "startTime"),
          ])
          .bearer_auth(&token)
          .send()
          .await?
      }
      "create_event" => {
        let summary = required_str(params, tool, "summary")?;
        let start = required_str(params, tool, "start")?;
        let end = required_str(params, tool, "end")?;
        self
          .client
          .post(format!("{}/calendars/{calendar}/events", self.base_url))
          .bearer_auth(&token)
          .json(&json!({
            "summary": summary,
            "start": {"dateTime": start},
            "end": {"dateTime": end}
          }))
          .send()
          .await?
      }
      "delete_event" => {
        let event_id = required_str(params, tool, "event_id")?;
        self
          .client
          .delete(format!(
            "{}/calendars/{calendar}/events/{event_id}",
            self.base_url
          ))
          .bearer_auth(&token)
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
      "list_events" => {
        let items = value
          .pointer("/items")
          .and_then(Value::as_array)
          .cloned()
          .unwrap_or_default();
        let mut lines = vec!["id,start,summary".to_string()];
        for item in &items {
          let start = item
            .pointer("/start/dateTime")
            .or_else(|| item.pointer("/start/date"))
            .and_then(Value::as_str)
            .unwrap_or("");
          lines.push(format!(
            "{},{},{}",
            item.pointer("/id").and_then(Value::as_str).unwrap_or(""),
            start,
            item.pointer("/summary").and_then(Value::as_str).unwrap_or(""),
          ));
        }
        lines.join("\n")
      }
      "create_event" => format!(
        "id,status,htmlLink\n{},{},{}",
        value.pointer("/id").and_then(Value::as_str).unwrap_or(""),
        value.pointer("/status").and_then(Value::as_str).unwrap_or(""),
        value.pointer("/htmlLink").and_then(Value::as_str).unwrap_or(""),
      ),
      // deletes return an empty body on success
      "delete_event" => "deleted".to_string(),
      _ => json_text.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::GoogleCalendarModule;
  use crate::{ModuleContext, ModuleHandler};
  use objs::CredentialBlob;
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use serde_json::json;
  use services::MockTokenBroker;
  use std::sync::Arc;

  fn ctx() -> ModuleContext {
    let mut broker = MockTokenBroker::new();
    broker.expect_get_module_token().returning(|_, _| {
      Ok(CredentialBlob::oauth2("ya29.fresh", Some("refresh".to_string()), None))
    });
    ModuleContext::new("u-1", "req-1", Arc::new(broker))
  }

  #[rstest]
  #[tokio::test]
  async fn test_list_events_compact() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/calendars/primary/events")
      .match_query(mockito::Matcher::UrlEncoded("singleEvents".into(), "true".into()))
      .match_header("authorization", "Bearer ya29.fresh")
      .with_status(200)
      .with_body(
        json!({
          "items": [
            {"id": "e1", "summary": "Standup", "start": {"dateTime": "2026-08-01T09:00:00Z"}},
            {"id": "e2", "summary": "All-day", "start": {"date": "2026-08-02"}}
          ]
        })
        .to_string(),
      )
      .create_async()
      .await;

    let module = GoogleCalendarModule::with_base_url(server.url());
    let output = module.run(&ctx(), "list_events", &json!({})).await?;
    assert_eq!(
      "id,start,summary\ne1,2026-08-01T09:00:00Z,Standup\ne2,2026-08-02,All-day",
      module.compact("list_events", &output)
    );
    Ok(())
  }

  #[rstest]
  #[tokio::test]
  async fn test_delete_event_hits_event_path() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("DELETE", "/calendars/work/events/e9")
      .with_status(204)
      .create_async()
      .await;

    let module = GoogleCalendarModule::with_base_url(server.url());
    let output = module
      .run(&ctx(), "delete_event", &json!({"calendar_id": "work", "event_id": "e9"}))
      .await?;
    assert_eq!("deleted", module.compact("delete_event", &output));
    mock.assert_async().await;
    Ok(())
  }

  #[rstest]
  fn test_definition_annotations() {
    let module = GoogleCalendarModule::default();
    let def = module.definition();
    assert!(def.tool("list_events").unwrap().is_read_only());
    assert!(def.tool("delete_event").unwrap().is_dangerous());
  }
}
