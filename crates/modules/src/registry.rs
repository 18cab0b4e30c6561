use crate::{GithubModule, GoogleCalendarModule, ModuleHandler, NotionModule};
use objs::ModuleDef;
use services::db::{DbError, DbService, ModuleRepository};
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable name→handler table built once at boot.
pub struct ModuleRegistry {
  handlers: HashMap<String, Arc<dyn ModuleHandler>>,
  order: Vec<String>,
}

impl std::fmt::Debug for ModuleRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ModuleRegistry")
      .field("modules", &self.order)
      .finish()
  }
}

impl ModuleRegistry {
  pub fn new(handlers: Vec<Arc<dyn ModuleHandler>>) -> Self {
    let mut map = HashMap::new();
    let mut order = Vec::new();
    for handler in handlers {
      let name = handler.definition().name.clone();
      if map.insert(name.clone(), handler).is_some() {
        panic!("duplicate module registered: {name}");
      }
      order.push(name);
    }
    Self {
      handlers: map,
      order,
    }
  }

  /// The production module set.
  pub fn builtin() -> Self {
    Self::new(vec![
      Arc::new(NotionModule::default()),
      Arc::new(GithubModule::default()),
      Arc::new(GoogleCalendarModule::default()),
    ])
  }

  pub fn get(&self, name: &str) -> Option<Arc<dyn ModuleHandler>> {
    self.handlers.get(name).cloned()
  }

  pub fn definitions(&self) -> Vec<&ModuleDef> {
    self
      .order
      .iter()
      .map(|name| self.handlers[name].definition())
      .collect()
  }

  pub fn module_names(&self) -> Vec<String> {
    self.order.clone()
  }

  /// Serializes every module's `(name, status, tools)` into the database so
  /// the console can show tool metadata without calling the server.
  pub async fn sync_to_db(&self, db_service: &Arc<dyn DbService>) -> Result<(), DbError> {
    for definition in self.definitions() {
      db_service.upsert_module_meta(definition).await?;
    }
    tracing::info!(modules = self.order.len(), "module metadata synced");
    Ok(())
  }
}
