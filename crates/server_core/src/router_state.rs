use crate::SessionManager;
use modules::ModuleRegistry;
use services::AppService;
use std::sync::Arc;

pub trait RouterState: std::fmt::Debug + Send + Sync {
  fn app_service(&self) -> Arc<dyn AppService>;

  fn registry(&self) -> Arc<ModuleRegistry>;

  fn session_manager(&self) -> Arc<SessionManager>;
}

#[derive(Debug, Clone)]
pub struct DefaultRouterState {
  app_service: Arc<dyn AppService>,
  registry: Arc<ModuleRegistry>,
  session_manager: Arc<SessionManager>,
}

impl DefaultRouterState {
  pub fn new(app_service: Arc<dyn AppService>, registry: Arc<ModuleRegistry>) -> Self {
    Self {
      app_service,
      registry,
      session_manager: Arc::new(SessionManager::default()),
    }
  }
}

impl RouterState for DefaultRouterState {
  fn app_service(&self) -> Arc<dyn AppService> {
    self.app_service.clone()
  }

  fn registry(&self) -> Arc<ModuleRegistry> {
    self.registry.clone()
  }

  fn session_manager(&self) -> Arc<SessionManager> {
    self.session_manager.clone()
  }
}
