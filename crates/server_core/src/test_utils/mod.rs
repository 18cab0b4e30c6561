use crate::{DefaultRouterState, RouterState};
use modules::test_utils::stub_registry;
use services::test_utils::{test_app_service, TestAppService};
use std::sync::Arc;

/// RouterState over a throwaway database and the stub module registry.
pub struct TestRouterState {
  pub state: Arc<dyn RouterState>,
  pub app: TestAppService,
}

pub async fn test_router_state() -> TestRouterState {
  let app = test_app_service().await;
  let state: Arc<dyn RouterState> = Arc::new(DefaultRouterState::new(
    app.app_service(),
    stub_registry(),
  ));
  TestRouterState { state, app }
}
