mod openapi;
mod routes_admin;
mod routes_api_keys;
mod routes_credentials;
mod routes_modules;
mod routes_prompts;
mod routes_usage;
mod routes_user;
#[cfg(test)]
mod test_utils;
mod well_known;

pub use openapi::*;
pub use routes_admin::*;
pub use routes_api_keys::*;
pub use routes_credentials::*;
pub use routes_modules::*;
pub use routes_prompts::*;
pub use routes_usage::*;
pub use routes_user::*;
pub use well_known::*;

use axum::routing::{get, post, put};
use axum::Router;
use server_core::RouterState;
use std::sync::Arc;

/// Authenticated management API under `/v1/me` and `/v1/admin`.
pub fn management_routes() -> Router<Arc<dyn RouterState>> {
  Router::new()
    .route("/v1/me/profile", get(get_profile_handler))
    .route("/v1/me/settings", put(update_settings_handler))
    .route("/v1/me/register", post(register_handler))
    .route("/v1/me/credentials", get(list_credentials_handler))
    .route(
      "/v1/me/credentials/{module}",
      get(get_credential_handler)
        .put(put_credential_handler)
        .delete(delete_credential_handler),
    )
    .route("/v1/me/modules/config", get(modules_config_handler))
    .route("/v1/me/modules/{name}/tools", put(update_module_tools_handler))
    .route(
      "/v1/me/modules/{name}/description",
      put(update_module_description_handler),
    )
    .route(
      "/v1/me/apikeys",
      get(list_api_keys_handler).post(create_api_key_handler),
    )
    .route(
      "/v1/me/apikeys/{id}",
      get(get_api_key_handler).delete(delete_api_key_handler),
    )
    .route(
      "/v1/me/prompts",
      get(list_prompts_handler).post(create_prompt_handler),
    )
    .route(
      "/v1/me/prompts/{id}",
      get(get_prompt_handler)
        .put(update_prompt_handler)
        .delete(delete_prompt_handler),
    )
    .route("/v1/me/usage", get(usage_handler))
    .route(
      "/v1/admin/oauth/apps",
      get(list_oauth_apps_handler),
    )
    .route(
      "/v1/admin/oauth/apps/{provider}",
      get(get_oauth_app_handler)
        .put(put_oauth_app_handler)
        .delete(delete_oauth_app_handler),
    )
    .route("/v1/admin/oauth/consents", get(list_consents_handler))
}

/// Unauthenticated utility routes on the protocol server.
pub fn public_routes() -> Router<Arc<dyn RouterState>> {
  Router::new()
    .route("/ping", get(ping_handler))
    .route("/.well-known/jwks.json", get(jwks_handler))
}
