mod app_service;
mod credential_service;
pub mod db;
mod encryption;
mod key_service;
mod oauth_app_service;
mod revocation_cache;
mod setting_service;
mod token_broker;
mod usage_service;
mod user_service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use app_service::*;
pub use credential_service::*;
pub use encryption::*;
pub use key_service::*;
pub use oauth_app_service::*;
pub use revocation_cache::*;
pub use setting_service::*;
pub use token_broker::*;
pub use usage_service::*;
pub use user_service::*;
