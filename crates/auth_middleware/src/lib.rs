mod auth_middleware;
mod rate_limit;

pub use auth_middleware::*;
pub use rate_limit::*;
