mod auth;
mod error;
mod proxy;
mod routes;
mod state;

pub use auth::*;
pub use error::*;
pub use proxy::*;
pub use routes::*;
pub use state::*;
