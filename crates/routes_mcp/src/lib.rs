mod dispatch;
mod jsonrpc;
mod meta_tools;
mod routes;

pub use dispatch::*;
pub use jsonrpc::*;
pub use meta_tools::*;
pub use routes::*;
