mod common;
mod error_api;
mod objs;

pub use common::*;
pub use error_api::*;
pub use objs::*;
