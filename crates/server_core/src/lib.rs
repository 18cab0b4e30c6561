mod router_state;
mod session;
mod sse;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use router_state::*;
pub use session::*;
pub use sse::*;
