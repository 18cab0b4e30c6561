mod github;
mod google_calendar;
mod handler;
mod notion;
mod registry;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use github::*;
pub use google_calendar::*;
pub use handler::*;
pub use notion::*;
pub use registry::*;
