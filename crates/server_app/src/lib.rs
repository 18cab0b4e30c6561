mod router;
mod serve;

pub use router::*;
pub use serve::*;
