pub mod format;
pub mod jsonl;
pub mod record;
pub mod turn;

pub use record::*;
pub use turn::*;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
