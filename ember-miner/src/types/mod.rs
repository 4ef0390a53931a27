//! Small value types shared across the crate.

mod hash32;
mod hash_rate;

pub use hash32::Hash32;
pub use hash_rate::{HashRate, HashRateTracker};
