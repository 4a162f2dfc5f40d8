//! Board cache tiers
//!
//! One abstraction over the in-memory tier and the durable SQLite tier.

mod board_cache;

pub use board_cache::{BoardCache, CacheStats};
