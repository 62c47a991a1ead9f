//! In-memory caching for content queries.
//!
//! This module provides a content-agnostic caching mechanism that:
//! - Stores values under hashed query keys with a per-entry time-to-live
//! - Expires entries lazily when they are read (no background sweep)
//! - Supports wholesale invalidation of one domain via `clear()`
//! - Reads time from an injected `Clock` so expiry is deterministic in tests

mod clock;
mod layer;
mod traits;
mod ttl;

pub use clock::{Clock, SystemClock};
pub use layer::CacheLayer;
pub use traits::{CacheKey, CacheResult, CacheSource};
pub use ttl::TtlCache;

#[cfg(test)]
pub use clock::ManualClock;
