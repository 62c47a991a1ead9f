//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};

/// Trait for query descriptions that can address a cache entry.
///
/// Implementors describe a request (filters, pagination, an id) and turn it
/// into a stable key. Equivalent requests must produce the same hash.
pub trait CacheKey {
  /// Stable, fixed-length key for this request.
  fn cache_hash(&self) -> String;

  /// Human readable description used in logs.
  fn description(&self) -> String;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from freshly fetched data.
  pub fn from_store(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Store,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  pub fn is_hit(&self) -> bool {
    self.source == CacheSource::Cache
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched from the content store on this call
  Store,
  /// Served from an unexpired cache entry
  Cache,
}
