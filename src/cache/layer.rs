//! Cache layer that orchestrates caching logic with store fetching.

use chrono::Duration;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use super::clock::Clock;
use super::traits::{CacheKey, CacheResult};
use super::ttl::TtlCache;

/// Cache layer that manages caching logic around store fetches.
///
/// This layer sits between a content service and the content store,
/// providing transparent read caching and domain-wide invalidation.
pub struct CacheLayer<T> {
  cache: Arc<TtlCache<T>>,
}

impl<T: Clone> CacheLayer<T> {
  /// Create a new cache layer backed by a fresh cache.
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self::with_cache(Arc::new(TtlCache::new(clock)))
  }

  /// Create a cache layer over an existing cache instance.
  pub fn with_cache(cache: Arc<TtlCache<T>>) -> Self {
    Self { cache }
  }

  /// The underlying cache.
  pub fn cache(&self) -> &TtlCache<T> {
    &self.cache
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Check cache - if present and unexpired, return immediately
  /// 2. Otherwise run the fetcher
  /// 3. Store successful results for `ttl`; errors are never cached
  ///
  /// A result is not stored if the domain was invalidated while the fetcher
  /// ran, since it may predate the write that caused the invalidation.
  pub async fn fetch<K, F, Fut, E>(
    &self,
    key: &K,
    ttl: Duration,
    fetcher: F,
  ) -> Result<CacheResult<T>, E>
  where
    K: CacheKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let hash = key.cache_hash();

    if let Some((data, cached_at)) = self.cache.get_with_time(&hash) {
      debug!(key = %key.description(), "cache hit");
      return Ok(CacheResult::from_cache(data, cached_at));
    }

    debug!(key = %key.description(), "cache miss");
    let generation = self.cache.generation();
    let data = fetcher().await?;
    if !self.cache.set_if_current(&hash, data.clone(), ttl, generation) {
      debug!(key = %key.description(), "invalidated during fetch, not cached");
    }
    Ok(CacheResult::from_store(data))
  }

  /// Drop the given entries, then everything else in this domain.
  pub fn invalidate<K: CacheKey>(&self, keys: &[K]) {
    for key in keys {
      self.cache.delete(&key.cache_hash());
    }
    self.cache.clear();
    debug!(explicit = keys.len(), "cache invalidated");
  }
}

impl<T> Clone for CacheLayer<T> {
  fn clone(&self) -> Self {
    Self {
      cache: Arc::clone(&self.cache),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, ManualClock};
  use std::sync::atomic::{AtomicU32, Ordering};

  struct Key(&'static str);

  impl CacheKey for Key {
    fn cache_hash(&self) -> String {
      self.0.to_string()
    }

    fn description(&self) -> String {
      self.0.to_string()
    }
  }

  #[tokio::test]
  async fn test_fetch_caches_until_expiry() {
    let clock = Arc::new(ManualClock::epoch());
    let layer: CacheLayer<u32> = CacheLayer::new(clock.clone());
    let calls = AtomicU32::new(0);

    let fetch = || {
      calls.fetch_add(1, Ordering::SeqCst);
      async { Ok::<_, String>(7) }
    };

    let first = layer.fetch(&Key("k"), Duration::seconds(60), fetch).await.unwrap();
    assert_eq!(first.source, CacheSource::Store);

    let second = layer.fetch(&Key("k"), Duration::seconds(60), fetch).await.unwrap();
    assert!(second.is_hit());
    assert_eq!(second.data, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(Duration::seconds(61));
    let third = layer.fetch(&Key("k"), Duration::seconds(60), fetch).await.unwrap();
    assert_eq!(third.source, CacheSource::Store);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_errors_are_not_cached() {
    let layer: CacheLayer<u32> = CacheLayer::new(Arc::new(ManualClock::epoch()));

    let result = layer
      .fetch(&Key("k"), Duration::seconds(60), || async {
        Err::<u32, _>("boom".to_string())
      })
      .await;
    assert_eq!(result.unwrap_err(), "boom");
    assert!(layer.cache().is_empty());
  }

  #[tokio::test]
  async fn test_fetch_overlapping_invalidation_is_not_cached() {
    let layer: CacheLayer<u32> = CacheLayer::new(Arc::new(ManualClock::epoch()));

    let writer = layer.clone();
    let first = layer
      .fetch(&Key("k"), Duration::seconds(60), || {
        // A write lands while the read is still in flight.
        writer.invalidate(&[Key("k")]);
        async { Ok::<_, String>(1) }
      })
      .await
      .unwrap();
    assert_eq!(first.data, 1);
    assert!(layer.cache().is_empty());

    let second = layer
      .fetch(&Key("k"), Duration::seconds(60), || async { Ok::<_, String>(2) })
      .await
      .unwrap();
    assert_eq!(second.source, CacheSource::Store);
    assert_eq!(second.data, 2);
    assert_eq!(layer.cache().get("k"), Some(2));
  }

  #[tokio::test]
  async fn test_invalidate_clears_whole_domain() {
    let layer: CacheLayer<u32> = CacheLayer::new(Arc::new(ManualClock::epoch()));
    layer.cache().set("a", 1, Duration::minutes(1));
    layer.cache().set("b", 2, Duration::minutes(1));

    layer.invalidate(&[Key("a")]);
    assert!(layer.cache().is_empty());
  }
}
