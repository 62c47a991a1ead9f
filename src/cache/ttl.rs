//! Time-to-live key/value store.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::clock::Clock;

/// A single cached value.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
  data: T,
  cached_at: DateTime<Utc>,
  expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Entries<T> {
  map: HashMap<String, CacheEntry<T>>,
  /// Bumped by every `clear()`.
  generation: u64,
}

/// In-memory cache whose entries expire after a per-entry duration.
///
/// Expiry is checked when an entry is read, and every `set` sweeps out
/// entries that have already expired. Each content domain owns its own
/// instance, so `clear()` never reaches across domains.
pub struct TtlCache<T> {
  entries: Mutex<Entries<T>>,
  clock: Arc<dyn Clock>,
}

impl<T: Clone> TtlCache<T> {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      entries: Mutex::new(Entries {
        map: HashMap::new(),
        generation: 0,
      }),
      clock,
    }
  }

  /// Current clear generation. A value read before a slow fetch can be
  /// handed to `set_if_current` so the result is dropped if the cache was
  /// cleared in the meantime.
  pub fn generation(&self) -> u64 {
    self.lock().generation
  }

  /// Get a value, or `None` if it is missing or expired.
  pub fn get(&self, key: &str) -> Option<T> {
    self.get_with_time(key).map(|(data, _)| data)
  }

  /// Get a value along with the time it was stored.
  pub fn get_with_time(&self, key: &str) -> Option<(T, DateTime<Utc>)> {
    let now = self.clock.now();
    let mut entries = self.lock();

    let expired = match entries.map.get(key) {
      Some(entry) if entry.expires_at > now => {
        return Some((entry.data.clone(), entry.cached_at));
      }
      Some(_) => true,
      None => false,
    };

    if expired {
      entries.map.remove(key);
    }
    None
  }

  /// Store a value that expires `ttl` from now.
  pub fn set(&self, key: &str, data: T, ttl: Duration) {
    let mut entries = self.lock();
    self.insert(&mut entries, key, data, ttl);
  }

  /// Store a value only if nothing cleared the cache since `generation`
  /// was read. Returns whether the value was stored.
  pub fn set_if_current(&self, key: &str, data: T, ttl: Duration, generation: u64) -> bool {
    let mut entries = self.lock();
    if entries.generation != generation {
      return false;
    }
    self.insert(&mut entries, key, data, ttl);
    true
  }

  /// Remove a single entry. Returns whether it was present.
  pub fn delete(&self, key: &str) -> bool {
    self.lock().map.remove(key).is_some()
  }

  /// Remove every entry.
  pub fn clear(&self) {
    let mut entries = self.lock();
    entries.map.clear();
    entries.generation = entries.generation.wrapping_add(1);
  }

  /// Number of stored entries, expired ones included until they are swept.
  pub fn len(&self) -> usize {
    self.lock().map.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn insert(&self, entries: &mut Entries<T>, key: &str, data: T, ttl: Duration) {
    let now = self.clock.now();
    entries.map.retain(|_, entry| entry.expires_at > now);
    entries.map.insert(
      key.to_string(),
      CacheEntry {
        data,
        cached_at: now,
        // Saturate instead of overflowing the calendar.
        expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
      },
    );
  }

  fn lock(&self) -> MutexGuard<'_, Entries<T>> {
    // A panic while holding the lock cannot leave a half-written entry behind.
    self
      .entries
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::ManualClock;

  fn cache_with_clock() -> (TtlCache<String>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::epoch());
    (TtlCache::new(clock.clone()), clock)
  }

  #[test]
  fn test_get_returns_value_before_expiry() {
    let (cache, clock) = cache_with_clock();
    cache.set("a", "value".to_string(), Duration::seconds(30));

    clock.advance(Duration::seconds(29));
    assert_eq!(cache.get("a"), Some("value".to_string()));
  }

  #[test]
  fn test_expired_entry_is_removed_on_read() {
    let (cache, clock) = cache_with_clock();
    cache.set("a", "value".to_string(), Duration::seconds(30));

    clock.advance(Duration::seconds(30));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("a"), None);
    assert!(cache.is_empty());
  }

  #[test]
  fn test_delete_and_clear() {
    let (cache, _clock) = cache_with_clock();
    cache.set("a", "1".to_string(), Duration::minutes(5));
    cache.set("b", "2".to_string(), Duration::minutes(5));

    assert!(cache.delete("a"));
    assert!(!cache.delete("a"));
    assert_eq!(cache.get("b"), Some("2".to_string()));

    cache.clear();
    assert_eq!(cache.get("b"), None);
  }

  #[test]
  fn test_set_overwrites_and_resets_expiry() {
    let (cache, clock) = cache_with_clock();
    cache.set("a", "old".to_string(), Duration::seconds(10));
    clock.advance(Duration::seconds(8));
    cache.set("a", "new".to_string(), Duration::seconds(10));
    clock.advance(Duration::seconds(8));

    let (value, cached_at) = cache.get_with_time("a").unwrap();
    assert_eq!(value, "new");
    assert_eq!(cached_at, clock.now() - Duration::seconds(8));
  }

  #[test]
  fn test_set_sweeps_expired_entries() {
    let (cache, clock) = cache_with_clock();
    cache.set("search:a", "1".to_string(), Duration::seconds(30));
    cache.set("search:b", "2".to_string(), Duration::seconds(30));
    cache.set("list", "3".to_string(), Duration::minutes(5));

    clock.advance(Duration::seconds(31));
    cache.set("search:c", "4".to_string(), Duration::seconds(30));
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("list"), Some("3".to_string()));
    assert_eq!(cache.get("search:c"), Some("4".to_string()));
  }

  #[test]
  fn test_set_if_current_drops_values_from_before_a_clear() {
    let (cache, _clock) = cache_with_clock();
    let before = cache.generation();

    cache.clear();
    assert!(!cache.set_if_current("a", "stale".to_string(), Duration::minutes(1), before));
    assert_eq!(cache.get("a"), None);

    let after = cache.generation();
    assert!(cache.set_if_current("a", "fresh".to_string(), Duration::minutes(1), after));
    assert_eq!(cache.get("a"), Some("fresh".to_string()));
  }

  #[test]
  fn test_huge_ttl_saturates() {
    let (cache, clock) = cache_with_clock();
    cache.set("a", "1".to_string(), Duration::MAX);
    clock.advance(Duration::days(365 * 1000));
    assert_eq!(cache.get("a"), Some("1".to_string()));
  }

  #[test]
  fn test_separate_instances_are_independent() {
    let clock = Arc::new(ManualClock::epoch());
    let credentials: TtlCache<u32> = TtlCache::new(clock.clone());
    let insights: TtlCache<u32> = TtlCache::new(clock);

    credentials.set("k", 1, Duration::minutes(1));
    insights.set("k", 2, Duration::minutes(1));
    credentials.clear();

    assert_eq!(credentials.get("k"), None);
    assert_eq!(insights.get("k"), Some(2));
  }
}
