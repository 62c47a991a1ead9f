//! Content store backends.
//!
//! Services talk to the remote tabular store through `ContentStore`. Rows
//! cross this boundary as JSON objects; the services own (de)serialization.

mod postgrest;
mod schema;
mod sqlite;

use async_trait::async_trait;
use color_eyre::Result;
use serde_json::Value;
use std::sync::Arc;

use crate::config::{Config, StoreConfig};
use crate::content::{QueryPlan, Table};

pub use postgrest::PostgrestStore;
pub use sqlite::SqliteStore;

/// Slice of an ordered result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
  pub offset: u64,
  pub limit: u64,
}

impl RowRange {
  pub fn new(offset: u64, limit: u64) -> Self {
    Self { offset, limit }
  }

  pub fn first(limit: u64) -> Self {
    Self::new(0, limit)
  }
}

/// Remote tabular data source.
#[async_trait]
pub trait ContentStore: Send + Sync {
  /// Number of rows matching the plan.
  async fn count(&self, plan: &QueryPlan) -> Result<u64>;

  /// Rows matching the plan in plan order, optionally sliced.
  async fn select(&self, plan: &QueryPlan, range: Option<RowRange>) -> Result<Vec<Value>>;

  /// Insert a complete row and return it as stored.
  async fn insert(&self, table: Table, row: Value) -> Result<Value>;

  /// Apply a partial row. `None` if no row has this id.
  async fn update(&self, table: Table, id: &str, patch: Value) -> Result<Option<Value>>;

  /// Delete by id. `false` if no row has this id.
  async fn delete(&self, table: Table, id: &str) -> Result<bool>;
}

/// Open the store selected by the configuration.
pub fn open(config: &Config) -> Result<Arc<dyn ContentStore>> {
  match &config.store {
    StoreConfig::Sqlite { path } => {
      let path = match path {
        Some(p) => p.clone(),
        None => SqliteStore::default_path()?,
      };
      Ok(Arc::new(SqliteStore::open(&path)?))
    }
    StoreConfig::Postgrest { url } => {
      let key = Config::get_store_key()?;
      Ok(Arc::new(PostgrestStore::new(url, key)?))
    }
  }
}

#[cfg(test)]
pub mod testing {
  //! Store wrappers for service tests.

  use super::*;
  use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
  use std::time::Duration;

  /// Counts calls reaching the wrapped store and can be switched to fail or
  /// to answer selects slowly.
  pub struct CountingStore {
    inner: Arc<dyn ContentStore>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    failing: AtomicBool,
    select_delay_ms: AtomicU64,
  }

  impl CountingStore {
    pub fn new(inner: Arc<dyn ContentStore>) -> Self {
      Self {
        inner,
        reads: AtomicUsize::new(0),
        writes: AtomicUsize::new(0),
        failing: AtomicBool::new(false),
        select_delay_ms: AtomicU64::new(0),
      }
    }

    pub fn in_memory() -> Self {
      Self::new(Arc::new(
        SqliteStore::open_in_memory().expect("in-memory store"),
      ))
    }

    /// Count and select calls so far.
    pub fn reads(&self) -> usize {
      self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
      self.writes.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
      self.failing.store(failing, Ordering::SeqCst);
    }

    /// Hold every select result back for `delay` after reading it.
    pub fn set_select_delay(&self, delay: Duration) {
      let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
      self.select_delay_ms.store(millis, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
      if self.failing.load(Ordering::SeqCst) {
        return Err(color_eyre::eyre::eyre!("connection refused"));
      }
      Ok(())
    }
  }

  #[async_trait]
  impl ContentStore for CountingStore {
    async fn count(&self, plan: &QueryPlan) -> Result<u64> {
      self.reads.fetch_add(1, Ordering::SeqCst);
      self.check()?;
      self.inner.count(plan).await
    }

    async fn select(&self, plan: &QueryPlan, range: Option<RowRange>) -> Result<Vec<Value>> {
      self.reads.fetch_add(1, Ordering::SeqCst);
      self.check()?;
      let rows = self.inner.select(plan, range).await?;
      let delay = self.select_delay_ms.load(Ordering::SeqCst);
      if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
      }
      Ok(rows)
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value> {
      self.writes.fetch_add(1, Ordering::SeqCst);
      self.check()?;
      self.inner.insert(table, row).await
    }

    async fn update(&self, table: Table, id: &str, patch: Value) -> Result<Option<Value>> {
      self.writes.fetch_add(1, Ordering::SeqCst);
      self.check()?;
      self.inner.update(table, id, patch).await
    }

    async fn delete(&self, table: Table, id: &str) -> Result<bool> {
      self.writes.fetch_add(1, Ordering::SeqCst);
      self.check()?;
      self.inner.delete(table, id).await
    }
  }
}
