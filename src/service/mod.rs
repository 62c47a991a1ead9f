//! Content services: one façade per content domain.
//!
//! Each service owns its domain cache and shares the store. Reads go through
//! the cache; writes hit the store and then invalidate the domain.

mod credentials;
mod insights;

use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::cache::{CacheLayer, Clock, SystemClock};
use crate::config::Config;
use crate::content::pagination::paginate;
use crate::content::{ListPage, PageRequest, QueryPlan};
use crate::error::{ContentError, ContentResult, ServiceResponse};
use crate::store::{self, ContentStore, RowRange};

pub use credentials::CredentialService;
pub use insights::InsightService;

/// Value held by a domain cache.
#[derive(Debug, Clone)]
pub enum CachedContent<T> {
  Item(T),
  Page(ListPage<T>),
  Items(Vec<T>),
  Tags(Vec<String>),
}

impl<T> CachedContent<T> {
  fn kind(&self) -> &'static str {
    match self {
      Self::Item(_) => "item",
      Self::Page(_) => "page",
      Self::Items(_) => "item list",
      Self::Tags(_) => "tag list",
    }
  }

  fn mismatch(&self, expected: &str) -> ContentError {
    ContentError::Query(format!(
      "Cache entry holds a {} where a {} was expected",
      self.kind(),
      expected
    ))
  }

  pub fn into_item(self) -> ContentResult<T> {
    match self {
      Self::Item(item) => Ok(item),
      other => Err(other.mismatch("item")),
    }
  }

  pub fn into_page(self) -> ContentResult<ListPage<T>> {
    match self {
      Self::Page(page) => Ok(page),
      other => Err(other.mismatch("page")),
    }
  }

  pub fn into_items(self) -> ContentResult<Vec<T>> {
    match self {
      Self::Items(items) => Ok(items),
      other => Err(other.mismatch("item list")),
    }
  }

  pub fn into_tags(self) -> ContentResult<Vec<String>> {
    match self {
      Self::Tags(tags) => Ok(tags),
      other => Err(other.mismatch("tag list")),
    }
  }
}

/// Both content services over one store.
#[derive(Clone)]
pub struct ContentServices {
  pub credentials: CredentialService,
  pub insights: InsightService,
}

impl ContentServices {
  /// Open the configured store and build both services with fresh caches.
  pub fn build(config: &Config) -> Result<Self> {
    let store = store::open(config)?;
    Ok(Self::with_store(store, Arc::new(SystemClock), config))
  }

  pub fn with_store(store: Arc<dyn ContentStore>, clock: Arc<dyn Clock>, config: &Config) -> Self {
    Self {
      credentials: CredentialService::new(
        Arc::clone(&store),
        CacheLayer::new(Arc::clone(&clock)),
        Arc::clone(&clock),
        config.cache.credentials,
      ),
      insights: InsightService::new(
        store,
        CacheLayer::new(Arc::clone(&clock)),
        clock,
        config.cache.insights,
      ),
    }
  }
}

/// List operations answer with an empty page next to the error.
fn list_response<T>(
  result: ContentResult<ListPage<T>>,
  request: &PageRequest,
) -> ServiceResponse<ListPage<T>> {
  match result {
    Ok(page) => ServiceResponse::ok(page),
    Err(error) => ServiceResponse::err_with(ListPage::empty(request), error),
  }
}

/// Log a store failure and turn it into a query error.
fn store_error(operation: &str, report: color_eyre::Report) -> ContentError {
  warn!(operation, error = %report, "store call failed");
  ContentError::query(report.wrap_err(format!("Failed to {}", operation)))
}

fn decode<T: DeserializeOwned>(row: Value) -> Result<T> {
  serde_json::from_value(row).map_err(|e| eyre!("Failed to decode row: {}", e))
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
  rows.into_iter().map(decode).collect()
}

/// Count, clamp the requested page, then read that page.
///
/// The data query is skipped when nothing matches.
async fn fetch_page<T: DeserializeOwned>(
  store: &dyn ContentStore,
  plan: &QueryPlan,
  request: &PageRequest,
  operation: &str,
) -> ContentResult<ListPage<T>> {
  let total = store
    .count(plan)
    .await
    .map_err(|e| store_error(operation, e))?;
  let window = paginate(request, total);

  if total == 0 {
    return Ok(ListPage {
      data: Vec::new(),
      pagination: window.info,
    });
  }

  let rows = store
    .select(plan, Some(RowRange::new(window.offset, window.limit)))
    .await
    .map_err(|e| store_error(operation, e))?;

  Ok(ListPage {
    data: decode_rows(rows).map_err(|e| store_error(operation, e))?,
    pagination: window.info,
  })
}

/// Every row matching the plan, optionally capped.
async fn fetch_all<T: DeserializeOwned>(
  store: &dyn ContentStore,
  plan: &QueryPlan,
  range: Option<RowRange>,
  operation: &str,
) -> ContentResult<Vec<T>> {
  let rows = store
    .select(plan, range)
    .await
    .map_err(|e| store_error(operation, e))?;
  decode_rows(rows).map_err(|e| store_error(operation, e))
}

/// The first row matching the plan.
async fn fetch_one<T: DeserializeOwned>(
  store: &dyn ContentStore,
  plan: &QueryPlan,
  operation: &str,
) -> ContentResult<Option<T>> {
  let mut rows = fetch_all(store, plan, Some(RowRange::first(1)), operation).await?;
  Ok(rows.pop())
}

fn ensure_valid(errors: Vec<String>) -> ContentResult<()> {
  if errors.is_empty() {
    Ok(())
  } else {
    Err(ContentError::Validation(errors))
  }
}

fn required_id(id: &str) -> ContentResult<&str> {
  let id = id.trim();
  if id.is_empty() {
    return Err(ContentError::validation("id is required"));
  }
  Ok(id)
}
