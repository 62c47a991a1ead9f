//! Async query state for content fetches.
//!
//! A `Query<T>` wraps a fetcher, runs it on the tokio runtime and exposes the
//! outcome as idle / loading / success / error, plus an "empty" view of a
//! successful result so callers can tell "nothing matched" from "failed".
//!
//! ```ignore
//! let service = services.insights.clone();
//! let mut query = Query::new(move || {
//!     let service = service.clone();
//!     async move { service.get_published(&PageRequest::default()).await.into_result() }
//! })
//! .with_empty_check(ListPage::is_empty);
//!
//! query.fetch();
//! // later, on each tick
//! if query.poll() {
//!     // state changed
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// The state of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

type EmptyCheck<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Async query for data fetching with state management.
///
/// Only the most recent fetch can update the state: starting a new one drops
/// the channel of the previous, so a slow response arriving late is
/// discarded.
pub struct Query<T> {
  state: QueryState<T>,
  fetcher: FetcherFn<T>,
  empty_check: Option<EmptyCheck<T>>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, String>>>,
  fetched_at: Option<Instant>,
  stale_time: Duration,
}

impl<T: Send + 'static> Query<T> {
  /// Create a new query with the given fetcher function.
  ///
  /// The fetcher is called each time `fetch()`, `refetch()` or `retry()`
  /// starts a request.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      fetcher: Box::new(move || Box::pin(fetcher())),
      empty_check: None,
      receiver: None,
      fetched_at: None,
      stale_time: Duration::from_secs(60),
    }
  }

  /// Set the stale time for this query.
  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.stale_time = duration;
    self
  }

  /// Decide when a successful result counts as empty.
  pub fn with_empty_check<F>(mut self, check: F) -> Self
  where
    F: Fn(&T) -> bool + Send + Sync + 'static,
  {
    self.empty_check = Some(Box::new(check));
    self
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_success(&self) -> bool {
    self.state.is_success()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&str> {
    self.state.error()
  }

  /// Succeeded, but with nothing to show.
  pub fn is_empty(&self) -> bool {
    match (&self.state, &self.empty_check) {
      (QueryState::Success(data), Some(check)) => check(data),
      _ => false,
    }
  }

  /// Check if the data is older than the stale time.
  pub fn is_stale(&self) -> bool {
    match &self.state {
      QueryState::Success(_) => self
        .fetched_at
        .map(|t| t.elapsed() > self.stale_time)
        .unwrap_or(true),
      _ => false,
    }
  }

  /// Start fetching data if not already loading.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Force a refetch, superseding any pending fetch.
  pub fn refetch(&mut self) {
    self.receiver = None;
    self.start_fetch();
  }

  /// Fetch again after an error. No-op in any other state.
  pub fn retry(&mut self) {
    if self.state.is_error() {
      self.start_fetch();
    }
  }

  /// Poll for results from a pending fetch.
  ///
  /// Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(data)) => {
        self.state = QueryState::Success(data);
        self.fetched_at = Some(Instant::now());
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = QueryState::Error(error);
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // Fetch task ended without sending (panicked)
        self.state = QueryState::Error("Query was cancelled".to_string());
        self.receiver = None;
        true
      }
    }
  }

  /// Wait for the pending fetch, if any, and apply its result.
  pub async fn settle(&mut self) -> bool {
    let Some(receiver) = &mut self.receiver else {
      return false;
    };
    let outcome = receiver.recv().await;
    self.receiver = None;
    match outcome {
      Some(Ok(data)) => {
        self.state = QueryState::Success(data);
        self.fetched_at = Some(Instant::now());
      }
      Some(Err(error)) => self.state = QueryState::Error(error),
      None => self.state = QueryState::Error("Query was cancelled".to_string()),
    }
    true
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = QueryState::Loading;

    let future = (self.fetcher)();
    tokio::spawn(async move {
      let result = future.await;
      // Receiver is gone when a newer fetch superseded this one
      let _ = tx.send(result);
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("fetched_at", &self.fetched_at)
      .field("stale_time", &self.stale_time)
      .finish_non_exhaustive()
  }
}
