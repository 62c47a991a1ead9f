//! Ready-made queries over the content services, for polling front ends.

use std::time::{Duration, Instant};

use crate::content::{
  Credential, CredentialFilter, Insight, InsightFilter, ListPage, PageRequest,
};
use crate::query::Query;
use crate::service::{CredentialService, InsightService};

/// Quiet period before a search input triggers a fetch.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

pub fn credentials_query(
  service: CredentialService,
  filter: CredentialFilter,
  page: PageRequest,
) -> Query<ListPage<Credential>> {
  Query::new(move || {
    let service = service.clone();
    let filter = filter.clone();
    let page = page.clone();
    async move { service.list(&filter, &page).await.into_result() }
  })
  .with_empty_check(ListPage::is_empty)
}

pub fn insights_query(
  service: InsightService,
  filter: InsightFilter,
  page: PageRequest,
) -> Query<ListPage<Insight>> {
  Query::new(move || {
    let service = service.clone();
    let filter = filter.clone();
    let page = page.clone();
    async move { service.list(&filter, &page).await.into_result() }
  })
  .with_empty_check(ListPage::is_empty)
}

/// Single insight by slug, as an article page loads it.
pub fn insight_query(service: InsightService, slug: String) -> Query<Insight> {
  Query::new(move || {
    let service = service.clone();
    let slug = slug.clone();
    async move { service.get_by_slug(&slug).await.into_result() }
  })
}

pub fn insight_search_query(
  service: InsightService,
  term: String,
  page: PageRequest,
) -> Query<ListPage<Insight>> {
  Query::new(move || {
    let service = service.clone();
    let term = term.clone();
    let page = page.clone();
    async move { service.search(&term, &page).await.into_result() }
  })
  .with_empty_check(ListPage::is_empty)
}

/// Holds keystrokes back until input has been quiet for the debounce delay.
#[derive(Debug, Clone)]
pub struct DebouncedSearch {
  delay: Duration,
  pending: Option<(String, Instant)>,
  committed: Option<String>,
}

impl Default for DebouncedSearch {
  fn default() -> Self {
    Self::new(SEARCH_DEBOUNCE)
  }
}

impl DebouncedSearch {
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      pending: None,
      committed: None,
    }
  }

  pub fn input(&mut self, text: &str) {
    self.input_at(text, Instant::now());
  }

  pub fn input_at(&mut self, text: &str, at: Instant) {
    self.pending = Some((text.trim().to_string(), at));
  }

  /// The term to search for, once the input settled on something new.
  pub fn poll(&mut self) -> Option<String> {
    self.poll_at(Instant::now())
  }

  pub fn poll_at(&mut self, now: Instant) -> Option<String> {
    let (_, at) = self.pending.as_ref()?;
    if now.duration_since(*at) < self.delay {
      return None;
    }

    let (term, _) = self.pending.take()?;
    if self.committed.as_deref() == Some(term.as_str()) {
      return None;
    }
    self.committed = Some(term.clone());
    Some(term)
  }

  /// Last term handed out by `poll`.
  pub fn committed(&self) -> Option<&str> {
    self.committed.as_deref()
  }
}

/// Search box state: debounced input driving a search query.
pub struct InsightSearch {
  service: InsightService,
  page: PageRequest,
  debounce: DebouncedSearch,
  query: Option<Query<ListPage<Insight>>>,
}

impl InsightSearch {
  pub fn new(service: InsightService, page: PageRequest) -> Self {
    Self::with_debounce(service, page, DebouncedSearch::default())
  }

  pub fn with_debounce(service: InsightService, page: PageRequest, debounce: DebouncedSearch) -> Self {
    Self {
      service,
      page,
      debounce,
      query: None,
    }
  }

  pub fn input(&mut self, text: &str) {
    self.debounce.input(text);
  }

  pub fn input_at(&mut self, text: &str, at: Instant) {
    self.debounce.input_at(text, at);
  }

  /// Advance the search. Returns `true` when a fetch started or results
  /// changed.
  pub fn tick(&mut self) -> bool {
    self.tick_at(Instant::now())
  }

  pub fn tick_at(&mut self, now: Instant) -> bool {
    let mut changed = false;

    if let Some(term) = self.debounce.poll_at(now) {
      if term.is_empty() {
        // Cleared box: drop results instead of searching for nothing.
        self.query = None;
      } else {
        let mut query = insight_search_query(self.service.clone(), term, self.page.clone());
        query.fetch();
        self.query = Some(query);
      }
      changed = true;
    }

    if let Some(query) = &mut self.query {
      changed |= query.poll();
    }
    changed
  }

  pub fn query(&self) -> Option<&Query<ListPage<Insight>>> {
    self.query.as_ref()
  }

  pub fn query_mut(&mut self) -> Option<&mut Query<ListPage<Insight>>> {
    self.query.as_mut()
  }
}
