//! Insight service: listing, slug lookup, search and the publication
//! lifecycle.
//!
//! An insight starts as a draft unless created published. Publishing stamps
//! `published_date` the first time; unpublishing keeps it, so a republished
//! article retains its original date.

use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{CacheLayer, Clock};
use crate::config::DomainTtl;
use crate::content::pagination::MAX_PAGE_SIZE;
use crate::content::plan::insight_plan;
use crate::content::{
  slugify, ContentQueryKey, FilterValue, Insight, InsightFilter, InsightPatch, ListPage,
  NewInsight, PageRequest, QueryPlan, Table,
};
use crate::error::{ContentError, ContentResult, ServiceResponse};
use crate::store::{ContentStore, RowRange};

use super::{
  decode, ensure_valid, fetch_all, fetch_one, fetch_page, list_response, required_id,
  store_error, CachedContent,
};

const ENTITY: &str = "Insight";

#[derive(Clone)]
pub struct InsightService {
  store: Arc<dyn ContentStore>,
  cache: CacheLayer<CachedContent<Insight>>,
  clock: Arc<dyn Clock>,
  ttl: DomainTtl,
}

impl InsightService {
  pub fn new(
    store: Arc<dyn ContentStore>,
    cache: CacheLayer<CachedContent<Insight>>,
    clock: Arc<dyn Clock>,
    ttl: DomainTtl,
  ) -> Self {
    Self {
      store,
      cache,
      clock,
      ttl,
    }
  }

  pub fn cache(&self) -> &CacheLayer<CachedContent<Insight>> {
    &self.cache
  }

  /// One page of insights matching `filter`, ordered per `page`.
  pub async fn list(
    &self,
    filter: &InsightFilter,
    page: &PageRequest,
  ) -> ServiceResponse<ListPage<Insight>> {
    let key = ContentQueryKey::insight_list(filter, page);
    let result = self
      .cached_page(key, self.ttl.list(), filter.clone(), page, "list insights")
      .await;
    list_response(result, page)
  }

  /// Like `list`, for a filter that has not been validated yet.
  pub async fn list_value(
    &self,
    filter: &Value,
    page: &PageRequest,
  ) -> ServiceResponse<ListPage<Insight>> {
    match InsightFilter::from_value(filter) {
      Ok(filter) => self.list(&filter, page).await,
      Err(report) => {
        ServiceResponse::err_with(ListPage::empty(page), ContentError::Validation(report.errors))
      }
    }
  }

  /// Published insights, newest first.
  pub async fn get_published(&self, page: &PageRequest) -> ServiceResponse<ListPage<Insight>> {
    self.list(&InsightFilter::published(), page).await
  }

  /// Published insights whose title, excerpt or content contains `term`.
  pub async fn search(&self, term: &str, page: &PageRequest) -> ServiceResponse<ListPage<Insight>> {
    let term = term.trim();
    if term.is_empty() {
      return ServiceResponse::err_with(
        ListPage::empty(page),
        ContentError::validation("search term is required"),
      );
    }

    let filter = InsightFilter {
      search: Some(term.to_string()),
      ..InsightFilter::published()
    };
    let key = ContentQueryKey::insight_search(term, page);
    let result = self
      .cached_page(key, self.ttl.search(), filter, page, "search insights")
      .await;
    list_response(result, page)
  }

  async fn cached_page(
    &self,
    key: ContentQueryKey,
    ttl: chrono::Duration,
    filter: InsightFilter,
    page: &PageRequest,
    operation: &'static str,
  ) -> ContentResult<ListPage<Insight>> {
    let result = self
      .cache
      .fetch(&key, ttl, || {
        let store = Arc::clone(&self.store);
        let page = page.clone();
        async move {
          ensure_valid(filter.validate().errors)?;
          let plan = insight_plan(&filter, &page).map_err(ContentError::validation)?;
          fetch_page(store.as_ref(), &plan, &page, operation)
            .await
            .map(CachedContent::Page)
        }
      })
      .await?;

    result.data.into_page()
  }

  pub async fn get_by_id(&self, id: &str) -> ServiceResponse<Insight> {
    let result = match required_id(id) {
      Ok(id) => {
        let key = ContentQueryKey::InsightById { id: id.to_string() };
        self.cached_item(key, "id", id).await
      }
      Err(e) => Err(e),
    };
    result.into()
  }

  pub async fn get_by_slug(&self, slug: &str) -> ServiceResponse<Insight> {
    self.try_get_by_slug(slug).await.into()
  }

  async fn try_get_by_slug(&self, slug: &str) -> ContentResult<Insight> {
    let slug = slug.trim();
    if slug.is_empty() {
      return Err(ContentError::validation("slug is required"));
    }
    let key = ContentQueryKey::InsightBySlug {
      slug: slug.to_string(),
    };
    self.cached_item(key, "slug", slug).await
  }

  /// Single insight by a unique column.
  async fn cached_item(
    &self,
    key: ContentQueryKey,
    column: &'static str,
    value: &str,
  ) -> ContentResult<Insight> {
    let result = self
      .cache
      .fetch(&key, self.ttl.item(), || {
        let store = Arc::clone(&self.store);
        let value = value.to_string();
        async move {
          let plan = QueryPlan::new(Table::Insights).eq(column, FilterValue::Text(value.clone()));
          fetch_one(store.as_ref(), &plan, "get insight")
            .await?
            .map(CachedContent::Item)
            .ok_or_else(|| ContentError::not_found(ENTITY, value))
        }
      })
      .await?;

    result.data.into_item()
  }

  /// Up to `limit` published insights sharing a tag with the one at `slug`.
  pub async fn get_related(&self, slug: &str, limit: u64) -> ServiceResponse<Vec<Insight>> {
    self.try_get_related(slug, limit).await.into()
  }

  async fn try_get_related(&self, slug: &str, limit: u64) -> ContentResult<Vec<Insight>> {
    let source = self.try_get_by_slug(slug).await?;
    if source.tags.is_empty() {
      return Ok(Vec::new());
    }

    let limit = limit.clamp(1, MAX_PAGE_SIZE);
    let key = ContentQueryKey::InsightRelated {
      slug: source.slug.clone(),
      limit,
    };

    let result = self
      .cache
      .fetch(&key, self.ttl.list(), || {
        let store = Arc::clone(&self.store);
        async move {
          let filter = InsightFilter {
            tags: Some(source.tags),
            ..InsightFilter::published()
          };
          let plan = insight_plan(&filter, &PageRequest::default())
            .map_err(ContentError::validation)?
            .not_eq("id", FilterValue::Text(source.id));
          fetch_all(
            store.as_ref(),
            &plan,
            Some(RowRange::first(limit)),
            "list related insights",
          )
          .await
          .map(CachedContent::Items)
        }
      })
      .await?;

    result.data.into_items()
  }

  /// Distinct tags over published insights, sorted.
  pub async fn list_tags(&self) -> ServiceResponse<Vec<String>> {
    self.try_list_tags().await.into()
  }

  async fn try_list_tags(&self) -> ContentResult<Vec<String>> {
    let result = self
      .cache
      .fetch(&ContentQueryKey::InsightTags, self.ttl.list(), || {
        let store = Arc::clone(&self.store);
        async move {
          let plan = QueryPlan::new(Table::Insights).eq("is_published", FilterValue::Bool(true));
          let insights: Vec<Insight> =
            fetch_all(store.as_ref(), &plan, None, "list insight tags").await?;
          let tags: BTreeSet<String> = insights.into_iter().flat_map(|i| i.tags).collect();
          Ok::<_, ContentError>(CachedContent::Tags(tags.into_iter().collect()))
        }
      })
      .await?;

    result.data.into_tags()
  }

  pub async fn create(&self, input: NewInsight) -> ServiceResponse<Insight> {
    self.try_create(input).await.into()
  }

  async fn try_create(&self, input: NewInsight) -> ContentResult<Insight> {
    ensure_valid(input.validate())?;

    let slug = match input.slug {
      Some(slug) => slug,
      None => slugify(&input.title),
    };
    if slug.is_empty() {
      return Err(ContentError::validation(
        "slug could not be derived from title",
      ));
    }
    self.ensure_slug_free(&slug, None).await?;

    let now = self.clock.now();
    let is_published = input.is_published.unwrap_or(false);
    let published_date = match (is_published, input.published_date) {
      (true, None) => Some(now),
      (_, date) => date,
    };

    let insight = Insight {
      id: Uuid::new_v4().to_string(),
      slug,
      title: input.title.trim().to_string(),
      excerpt: input.excerpt,
      content: input.content,
      author: input.author.trim().to_string(),
      co_author: input.co_author,
      tags: input.tags,
      image_url: input.image_url,
      is_published,
      published_date,
      created_at: now,
      updated_at: now,
    };
    let row = serde_json::to_value(&insight).map_err(ContentError::query)?;

    let stored = self
      .store
      .insert(Table::Insights, row)
      .await
      .map_err(|e| store_error("create insight", e))?;
    let stored: Insight = decode(stored).map_err(|e| store_error("create insight", e))?;

    self.invalidate(&stored);
    info!(id = %stored.id, slug = %stored.slug, "insight created");
    Ok(stored)
  }

  pub async fn update(&self, id: &str, patch: InsightPatch) -> ServiceResponse<Insight> {
    self.try_update(id, patch).await.into()
  }

  async fn try_update(&self, id: &str, mut patch: InsightPatch) -> ContentResult<Insight> {
    let id = required_id(id)?;
    ensure_valid(patch.validate())?;

    if let Some(slug) = &patch.slug {
      self.ensure_slug_free(slug, Some(id)).await?;
    }
    if patch.is_published == Some(true) && patch.published_date.is_none() {
      let current = self.load(id).await?;
      if current.published_date.is_none() {
        patch.published_date = Some(self.clock.now());
      }
    }
    if let Some(title) = patch.title.take() {
      patch.title = Some(title.trim().to_string());
    }

    self.write(id, patch).await
  }

  /// Make an insight public. Already published insights are returned as is.
  pub async fn publish(&self, id: &str) -> ServiceResponse<Insight> {
    self.try_set_published(id, true).await.into()
  }

  /// Return an insight to draft. Its `published_date` is kept.
  pub async fn unpublish(&self, id: &str) -> ServiceResponse<Insight> {
    self.try_set_published(id, false).await.into()
  }

  async fn try_set_published(&self, id: &str, published: bool) -> ContentResult<Insight> {
    let id = required_id(id)?;
    let current = self.load(id).await?;
    if current.is_published == published {
      debug!(id, published, "publication state unchanged");
      return Ok(current);
    }

    let patch = InsightPatch {
      is_published: Some(published),
      published_date: match (published, current.published_date) {
        (true, None) => Some(self.clock.now()),
        _ => None,
      },
      ..Default::default()
    };
    self.write(id, patch).await
  }

  /// Delete an insight, answering with its id.
  pub async fn delete(&self, id: &str) -> ServiceResponse<String> {
    self.try_delete(id).await.into()
  }

  async fn try_delete(&self, id: &str) -> ContentResult<String> {
    let id = required_id(id)?;
    let deleted = self
      .store
      .delete(Table::Insights, id)
      .await
      .map_err(|e| store_error("delete insight", e))?;
    if !deleted {
      return Err(ContentError::not_found(ENTITY, id));
    }

    self
      .cache
      .invalidate(&[ContentQueryKey::InsightById { id: id.to_string() }]);
    info!(id, "insight deleted");
    Ok(id.to_string())
  }

  /// Current row straight from the store, bypassing the cache.
  async fn load(&self, id: &str) -> ContentResult<Insight> {
    let plan = QueryPlan::new(Table::Insights).eq("id", FilterValue::Text(id.to_string()));
    fetch_one(self.store.as_ref(), &plan, "load insight")
      .await?
      .ok_or_else(|| ContentError::not_found(ENTITY, id))
  }

  /// Apply a validated patch, stamping `updated_at`.
  async fn write(&self, id: &str, patch: InsightPatch) -> ContentResult<Insight> {
    let mut row = serde_json::to_value(&patch).map_err(ContentError::query)?;
    let now = serde_json::to_value(self.clock.now()).map_err(ContentError::query)?;
    if let Value::Object(map) = &mut row {
      map.insert("updated_at".to_string(), now);
    }

    let stored = self
      .store
      .update(Table::Insights, id, row)
      .await
      .map_err(|e| store_error("update insight", e))?
      .ok_or_else(|| ContentError::not_found(ENTITY, id))?;
    let stored: Insight = decode(stored).map_err(|e| store_error("update insight", e))?;

    self.invalidate(&stored);
    info!(id, published = stored.is_published, "insight updated");
    Ok(stored)
  }

  async fn ensure_slug_free(&self, slug: &str, except_id: Option<&str>) -> ContentResult<()> {
    let mut plan = QueryPlan::new(Table::Insights).eq("slug", FilterValue::Text(slug.to_string()));
    if let Some(id) = except_id {
      plan = plan.not_eq("id", FilterValue::Text(id.to_string()));
    }

    let taken = self
      .store
      .count(&plan)
      .await
      .map_err(|e| store_error("check insight slug", e))?;
    if taken > 0 {
      return Err(ContentError::validation(format!(
        "slug '{}' is already in use",
        slug
      )));
    }
    Ok(())
  }

  fn invalidate(&self, insight: &Insight) {
    debug!(id = %insight.id, "invalidating insight cache");
    self.cache.invalidate(&[
      ContentQueryKey::InsightById {
        id: insight.id.clone(),
      },
      ContentQueryKey::InsightBySlug {
        slug: insight.slug.clone(),
      },
    ]);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::ManualClock;
  use crate::content::SortOrder;
  use crate::store::testing::CountingStore;
  use chrono::Duration;
  use serde_json::json;

  struct Fixture {
    store: Arc<CountingStore>,
    clock: Arc<ManualClock>,
    service: InsightService,
  }

  fn fixture() -> Fixture {
    let store = Arc::new(CountingStore::in_memory());
    let clock = Arc::new(ManualClock::epoch());
    let service = InsightService::new(
      store.clone(),
      CacheLayer::new(clock.clone()),
      clock.clone(),
      DomainTtl::insights(),
    );
    Fixture {
      store,
      clock,
      service,
    }
  }

  fn draft(title: &str, tags: &[&str]) -> NewInsight {
    NewInsight {
      title: title.to_string(),
      excerpt: format!("{} in brief", title),
      content: "<p>Body</p>".to_string(),
      author: "Jo Analyst".to_string(),
      tags: tags.iter().map(|t| t.to_string()).collect(),
      ..Default::default()
    }
  }

  fn published(title: &str, tags: &[&str]) -> NewInsight {
    NewInsight {
      is_published: Some(true),
      ..draft(title, tags)
    }
  }

  async fn create(f: &Fixture, input: NewInsight) -> Insight {
    let insight = f.service.create(input).await.into_result().unwrap();
    // Keep creation times distinct so ordering is deterministic.
    f.clock.advance(Duration::seconds(1));
    insight
  }

  #[tokio::test]
  async fn test_create_derives_slug_and_stamps_dates() {
    let f = fixture();
    let now = f.clock.now();

    let draft = create(&f, draft("Port Sector: 2025 Outlook!", &["ports"])).await;
    assert_eq!(draft.slug, "port-sector-2025-outlook");
    assert!(!draft.is_published);
    assert_eq!(draft.published_date, None);
    assert_eq!(draft.created_at, now);
    assert_eq!(draft.updated_at, now);

    let live = create(&f, published("Grid tariffs", &[])).await;
    assert!(live.is_published);
    assert_eq!(live.published_date, Some(now + Duration::seconds(1)));

    let fetched = f.service.get_by_slug("grid-tariffs").await.into_result().unwrap();
    assert_eq!(fetched, live);
  }

  #[tokio::test]
  async fn test_duplicate_and_malformed_slugs_are_rejected() {
    let f = fixture();
    create(&f, draft("Water utilities", &[])).await;

    let response = f.service.create(draft("Water Utilities", &[])).await;
    assert_eq!(
      response.error,
      Some(ContentError::validation(
        "slug 'water-utilities' is already in use"
      ))
    );

    let response = f
      .service
      .create(NewInsight {
        slug: Some("Bad Slug".to_string()),
        ..draft("Other", &[])
      })
      .await;
    assert!(matches!(response.error, Some(ContentError::Validation(_))));

    let response = f.service.create(draft("???", &[])).await;
    assert!(matches!(response.error, Some(ContentError::Validation(_))));
  }

  #[tokio::test]
  async fn test_update_keeps_own_slug_and_refreshes_updated_at() {
    let f = fixture();
    let insight = create(&f, draft("Logistics hubs", &[])).await;
    let other = create(&f, draft("Cold chain", &[])).await;

    let updated = f
      .service
      .update(
        &insight.id,
        InsightPatch {
          slug: Some("logistics-hubs".to_string()),
          co_author: Some(Some("Sam Partner".to_string())),
          ..Default::default()
        },
      )
      .await
      .into_result()
      .unwrap();
    assert_eq!(updated.co_author.as_deref(), Some("Sam Partner"));
    assert_eq!(updated.created_at, insight.created_at);
    assert_eq!(updated.updated_at, f.clock.now());

    let response = f
      .service
      .update(
        &insight.id,
        InsightPatch {
          slug: Some(other.slug.clone()),
          ..Default::default()
        },
      )
      .await;
    assert!(matches!(response.error, Some(ContentError::Validation(_))));

    let response = f
      .service
      .update("missing", InsightPatch::default())
      .await;
    assert!(matches!(response.error, Some(ContentError::NotFound { .. })));
  }

  #[tokio::test]
  async fn test_publish_lifecycle() {
    let f = fixture();
    let insight = create(&f, draft("Hydrogen economics", &["energy"])).await;
    let page = PageRequest::default();

    let listed = f.service.get_published(&page).await.into_result().unwrap();
    assert!(listed.is_empty());

    let publish_time = f.clock.now();
    let live = f.service.publish(&insight.id).await.into_result().unwrap();
    assert!(live.is_published);
    assert_eq!(live.published_date, Some(publish_time));

    let listed = f.service.get_published(&page).await.into_result().unwrap();
    assert_eq!(listed.data.len(), 1);
    assert_eq!(listed.data[0].id, insight.id);

    // Publishing again changes nothing.
    f.clock.advance(Duration::hours(1));
    let writes = f.store.writes();
    let again = f.service.publish(&insight.id).await.into_result().unwrap();
    assert_eq!(again, live);
    assert_eq!(f.store.writes(), writes);

    let drafted = f.service.unpublish(&insight.id).await.into_result().unwrap();
    assert!(!drafted.is_published);
    assert_eq!(drafted.published_date, Some(publish_time));
    assert!(f
      .service
      .get_published(&page)
      .await
      .into_result()
      .unwrap()
      .is_empty());

    // Republishing keeps the first publication date.
    let republished = f.service.publish(&insight.id).await.into_result().unwrap();
    assert_eq!(republished.published_date, Some(publish_time));

    let response = f.service.publish("missing").await;
    assert!(matches!(response.error, Some(ContentError::NotFound { .. })));
  }

  #[tokio::test]
  async fn test_update_to_published_sets_date_once() {
    let f = fixture();
    let insight = create(&f, draft("Mining royalties", &[])).await;

    let patch = InsightPatch {
      is_published: Some(true),
      ..Default::default()
    };
    let live = f
      .service
      .update(&insight.id, patch.clone())
      .await
      .into_result()
      .unwrap();
    let first_date = live.published_date;
    assert_eq!(first_date, Some(f.clock.now()));

    f.clock.advance(Duration::days(1));
    let live = f.service.update(&insight.id, patch).await.into_result().unwrap();
    assert_eq!(live.published_date, first_date);
  }

  #[tokio::test]
  async fn test_search_matches_published_only() {
    let f = fixture();
    create(&f, published("Feasibility studies that hold up", &[])).await;
    create(&f, published("Valuing airports", &[])).await;
    create(&f, draft("Feasibility draft", &[])).await;
    let page = PageRequest::default();

    let found = f.service.search("feasibility", &page).await.into_result().unwrap();
    assert_eq!(found.data.len(), 1);
    assert_eq!(found.data[0].title, "Feasibility studies that hold up");
    assert_eq!(found.pagination.total, 1);

    let response = f.service.search("   ", &page).await;
    assert!(matches!(response.error, Some(ContentError::Validation(_))));
    assert!(response.data.is_some_and(|p| p.is_empty()));

    let long = "x".repeat(201);
    let response = f.service.search(&long, &page).await;
    assert!(matches!(response.error, Some(ContentError::Validation(_))));
  }

  #[tokio::test]
  async fn test_search_results_expire_quickly() {
    let f = fixture();
    create(&f, published("Feasibility basics", &[])).await;
    let page = PageRequest::default();

    f.service.search("feasibility", &page).await;
    let reads = f.store.reads();
    f.service.search(" Feasibility ", &page).await;
    assert_eq!(f.store.reads(), reads);

    f.clock.advance(Duration::seconds(31));
    f.service.search("feasibility", &page).await;
    assert!(f.store.reads() > reads);
  }

  #[tokio::test]
  async fn test_list_orders_and_filters() {
    let f = fixture();
    let old = create(&f, published("Older", &["rail"])).await;
    let new = create(&f, published("Newer", &["ports"])).await;
    let draft = create(&f, draft("Draft", &["rail"])).await;

    let all = f
      .service
      .list(&InsightFilter::default(), &PageRequest::default())
      .await
      .into_result()
      .unwrap();
    let ids: Vec<&str> = all.data.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec![new.id.as_str(), old.id.as_str(), draft.id.as_str()]);

    let by_title = PageRequest {
      sort_by: Some("title".to_string()),
      sort_order: Some(SortOrder::Asc),
      ..PageRequest::default()
    };
    let sorted = f
      .service
      .list(&InsightFilter::default(), &by_title)
      .await
      .into_result()
      .unwrap();
    let titles: Vec<&str> = sorted.data.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["Draft", "Newer", "Older"]);

    let rail = f
      .service
      .list_value(&json!({ "tags": ["rail"], "is_published": true }), &PageRequest::default())
      .await
      .into_result()
      .unwrap();
    assert_eq!(rail.data.len(), 1);
    assert_eq!(rail.data[0].id, old.id);

    let bad_sort = PageRequest {
      sort_by: Some("excerpt".to_string()),
      ..PageRequest::default()
    };
    let response = f.service.list(&InsightFilter::default(), &bad_sort).await;
    assert!(matches!(response.error, Some(ContentError::Validation(_))));
  }

  #[tokio::test]
  async fn test_related_and_tags() {
    let f = fixture();
    let source = create(&f, published("Source", &["energy", "tax"])).await;
    let sibling = create(&f, published("Sibling", &["tax"])).await;
    create(&f, published("Unrelated", &["ports"])).await;
    create(&f, draft("Draft sibling", &["energy"])).await;

    let related = f
      .service
      .get_related(&source.slug, 5)
      .await
      .into_result()
      .unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].id, sibling.id);

    let response = f.service.get_related("missing", 5).await;
    assert!(matches!(response.error, Some(ContentError::NotFound { .. })));

    let tags = f.service.list_tags().await.into_result().unwrap();
    assert_eq!(tags, vec!["energy", "ports", "tax"]);
  }

  #[tokio::test]
  async fn test_delete_evicts_cached_reads() {
    let f = fixture();
    let insight = create(&f, published("Short lived", &[])).await;

    assert!(f.service.get_by_slug(&insight.slug).await.is_ok());
    let deleted = f.service.delete(&insight.id).await.into_result().unwrap();
    assert_eq!(deleted, insight.id);

    let response = f.service.get_by_slug(&insight.slug).await;
    assert!(matches!(response.error, Some(ContentError::NotFound { .. })));
    let listed = f
      .service
      .get_published(&PageRequest::default())
      .await
      .into_result()
      .unwrap();
    assert!(listed.is_empty());

    let response = f.service.delete(&insight.id).await;
    assert!(matches!(response.error, Some(ContentError::NotFound { .. })));
  }
}
