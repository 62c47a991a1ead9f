//! Credential service.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{CacheLayer, Clock};
use crate::config::DomainTtl;
use crate::content::plan::credential_plan;
use crate::content::{
  ContentQueryKey, Credential, CredentialFilter, CredentialPatch, FilterValue, ListPage,
  NewCredential, PageRequest, QueryPlan, Table,
};
use crate::error::{ContentError, ContentResult, ServiceResponse};
use crate::store::ContentStore;

use super::{
  decode, ensure_valid, fetch_all, fetch_one, fetch_page, list_response, required_id,
  store_error, CachedContent,
};

const ENTITY: &str = "Credential";

#[derive(Clone)]
pub struct CredentialService {
  store: Arc<dyn ContentStore>,
  cache: CacheLayer<CachedContent<Credential>>,
  clock: Arc<dyn Clock>,
  ttl: DomainTtl,
}

impl CredentialService {
  pub fn new(
    store: Arc<dyn ContentStore>,
    cache: CacheLayer<CachedContent<Credential>>,
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

  pub fn cache(&self) -> &CacheLayer<CachedContent<Credential>> {
    &self.cache
  }

  /// One page of credentials matching `filter`.
  pub async fn list(
    &self,
    filter: &CredentialFilter,
    page: &PageRequest,
  ) -> ServiceResponse<ListPage<Credential>> {
    list_response(self.try_list(filter, page).await, page)
  }

  /// Like `list`, for a filter that has not been validated yet.
  pub async fn list_value(
    &self,
    filter: &Value,
    page: &PageRequest,
  ) -> ServiceResponse<ListPage<Credential>> {
    match CredentialFilter::from_value(filter) {
      Ok(filter) => self.list(&filter, page).await,
      Err(report) => {
        ServiceResponse::err_with(ListPage::empty(page), ContentError::Validation(report.errors))
      }
    }
  }

  async fn try_list(
    &self,
    filter: &CredentialFilter,
    page: &PageRequest,
  ) -> ContentResult<ListPage<Credential>> {
    let key = ContentQueryKey::credential_list(filter, page);

    let result = self
      .cache
      .fetch(&key, self.ttl.list(), || {
        let store = Arc::clone(&self.store);
        let filter = filter.clone();
        let page = page.clone();
        async move {
          let report = filter.validate();
          ensure_valid(report.errors)?;
          let plan = credential_plan(&filter);
          fetch_page(store.as_ref(), &plan, &page, "list credentials")
            .await
            .map(CachedContent::Page)
        }
      })
      .await?;

    result.data.into_page()
  }

  pub async fn get_by_id(&self, id: &str) -> ServiceResponse<Credential> {
    self.try_get_by_id(id).await.into()
  }

  async fn try_get_by_id(&self, id: &str) -> ContentResult<Credential> {
    let id = required_id(id)?;
    let key = ContentQueryKey::CredentialById { id: id.to_string() };

    let result = self
      .cache
      .fetch(&key, self.ttl.item(), || {
        let store = Arc::clone(&self.store);
        let id = id.to_string();
        async move {
          let plan = QueryPlan::new(Table::Credentials).eq("id", FilterValue::Text(id.clone()));
          fetch_one(store.as_ref(), &plan, "get credential")
            .await?
            .map(CachedContent::Item)
            .ok_or_else(|| ContentError::not_found(ENTITY, id))
        }
      })
      .await?;

    result.data.into_item()
  }

  /// Active credentials, in display order.
  pub async fn get_active(&self, page: &PageRequest) -> ServiceResponse<ListPage<Credential>> {
    let filter = CredentialFilter {
      is_active: Some(true),
      ..Default::default()
    };
    self.list(&filter, page).await
  }

  /// Every active credential carrying the service tag.
  pub async fn get_by_service_tag(&self, tag: &str) -> ServiceResponse<Vec<Credential>> {
    let filter = CredentialFilter {
      service_tags: Some(vec![tag.trim().to_string()]),
      is_active: Some(true),
      ..Default::default()
    };
    self.try_all(filter).await.into()
  }

  /// Every active credential carrying the industry tag.
  pub async fn get_by_industry_tag(&self, tag: &str) -> ServiceResponse<Vec<Credential>> {
    let filter = CredentialFilter {
      industry_tags: Some(vec![tag.trim().to_string()]),
      is_active: Some(true),
      ..Default::default()
    };
    self.try_all(filter).await.into()
  }

  async fn try_all(&self, filter: CredentialFilter) -> ContentResult<Vec<Credential>> {
    let report = filter.validate();
    ensure_valid(report.errors)?;
    let key = ContentQueryKey::credential_all(&filter);

    let result = self
      .cache
      .fetch(&key, self.ttl.list(), || {
        let store = Arc::clone(&self.store);
        async move {
          let plan = credential_plan(&filter);
          fetch_all(store.as_ref(), &plan, None, "list credentials by tag")
            .await
            .map(CachedContent::Items)
        }
      })
      .await?;

    result.data.into_items()
  }

  pub async fn create(&self, input: NewCredential) -> ServiceResponse<Credential> {
    self.try_create(input).await.into()
  }

  async fn try_create(&self, input: NewCredential) -> ContentResult<Credential> {
    ensure_valid(input.validate())?;

    let credential = Credential {
      id: Uuid::new_v4().to_string(),
      title: input.title.trim().to_string(),
      service_tags: input.service_tags,
      industry_tags: input.industry_tags,
      is_active: input.is_active.unwrap_or(true),
      sort_order: input.sort_order.unwrap_or(0),
      created_at: self.clock.now(),
    };
    let row = serde_json::to_value(&credential).map_err(ContentError::query)?;

    let stored = self
      .store
      .insert(Table::Credentials, row)
      .await
      .map_err(|e| store_error("create credential", e))?;
    let stored: Credential = decode(stored).map_err(|e| store_error("create credential", e))?;

    self.invalidate(&stored.id);
    info!(id = %stored.id, "credential created");
    Ok(stored)
  }

  pub async fn update(&self, id: &str, patch: CredentialPatch) -> ServiceResponse<Credential> {
    self.try_update(id, patch).await.into()
  }

  async fn try_update(&self, id: &str, mut patch: CredentialPatch) -> ContentResult<Credential> {
    let id = required_id(id)?;
    ensure_valid(patch.validate())?;
    if let Some(title) = patch.title.take() {
      patch.title = Some(title.trim().to_string());
    }

    let row = serde_json::to_value(&patch).map_err(ContentError::query)?;
    if row.as_object().is_some_and(|o| o.is_empty()) {
      return Err(ContentError::validation("update must set at least one field"));
    }

    let stored = self
      .store
      .update(Table::Credentials, id, row)
      .await
      .map_err(|e| store_error("update credential", e))?
      .ok_or_else(|| ContentError::not_found(ENTITY, id))?;
    let stored: Credential = decode(stored).map_err(|e| store_error("update credential", e))?;

    self.invalidate(id);
    info!(id, "credential updated");
    Ok(stored)
  }

  /// Show or hide a credential.
  pub async fn set_active(&self, id: &str, active: bool) -> ServiceResponse<Credential> {
    let patch = CredentialPatch {
      is_active: Some(active),
      ..Default::default()
    };
    self.update(id, patch).await
  }

  /// Delete a credential, answering with its id.
  pub async fn delete(&self, id: &str) -> ServiceResponse<String> {
    self.try_delete(id).await.into()
  }

  async fn try_delete(&self, id: &str) -> ContentResult<String> {
    let id = required_id(id)?;
    let deleted = self
      .store
      .delete(Table::Credentials, id)
      .await
      .map_err(|e| store_error("delete credential", e))?;
    if !deleted {
      return Err(ContentError::not_found(ENTITY, id));
    }

    self.invalidate(id);
    info!(id, "credential deleted");
    Ok(id.to_string())
  }

  fn invalidate(&self, id: &str) {
    debug!(id, "invalidating credential cache");
    self
      .cache
      .invalidate(&[ContentQueryKey::CredentialById { id: id.to_string() }]);
  }
}
