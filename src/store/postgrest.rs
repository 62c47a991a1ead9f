//! Content store backed by a hosted Postgres reached through PostgREST.

use async_trait::async_trait;
use chrono::SecondsFormat;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use url::Url;

use super::{ContentStore, RowRange};
use crate::content::{FilterValue, Predicate, QueryPlan, Table};

/// PostgREST API client wrapper
#[derive(Clone)]
pub struct PostgrestStore {
  client: Client,
  base: Url,
}

impl PostgrestStore {
  /// Create a client for the project at `url` (with or without the
  /// `/rest/v1` suffix).
  pub fn new(url: &str, key: String) -> Result<Self> {
    let base = rest_base(url)?;

    let mut headers = HeaderMap::new();
    let key_value =
      HeaderValue::from_str(&key).map_err(|_| eyre!("Store key contains invalid characters"))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", key))
      .map_err(|_| eyre!("Store key contains invalid characters"))?;
    headers.insert("apikey", key_value);
    headers.insert(AUTHORIZATION, bearer);

    let client = Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base })
  }

  fn request(&self, method: Method, table: Table) -> Result<RequestBuilder> {
    let url = self
      .base
      .join(table.name())
      .map_err(|e| eyre!("Invalid table URL for {}: {}", table.name(), e))?;
    Ok(self.client.request(method, url))
  }
}

#[async_trait]
impl ContentStore for PostgrestStore {
  async fn count(&self, plan: &QueryPlan) -> Result<u64> {
    let response = self
      .request(Method::HEAD, plan.table)?
      .query(&filter_params(plan))
      .header("Prefer", "count=exact")
      .send()
      .await
      .map_err(|e| eyre!("Failed to count {}: {}", plan.table.name(), e))?;
    let response = check(response, "count").await?;

    let range = response
      .headers()
      .get(CONTENT_RANGE)
      .and_then(|v| v.to_str().ok())
      .ok_or_else(|| eyre!("Count response for {} has no Content-Range", plan.table.name()))?;
    parse_content_range(range)
  }

  async fn select(&self, plan: &QueryPlan, range: Option<RowRange>) -> Result<Vec<Value>> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filter_params(plan));
    if let Some(order) = order_param(plan) {
      params.push(("order".to_string(), order));
    }
    if let Some(range) = range {
      params.push(("offset".to_string(), range.offset.to_string()));
      params.push(("limit".to_string(), range.limit.to_string()));
    }

    let response = self
      .request(Method::GET, plan.table)?
      .query(&params)
      .send()
      .await
      .map_err(|e| eyre!("Failed to query {}: {}", plan.table.name(), e))?;

    check(response, "select")
      .await?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse {} rows: {}", plan.table.name(), e))
  }

  async fn insert(&self, table: Table, row: Value) -> Result<Value> {
    let response = self
      .request(Method::POST, table)?
      .header("Prefer", "return=representation")
      .json(&row)
      .send()
      .await
      .map_err(|e| eyre!("Failed to insert into {}: {}", table.name(), e))?;

    let rows: Vec<Value> = check(response, "insert")
      .await?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse inserted {} row: {}", table.name(), e))?;
    rows
      .into_iter()
      .next()
      .ok_or_else(|| eyre!("Insert into {} returned no row", table.name()))
  }

  async fn update(&self, table: Table, id: &str, patch: Value) -> Result<Option<Value>> {
    let response = self
      .request(Method::PATCH, table)?
      .query(&[("id", format!("eq.{}", id))])
      .header("Prefer", "return=representation")
      .json(&patch)
      .send()
      .await
      .map_err(|e| eyre!("Failed to update {} {}: {}", table.name(), id, e))?;

    let rows: Vec<Value> = check(response, "update")
      .await?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse updated {} row: {}", table.name(), e))?;
    Ok(rows.into_iter().next())
  }

  async fn delete(&self, table: Table, id: &str) -> Result<bool> {
    let response = self
      .request(Method::DELETE, table)?
      .query(&[("id", format!("eq.{}", id))])
      .header("Prefer", "return=representation")
      .send()
      .await
      .map_err(|e| eyre!("Failed to delete {} {}: {}", table.name(), id, e))?;

    let rows: Vec<Value> = check(response, "delete")
      .await?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse deleted {} row: {}", table.name(), e))?;
    Ok(!rows.is_empty())
  }
}

/// Turn non-2xx responses into errors carrying the response body.
async fn check(response: Response, operation: &str) -> Result<Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let body = response.text().await.unwrap_or_default();
  Err(eyre!("PostgREST {} failed with {}: {}", operation, status, body))
}

fn rest_base(url: &str) -> Result<Url> {
  let mut base = Url::parse(url).map_err(|e| eyre!("Invalid store URL '{}': {}", url, e))?;
  if !base.path().ends_with('/') {
    let path = format!("{}/", base.path());
    base.set_path(&path);
  }
  if !base.path().ends_with("rest/v1/") {
    base = base
      .join("rest/v1/")
      .map_err(|e| eyre!("Invalid store URL '{}': {}", url, e))?;
  }
  Ok(base)
}

/// Render the plan's predicates as PostgREST filter parameters.
fn filter_params(plan: &QueryPlan) -> Vec<(String, String)> {
  plan
    .predicates
    .iter()
    .map(|predicate| match predicate {
      Predicate::Overlaps { column, values } => {
        let items: Vec<String> = values.iter().map(|v| quote(v)).collect();
        (column.to_string(), format!("ov.{{{}}}", items.join(",")))
      }
      Predicate::Eq { column, value } => (column.to_string(), format!("eq.{}", render(value))),
      Predicate::NotEq { column, value } => (column.to_string(), format!("neq.{}", render(value))),
      Predicate::Search { columns, term } => {
        let pattern = quote(&format!("*{}*", strip_wildcards(term)));
        let alternatives: Vec<String> = columns
          .iter()
          .map(|c| format!("{}.ilike.{}", c, pattern))
          .collect();
        ("or".to_string(), format!("({})", alternatives.join(",")))
      }
      Predicate::Gte { column, value } => (column.to_string(), format!("gte.{}", render(value))),
      Predicate::Lte { column, value } => (column.to_string(), format!("lte.{}", render(value))),
    })
    .collect()
}

fn order_param(plan: &QueryPlan) -> Option<String> {
  if plan.order.is_empty() {
    return None;
  }
  let terms: Vec<String> = plan
    .order
    .iter()
    .map(|o| {
      let mut term = format!(
        "{}.{}",
        o.column,
        if o.descending { "desc" } else { "asc" }
      );
      if o.nulls_last {
        term.push_str(".nullslast");
      }
      term
    })
    .collect();
  Some(terms.join(","))
}

fn render(value: &FilterValue) -> String {
  match value {
    FilterValue::Text(s) => s.clone(),
    FilterValue::Bool(b) => b.to_string(),
    FilterValue::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::Millis, true),
  }
}

/// Double-quote a value so reserved characters (`,.:()`) are taken literally.
fn quote(value: &str) -> String {
  format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `*` and `%` are wildcards to PostgREST's ilike.
fn strip_wildcards(term: &str) -> String {
  term.chars().filter(|c| !matches!(c, '*' | '%')).collect()
}

/// Total from a `Content-Range` header such as `0-9/23` or `*/0`.
fn parse_content_range(header: &str) -> Result<u64> {
  header
    .rsplit_once('/')
    .and_then(|(_, total)| total.trim().parse().ok())
    .ok_or_else(|| eyre!("Unexpected Content-Range '{}'", header))
}
