//! `/api/insights` handlers.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use std::collections::BTreeMap;

use crate::content::filter::from_query_pairs;
use crate::content::{Insight, InsightPatch, NewInsight, PageRequest};
use crate::error::ContentError;
use crate::service::ContentServices;

use super::{parse_body, reject, reject_list, require_id, respond};

const DEFAULT_RELATED: u64 = 3;

/// `?id=` or `?slug=` answers one insight; anything else is a filtered,
/// sorted list.
pub async fn get(
  State(services): State<ContentServices>,
  Query(mut params): Query<BTreeMap<String, String>>,
) -> Response {
  let service = &services.insights;

  if let Some(id) = params.remove("id") {
    return respond(service.get_by_id(&id).await, StatusCode::OK);
  }
  if let Some(slug) = params.remove("slug") {
    return respond(service.get_by_slug(&slug).await, StatusCode::OK);
  }

  let page = match PageRequest::from_query(&mut params) {
    Ok(page) => page,
    Err(errors) => return reject_list::<Insight>(errors),
  };
  let filter = from_query_pairs(params);
  respond(service.list_value(&filter, &page).await, StatusCode::OK)
}

pub async fn create(State(services): State<ContentServices>, body: Bytes) -> Response {
  let input: NewInsight = match parse_body(&body) {
    Ok(input) => input,
    Err(e) => return reject::<Insight>(e),
  };
  respond(services.insights.create(input).await, StatusCode::CREATED)
}

pub async fn update(
  State(services): State<ContentServices>,
  Query(params): Query<BTreeMap<String, String>>,
  body: Bytes,
) -> Response {
  let id = match require_id(&params) {
    Ok(id) => id,
    Err(e) => return reject::<Insight>(e),
  };
  let patch: InsightPatch = match parse_body(&body) {
    Ok(patch) => patch,
    Err(e) => return reject::<Insight>(e),
  };
  respond(services.insights.update(&id, patch).await, StatusCode::OK)
}

pub async fn delete(
  State(services): State<ContentServices>,
  Query(params): Query<BTreeMap<String, String>>,
) -> Response {
  let id = match require_id(&params) {
    Ok(id) => id,
    Err(e) => return reject::<String>(e),
  };
  respond(services.insights.delete(&id).await, StatusCode::OK)
}

pub async fn publish(
  State(services): State<ContentServices>,
  Query(params): Query<BTreeMap<String, String>>,
) -> Response {
  match require_id(&params) {
    Ok(id) => respond(services.insights.publish(&id).await, StatusCode::OK),
    Err(e) => reject::<Insight>(e),
  }
}

pub async fn unpublish(
  State(services): State<ContentServices>,
  Query(params): Query<BTreeMap<String, String>>,
) -> Response {
  match require_id(&params) {
    Ok(id) => respond(services.insights.unpublish(&id).await, StatusCode::OK),
    Err(e) => reject::<Insight>(e),
  }
}

/// `?slug=&limit=`
pub async fn related(
  State(services): State<ContentServices>,
  Query(params): Query<BTreeMap<String, String>>,
) -> Response {
  let Some(slug) = params.get("slug") else {
    return reject::<Vec<Insight>>(ContentError::validation("slug query parameter is required"));
  };
  let limit = match params.get("limit").map(|raw| raw.trim().parse::<u64>()) {
    None => DEFAULT_RELATED,
    Some(Ok(limit)) => limit,
    Some(Err(_)) => {
      return reject::<Vec<Insight>>(ContentError::validation("limit must be a positive integer"))
    }
  };
  respond(services.insights.get_related(slug, limit).await, StatusCode::OK)
}

pub async fn tags(State(services): State<ContentServices>) -> Response {
  respond(services.insights.list_tags().await, StatusCode::OK)
}

#[cfg(test)]
mod tests {
  use super::super::testing::{app, send};
  use axum::http::{Method, StatusCode};
  use serde_json::{json, Value};

  fn article(title: &str, tags: &[&str]) -> Value {
    json!({
      "title": title,
      "excerpt": "Short summary",
      "content": "<p>Long form</p>",
      "author": "R. Consultant",
      "tags": tags,
    })
  }

  #[tokio::test]
  async fn test_publish_flow_over_http() {
    let (app, _) = app();

    let (status, body) = send(&app, Method::POST, "/api/insights", Some(article("Ports 2030", &["ports"]))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["slug"], "ports-2030");
    assert_eq!(body["data"]["is_published"], false);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = send(&app, Method::GET, "/api/insights?is_published=true", None).await;
    assert_eq!(body["data"]["pagination"]["total"], 0);

    let (status, body) = send(
      &app,
      Method::POST,
      &format!("/api/insights/publish?id={}", id),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_published"], true);
    assert!(body["data"]["published_date"].is_string());

    let (_, body) = send(&app, Method::GET, "/api/insights?is_published=true", None).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let (status, body) = send(&app, Method::GET, "/api/insights?slug=ports-2030", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id.as_str());

    let (status, body) = send(
      &app,
      Method::POST,
      &format!("/api/insights/unpublish?id={}", id),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_published"], false);
  }

  #[tokio::test]
  async fn test_update_rejects_unknown_fields() {
    let (app, services) = app();
    let (_, body) = send(&app, Method::POST, "/api/insights", Some(article("Tax reform", &[]))).await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
      &app,
      Method::PUT,
      &format!("/api/insights?id={}", id),
      Some(json!({ "headline": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
      &app,
      Method::PUT,
      &format!("/api/insights?id={}", id),
      Some(json!({ "image_url": "https://cdn.example/tax.png" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["image_url"], "https://cdn.example/tax.png");

    let stored = services.insights.get_by_id(&id).await.into_result().unwrap();
    assert_eq!(stored.image_url.as_deref(), Some("https://cdn.example/tax.png"));
  }

  #[tokio::test]
  async fn test_list_sorting_and_errors() {
    let (app, _) = app();
    send(&app, Method::POST, "/api/insights", Some(article("Bravo", &[]))).await;
    send(&app, Method::POST, "/api/insights", Some(article("Alpha", &[]))).await;

    let (status, body) = send(
      &app,
      Method::GET,
      "/api/insights?sortBy=title&sortOrder=asc",
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["data"][0]["title"], "Alpha");

    let (status, _) = send(&app, Method::GET, "/api/insights?sortBy=excerpt", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/insights?slug=missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, "/api/insights/publish", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn test_related_and_tags() {
    let (app, services) = app();
    for (title, tags) in [("Grid A", ["energy"]), ("Grid B", ["energy"]), ("Roads", ["transport"])] {
      let mut input: crate::content::NewInsight = serde_json::from_value(article(title, &tags)).unwrap();
      input.is_published = Some(true);
      services.insights.create(input).await.into_result().unwrap();
    }

    let (status, body) = send(&app, Method::GET, "/api/insights/related?slug=grid-a", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["slug"], "grid-b");

    let (status, _) = send(&app, Method::GET, "/api/insights/related?slug=grid-a&limit=x", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, Method::GET, "/api/insights/tags", None).await;
    assert_eq!(body["data"], json!(["energy", "transport"]));
  }
}
