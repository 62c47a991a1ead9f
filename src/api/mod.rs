//! HTTP JSON API over the content services.
//!
//! Every response body is a `ServiceResponse`: `{ "data": ..., "error": ... }`.
//! The status code follows the error kind.

mod credentials;
mod insights;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::content::{ListPage, PageRequest};
use crate::error::{ContentError, ServiceResponse};
use crate::service::ContentServices;

pub fn router(services: ContentServices) -> Router {
  Router::new()
    .route(
      "/api/credentials",
      get(credentials::get)
        .post(credentials::create)
        .put(credentials::update)
        .delete(credentials::delete),
    )
    .route(
      "/api/insights",
      get(insights::get)
        .post(insights::create)
        .put(insights::update)
        .delete(insights::delete),
    )
    .route("/api/insights/publish", post(insights::publish))
    .route("/api/insights/unpublish", post(insights::unpublish))
    .route("/api/insights/related", get(insights::related))
    .route("/api/insights/tags", get(insights::tags))
    .with_state(services)
    .layer(TraceLayer::new_for_http())
}

/// Serve the API until Ctrl-C.
pub async fn serve(services: ContentServices, bind: SocketAddr) -> Result<()> {
  let listener = tokio::net::TcpListener::bind(bind)
    .await
    .map_err(|e| eyre!("Failed to bind {}: {}", bind, e))?;
  info!(%bind, "listening");

  axum::serve(listener, router(services))
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| eyre!("Server error: {}", e))
}

async fn shutdown_signal() {
  if tokio::signal::ctrl_c().await.is_ok() {
    info!("shutting down");
  }
}

fn status_for(error: &ContentError) -> StatusCode {
  match error {
    ContentError::Validation(_) => StatusCode::BAD_REQUEST,
    ContentError::NotFound { .. } => StatusCode::NOT_FOUND,
    ContentError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

/// Write a service response, using `success` when it carries no error.
fn respond<T: Serialize>(response: ServiceResponse<T>, success: StatusCode) -> Response {
  let status = response.error.as_ref().map_or(success, status_for);
  (status, Json(response)).into_response()
}

fn reject<T: Serialize>(error: ContentError) -> Response {
  respond(ServiceResponse::<T>::err(error), StatusCode::OK)
}

/// Reject a list request before it reaches the service, keeping the empty
/// page shape.
fn reject_list<T: Serialize>(errors: Vec<String>) -> Response {
  respond(
    ServiceResponse::err_with(
      ListPage::<T>::empty(&PageRequest::default()),
      ContentError::Validation(errors),
    ),
    StatusCode::OK,
  )
}

/// Decode a JSON request body into a write input.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ContentError> {
  if body.is_empty() {
    return Err(ContentError::validation("request body is required"));
  }
  serde_json::from_slice(body)
    .map_err(|e| ContentError::validation(format!("invalid request body: {}", e)))
}

fn require_id(params: &BTreeMap<String, String>) -> Result<String, ContentError> {
  params
    .get("id")
    .map(|id| id.trim())
    .filter(|id| !id.is_empty())
    .map(str::to_string)
    .ok_or_else(|| ContentError::validation("id query parameter is required"))
}

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use crate::cache::ManualClock;
  use crate::config::Config;
  use crate::store::testing::CountingStore;
  use axum::body::Body;
  use axum::http::{Method, Request};
  use serde_json::Value;
  use std::sync::Arc;
  use tower::ServiceExt; // for `oneshot`

  pub fn app() -> (Router, ContentServices) {
    let services = ContentServices::with_store(
      Arc::new(CountingStore::in_memory()),
      Arc::new(ManualClock::epoch()),
      &Config::default(),
    );
    (router(services.clone()), services)
  }

  pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(json) => {
        request = request.header("content-type", "application/json");
        Body::from(json.to_string())
      }
      None => Body::empty(),
    };

    let response = app
      .clone()
      .oneshot(request.body(body).unwrap())
      .await
      .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
      .await
      .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }
}
