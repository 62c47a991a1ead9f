//! `/api/credentials` handlers.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use std::collections::BTreeMap;

use crate::content::filter::from_query_pairs;
use crate::content::{Credential, CredentialPatch, NewCredential, PageRequest};
use crate::service::ContentServices;

use super::{parse_body, reject, reject_list, require_id, respond};

/// `?id=` answers one credential; anything else is a filtered list.
pub async fn get(
  State(services): State<ContentServices>,
  Query(mut params): Query<BTreeMap<String, String>>,
) -> Response {
  let service = &services.credentials;

  if let Some(id) = params.remove("id") {
    return respond(service.get_by_id(&id).await, StatusCode::OK);
  }

  let page = match PageRequest::from_query(&mut params) {
    Ok(page) => page,
    Err(errors) => return reject_list::<Credential>(errors),
  };
  let filter = from_query_pairs(params);
  respond(service.list_value(&filter, &page).await, StatusCode::OK)
}

pub async fn create(State(services): State<ContentServices>, body: Bytes) -> Response {
  let input: NewCredential = match parse_body(&body) {
    Ok(input) => input,
    Err(e) => return reject::<Credential>(e),
  };
  respond(services.credentials.create(input).await, StatusCode::CREATED)
}

pub async fn update(
  State(services): State<ContentServices>,
  Query(params): Query<BTreeMap<String, String>>,
  body: Bytes,
) -> Response {
  let id = match require_id(&params) {
    Ok(id) => id,
    Err(e) => return reject::<Credential>(e),
  };
  let patch: CredentialPatch = match parse_body(&body) {
    Ok(patch) => patch,
    Err(e) => return reject::<Credential>(e),
  };
  respond(services.credentials.update(&id, patch).await, StatusCode::OK)
}

pub async fn delete(
  State(services): State<ContentServices>,
  Query(params): Query<BTreeMap<String, String>>,
) -> Response {
  let id = match require_id(&params) {
    Ok(id) => id,
    Err(e) => return reject::<String>(e),
  };
  respond(services.credentials.delete(&id).await, StatusCode::OK)
}
