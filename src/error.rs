//! Error taxonomy of the content services.

use serde::{Serialize, Serializer};
use std::fmt::Display;

/// Why a content operation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
  /// Bad filter or input shape, detected before any store call.
  #[error("Invalid request: {}", .0.join("; "))]
  Validation(Vec<String>),

  /// The store has no matching row.
  #[error("{entity} not found: {key}")]
  NotFound { entity: &'static str, key: String },

  /// The store call failed for any other reason.
  #[error("Query failed: {0}")]
  Query(String),
}

impl ContentError {
  pub fn validation(message: impl Into<String>) -> Self {
    Self::Validation(vec![message.into()])
  }

  pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
    Self::NotFound {
      entity,
      key: key.into(),
    }
  }

  /// Wrap a store or decoding failure. The chain is flattened so the full
  /// cause reaches the caller.
  pub fn query(report: impl Display) -> Self {
    Self::Query(format!("{:#}", report))
  }
}

pub type ContentResult<T> = Result<T, ContentError>;

/// What every service operation returns: data or an error message, never a
/// panic or a propagated error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceResponse<T> {
  pub data: Option<T>,
  #[serde(serialize_with = "serialize_error")]
  pub error: Option<ContentError>,
}

impl<T> ServiceResponse<T> {
  pub fn ok(data: T) -> Self {
    Self {
      data: Some(data),
      error: None,
    }
  }

  pub fn err(error: ContentError) -> Self {
    Self {
      data: None,
      error: Some(error),
    }
  }

  /// Error paired with placeholder data, as list operations return an empty
  /// page rather than nothing.
  pub fn err_with(data: T, error: ContentError) -> Self {
    Self {
      data: Some(data),
      error: Some(error),
    }
  }

  pub fn is_ok(&self) -> bool {
    self.error.is_none()
  }

  pub fn error_message(&self) -> Option<String> {
    self.error.as_ref().map(ToString::to_string)
  }

  /// Collapse into a `Result`, as fetch hooks consume it.
  pub fn into_result(self) -> Result<T, String> {
    match (self.data, self.error) {
      (_, Some(error)) => Err(error.to_string()),
      (Some(data), None) => Ok(data),
      (None, None) => Err("Empty response".to_string()),
    }
  }
}

impl<T> From<ContentResult<T>> for ServiceResponse<T> {
  fn from(result: ContentResult<T>) -> Self {
    match result {
      Ok(data) => Self::ok(data),
      Err(error) => Self::err(error),
    }
  }
}

fn serialize_error<S: Serializer>(error: &Option<ContentError>, s: S) -> Result<S::Ok, S::Error> {
  match error {
    Some(e) => s.serialize_some(&e.to_string()),
    None => s.serialize_none(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_response_serializes_error_as_string() {
    let response: ServiceResponse<u32> = ServiceResponse::err(ContentError::not_found("Insight", "abc"));
    assert_eq!(
      serde_json::to_value(&response).unwrap(),
      json!({ "data": null, "error": "Insight not found: abc" })
    );

    let response = ServiceResponse::ok(3);
    assert_eq!(
      serde_json::to_value(&response).unwrap(),
      json!({ "data": 3, "error": null })
    );
  }

  #[test]
  fn test_validation_message_joins_errors() {
    let error = ContentError::Validation(vec!["a is required".into(), "b is bad".into()]);
    assert_eq!(error.to_string(), "Invalid request: a is required; b is bad");
  }

  #[test]
  fn test_query_flattens_report_chain() {
    let report = color_eyre::eyre::eyre!("connection refused").wrap_err("Failed to count insights");
    let error = ContentError::query(report);
    assert_eq!(
      error,
      ContentError::Query("Failed to count insights: connection refused".to_string())
    );
  }
}
