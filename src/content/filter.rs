//! Filter validation.
//!
//! Filters arrive loosely typed (a JSON object, or an HTTP query string turned
//! into one) and leave as typed `CredentialFilter` / `InsightFilter` values.
//! Every problem is reported, not just the first, and unknown fields are
//! rejected rather than ignored. Content is not sanitized here.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

const MAX_TAGS: usize = 20;
const MAX_SEARCH_LEN: usize = 200;

const LIST_FIELDS: &[&str] = &["service_tags", "industry_tags", "tags"];
const FLAG_FIELDS: &[&str] = &["is_active", "is_published"];

/// Outcome of validating a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
  pub is_valid: bool,
  pub errors: Vec<String>,
}

impl ValidationReport {
  fn from_errors(errors: Vec<String>) -> Self {
    Self {
      is_valid: errors.is_empty(),
      errors,
    }
  }
}

/// Inclusive bounds over a timestamp column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub from: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub to: Option<DateTime<Utc>>,
}

impl DateRange {
  fn check(&self, errors: &mut Vec<String>) {
    if let (Some(from), Some(to)) = (self.from, self.to) {
      if from > to {
        errors.push("date_from must not be after date_to".to_string());
      }
    }
  }
}

/// Query over credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CredentialFilter {
  /// Matches credentials carrying any of these service tags.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub service_tags: Option<Vec<String>>,
  /// Matches credentials carrying any of these industry tags.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub industry_tags: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_active: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub search: Option<String>,
  /// Range over `created_at`.
  pub created: DateRange,
}

impl CredentialFilter {
  const FIELDS: &'static [&'static str] = &[
    "service_tags",
    "industry_tags",
    "is_active",
    "search",
    "date_from",
    "date_to",
  ];

  /// Validate a loosely typed filter and convert it.
  pub fn from_value(value: &Value) -> Result<Self, ValidationReport> {
    let mut reader = FieldReader::new(value, Self::FIELDS);
    let filter = Self {
      service_tags: reader.tag_list("service_tags"),
      industry_tags: reader.tag_list("industry_tags"),
      is_active: reader.flag("is_active"),
      search: reader.search("search"),
      created: reader.date_range(),
    };
    reader.finish(filter)
  }

  /// Check the content rules of an already typed filter.
  pub fn validate(&self) -> ValidationReport {
    let mut errors = Vec::new();
    check_tag_list("service_tags", self.service_tags.as_deref(), &mut errors);
    check_tag_list("industry_tags", self.industry_tags.as_deref(), &mut errors);
    check_search(self.search.as_deref(), &mut errors);
    self.created.check(&mut errors);
    ValidationReport::from_errors(errors)
  }
}

/// Query over insights.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InsightFilter {
  /// Matches insights carrying any of these tags.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tags: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_published: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub author: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub search: Option<String>,
  /// Range over `published_date`.
  pub published: DateRange,
}

impl InsightFilter {
  const FIELDS: &'static [&'static str] = &[
    "tags",
    "is_published",
    "author",
    "search",
    "date_from",
    "date_to",
  ];

  pub fn published() -> Self {
    Self {
      is_published: Some(true),
      ..Self::default()
    }
  }

  /// Validate a loosely typed filter and convert it.
  pub fn from_value(value: &Value) -> Result<Self, ValidationReport> {
    let mut reader = FieldReader::new(value, Self::FIELDS);
    let filter = Self {
      tags: reader.tag_list("tags"),
      is_published: reader.flag("is_published"),
      author: reader.text("author"),
      search: reader.search("search"),
      published: reader.date_range(),
    };
    reader.finish(filter)
  }

  /// Check the content rules of an already typed filter.
  pub fn validate(&self) -> ValidationReport {
    let mut errors = Vec::new();
    check_tag_list("tags", self.tags.as_deref(), &mut errors);
    check_search(self.search.as_deref(), &mut errors);
    if matches!(self.author.as_deref(), Some(a) if a.trim().is_empty()) {
      errors.push("author must not be empty".to_string());
    }
    self.published.check(&mut errors);
    ValidationReport::from_errors(errors)
  }
}

/// Validate a credential filter without converting it.
pub fn validate_credential_filter(value: &Value) -> ValidationReport {
  match CredentialFilter::from_value(value) {
    Ok(_) => ValidationReport::from_errors(Vec::new()),
    Err(report) => report,
  }
}

/// Validate an insight filter without converting it.
pub fn validate_insight_filter(value: &Value) -> ValidationReport {
  match InsightFilter::from_value(value) {
    Ok(_) => ValidationReport::from_errors(Vec::new()),
    Err(report) => report,
  }
}

/// Turn query-string pairs into a filter object.
///
/// Comma separated values of list fields become arrays and `true`/`false`
/// of flag fields become booleans. Anything else stays a string so the
/// validator can report it.
pub fn from_query_pairs<I, K, V>(pairs: I) -> Value
where
  I: IntoIterator<Item = (K, V)>,
  K: Into<String>,
  V: AsRef<str>,
{
  let mut object = Map::new();
  for (key, raw) in pairs {
    let key = key.into();
    let raw = raw.as_ref();
    let value = if LIST_FIELDS.contains(&key.as_str()) {
      Value::Array(
        raw
          .split(',')
          .map(str::trim)
          .filter(|s| !s.is_empty())
          .map(|s| Value::String(s.to_string()))
          .collect(),
      )
    } else if FLAG_FIELDS.contains(&key.as_str()) {
      match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::String(other.to_string()),
      }
    } else {
      Value::String(raw.to_string())
    };
    object.insert(key, value);
  }
  Value::Object(object)
}

/// Which end of a day a bare date stands for.
#[derive(Clone, Copy)]
enum Bound {
  Start,
  End,
}

/// Walks a filter object, collecting typed fields and errors.
struct FieldReader<'a> {
  object: Option<&'a Map<String, Value>>,
  known: &'static [&'static str],
  errors: Vec<String>,
}

impl<'a> FieldReader<'a> {
  fn new(value: &'a Value, known: &'static [&'static str]) -> Self {
    let mut errors = Vec::new();
    let object = match value {
      Value::Object(map) => Some(map),
      Value::Null => None,
      _ => {
        errors.push("filters must be an object".to_string());
        None
      }
    };
    Self {
      object,
      known,
      errors,
    }
  }

  fn field(&self, name: &str) -> Option<&'a Value> {
    self
      .object
      .and_then(|map| map.get(name))
      .filter(|v| !v.is_null())
  }

  fn tag_list(&mut self, name: &str) -> Option<Vec<String>> {
    let Value::Array(items) = self.field(name)? else {
      self.errors.push(format!("{} must be an array of strings", name));
      return None;
    };

    let mut tags = Vec::with_capacity(items.len());
    for item in items {
      match item.as_str() {
        Some(tag) => tags.push(tag.to_string()),
        None => {
          self
            .errors
            .push(format!("{} must contain only strings", name));
          return None;
        }
      }
    }
    check_tag_list(name, Some(tags.as_slice()), &mut self.errors);
    Some(tags)
  }

  fn flag(&mut self, name: &str) -> Option<bool> {
    let value = self.field(name)?;
    match value.as_bool() {
      Some(flag) => Some(flag),
      None => {
        self.errors.push(format!("{} must be a boolean", name));
        None
      }
    }
  }

  fn text(&mut self, name: &str) -> Option<String> {
    let value = self.field(name)?;
    match value.as_str() {
      Some(text) => Some(text.to_string()),
      None => {
        self.errors.push(format!("{} must be a string", name));
        None
      }
    }
  }

  fn search(&mut self, name: &str) -> Option<String> {
    let search = self.text(name)?;
    check_search(Some(&search), &mut self.errors);
    // Blank searches match everything.
    let trimmed = search.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
  }

  fn date(&mut self, name: &str, bound: Bound) -> Option<DateTime<Utc>> {
    let raw = self.text(name)?;
    match parse_date(&raw, bound) {
      Some(date) => Some(date),
      None => {
        self.errors.push(format!(
          "{} must be a date (YYYY-MM-DD) or an RFC 3339 timestamp",
          name
        ));
        None
      }
    }
  }

  fn date_range(&mut self) -> DateRange {
    let range = DateRange {
      from: self.date("date_from", Bound::Start),
      to: self.date("date_to", Bound::End),
    };
    range.check(&mut self.errors);
    range
  }

  fn finish<T>(mut self, filter: T) -> Result<T, ValidationReport> {
    if let Some(map) = self.object {
      let mut unknown: Vec<&String> = map
        .keys()
        .filter(|k| !self.known.contains(&k.as_str()))
        .collect();
      unknown.sort();
      for key in unknown {
        self.errors.push(format!("unknown filter field: {}", key));
      }
    }

    if self.errors.is_empty() {
      Ok(filter)
    } else {
      Err(ValidationReport::from_errors(self.errors))
    }
  }
}

fn check_tag_list(name: &str, tags: Option<&[String]>, errors: &mut Vec<String>) {
  let Some(tags) = tags else {
    return;
  };
  if tags.len() > MAX_TAGS {
    errors.push(format!("{} must have at most {} entries", name, MAX_TAGS));
  }
  if tags.iter().any(|t| t.trim().is_empty()) {
    errors.push(format!("{} must not contain empty tags", name));
  }
}

fn check_search(search: Option<&str>, errors: &mut Vec<String>) {
  if let Some(search) = search {
    if search.chars().count() > MAX_SEARCH_LEN {
      errors.push(format!(
        "search must be at most {} characters",
        MAX_SEARCH_LEN
      ));
    }
  }
}

fn parse_date(raw: &str, bound: Bound) -> Option<DateTime<Utc>> {
  let raw = raw.trim();
  if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
    return Some(ts.with_timezone(&Utc));
  }

  let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
  let time = match bound {
    Bound::Start => NaiveTime::MIN,
    Bound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?,
  };
  Some(day.and_time(time).and_utc())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_valid_credential_filter() {
    let filter = CredentialFilter::from_value(&json!({
      "service_tags": ["feasibility", "m&a"],
      "is_active": true,
      "search": "  bank  ",
    }))
    .unwrap();

    assert_eq!(
      filter.service_tags,
      Some(vec!["feasibility".to_string(), "m&a".to_string()])
    );
    assert_eq!(filter.is_active, Some(true));
    assert_eq!(filter.search.as_deref(), Some("bank"));
    assert_eq!(filter.industry_tags, None);
  }

  #[test]
  fn test_reports_every_shape_error() {
    let report = validate_credential_filter(&json!({
      "service_tags": "feasibility",
      "industry_tags": [1, 2],
      "is_active": "yes",
      "colour": "red",
    }));

    assert!(!report.is_valid);
    assert_eq!(
      report.errors,
      vec![
        "service_tags must be an array of strings",
        "industry_tags must contain only strings",
        "is_active must be a boolean",
        "unknown filter field: colour",
      ]
    );
  }

  #[test]
  fn test_null_fields_are_absent() {
    let filter = InsightFilter::from_value(&json!({ "tags": null, "search": null })).unwrap();
    assert_eq!(filter, InsightFilter::default());

    assert_eq!(
      InsightFilter::from_value(&Value::Null).unwrap(),
      InsightFilter::default()
    );
  }

  #[test]
  fn test_non_object_filter_is_rejected() {
    let report = validate_insight_filter(&json!(["tags"]));
    assert_eq!(report.errors, vec!["filters must be an object"]);
  }

  #[test]
  fn test_date_bounds_cover_whole_days() {
    let filter = InsightFilter::from_value(&json!({
      "date_from": "2024-03-01",
      "date_to": "2024-03-31",
    }))
    .unwrap();

    assert_eq!(
      filter.published.from.unwrap().to_rfc3339(),
      "2024-03-01T00:00:00+00:00"
    );
    assert_eq!(
      filter.published.to.unwrap().to_rfc3339(),
      "2024-03-31T23:59:59.999+00:00"
    );
  }

  #[test]
  fn test_inverted_and_malformed_dates() {
    let report = validate_insight_filter(&json!({
      "date_from": "2024-04-01",
      "date_to": "2024-03-01",
    }));
    assert_eq!(report.errors, vec!["date_from must not be after date_to"]);

    let report = validate_insight_filter(&json!({ "date_from": "last week" }));
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("date_from must be a date"));
  }

  #[test]
  fn test_insight_filter_fields_are_domain_specific() {
    let report = validate_insight_filter(&json!({ "service_tags": ["x"] }));
    assert_eq!(report.errors, vec!["unknown filter field: service_tags"]);
  }

  #[test]
  fn test_typed_filter_validation() {
    let filter = InsightFilter {
      tags: Some(vec![" ".to_string()]),
      search: Some("x".repeat(201)),
      ..InsightFilter::default()
    };
    let report = filter.validate();
    assert!(!report.is_valid);
    assert_eq!(report.errors.len(), 2);
  }

  #[test]
  fn test_from_query_pairs() {
    let value = from_query_pairs(vec![
      ("tags", "strategy, finance,,"),
      ("is_published", "true"),
      ("is_active", "maybe"),
      ("search", "plan"),
    ]);

    assert_eq!(
      value,
      json!({
        "tags": ["strategy", "finance"],
        "is_published": true,
        "is_active": "maybe",
        "search": "plan",
      })
    );
  }
}
