//! Content entities and their write inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

const MAX_TITLE_LEN: usize = 200;
const MAX_SLUG_LEN: usize = 96;

/// Case-study tile tagged by service and industry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
  pub id: String,
  pub title: String,
  pub service_tags: Vec<String>,
  pub industry_tags: Vec<String>,
  pub is_active: bool,
  pub sort_order: i64,
  pub created_at: DateTime<Utc>,
}

/// Input for creating a credential. Omitted fields take module defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewCredential {
  pub title: String,
  #[serde(default)]
  pub service_tags: Vec<String>,
  #[serde(default)]
  pub industry_tags: Vec<String>,
  pub is_active: Option<bool>,
  pub sort_order: Option<i64>,
}

impl NewCredential {
  pub fn validate(&self) -> Vec<String> {
    let mut errors = Vec::new();
    check_title(&self.title, &mut errors);
    check_tags("service_tags", &self.service_tags, &mut errors);
    check_tags("industry_tags", &self.industry_tags, &mut errors);
    errors
  }
}

/// Partial update of a credential. Only present fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub service_tags: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub industry_tags: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_active: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sort_order: Option<i64>,
}

impl CredentialPatch {
  pub fn validate(&self) -> Vec<String> {
    let mut errors = Vec::new();
    if let Some(title) = &self.title {
      check_title(title, &mut errors);
    }
    if let Some(tags) = &self.service_tags {
      check_tags("service_tags", tags, &mut errors);
    }
    if let Some(tags) = &self.industry_tags {
      check_tags("industry_tags", tags, &mut errors);
    }
    errors
  }
}

/// Publishable article addressed by slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
  pub id: String,
  pub slug: String,
  pub title: String,
  pub excerpt: String,
  /// Rich text, stored as produced by the editor.
  pub content: String,
  pub author: String,
  pub co_author: Option<String>,
  pub tags: Vec<String>,
  pub image_url: Option<String>,
  pub is_published: bool,
  /// Set the first time the insight is published.
  pub published_date: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Input for creating an insight.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewInsight {
  /// Derived from the title when absent.
  pub slug: Option<String>,
  pub title: String,
  pub excerpt: String,
  pub content: String,
  pub author: String,
  pub co_author: Option<String>,
  #[serde(default)]
  pub tags: Vec<String>,
  pub image_url: Option<String>,
  pub is_published: Option<bool>,
  pub published_date: Option<DateTime<Utc>>,
}

impl NewInsight {
  pub fn validate(&self) -> Vec<String> {
    let mut errors = Vec::new();
    check_title(&self.title, &mut errors);
    check_required("excerpt", &self.excerpt, &mut errors);
    check_required("content", &self.content, &mut errors);
    check_required("author", &self.author, &mut errors);
    check_tags("tags", &self.tags, &mut errors);
    if let Some(slug) = &self.slug {
      check_slug(slug, &mut errors);
    }
    errors
  }
}

/// Partial update of an insight.
///
/// Nullable columns use a double option: absent leaves the column alone,
/// `null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsightPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub slug: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub excerpt: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub author: Option<String>,
  #[serde(
    default,
    deserialize_with = "deserialize_nullable",
    skip_serializing_if = "Option::is_none"
  )]
  pub co_author: Option<Option<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tags: Option<Vec<String>>,
  #[serde(
    default,
    deserialize_with = "deserialize_nullable",
    skip_serializing_if = "Option::is_none"
  )]
  pub image_url: Option<Option<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_published: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub published_date: Option<DateTime<Utc>>,
}

impl InsightPatch {
  pub fn validate(&self) -> Vec<String> {
    let mut errors = Vec::new();
    if let Some(title) = &self.title {
      check_title(title, &mut errors);
    }
    if let Some(excerpt) = &self.excerpt {
      check_required("excerpt", excerpt, &mut errors);
    }
    if let Some(content) = &self.content {
      check_required("content", content, &mut errors);
    }
    if let Some(author) = &self.author {
      check_required("author", author, &mut errors);
    }
    if let Some(tags) = &self.tags {
      check_tags("tags", tags, &mut errors);
    }
    if let Some(slug) = &self.slug {
      check_slug(slug, &mut errors);
    }
    errors
  }
}

fn deserialize_nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}

/// Derive a URL slug from a title: lowercase ASCII alphanumerics joined by
/// single hyphens.
pub fn slugify(title: &str) -> String {
  let mut slug = String::with_capacity(title.len());
  let mut pending_hyphen = false;

  for c in title.chars() {
    if c.is_ascii_alphanumeric() {
      if pending_hyphen && !slug.is_empty() {
        slug.push('-');
      }
      pending_hyphen = false;
      slug.push(c.to_ascii_lowercase());
    } else {
      pending_hyphen = true;
    }
  }

  if slug.len() > MAX_SLUG_LEN {
    slug.truncate(MAX_SLUG_LEN);
    while slug.ends_with('-') {
      slug.pop();
    }
  }
  slug
}

fn check_title(title: &str, errors: &mut Vec<String>) {
  check_required("title", title, errors);
  if title.chars().count() > MAX_TITLE_LEN {
    errors.push(format!("title must be at most {} characters", MAX_TITLE_LEN));
  }
}

fn check_required(field: &str, value: &str, errors: &mut Vec<String>) {
  if value.trim().is_empty() {
    errors.push(format!("{} is required", field));
  }
}

fn check_tags(field: &str, tags: &[String], errors: &mut Vec<String>) {
  if tags.iter().any(|t| t.trim().is_empty()) {
    errors.push(format!("{} must not contain empty tags", field));
  }
}

fn check_slug(slug: &str, errors: &mut Vec<String>) {
  let well_formed = !slug.is_empty()
    && slug.len() <= MAX_SLUG_LEN
    && !slug.starts_with('-')
    && !slug.ends_with('-')
    && slug
      .chars()
      .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
  if !well_formed {
    errors.push(format!(
      "slug '{}' must be lowercase letters, digits and single hyphens",
      slug
    ));
  }
}
