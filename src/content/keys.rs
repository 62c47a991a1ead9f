//! Cache keys for content queries.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::cache::CacheKey;

use super::filter::{CredentialFilter, InsightFilter};
use super::pagination::PageRequest;

/// Query key types for content lookups.
#[derive(Clone, Debug)]
pub enum ContentQueryKey {
  /// Filtered, paginated credential list
  CredentialList { filter: String, page: String },
  /// Every credential matching a filter, unpaginated
  CredentialAll { filter: String },
  /// Single credential by id
  CredentialById { id: String },
  /// Filtered, paginated insight list
  InsightList { filter: String, page: String },
  /// Published insights matching a search term
  InsightSearch { term: String, page: String },
  /// Single insight by id
  InsightById { id: String },
  /// Single insight by slug
  InsightBySlug { slug: String },
  /// Published insights sharing tags with one insight
  InsightRelated { slug: String, limit: u64 },
  /// Distinct tags over published insights
  InsightTags,
}

impl ContentQueryKey {
  pub fn credential_list(filter: &CredentialFilter, page: &PageRequest) -> Self {
    Self::CredentialList {
      filter: to_canonical_json(filter),
      page: to_canonical_json(page),
    }
  }

  pub fn credential_all(filter: &CredentialFilter) -> Self {
    Self::CredentialAll {
      filter: to_canonical_json(filter),
    }
  }

  pub fn insight_list(filter: &InsightFilter, page: &PageRequest) -> Self {
    Self::InsightList {
      filter: to_canonical_json(filter),
      page: to_canonical_json(page),
    }
  }

  pub fn insight_search(term: &str, page: &PageRequest) -> Self {
    Self::InsightSearch {
      term: normalize_term(term),
      page: to_canonical_json(page),
    }
  }
}

impl CacheKey for ContentQueryKey {
  fn cache_hash(&self) -> String {
    let input = match self {
      Self::CredentialList { filter, page } => format!("credentials:list:{}:{}", filter, page),
      Self::CredentialAll { filter } => format!("credentials:all:{}", filter),
      Self::CredentialById { id } => format!("credentials:id:{}", id),
      Self::InsightList { filter, page } => format!("insights:list:{}:{}", filter, page),
      Self::InsightSearch { term, page } => format!("insights:search:{}:{}", term, page),
      Self::InsightById { id } => format!("insights:id:{}", id),
      Self::InsightBySlug { slug } => format!("insights:slug:{}", slug),
      Self::InsightRelated { slug, limit } => format!("insights:related:{}:{}", slug, limit),
      Self::InsightTags => "insights:tags".to_string(),
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
  }

  fn description(&self) -> String {
    match self {
      Self::CredentialList { filter, page } => format!("credentials {} {}", filter, page),
      Self::CredentialAll { filter } => format!("all credentials {}", filter),
      Self::CredentialById { id } => format!("credential {}", id),
      Self::InsightList { filter, page } => format!("insights {} {}", filter, page),
      Self::InsightSearch { term, .. } => format!("insight search '{}'", term),
      Self::InsightById { id } => format!("insight {}", id),
      Self::InsightBySlug { slug } => format!("insight /{}", slug),
      Self::InsightRelated { slug, limit } => format!("{} insights related to /{}", limit, slug),
      Self::InsightTags => "insight tags".to_string(),
    }
  }
}

/// Struct fields serialize in declaration order, so equal values give equal
/// strings.
fn to_canonical_json<T: Serialize>(value: &T) -> String {
  serde_json::to_string(value).unwrap_or_default()
}

/// Normalize a search term for consistent hashing.
/// Trims whitespace and lowercases for case-insensitive matching.
fn normalize_term(term: &str) -> String {
  term.trim().to_lowercase()
}
