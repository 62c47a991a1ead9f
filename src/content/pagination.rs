//! Page arithmetic.
//!
//! Out-of-range page requests are corrected rather than rejected: pages below
//! one become one, and pages past the end become the last page.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
  Asc,
  Desc,
}

/// Page requested by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageRequest {
  /// 1-based.
  pub page: i64,
  pub page_size: i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sort_by: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sort_order: Option<SortOrder>,
}

impl Default for PageRequest {
  fn default() -> Self {
    Self {
      page: 1,
      page_size: DEFAULT_PAGE_SIZE as i64,
      sort_by: None,
      sort_order: None,
    }
  }
}

impl PageRequest {
  pub fn new(page: i64, page_size: i64) -> Self {
    Self {
      page,
      page_size,
      ..Self::default()
    }
  }

  /// Take the pagination parameters (`page`, `pageSize`, `sortBy`,
  /// `sortOrder`) out of a query-string map, leaving the filter fields.
  pub fn from_query(params: &mut BTreeMap<String, String>) -> Result<Self, Vec<String>> {
    let mut errors = Vec::new();
    let mut request = Self::default();

    if let Some(raw) = params.remove("page") {
      match raw.trim().parse() {
        Ok(page) => request.page = page,
        Err(_) => errors.push("page must be an integer".to_string()),
      }
    }
    if let Some(raw) = params.remove("pageSize") {
      match raw.trim().parse() {
        Ok(size) => request.page_size = size,
        Err(_) => errors.push("pageSize must be an integer".to_string()),
      }
    }
    if let Some(raw) = params.remove("sortBy") {
      request.sort_by = Some(raw);
    }
    if let Some(raw) = params.remove("sortOrder") {
      match raw.to_ascii_lowercase().as_str() {
        "asc" => request.sort_order = Some(SortOrder::Asc),
        "desc" => request.sort_order = Some(SortOrder::Desc),
        _ => errors.push("sortOrder must be 'asc' or 'desc'".to_string()),
      }
    }

    if errors.is_empty() {
      Ok(request)
    } else {
      Err(errors)
    }
  }

  /// Page size clamped into `1..=MAX_PAGE_SIZE`.
  pub fn effective_page_size(&self) -> u64 {
    self.page_size.clamp(1, MAX_PAGE_SIZE as i64) as u64
  }
}

/// Pagination metadata returned with every list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
  pub page: u64,
  pub page_size: u64,
  pub total: u64,
  pub total_pages: u64,
  pub has_next: bool,
  pub has_prev: bool,
}

/// Where to read a page from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow {
  pub info: PageInfo,
  pub offset: u64,
  pub limit: u64,
}

/// Compute the effective page for `total` rows.
pub fn paginate(request: &PageRequest, total: u64) -> PageWindow {
  let page_size = request.effective_page_size();
  let total_pages = total.div_ceil(page_size);

  let mut page = request.page.max(1) as u64;
  if total_pages > 0 && page > total_pages {
    page = total_pages;
  }
  if total_pages == 0 {
    page = 1;
  }

  PageWindow {
    info: PageInfo {
      page,
      page_size,
      total,
      total_pages,
      has_next: page < total_pages,
      has_prev: page > 1,
    },
    offset: (page - 1) * page_size,
    limit: page_size,
  }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPage<T> {
  pub data: Vec<T>,
  pub pagination: PageInfo,
}

impl<T> ListPage<T> {
  /// An empty first page, returned alongside errors.
  pub fn empty(request: &PageRequest) -> Self {
    Self {
      data: Vec::new(),
      pagination: paginate(request, 0).info,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}
