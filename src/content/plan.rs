//! Query building.
//!
//! Filters become a backend-neutral `QueryPlan`. Each store renders the same
//! plan for both the count query and the data query, so the two always agree.

use chrono::{DateTime, Utc};

use super::filter::{CredentialFilter, DateRange, InsightFilter};
use super::pagination::{PageRequest, SortOrder};

/// Remote tables served by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
  Credentials,
  Insights,
}

impl Table {
  pub fn name(self) -> &'static str {
    match self {
      Table::Credentials => "credentials",
      Table::Insights => "insights",
    }
  }
}

/// Typed value compared against a column.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
  Text(String),
  Bool(bool),
  Timestamp(DateTime<Utc>),
}

/// Row predicate. All predicates of a plan must hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
  /// The array column shares at least one element with `values`.
  Overlaps {
    column: &'static str,
    values: Vec<String>,
  },
  Eq {
    column: &'static str,
    value: FilterValue,
  },
  NotEq {
    column: &'static str,
    value: FilterValue,
  },
  /// Case-insensitive substring match on any of `columns`.
  Search {
    columns: &'static [&'static str],
    term: String,
  },
  Gte {
    column: &'static str,
    value: FilterValue,
  },
  Lte {
    column: &'static str,
    value: FilterValue,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
  pub column: &'static str,
  pub descending: bool,
  pub nulls_last: bool,
}

impl OrderBy {
  pub fn asc(column: &'static str) -> Self {
    Self {
      column,
      descending: false,
      nulls_last: false,
    }
  }

  pub fn desc(column: &'static str) -> Self {
    Self {
      column,
      descending: true,
      nulls_last: false,
    }
  }

  pub fn nulls_last(mut self) -> Self {
    self.nulls_last = true;
    self
  }
}

/// Filter and ordering for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
  pub table: Table,
  pub predicates: Vec<Predicate>,
  pub order: Vec<OrderBy>,
}

impl QueryPlan {
  pub fn new(table: Table) -> Self {
    Self {
      table,
      predicates: Vec::new(),
      order: Vec::new(),
    }
  }

  pub fn filter(mut self, predicate: Predicate) -> Self {
    self.predicates.push(predicate);
    self
  }

  pub fn eq(self, column: &'static str, value: FilterValue) -> Self {
    self.filter(Predicate::Eq { column, value })
  }

  pub fn not_eq(self, column: &'static str, value: FilterValue) -> Self {
    self.filter(Predicate::NotEq { column, value })
  }

  pub fn order_by(mut self, order: OrderBy) -> Self {
    self.order.push(order);
    self
  }

  /// Add a tag-overlap predicate unless the list is absent or empty.
  fn overlaps(self, column: &'static str, values: Option<&Vec<String>>) -> Self {
    match values {
      Some(values) if !values.is_empty() => self.filter(Predicate::Overlaps {
        column,
        values: values.clone(),
      }),
      _ => self,
    }
  }

  fn search(self, columns: &'static [&'static str], term: Option<&String>) -> Self {
    match term {
      Some(term) if !term.trim().is_empty() => self.filter(Predicate::Search {
        columns,
        term: term.trim().to_string(),
      }),
      _ => self,
    }
  }

  fn date_range(mut self, column: &'static str, range: &DateRange) -> Self {
    if let Some(from) = range.from {
      self = self.filter(Predicate::Gte {
        column,
        value: FilterValue::Timestamp(from),
      });
    }
    if let Some(to) = range.to {
      self = self.filter(Predicate::Lte {
        column,
        value: FilterValue::Timestamp(to),
      });
    }
    self
  }
}

pub const CREDENTIAL_SEARCH_COLUMNS: &[&str] = &["title"];
pub const INSIGHT_SEARCH_COLUMNS: &[&str] = &["title", "excerpt", "content"];

/// Columns insights may be sorted by.
pub const INSIGHT_SORT_COLUMNS: &[&str] = &["published_date", "created_at", "updated_at", "title"];

/// Credentials ordered by `sort_order` ascending, newest first within a slot.
pub fn credential_plan(filter: &CredentialFilter) -> QueryPlan {
  let mut plan = QueryPlan::new(Table::Credentials)
    .overlaps("service_tags", filter.service_tags.as_ref())
    .overlaps("industry_tags", filter.industry_tags.as_ref());

  if let Some(active) = filter.is_active {
    plan = plan.eq("is_active", FilterValue::Bool(active));
  }

  plan
    .search(CREDENTIAL_SEARCH_COLUMNS, filter.search.as_ref())
    .date_range("created_at", &filter.created)
    .order_by(OrderBy::asc("sort_order"))
    .order_by(OrderBy::desc("created_at"))
}

/// Insights ordered by publication date (newest first, drafts last) unless
/// the request names another sort column. `created_at desc` breaks ties.
pub fn insight_plan(filter: &InsightFilter, page: &PageRequest) -> Result<QueryPlan, String> {
  let primary = insight_order(page)?;

  let mut plan = QueryPlan::new(Table::Insights).overlaps("tags", filter.tags.as_ref());

  if let Some(published) = filter.is_published {
    plan = plan.eq("is_published", FilterValue::Bool(published));
  }
  if let Some(author) = &filter.author {
    plan = plan.eq("author", FilterValue::Text(author.clone()));
  }

  plan = plan
    .search(INSIGHT_SEARCH_COLUMNS, filter.search.as_ref())
    .date_range("published_date", &filter.published)
    .order_by(primary);

  if primary.column != "created_at" {
    plan = plan.order_by(OrderBy::desc("created_at"));
  }
  Ok(plan)
}

fn insight_order(page: &PageRequest) -> Result<OrderBy, String> {
  let column = match page.sort_by.as_deref() {
    None => "published_date",
    Some(requested) => INSIGHT_SORT_COLUMNS
      .iter()
      .copied()
      .find(|c| *c == requested)
      .ok_or_else(|| {
        format!(
          "sortBy must be one of: {}",
          INSIGHT_SORT_COLUMNS.join(", ")
        )
      })?,
  };

  let order = match page.sort_order.unwrap_or(SortOrder::Desc) {
    SortOrder::Asc => OrderBy::asc(column),
    SortOrder::Desc => OrderBy::desc(column),
  };

  Ok(if column == "published_date" {
    order.nulls_last()
  } else {
    order
  })
}
