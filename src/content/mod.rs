//! Content domain: entities, filters, pagination and query plans.

pub mod filter;
pub mod keys;
pub mod pagination;
pub mod plan;
pub mod types;

pub use filter::{CredentialFilter, DateRange, InsightFilter, ValidationReport};
pub use keys::ContentQueryKey;
pub use pagination::{ListPage, PageInfo, PageRequest, SortOrder};
pub use plan::{FilterValue, OrderBy, Predicate, QueryPlan, Table};
pub use types::{
  slugify, Credential, CredentialPatch, Insight, InsightPatch, NewCredential, NewInsight,
};
