//! Content retrieval and caching for a consulting firm's website.
//!
//! Two content domains, credentials and insights, are read from a tabular
//! store through validated filters, paginated, and cached per domain with a
//! time-to-live. See `service` for the façades and `api` for the HTTP layer.

pub mod api;
pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod query;
pub mod service;
pub mod store;
