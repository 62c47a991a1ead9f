//! Table layout shared by the store backends.

use crate::content::Table;

/// How a column is stored and exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
  Text,
  NullableText,
  Int,
  Bool,
  /// Array of strings.
  TextList,
  Timestamp,
  NullableTimestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
  pub name: &'static str,
  pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
  Column { name, kind }
}

const CREDENTIAL_COLUMNS: &[Column] = &[
  col("id", ColumnKind::Text),
  col("title", ColumnKind::Text),
  col("service_tags", ColumnKind::TextList),
  col("industry_tags", ColumnKind::TextList),
  col("is_active", ColumnKind::Bool),
  col("sort_order", ColumnKind::Int),
  col("created_at", ColumnKind::Timestamp),
];

const INSIGHT_COLUMNS: &[Column] = &[
  col("id", ColumnKind::Text),
  col("slug", ColumnKind::Text),
  col("title", ColumnKind::Text),
  col("excerpt", ColumnKind::Text),
  col("content", ColumnKind::Text),
  col("author", ColumnKind::Text),
  col("co_author", ColumnKind::NullableText),
  col("tags", ColumnKind::TextList),
  col("image_url", ColumnKind::NullableText),
  col("is_published", ColumnKind::Bool),
  col("published_date", ColumnKind::NullableTimestamp),
  col("created_at", ColumnKind::Timestamp),
  col("updated_at", ColumnKind::Timestamp),
];

pub fn columns(table: Table) -> &'static [Column] {
  match table {
    Table::Credentials => CREDENTIAL_COLUMNS,
    Table::Insights => INSIGHT_COLUMNS,
  }
}

pub fn column(table: Table, name: &str) -> Option<Column> {
  columns(table).iter().copied().find(|c| c.name == name)
}

/// Schema for the local SQLite store.
///
/// Tag lists are JSON arrays in TEXT columns; timestamps are RFC 3339 UTC
/// with millisecond precision so that text order is time order.
pub const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    service_tags TEXT NOT NULL DEFAULT '[]',
    industry_tags TEXT NOT NULL DEFAULT '[]',
    is_active INTEGER NOT NULL DEFAULT 1,
    sort_order INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_credentials_order
    ON credentials(sort_order, created_at);

CREATE TABLE IF NOT EXISTS insights (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    excerpt TEXT NOT NULL,
    content TEXT NOT NULL,
    author TEXT NOT NULL,
    co_author TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    image_url TEXT,
    is_published INTEGER NOT NULL DEFAULT 0,
    published_date TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_insights_published
    ON insights(is_published, published_date);
"#;
