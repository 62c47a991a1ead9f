//! SQLite implementation of the content store.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::schema::{self, Column, ColumnKind, SQLITE_SCHEMA};
use super::{ContentStore, RowRange};
use crate::content::{FilterValue, Predicate, QueryPlan, Table};

/// SQLite-based content store, used locally and in tests.
///
/// Search folds case with a Unicode-aware `fold()` SQL function, since the
/// built-in `LIKE` only ignores ASCII case.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) a database file.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;
    Self::from_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.register_functions()?;
    store.run_migrations()?;
    Ok(store)
  }

  fn register_functions(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .create_scalar_function(
        "fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
          let text: Option<String> = ctx.get(0)?;
          Ok(text.map(|t| t.to_lowercase()))
        },
      )
      .map_err(|e| eyre!("Failed to register fold(): {}", e))
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("folio").join("folio.db"))
  }

  /// Run database migrations for content tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute_batch(SQLITE_SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

#[async_trait]
impl ContentStore for SqliteStore {
  async fn count(&self, plan: &QueryPlan) -> Result<u64> {
    let (clause, params) = render_where(plan)?;
    let sql = format!("SELECT COUNT(*) FROM {}{}", plan.table.name(), clause);

    let conn = self.lock()?;
    let count: i64 = conn
      .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
      .map_err(|e| eyre!("Failed to count {}: {}", plan.table.name(), e))?;
    Ok(count.max(0) as u64)
  }

  async fn select(&self, plan: &QueryPlan, range: Option<RowRange>) -> Result<Vec<Value>> {
    let (clause, mut params) = render_where(plan)?;
    let mut sql = format!(
      "SELECT {} FROM {}{}{}",
      column_list(plan.table),
      plan.table.name(),
      clause,
      render_order(plan)?
    );
    if let Some(range) = range {
      sql.push_str(" LIMIT ? OFFSET ?");
      params.push(SqlValue::Integer(range.limit as i64));
      params.push(SqlValue::Integer(range.offset as i64));
    }

    let conn = self.lock()?;
    query_rows(&conn, plan.table, &sql, &params)
  }

  async fn insert(&self, table: Table, row: Value) -> Result<Value> {
    let object = as_object(&row)?;
    let id = object
      .get("id")
      .and_then(Value::as_str)
      .ok_or_else(|| eyre!("Row for {} has no id", table.name()))?
      .to_string();

    let mut names = Vec::with_capacity(object.len());
    let mut params = Vec::with_capacity(object.len());
    for (name, value) in object {
      let column = known_column(table, name)?;
      names.push(column.name);
      params.push(to_sql(column, value)?);
    }

    let sql = format!(
      "INSERT INTO {} ({}) VALUES ({})",
      table.name(),
      names.join(", "),
      vec!["?"; names.len()].join(", ")
    );

    let conn = self.lock()?;
    conn
      .execute(&sql, params_from_iter(params.iter()))
      .map_err(|e| eyre!("Failed to insert into {}: {}", table.name(), e))?;

    select_by_id(&conn, table, &id)?
      .ok_or_else(|| eyre!("Inserted row {} not found in {}", id, table.name()))
  }

  async fn update(&self, table: Table, id: &str, patch: Value) -> Result<Option<Value>> {
    let object = as_object(&patch)?;

    let mut assignments = Vec::with_capacity(object.len());
    let mut params = Vec::with_capacity(object.len() + 1);
    for (name, value) in object {
      if name == "id" {
        return Err(eyre!("The id of a {} row cannot be changed", table.name()));
      }
      let column = known_column(table, name)?;
      assignments.push(format!("{} = ?", column.name));
      params.push(to_sql(column, value)?);
    }

    let conn = self.lock()?;
    if !assignments.is_empty() {
      params.push(SqlValue::Text(id.to_string()));
      let sql = format!(
        "UPDATE {} SET {} WHERE id = ?",
        table.name(),
        assignments.join(", ")
      );
      let changed = conn
        .execute(&sql, params_from_iter(params.iter()))
        .map_err(|e| eyre!("Failed to update {} {}: {}", table.name(), id, e))?;
      if changed == 0 {
        return Ok(None);
      }
    }

    select_by_id(&conn, table, id)
  }

  async fn delete(&self, table: Table, id: &str) -> Result<bool> {
    let sql = format!("DELETE FROM {} WHERE id = ?", table.name());

    let conn = self.lock()?;
    let changed = conn
      .execute(&sql, [id])
      .map_err(|e| eyre!("Failed to delete {} {}: {}", table.name(), id, e))?;
    Ok(changed > 0)
  }
}

fn select_by_id(conn: &Connection, table: Table, id: &str) -> Result<Option<Value>> {
  let sql = format!(
    "SELECT {} FROM {} WHERE id = ?",
    column_list(table),
    table.name()
  );
  let rows = query_rows(conn, table, &sql, &[SqlValue::Text(id.to_string())])?;
  Ok(rows.into_iter().next())
}

fn query_rows(conn: &Connection, table: Table, sql: &str, params: &[SqlValue]) -> Result<Vec<Value>> {
  let columns = schema::columns(table);

  let mut stmt = conn
    .prepare(sql)
    .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

  let raw_rows: Vec<Vec<SqlValue>> = stmt
    .query_map(params_from_iter(params.iter()), |row| {
      (0..columns.len())
        .map(|i| row.get::<_, SqlValue>(i))
        .collect::<rusqlite::Result<Vec<SqlValue>>>()
    })
    .map_err(|e| eyre!("Failed to query {}: {}", table.name(), e))?
    .collect::<rusqlite::Result<_>>()
    .map_err(|e| eyre!("Failed to read {} row: {}", table.name(), e))?;

  raw_rows
    .into_iter()
    .map(|raw| to_json(columns, raw))
    .collect()
}

fn column_list(table: Table) -> String {
  schema::columns(table)
    .iter()
    .map(|c| c.name)
    .collect::<Vec<_>>()
    .join(", ")
}

fn known_column(table: Table, name: &str) -> Result<Column> {
  schema::column(table, name).ok_or_else(|| eyre!("Unknown column {}.{}", table.name(), name))
}

fn as_object(value: &Value) -> Result<&Map<String, Value>> {
  value
    .as_object()
    .ok_or_else(|| eyre!("Expected a JSON object row"))
}

/// Render the plan's predicates as a WHERE clause with positional parameters.
fn render_where(plan: &QueryPlan) -> Result<(String, Vec<SqlValue>)> {
  let table = plan.table;
  let mut clauses = Vec::with_capacity(plan.predicates.len());
  let mut params = Vec::new();

  for predicate in &plan.predicates {
    match predicate {
      Predicate::Overlaps { column, values } => {
        let column = known_column(table, column)?;
        if column.kind != ColumnKind::TextList {
          return Err(eyre!("Column {} is not a tag list", column.name));
        }
        clauses.push(format!(
          "EXISTS (SELECT 1 FROM json_each({}.{}) WHERE json_each.value IN ({}))",
          table.name(),
          column.name,
          vec!["?"; values.len()].join(", ")
        ));
        params.extend(values.iter().cloned().map(SqlValue::Text));
      }
      Predicate::Eq { column, value } => {
        let column = known_column(table, column)?;
        clauses.push(format!("{} = ?", column.name));
        params.push(filter_value(value));
      }
      Predicate::NotEq { column, value } => {
        let column = known_column(table, column)?;
        clauses.push(format!("{} <> ?", column.name));
        params.push(filter_value(value));
      }
      Predicate::Search { columns, term } => {
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        let mut alternatives = Vec::with_capacity(columns.len());
        for name in columns.iter() {
          let column = known_column(table, name)?;
          alternatives.push(format!("fold({}) LIKE ? ESCAPE '\\'", column.name));
          params.push(SqlValue::Text(pattern.clone()));
        }
        clauses.push(format!("({})", alternatives.join(" OR ")));
      }
      Predicate::Gte { column, value } => {
        let column = known_column(table, column)?;
        clauses.push(format!("{} >= ?", column.name));
        params.push(filter_value(value));
      }
      Predicate::Lte { column, value } => {
        let column = known_column(table, column)?;
        clauses.push(format!("{} <= ?", column.name));
        params.push(filter_value(value));
      }
    }
  }

  if clauses.is_empty() {
    Ok((String::new(), params))
  } else {
    Ok((format!(" WHERE {}", clauses.join(" AND ")), params))
  }
}

fn render_order(plan: &QueryPlan) -> Result<String> {
  let mut terms = Vec::new();
  for order in &plan.order {
    let column = known_column(plan.table, order.column)?;
    if order.nulls_last {
      terms.push(format!("{} IS NULL", column.name));
    }
    let direction = if order.descending { "DESC" } else { "ASC" };
    terms.push(format!("{} {}", column.name, direction));
  }

  if terms.is_empty() {
    Ok(String::new())
  } else {
    Ok(format!(" ORDER BY {}", terms.join(", ")))
  }
}

/// Escape LIKE wildcards so the term matches literally.
fn escape_like(term: &str) -> String {
  let mut escaped = String::with_capacity(term.len());
  for c in term.chars() {
    if matches!(c, '\\' | '%' | '_') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped
}

fn filter_value(value: &FilterValue) -> SqlValue {
  match value {
    FilterValue::Text(s) => SqlValue::Text(s.clone()),
    FilterValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
    FilterValue::Timestamp(ts) => SqlValue::Text(format_timestamp(ts)),
  }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn to_sql(column: Column, value: &Value) -> Result<SqlValue> {
  let mismatch = || {
    eyre!(
      "Invalid value for column {}: expected {:?}, got {}",
      column.name,
      column.kind,
      value
    )
  };

  match (column.kind, value) {
    (ColumnKind::NullableText | ColumnKind::NullableTimestamp, Value::Null) => Ok(SqlValue::Null),
    (ColumnKind::Text | ColumnKind::NullableText, Value::String(s)) => Ok(SqlValue::Text(s.clone())),
    (ColumnKind::Int, Value::Number(n)) => n.as_i64().map(SqlValue::Integer).ok_or_else(mismatch),
    (ColumnKind::Bool, Value::Bool(b)) => Ok(SqlValue::Integer(i64::from(*b))),
    (ColumnKind::TextList, Value::Array(items)) => {
      if items.iter().any(|v| !v.is_string()) {
        return Err(mismatch());
      }
      Ok(SqlValue::Text(value.to_string()))
    }
    (ColumnKind::Timestamp | ColumnKind::NullableTimestamp, Value::String(s)) => {
      let ts = DateTime::parse_from_rfc3339(s).map_err(|_| mismatch())?;
      Ok(SqlValue::Text(format_timestamp(&ts.with_timezone(&Utc))))
    }
    _ => Err(mismatch()),
  }
}

fn to_json(columns: &[Column], raw: Vec<SqlValue>) -> Result<Value> {
  let mut object = Map::with_capacity(columns.len());

  for (column, value) in columns.iter().zip(raw) {
    let json = match (column.kind, value) {
      (_, SqlValue::Null) => Value::Null,
      (ColumnKind::Bool, SqlValue::Integer(i)) => Value::Bool(i != 0),
      (ColumnKind::Int, SqlValue::Integer(i)) => Value::from(i),
      (ColumnKind::TextList, SqlValue::Text(s)) => serde_json::from_str(&s)
        .map_err(|e| eyre!("Corrupt tag list in column {}: {}", column.name, e))?,
      (_, SqlValue::Text(s)) => Value::String(s),
      (_, other) => {
        return Err(eyre!(
          "Unexpected value in column {}: {:?}",
          column.name,
          other
        ))
      }
    };
    object.insert(column.name.to_string(), json);
  }

  Ok(Value::Object(object))
}
