//! Backend capability: keyed rows with change notifications.
//!
//! The hosted database/auth service sits behind [`Backend`]. The streaming
//! core never touches it; callers that persist transcripts or leads pick an
//! implementation. [`MemoryBackend`] keeps everything in process.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::error::{ChatRelayError, Result};

/// A row: a JSON object with a string `id`.
pub type Row = Map<String, Value>;

/// Kind of change delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A committed change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub row: Row,
}

/// Equality filter with an optional row limit.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub eq: Vec<(String, Value)>,
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.eq.push((column.into(), value.into()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, row: &Row) -> bool {
        self.eq
            .iter()
            .all(|(column, value)| row.get(column) == Some(value))
    }
}

/// Query/insert/update/delete/subscribe over named tables.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Row>>;

    /// Insert a row, assigning an `id` if it has none. Returns the stored row.
    async fn insert(&self, table: &str, row: Row) -> Result<Row>;

    /// Merge `patch` into the row with `id`. Returns the updated row.
    async fn update(&self, table: &str, id: &str, patch: Row) -> Result<Row>;

    /// Remove the row with `id`. Returns whether it existed.
    async fn delete(&self, table: &str, id: &str) -> Result<bool>;

    /// Receive every change committed after this call.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// In-process [`Backend`].
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            tables: RwLock::new(HashMap::new()),
            changes,
        }
    }

    fn publish(&self, table: &str, kind: ChangeKind, row: &Row) {
        // No subscribers is fine.
        let _ = self.changes.send(ChangeEvent {
            table: table.to_string(),
            kind,
            row: row.clone(),
        });
    }
}

fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Row>> {
        let tables = self.tables.read().await;
        let rows = tables.get(table).map(Vec::as_slice).unwrap_or_default();
        Ok(rows
            .iter()
            .filter(|row| filter.matches(row))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row> {
        if row_id(&row).is_none() {
            row.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        }
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        if rows.iter().any(|r| row_id(r) == row_id(&row)) {
            return Err(ChatRelayError::Storage(format!(
                "duplicate id in {table}: {}",
                row_id(&row).unwrap_or_default()
            )));
        }
        rows.push(row.clone());
        drop(tables);
        self.publish(table, ChangeKind::Insert, &row);
        Ok(row)
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> Result<Row> {
        let mut tables = self.tables.write().await;
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| row_id(r) == Some(id)))
            .ok_or_else(|| ChatRelayError::Storage(format!("no row {id} in {table}")))?;
        for (key, value) in patch {
            if key != "id" {
                row.insert(key, value);
            }
        }
        let updated = row.clone();
        drop(tables);
        self.publish(table, ChangeKind::Update, &updated);
        Ok(updated)
    }

    async fn delete(&self, table: &str, id: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(false);
        };
        let Some(pos) = rows.iter().position(|r| row_id(r) == Some(id)) else {
            return Ok(false);
        };
        let removed = rows.remove(pos);
        drop(tables);
        self.publish(table, ChangeKind::Delete, &removed);
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}
