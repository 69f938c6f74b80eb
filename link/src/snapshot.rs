//! Initial snapshot loading.
//!
//! A subscription is seeded from a read of the current rows before live
//! changes are applied on top. Reads go through the [`QueryBackend`]
//! trait so the HTTP client stays swappable (see
//! [`RestQueryBackend`](crate::query::RestQueryBackend)).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{QueryError, Result, SyncError};
use crate::filter::FilterExpression;
use crate::models::Entity;

/// Read access to the tables being synchronized.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// All rows of `table`, optionally narrowed by `filter`
    async fn select_all(
        &self,
        table: &str,
        filter: Option<&FilterExpression>,
    ) -> std::result::Result<Vec<Entity>, QueryError>;

    /// The row of `table` with identifier `id`, or [`QueryError::NotFound`]
    async fn select_by_id(&self, table: &str, id: &str) -> std::result::Result<Entity, QueryError>;
}

/// Seeds local state from a [`QueryBackend`]. Never writes.
#[derive(Clone)]
pub struct SnapshotLoader {
    backend: Arc<dyn QueryBackend>,
}

impl SnapshotLoader {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }

    /// Load every row of `table` matching `filter`.
    ///
    /// An empty table is an empty `Vec`, not an error.
    pub async fn load_collection(
        &self,
        table: &str,
        filter: Option<&FilterExpression>,
    ) -> Result<Vec<Entity>> {
        let start = Instant::now();
        match self.backend.select_all(table, filter).await {
            Ok(rows) => {
                log::debug!(
                    "[SYNC_SNAPSHOT] Loaded {} rows from '{}' (filter={}) in {}ms",
                    rows.len(),
                    table,
                    filter.map(ToString::to_string).unwrap_or_else(|| "-".into()),
                    start.elapsed().as_millis()
                );
                Ok(rows)
            }
            // A collection read has no "not found"; treat it as no rows
            Err(QueryError::NotFound) => Ok(Vec::new()),
            Err(e) => {
                log::warn!("[SYNC_SNAPSHOT] Loading '{}' failed: {}", table, e);
                Err(SyncError::from(e))
            }
        }
    }

    /// Load one row by identifier.
    ///
    /// Returns `Ok(None)` when the row does not exist; only transport,
    /// auth and server failures are errors.
    pub async fn load_record(&self, table: &str, id: &str) -> Result<Option<Entity>> {
        match self.backend.select_by_id(table, id).await {
            Ok(entity) => Ok(Some(entity)),
            Err(QueryError::NotFound) => {
                log::debug!("[SYNC_SNAPSHOT] No row '{}' in '{}'", id, table);
                Ok(None)
            }
            Err(e) => {
                log::warn!("[SYNC_SNAPSHOT] Loading '{}' from '{}' failed: {}", id, table, e);
                Err(SyncError::from(e))
            }
        }
    }
}
