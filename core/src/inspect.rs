//! Read-only overview of the synchronized tables in both stores.

use serde::Serialize;

use crate::entity::all_mappers;
use crate::error::{Result, SyncError};
use crate::models::Side;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStatus {
    pub side: Side,
    pub table: &'static str,
    pub exists: bool,
    pub columns: usize,
    pub rows: u64,
}

/// Existence, column count and row count of every synchronized table.
pub fn inspect_store<S: Store + ?Sized>(store: &mut S, side: Side) -> Result<Vec<TableStatus>> {
    store.ping().map_err(SyncError::Connectivity)?;
    let mut statuses = Vec::new();
    for mapper in all_mappers() {
        let columns = store.columns(mapper.table).map_err(|source| SyncError::Schema {
            table: mapper.table.to_string(),
            source,
        })?;
        let exists = !columns.is_empty();
        let rows = if exists { store.count(mapper.table)? } else { 0 };
        statuses.push(TableStatus {
            side,
            table: mapper.table,
            exists,
            columns: columns.len(),
            rows,
        });
    }
    Ok(statuses)
}
