//! Storage backends.
//!
//! The engine only talks to these traits, so the same reconciliation code
//! runs against `SQLite`, `PostgreSQL` and the in-memory store used in tests.

mod memory;
mod pg;
mod sqlite;

use std::collections::BTreeSet;

pub use memory::MemoryStore;
pub use pg::PostgresStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::models::{Field, Row};

/// Read access shared by both sides.
pub trait Store {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Cheap round trip proving the store is reachable.
    fn ping(&mut self) -> Result<(), StoreError>;

    /// Column names of `table`. Empty when the table does not exist.
    fn columns(&mut self, table: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Read every row of `table`, restricted to `fields`, each value coerced
    /// to its field kind.
    fn load(&mut self, table: &str, fields: &[Field]) -> Result<Vec<Row>, StoreError>;

    fn count(&mut self, table: &str) -> Result<u64, StoreError>;
}

/// The device-resident store.
pub trait LocalStore: Store {
    /// Insert `rows` inside one local transaction. Each row succeeds or fails
    /// on its own; the outer error is reserved for the transaction itself.
    fn restore_rows(
        &mut self,
        table: &str,
        rows: &[Row],
    ) -> Result<Vec<Result<(), StoreError>>, StoreError>;
}

/// A pending change to the central store.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteWrite {
    Insert(Row),
    /// Overwrite `values` on the row matching every column in `key`.
    Update { key: Row, values: Row },
}

/// The central networked store.
pub trait RemoteStore: Store {
    /// Apply every write or none of them.
    fn apply(&mut self, table: &str, writes: &[RemoteWrite]) -> Result<(), StoreError>;

    /// Take the run lock without waiting. `false` means another run holds it.
    fn try_lock_run(&mut self) -> Result<bool, StoreError>;

    fn unlock_run(&mut self) -> Result<(), StoreError>;
}

/// Coerce each requested field of a raw row, dropping columns nobody asked for.
pub(crate) fn coerce_row(fields: &[Field], mut raw: Row) -> Result<Row, StoreError> {
    let mut row = Row::new();
    for field in fields {
        if let Some(value) = raw.remove(field.name) {
            row.insert(field.name.to_string(), field.kind.coerce(field.name, value)?);
        }
    }
    Ok(row)
}

/// Double-quote an identifier for `SQLite` and `PostgreSQL` alike.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
