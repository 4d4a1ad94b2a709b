use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::StoreError;
use crate::models::{Field, Row, Value};

use super::{LocalStore, RemoteStore, RemoteWrite, Store, coerce_row};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<Row>,
    unique: Vec<Vec<String>>,
    foreign_keys: Vec<ForeignKey>,
    next_id: i64,
}

#[derive(Debug, Clone)]
struct ForeignKey {
    column: String,
    parent_table: String,
    parent_column: String,
}

/// A store held entirely in memory, implementing both sides.
///
/// Tables enforce the constraints registered on them (unique column sets and
/// foreign keys), hand out autoincrement ids for an `id` column, and can be
/// told to fail so error paths can be exercised.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    name: &'static str,
    tables: BTreeMap<String, MemoryTable>,
    offline: bool,
    failing_tables: BTreeSet<String>,
    run_lock: Arc<AtomicBool>,
    holds_lock: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::named("memory")
    }

    #[must_use]
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            tables: BTreeMap::new(),
            offline: false,
            failing_tables: BTreeSet::new(),
            run_lock: Arc::new(AtomicBool::new(false)),
            holds_lock: false,
        }
    }

    pub fn create_table(&mut self, table: &str, columns: &[&str]) {
        self.tables.insert(
            table.to_string(),
            MemoryTable {
                columns: columns.iter().map(|c| (*c).to_string()).collect(),
                next_id: 1,
                ..MemoryTable::default()
            },
        );
    }

    /// Reject inserts and updates that would duplicate `columns`.
    pub fn add_unique(&mut self, table: &str, columns: &[&str]) {
        if let Some(t) = self.tables.get_mut(table) {
            t.unique
                .push(columns.iter().map(|c| (*c).to_string()).collect());
        }
    }

    /// Require non-null values of `column` to exist in `parent_table.parent_column`.
    pub fn add_foreign_key(
        &mut self,
        table: &str,
        column: &str,
        parent_table: &str,
        parent_column: &str,
    ) {
        if let Some(t) = self.tables.get_mut(table) {
            t.foreign_keys.push(ForeignKey {
                column: column.to_string(),
                parent_table: parent_table.to_string(),
                parent_column: parent_column.to_string(),
            });
        }
    }

    /// Make every call fail as if the connection were down.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Make writes to `table` fail after they have been staged.
    pub fn fail_writes_to(&mut self, table: &str) {
        self.failing_tables.insert(table.to_string());
    }

    /// The flag behind the run lock, for sharing between two stores that
    /// stand in for the same database.
    #[must_use]
    pub fn lock_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.run_lock)
    }

    #[must_use]
    pub fn with_lock(mut self, lock: Arc<AtomicBool>) -> Self {
        self.run_lock = lock;
        self
    }

    /// Insert a row directly, returning the id it was given (0 when the
    /// table has no `id` column).
    pub fn insert(&mut self, table: &str, row: Row) -> Result<i64, StoreError> {
        insert_row(&mut self.tables, table, row)
    }

    /// Current rows of `table`, in insertion order.
    #[must_use]
    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map_or(&[], |t| t.rows.as_slice())
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Connectivity {
                store: self.name,
                message: "store is offline".to_string(),
            });
        }
        Ok(())
    }

    fn check_writable(&self, table: &str) -> Result<(), StoreError> {
        self.check_online()?;
        if self.failing_tables.contains(table) {
            return Err(StoreError::Connectivity {
                store: self.name,
                message: format!("write to {table} failed"),
            });
        }
        Ok(())
    }
}

fn insert_row(
    tables: &mut BTreeMap<String, MemoryTable>,
    table: &str,
    mut row: Row,
) -> Result<i64, StoreError> {
    let t = tables
        .get(table)
        .ok_or_else(|| StoreError::MissingTable(table.to_string()))?;
    if let Some(column) = row.keys().find(|c| !t.columns.contains(*c)) {
        return Err(StoreError::invalid_value(column, "no such column"));
    }

    let mut id = 0;
    if t.columns.iter().any(|c| c == "id") {
        match row.get("id") {
            Some(Value::Integer(given)) => id = *given,
            _ => {
                id = t.next_id;
                row.insert("id".to_string(), Value::Integer(id));
            }
        }
    }
    check_constraints(tables, table, &row, None)?;

    let t = tables
        .get_mut(table)
        .ok_or_else(|| StoreError::MissingTable(table.to_string()))?;
    t.next_id = t.next_id.max(id + 1);
    t.rows.push(row);
    Ok(id)
}

fn check_constraints(
    tables: &BTreeMap<String, MemoryTable>,
    table: &str,
    row: &Row,
    skip_index: Option<usize>,
) -> Result<(), StoreError> {
    let Some(t) = tables.get(table) else {
        return Err(StoreError::MissingTable(table.to_string()));
    };

    let mut unique_sets: Vec<Vec<String>> = t.unique.clone();
    if t.columns.iter().any(|c| c == "id") {
        unique_sets.push(vec!["id".to_string()]);
    }
    for columns in &unique_sets {
        let values: Vec<&Value> = columns.iter().filter_map(|c| row.get(c)).collect();
        if columns.is_empty()
            || values.len() != columns.len()
            || values.iter().any(|v| v.is_null())
        {
            continue;
        }
        let clash = t.rows.iter().enumerate().any(|(i, existing)| {
            Some(i) != skip_index
                && columns
                    .iter()
                    .zip(&values)
                    .all(|(c, v)| existing.get(c) == Some(*v))
        });
        if clash {
            return Err(StoreError::conflict(
                table,
                format!("duplicate value for ({})", columns.join(", ")),
            ));
        }
    }

    for fk in &t.foreign_keys {
        let Some(value) = row.get(&fk.column).filter(|v| !v.is_null()) else {
            continue;
        };
        let found = tables.get(&fk.parent_table).is_some_and(|parent| {
            parent
                .rows
                .iter()
                .any(|r| r.get(&fk.parent_column) == Some(value))
        });
        if !found {
            return Err(StoreError::conflict(
                table,
                format!(
                    "{} = {value} has no match in {}.{}",
                    fk.column, fk.parent_table, fk.parent_column
                ),
            ));
        }
    }
    Ok(())
}

fn update_rows(
    tables: &mut BTreeMap<String, MemoryTable>,
    table: &str,
    key: &Row,
    values: &Row,
) -> Result<(), StoreError> {
    let t = tables
        .get(table)
        .ok_or_else(|| StoreError::MissingTable(table.to_string()))?;
    if let Some(column) = values.keys().find(|c| !t.columns.contains(*c)) {
        return Err(StoreError::invalid_value(column, "no such column"));
    }
    let matching: Vec<usize> = t
        .rows
        .iter()
        .enumerate()
        .filter(|(_, r)| key.iter().all(|(c, v)| r.get(c) == Some(v)))
        .map(|(i, _)| i)
        .collect();

    for index in matching {
        let mut updated = tables[table].rows[index].clone();
        for (column, value) in values {
            updated.insert(column.clone(), value.clone());
        }
        check_constraints(tables, table, &updated, Some(index))?;
        if let Some(t) = tables.get_mut(table) {
            t.rows[index] = updated;
        }
    }
    Ok(())
}

impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        self.name
    }

    fn ping(&mut self) -> Result<(), StoreError> {
        self.check_online()
    }

    fn columns(&mut self, table: &str) -> Result<BTreeSet<String>, StoreError> {
        self.check_online()?;
        Ok(self
            .tables
            .get(table)
            .map(|t| t.columns.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn load(&mut self, table: &str, fields: &[Field]) -> Result<Vec<Row>, StoreError> {
        self.check_online()?;
        let t = self
            .tables
            .get(table)
            .ok_or_else(|| StoreError::MissingTable(table.to_string()))?;
        t.rows
            .iter()
            .map(|row| coerce_row(fields, row.clone()))
            .collect()
    }

    fn count(&mut self, table: &str) -> Result<u64, StoreError> {
        self.check_online()?;
        let t = self
            .tables
            .get(table)
            .ok_or_else(|| StoreError::MissingTable(table.to_string()))?;
        Ok(t.rows.len() as u64)
    }
}

impl LocalStore for MemoryStore {
    fn restore_rows(
        &mut self,
        table: &str,
        rows: &[Row],
    ) -> Result<Vec<Result<(), StoreError>>, StoreError> {
        self.check_writable(table)?;
        Ok(rows
            .iter()
            .map(|row| self.insert(table, row.clone()).map(|_| ()))
            .collect())
    }
}

impl RemoteStore for MemoryStore {
    fn apply(&mut self, table: &str, writes: &[RemoteWrite]) -> Result<(), StoreError> {
        self.check_writable(table)?;
        let mut staged = self.tables.clone();
        for write in writes {
            match write {
                RemoteWrite::Insert(row) => {
                    insert_row(&mut staged, table, row.clone())?;
                }
                RemoteWrite::Update { key, values } => {
                    update_rows(&mut staged, table, key, values)?;
                }
            }
        }
        self.tables = staged;
        Ok(())
    }

    fn try_lock_run(&mut self) -> Result<bool, StoreError> {
        self.check_online()?;
        if self.holds_lock {
            return Ok(true);
        }
        let acquired = self
            .run_lock
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        self.holds_lock = acquired;
        Ok(acquired)
    }

    fn unlock_run(&mut self) -> Result<(), StoreError> {
        if self.holds_lock {
            self.run_lock.store(false, Ordering::SeqCst);
            self.holds_lock = false;
        }
        Ok(())
    }
}
