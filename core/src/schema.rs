use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::entity::EntityMapper;
use crate::error::{Result, SyncError};
use crate::models::{Field, Side};
use crate::store::Store;

/// The columns a table actually has in one store.
///
/// An empty set means the table does not exist there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCapabilities {
    columns: BTreeSet<String>,
}

impl SchemaCapabilities {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn has(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    #[must_use]
    pub fn table_exists(&self) -> bool {
        !self.columns.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Keep only the fields this table can serve.
    #[must_use]
    pub fn readable<'a>(&self, fields: &'a [Field]) -> Vec<&'a Field> {
        fields.iter().filter(|f| self.has(f.name)).collect()
    }

    /// The fields the caller expects but this table lacks.
    #[must_use]
    pub fn missing<'a>(&self, fields: &'a [Field]) -> Vec<&'a str> {
        fields
            .iter()
            .filter(|f| !self.has(f.name))
            .map(|f| f.name)
            .collect()
    }
}

pub struct SchemaProbe;

impl SchemaProbe {
    /// Introspect one table. A failing introspection call aborts the run.
    pub fn probe<S: Store + ?Sized>(store: &mut S, table: &str) -> Result<SchemaCapabilities> {
        let columns = store.columns(table).map_err(|source| SyncError::Schema {
            table: table.to_string(),
            source,
        })?;
        Ok(SchemaCapabilities::new(columns))
    }

    /// Probe every table in `mappers` once, logging schema drift.
    pub fn probe_all<S: Store + ?Sized>(
        store: &mut S,
        side: Side,
        mappers: &[&EntityMapper],
    ) -> Result<SchemaCache> {
        let mut cache = SchemaCache::default();
        for mapper in mappers {
            let caps = Self::probe(store, mapper.table)?;
            if caps.table_exists() {
                let missing = caps.missing(mapper.fields);
                if !missing.is_empty() {
                    debug!(
                        side = %side,
                        table = mapper.table,
                        missing = ?missing,
                        "Table lacks optional columns; they will be left out"
                    );
                }
            } else {
                debug!(side = %side, table = mapper.table, "Table not found");
            }
            cache.tables.insert(mapper.table, caps);
        }
        Ok(cache)
    }
}

/// Capabilities for every synchronized table of one store, computed once per run.
#[derive(Debug, Clone, Default)]
pub struct SchemaCache {
    tables: HashMap<&'static str, SchemaCapabilities>,
}

impl SchemaCache {
    #[must_use]
    pub fn get(&self, table: &str) -> Option<&SchemaCapabilities> {
        self.tables.get(table)
    }
}
