use std::collections::{BTreeSet, HashMap};

use postgres::error::SqlState;
use postgres::types::ToSql;
use postgres::{Client, NoTls};
use tracing::debug;

use crate::error::StoreError;
use crate::models::{Field, Row, Value};

use super::{RemoteStore, RemoteWrite, Store, coerce_row, quote_ident};

/// Advisory lock key held for the duration of a run ("PMSYNC" in ASCII).
const RUN_LOCK_KEY: i64 = 0x504D_5359_4E43;

const COLUMNS_SQL: &str = "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod)
     FROM pg_attribute a
     WHERE a.attrelid = to_regclass($1::text) AND a.attnum > 0 AND NOT a.attisdropped
     ORDER BY a.attnum";

/// Column name to SQL type, as rendered by `format_type`.
type ColumnTypes = HashMap<String, String>;

/// The central `PostgreSQL` database.
///
/// Values travel as text in both directions: reads cast every column to
/// `text` and writes cast each text parameter back to the column's declared
/// type. That keeps enum, boolean and timestamp columns working without a
/// Rust type per column.
pub struct PostgresStore {
    client: Client,
    types: HashMap<String, ColumnTypes>,
}

impl PostgresStore {
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::connect(url, NoTls).map_err(|e| StoreError::Connectivity {
            store: "remote",
            message: e.to_string(),
        })?;
        Ok(PostgresStore {
            client,
            types: HashMap::new(),
        })
    }

    fn column_types(&mut self, table: &str) -> Result<&ColumnTypes, StoreError> {
        if !self.types.contains_key(table) {
            let rows = self.client.query(COLUMNS_SQL, &[&table])?;
            let types: ColumnTypes = rows
                .iter()
                .map(|row| (row.get::<_, String>(0), row.get::<_, String>(1)))
                .collect();
            debug!(table, columns = types.len(), "Introspected remote table");
            self.types.insert(table.to_string(), types);
        }
        self.types
            .get(table)
            .ok_or_else(|| StoreError::MissingTable(table.to_string()))
    }
}

fn map_write_error(table: &str, err: postgres::Error) -> StoreError {
    let conflict = err.code().is_some_and(|code| {
        *code == SqlState::UNIQUE_VIOLATION || *code == SqlState::FOREIGN_KEY_VIOLATION
    });
    if conflict {
        StoreError::conflict(table, err.to_string())
    } else {
        StoreError::Postgres(err)
    }
}

fn cast(types: &ColumnTypes, column: &str) -> String {
    let ty = types.get(column).map_or("text", String::as_str);
    format!("::text::{ty}")
}

pub(crate) fn select_sql(table: &str, fields: &[Field]) -> String {
    let columns: Vec<String> = fields
        .iter()
        .map(|f| format!("{}::text", quote_ident(f.name)))
        .collect();
    format!("SELECT {} FROM {}", columns.join(", "), quote_ident(table))
}

/// Build a parameterized INSERT and its text parameters.
pub(crate) fn insert_sql(
    table: &str,
    row: &Row,
    types: &ColumnTypes,
) -> (String, Vec<Option<String>>) {
    let mut columns = Vec::with_capacity(row.len());
    let mut placeholders = Vec::with_capacity(row.len());
    let mut params = Vec::with_capacity(row.len());
    for (i, (column, value)) in row.iter().enumerate() {
        columns.push(quote_ident(column));
        placeholders.push(format!("${}{}", i + 1, cast(types, column)));
        params.push(value.to_text());
    }
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        placeholders.join(", ")
    );
    (sql, params)
}

/// Build a parameterized UPDATE of `values` on the row matching `key`.
pub(crate) fn update_sql(
    table: &str,
    key: &Row,
    values: &Row,
    types: &ColumnTypes,
) -> (String, Vec<Option<String>>) {
    let mut params = Vec::with_capacity(key.len() + values.len());
    let mut assignments = Vec::with_capacity(values.len());
    for (column, value) in values {
        params.push(value.to_text());
        assignments.push(format!(
            "{} = ${}{}",
            quote_ident(column),
            params.len(),
            cast(types, column)
        ));
    }
    let mut conditions = Vec::with_capacity(key.len());
    for (column, value) in key {
        params.push(value.to_text());
        conditions.push(format!(
            "{} = ${}{}",
            quote_ident(column),
            params.len(),
            cast(types, column)
        ));
    }
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(table),
        assignments.join(", "),
        conditions.join(" AND ")
    );
    (sql, params)
}

impl Store for PostgresStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn ping(&mut self) -> Result<(), StoreError> {
        self.client
            .simple_query("SELECT 1")
            .map_err(|e| StoreError::Connectivity {
                store: "remote",
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn columns(&mut self, table: &str) -> Result<BTreeSet<String>, StoreError> {
        // Re-read so a probe always reflects the live schema.
        self.types.remove(table);
        Ok(self.column_types(table)?.keys().cloned().collect())
    }

    fn load(&mut self, table: &str, fields: &[Field]) -> Result<Vec<Row>, StoreError> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.client.query(select_sql(table, fields).as_str(), &[])?;
        rows.iter()
            .map(|pg_row| {
                let mut raw = Row::new();
                for (i, field) in fields.iter().enumerate() {
                    let text: Option<String> = pg_row.try_get(i)?;
                    raw.insert(field.name.to_string(), text.map_or(Value::Null, Value::Text));
                }
                coerce_row(fields, raw)
            })
            .collect()
    }

    fn count(&mut self, table: &str) -> Result<u64, StoreError> {
        let row = self.client.query_one(
            format!("SELECT COUNT(*) FROM {}", quote_ident(table)).as_str(),
            &[],
        )?;
        let count: i64 = row.try_get(0)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

impl RemoteStore for PostgresStore {
    fn apply(&mut self, table: &str, writes: &[RemoteWrite]) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }
        let types = self.column_types(table)?.clone();
        let mut tx = self.client.transaction()?;
        for write in writes {
            let (sql, params) = match write {
                RemoteWrite::Insert(row) => insert_sql(table, row, &types),
                RemoteWrite::Update { values, .. } if values.is_empty() => continue,
                RemoteWrite::Update { key, values } => update_sql(table, key, values, &types),
            };
            let refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
            tx.execute(sql.as_str(), &refs)
                .map_err(|e| map_write_error(table, e))?;
        }
        tx.commit()?;
        Ok(())
    }

    fn try_lock_run(&mut self) -> Result<bool, StoreError> {
        let row = self
            .client
            .query_one("SELECT pg_try_advisory_lock($1)", &[&RUN_LOCK_KEY])?;
        Ok(row.try_get(0)?)
    }

    fn unlock_run(&mut self) -> Result<(), StoreError> {
        self.client
            .execute("SELECT pg_advisory_unlock($1)", &[&RUN_LOCK_KEY])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldKind;

    fn types(pairs: &[(&str, &str)]) -> ColumnTypes {
        pairs
            .iter()
            .map(|(c, t)| ((*c).to_string(), (*t).to_string()))
            .collect()
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_select_casts_every_column_to_text() {
        let fields = [
            Field::new("firebase_uid", FieldKind::Text),
            Field::new("onboarding_complete", FieldKind::Bool),
        ];
        assert_eq!(
            select_sql("users", &fields),
            "SELECT \"firebase_uid\"::text, \"onboarding_complete\"::text FROM \"users\""
        );
    }

    #[test]
    fn test_insert_casts_to_declared_types() {
        let types = types(&[
            ("firebase_uid", "character varying"),
            ("weight_goal", "weightgoal"),
            ("created_at", "timestamp without time zone"),
        ]);
        let row = row(&[
            ("firebase_uid", Value::Text("uid-a".into())),
            ("weight_goal", Value::Text("lose".into())),
            ("created_at", Value::Null),
        ]);
        let (sql, params) = insert_sql("users", &row, &types);
        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"created_at\", \"firebase_uid\", \"weight_goal\") \
             VALUES ($1::text::timestamp without time zone, $2::text::character varying, $3::text::weightgoal)"
        );
        assert_eq!(
            params,
            vec![None, Some("uid-a".to_string()), Some("lose".to_string())]
        );
    }

    #[test]
    fn test_update_numbers_set_before_where() {
        let types = types(&[("user_id", "integer"), ("xp", "integer")]);
        let key = row(&[("user_id", Value::Integer(40))]);
        let values = row(&[("xp", Value::Integer(250))]);
        let (sql, params) = update_sql("user_gamification", &key, &values, &types);
        assert_eq!(
            sql,
            "UPDATE \"user_gamification\" SET \"xp\" = $1::text::integer \
             WHERE \"user_id\" = $2::text::integer"
        );
        assert_eq!(params, vec![Some("250".to_string()), Some("40".to_string())]);
    }

    #[test]
    fn test_unknown_column_type_falls_back_to_text() {
        assert_eq!(cast(&ColumnTypes::new(), "notes"), "::text::text");
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
