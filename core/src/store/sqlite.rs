use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::error::StoreError;
use crate::models::{Field, Row, Value};

use super::{LocalStore, Store, coerce_row, quote_ident};

/// The on-device `SQLite` database.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Connectivity {
            store: "local",
            message: format!("failed to open {}: {e}", path.display()),
        })?;
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(SqliteStore { conn })
    }

    /// Raw connection, for seeding and inspection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create the canonical schema where tables are missing.
    ///
    /// Existing tables are left alone, so a database created by an older app
    /// build keeps its columns and the sync works around the drift.
    #[allow(clippy::too_many_lines)]
    pub fn initialize(&self) -> Result<(), StoreError> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    firebase_uid TEXT UNIQUE NOT NULL,
                    email TEXT UNIQUE NOT NULL,
                    first_name TEXT NOT NULL,
                    last_name TEXT,
                    onboarding_complete BOOLEAN DEFAULT 0,
                    height REAL,
                    weight REAL,
                    age INTEGER,
                    gender TEXT,
                    activity_level TEXT CHECK(activity_level IN ('sedentary', 'light', 'moderate', 'active', 'very_active')),
                    weight_goal TEXT CHECK(weight_goal IN ('lose', 'maintain', 'gain')),
                    target_weight REAL,
                    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                );

                CREATE TABLE IF NOT EXISTS food_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    meal_id INTEGER NOT NULL,
                    user_id INTEGER,
                    food_name TEXT NOT NULL,
                    calories INTEGER NOT NULL,
                    proteins INTEGER NOT NULL,
                    carbs INTEGER NOT NULL,
                    fats INTEGER NOT NULL,
                    fiber INTEGER NOT NULL,
                    sugar INTEGER NOT NULL,
                    saturated_fat INTEGER NOT NULL,
                    polyunsaturated_fat INTEGER NOT NULL,
                    monounsaturated_fat INTEGER NOT NULL,
                    trans_fat INTEGER NOT NULL,
                    cholesterol INTEGER NOT NULL,
                    sodium INTEGER NOT NULL,
                    potassium INTEGER NOT NULL,
                    vitamin_a INTEGER NOT NULL,
                    vitamin_c INTEGER NOT NULL,
                    calcium INTEGER NOT NULL,
                    iron INTEGER NOT NULL,
                    weight REAL,
                    weight_unit TEXT DEFAULT 'g',
                    image_url TEXT NOT NULL,
                    file_key TEXT NOT NULL DEFAULT 'default_file_key',
                    healthiness_rating INTEGER,
                    date TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                    meal_type TEXT,
                    FOREIGN KEY (user_id) REFERENCES users (id)
                );

                CREATE TABLE IF NOT EXISTS exercises (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER,
                    exercise_name TEXT NOT NULL,
                    calories_burned INTEGER NOT NULL,
                    duration INTEGER NOT NULL,
                    date TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                    notes TEXT,
                    FOREIGN KEY (user_id) REFERENCES users (id)
                );

                CREATE INDEX IF NOT EXISTS idx_food_logs_user ON food_logs(user_id);
                CREATE INDEX IF NOT EXISTS idx_exercises_user ON exercises(user_id);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS nutrition_goals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL UNIQUE REFERENCES users (id),
                    target_weight REAL,
                    daily_calorie_goal INTEGER,
                    protein_goal REAL,
                    carb_goal REAL,
                    fat_goal REAL,
                    weight_goal TEXT,
                    activity_level TEXT
                );

                CREATE TABLE IF NOT EXISTS fitness_goals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL UNIQUE REFERENCES users (id),
                    weekly_workouts INTEGER,
                    daily_step_goal INTEGER,
                    water_intake_goal REAL
                );

                CREATE TABLE IF NOT EXISTS user_gamification (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL UNIQUE REFERENCES users (id),
                    level INTEGER DEFAULT 1,
                    xp INTEGER DEFAULT 0,
                    xp_to_next_level INTEGER DEFAULT 100,
                    rank TEXT DEFAULT 'Beginner',
                    streak_days INTEGER DEFAULT 0,
                    last_activity_date TIMESTAMP
                );

                CREATE TABLE IF NOT EXISTS user_achievements (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users (id),
                    achievement_id INTEGER NOT NULL,
                    completed BOOLEAN DEFAULT 0,
                    completed_at TIMESTAMP,
                    UNIQUE (user_id, achievement_id)
                );

                PRAGMA user_version = 2;",
            )?;
        }

        debug!(from = version, "Local schema initialized");
        Ok(())
    }
}

fn to_value(raw: ValueRef<'_>) -> Value {
    match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Real(v) => SqlValue::Real(*v),
        Value::Bool(v) => SqlValue::Integer(i64::from(*v)),
        Value::Text(_) | Value::Timestamp(_) => {
            value.to_text().map_or(SqlValue::Null, SqlValue::Text)
        }
    }
}

fn insert_sql(table: &str, row: &Row) -> String {
    let columns: Vec<String> = row.keys().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        placeholders.join(", ")
    )
}

impl Store for SqliteStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn ping(&mut self) -> Result<(), StoreError> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| StoreError::Connectivity {
                store: "local",
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn columns(&mut self, table: &str) -> Result<BTreeSet<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1)")?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(columns)
    }

    fn load(&mut self, table: &str, fields: &[Field]) -> Result<Vec<Row>, StoreError> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let columns: Vec<String> = fields.iter().map(|f| quote_ident(f.name)).collect();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            columns.join(", "),
            quote_ident(table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raw_rows = stmt
            .query_map([], |row| {
                let mut raw = Row::new();
                for (i, field) in fields.iter().enumerate() {
                    raw.insert(field.name.to_string(), to_value(row.get_ref(i)?));
                }
                Ok(raw)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        raw_rows
            .into_iter()
            .map(|raw| coerce_row(fields, raw))
            .collect()
    }

    fn count(&mut self, table: &str) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

impl LocalStore for SqliteStore {
    fn restore_rows(
        &mut self,
        table: &str,
        rows: &[Row],
    ) -> Result<Vec<Result<(), StoreError>>, StoreError> {
        let tx = self.conn.transaction()?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let result = tx
                .execute(&insert_sql(table, row), params_from_iter(row.values().map(to_sql)))
                .map(|_| ())
                .map_err(|e| {
                    let err = StoreError::from(e);
                    if err.is_conflict() {
                        StoreError::conflict(table, err.to_string())
                    } else {
                        err
                    }
                });
            results.push(result);
        }
        tx.commit()?;
        Ok(results)
    }
}
