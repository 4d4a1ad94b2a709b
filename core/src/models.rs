use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::entity::EntityKind;
use crate::error::StoreError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single column value, independent of the store it was read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Timestamp(NaiveDateTime),
}

/// A record keyed by column name. A column missing from the map was not read
/// (absent), which is different from a column holding `Value::Null`.
pub type Row = BTreeMap<String, Value>;

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text rendering used for parameter binding and display. `None` for NULL.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Integer(v) => Some(v.to_string()),
            Value::Real(v) => Some(v.to_string()),
            Value::Text(v) => Some(v.clone()),
            Value::Bool(v) => Some(v.to_string()),
            Value::Timestamp(v) => Some(v.format(TIMESTAMP_FORMAT).to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

/// The logical type of a mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Real,
    Text,
    Bool,
    Timestamp,
    WeightGoal,
    ActivityLevel,
}

impl FieldKind {
    /// Convert a raw driver value into this kind's canonical representation.
    ///
    /// `SQLite` hands back integers for booleans and text for timestamps, and
    /// the remote store is read entirely as text, so both sides funnel through
    /// here before values are compared.
    pub fn coerce(self, column: &str, value: Value) -> Result<Value, StoreError> {
        let invalid = |v: &Value| StoreError::invalid_value(column, v.to_string());
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),

            (FieldKind::Integer, Value::Integer(v)) => Ok(Value::Integer(v)),
            #[allow(clippy::cast_precision_loss)]
            (FieldKind::Integer, Value::Real(v)) if v.fract() == 0.0 && v.abs() < 9.0e15 => {
                Ok(Value::Integer(v as i64))
            }
            (FieldKind::Integer, Value::Bool(v)) => Ok(Value::Integer(i64::from(v))),
            (FieldKind::Integer, Value::Text(s)) => match s.trim().parse::<i64>() {
                Ok(v) => Ok(Value::Integer(v)),
                Err(_) => FieldKind::Integer.coerce(
                    column,
                    Value::Real(s.trim().parse().map_err(|_| invalid(&Value::Text(s.clone())))?),
                ),
            },

            (FieldKind::Real, Value::Real(v)) => Ok(Value::Real(v)),
            #[allow(clippy::cast_precision_loss)]
            (FieldKind::Real, Value::Integer(v)) => Ok(Value::Real(v as f64)),
            (FieldKind::Real, Value::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Real)
                .map_err(|_| invalid(&Value::Text(s))),

            (FieldKind::Bool, Value::Bool(v)) => Ok(Value::Bool(v)),
            (FieldKind::Bool, Value::Integer(v)) => Ok(Value::Bool(v != 0)),
            (FieldKind::Bool, Value::Text(s)) => {
                let lowered = s.trim().to_ascii_lowercase();
                match lowered.as_str() {
                    "1" | "t" | "true" | "yes" | "y" => Ok(Value::Bool(true)),
                    "0" | "f" | "false" | "no" | "n" => Ok(Value::Bool(false)),
                    _ => Err(invalid(&Value::Text(s))),
                }
            }

            (FieldKind::Timestamp, Value::Timestamp(v)) => Ok(Value::Timestamp(v)),
            (FieldKind::Timestamp, Value::Text(s)) => parse_timestamp(&s)
                .map(Value::Timestamp)
                .ok_or_else(|| invalid(&Value::Text(s))),
            (FieldKind::Timestamp, Value::Integer(secs)) => DateTime::from_timestamp(secs, 0)
                .map(|dt| Value::Timestamp(dt.naive_utc()))
                .ok_or_else(|| invalid(&Value::Integer(secs))),

            (
                FieldKind::Text | FieldKind::WeightGoal | FieldKind::ActivityLevel,
                Value::Text(s),
            ) => Ok(Value::Text(s)),
            (
                FieldKind::Text | FieldKind::WeightGoal | FieldKind::ActivityLevel,
                other,
            ) => Ok(Value::Text(other.to_string())),

            (_, other) => Err(invalid(&other)),
        }
    }
}

/// Parse the timestamp spellings found in both stores: `SQLite`'s
/// `CURRENT_TIMESTAMP`, `SQLAlchemy`'s microsecond form, ISO-8601 with `T`,
/// offsets as rendered by `timestamptz::text`, and bare dates.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.naive_utc());
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Current time as stored by both sides (naive UTC).
#[must_use]
pub fn now_timestamp() -> Value {
    Value::Timestamp(Utc::now().naive_utc())
}

/// A named, typed column of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    #[must_use]
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Which store a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => f.write_str("local"),
            Side::Remote => f.write_str("remote"),
        }
    }
}

/// One component of an identity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Integer(i64),
    Text(String),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Integer(v) => write!(f, "{v}"),
            KeyPart::Text(v) => f.write_str(v),
        }
    }
}

/// The natural key that identifies "the same record" in both stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(pub Vec<KeyPart>);

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str("]")
    }
}

/// Per-entity counters collected across both phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub restored: u64,
    pub restore_failed: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
    /// Local rows replaced by a later row with the same identity key.
    pub duplicate: u64,
}

impl SyncCounts {
    /// Whether this entity changed either store.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.restored > 0 || self.created > 0 || self.updated > 0
    }
}

/// How an entity's reconciliation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum EntityOutcome {
    Completed,
    /// The table or one of its key columns is missing on one side.
    Unavailable(String),
    /// The entity raised an error and its remote writes were rolled back.
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    pub kind: EntityKind,
    pub table: &'static str,
    pub counts: SyncCounts,
    pub outcome: EntityOutcome,
}

impl EntityReport {
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            table: kind.table(),
            counts: SyncCounts::default(),
            outcome: EntityOutcome::Completed,
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, EntityOutcome::Failed(_))
    }
}

/// Result of one full run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub entities: Vec<EntityReport>,
}

impl SyncReport {
    /// A run succeeds when no entity failed; skips and partial restores do not count.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.entities.iter().any(EntityReport::is_failed)
    }

    #[must_use]
    pub fn entity(&self, kind: EntityKind) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.kind == kind)
    }

    #[must_use]
    pub fn totals(&self) -> SyncCounts {
        self.entities
            .iter()
            .fold(SyncCounts::default(), |mut acc, e| {
                acc.restored += e.counts.restored;
                acc.restore_failed += e.counts.restore_failed;
                acc.created += e.counts.created;
                acc.updated += e.counts.updated;
                acc.unchanged += e.counts.unchanged;
                acc.skipped += e.counts.skipped;
                acc.duplicate += e.counts.duplicate;
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_coerce_sqlite_bool() {
        let v = FieldKind::Bool.coerce("onboarding_complete", Value::Integer(1)).unwrap();
        assert_eq!(v, Value::Bool(true));
        let v = FieldKind::Bool.coerce("onboarding_complete", Value::Integer(0)).unwrap();
        assert_eq!(v, Value::Bool(false));
    }

    #[test]
    fn test_coerce_postgres_text() {
        assert_eq!(
            FieldKind::Bool.coerce("completed", Value::Text("true".into())).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            FieldKind::Integer.coerce("xp", Value::Text("250".into())).unwrap(),
            Value::Integer(250)
        );
        assert_eq!(
            FieldKind::Real.coerce("height", Value::Text("180.5".into())).unwrap(),
            Value::Real(180.5)
        );
    }

    #[test]
    fn test_coerce_integer_from_whole_real() {
        assert_eq!(
            FieldKind::Integer.coerce("calories", Value::Real(420.0)).unwrap(),
            Value::Integer(420)
        );
        assert!(FieldKind::Integer.coerce("calories", Value::Real(420.5)).is_err());
    }

    #[test]
    fn test_coerce_null_passes_through() {
        for kind in [FieldKind::Integer, FieldKind::Bool, FieldKind::Timestamp] {
            assert_eq!(kind.coerce("x", Value::Null).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_coerce_rejects_garbage() {
        let err = FieldKind::Real.coerce("weight", Value::Text("heavy".into()));
        assert!(matches!(err, Err(StoreError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = ts("2024-03-01 08:30:00");
        assert_eq!(parse_timestamp("2024-03-01 08:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T08:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 10:30:00+02"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T08:30:00Z"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-01"),
            Some(ts("2024-03-01 00:00:00"))
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_timestamp_text_round_trip_keeps_micros() {
        let raw = "2024-03-01 08:30:00.123456";
        let parsed = parse_timestamp(raw).unwrap();
        assert_eq!(Value::Timestamp(parsed).to_text().as_deref(), Some(raw));
    }

    #[test]
    fn test_real_renders_whole_numbers_without_fraction() {
        assert_eq!(Value::Real(120.0).to_text().as_deref(), Some("120"));
        assert_eq!(Value::Real(70.25).to_text().as_deref(), Some("70.25"));
    }

    #[test]
    fn test_identity_key_display() {
        let key = IdentityKey(vec![KeyPart::Integer(7), KeyPart::Text("uid-1".into())]);
        assert_eq!(key.to_string(), "[7, uid-1]");
    }

    #[test]
    fn test_report_success_ignores_skips() {
        let mut ok = EntityReport::new(EntityKind::NutritionGoals);
        ok.counts.skipped = 3;
        let report = SyncReport {
            run_id: Uuid::new_v4(),
            started_at: ts("2024-01-01 00:00:00"),
            finished_at: ts("2024-01-01 00:00:01"),
            entities: vec![ok.clone()],
        };
        assert!(report.is_success());

        let mut failed = EntityReport::new(EntityKind::FitnessGoals);
        failed.outcome = EntityOutcome::Failed("boom".into());
        let report = SyncReport {
            entities: vec![ok, failed],
            ..report
        };
        assert!(!report.is_success());
        assert_eq!(report.totals().skipped, 3);
    }

    #[test]
    fn test_report_json_shape() {
        let mut unavailable = EntityReport::new(EntityKind::Gamification);
        unavailable.outcome = EntityOutcome::Unavailable("no table".into());
        let json = serde_json::to_value(&unavailable).unwrap();
        assert_eq!(json["kind"], "gamification");
        assert_eq!(json["table"], "user_gamification");
        assert_eq!(json["outcome"]["status"], "unavailable");
        assert_eq!(json["outcome"]["reason"], "no table");
        assert_eq!(json["counts"]["skipped"], 0);
        assert_eq!(json["counts"]["duplicate"], 0);
    }
}
