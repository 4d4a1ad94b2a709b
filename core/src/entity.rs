//! Per-entity field maps and the pure row mapper.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::models::{Field, FieldKind, IdentityKey, KeyPart, Row, Side, Value, now_timestamp};
use crate::normalize::{normalize_activity_level, normalize_weight_goal};
use crate::schema::SchemaCapabilities;

/// Column on child tables that holds the owning profile's store-internal id.
pub const OWNER_COLUMN: &str = "user_id";
/// Store-internal id of a profile row.
pub const PROFILE_ID_COLUMN: &str = "id";
/// Stable account identifier shared by both stores.
pub const PROFILE_UID_COLUMN: &str = "firebase_uid";

pub(crate) const OWNER_FIELD: Field = Field::new(OWNER_COLUMN, FieldKind::Integer);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Profile,
    NutritionLog,
    ActivityLog,
    NutritionGoals,
    FitnessGoals,
    Gamification,
    AchievementUnlock,
}

impl EntityKind {
    /// Processing order. Profiles first so dependents can check for their owner.
    pub const ORDER: [EntityKind; 7] = [
        EntityKind::Profile,
        EntityKind::NutritionLog,
        EntityKind::ActivityLog,
        EntityKind::NutritionGoals,
        EntityKind::FitnessGoals,
        EntityKind::Gamification,
        EntityKind::AchievementUnlock,
    ];

    #[must_use]
    pub fn mapper(self) -> &'static EntityMapper {
        match self {
            EntityKind::Profile => &PROFILE,
            EntityKind::NutritionLog => &NUTRITION_LOG,
            EntityKind::ActivityLog => &ACTIVITY_LOG,
            EntityKind::NutritionGoals => &NUTRITION_GOALS,
            EntityKind::FitnessGoals => &FITNESS_GOALS,
            EntityKind::Gamification => &GAMIFICATION,
            EntityKind::AchievementUnlock => &ACHIEVEMENT_UNLOCK,
        }
    }

    #[must_use]
    pub fn table(self) -> &'static str {
        self.mapper().table
    }

    #[must_use]
    pub fn is_child(self) -> bool {
        self != EntityKind::Profile
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Profile => "users",
            EntityKind::NutritionLog => "food logs",
            EntityKind::ActivityLog => "exercises",
            EntityKind::NutritionGoals => "nutrition goals",
            EntityKind::FitnessGoals => "fitness goals",
            EntityKind::Gamification => "user gamification records",
            EntityKind::AchievementUnlock => "user achievements",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One component of an entity's identity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyField {
    /// A column whose value is identical in both stores.
    Column(&'static str),
    /// The owning profile, resolved to its account uid.
    Owner,
}

/// Static description of one synchronized table and how its rows map
/// between the stores.
#[derive(Debug)]
pub struct EntityMapper {
    pub kind: EntityKind,
    pub table: &'static str,
    /// Mapped columns. Owner and surrogate id columns are handled separately.
    pub fields: &'static [Field],
    pub key: &'static [KeyField],
    /// Columns stamped with "now" when a remote row is created without one.
    pub stamp_on_create: &'static [&'static str],
}

pub static PROFILE: EntityMapper = EntityMapper {
    kind: EntityKind::Profile,
    table: "users",
    fields: &[
        Field::new("firebase_uid", FieldKind::Text),
        Field::new("email", FieldKind::Text),
        Field::new("first_name", FieldKind::Text),
        Field::new("last_name", FieldKind::Text),
        Field::new("onboarding_complete", FieldKind::Bool),
        Field::new("height", FieldKind::Real),
        Field::new("weight", FieldKind::Real),
        Field::new("age", FieldKind::Integer),
        Field::new("gender", FieldKind::Text),
        Field::new("activity_level", FieldKind::ActivityLevel),
        Field::new("weight_goal", FieldKind::WeightGoal),
        Field::new("target_weight", FieldKind::Real),
        Field::new("created_at", FieldKind::Timestamp),
        Field::new("updated_at", FieldKind::Timestamp),
    ],
    key: &[KeyField::Column(PROFILE_UID_COLUMN)],
    stamp_on_create: &["created_at", "updated_at"],
};

pub static NUTRITION_LOG: EntityMapper = EntityMapper {
    kind: EntityKind::NutritionLog,
    table: "food_logs",
    fields: &[
        Field::new("meal_id", FieldKind::Integer),
        Field::new("food_name", FieldKind::Text),
        Field::new("calories", FieldKind::Integer),
        Field::new("proteins", FieldKind::Integer),
        Field::new("carbs", FieldKind::Integer),
        Field::new("fats", FieldKind::Integer),
        Field::new("fiber", FieldKind::Integer),
        Field::new("sugar", FieldKind::Integer),
        Field::new("saturated_fat", FieldKind::Integer),
        Field::new("polyunsaturated_fat", FieldKind::Integer),
        Field::new("monounsaturated_fat", FieldKind::Integer),
        Field::new("trans_fat", FieldKind::Integer),
        Field::new("cholesterol", FieldKind::Integer),
        Field::new("sodium", FieldKind::Integer),
        Field::new("potassium", FieldKind::Integer),
        Field::new("vitamin_a", FieldKind::Integer),
        Field::new("vitamin_c", FieldKind::Integer),
        Field::new("calcium", FieldKind::Integer),
        Field::new("iron", FieldKind::Integer),
        Field::new("weight", FieldKind::Real),
        Field::new("weight_unit", FieldKind::Text),
        Field::new("image_url", FieldKind::Text),
        Field::new("file_key", FieldKind::Text),
        Field::new("healthiness_rating", FieldKind::Integer),
        Field::new("date", FieldKind::Timestamp),
        Field::new("meal_type", FieldKind::Text),
    ],
    key: &[KeyField::Column("meal_id"), KeyField::Owner],
    stamp_on_create: &[],
};

pub static ACTIVITY_LOG: EntityMapper = EntityMapper {
    kind: EntityKind::ActivityLog,
    table: "exercises",
    fields: &[
        Field::new("id", FieldKind::Integer),
        Field::new("exercise_name", FieldKind::Text),
        Field::new("calories_burned", FieldKind::Integer),
        Field::new("duration", FieldKind::Integer),
        Field::new("date", FieldKind::Timestamp),
        Field::new("notes", FieldKind::Text),
    ],
    key: &[KeyField::Column("id"), KeyField::Owner],
    stamp_on_create: &[],
};

pub static NUTRITION_GOALS: EntityMapper = EntityMapper {
    kind: EntityKind::NutritionGoals,
    table: "nutrition_goals",
    fields: &[
        Field::new("target_weight", FieldKind::Real),
        Field::new("daily_calorie_goal", FieldKind::Integer),
        Field::new("protein_goal", FieldKind::Real),
        Field::new("carb_goal", FieldKind::Real),
        Field::new("fat_goal", FieldKind::Real),
        Field::new("weight_goal", FieldKind::WeightGoal),
        Field::new("activity_level", FieldKind::ActivityLevel),
    ],
    key: &[KeyField::Owner],
    stamp_on_create: &[],
};

pub static FITNESS_GOALS: EntityMapper = EntityMapper {
    kind: EntityKind::FitnessGoals,
    table: "fitness_goals",
    fields: &[
        Field::new("weekly_workouts", FieldKind::Integer),
        Field::new("daily_step_goal", FieldKind::Integer),
        Field::new("water_intake_goal", FieldKind::Real),
    ],
    key: &[KeyField::Owner],
    stamp_on_create: &[],
};

pub static GAMIFICATION: EntityMapper = EntityMapper {
    kind: EntityKind::Gamification,
    table: "user_gamification",
    fields: &[
        Field::new("level", FieldKind::Integer),
        Field::new("xp", FieldKind::Integer),
        Field::new("xp_to_next_level", FieldKind::Integer),
        Field::new("rank", FieldKind::Text),
        Field::new("streak_days", FieldKind::Integer),
        Field::new("last_activity_date", FieldKind::Timestamp),
    ],
    key: &[KeyField::Owner],
    stamp_on_create: &[],
};

/// Unlocks only. The `achievements` catalog itself is not synced and must
/// already be seeded on the remote; when the remote table references it, an
/// unknown `achievement_id` fails the whole entity.
pub static ACHIEVEMENT_UNLOCK: EntityMapper = EntityMapper {
    kind: EntityKind::AchievementUnlock,
    table: "user_achievements",
    fields: &[
        Field::new("achievement_id", FieldKind::Integer),
        Field::new("completed", FieldKind::Bool),
        Field::new("completed_at", FieldKind::Timestamp),
    ],
    key: &[KeyField::Owner, KeyField::Column("achievement_id")],
    stamp_on_create: &[],
};

/// Every mapper, in processing order.
#[must_use]
pub fn all_mappers() -> [&'static EntityMapper; 7] {
    EntityKind::ORDER.map(EntityKind::mapper)
}

impl EntityMapper {
    #[must_use]
    pub fn has_owner(&self) -> bool {
        self.key.contains(&KeyField::Owner)
    }

    /// The fields to read from a table with the given capabilities, owner
    /// column included for child entities.
    #[must_use]
    pub fn read_fields(&self, caps: &SchemaCapabilities) -> Vec<Field> {
        let mut fields: Vec<Field> = caps.readable(self.fields).into_iter().copied().collect();
        if self.has_owner() && caps.has(OWNER_COLUMN) {
            fields.push(OWNER_FIELD);
        }
        fields
    }

    /// Key columns this table must have for the entity to be synchronized.
    #[must_use]
    pub fn missing_key_columns(&self, caps: &SchemaCapabilities) -> Vec<&'static str> {
        self.key
            .iter()
            .map(|k| match k {
                KeyField::Column(c) => *c,
                KeyField::Owner => OWNER_COLUMN,
            })
            .filter(|c| !caps.has(c))
            .collect()
    }

    /// Convert a row into the destination store's representation.
    ///
    /// Only fields present in both `source` and `dest` are carried. Enum
    /// fields are normalized. For child entities `owner_id` is the owning
    /// profile's id in the destination store.
    #[must_use]
    pub fn map_row(&self, source: &Row, dest: &SchemaCapabilities, owner_id: Option<i64>) -> Row {
        let mut out = Row::new();
        for field in self.fields {
            if !dest.has(field.name) {
                continue;
            }
            let Some(value) = source.get(field.name) else {
                continue;
            };
            let value = match field.kind {
                FieldKind::WeightGoal => {
                    normalize_text(value, |s| normalize_weight_goal(s).map(|g| g.as_str()))
                }
                FieldKind::ActivityLevel => {
                    normalize_text(value, |s| normalize_activity_level(s).map(|l| l.as_str()))
                }
                _ => value.clone(),
            };
            out.insert(field.name.to_string(), value);
        }
        if self.has_owner() && dest.has(OWNER_COLUMN) {
            if let Some(id) = owner_id {
                out.insert(OWNER_COLUMN.to_string(), Value::Integer(id));
            }
        }
        out
    }

    /// Fill creation timestamps the row lacks, as far as the table has them.
    pub fn stamp_new_row(&self, row: &mut Row, dest: &SchemaCapabilities) {
        for column in self.stamp_on_create {
            if !dest.has(column) {
                continue;
            }
            let missing = row.get(*column).is_none_or(Value::is_null);
            if missing {
                row.insert((*column).to_string(), now_timestamp());
            }
        }
    }

    /// Remove creation stamps that are null in `row`. The remote row keeps
    /// whatever stamp it got when it was created.
    pub fn drop_unset_stamps(&self, row: &mut Row) {
        for column in self.stamp_on_create {
            if row.get(*column).is_some_and(Value::is_null) {
                row.remove(*column);
            }
        }
    }

    /// Compute the identity key of a row read from `side`.
    ///
    /// Returns `None` when a key column is null or the owner cannot be
    /// resolved to an account uid.
    #[must_use]
    pub fn identity_key(&self, row: &Row, side: Side, owners: &OwnerIndex) -> Option<IdentityKey> {
        let mut parts = Vec::with_capacity(self.key.len());
        for key in self.key {
            let part = match key {
                KeyField::Column(column) => key_part(row.get(*column)?)?,
                KeyField::Owner => {
                    let Value::Integer(id) = row.get(OWNER_COLUMN)? else {
                        return None;
                    };
                    KeyPart::Text(owners.uid(side, *id)?.to_string())
                }
            };
            parts.push(part);
        }
        Some(IdentityKey(parts))
    }

    /// The owner uid of a child row, if it resolves.
    #[must_use]
    pub fn owner_uid<'a>(&self, row: &Row, side: Side, owners: &'a OwnerIndex) -> Option<&'a str> {
        match row.get(OWNER_COLUMN)? {
            Value::Integer(id) => owners.uid(side, *id),
            _ => None,
        }
    }

    /// Build the WHERE columns that address an existing row in `side`.
    #[must_use]
    pub fn key_columns(&self, mapped: &Row, owner_id: Option<i64>) -> Row {
        let mut out = Row::new();
        for key in self.key {
            match key {
                KeyField::Column(column) => {
                    if let Some(v) = mapped.get(*column) {
                        out.insert((*column).to_string(), v.clone());
                    }
                }
                KeyField::Owner => {
                    if let Some(id) = owner_id {
                        out.insert(OWNER_COLUMN.to_string(), Value::Integer(id));
                    }
                }
            }
        }
        out
    }

    #[must_use]
    pub fn is_key_column(&self, column: &str) -> bool {
        self.key.iter().any(|k| match k {
            KeyField::Column(c) => *c == column,
            KeyField::Owner => column == OWNER_COLUMN,
        })
    }
}

fn normalize_text(value: &Value, normalize: impl Fn(Option<&str>) -> Option<&'static str>) -> Value {
    match value {
        Value::Text(s) => normalize(Some(s)).map_or(Value::Null, |c| Value::Text(c.to_string())),
        _ => Value::Null,
    }
}

fn key_part(value: &Value) -> Option<KeyPart> {
    match value {
        Value::Integer(v) => Some(KeyPart::Integer(*v)),
        Value::Text(s) if !s.is_empty() => Some(KeyPart::Text(s.clone())),
        _ => None,
    }
}

/// Resolves profile ids to account uids and back, in each store.
///
/// Child rows point at their owner through a store-internal id that differs
/// between the stores; the uid is the only thing both sides agree on.
#[derive(Debug, Clone, Default)]
pub struct OwnerIndex {
    local_uid_by_id: HashMap<i64, String>,
    local_id_by_uid: HashMap<String, i64>,
    remote_uid_by_id: HashMap<i64, String>,
    remote_id_by_uid: HashMap<String, i64>,
}

impl OwnerIndex {
    /// Build from profile rows holding `id` and `firebase_uid`.
    #[must_use]
    pub fn from_rows(local: &[Row], remote: &[Row]) -> Self {
        let mut index = Self::default();
        for row in local {
            if let Some((id, uid)) = profile_ids(row) {
                index.local_uid_by_id.insert(id, uid.clone());
                index.local_id_by_uid.insert(uid, id);
            }
        }
        for row in remote {
            if let Some((id, uid)) = profile_ids(row) {
                index.remote_uid_by_id.insert(id, uid.clone());
                index.remote_id_by_uid.insert(uid, id);
            }
        }
        index
    }

    #[must_use]
    pub fn uid(&self, side: Side, id: i64) -> Option<&str> {
        let map = match side {
            Side::Local => &self.local_uid_by_id,
            Side::Remote => &self.remote_uid_by_id,
        };
        map.get(&id).map(String::as_str)
    }

    #[must_use]
    pub fn id(&self, side: Side, uid: &str) -> Option<i64> {
        let map = match side {
            Side::Local => &self.local_id_by_uid,
            Side::Remote => &self.remote_id_by_uid,
        };
        map.get(uid).copied()
    }
}

fn profile_ids(row: &Row) -> Option<(i64, String)> {
    let Value::Integer(id) = row.get(PROFILE_ID_COLUMN)? else {
        return None;
    };
    match row.get(PROFILE_UID_COLUMN)? {
        Value::Text(uid) if !uid.is_empty() => Some((*id, uid.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn owners() -> OwnerIndex {
        OwnerIndex::from_rows(
            &[row(&[("id", Value::Integer(1)), ("firebase_uid", text("uid-a"))])],
            &[row(&[("id", Value::Integer(40)), ("firebase_uid", text("uid-a"))])],
        )
    }

    #[test]
    fn test_map_profile_normalizes_enums() {
        let dest = SchemaCapabilities::new(PROFILE.fields.iter().map(|f| f.name));
        let source = row(&[
            ("firebase_uid", text("uid-a")),
            ("weight_goal", text("lose_0_5")),
            ("activity_level", text("athletic")),
        ]);
        let mapped = PROFILE.map_row(&source, &dest, None);
        assert_eq!(mapped.get("weight_goal"), Some(&text("lose")));
        assert_eq!(mapped.get("activity_level"), Some(&text("very_active")));
    }

    #[test]
    fn test_map_omits_absent_source_fields() {
        let dest = SchemaCapabilities::new(PROFILE.fields.iter().map(|f| f.name));
        let source = row(&[("firebase_uid", text("uid-a")), ("email", text("a@x.io"))]);
        let mapped = PROFILE.map_row(&source, &dest, None);
        assert_eq!(mapped.len(), 2);
        assert!(!mapped.contains_key("age"));
        assert!(!mapped.contains_key("onboarding_complete"));
    }

    #[test]
    fn test_map_omits_fields_destination_lacks() {
        let dest = SchemaCapabilities::new(["firebase_uid", "email"]);
        let source = row(&[
            ("firebase_uid", text("uid-a")),
            ("email", text("a@x.io")),
            ("target_weight", Value::Real(70.0)),
        ]);
        let mapped = PROFILE.map_row(&source, &dest, None);
        assert!(!mapped.contains_key("target_weight"));
    }

    #[test]
    fn test_map_keeps_null_enum_null() {
        let dest = SchemaCapabilities::new(["user_id", "weight_goal"]);
        let source = row(&[("weight_goal", Value::Null)]);
        let mapped = NUTRITION_GOALS.map_row(&source, &dest, Some(3));
        assert_eq!(mapped.get("weight_goal"), Some(&Value::Null));
        assert_eq!(mapped.get("user_id"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_map_never_copies_surrogate_profile_id() {
        let dest = SchemaCapabilities::new(["id", "firebase_uid"]);
        let source = row(&[("id", Value::Integer(9)), ("firebase_uid", text("uid-a"))]);
        let mapped = PROFILE.map_row(&source, &dest, None);
        assert!(!mapped.contains_key("id"));
    }

    #[test]
    fn test_identity_key_resolves_owner_uid_per_side() {
        let owners = owners();
        let local = row(&[("meal_id", Value::Integer(5)), ("user_id", Value::Integer(1))]);
        let remote = row(&[("meal_id", Value::Integer(5)), ("user_id", Value::Integer(40))]);
        let lk = NUTRITION_LOG.identity_key(&local, Side::Local, &owners).unwrap();
        let rk = NUTRITION_LOG.identity_key(&remote, Side::Remote, &owners).unwrap();
        assert_eq!(lk, rk);
    }

    #[test]
    fn test_identity_key_none_for_unknown_owner_or_null_key() {
        let owners = owners();
        let orphan = row(&[("user_id", Value::Integer(99))]);
        assert!(FITNESS_GOALS.identity_key(&orphan, Side::Local, &owners).is_none());

        let no_uid = row(&[("firebase_uid", Value::Null)]);
        assert!(PROFILE.identity_key(&no_uid, Side::Local, &owners).is_none());
    }

    #[test]
    fn test_stamp_new_row_only_fills_missing() {
        let dest = SchemaCapabilities::new(["firebase_uid", "created_at", "updated_at"]);
        let original = Value::Timestamp(
            chrono::NaiveDate::from_ymd_opt(2023, 5, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        let mut mapped = row(&[
            ("firebase_uid", text("uid-a")),
            ("created_at", original.clone()),
            ("updated_at", Value::Null),
        ]);
        PROFILE.stamp_new_row(&mut mapped, &dest);
        assert_eq!(mapped.get("created_at"), Some(&original));
        assert!(matches!(mapped.get("updated_at"), Some(Value::Timestamp(_))));
    }

    #[test]
    fn test_drop_unset_stamps_keeps_set_values() {
        let stamp = Value::Timestamp(
            chrono::NaiveDate::from_ymd_opt(2023, 5, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        let mut mapped = row(&[
            ("firebase_uid", text("uid-a")),
            ("last_name", Value::Null),
            ("created_at", Value::Null),
            ("updated_at", stamp.clone()),
        ]);
        PROFILE.drop_unset_stamps(&mut mapped);
        assert!(!mapped.contains_key("created_at"));
        assert_eq!(mapped.get("updated_at"), Some(&stamp));
        assert_eq!(mapped.get("last_name"), Some(&Value::Null));
    }

    #[test]
    fn test_key_columns_use_destination_owner() {
        let mapped = row(&[
            ("achievement_id", Value::Integer(12)),
            ("completed", Value::Bool(true)),
        ]);
        let key = ACHIEVEMENT_UNLOCK.key_columns(&mapped, Some(40));
        assert_eq!(key.get("user_id"), Some(&Value::Integer(40)));
        assert_eq!(key.get("achievement_id"), Some(&Value::Integer(12)));
        assert!(!key.contains_key("completed"));
    }

    #[test]
    fn test_every_child_has_owner_key() {
        for kind in EntityKind::ORDER {
            assert_eq!(kind.mapper().has_owner(), kind.is_child(), "{kind}");
            assert_eq!(kind.mapper().kind, kind);
        }
    }
}
