//! Canonical vocabularies for weight-goal intent and activity level.
//!
//! Older app builds wrote granular variants (`lose_0_5`, `athletic`, ...)
//! that the central store's enum columns reject. Everything that crosses
//! between the stores goes through these functions first.

use std::fmt;

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightGoal {
    Lose,
    Maintain,
    Gain,
}

impl WeightGoal {
    pub const ALL: [WeightGoal; 3] = [WeightGoal::Lose, WeightGoal::Maintain, WeightGoal::Gain];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WeightGoal::Lose => "lose",
            WeightGoal::Maintain => "maintain",
            WeightGoal::Gain => "gain",
        }
    }
}

impl fmt::Display for WeightGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    VeryActive,
}

impl ActivityLevel {
    pub const ALL: [ActivityLevel; 5] = [
        ActivityLevel::Sedentary,
        ActivityLevel::Light,
        ActivityLevel::Moderate,
        ActivityLevel::Active,
        ActivityLevel::VeryActive,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityLevel::Sedentary => "sedentary",
            ActivityLevel::Light => "light",
            ActivityLevel::Moderate => "moderate",
            ActivityLevel::Active => "active",
            ActivityLevel::VeryActive => "very_active",
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a raw weight-goal string onto the canonical set.
///
/// `None` and blank input stay absent. Unknown values log a warning and fall
/// back to [`WeightGoal::Maintain`].
#[must_use]
pub fn normalize_weight_goal(raw: Option<&str>) -> Option<WeightGoal> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let goal = match raw.to_ascii_lowercase().as_str() {
        "lose" | "lose_extreme" | "lose_heavy" | "lose_moderate" | "lose_light" | "lose_1"
        | "lose_0_75" | "lose_0_5" | "lose_0_25" => WeightGoal::Lose,
        "maintain" => WeightGoal::Maintain,
        "gain" | "gain_light" | "gain_moderate" | "gain_0_25" | "gain_0_5" => WeightGoal::Gain,
        _ => {
            warn!(value = raw, "Unknown weight_goal value, using default 'maintain'");
            WeightGoal::Maintain
        }
    };
    Some(goal)
}

/// Map a raw activity-level string onto the canonical set.
///
/// `None` and blank input stay absent. Unknown values log a warning and fall
/// back to [`ActivityLevel::Moderate`].
#[must_use]
pub fn normalize_activity_level(raw: Option<&str>) -> Option<ActivityLevel> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let level = match raw.to_ascii_lowercase().as_str() {
        "sedentary" => ActivityLevel::Sedentary,
        "light" => ActivityLevel::Light,
        "moderate" => ActivityLevel::Moderate,
        "active" => ActivityLevel::Active,
        "very_active" | "extreme" | "athletic" => ActivityLevel::VeryActive,
        _ => {
            warn!(value = raw, "Unknown activity_level value, using default 'moderate'");
            ActivityLevel::Moderate
        }
    };
    Some(level)
}
