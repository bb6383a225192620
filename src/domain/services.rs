//! Maintenance status classification
//!
//! Pure functions mapping upstream activity signals to a maintenance status.
//! The thresholds are inclusive upper bounds on the number of whole days since
//! the last commit:
//!
//! | days since last commit | status     |
//! |------------------------|------------|
//! | archived flag set      | archived   |
//! | 0..=30                 | active     |
//! | 31..=180               | regular    |
//! | 181..=365              | occasional |
//! | > 365                  | dormant    |
//! | no commit date         | unknown    |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maintenance health of a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceStatus {
    Active,
    Regular,
    Occasional,
    Dormant,
    Archived,
    Unknown,
}

impl MaintenanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceStatus::Active => "active",
            MaintenanceStatus::Regular => "regular",
            MaintenanceStatus::Occasional => "occasional",
            MaintenanceStatus::Dormant => "dormant",
            MaintenanceStatus::Archived => "archived",
            MaintenanceStatus::Unknown => "unknown",
        }
    }

    /// Human-readable label
    pub fn message(&self) -> &'static str {
        match self {
            MaintenanceStatus::Active => "Actively maintained",
            MaintenanceStatus::Regular => "Regularly maintained",
            MaintenanceStatus::Occasional => "Occasionally maintained",
            MaintenanceStatus::Dormant => "Dormant",
            MaintenanceStatus::Archived => "Archived",
            MaintenanceStatus::Unknown => "Status unknown",
        }
    }

    pub fn color_class(&self) -> &'static str {
        match self {
            MaintenanceStatus::Active => "green",
            MaintenanceStatus::Regular => "blue",
            MaintenanceStatus::Occasional => "yellow",
            MaintenanceStatus::Dormant => "orange",
            MaintenanceStatus::Archived | MaintenanceStatus::Unknown => "gray",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            MaintenanceStatus::Active => "check-circle",
            MaintenanceStatus::Regular => "refresh",
            MaintenanceStatus::Occasional => "clock",
            MaintenanceStatus::Dormant => "moon",
            MaintenanceStatus::Archived => "archive",
            MaintenanceStatus::Unknown => "help-circle",
        }
    }

    pub fn badge_variant(&self) -> &'static str {
        match self {
            MaintenanceStatus::Active => "success",
            MaintenanceStatus::Regular => "info",
            MaintenanceStatus::Occasional => "warning",
            MaintenanceStatus::Dormant => "danger",
            MaintenanceStatus::Archived => "secondary",
            MaintenanceStatus::Unknown => "outline",
        }
    }
}

impl fmt::Display for MaintenanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive day limits for each activity band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusThresholds {
    pub active_days: i64,
    pub regular_days: i64,
    pub occasional_days: i64,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            active_days: 30,
            regular_days: 180,
            occasional_days: 365,
        }
    }
}

/// Whole days elapsed between `date` and `now`; future dates count as zero
pub fn days_since(date: &DateTime<Utc>, now: &DateTime<Utc>) -> i64 {
    now.signed_duration_since(*date).num_days().max(0)
}

/// Classify with the default thresholds
pub fn classify(
    is_archived: bool,
    last_commit_at: Option<&DateTime<Utc>>,
    now: &DateTime<Utc>,
) -> MaintenanceStatus {
    classify_with(&StatusThresholds::default(), is_archived, last_commit_at, now)
}

/// Classify a repository. The archived flag overrides every day threshold.
pub fn classify_with(
    thresholds: &StatusThresholds,
    is_archived: bool,
    last_commit_at: Option<&DateTime<Utc>>,
    now: &DateTime<Utc>,
) -> MaintenanceStatus {
    if is_archived {
        return MaintenanceStatus::Archived;
    }
    let Some(last_commit) = last_commit_at else {
        return MaintenanceStatus::Unknown;
    };

    let days = days_since(last_commit, now);
    if days <= thresholds.active_days {
        MaintenanceStatus::Active
    } else if days <= thresholds.regular_days {
        MaintenanceStatus::Regular
    } else if days <= thresholds.occasional_days {
        MaintenanceStatus::Occasional
    } else {
        MaintenanceStatus::Dormant
    }
}

/// Coarse relative age for display: "today", "3 days", "2 weeks", "1 month", "4 years"
pub fn relative_time(date: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    fn plural(n: i64, unit: &str) -> String {
        if n == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", n, unit)
        }
    }

    let days = days_since(date, now);
    match days {
        0 => "today".to_string(),
        1..=6 => plural(days, "day"),
        7..=29 => plural(days / 7, "week"),
        30..=364 => plural(days / 30, "month"),
        _ => plural(days / 365, "year"),
    }
}

/// Where the inputs of a status view came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusOrigin {
    /// Metadata written by the batch synchronizer
    SyncedMetadata,
    /// Legacy `repository_status` block on the entry
    LegacyStatus,
    /// Fetched from the forge at request time
    LiveFetch,
    /// Nothing usable was available
    Unavailable,
}

/// Status plus everything the presentation layer needs to render a badge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceStatusView {
    pub status: MaintenanceStatus,
    pub message: String,
    pub color_class: String,
    pub icon: String,
    pub badge_variant: String,
    pub last_commit_at: Option<DateTime<Utc>>,
    pub relative_time: Option<String>,
    pub origin: StatusOrigin,
    pub error: Option<String>,
}

impl MaintenanceStatusView {
    /// Classify and decorate in one step
    pub fn classified(
        is_archived: bool,
        last_commit_at: Option<DateTime<Utc>>,
        now: &DateTime<Utc>,
        origin: StatusOrigin,
    ) -> Self {
        let status = classify(is_archived, last_commit_at.as_ref(), now);
        let relative_time = last_commit_at.as_ref().map(|d| relative_time(d, now));
        Self {
            status,
            message: status.message().to_string(),
            color_class: status.color_class().to_string(),
            icon: status.icon().to_string(),
            badge_variant: status.badge_variant().to_string(),
            last_commit_at,
            relative_time,
            origin,
            error: None,
        }
    }

    /// Terminal `unknown` view carrying an explanation
    pub fn unknown(error: impl Into<String>) -> Self {
        let status = MaintenanceStatus::Unknown;
        Self {
            status,
            message: status.message().to_string(),
            color_class: status.color_class().to_string(),
            icon: status.icon().to_string(),
            badge_variant: status.badge_variant().to_string(),
            last_commit_at: None,
            relative_time: None,
            origin: StatusOrigin::Unavailable,
            error: Some(error.into()),
        }
    }
}
