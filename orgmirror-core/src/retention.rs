//! Retention periods
//!
//! Periods are written as a count followed by a unit: `30d` (days), `6m`
//! (months of 30 days) or `1y` (years of 365 days). Anything else disables
//! the corresponding cleanup instead of failing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Days per `m` unit
const DAYS_PER_MONTH: i64 = 30;
/// Days per `y` unit
const DAYS_PER_YEAR: i64 = 365;

/// How long an entity may remain before cleanup removes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum RetentionPeriod {
    /// Entities at least this many days old qualify
    Days(i64),
    /// No entity ever qualifies
    #[default]
    Disabled,
}

impl RetentionPeriod {
    /// Parse a period string. Never fails: unknown input yields `Disabled`.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let Some(unit) = input.chars().last() else {
            return Self::Disabled;
        };

        let multiplier = match unit {
            'd' => 1,
            'm' => DAYS_PER_MONTH,
            'y' => DAYS_PER_YEAR,
            _ => return Self::Disabled,
        };

        match input[..input.len() - unit.len_utf8()].parse::<u32>() {
            Ok(count) => Self::Days(i64::from(count) * multiplier),
            Err(_) => Self::Disabled,
        }
    }

    /// Day count for store queries; `-1` when disabled
    pub fn as_days(&self) -> i64 {
        match self {
            Self::Days(days) => *days,
            Self::Disabled => -1,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Days(_))
    }
}

impl From<String> for RetentionPeriod {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<RetentionPeriod> for String {
    fn from(value: RetentionPeriod) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RetentionPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Days(days) => write!(f, "{}d", days),
            Self::Disabled => f.write_str("disabled"),
        }
    }
}
