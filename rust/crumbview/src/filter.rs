//! View filters.
//!
//! A filter pairs a composite-column name with a per-semantic-type
//! condition, optionally carrying a second value for ranges. Filters act on
//! raw cached values, never on formatted text; `Empty` cells fail every
//! condition except the explicit [`FilterCondition::IsEmpty`].

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Condition applied to one column's raw values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterCondition {
    /// Keep only rows whose cell is absent.
    IsEmpty,
    IntEquals(i64),
    /// Inclusive range.
    IntBetween(i64, i64),
    /// Case-insensitive substring match.
    StringContains(String),
    BoolIs(bool),
    EnumIs(i32),
    /// Match the discerning group, optionally a specific member too.
    EnumPairIs { group: i32, member: Option<i32> },
    DateEquals(NaiveDate),
    /// Inclusive range.
    DateBetween(NaiveDate, NaiveDate),
    /// Inclusive range.
    TimeBetween(NaiveTime, NaiveTime),
    IdListContains(i64),
}

impl FilterCondition {
    pub fn matches(&self, value: &Value) -> bool {
        if value.is_empty() {
            return matches!(self, FilterCondition::IsEmpty);
        }
        match self {
            FilterCondition::IsEmpty => false,
            FilterCondition::IntEquals(expected) => value.as_int() == Some(*expected),
            FilterCondition::IntBetween(min, max) => value
                .as_int()
                .map(|v| v >= *min && v <= *max)
                .unwrap_or(false),
            FilterCondition::StringContains(needle) => value
                .as_str()
                .map(|s| s.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
            FilterCondition::BoolIs(expected) => value.as_bool() == Some(*expected),
            FilterCondition::EnumIs(expected) => value.as_enum() == Some(*expected),
            FilterCondition::EnumPairIs { group, member } => match value.as_enum_pair() {
                Some((g, m)) => g == *group && member.map(|want| want == m).unwrap_or(true),
                None => false,
            },
            FilterCondition::DateEquals(expected) => value.as_date() == Some(*expected),
            FilterCondition::DateBetween(min, max) => value
                .as_date()
                .map(|d| d >= *min && d <= *max)
                .unwrap_or(false),
            FilterCondition::TimeBetween(min, max) => value
                .as_time()
                .map(|t| t >= *min && t <= *max)
                .unwrap_or(false),
            FilterCondition::IdListContains(id) => value
                .as_id_list()
                .map(|ids| ids.contains(id))
                .unwrap_or(false),
        }
    }
}

/// One active filter on a composite table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Internal name of the filtered composite column.
    pub column: String,
    pub condition: FilterCondition,
}

impl Filter {
    pub fn new(column: impl Into<String>, condition: FilterCondition) -> Self {
        Filter {
            column: column.into(),
            condition,
        }
    }
}
