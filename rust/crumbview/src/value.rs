//! Cell values and semantic content types.
//!
//! Every cell in a base or composite table holds a [`Value`]; the semantic
//! [`ContentType`] of the owning column decides how values are compared for
//! sorting and rendered for display. `Value::Empty` is the universal
//! "no data" cell: absent foreign keys, failed lookups and empty fold
//! results all surface as `Empty`, never as errors.

use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Semantic type of a column's cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    /// Plain integer quantity (height, elevation gain, counts).
    Integer,
    /// Key identifier: primary or foreign key. The only key-capable type.
    Ident,
    /// Index into a flat enum lookup table (1-based, < 1 is invalid).
    Enum,
    /// Paired index into a two-level enum lookup table.
    DualEnum,
    Boolean,
    String,
    Date,
    Time,
    /// List of identifiers (e.g. participant keys serialized in one cell).
    IdentList,
}

impl ContentType {
    /// Whether columns of this type may be primary/foreign keys.
    pub fn is_key_type(self) -> bool {
        matches!(self, ContentType::Ident)
    }

    /// Whether cells of this type are rendered right-aligned.
    pub fn right_aligned(self) -> bool {
        matches!(
            self,
            ContentType::Integer | ContentType::Ident | ContentType::Date | ContentType::Time
        )
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent data: null key, unmatched lookup, empty fold result.
    Empty,
    Int(i64),
    Bool(bool),
    Str(String),
    Date(NaiveDate),
    Time(NaiveTime),
    /// 1-based index into a flat enum table; values < 1 are treated as unset.
    EnumIdx(i32),
    /// (discerning, displayed) pair indexing a two-level enum table.
    EnumPair(i32, i32),
    IdList(Vec<i64>),
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Valid (>= 1) flat enum index, if any.
    pub fn as_enum(&self) -> Option<i32> {
        match self {
            Value::EnumIdx(i) if *i >= 1 => Some(*i),
            _ => None,
        }
    }

    pub fn as_enum_pair(&self) -> Option<(i32, i32)> {
        match self {
            Value::EnumPair(a, b) => Some((*a, *b)),
            _ => None,
        }
    }

    pub fn as_id_list(&self) -> Option<&[i64]> {
        match self {
            Value::IdList(ids) => Some(ids),
            _ => None,
        }
    }

    /// Total ordering for sorting under the given content type.
    ///
    /// `Empty` sorts before everything. Strings compare case-insensitively
    /// (Unicode code-point order on the lowercased text, with the raw text
    /// as tie-breaker so the ordering stays total).
    pub fn cmp_for(&self, other: &Value, content_type: ContentType) -> Ordering {
        match (self, other) {
            (Value::Empty, Value::Empty) => Ordering::Equal,
            (Value::Empty, _) => Ordering::Less,
            (_, Value::Empty) => Ordering::Greater,
            _ => match content_type {
                ContentType::Integer | ContentType::Ident => {
                    cmp_opt(self.as_int(), other.as_int())
                }
                ContentType::Enum => cmp_opt(
                    self.as_enum().or(Some(0)),
                    other.as_enum().or(Some(0)),
                ),
                ContentType::DualEnum => cmp_opt(self.as_enum_pair(), other.as_enum_pair()),
                ContentType::Boolean => cmp_opt(self.as_bool(), other.as_bool()),
                ContentType::String => match (self.as_str(), other.as_str()) {
                    (Some(a), Some(b)) => cmp_text(a, b),
                    (a, b) => cmp_opt(a, b),
                },
                ContentType::Date => cmp_opt(self.as_date(), other.as_date()),
                ContentType::Time => cmp_opt(self.as_time(), other.as_time()),
                ContentType::IdentList => match (self.as_id_list(), other.as_id_list()) {
                    (Some(a), Some(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
                    (a, b) => cmp_opt(a.map(<[i64]>::len), b.map(<[i64]>::len)),
                },
            },
        }
    }

    /// Plain rendering without enum-label substitution or suffix.
    pub fn plain_text(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Int(i) => i.to_string(),
            Value::Bool(b) => {
                if *b {
                    "yes".to_string()
                } else {
                    "no".to_string()
                }
            }
            Value::Str(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Time(t) => t.format("%H:%M").to_string(),
            Value::EnumIdx(i) => {
                if *i >= 1 {
                    i.to_string()
                } else {
                    String::new()
                }
            }
            Value::EnumPair(a, b) => format!("{}/{}", a, b),
            Value::IdList(ids) => ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Case-insensitive text ordering used for string sorting and list folds.
pub fn cmp_text(a: &str, b: &str) -> Ordering {
    let la = a.to_lowercase();
    let lb = b.to_lowercase();
    la.cmp(&lb).then_with(|| a.cmp(b))
}

fn cmp_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
    }
}
