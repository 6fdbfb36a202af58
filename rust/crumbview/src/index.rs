//! Row-index handle types.
//!
//! Two disjoint integer handles keep the engine's coordinate systems apart:
//! [`StorageRow`] addresses a table's raw value buffer and is stable across
//! sorting and filtering, while [`DisplayRow`] addresses the currently
//! sorted/filtered view and is invalidated by every resort. The two are
//! deliberately not interchangeable; converting between them goes through a
//! composite table's view-order buffer.

use serde::{Deserialize, Serialize};

/// Position of a row in a table's underlying value buffer.
///
/// Stable across sorting/filtering; shifts when rows are inserted or
/// removed before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StorageRow(usize);

impl StorageRow {
    pub fn new(index: usize) -> Self {
        StorageRow(index)
    }

    pub fn get(self) -> usize {
        self.0
    }

    /// Shift this index up by one (a row was inserted before it).
    pub(crate) fn shifted_up(self) -> Self {
        StorageRow(self.0 + 1)
    }

    /// Shift this index down by one (a row was removed before it).
    pub(crate) fn shifted_down(self) -> Self {
        debug_assert!(self.0 > 0);
        StorageRow(self.0 - 1)
    }
}

impl From<usize> for StorageRow {
    fn from(index: usize) -> Self {
        StorageRow(index)
    }
}

/// Position of a row in the currently sorted/filtered view.
///
/// Volatile: recomputed on every sort or filter change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DisplayRow(usize);

impl DisplayRow {
    pub fn new(index: usize) -> Self {
        DisplayRow(index)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl From<usize> for DisplayRow {
    fn from(index: usize) -> Self {
        DisplayRow(index)
    }
}
