//! Composite columns: the seven computation strategies layered on top of
//! breadcrumb traversal and column accessors.
//!
//! Each composite column owns a pure computation contract: given the current
//! base-table contents, [`CompositeColumn::compute_cell`] produces one value
//! per anchor row (or [`CompositeColumn::compute_whole`] produces the whole
//! column at once for interdependent kinds such as rank and ordinal, whose
//! cells depend on global ordering). Columns also declare the base columns
//! they read, so the runtime knows what to mark dirty on upstream changes.
//!
//! The kinds form a closed set dispatched by `match`; there is no open-ended
//! plugin surface.

use std::collections::HashSet;

use crate::crumbs::Chain;
use crate::error::{Result, ViewError};
use crate::index::StorageRow;
use crate::schema::{ColumnId, EnumBinding, Schema, TableId};
use crate::store::Database;
use crate::value::{cmp_text, ContentType, Value};

// ============================================================================
// Sorting primitives
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// One pass of a prioritized multi-column sort.
#[derive(Debug, Clone, Copy)]
pub struct SortPass {
    pub column: ColumnId,
    pub direction: SortDirection,
}

/// Stable-sort all storage rows of a table by prioritized passes.
///
/// The last pass is applied first, so earlier passes take priority; the
/// stable sort preserves each lower-priority ordering within equal keys.
pub(crate) fn sorted_storage_order(db: &Database, passes: &[SortPass]) -> Vec<StorageRow> {
    debug_assert!(!passes.is_empty());
    let table = passes[0].column.table;
    let mut order: Vec<StorageRow> = (0..db.row_count(table)).map(StorageRow::new).collect();
    for pass in passes.iter().rev() {
        let content_type = db.schema().column(pass.column).content_type;
        order.sort_by(|&a, &b| {
            let ord = db
                .value_at(pass.column, a)
                .cmp_for(db.value_at(pass.column, b), content_type);
            match pass.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        });
    }
    order
}

// ============================================================================
// Column kinds
// ============================================================================

/// Aggregation applied by fold columns over the traversal result set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FoldOp {
    /// Result-set size; 0 for an empty set (never `Empty`).
    Count,
    /// Integer sum; empty set yields `Empty`.
    Sum,
    /// Mean rounded to the nearest integer; empty set yields `Empty`.
    Average,
    Max,
    Min,
    /// Case-insensitively sorted, comma-joined strings.
    ListString,
    /// Like `ListString`, but the row whose primary key equals `front_key`
    /// is pulled to the front and excluded from the alphabetical sort.
    FrontList { front_key: i64 },
}

/// The closed set of computation strategies.
#[derive(Debug, Clone)]
pub enum ColumnKind {
    /// Copy one anchor column at the same storage row.
    Direct { source: ColumnId },
    /// Dereference an all-forward chain, then read one content column there.
    Reference { chain: Chain, source: ColumnId },
    /// Subtract two same-table, same-type columns. Dates are counted
    /// inclusively (`days + 1`).
    Difference {
        minuend: ColumnId,
        subtrahend: ColumnId,
    },
    /// Pair a (discerning, displayed) enum column duo for two-level lookup.
    DependentEnum {
        discerning: ColumnId,
        displayed: ColumnId,
    },
    /// 1-based rank of every row under a prioritized sort. Interdependent.
    Index { passes: Vec<SortPass> },
    /// Like `Index`, but the counter restarts whenever the separating
    /// foreign-key column changes between consecutive sorted rows; rows
    /// with a null separator get no ordinal. Interdependent.
    Ordinal {
        passes: Vec<SortPass>,
        separator: ColumnId,
    },
    /// Aggregate over the rows reached by breadcrumb traversal.
    Fold {
        chain: Chain,
        op: FoldOp,
        /// Content column in the target table; `None` only for `Count`.
        content: Option<ColumnId>,
    },
}

// ============================================================================
// Composite column
// ============================================================================

/// One derived column of a composite table.
#[derive(Debug, Clone)]
pub struct CompositeColumn {
    /// Stable internal name, unique within its composite table.
    pub name: String,
    /// Human-readable display name.
    pub title: String,
    pub content_type: ContentType,
    /// Appended after the formatted value at display time (e.g. " m").
    pub suffix: Option<String>,
    /// Derived/summary data, omittable from some exports.
    pub statistical: bool,
    /// Lookup binding used for enum-label substitution at display time.
    pub enum_binding: Option<EnumBinding>,
    kind: ColumnKind,
}

impl CompositeColumn {
    // ------------------------------------------------------------------
    // Constructors (configuration errors are detected here, never later)
    // ------------------------------------------------------------------

    pub fn direct(
        name: impl Into<String>,
        title: impl Into<String>,
        schema: &Schema,
        source: ColumnId,
    ) -> Self {
        let def = schema.column(source);
        CompositeColumn {
            name: name.into(),
            title: title.into(),
            content_type: def.content_type,
            suffix: None,
            statistical: false,
            enum_binding: def.enum_binding,
            kind: ColumnKind::Direct { source },
        }
    }

    pub fn reference(
        name: impl Into<String>,
        title: impl Into<String>,
        schema: &Schema,
        chain: Chain,
        source: ColumnId,
    ) -> Result<Self> {
        if !chain.is_all_forward() {
            return Err(ViewError::column_config(
                "reference column requires an all-forward chain",
            ));
        }
        if source.table != chain.target_table() {
            return Err(ViewError::column_config(
                "reference content column must live in the chain's target table",
            ));
        }
        let def = schema.column(source);
        Ok(CompositeColumn {
            name: name.into(),
            title: title.into(),
            content_type: def.content_type,
            suffix: None,
            statistical: false,
            enum_binding: def.enum_binding,
            kind: ColumnKind::Reference { chain, source },
        })
    }

    pub fn difference(
        name: impl Into<String>,
        title: impl Into<String>,
        schema: &Schema,
        minuend: ColumnId,
        subtrahend: ColumnId,
    ) -> Result<Self> {
        let m = schema.column(minuend);
        let s = schema.column(subtrahend);
        if minuend.table != subtrahend.table {
            return Err(ViewError::column_config(
                "difference columns must belong to the same table",
            ));
        }
        if m.content_type != s.content_type {
            return Err(ViewError::column_config(
                "difference columns must share a content type",
            ));
        }
        if m.role.is_key() || s.role.is_key() {
            return Err(ViewError::column_config(
                "difference columns must be non-key",
            ));
        }
        if !matches!(m.content_type, ContentType::Integer | ContentType::Date) {
            return Err(ViewError::column_config(
                "difference supports integer and date columns",
            ));
        }
        Ok(CompositeColumn {
            name: name.into(),
            title: title.into(),
            content_type: ContentType::Integer,
            suffix: None,
            statistical: false,
            enum_binding: None,
            kind: ColumnKind::Difference {
                minuend,
                subtrahend,
            },
        })
    }

    pub fn dependent_enum(
        name: impl Into<String>,
        title: impl Into<String>,
        schema: &Schema,
        discerning: ColumnId,
        displayed: ColumnId,
    ) -> Result<Self> {
        let d = schema.column(discerning);
        let v = schema.column(displayed);
        if discerning.table != displayed.table {
            return Err(ViewError::column_config(
                "dependent enum columns must belong to the same table",
            ));
        }
        if d.content_type != ContentType::Enum || v.content_type != ContentType::Enum {
            return Err(ViewError::column_config(
                "dependent enum requires two enum columns",
            ));
        }
        let binding = match v.enum_binding {
            Some(EnumBinding::Dual(id)) => Some(EnumBinding::Dual(id)),
            _ => {
                return Err(ViewError::column_config(
                    "displayed column must be bound to a dual enum table",
                ))
            }
        };
        Ok(CompositeColumn {
            name: name.into(),
            title: title.into(),
            content_type: ContentType::DualEnum,
            suffix: None,
            statistical: false,
            enum_binding: binding,
            kind: ColumnKind::DependentEnum {
                discerning,
                displayed,
            },
        })
    }

    pub fn index(
        name: impl Into<String>,
        title: impl Into<String>,
        passes: Vec<SortPass>,
    ) -> Result<Self> {
        if passes.is_empty() {
            return Err(ViewError::column_config("index column needs sort passes"));
        }
        Ok(CompositeColumn {
            name: name.into(),
            title: title.into(),
            content_type: ContentType::Integer,
            suffix: None,
            statistical: false,
            enum_binding: None,
            kind: ColumnKind::Index { passes },
        })
    }

    pub fn ordinal(
        name: impl Into<String>,
        title: impl Into<String>,
        schema: &Schema,
        passes: Vec<SortPass>,
        separator: ColumnId,
    ) -> Result<Self> {
        match passes.first() {
            Some(first) if first.column == separator => {}
            _ => {
                return Err(ViewError::column_config(
                    "separating column must be the highest-priority sort pass",
                ))
            }
        }
        if !schema.column(separator).role.is_foreign() {
            return Err(ViewError::column_config(
                "separating column must be a foreign key",
            ));
        }
        Ok(CompositeColumn {
            name: name.into(),
            title: title.into(),
            content_type: ContentType::Integer,
            suffix: None,
            statistical: false,
            enum_binding: None,
            kind: ColumnKind::Ordinal { passes, separator },
        })
    }

    pub fn fold_count(
        name: impl Into<String>,
        title: impl Into<String>,
        chain: Chain,
    ) -> Self {
        CompositeColumn {
            name: name.into(),
            title: title.into(),
            content_type: ContentType::Integer,
            suffix: None,
            statistical: false,
            enum_binding: None,
            kind: ColumnKind::Fold {
                chain,
                op: FoldOp::Count,
                content: None,
            },
        }
    }

    pub fn fold_numeric(
        name: impl Into<String>,
        title: impl Into<String>,
        schema: &Schema,
        chain: Chain,
        op: FoldOp,
        content: ColumnId,
    ) -> Result<Self> {
        if !matches!(
            op,
            FoldOp::Sum | FoldOp::Average | FoldOp::Max | FoldOp::Min
        ) {
            return Err(ViewError::column_config("not a numeric fold operation"));
        }
        Self::check_fold_content(schema, &chain, content)?;
        if schema.column(content).content_type != ContentType::Integer {
            return Err(ViewError::column_config(
                "numeric fold requires an integer content column",
            ));
        }
        Ok(CompositeColumn {
            name: name.into(),
            title: title.into(),
            content_type: ContentType::Integer,
            suffix: None,
            statistical: false,
            enum_binding: None,
            kind: ColumnKind::Fold {
                chain,
                op,
                content: Some(content),
            },
        })
    }

    pub fn fold_list(
        name: impl Into<String>,
        title: impl Into<String>,
        schema: &Schema,
        chain: Chain,
        content: ColumnId,
    ) -> Result<Self> {
        Self::check_fold_content(schema, &chain, content)?;
        Ok(CompositeColumn {
            name: name.into(),
            title: title.into(),
            content_type: ContentType::String,
            suffix: None,
            statistical: false,
            enum_binding: None,
            kind: ColumnKind::Fold {
                chain,
                op: FoldOp::ListString,
                content: Some(content),
            },
        })
    }

    /// List fold that keeps a configured default entity first.
    pub fn fold_front_list(
        name: impl Into<String>,
        title: impl Into<String>,
        schema: &Schema,
        chain: Chain,
        content: ColumnId,
        front_key: i64,
    ) -> Result<Self> {
        Self::check_fold_content(schema, &chain, content)?;
        Ok(CompositeColumn {
            name: name.into(),
            title: title.into(),
            content_type: ContentType::String,
            suffix: None,
            statistical: false,
            enum_binding: None,
            kind: ColumnKind::Fold {
                chain,
                op: FoldOp::FrontList { front_key },
                content: Some(content),
            },
        })
    }

    fn check_fold_content(schema: &Schema, chain: &Chain, content: ColumnId) -> Result<()> {
        if content.table != chain.target_table() {
            return Err(ViewError::column_config(
                "fold content column must live in the chain's target table",
            ));
        }
        let _ = schema.column(content);
        Ok(())
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn as_statistical(mut self) -> Self {
        self.statistical = true;
        self
    }

    // ------------------------------------------------------------------
    // Contracts
    // ------------------------------------------------------------------

    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    /// Whether the column's cells must be computed all at once.
    pub fn is_interdependent(&self) -> bool {
        matches!(self.kind, ColumnKind::Index { .. } | ColumnKind::Ordinal { .. })
    }

    /// The base table this column's rows are addressed in (the anchor).
    pub fn anchor_table(&self) -> TableId {
        match &self.kind {
            ColumnKind::Direct { source } => source.table,
            ColumnKind::Reference { chain, .. } => chain.start_table(),
            ColumnKind::Difference { minuend, .. } => minuend.table,
            ColumnKind::DependentEnum { discerning, .. } => discerning.table,
            ColumnKind::Index { passes } => passes[0].column.table,
            ColumnKind::Ordinal { separator, .. } => separator.table,
            ColumnKind::Fold { chain, .. } => chain.start_table(),
        }
    }

    /// Base columns that, when changed, invalidate this column's cache.
    pub fn underlying_columns(&self) -> HashSet<ColumnId> {
        match &self.kind {
            ColumnKind::Direct { source } => HashSet::from([*source]),
            ColumnKind::Reference { chain, source } => {
                let mut set: HashSet<ColumnId> = chain.columns().collect();
                set.insert(*source);
                set
            }
            ColumnKind::Difference {
                minuend,
                subtrahend,
            } => HashSet::from([*minuend, *subtrahend]),
            ColumnKind::DependentEnum {
                discerning,
                displayed,
            } => HashSet::from([*discerning, *displayed]),
            ColumnKind::Index { passes } => passes.iter().map(|p| p.column).collect(),
            ColumnKind::Ordinal { passes, separator } => {
                let mut set: HashSet<ColumnId> = passes.iter().map(|p| p.column).collect();
                set.insert(*separator);
                set
            }
            ColumnKind::Fold { chain, content, .. } => {
                let mut set: HashSet<ColumnId> = chain.columns().collect();
                set.extend(*content);
                set
            }
        }
    }

    /// Compute one cell. Pure given the current base-table contents.
    ///
    /// Must not be called on interdependent columns; those go through
    /// [`CompositeColumn::compute_whole`].
    pub fn compute_cell(&self, db: &Database, row: StorageRow) -> Value {
        debug_assert!(!self.is_interdependent());
        match &self.kind {
            ColumnKind::Direct { source } => db.value_at(*source, row).clone(),
            ColumnKind::Reference { chain, source } => match chain.evaluate_forward(db, row) {
                Some(target) => db.value_at(*source, target).clone(),
                None => Value::Empty,
            },
            ColumnKind::Difference {
                minuend,
                subtrahend,
            } => {
                let a = db.value_at(*minuend, row);
                let b = db.value_at(*subtrahend, row);
                match (a, b) {
                    (Value::Int(a), Value::Int(b)) => Value::Int(a - b),
                    (Value::Date(a), Value::Date(b)) => {
                        // Inclusive day count: same date is 1 day.
                        Value::Int((*a - *b).num_days() + 1)
                    }
                    _ => Value::Empty,
                }
            }
            ColumnKind::DependentEnum {
                discerning,
                displayed,
            } => {
                let group = db.value_at(*discerning, row).as_enum();
                let member = db.value_at(*displayed, row).as_enum();
                match (group, member) {
                    (Some(group), Some(member)) => Value::EnumPair(group, member),
                    _ => Value::Empty,
                }
            }
            ColumnKind::Fold { chain, op, content } => {
                let related = chain.evaluate(db, row);
                self.fold(db, chain, *op, *content, &related)
            }
            ColumnKind::Index { .. } | ColumnKind::Ordinal { .. } => {
                unreachable!("interdependent column computed cell-wise")
            }
        }
    }

    /// Compute the entire column in anchor-storage order.
    pub fn compute_whole(&self, db: &Database) -> Vec<Value> {
        let row_count = db.row_count(self.anchor_table());
        match &self.kind {
            ColumnKind::Index { passes } => {
                let order = sorted_storage_order(db, passes);
                let mut out = vec![Value::Empty; row_count];
                for (rank, row) in order.iter().enumerate() {
                    out[row.get()] = Value::Int(rank as i64 + 1);
                }
                out
            }
            ColumnKind::Ordinal { passes, separator } => {
                let order = sorted_storage_order(db, passes);
                let mut out = vec![Value::Empty; row_count];
                let mut previous: Option<i64> = None;
                let mut counter = 0i64;
                for row in order {
                    match db.value_at(*separator, row).as_int() {
                        Some(key) => {
                            counter = if previous == Some(key) { counter + 1 } else { 1 };
                            previous = Some(key);
                            out[row.get()] = Value::Int(counter);
                        }
                        None => {
                            // Null separating key: absent ordinal, and the
                            // run is broken for the next row.
                            previous = None;
                            out[row.get()] = Value::Empty;
                        }
                    }
                }
                out
            }
            _ => (0..row_count)
                .map(|row| self.compute_cell(db, StorageRow::new(row)))
                .collect(),
        }
    }

    fn fold(
        &self,
        db: &Database,
        chain: &Chain,
        op: FoldOp,
        content: Option<ColumnId>,
        related: &HashSet<StorageRow>,
    ) -> Value {
        match op {
            FoldOp::Count => Value::Int(related.len() as i64),
            FoldOp::Sum | FoldOp::Average | FoldOp::Max | FoldOp::Min => {
                let content = content.expect("numeric fold has a content column");
                let values: Vec<i64> = related
                    .iter()
                    .filter_map(|&row| db.value_at(content, row).as_int())
                    .collect();
                if values.is_empty() {
                    return Value::Empty;
                }
                match op {
                    FoldOp::Sum => Value::Int(values.iter().sum()),
                    FoldOp::Average => {
                        let mean = values.iter().sum::<i64>() as f64 / values.len() as f64;
                        Value::Int(mean.round() as i64)
                    }
                    FoldOp::Max => Value::Int(*values.iter().max().unwrap()),
                    FoldOp::Min => Value::Int(*values.iter().min().unwrap()),
                    _ => unreachable!(),
                }
            }
            FoldOp::ListString => {
                let content = content.expect("list fold has a content column");
                let mut items: Vec<String> = related
                    .iter()
                    .filter_map(|&row| content_text(db, content, row))
                    .collect();
                items.sort_by(|a, b| cmp_text(a, b));
                if items.is_empty() {
                    Value::Empty
                } else {
                    Value::Str(items.join(", "))
                }
            }
            FoldOp::FrontList { front_key } => {
                let content = content.expect("list fold has a content column");
                let target = chain.target_table();
                let primary = db
                    .schema()
                    .primary_column(target)
                    .expect("fold target is a normal table");
                let mut front: Option<String> = None;
                let mut rest: Vec<String> = Vec::new();
                for &row in related {
                    let text = match content_text(db, content, row) {
                        Some(text) => text,
                        None => continue,
                    };
                    if db.value_at(primary, row).as_int() == Some(front_key) {
                        front = Some(text);
                    } else {
                        rest.push(text);
                    }
                }
                rest.sort_by(|a, b| cmp_text(a, b));
                let mut items = Vec::with_capacity(rest.len() + 1);
                items.extend(front);
                items.extend(rest);
                if items.is_empty() {
                    Value::Empty
                } else {
                    Value::Str(items.join(", "))
                }
            }
        }
    }
}

/// Display text of a content cell for list folds, with enum-label
/// substitution where the content column is enum-bound. `None` for `Empty`.
fn content_text(db: &Database, content: ColumnId, row: StorageRow) -> Option<String> {
    let value = db.value_at(content, row);
    if value.is_empty() {
        return None;
    }
    let def = db.schema().column(content);
    if let (Some(EnumBinding::Flat(table)), Some(index)) = (def.enum_binding, value.as_enum()) {
        if let Some(label) = db.schema().enums().label(table, index) {
            return Some(label.to_string());
        }
    }
    Some(value.plain_text())
}
