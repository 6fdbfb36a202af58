//! # Crumbview
//!
//! In-process derived-view engine for relational application data.
//!
//! Base tables live in column-major buffers owned by an explicit
//! [`Database`]. Composite tables project one anchor table into a
//! denormalized, sortable, filterable view whose cells pull values across
//! foreign/primary-key chains ("breadcrumbs"), aggregate over related rows,
//! or rank rows against each other. Mutations flow back as one
//! [`ChangeBatch`] per logical change; affected composite columns go dirty
//! and recompute lazily.
//!
//! ## Quick Start
//!
//! ```rust
//! use crumbview::{
//!     ColumnDef, CompositeColumn, CompositeTable, ContentType, Database,
//!     SchemaBuilder, TableKind, Value,
//! };
//!
//! let mut b = SchemaBuilder::new();
//! let peaks = b.table("peaks", TableKind::Normal);
//! let pk = b.column(peaks, ColumnDef::primary("peak_id", "Peak ID"));
//! let name = b.column(peaks, ColumnDef::value("name", "Name", ContentType::String));
//! let mut db = Database::new(b.finish().unwrap());
//! db.insert_row(peaks, vec![Value::Int(1), Value::Str("Rigi".into())]).unwrap();
//!
//! let mut view = CompositeTable::new("peaks", peaks);
//! view.add_column(CompositeColumn::direct("name", "Name", db.schema(), name)).unwrap();
//! view.initialize(&db);
//! assert_eq!(view.row_count(), 1);
//! # let _ = pk;
//! ```

// Unified error handling
pub mod error;
pub use error::{Result, ViewError};

// Disjoint row-handle newtypes
pub mod index;
pub use index::{DisplayRow, StorageRow};

// Cell values and semantic content types
pub mod value;
pub use value::{cmp_text, ContentType, Value};

// Static table/column/enum-table descriptions
pub mod schema;
pub use schema::{
    ColumnDef, ColumnId, ColumnRole, DualEnumTableId, EnumBinding, EnumRegistry, EnumTableId,
    Schema, SchemaBuilder, TableDef, TableId, TableKind,
};

// Base-table buffers and change notification
pub mod store;
pub use store::{ChangeBatch, ChangeObserver, Database, RowChange};

// Breadcrumb hops and chain traversal
pub mod crumbs;
pub use crumbs::{Breadcrumb, Chain, Direction};

// Composite-column computation kinds
pub mod composite;
pub use composite::{CompositeColumn, FoldOp, SortDirection, SortPass};

// Per-column view filters
pub mod filter;
pub use filter::{Filter, FilterCondition};

// Composite-table runtime (dual buffers, sort, filter, dirty tracking)
pub mod table;
pub use table::{ColumnClass, ColumnInfo, CompositeTable, UpdateMode};
