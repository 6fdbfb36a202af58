//! Table and column metadata.
//!
//! Tables and columns are described once, up front, and addressed through
//! plain integer handles ([`TableId`], [`ColumnId`]) resolved against the
//! [`Schema`] — no back-references between objects, so buffers can be reset
//! or rebuilt without aliasing hazards.
//!
//! Structural invariants are validated when the schema is finished:
//! - a column is a key column if and only if its content type is `Ident`;
//! - a foreign key names the primary-key column it references, and that
//!   column lives in a different table;
//! - a normal table has exactly one single-column primary key;
//! - an associative table's primary key consists entirely of foreign keys.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewError};
use crate::value::ContentType;

// ============================================================================
// Handles
// ============================================================================

/// Handle of a base table within a [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(usize);

impl TableId {
    pub fn get(self) -> usize {
        self.0
    }
}

/// Handle of a base column: owning table plus position within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnId {
    pub table: TableId,
    pub index: usize,
}

// ============================================================================
// Enum lookup tables
// ============================================================================

/// Handle of a flat enum lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumTableId(usize);

/// Handle of a two-level (dual) enum lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DualEnumTableId(usize);

/// Which lookup table an enum-typed column resolves its labels against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnumBinding {
    Flat(EnumTableId),
    Dual(DualEnumTableId),
}

/// A flat label list. Indices are 1-based; index < 1 means "unset".
#[derive(Debug, Clone)]
pub struct EnumTable {
    pub name: String,
    pub labels: Vec<String>,
}

/// A two-level label table: a discerning group selects a nested label list.
#[derive(Debug, Clone)]
pub struct DualEnumTable {
    pub name: String,
    /// (group label, member labels); both levels are 1-based.
    pub groups: Vec<(String, Vec<String>)>,
}

/// Registry of static enum lookup tables referenced by columns.
#[derive(Debug, Clone, Default)]
pub struct EnumRegistry {
    flat: Vec<EnumTable>,
    dual: Vec<DualEnumTable>,
}

impl EnumRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_flat(&mut self, name: impl Into<String>, labels: Vec<String>) -> EnumTableId {
        self.flat.push(EnumTable {
            name: name.into(),
            labels,
        });
        EnumTableId(self.flat.len() - 1)
    }

    pub fn add_dual(
        &mut self,
        name: impl Into<String>,
        groups: Vec<(String, Vec<String>)>,
    ) -> DualEnumTableId {
        self.dual.push(DualEnumTable {
            name: name.into(),
            groups,
        });
        DualEnumTableId(self.dual.len() - 1)
    }

    /// Label for a 1-based flat enum index, if valid.
    pub fn label(&self, table: EnumTableId, index: i32) -> Option<&str> {
        if index < 1 {
            return None;
        }
        self.flat
            .get(table.0)
            .and_then(|t| t.labels.get(index as usize - 1))
            .map(String::as_str)
    }

    /// Group label for a 1-based dual enum group index, if valid.
    pub fn group_label(&self, table: DualEnumTableId, group: i32) -> Option<&str> {
        if group < 1 {
            return None;
        }
        self.dual
            .get(table.0)
            .and_then(|t| t.groups.get(group as usize - 1))
            .map(|(label, _)| label.as_str())
    }

    /// Member label for a 1-based (group, member) dual enum pair, if valid.
    pub fn dual_label(&self, table: DualEnumTableId, group: i32, member: i32) -> Option<&str> {
        if group < 1 || member < 1 {
            return None;
        }
        self.dual
            .get(table.0)
            .and_then(|t| t.groups.get(group as usize - 1))
            .and_then(|(_, members)| members.get(member as usize - 1))
            .map(String::as_str)
    }
}

// ============================================================================
// Column and table definitions
// ============================================================================

/// Distinguishes endpoint-capable tables from transparent join tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    /// Single-column primary key; may start or end a breadcrumb chain.
    Normal,
    /// Composite primary key formed entirely of foreign keys; represents a
    /// many-to-many relation and is passed through transparently.
    Associative,
}

/// Key role of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnRole {
    /// Plain value column, no key semantics.
    Value,
    /// Primary key of its table.
    Primary,
    /// Foreign key referencing a primary-key column elsewhere.
    Foreign { references: ColumnId },
    /// Part of a composite primary key and a foreign key at the same time
    /// (associative tables).
    PrimaryForeign { references: ColumnId },
}

impl ColumnRole {
    pub fn is_key(self) -> bool {
        !matches!(self, ColumnRole::Value)
    }

    pub fn is_primary(self) -> bool {
        matches!(self, ColumnRole::Primary | ColumnRole::PrimaryForeign { .. })
    }

    pub fn is_foreign(self) -> bool {
        matches!(self, ColumnRole::Foreign { .. } | ColumnRole::PrimaryForeign { .. })
    }

    /// The primary-key column a foreign key points at.
    pub fn references(self) -> Option<ColumnId> {
        match self {
            ColumnRole::Foreign { references } | ColumnRole::PrimaryForeign { references } => {
                Some(references)
            }
            _ => None,
        }
    }
}

/// Definition of one base-table column.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    /// Stable internal name, unique within the table.
    pub name: String,
    /// Human-readable display name.
    pub title: String,
    pub content_type: ContentType,
    pub role: ColumnRole,
    /// Lookup table for `Enum`/`DualEnum` columns.
    pub enum_binding: Option<EnumBinding>,
}

impl ColumnDef {
    pub fn value(name: impl Into<String>, title: impl Into<String>, ct: ContentType) -> Self {
        ColumnDef {
            name: name.into(),
            title: title.into(),
            content_type: ct,
            role: ColumnRole::Value,
            enum_binding: None,
        }
    }

    pub fn primary(name: impl Into<String>, title: impl Into<String>) -> Self {
        ColumnDef {
            name: name.into(),
            title: title.into(),
            content_type: ContentType::Ident,
            role: ColumnRole::Primary,
            enum_binding: None,
        }
    }

    pub fn foreign(
        name: impl Into<String>,
        title: impl Into<String>,
        references: ColumnId,
    ) -> Self {
        ColumnDef {
            name: name.into(),
            title: title.into(),
            content_type: ContentType::Ident,
            role: ColumnRole::Foreign { references },
            enum_binding: None,
        }
    }

    pub fn primary_foreign(
        name: impl Into<String>,
        title: impl Into<String>,
        references: ColumnId,
    ) -> Self {
        ColumnDef {
            name: name.into(),
            title: title.into(),
            content_type: ContentType::Ident,
            role: ColumnRole::PrimaryForeign { references },
            enum_binding: None,
        }
    }

    pub fn with_enum(mut self, binding: EnumBinding) -> Self {
        self.enum_binding = Some(binding);
        self
    }
}

/// Definition of one base table.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    pub kind: TableKind,
    pub columns: Vec<ColumnDef>,
}

// ============================================================================
// Schema
// ============================================================================

/// Immutable description of all base tables, columns and enum lookups.
#[derive(Debug, Clone)]
pub struct Schema {
    tables: Vec<TableDef>,
    enums: EnumRegistry,
}

impl Schema {
    pub fn table(&self, id: TableId) -> &TableDef {
        &self.tables[id.0]
    }

    pub fn column(&self, id: ColumnId) -> &ColumnDef {
        &self.tables[id.table.0].columns[id.index]
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn column_count(&self, table: TableId) -> usize {
        self.tables[table.0].columns.len()
    }

    pub fn tables(&self) -> impl Iterator<Item = (TableId, &TableDef)> {
        self.tables.iter().enumerate().map(|(i, t)| (TableId(i), t))
    }

    pub fn enums(&self) -> &EnumRegistry {
        &self.enums
    }

    /// Find a table by name.
    pub fn table_by_name(&self, name: &str) -> Option<TableId> {
        self.tables.iter().position(|t| t.name == name).map(TableId)
    }

    /// Find a column by name within a table.
    pub fn column_by_name(&self, table: TableId, name: &str) -> Option<ColumnId> {
        self.tables[table.0]
            .columns
            .iter()
            .position(|c| c.name == name)
            .map(|index| ColumnId { table, index })
    }

    /// The single primary-key column of a normal table.
    ///
    /// `None` for associative tables (their key is composite).
    pub fn primary_column(&self, table: TableId) -> Option<ColumnId> {
        let def = &self.tables[table.0];
        if def.kind != TableKind::Normal {
            return None;
        }
        def.columns
            .iter()
            .position(|c| c.role == ColumnRole::Primary)
            .map(|index| ColumnId { table, index })
    }
}

/// Builder collecting table definitions before validation.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    tables: Vec<TableDef>,
    enums: EnumRegistry,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enums_mut(&mut self) -> &mut EnumRegistry {
        &mut self.enums
    }

    /// Declare a table; columns are added afterwards in order.
    pub fn table(&mut self, name: impl Into<String>, kind: TableKind) -> TableId {
        self.tables.push(TableDef {
            name: name.into(),
            kind,
            columns: Vec::new(),
        });
        TableId(self.tables.len() - 1)
    }

    /// Append a column to a declared table, returning its handle.
    pub fn column(&mut self, table: TableId, def: ColumnDef) -> ColumnId {
        let columns = &mut self.tables[table.0].columns;
        columns.push(def);
        ColumnId {
            table,
            index: columns.len() - 1,
        }
    }

    /// Validate all structural invariants and freeze the schema.
    pub fn finish(self) -> Result<Schema> {
        let tables = &self.tables;
        for (ti, table) in tables.iter().enumerate() {
            let mut seen = HashSet::new();
            for col in &table.columns {
                if !seen.insert(col.name.as_str()) {
                    return Err(ViewError::DuplicateColumn {
                        name: format!("{}.{}", table.name, col.name),
                    });
                }
                // Key role and Ident type imply each other.
                if col.role.is_key() != col.content_type.is_key_type() {
                    return Err(ViewError::schema(format!(
                        "column '{}.{}' mixes key role and content type",
                        table.name, col.name
                    )));
                }
                if let Some(target) = col.role.references() {
                    let target_table = tables.get(target.table.0).ok_or_else(|| {
                        ViewError::schema(format!(
                            "foreign key '{}.{}' references unknown table",
                            table.name, col.name
                        ))
                    })?;
                    if target.table.0 == ti {
                        return Err(ViewError::schema(format!(
                            "foreign key '{}.{}' references its own table",
                            table.name, col.name
                        )));
                    }
                    let target_col = target_table.columns.get(target.index).ok_or_else(|| {
                        ViewError::schema(format!(
                            "foreign key '{}.{}' references unknown column",
                            table.name, col.name
                        ))
                    })?;
                    if !target_col.role.is_primary() {
                        return Err(ViewError::schema(format!(
                            "foreign key '{}.{}' must reference a primary key",
                            table.name, col.name
                        )));
                    }
                }
                match col.content_type {
                    // A flat binding resolves the label directly; a dual
                    // binding marks a grade column whose labels depend on a
                    // sibling discerning column (DependentEnum composite).
                    ContentType::Enum => {
                        if col.enum_binding.is_none() {
                            return Err(ViewError::schema(format!(
                                "enum column '{}.{}' needs an enum binding",
                                table.name, col.name
                            )));
                        }
                    }
                    ContentType::DualEnum => {
                        if !matches!(col.enum_binding, Some(EnumBinding::Dual(_))) {
                            return Err(ViewError::schema(format!(
                                "dual enum column '{}.{}' needs a dual enum binding",
                                table.name, col.name
                            )));
                        }
                    }
                    _ => {}
                }
            }

            let primaries: Vec<&ColumnDef> = table
                .columns
                .iter()
                .filter(|c| c.role.is_primary())
                .collect();
            match table.kind {
                TableKind::Normal => {
                    if primaries.len() != 1 || primaries[0].role != ColumnRole::Primary {
                        return Err(ViewError::schema(format!(
                            "normal table '{}' needs exactly one plain primary key",
                            table.name
                        )));
                    }
                }
                TableKind::Associative => {
                    if primaries.len() < 2
                        || !primaries
                            .iter()
                            .all(|c| matches!(c.role, ColumnRole::PrimaryForeign { .. }))
                    {
                        return Err(ViewError::schema(format!(
                            "associative table '{}' needs a composite key of foreign keys",
                            table.name
                        )));
                    }
                }
            }
        }

        Ok(Schema {
            tables: self.tables,
            enums: self.enums,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_table_builder() -> (SchemaBuilder, TableId, ColumnId) {
        let mut b = SchemaBuilder::new();
        let regions = b.table("regions", TableKind::Normal);
        let region_pk = b.column(regions, ColumnDef::primary("region_id", "Region ID"));
        b.column(
            regions,
            ColumnDef::value("name", "Name", ContentType::String),
        );
        (b, regions, region_pk)
    }

    #[test]
    fn test_valid_schema() {
        let (mut b, _, region_pk) = two_table_builder();
        let peaks = b.table("peaks", TableKind::Normal);
        b.column(peaks, ColumnDef::primary("peak_id", "Peak ID"));
        b.column(peaks, ColumnDef::foreign("region_id", "Region", region_pk));
        let schema = b.finish().unwrap();
        assert_eq!(schema.table_count(), 2);

        let peaks = schema.table_by_name("peaks").unwrap();
        let fk = schema.column_by_name(peaks, "region_id").unwrap();
        assert_eq!(schema.column(fk).role.references(), Some(region_pk));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let (mut b, regions, _) = two_table_builder();
        b.column(
            regions,
            ColumnDef::value("name", "Name again", ContentType::String),
        );
        assert!(matches!(
            b.finish(),
            Err(ViewError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn test_key_type_invariant() {
        let (mut b, regions, _) = two_table_builder();
        // A string-typed "primary key" violates the key/type invariant.
        let mut bad = ColumnDef::primary("code", "Code");
        bad.content_type = ContentType::String;
        b.column(regions, bad);
        assert!(b.finish().is_err());
    }

    #[test]
    fn test_self_reference_rejected() {
        let mut b = SchemaBuilder::new();
        let t = b.table("loops", TableKind::Normal);
        let pk = b.column(t, ColumnDef::primary("id", "ID"));
        b.column(t, ColumnDef::foreign("parent_id", "Parent", pk));
        assert!(b.finish().is_err());
    }

    #[test]
    fn test_associative_needs_composite_fk_key() {
        let (mut b, _, region_pk) = two_table_builder();
        let assoc = b.table("links", TableKind::Associative);
        b.column(assoc, ColumnDef::primary_foreign("region_id", "Region", region_pk));
        // Only one key part: invalid.
        assert!(b.finish().is_err());
    }

    #[test]
    fn test_enum_registry_lookup() {
        let mut enums = EnumRegistry::new();
        let kinds = enums.add_flat("hike_kind", vec!["Normal".into(), "Ski".into()]);
        assert_eq!(enums.label(kinds, 1), Some("Normal"));
        assert_eq!(enums.label(kinds, 2), Some("Ski"));
        assert_eq!(enums.label(kinds, 0), None);
        assert_eq!(enums.label(kinds, 3), None);

        let grades = enums.add_dual(
            "difficulty",
            vec![("SAC".into(), vec!["T1".into(), "T2".into()])],
        );
        assert_eq!(enums.dual_label(grades, 1, 2), Some("T2"));
        assert_eq!(enums.group_label(grades, 1), Some("SAC"));
        assert_eq!(enums.dual_label(grades, 1, 3), None);
        assert_eq!(enums.dual_label(grades, 0, 1), None);
    }
}
