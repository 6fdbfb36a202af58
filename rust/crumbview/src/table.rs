//! Composite-table runtime.
//!
//! A [`CompositeTable`] wraps one anchor base table and maintains two
//! buffers: a raw-value cache keyed by storage order (one vector per
//! composite column) and a view-order buffer mapping display positions to
//! storage rows, rebuilt on sort/filter changes. Upstream change batches
//! mark columns dirty; recomputation is deferred until a read, a sort, or a
//! full refresh, unless the table is configured for immediate updates.
//!
//! Row additions and removals dirty every column unconditionally: positional
//! shuffling invalidates interdependent columns and folds either way, and an
//! unconditional fallback removes any reliance on caller discipline for
//! batches mixing insertions and removals.

use std::collections::HashSet;

use log::{debug, info};

use crate::composite::{CompositeColumn, SortDirection};
use crate::error::{Result, ViewError};
use crate::filter::Filter;
use crate::index::{DisplayRow, StorageRow};
use crate::schema::{EnumBinding, TableId};
use crate::store::{ChangeBatch, ChangeObserver, Database, RowChange};
use crate::value::{ContentType, Value};

/// When dirty columns are recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Recompute synchronously inside every change notification.
    Immediate,
    /// Recompute lazily on the next read, sort or refresh.
    Deferred,
}

/// Visibility classification of a composite column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnClass {
    /// Part of the UI-visible column list.
    Normal,
    /// Exported only; `position` is its insertion point among the normal
    /// columns in export order.
    ExportOnly { position: usize },
    /// User-created at runtime, appended after the normal columns.
    Custom,
}

struct Slot {
    column: CompositeColumn,
    class: ColumnClass,
}

/// Column metadata exposed to UI bindings and exporters.
#[derive(Debug, Clone, Copy)]
pub struct ColumnInfo<'a> {
    pub name: &'a str,
    pub title: &'a str,
    pub content_type: ContentType,
    pub suffix: Option<&'a str>,
    pub right_aligned: bool,
    pub statistical: bool,
    pub class: ColumnClass,
}

/// A denormalized, sortable, filterable projection of one anchor table.
pub struct CompositeTable {
    name: String,
    anchor: TableId,
    slots: Vec<Slot>,
    /// Raw-value cache, one storage-indexed vector per slot.
    cache: Vec<Vec<Value>>,
    /// Slots whose cached values may be stale.
    dirty: HashSet<usize>,
    /// Display order: position -> storage row of the anchor table.
    view: Vec<StorageRow>,
    sort: Option<(usize, SortDirection)>,
    filters: Vec<Filter>,
    selected: Option<StorageRow>,
    resorted: bool,
    mode: UpdateMode,
    storage_rows: usize,
    initialized: bool,
    last_sort_comparisons: usize,
}

impl CompositeTable {
    pub fn new(name: impl Into<String>, anchor: TableId) -> Self {
        CompositeTable {
            name: name.into(),
            anchor,
            slots: Vec::new(),
            cache: Vec::new(),
            dirty: HashSet::new(),
            view: Vec::new(),
            sort: None,
            filters: Vec::new(),
            selected: None,
            resorted: false,
            mode: UpdateMode::Deferred,
            storage_rows: 0,
            initialized: false,
            last_sort_comparisons: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn anchor(&self) -> TableId {
        self.anchor
    }

    pub fn set_update_mode(&mut self, mode: UpdateMode) {
        self.mode = mode;
    }

    // ========================================================================
    // Column management
    // ========================================================================

    /// Append a UI-visible column.
    pub fn add_column(&mut self, column: CompositeColumn) -> Result<()> {
        self.add_slot(column, ColumnClass::Normal)
    }

    /// Append an export-only column inserted at `position` among the normal
    /// columns in export order.
    pub fn add_export_column(&mut self, position: usize, column: CompositeColumn) -> Result<()> {
        self.add_slot(column, ColumnClass::ExportOnly { position })
    }

    /// Add a user-created column at runtime. The cache entry is computed
    /// immediately so the column is readable without a full refresh.
    pub fn add_custom_column(&mut self, db: &Database, column: CompositeColumn) -> Result<()> {
        self.add_slot(column, ColumnClass::Custom)?;
        if self.initialized {
            let slot = self.slots.len() - 1;
            self.cache[slot] = self.slots[slot].column.compute_whole(db);
            self.dirty.remove(&slot);
        }
        Ok(())
    }

    /// Remove a user-created column by name. Declared columns are fixed for
    /// the lifetime of the table and cannot be removed.
    pub fn remove_custom_column(&mut self, name: &str) -> Result<()> {
        let slot = self
            .column_index(name)
            .ok_or_else(|| ViewError::UnknownColumn {
                name: name.to_string(),
            })?;
        if self.slots[slot].class != ColumnClass::Custom {
            return Err(ViewError::column_config(format!(
                "column '{}' is not a custom column",
                name
            )));
        }
        self.slots.remove(slot);
        self.cache.remove(slot);
        // Re-key the dirty set around the removed slot.
        self.dirty = self
            .dirty
            .iter()
            .filter(|&&s| s != slot)
            .map(|&s| if s > slot { s - 1 } else { s })
            .collect();
        // The active sort holds a slot index too; drop it if it sorted on the
        // removed column, shift it if it sat above.
        self.sort = match self.sort {
            Some((s, _)) if s == slot => None,
            Some((s, direction)) if s > slot => Some((s - 1, direction)),
            other => other,
        };
        Ok(())
    }

    fn add_slot(&mut self, column: CompositeColumn, class: ColumnClass) -> Result<()> {
        if column.anchor_table() != self.anchor {
            return Err(ViewError::column_config(format!(
                "column '{}' is not anchored on this table",
                column.name
            )));
        }
        if self.column_index(&column.name).is_some() {
            return Err(ViewError::DuplicateColumn {
                name: column.name.clone(),
            });
        }
        self.slots.push(Slot { column, class });
        self.cache.push(vec![Value::Empty; self.storage_rows]);
        let slot = self.slots.len() - 1;
        if self.initialized {
            self.dirty.insert(slot);
        }
        Ok(())
    }

    pub fn column_count(&self) -> usize {
        self.slots.len()
    }

    /// Index of a column by internal name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.column.name == name)
    }

    pub fn column_info(&self, slot: usize) -> ColumnInfo<'_> {
        let s = &self.slots[slot];
        ColumnInfo {
            name: &s.column.name,
            title: &s.column.title,
            content_type: s.column.content_type,
            suffix: s.column.suffix.as_deref(),
            right_aligned: s.column.content_type.right_aligned(),
            statistical: s.column.statistical,
            class: s.class,
        }
    }

    /// Slot indices in UI-visible order (normal columns, then custom).
    pub fn visible_columns(&self) -> Vec<usize> {
        let mut out: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.slots[i].class == ColumnClass::Normal)
            .collect();
        out.extend(
            (0..self.slots.len()).filter(|&i| self.slots[i].class == ColumnClass::Custom),
        );
        out
    }

    /// Slot indices in export order: export-only columns spliced into the
    /// normal list at their declared positions, custom columns last.
    pub fn export_columns(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.slots[i].class == ColumnClass::Normal)
            .collect();
        let mut exports: Vec<(usize, usize)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s.class {
                ColumnClass::ExportOnly { position } => Some((position, i)),
                _ => None,
            })
            .collect();
        exports.sort_by_key(|&(position, _)| position);
        for (inserted, (position, slot)) in exports.into_iter().enumerate() {
            let at = (position + inserted).min(order.len());
            order.insert(at, slot);
        }
        order.extend(
            (0..self.slots.len()).filter(|&i| self.slots[i].class == ColumnClass::Custom),
        );
        order
    }

    // ========================================================================
    // Initialization and lifecycle
    // ========================================================================

    /// Build the value cache and the default view order.
    ///
    /// Cost is `rows x columns` cells, announced through `progress(done,
    /// total)` so a caller can show a progress bar. Row-by-row columns fill
    /// first; interdependent columns follow in a whole-column second pass.
    pub fn initialize_with_progress(
        &mut self,
        db: &Database,
        mut progress: impl FnMut(usize, usize),
    ) {
        let rows = db.row_count(self.anchor);
        let total = rows * self.slots.len();
        info!(
            "initializing composite table '{}': {} rows x {} columns",
            self.name,
            rows,
            self.slots.len()
        );
        progress(0, total);
        let mut done = 0;

        for (i, slot) in self.slots.iter().enumerate() {
            if slot.column.is_interdependent() {
                continue;
            }
            self.cache[i] = (0..rows)
                .map(|row| slot.column.compute_cell(db, StorageRow::new(row)))
                .collect();
            done += rows;
            progress(done, total);
        }
        for (i, slot) in self.slots.iter().enumerate() {
            if !slot.column.is_interdependent() {
                continue;
            }
            self.cache[i] = slot.column.compute_whole(db);
            done += rows;
            progress(done, total);
        }

        self.storage_rows = rows;
        self.dirty.clear();
        self.view = (0..rows).map(StorageRow::new).collect();
        self.sort = None;
        self.filters.clear();
        self.initialized = true;
    }

    pub fn initialize(&mut self, db: &Database) {
        self.initialize_with_progress(db, |_, _| {});
    }

    /// Drop all cached data (project closed). Column identity is kept.
    pub fn clear(&mut self) {
        for column in &mut self.cache {
            column.clear();
        }
        self.dirty.clear();
        self.view.clear();
        self.sort = None;
        self.filters.clear();
        self.selected = None;
        self.storage_rows = 0;
        self.initialized = false;
    }

    // ========================================================================
    // Row access
    // ========================================================================

    /// Number of rows in the current view (after filtering).
    pub fn row_count(&self) -> usize {
        self.view.len()
    }

    /// Number of rows in the underlying storage buffer.
    pub fn storage_row_count(&self) -> usize {
        self.storage_rows
    }

    /// Storage row shown at a display position. Panics when out of bounds
    /// (caller contract).
    pub fn storage_of(&self, row: DisplayRow) -> StorageRow {
        self.view[row.get()]
    }

    /// Current display position of a storage row, if it passes the filters.
    pub fn display_index_of(&self, row: StorageRow) -> Option<DisplayRow> {
        self.view.iter().position(|&r| r == row).map(DisplayRow::new)
    }

    /// Raw cached value at a display position, recomputing a dirty cell on
    /// demand (the whole column for interdependent kinds).
    pub fn raw_value(&mut self, db: &Database, row: DisplayRow, slot: usize) -> &Value {
        let storage = self.view[row.get()];
        self.ensure_cell(db, storage, slot);
        &self.cache[slot][storage.get()]
    }

    /// Formatted value: enum-label substitution, plain rendering, suffix.
    /// Formatting is applied at display time only, never cached.
    pub fn formatted_value(&mut self, db: &Database, row: DisplayRow, slot: usize) -> String {
        let storage = self.view[row.get()];
        self.ensure_cell(db, storage, slot);
        let value = &self.cache[slot][storage.get()];
        let column = &self.slots[slot].column;
        let mut text = match (column.enum_binding, value) {
            (Some(EnumBinding::Flat(table)), _) => match value.as_enum() {
                Some(index) => db
                    .schema()
                    .enums()
                    .label(table, index)
                    .unwrap_or_default()
                    .to_string(),
                None => String::new(),
            },
            (Some(EnumBinding::Dual(table)), Value::EnumPair(group, member)) => db
                .schema()
                .enums()
                .dual_label(table, *group, *member)
                .unwrap_or_default()
                .to_string(),
            _ => value.plain_text(),
        };
        if !text.is_empty() {
            if let Some(suffix) = &column.suffix {
                text.push_str(suffix);
            }
        }
        text
    }

    /// Whether a column currently awaits recomputation.
    pub fn is_dirty(&self, name: &str) -> bool {
        self.column_index(name)
            .map(|slot| self.dirty.contains(&slot))
            .unwrap_or(false)
    }

    /// Snapshot of dirty column names, for diagnostics and tests.
    pub fn dirty_columns(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .dirty
            .iter()
            .map(|&slot| self.slots[slot].column.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    fn ensure_cell(&mut self, db: &Database, storage: StorageRow, slot: usize) {
        if !self.dirty.contains(&slot) {
            return;
        }
        if self.slots[slot].column.is_interdependent() {
            self.cache[slot] = self.slots[slot].column.compute_whole(db);
            self.dirty.remove(&slot);
        } else {
            // Only this cell is known fresh afterwards; the column stays
            // dirty for the remaining cells.
            self.cache[slot][storage.get()] =
                self.slots[slot].column.compute_cell(db, storage);
        }
    }

    fn ensure_column(&mut self, db: &Database, slot: usize) {
        if self.dirty.contains(&slot) {
            self.cache[slot] = self.slots[slot].column.compute_whole(db);
            self.dirty.remove(&slot);
        }
    }

    /// Recompute every dirty column and rebuild the view.
    pub fn refresh(&mut self, db: &Database) {
        let dirty: Vec<usize> = self.dirty.iter().copied().collect();
        for slot in dirty {
            self.ensure_column(db, slot);
        }
        self.rebuild_view(db);
    }

    // ========================================================================
    // Sorting
    // ========================================================================

    /// Sort the view by a column.
    ///
    /// Flipping the direction of the active sort column reverses the view
    /// in place without a single comparator call; anything else runs a
    /// stable sort over the column's type-aware comparison. Active filters
    /// are not re-applied: they operate on the same index set, only the
    /// relative order changes.
    pub fn sort(&mut self, db: &Database, slot: usize, direction: SortDirection) {
        if let Some((current, current_dir)) = self.sort {
            if current == slot && current_dir != direction {
                self.view.reverse();
                self.sort = Some((slot, direction));
                self.last_sort_comparisons = 0;
                self.resorted = true;
                debug!("sort '{}': reversed in place", self.name);
                return;
            }
        }
        self.sort_view(db, slot, direction);
        self.sort = Some((slot, direction));
        self.resorted = true;
    }

    pub fn sort_by_name(
        &mut self,
        db: &Database,
        name: &str,
        direction: SortDirection,
    ) -> Result<()> {
        let slot = self
            .column_index(name)
            .ok_or_else(|| ViewError::UnknownColumn {
                name: name.to_string(),
            })?;
        self.sort(db, slot, direction);
        Ok(())
    }

    /// Active sort, if any.
    pub fn current_sort(&self) -> Option<(usize, SortDirection)> {
        self.sort
    }

    /// Comparator invocations of the most recent sort; 0 for the in-place
    /// reverse shortcut.
    pub fn last_sort_comparisons(&self) -> usize {
        self.last_sort_comparisons
    }

    /// True once after each reorder of the view (sort, filter, refresh), so
    /// a bound view knows to relocate its selection.
    pub fn take_resorted(&mut self) -> bool {
        std::mem::take(&mut self.resorted)
    }

    fn sort_view(&mut self, db: &Database, slot: usize, direction: SortDirection) {
        self.ensure_column(db, slot);
        let content_type = self.slots[slot].column.content_type;
        let cache = &self.cache[slot];
        let mut comparisons = 0usize;
        self.view.sort_by(|&a, &b| {
            comparisons += 1;
            let ord = cache[a.get()].cmp_for(&cache[b.get()], content_type);
            match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        });
        self.last_sort_comparisons = comparisons;
    }

    // ========================================================================
    // Filtering
    // ========================================================================

    /// Replace the active filter set and rebuild the view.
    ///
    /// When the previous set was empty the existing view is narrowed in
    /// place; otherwise the view is repopulated from all storage rows first.
    /// Each filter removes failing rows scanning the view in reverse, then
    /// the active sort is re-applied.
    pub fn apply_filters(&mut self, db: &Database, filters: Vec<Filter>) -> Result<()> {
        let resolved: Vec<usize> = filters
            .iter()
            .map(|f| {
                self.column_index(&f.column)
                    .ok_or_else(|| ViewError::UnknownColumn {
                        name: f.column.clone(),
                    })
            })
            .collect::<Result<_>>()?;

        let narrowing = self.filters.is_empty() && !filters.is_empty();
        if !narrowing {
            self.view = (0..self.storage_rows).map(StorageRow::new).collect();
        }
        for (filter, &slot) in filters.iter().zip(&resolved) {
            self.ensure_column(db, slot);
            for i in (0..self.view.len()).rev() {
                let value = &self.cache[slot][self.view[i].get()];
                if !filter.condition.matches(value) {
                    self.view.remove(i);
                }
            }
        }
        debug!(
            "filters on '{}': {} of {} rows pass",
            self.name,
            self.view.len(),
            self.storage_rows
        );
        self.filters = filters;
        if let Some((slot, direction)) = self.sort {
            self.sort_view(db, slot, direction);
        }
        self.resorted = true;
        Ok(())
    }

    pub fn clear_filters(&mut self, db: &Database) {
        // Infallible: an empty filter set references no columns.
        let _ = self.apply_filters(db, Vec::new());
    }

    pub fn active_filters(&self) -> &[Filter] {
        &self.filters
    }

    fn rebuild_view(&mut self, db: &Database) {
        let filters = std::mem::take(&mut self.filters);
        self.view = (0..self.storage_rows).map(StorageRow::new).collect();
        // Filters were validated when first applied.
        let _ = self.apply_filters(db, filters);
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Remember the selected storage row so it can be relocated after a
    /// resort or filter change.
    pub fn set_selected_row(&mut self, row: Option<StorageRow>) {
        self.selected = row;
    }

    pub fn selected_row(&self) -> Option<StorageRow> {
        self.selected
    }

    pub fn selected_display_row(&self) -> Option<DisplayRow> {
        self.selected.and_then(|row| self.display_index_of(row))
    }

    // ========================================================================
    // Change propagation
    // ========================================================================

    fn handle_batch(&mut self, db: &Database, batch: &ChangeBatch) {
        if !self.initialized {
            return;
        }
        if batch.table == self.anchor && batch.has_row_changes() {
            for &(row, change) in &batch.row_changes {
                match change {
                    RowChange::Added => self.row_added(row),
                    RowChange::Removed => self.row_removed(row),
                }
            }
            // Any anchor row change invalidates every column: positions
            // shifted, ranks and folds are stale either way.
            self.dirty = (0..self.slots.len()).collect();
        } else {
            // Cell updates anywhere, and row changes in other tables the
            // chains cross. Row-change batches report every column of
            // their table as changed, so one intersection test covers both.
            for (slot, s) in self.slots.iter().enumerate() {
                if !self.dirty.contains(&slot)
                    && s.column
                        .underlying_columns()
                        .intersection(&batch.changed_columns)
                        .next()
                        .is_some()
                {
                    self.dirty.insert(slot);
                }
            }
        }
        debug!(
            "'{}' received batch: {} dirty columns",
            self.name,
            self.dirty.len()
        );
        if self.mode == UpdateMode::Immediate {
            self.refresh(db);
        }
    }

    fn row_added(&mut self, row: StorageRow) {
        for column in &mut self.cache {
            column.insert(row.get(), Value::Empty);
        }
        for entry in &mut self.view {
            if *entry >= row {
                *entry = entry.shifted_up();
            }
        }
        // New rows join the view at the end until the next resort; active
        // filters get a chance to drop them on the next rebuild.
        self.view.push(row);
        if let Some(selected) = self.selected {
            if selected >= row {
                self.selected = Some(selected.shifted_up());
            }
        }
        self.storage_rows += 1;
    }

    fn row_removed(&mut self, row: StorageRow) {
        for column in &mut self.cache {
            column.remove(row.get());
        }
        self.view.retain(|&entry| entry != row);
        for entry in &mut self.view {
            if *entry > row {
                *entry = entry.shifted_down();
            }
        }
        match self.selected {
            Some(selected) if selected == row => self.selected = None,
            Some(selected) if selected > row => {
                self.selected = Some(selected.shifted_down());
            }
            _ => {}
        }
        self.storage_rows -= 1;
    }
}

impl ChangeObserver for CompositeTable {
    fn notify(&mut self, db: &Database, batch: &ChangeBatch) {
        self.handle_batch(db, batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::SortPass;
    use crate::crumbs::{Breadcrumb, Chain};
    use crate::filter::FilterCondition;
    use crate::schema::{ColumnDef, ColumnId, SchemaBuilder, TableKind};

    struct Fixture {
        db: Database,
        regions: TableId,
        peaks: TableId,
        ascents: TableId,
        region_pk: ColumnId,
        region_name: ColumnId,
        peak_pk: ColumnId,
        peak_name: ColumnId,
        peak_height: ColumnId,
        peak_region: ColumnId,
        ascent_peak: ColumnId,
    }

    /// regions: 1 "R", 2 "S"
    /// peaks: 10 "Rigi" 1798m region R, 11 "Pilatus" 2128m region R,
    ///        12 "Säntis" 2502m region S
    /// ascents: counts {0, 2, 5} across peaks 10, 11, 12
    fn fixture() -> Fixture {
        let mut b = SchemaBuilder::new();
        let regions = b.table("regions", TableKind::Normal);
        let region_pk = b.column(regions, ColumnDef::primary("region_id", "Region ID"));
        let region_name = b.column(
            regions,
            ColumnDef::value("name", "Name", ContentType::String),
        );

        let peaks = b.table("peaks", TableKind::Normal);
        let peak_pk = b.column(peaks, ColumnDef::primary("peak_id", "Peak ID"));
        let peak_name = b.column(
            peaks,
            ColumnDef::value("name", "Name", ContentType::String),
        );
        let peak_height = b.column(
            peaks,
            ColumnDef::value("height", "Height", ContentType::Integer),
        );
        let peak_region = b.column(peaks, ColumnDef::foreign("region_id", "Region", region_pk));

        let ascents = b.table("ascents", TableKind::Normal);
        b.column(ascents, ColumnDef::primary("ascent_id", "Ascent ID"));
        let ascent_peak = b.column(ascents, ColumnDef::foreign("peak_id", "Peak", peak_pk));

        let mut db = Database::new(b.finish().unwrap());
        for (id, name) in [(1, "R"), (2, "S")] {
            db.insert_row(regions, vec![Value::Int(id), Value::Str(name.into())])
                .unwrap();
        }
        for (id, name, height, region) in [
            (10, "Rigi", 1798, 1),
            (11, "Pilatus", 2128, 1),
            (12, "Säntis", 2502, 2),
        ] {
            db.insert_row(
                peaks,
                vec![
                    Value::Int(id),
                    Value::Str(name.into()),
                    Value::Int(height),
                    Value::Int(region),
                ],
            )
            .unwrap();
        }
        // Peak 10: 0 ascents, peak 11: 2, peak 12: 5.
        let mut next = 100;
        for (peak, count) in [(11, 2), (12, 5)] {
            for _ in 0..count {
                db.insert_row(ascents, vec![Value::Int(next), Value::Int(peak)])
                    .unwrap();
                next += 1;
            }
        }

        Fixture {
            db,
            regions,
            peaks,
            ascents,
            region_pk,
            region_name,
            peak_pk,
            peak_name,
            peak_height,
            peak_region,
            ascent_peak,
        }
    }

    fn peaks_view(f: &Fixture) -> CompositeTable {
        let schema = f.db.schema();
        let mut view = CompositeTable::new("peaks", f.peaks);
        view.add_column(CompositeColumn::direct("name", "Name", schema, f.peak_name))
            .unwrap();
        view.add_column(
            CompositeColumn::direct("height", "Height", schema, f.peak_height)
                .with_suffix(" m"),
        )
        .unwrap();
        let region_chain = Chain::forward(
            vec![Breadcrumb::new(f.peak_region, f.region_pk, schema).unwrap()],
            schema,
        )
        .unwrap();
        view.add_column(
            CompositeColumn::reference("region", "Region", schema, region_chain, f.region_name)
                .unwrap(),
        )
        .unwrap();
        let ascents_chain = Chain::new(
            vec![Breadcrumb::new(f.peak_pk, f.ascent_peak, schema).unwrap()],
            schema,
        )
        .unwrap();
        view.add_column(
            CompositeColumn::fold_count("num_ascents", "Ascents", ascents_chain).as_statistical(),
        )
        .unwrap();
        view.add_column(
            CompositeColumn::index(
                "height_rank",
                "Height rank",
                vec![SortPass {
                    column: f.peak_height,
                    direction: SortDirection::Descending,
                }],
            )
            .unwrap(),
        )
        .unwrap();
        view.initialize(&f.db);
        view
    }

    fn display(view: &mut CompositeTable, db: &Database, col: &str) -> Vec<String> {
        let slot = view.column_index(col).unwrap();
        (0..view.row_count())
            .map(|i| view.formatted_value(db, DisplayRow::new(i), slot))
            .collect()
    }

    #[test]
    fn test_initialize_announces_rows_times_columns() {
        let f = fixture();
        let schema = f.db.schema();
        let mut view = CompositeTable::new("peaks", f.peaks);
        view.add_column(CompositeColumn::direct("name", "Name", schema, f.peak_name))
            .unwrap();
        view.add_column(CompositeColumn::direct(
            "height",
            "Height",
            schema,
            f.peak_height,
        ))
        .unwrap();
        let mut announced = 0;
        let mut calls = 0;
        view.initialize_with_progress(&f.db, |_, total| {
            announced = total;
            calls += 1;
        });
        assert_eq!(announced, 3 * 2);
        assert!(calls >= 2);
        assert_eq!(view.row_count(), 3);
    }

    #[test]
    fn test_raw_and_formatted_reads() {
        let f = fixture();
        let mut view = peaks_view(&f);
        let height = view.column_index("height").unwrap();
        assert_eq!(
            view.raw_value(&f.db, DisplayRow::new(0), height),
            &Value::Int(1798)
        );
        // Suffix applies at display time only.
        assert_eq!(
            view.formatted_value(&f.db, DisplayRow::new(0), height),
            "1798 m"
        );
        assert_eq!(display(&mut view, &f.db, "region"), vec!["R", "R", "S"]);
        assert_eq!(
            display(&mut view, &f.db, "num_ascents"),
            vec!["0", "2", "5"]
        );
        assert_eq!(
            display(&mut view, &f.db, "height_rank"),
            vec!["3", "2", "1"]
        );
    }

    #[test]
    fn test_sort_and_reverse_shortcut() {
        let f = fixture();
        let mut view = peaks_view(&f);
        view.sort_by_name(&f.db, "height", SortDirection::Ascending)
            .unwrap();
        assert!(view.take_resorted());
        assert_eq!(
            display(&mut view, &f.db, "name"),
            vec!["Rigi", "Pilatus", "Säntis"]
        );

        // Direction flip: exact reverse, zero comparator calls.
        view.sort_by_name(&f.db, "height", SortDirection::Descending)
            .unwrap();
        assert_eq!(view.last_sort_comparisons(), 0);
        assert_eq!(
            display(&mut view, &f.db, "name"),
            vec!["Säntis", "Pilatus", "Rigi"]
        );
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let f = fixture();
        let mut db = f.db.clone();
        // Three peaks with equal height, distinct names, in storage order.
        for (id, name) in [(20, "Aiguille"), (21, "Bietschhorn"), (22, "Clariden")] {
            db.insert_row(
                f.peaks,
                vec![
                    Value::Int(id),
                    Value::Str(name.into()),
                    Value::Int(3000),
                    Value::Empty,
                ],
            )
            .unwrap();
        }
        let mut view = peaks_view(&f);
        // Rebuild against the extended database.
        view.initialize(&db);
        view.sort_by_name(&db, "height", SortDirection::Ascending)
            .unwrap();
        let names = display(&mut view, &db, "name");
        let a = names.iter().position(|n| n == "Aiguille").unwrap();
        let b = names.iter().position(|n| n == "Bietschhorn").unwrap();
        let c = names.iter().position(|n| n == "Clariden").unwrap();
        assert!(a < b && b < c);
        // Equal keys are adjacent.
        assert_eq!(c - a, 2);
    }

    #[test]
    fn test_selection_relocated_after_sort() {
        let f = fixture();
        let mut view = peaks_view(&f);
        let santis = f.db.row_for_primary_key(f.peaks, 12).unwrap();
        view.set_selected_row(Some(santis));
        assert_eq!(view.selected_display_row(), Some(DisplayRow::new(2)));
        view.sort_by_name(&f.db, "height", SortDirection::Descending)
            .unwrap();
        assert_eq!(view.selected_display_row(), Some(DisplayRow::new(0)));
    }

    #[test]
    fn test_filters_narrow_then_rebuild() {
        let f = fixture();
        let mut view = peaks_view(&f);
        view.apply_filters(
            &f.db,
            vec![Filter::new("height", FilterCondition::IntBetween(2000, 3000))],
        )
        .unwrap();
        assert_eq!(display(&mut view, &f.db, "name"), vec!["Pilatus", "Säntis"]);

        // Replacing the filter set rebuilds from all storage rows.
        view.apply_filters(
            &f.db,
            vec![Filter::new(
                "region",
                FilterCondition::StringContains("r".to_string()),
            )],
        )
        .unwrap();
        assert_eq!(display(&mut view, &f.db, "name"), vec!["Rigi", "Pilatus"]);

        view.clear_filters(&f.db);
        assert_eq!(view.row_count(), 3);

        // Unknown column name is rejected.
        assert!(view
            .apply_filters(&f.db, vec![Filter::new("nope", FilterCondition::IsEmpty)])
            .is_err());
    }

    #[test]
    fn test_filter_then_sort_keeps_order() {
        let f = fixture();
        let mut view = peaks_view(&f);
        view.sort_by_name(&f.db, "height", SortDirection::Descending)
            .unwrap();
        view.apply_filters(
            &f.db,
            vec![Filter::new("region", FilterCondition::StringContains("R".into()))],
        )
        .unwrap();
        // Sort survives the filter change.
        assert_eq!(display(&mut view, &f.db, "name"), vec!["Pilatus", "Rigi"]);
    }

    #[test]
    fn test_cell_update_dirties_only_dependents() {
        let f = fixture();
        let mut db = f.db.clone();
        let mut view = peaks_view(&f);
        let row = db.row_for_primary_key(f.peaks, 10).unwrap();
        let batch = db
            .update_cells(row, vec![(f.peak_height, Value::Int(1800))])
            .unwrap();
        view.notify(&db, &batch);

        // height (direct) and height_rank (index pass) depend on the
        // changed column; name, region and num_ascents stay clean.
        assert_eq!(view.dirty_columns(), vec!["height", "height_rank"]);

        // Lazy recompute on read.
        let slot = view.column_index("height").unwrap();
        let display_row = view.display_index_of(row).unwrap();
        assert_eq!(view.raw_value(&db, display_row, slot), &Value::Int(1800));
    }

    #[test]
    fn test_row_change_dirties_everything() {
        let f = fixture();
        let mut db = f.db.clone();
        let mut view = peaks_view(&f);
        let batch = db
            .insert_row(
                f.peaks,
                vec![
                    Value::Int(13),
                    Value::Str("Titlis".into()),
                    Value::Int(3238),
                    Value::Int(2),
                ],
            )
            .unwrap();
        view.notify(&db, &batch);
        assert_eq!(view.dirty_columns().len(), view.column_count());
        assert_eq!(view.storage_row_count(), 4);

        // Reads see the new row after lazy recomputation.
        let row = db.row_for_primary_key(f.peaks, 13).unwrap();
        let display_row = view.display_index_of(row).unwrap();
        let name = view.column_index("name").unwrap();
        assert_eq!(
            view.raw_value(&db, display_row, name),
            &Value::Str("Titlis".into())
        );
        let rank = view.column_index("height_rank").unwrap();
        assert_eq!(view.raw_value(&db, display_row, rank), &Value::Int(1));
    }

    #[test]
    fn test_immediate_mode_recomputes_in_notify() {
        let f = fixture();
        let mut db = f.db.clone();
        let mut view = peaks_view(&f);
        view.set_update_mode(UpdateMode::Immediate);
        let row = db.row_for_primary_key(f.peaks, 10).unwrap();
        let batch = db
            .update_cells(row, vec![(f.peak_height, Value::Int(4000))])
            .unwrap();
        view.notify(&db, &batch);
        assert!(view.dirty_columns().is_empty());
    }

    #[test]
    fn test_other_table_batch_marks_crossing_columns() {
        let f = fixture();
        let mut db = f.db.clone();
        let mut view = peaks_view(&f);
        let batch = db
            .insert_row(f.regions, vec![Value::Int(3), Value::Str("T".into())])
            .unwrap();
        view.notify(&db, &batch);
        // Only the reference column crosses into the regions table; the
        // anchor's own buffers are untouched.
        assert_eq!(view.dirty_columns(), vec!["region"]);
        assert_eq!(view.storage_row_count(), 3);
        assert_eq!(view.row_count(), 3);
    }

    #[test]
    fn test_region_ascent_counts_end_to_end() {
        // CountFold anchored on regions, traversing regions -> peaks ->
        // ascents: region R holds peaks with 0 and 2 ascents, region S the
        // peak with 5.
        let f = fixture();
        let schema = f.db.schema();
        let chain = Chain::new(
            vec![
                Breadcrumb::new(f.region_pk, f.peak_region, schema).unwrap(),
                Breadcrumb::new(f.peak_pk, f.ascent_peak, schema).unwrap(),
            ],
            schema,
        )
        .unwrap();
        let mut view = CompositeTable::new("regions", f.regions);
        view.add_column(CompositeColumn::direct("name", "Name", schema, f.region_name))
            .unwrap();
        view.add_column(CompositeColumn::fold_count("ascents", "Ascents", chain))
            .unwrap();
        view.initialize(&f.db);

        assert_eq!(display(&mut view, &f.db, "ascents"), vec!["2", "5"]);

        // Adding an ascent on a region-R peak propagates through the chain
        // even though the batch targets a non-anchor table.
        let mut db = f.db.clone();
        let batch = db
            .insert_row(f.ascents, vec![Value::Int(900), Value::Int(10)])
            .unwrap();
        view.notify(&db, &batch);
        assert_eq!(view.dirty_columns(), vec!["ascents"]);
        assert_eq!(display(&mut view, &db, "ascents"), vec!["3", "5"]);
    }

    #[test]
    fn test_custom_columns_add_remove() {
        let f = fixture();
        let schema = f.db.schema();
        let mut view = peaks_view(&f);
        view.add_custom_column(
            &f.db,
            CompositeColumn::direct("height2", "Height again", schema, f.peak_height),
        )
        .unwrap();
        assert_eq!(
            display(&mut view, &f.db, "height2"),
            vec!["1798", "2128", "2502"]
        );
        // Custom columns appear after normal ones in visible order.
        let visible = view.visible_columns();
        assert_eq!(*visible.last().unwrap(), view.column_index("height2").unwrap());

        view.remove_custom_column("height2").unwrap();
        assert!(view.column_index("height2").is_none());
        // Declared columns cannot be removed.
        assert!(view.remove_custom_column("height").is_err());
    }

    #[test]
    fn test_remove_custom_column_fixes_active_sort() {
        let f = fixture();
        let schema = f.db.schema();
        let mut view = peaks_view(&f);
        view.add_custom_column(
            &f.db,
            CompositeColumn::direct("height2", "Height again", schema, f.peak_height),
        )
        .unwrap();
        view.add_custom_column(
            &f.db,
            CompositeColumn::direct("name2", "Name again", schema, f.peak_name),
        )
        .unwrap();

        // Sorting on the removed column itself: the sort is dropped, and
        // re-applying filters (which re-runs the active sort) must not touch
        // the vacated slot. With no sort left the rebuild lands on storage
        // order.
        view.sort_by_name(&f.db, "name2", SortDirection::Descending)
            .unwrap();
        view.remove_custom_column("name2").unwrap();
        view.clear_filters(&f.db);
        assert_eq!(
            display(&mut view, &f.db, "name"),
            vec!["Rigi", "Pilatus", "Säntis"]
        );

        // Sorting on a column above a removed slot: the stored index shifts
        // down with the column and the sort stays live.
        view.add_custom_column(
            &f.db,
            CompositeColumn::direct("name2", "Name again", schema, f.peak_name),
        )
        .unwrap();
        view.sort_by_name(&f.db, "name2", SortDirection::Ascending)
            .unwrap();
        view.remove_custom_column("height2").unwrap();
        view.clear_filters(&f.db);
        assert_eq!(
            display(&mut view, &f.db, "name"),
            vec!["Pilatus", "Rigi", "Säntis"]
        );
    }

    #[test]
    fn test_export_order_splices_export_columns() {
        let f = fixture();
        let schema = f.db.schema();
        let mut view = CompositeTable::new("peaks", f.peaks);
        view.add_column(CompositeColumn::direct("name", "Name", schema, f.peak_name))
            .unwrap();
        view.add_column(CompositeColumn::direct(
            "height",
            "Height",
            schema,
            f.peak_height,
        ))
        .unwrap();
        view.add_export_column(
            1,
            CompositeColumn::direct("peak_id", "Peak ID", schema, f.peak_pk),
        )
        .unwrap();
        view.initialize(&f.db);

        let order: Vec<&str> = view
            .export_columns()
            .into_iter()
            .map(|slot| view.column_info(slot).name)
            .collect();
        assert_eq!(order, vec!["name", "peak_id", "height"]);
        // Export-only columns stay out of the visible list.
        let visible: Vec<&str> = view
            .visible_columns()
            .into_iter()
            .map(|slot| view.column_info(slot).name)
            .collect();
        assert_eq!(visible, vec!["name", "height"]);
    }

    #[test]
    fn test_clear_resets_buffers() {
        let f = fixture();
        let mut view = peaks_view(&f);
        view.clear();
        assert_eq!(view.row_count(), 0);
        assert_eq!(view.storage_row_count(), 0);
        // Column identity survives the reset.
        assert!(view.column_index("name").is_some());
    }
}
