//! The logbook engine.
//!
//! [`Logbook`] ties the pieces together: it owns the SQLite store, the
//! in-memory [`Database`] and the three composite views, and routes every
//! mutation through all of them. Mutations write to SQLite first, then
//! mutate the buffers, then hand the resulting change batch to each view.

use chrono::NaiveDate;
use log::info;

use crumbview::{
    Breadcrumb, Chain, ChangeBatch, ChangeObserver, CompositeTable, Database, StorageRow, Value,
};

use crate::error::{LogbookError, Result};
use crate::persistence::{AscentRecord, LogbookStore};
use crate::schema::LogbookSchema;
use crate::views;

pub struct Logbook {
    ls: LogbookSchema,
    db: Database,
    store: LogbookStore,
    ascent_log: CompositeTable,
    peak_list: CompositeTable,
    region_stats: CompositeTable,
}

impl Logbook {
    /// Open (or create) a logbook file and build all views.
    ///
    /// `own_hiker` is the owner's hiker id, kept first in companion lists.
    pub fn open(path: &std::path::Path, own_hiker: i64) -> Result<Self> {
        let store = LogbookStore::open(path)?;
        Self::with_store(store, own_hiker)
    }

    /// In-memory logbook, mainly for tests and previews.
    pub fn open_in_memory(own_hiker: i64) -> Result<Self> {
        let store = LogbookStore::open_in_memory()?;
        Self::with_store(store, own_hiker)
    }

    fn with_store(store: LogbookStore, own_hiker: i64) -> Result<Self> {
        let ls = LogbookSchema::build()?;
        let db = store.load(&ls)?;
        let mut ascent_log = views::ascent_log(&ls, own_hiker)?;
        let mut peak_list = views::peak_list(&ls)?;
        let mut region_stats = views::region_stats(&ls)?;
        ascent_log.initialize(&db);
        peak_list.initialize(&db);
        region_stats.initialize(&db);
        info!("logbook open: {} ascents", db.row_count(ls.ascents));
        Ok(Logbook {
            ls,
            db,
            store,
            ascent_log,
            peak_list,
            region_stats,
        })
    }

    pub fn schema(&self) -> &LogbookSchema {
        &self.ls
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The ascent log view, paired with the database it reads from.
    pub fn ascent_log(&mut self) -> (&Database, &mut CompositeTable) {
        (&self.db, &mut self.ascent_log)
    }

    pub fn peak_list(&mut self) -> (&Database, &mut CompositeTable) {
        (&self.db, &mut self.peak_list)
    }

    pub fn region_stats(&mut self) -> (&Database, &mut CompositeTable) {
        (&self.db, &mut self.region_stats)
    }

    fn dispatch(&mut self, batch: &ChangeBatch) {
        self.ascent_log.notify(&self.db, batch);
        self.peak_list.notify(&self.db, batch);
        self.region_stats.notify(&self.db, batch);
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub fn add_country(&mut self, id: i64, name: &str) -> Result<()> {
        self.store.insert_country(id, name)?;
        let batch = self.db.insert_row(
            self.ls.countries,
            vec![Value::Int(id), Value::Str(name.to_string())],
        )?;
        self.dispatch(&batch);
        Ok(())
    }

    pub fn add_region(&mut self, id: i64, name: &str, country: Option<i64>) -> Result<()> {
        self.store.insert_region(id, name, country)?;
        let batch = self.db.insert_row(
            self.ls.regions,
            vec![Value::Int(id), Value::Str(name.to_string()), opt_int(country)],
        )?;
        self.dispatch(&batch);
        Ok(())
    }

    pub fn add_peak(
        &mut self,
        id: i64,
        name: &str,
        height: Option<i64>,
        foot_elevation: Option<i64>,
        region: Option<i64>,
    ) -> Result<()> {
        self.store
            .insert_peak(id, name, height, foot_elevation, region)?;
        let batch = self.db.insert_row(
            self.ls.peaks,
            vec![
                Value::Int(id),
                Value::Str(name.to_string()),
                opt_int(height),
                opt_int(foot_elevation),
                opt_int(region),
            ],
        )?;
        self.dispatch(&batch);
        Ok(())
    }

    pub fn add_hiker(&mut self, id: i64, name: &str) -> Result<()> {
        self.store.insert_hiker(id, name)?;
        let batch = self.db.insert_row(
            self.ls.hikers,
            vec![Value::Int(id), Value::Str(name.to_string())],
        )?;
        self.dispatch(&batch);
        Ok(())
    }

    pub fn add_trip(
        &mut self,
        id: i64,
        title: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<()> {
        self.store.insert_trip(id, title, start, end)?;
        let batch = self.db.insert_row(
            self.ls.trips,
            vec![
                Value::Int(id),
                Value::Str(title.to_string()),
                start.map(Value::Date).unwrap_or(Value::Empty),
                end.map(Value::Date).unwrap_or(Value::Empty),
            ],
        )?;
        self.dispatch(&batch);
        Ok(())
    }

    /// Log an ascent with its companion hikers.
    pub fn add_ascent(&mut self, record: &AscentRecord, hikers: &[i64]) -> Result<()> {
        if self.db.row_for_primary_key(self.ls.peaks, record.peak).is_none() {
            return Err(LogbookError::data(format!(
                "ascent references unknown peak {}",
                record.peak
            )));
        }
        self.store.insert_ascent(record)?;
        let batch = self.db.insert_row(
            self.ls.ascents,
            vec![
                Value::Int(record.id),
                record.date.map(Value::Date).unwrap_or(Value::Empty),
                record.start_time.map(Value::Time).unwrap_or(Value::Empty),
                record.kind.map(Value::EnumIdx).unwrap_or(Value::Empty),
                record
                    .grade_system
                    .map(Value::EnumIdx)
                    .unwrap_or(Value::Empty),
                record.grade.map(Value::EnumIdx).unwrap_or(Value::Empty),
                Value::Int(record.peak),
                opt_int(record.trip),
            ],
        )?;
        self.dispatch(&batch);
        for &hiker in hikers {
            self.store.insert_ascent_hiker(record.id, hiker)?;
            let batch = self.db.insert_row(
                self.ls.ascent_hikers,
                vec![Value::Int(record.id), Value::Int(hiker)],
            )?;
            self.dispatch(&batch);
        }
        Ok(())
    }

    /// Remove an ascent and its membership rows.
    pub fn remove_ascent(&mut self, id: i64) -> Result<()> {
        let row = self
            .db
            .row_for_primary_key(self.ls.ascents, id)
            .ok_or_else(|| LogbookError::data(format!("no ascent with id {}", id)))?;
        self.store.delete_ascent(id)?;

        // Memberships first, highest storage position first so earlier
        // removals do not shift later ones.
        let mut members = self.db.matching_rows(self.ls.ah_ascent, &Value::Int(id));
        members.sort_by(|a, b| b.cmp(a));
        for member in members {
            let batch = self.db.remove_row(self.ls.ascent_hikers, member)?;
            self.dispatch(&batch);
        }
        let batch = self.db.remove_row(self.ls.ascents, row)?;
        self.dispatch(&batch);
        Ok(())
    }

    pub fn set_peak_height(&mut self, id: i64, height: Option<i64>) -> Result<()> {
        let row = self
            .db
            .row_for_primary_key(self.ls.peaks, id)
            .ok_or_else(|| LogbookError::data(format!("no peak with id {}", id)))?;
        self.store.update_peak_height(id, height)?;
        let batch = self
            .db
            .update_cells(row, vec![(self.ls.peak_height, opt_int(height))])?;
        self.dispatch(&batch);
        Ok(())
    }

    pub fn rename_peak(&mut self, id: i64, name: &str) -> Result<()> {
        let row = self
            .db
            .row_for_primary_key(self.ls.peaks, id)
            .ok_or_else(|| LogbookError::data(format!("no peak with id {}", id)))?;
        self.store.rename_peak(id, name)?;
        let batch = self.db.update_cells(
            row,
            vec![(self.ls.peak_name, Value::Str(name.to_string()))],
        )?;
        self.dispatch(&batch);
        Ok(())
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Number of ascents a set of hikers took part in, combined.
    ///
    /// Traverses hikers -> memberships -> ascents. With several hikers an
    /// ascent they shared counts once, not once per participant.
    pub fn combined_ascent_count(&self, hiker_ids: &[i64]) -> Result<usize> {
        let s = &self.ls.schema;
        let chain = Chain::new(
            vec![
                Breadcrumb::new(self.ls.hiker_pk, self.ls.ah_hiker, s)?,
                Breadcrumb::new(self.ls.ah_ascent, self.ls.ascent_pk, s)?,
            ],
            s,
        )?;
        let starts: Vec<StorageRow> = hiker_ids
            .iter()
            .filter_map(|&id| self.db.row_for_primary_key(self.ls.hikers, id))
            .collect();
        Ok(chain.evaluate_all(&self.db, &starts).len())
    }
}

fn opt_int(value: Option<i64>) -> Value {
    value.map(Value::Int).unwrap_or(Value::Empty)
}
