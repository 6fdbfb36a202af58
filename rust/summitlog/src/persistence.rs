//! SQLite persistence for the logbook.
//!
//! [`LogbookStore`] owns the connection and mirrors the in-memory base
//! tables: the whole file is loaded into a [`Database`] at startup, and
//! every mutation writes through before the buffers change. Dates are
//! stored as ISO `YYYY-MM-DD` text, times as `HH:MM` text, and enum
//! indices as integers with NULL for "unset".

use chrono::{NaiveDate, NaiveTime};
use log::info;
use rusqlite::{params, Connection};

use crumbview::{Database, Value};

use crate::error::{LogbookError, Result};
use crate::migrations;
use crate::schema::LogbookSchema;

/// A full ascent row as written to and read from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct AscentRecord {
    pub id: i64,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub kind: Option<i32>,
    /// Grading-system index; doubles as the grade's group.
    pub grade_system: Option<i32>,
    /// Grade member index within the system.
    pub grade: Option<i32>,
    pub peak: i64,
    pub trip: Option<i64>,
}

pub struct LogbookStore {
    conn: Connection,
}

impl LogbookStore {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = LogbookStore { conn };
        store.init_schema()?;
        migrations::migrate_add_foot_elevation(&store.conn)?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = LogbookStore { conn };
        store.init_schema()?;
        migrations::migrate_add_foot_elevation(&store.conn)?;
        Ok(store)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS countries (
                country_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS regions (
                region_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                country_id INTEGER REFERENCES countries(country_id)
            );

            CREATE TABLE IF NOT EXISTS peaks (
                peak_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                height INTEGER,
                region_id INTEGER REFERENCES regions(region_id)
            );

            CREATE TABLE IF NOT EXISTS hikers (
                hiker_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trips (
                trip_id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                start_date TEXT,
                end_date TEXT
            );

            CREATE TABLE IF NOT EXISTS ascents (
                ascent_id INTEGER PRIMARY KEY,
                date TEXT,
                start_time TEXT,
                kind INTEGER,
                grade_system INTEGER,
                grade INTEGER,
                peak_id INTEGER NOT NULL REFERENCES peaks(peak_id),
                trip_id INTEGER REFERENCES trips(trip_id)
            );

            CREATE TABLE IF NOT EXISTS ascent_hikers (
                ascent_id INTEGER NOT NULL REFERENCES ascents(ascent_id) ON DELETE CASCADE,
                hiker_id INTEGER NOT NULL REFERENCES hikers(hiker_id),
                PRIMARY KEY (ascent_id, hiker_id)
            );

            CREATE INDEX IF NOT EXISTS idx_ascents_peak ON ascents(peak_id);
            CREATE INDEX IF NOT EXISTS idx_ascents_trip ON ascents(trip_id);
            CREATE INDEX IF NOT EXISTS idx_ascent_hikers_hiker ON ascent_hikers(hiker_id);
            "#,
        )?;
        Ok(())
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load every base table into a fresh in-memory database.
    pub fn load(&self, ls: &LogbookSchema) -> Result<Database> {
        let mut db = Database::new(ls.schema.clone());

        let mut stmt = self
            .conn
            .prepare("SELECT country_id, name FROM countries ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok(vec![
                Value::Int(row.get(0)?),
                Value::Str(row.get(1)?),
            ])
        })?;
        for row in rows {
            db.insert_row(ls.countries, row?)?;
        }

        let mut stmt = self
            .conn
            .prepare("SELECT region_id, name, country_id FROM regions ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok(vec![
                Value::Int(row.get(0)?),
                Value::Str(row.get(1)?),
                opt_int(row.get(2)?),
            ])
        })?;
        for row in rows {
            db.insert_row(ls.regions, row?)?;
        }

        let mut stmt = self.conn.prepare(
            "SELECT peak_id, name, height, foot_elevation, region_id FROM peaks ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(vec![
                Value::Int(row.get(0)?),
                Value::Str(row.get(1)?),
                opt_int(row.get(2)?),
                opt_int(row.get(3)?),
                opt_int(row.get(4)?),
            ])
        })?;
        for row in rows {
            db.insert_row(ls.peaks, row?)?;
        }

        let mut stmt = self
            .conn
            .prepare("SELECT hiker_id, name FROM hikers ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok(vec![
                Value::Int(row.get(0)?),
                Value::Str(row.get(1)?),
            ])
        })?;
        for row in rows {
            db.insert_row(ls.hikers, row?)?;
        }

        let mut stmt = self
            .conn
            .prepare("SELECT trip_id, title, start_date, end_date FROM trips ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;
        for row in rows {
            let (id, title, start, end) = row?;
            db.insert_row(
                ls.trips,
                vec![
                    Value::Int(id),
                    Value::Str(title),
                    date_value(start)?,
                    date_value(end)?,
                ],
            )?;
        }

        let mut stmt = self.conn.prepare(
            "SELECT ascent_id, date, start_time, kind, grade_system, grade, peak_id, trip_id
             FROM ascents ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<i32>>(3)?,
                row.get::<_, Option<i32>>(4)?,
                row.get::<_, Option<i32>>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, Option<i64>>(7)?,
            ))
        })?;
        for row in rows {
            let (id, date, time, kind, system, grade, peak, trip) = row?;
            db.insert_row(
                ls.ascents,
                vec![
                    Value::Int(id),
                    date_value(date)?,
                    time_value(time)?,
                    enum_value(kind),
                    enum_value(system),
                    enum_value(grade),
                    Value::Int(peak),
                    trip.map(Value::Int).unwrap_or(Value::Empty),
                ],
            )?;
        }

        let mut stmt = self
            .conn
            .prepare("SELECT ascent_id, hiker_id FROM ascent_hikers ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok(vec![
                Value::Int(row.get(0)?),
                Value::Int(row.get(1)?),
            ])
        })?;
        for row in rows {
            db.insert_row(ls.ascent_hikers, row?)?;
        }

        info!(
            "loaded logbook: {} peaks, {} ascents",
            db.row_count(ls.peaks),
            db.row_count(ls.ascents)
        );
        Ok(db)
    }

    // ========================================================================
    // Write-through mutations
    // ========================================================================

    pub fn insert_country(&self, id: i64, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO countries (country_id, name) VALUES (?1, ?2)",
            params![id, name],
        )?;
        Ok(())
    }

    pub fn insert_region(&self, id: i64, name: &str, country: Option<i64>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO regions (region_id, name, country_id) VALUES (?1, ?2, ?3)",
            params![id, name, country],
        )?;
        Ok(())
    }

    pub fn insert_peak(
        &self,
        id: i64,
        name: &str,
        height: Option<i64>,
        foot_elevation: Option<i64>,
        region: Option<i64>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO peaks (peak_id, name, height, foot_elevation, region_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, name, height, foot_elevation, region],
        )?;
        Ok(())
    }

    pub fn insert_hiker(&self, id: i64, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO hikers (hiker_id, name) VALUES (?1, ?2)",
            params![id, name],
        )?;
        Ok(())
    }

    pub fn insert_trip(
        &self,
        id: i64,
        title: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO trips (trip_id, title, start_date, end_date) VALUES (?1, ?2, ?3, ?4)",
            params![id, title, start.map(date_text), end.map(date_text)],
        )?;
        Ok(())
    }

    pub fn insert_ascent(&self, record: &AscentRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ascents (ascent_id, date, start_time, kind, grade_system, grade,
                                  peak_id, trip_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.date.map(date_text),
                record.start_time.map(time_text),
                record.kind,
                record.grade_system,
                record.grade,
                record.peak,
                record.trip,
            ],
        )?;
        Ok(())
    }

    pub fn insert_ascent_hiker(&self, ascent: i64, hiker: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ascent_hikers (ascent_id, hiker_id) VALUES (?1, ?2)",
            params![ascent, hiker],
        )?;
        Ok(())
    }

    /// Delete an ascent; memberships go with it via the cascade.
    pub fn delete_ascent(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM ascents WHERE ascent_id = ?1", params![id])?;
        Ok(())
    }

    pub fn update_peak_height(&self, id: i64, height: Option<i64>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE peaks SET height = ?2 WHERE peak_id = ?1",
            params![id, height],
        )?;
        if changed == 0 {
            return Err(LogbookError::data(format!("no peak with id {}", id)));
        }
        Ok(())
    }

    pub fn rename_peak(&self, id: i64, name: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE peaks SET name = ?2 WHERE peak_id = ?1",
            params![id, name],
        )?;
        if changed == 0 {
            return Err(LogbookError::data(format!("no peak with id {}", id)));
        }
        Ok(())
    }
}

// ============================================================================
// Value conversion
// ============================================================================

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

fn date_text(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn time_text(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn date_value(text: Option<String>) -> Result<Value> {
    match text {
        None => Ok(Value::Empty),
        Some(t) => NaiveDate::parse_from_str(&t, DATE_FORMAT)
            .map(Value::Date)
            .map_err(|e| LogbookError::data(format!("bad date '{}': {}", t, e))),
    }
}

fn time_value(text: Option<String>) -> Result<Value> {
    match text {
        None => Ok(Value::Empty),
        Some(t) => NaiveTime::parse_from_str(&t, TIME_FORMAT)
            .map(Value::Time)
            .map_err(|e| LogbookError::data(format!("bad time '{}': {}", t, e))),
    }
}

fn opt_int(value: Option<i64>) -> Value {
    value.map(Value::Int).unwrap_or(Value::Empty)
}

fn enum_value(index: Option<i32>) -> Value {
    index.map(Value::EnumIdx).unwrap_or(Value::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LogbookSchema;

    #[test]
    fn test_round_trip_in_memory() {
        let ls = LogbookSchema::build().unwrap();
        let store = LogbookStore::open_in_memory().unwrap();
        store.insert_country(1, "Switzerland").unwrap();
        store.insert_region(1, "Uri", Some(1)).unwrap();
        store
            .insert_peak(10, "Bristen", Some(3073), Some(800), Some(1))
            .unwrap();
        store.insert_hiker(1, "Norman").unwrap();
        store
            .insert_ascent(&AscentRecord {
                id: 100,
                date: NaiveDate::from_ymd_opt(2024, 8, 3),
                start_time: NaiveTime::from_hms_opt(6, 30, 0),
                kind: Some(2),
                grade_system: Some(1),
                grade: Some(4),
                peak: 10,
                trip: None,
            })
            .unwrap();
        store.insert_ascent_hiker(100, 1).unwrap();

        let db = store.load(&ls).unwrap();
        assert_eq!(db.row_count(ls.peaks), 1);
        let row = db.row_for_primary_key(ls.ascents, 100).unwrap();
        assert_eq!(
            db.value_at(ls.ascent_date, row).as_date(),
            NaiveDate::from_ymd_opt(2024, 8, 3)
        );
        assert_eq!(db.value_at(ls.ascent_grade, row).as_enum(), Some(4));
        assert_eq!(db.value_at(ls.ascent_trip, row), &Value::Empty);
    }

    #[test]
    fn test_delete_ascent_cascades() {
        let store = LogbookStore::open_in_memory().unwrap();
        store.insert_country(1, "Switzerland").unwrap();
        store.insert_region(1, "Uri", Some(1)).unwrap();
        store
            .insert_peak(10, "Bristen", None, None, Some(1))
            .unwrap();
        store.insert_hiker(1, "Norman").unwrap();
        store
            .insert_ascent(&AscentRecord {
                id: 100,
                date: None,
                start_time: None,
                kind: None,
                grade_system: None,
                grade: None,
                peak: 10,
                trip: None,
            })
            .unwrap();
        store.insert_ascent_hiker(100, 1).unwrap();
        store.delete_ascent(100).unwrap();

        let remaining: i64 = store
            .connection()
            .prepare("SELECT COUNT(*) FROM ascent_hikers")
            .unwrap()
            .query_row([], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
