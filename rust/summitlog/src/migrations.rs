use log::info;
use rusqlite::{Connection, Result};

/// Migration: add foot_elevation column to the peaks table.
/// Needed for the prominence column; older files predate it.
pub fn migrate_add_foot_elevation(conn: &Connection) -> Result<()> {
    // Check if migration already ran
    let column_exists: i64 = conn
        .prepare("SELECT COUNT(*) FROM pragma_table_info('peaks') WHERE name = 'foot_elevation'")?
        .query_row([], |row| row.get(0))?;

    if column_exists > 0 {
        return Ok(());
    }

    info!("Running migration: add_foot_elevation");
    conn.execute("ALTER TABLE peaks ADD COLUMN foot_elevation INTEGER", [])?;
    info!("Migration add_foot_elevation completed");

    Ok(())
}

/// Check if migration is needed.
pub fn needs_foot_elevation_migration(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .prepare("SELECT COUNT(*) FROM pragma_table_info('peaks') WHERE name = 'foot_elevation'")?
        .query_row([], |row| row.get(0))?;

    Ok(count == 0)
}
