//! Summitlog - peak-ascent logbook built on the crumbview engine.
//!
//! This crate provides:
//! - The domain schema (countries, regions, peaks, hikers, trips, ascents)
//! - Composite-view definitions for the ascent log, peak list and region
//!   statistics
//! - SQLite persistence with write-through mutations

// Unified application error
pub mod error;
pub use error::{LogbookError, Result};

// Base-table schema and enum lookup tables
pub mod schema;
pub use schema::LogbookSchema;

// Composite-view definitions
pub mod views;
pub use views::{ascent_log, peak_list, region_stats};

// SQLite persistence layer
pub mod persistence;
pub use persistence::{AscentRecord, LogbookStore};

// Schema migrations for older logbook files
pub mod migrations;

// The engine object owning database, store and views
pub mod logbook;
pub use logbook::Logbook;
