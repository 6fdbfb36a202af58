//! Logbook base-table schema.
//!
//! Seven base tables model the domain: reference data (countries, regions,
//! peaks), people (hikers), outings (trips) and the log itself (ascents,
//! plus the ascent/hiker membership table). Enum lookup tables supply the
//! labels for ascent kinds and grades; grades are a dual enum whose group is
//! the grading system.

use crumbview::{
    ColumnDef, ColumnId, ContentType, DualEnumTableId, EnumBinding, EnumTableId, Result, Schema,
    SchemaBuilder, TableId, TableKind,
};

/// The validated schema plus handles to every table and column.
///
/// Built once at startup; all other modules address the database through
/// these ids instead of repeating name lookups.
pub struct LogbookSchema {
    pub schema: Schema,

    pub countries: TableId,
    pub regions: TableId,
    pub peaks: TableId,
    pub hikers: TableId,
    pub trips: TableId,
    pub ascents: TableId,
    pub ascent_hikers: TableId,

    pub country_pk: ColumnId,
    pub country_name: ColumnId,
    pub region_pk: ColumnId,
    pub region_name: ColumnId,
    pub region_country: ColumnId,
    pub peak_pk: ColumnId,
    pub peak_name: ColumnId,
    pub peak_height: ColumnId,
    pub peak_foot: ColumnId,
    pub peak_region: ColumnId,
    pub hiker_pk: ColumnId,
    pub hiker_name: ColumnId,
    pub trip_pk: ColumnId,
    pub trip_title: ColumnId,
    pub trip_start: ColumnId,
    pub trip_end: ColumnId,
    pub ascent_pk: ColumnId,
    pub ascent_date: ColumnId,
    pub ascent_time: ColumnId,
    pub ascent_kind: ColumnId,
    pub ascent_grade_system: ColumnId,
    pub ascent_grade: ColumnId,
    pub ascent_peak: ColumnId,
    pub ascent_trip: ColumnId,
    pub ah_ascent: ColumnId,
    pub ah_hiker: ColumnId,

    pub hike_kinds: EnumTableId,
    pub grade_systems: EnumTableId,
    pub grades: DualEnumTableId,
}

impl LogbookSchema {
    pub fn build() -> Result<Self> {
        let mut b = SchemaBuilder::new();

        let hike_kinds = b.enums_mut().add_flat(
            "hike_kinds",
            vec![
                "Hike".to_string(),
                "Scramble".to_string(),
                "Climb".to_string(),
                "Ski tour".to_string(),
                "Via ferrata".to_string(),
            ],
        );
        // The grade group index doubles as the grading-system index, so the
        // two enum tables must declare their systems in the same order.
        let grade_systems = b.enums_mut().add_flat(
            "grade_systems",
            vec!["SAC".to_string(), "UIAA".to_string(), "French".to_string()],
        );
        let grades = b.enums_mut().add_dual(
            "grades",
            vec![
                (
                    "SAC".to_string(),
                    vec!["T1", "T2", "T3", "T4", "T5", "T6"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                ),
                (
                    "UIAA".to_string(),
                    vec!["I", "II", "III", "IV", "V", "VI", "VII"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                ),
                (
                    "French".to_string(),
                    vec!["F", "PD", "AD", "D", "TD", "ED"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                ),
            ],
        );

        let countries = b.table("countries", TableKind::Normal);
        let country_pk = b.column(countries, ColumnDef::primary("country_id", "Country ID"));
        let country_name = b.column(
            countries,
            ColumnDef::value("name", "Country", ContentType::String),
        );

        let regions = b.table("regions", TableKind::Normal);
        let region_pk = b.column(regions, ColumnDef::primary("region_id", "Region ID"));
        let region_name = b.column(
            regions,
            ColumnDef::value("name", "Region", ContentType::String),
        );
        let region_country = b.column(
            regions,
            ColumnDef::foreign("country_id", "Country", country_pk),
        );

        let peaks = b.table("peaks", TableKind::Normal);
        let peak_pk = b.column(peaks, ColumnDef::primary("peak_id", "Peak ID"));
        let peak_name = b.column(peaks, ColumnDef::value("name", "Peak", ContentType::String));
        let peak_height = b.column(
            peaks,
            ColumnDef::value("height", "Height", ContentType::Integer),
        );
        let peak_foot = b.column(
            peaks,
            ColumnDef::value("foot_elevation", "Foot elevation", ContentType::Integer),
        );
        let peak_region = b.column(peaks, ColumnDef::foreign("region_id", "Region", region_pk));

        let hikers = b.table("hikers", TableKind::Normal);
        let hiker_pk = b.column(hikers, ColumnDef::primary("hiker_id", "Hiker ID"));
        let hiker_name = b.column(
            hikers,
            ColumnDef::value("name", "Hiker", ContentType::String),
        );

        let trips = b.table("trips", TableKind::Normal);
        let trip_pk = b.column(trips, ColumnDef::primary("trip_id", "Trip ID"));
        let trip_title = b.column(
            trips,
            ColumnDef::value("title", "Trip", ContentType::String),
        );
        let trip_start = b.column(
            trips,
            ColumnDef::value("start_date", "Start", ContentType::Date),
        );
        let trip_end = b.column(trips, ColumnDef::value("end_date", "End", ContentType::Date));

        let ascents = b.table("ascents", TableKind::Normal);
        let ascent_pk = b.column(ascents, ColumnDef::primary("ascent_id", "Ascent ID"));
        let ascent_date = b.column(
            ascents,
            ColumnDef::value("date", "Date", ContentType::Date),
        );
        let ascent_time = b.column(
            ascents,
            ColumnDef::value("start_time", "Start", ContentType::Time),
        );
        let ascent_kind = b.column(
            ascents,
            ColumnDef::value("kind", "Kind", ContentType::Enum)
                .with_enum(EnumBinding::Flat(hike_kinds)),
        );
        let ascent_grade_system = b.column(
            ascents,
            ColumnDef::value("grade_system", "Grade system", ContentType::Enum)
                .with_enum(EnumBinding::Flat(grade_systems)),
        );
        let ascent_grade = b.column(
            ascents,
            ColumnDef::value("grade", "Grade", ContentType::Enum)
                .with_enum(EnumBinding::Dual(grades)),
        );
        let ascent_peak = b.column(ascents, ColumnDef::foreign("peak_id", "Peak", peak_pk));
        let ascent_trip = b.column(ascents, ColumnDef::foreign("trip_id", "Trip", trip_pk));

        let ascent_hikers = b.table("ascent_hikers", TableKind::Associative);
        let ah_ascent = b.column(
            ascent_hikers,
            ColumnDef::primary_foreign("ascent_id", "Ascent", ascent_pk),
        );
        let ah_hiker = b.column(
            ascent_hikers,
            ColumnDef::primary_foreign("hiker_id", "Hiker", hiker_pk),
        );

        Ok(LogbookSchema {
            schema: b.finish()?,
            countries,
            regions,
            peaks,
            hikers,
            trips,
            ascents,
            ascent_hikers,
            country_pk,
            country_name,
            region_pk,
            region_name,
            region_country,
            peak_pk,
            peak_name,
            peak_height,
            peak_foot,
            peak_region,
            hiker_pk,
            hiker_name,
            trip_pk,
            trip_title,
            trip_start,
            trip_end,
            ascent_pk,
            ascent_date,
            ascent_time,
            ascent_kind,
            ascent_grade_system,
            ascent_grade,
            ascent_peak,
            ascent_trip,
            ah_ascent,
            ah_hiker,
            hike_kinds,
            grade_systems,
            grades,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_builds() {
        let ls = LogbookSchema::build().unwrap();
        assert_eq!(ls.schema.table_count(), 7);
        assert_eq!(ls.schema.table(ls.ascent_hikers).kind, TableKind::Associative);
        assert_eq!(ls.schema.primary_column(ls.peaks), Some(ls.peak_pk));
        // Associative tables have no single-column primary key.
        assert_eq!(ls.schema.primary_column(ls.ascent_hikers), None);
    }

    #[test]
    fn test_enum_labels() {
        let ls = LogbookSchema::build().unwrap();
        assert_eq!(ls.schema.enums().label(ls.hike_kinds, 3), Some("Climb"));
        assert_eq!(ls.schema.enums().group_label(ls.grades, 2), Some("UIAA"));
        assert_eq!(ls.schema.enums().dual_label(ls.grades, 2, 4), Some("IV"));
        // System indices line up between the flat and the dual table.
        assert_eq!(ls.schema.enums().label(ls.grade_systems, 2), Some("UIAA"));
    }
}
