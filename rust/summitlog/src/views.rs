//! Composite-view definitions.
//!
//! Three views cover the UI surfaces: the chronological ascent log, the
//! peak list with per-peak aggregates, and per-region statistics. Each
//! builder wires breadcrumb chains against [`LogbookSchema`] handles and
//! returns an uninitialized [`CompositeTable`]; the caller initializes it
//! against a loaded database.

use crumbview::{
    Breadcrumb, Chain, CompositeColumn, CompositeTable, FoldOp, Result, SortDirection, SortPass,
};

use crate::schema::LogbookSchema;

/// Chronological ascent log, anchored on the ascents table.
///
/// `own_hiker` is the logbook owner's hiker id; the companion list keeps
/// that entry first.
pub fn ascent_log(ls: &LogbookSchema, own_hiker: i64) -> Result<CompositeTable> {
    let s = &ls.schema;
    let mut view = CompositeTable::new("ascent_log", ls.ascents);

    // Running ascent number in date order, ties broken by start time.
    view.add_column(CompositeColumn::index(
        "number",
        "No.",
        vec![
            SortPass {
                column: ls.ascent_date,
                direction: SortDirection::Ascending,
            },
            SortPass {
                column: ls.ascent_time,
                direction: SortDirection::Ascending,
            },
        ],
    )?)?;
    view.add_column(CompositeColumn::direct("date", "Date", s, ls.ascent_date))?;
    view.add_column(CompositeColumn::reference(
        "peak",
        "Peak",
        s,
        Chain::forward(vec![Breadcrumb::new(ls.ascent_peak, ls.peak_pk, s)?], s)?,
        ls.peak_name,
    )?)?;
    view.add_column(CompositeColumn::reference(
        "country",
        "Country",
        s,
        Chain::forward(
            vec![
                Breadcrumb::new(ls.ascent_peak, ls.peak_pk, s)?,
                Breadcrumb::new(ls.peak_region, ls.region_pk, s)?,
                Breadcrumb::new(ls.region_country, ls.country_pk, s)?,
            ],
            s,
        )?,
        ls.country_name,
    )?)?;
    view.add_column(CompositeColumn::direct("kind", "Kind", s, ls.ascent_kind))?;
    view.add_column(CompositeColumn::dependent_enum(
        "grade",
        "Grade",
        s,
        ls.ascent_grade_system,
        ls.ascent_grade,
    )?)?;
    // Which peak of its trip this ascent is; empty outside trips.
    view.add_column(CompositeColumn::ordinal(
        "peak_of_trip",
        "Peak of trip",
        s,
        vec![
            SortPass {
                column: ls.ascent_trip,
                direction: SortDirection::Ascending,
            },
            SortPass {
                column: ls.ascent_date,
                direction: SortDirection::Ascending,
            },
            SortPass {
                column: ls.ascent_time,
                direction: SortDirection::Ascending,
            },
        ],
        ls.ascent_trip,
    )?)?;
    view.add_column(CompositeColumn::fold_front_list(
        "hikers",
        "Hikers",
        s,
        Chain::new(
            vec![
                Breadcrumb::new(ls.ascent_pk, ls.ah_ascent, s)?,
                Breadcrumb::new(ls.ah_hiker, ls.hiker_pk, s)?,
            ],
            s,
        )?,
        ls.hiker_name,
        own_hiker,
    )?)?;
    // Stable identifier for exports, ahead of every visible column.
    view.add_export_column(
        0,
        CompositeColumn::direct("ascent_id", "Ascent ID", s, ls.ascent_pk),
    )?;
    Ok(view)
}

/// Peak list with per-peak aggregates, anchored on the peaks table.
pub fn peak_list(ls: &LogbookSchema) -> Result<CompositeTable> {
    let s = &ls.schema;
    let mut view = CompositeTable::new("peak_list", ls.peaks);

    view.add_column(CompositeColumn::direct("name", "Peak", s, ls.peak_name))?;
    view.add_column(
        CompositeColumn::direct("height", "Height", s, ls.peak_height)
            .with_suffix(" m")
            .as_statistical(),
    )?;
    view.add_column(
        CompositeColumn::difference("prominence", "Prominence", s, ls.peak_height, ls.peak_foot)?
            .with_suffix(" m")
            .as_statistical(),
    )?;
    view.add_column(CompositeColumn::reference(
        "region",
        "Region",
        s,
        Chain::forward(vec![Breadcrumb::new(ls.peak_region, ls.region_pk, s)?], s)?,
        ls.region_name,
    )?)?;
    view.add_column(
        CompositeColumn::fold_count(
            "ascents",
            "Ascents",
            Chain::new(vec![Breadcrumb::new(ls.peak_pk, ls.ascent_peak, s)?], s)?,
        )
        .as_statistical(),
    )?;
    // Everyone who stood on the summit, across all logged ascents.
    view.add_column(CompositeColumn::fold_list(
        "climbed_by",
        "Climbed by",
        s,
        Chain::new(
            vec![
                Breadcrumb::new(ls.peak_pk, ls.ascent_peak, s)?,
                Breadcrumb::new(ls.ascent_pk, ls.ah_ascent, s)?,
                Breadcrumb::new(ls.ah_hiker, ls.hiker_pk, s)?,
            ],
            s,
        )?,
        ls.hiker_name,
    )?)?;
    Ok(view)
}

/// Per-region statistics, anchored on the regions table.
pub fn region_stats(ls: &LogbookSchema) -> Result<CompositeTable> {
    let s = &ls.schema;
    let mut view = CompositeTable::new("region_stats", ls.regions);

    view.add_column(CompositeColumn::direct("name", "Region", s, ls.region_name))?;
    view.add_column(CompositeColumn::reference(
        "country",
        "Country",
        s,
        Chain::forward(
            vec![Breadcrumb::new(ls.region_country, ls.country_pk, s)?],
            s,
        )?,
        ls.country_name,
    )?)?;
    let peaks_chain = || Chain::new(vec![Breadcrumb::new(ls.region_pk, ls.peak_region, s)?], s);
    view.add_column(
        CompositeColumn::fold_count("peaks", "Peaks", peaks_chain()?).as_statistical(),
    )?;
    view.add_column(
        CompositeColumn::fold_numeric(
            "highest",
            "Highest peak",
            s,
            peaks_chain()?,
            FoldOp::Max,
            ls.peak_height,
        )?
        .with_suffix(" m")
        .as_statistical(),
    )?;
    view.add_column(
        CompositeColumn::fold_numeric(
            "avg_height",
            "Avg height",
            s,
            peaks_chain()?,
            FoldOp::Average,
            ls.peak_height,
        )?
        .with_suffix(" m")
        .as_statistical(),
    )?;
    Ok(view)
}
