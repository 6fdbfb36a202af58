//! Breadcrumb traversal.
//!
//! A [`Breadcrumb`] is one hop across a foreign-key/primary-key column pair
//! between two tables; a [`Chain`] is a validated sequence of hops mapping a
//! starting row to the set of related rows in a target table. Chains are the
//! only join mechanism in the engine: no SQL, no query planning, just
//! key-set propagation hop by hop.
//!
//! All structural problems (empty chain, broken contiguity, associative
//! endpoints, wrong orientation) are rejected at construction. Evaluation
//! itself cannot fail: missing keys and unmatched lookups simply produce
//! smaller or empty result sets.

use std::collections::HashSet;

use crate::error::{Result, ViewError};
use crate::index::StorageRow;
use crate::schema::{ColumnId, Schema, TableId, TableKind};
use crate::store::Database;
use crate::value::Value;

/// Orientation of a hop, derived from which side holds the foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// First column is the foreign key: a lookup with at most one result
    /// per input key.
    Forward,
    /// First column is the referenced primary key: a reverse search with
    /// zero, one or many results per input key.
    Backward,
}

/// One hop across a foreign/primary-key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breadcrumb {
    /// Column read in the table we are leaving.
    pub first: ColumnId,
    /// Column matched in the table we are entering.
    pub second: ColumnId,
    pub direction: Direction,
}

impl Breadcrumb {
    /// Pair two columns into a hop, deriving the orientation.
    ///
    /// Exactly one of the two must be a foreign key referencing the other;
    /// the schema already guarantees the referenced primary key lives in a
    /// different table.
    pub fn new(first: ColumnId, second: ColumnId, schema: &Schema) -> Result<Self> {
        let first_def = schema.column(first);
        let second_def = schema.column(second);

        let direction = if first_def.role.references() == Some(second) {
            Direction::Forward
        } else if second_def.role.references() == Some(first) {
            Direction::Backward
        } else {
            return Err(ViewError::breadcrumb(format!(
                "columns '{}' and '{}' are not a foreign/primary key pair",
                first_def.name, second_def.name
            )));
        };

        Ok(Breadcrumb {
            first,
            second,
            direction,
        })
    }

    /// Table this hop departs from.
    pub fn from_table(&self) -> TableId {
        self.first.table
    }

    /// Table this hop lands in.
    pub fn to_table(&self) -> TableId {
        self.second.table
    }
}

/// A validated, non-empty sequence of contiguous hops.
#[derive(Debug, Clone)]
pub struct Chain {
    hops: Vec<Breadcrumb>,
    all_forward: bool,
}

impl Chain {
    /// Validate hop contiguity and endpoint kinds.
    pub fn new(hops: Vec<Breadcrumb>, schema: &Schema) -> Result<Self> {
        if hops.is_empty() {
            return Err(ViewError::breadcrumb("chain is empty"));
        }
        for pair in hops.windows(2) {
            if pair[0].to_table() != pair[1].from_table() {
                return Err(ViewError::breadcrumb(
                    "consecutive hops are not contiguous",
                ));
            }
            if pair[1].to_table() == pair[0].from_table() {
                return Err(ViewError::breadcrumb(
                    "chain backtracks to the table just left",
                ));
            }
        }
        let start = hops.first().map(Breadcrumb::from_table).unwrap();
        let target = hops.last().map(Breadcrumb::to_table).unwrap();
        for (name, table) in [("start", start), ("target", target)] {
            if schema.table(table).kind != TableKind::Normal {
                return Err(ViewError::breadcrumb(format!(
                    "{} table '{}' is associative and cannot be a chain endpoint",
                    name,
                    schema.table(table).name
                )));
            }
        }
        let all_forward = hops.iter().all(|h| h.direction == Direction::Forward);
        Ok(Chain { hops, all_forward })
    }

    /// Validate a chain that must consist of forward hops only, as required
    /// by [`Chain::evaluate_forward`].
    pub fn forward(hops: Vec<Breadcrumb>, schema: &Schema) -> Result<Self> {
        let chain = Chain::new(hops, schema)?;
        if !chain.all_forward {
            return Err(ViewError::breadcrumb(
                "forward chain contains a backward hop",
            ));
        }
        Ok(chain)
    }

    pub fn start_table(&self) -> TableId {
        self.hops[0].from_table()
    }

    pub fn target_table(&self) -> TableId {
        self.hops[self.hops.len() - 1].to_table()
    }

    pub fn hops(&self) -> &[Breadcrumb] {
        &self.hops
    }

    pub fn is_all_forward(&self) -> bool {
        self.all_forward
    }

    /// Every base column this chain reads or matches against. Changes to
    /// any of them can invalidate results computed through the chain.
    pub fn columns(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.hops.iter().flat_map(|h| [h.first, h.second])
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Walk the chain from one start row, de-duplicating at every step.
    ///
    /// Per hop: collect the non-null first-column keys of the current rows
    /// (an empty key set short-circuits the rest of the chain), then resolve
    /// them forward (unique lookup, unmatched keys dropped) or backward
    /// (reverse search). Returns the set of related rows in the target table.
    pub fn evaluate(&self, db: &Database, start: StorageRow) -> HashSet<StorageRow> {
        let mut rows: HashSet<StorageRow> = HashSet::from([start]);
        for hop in &self.hops {
            let keys: HashSet<i64> = rows
                .iter()
                .filter_map(|&row| db.value_at(hop.first, row).as_int())
                .collect();
            if keys.is_empty() {
                return HashSet::new();
            }
            rows = match hop.direction {
                Direction::Forward => keys
                    .into_iter()
                    .filter_map(|key| db.matching_row(&[hop.second], &[Value::Int(key)]))
                    .collect(),
                Direction::Backward => keys
                    .into_iter()
                    .flat_map(|key| db.matching_rows(hop.second, &Value::Int(key)))
                    .collect(),
            };
            if rows.is_empty() {
                return rows;
            }
        }
        rows
    }

    /// Walk the chain from several start rows with multiset fidelity.
    ///
    /// Internal collections are multisets, so a related row is counted once
    /// per path that reaches it — except that immediately after any hop
    /// departing an associative table (and only when more than one start row
    /// is in play) the accumulated multiset is deduplicated. This keeps
    /// statistics from counting the same related row several times just
    /// because several paths cross the same many-to-many join table.
    pub fn evaluate_all(&self, db: &Database, starts: &[StorageRow]) -> Vec<StorageRow> {
        let prune = starts.len() > 1;
        let mut rows: Vec<StorageRow> = starts.to_vec();
        for hop in &self.hops {
            let keys: Vec<i64> = rows
                .iter()
                .filter_map(|&row| db.value_at(hop.first, row).as_int())
                .collect();
            if keys.is_empty() {
                return Vec::new();
            }
            rows = match hop.direction {
                Direction::Forward => keys
                    .into_iter()
                    .filter_map(|key| db.matching_row(&[hop.second], &[Value::Int(key)]))
                    .collect(),
                Direction::Backward => keys
                    .into_iter()
                    .flat_map(|key| db.matching_rows(hop.second, &Value::Int(key)))
                    .collect(),
            };
            if prune && db.schema().table(hop.from_table()).kind == TableKind::Associative {
                let mut seen = HashSet::new();
                rows.retain(|row| seen.insert(*row));
            }
            if rows.is_empty() {
                return rows;
            }
        }
        rows
    }

    /// Dereference an all-forward chain to its single target row.
    ///
    /// A null key at any hop yields `None` (no match, not an error). Calling
    /// this on a chain with backward hops is a caller-contract violation.
    pub fn evaluate_forward(&self, db: &Database, start: StorageRow) -> Option<StorageRow> {
        assert!(
            self.all_forward,
            "evaluate_forward requires an all-forward chain"
        );
        let mut row = start;
        for hop in &self.hops {
            let key = db.value_at(hop.first, row).as_int()?;
            row = db.matching_row(&[hop.second], &[Value::Int(key)])?;
        }
        Some(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, SchemaBuilder};
    use crate::value::ContentType;

    struct Fixture {
        db: Database,
        countries: TableId,
        regions: TableId,
        peaks: TableId,
        ascents: TableId,
        country_pk: ColumnId,
        country_name: ColumnId,
        region_pk: ColumnId,
        region_country: ColumnId,
        peak_pk: ColumnId,
        peak_region: ColumnId,
        hiker_pk: ColumnId,
        ascent_pk: ColumnId,
        ascent_peak: ColumnId,
        link_ascent: ColumnId,
        link_hiker: ColumnId,
    }

    /// countries(1 "CH") <- regions(1 -> CH, 2 -> null)
    /// peaks: 10 -> region 1, 11 -> region 1, 12 -> region 2, 13 -> null region
    /// ascents: 100/101 on peak 10, 102 on peak 12
    /// ascent_hikers: (100, 7), (100, 8), (101, 7), (102, 7)
    fn fixture() -> Fixture {
        let mut b = SchemaBuilder::new();
        let countries = b.table("countries", TableKind::Normal);
        let country_pk = b.column(countries, ColumnDef::primary("country_id", "Country ID"));
        let country_name = b.column(
            countries,
            ColumnDef::value("name", "Name", ContentType::String),
        );

        let regions = b.table("regions", TableKind::Normal);
        let region_pk = b.column(regions, ColumnDef::primary("region_id", "Region ID"));
        let region_country = b.column(
            regions,
            ColumnDef::foreign("country_id", "Country", country_pk),
        );

        let peaks = b.table("peaks", TableKind::Normal);
        let peak_pk = b.column(peaks, ColumnDef::primary("peak_id", "Peak ID"));
        let peak_region = b.column(peaks, ColumnDef::foreign("region_id", "Region", region_pk));

        let hikers = b.table("hikers", TableKind::Normal);
        let hiker_pk = b.column(hikers, ColumnDef::primary("hiker_id", "Hiker ID"));

        let ascents = b.table("ascents", TableKind::Normal);
        let ascent_pk = b.column(ascents, ColumnDef::primary("ascent_id", "Ascent ID"));
        let ascent_peak = b.column(ascents, ColumnDef::foreign("peak_id", "Peak", peak_pk));

        let links = b.table("ascent_hikers", TableKind::Associative);
        let link_ascent = b.column(
            links,
            ColumnDef::primary_foreign("ascent_id", "Ascent", ascent_pk),
        );
        let link_hiker = b.column(
            links,
            ColumnDef::primary_foreign("hiker_id", "Hiker", hiker_pk),
        );

        let mut db = Database::new(b.finish().unwrap());
        db.insert_row(countries, vec![Value::Int(1), Value::Str("CH".into())])
            .unwrap();
        db.insert_row(regions, vec![Value::Int(1), Value::Int(1)])
            .unwrap();
        db.insert_row(regions, vec![Value::Int(2), Value::Empty])
            .unwrap();
        for (peak, region) in [
            (10, Value::Int(1)),
            (11, Value::Int(1)),
            (12, Value::Int(2)),
            (13, Value::Empty),
        ] {
            db.insert_row(peaks, vec![Value::Int(peak), region]).unwrap();
        }
        for hiker in [7, 8] {
            db.insert_row(hikers, vec![Value::Int(hiker)]).unwrap();
        }
        for (ascent, peak) in [(100, 10), (101, 10), (102, 12)] {
            db.insert_row(ascents, vec![Value::Int(ascent), Value::Int(peak)])
                .unwrap();
        }
        for (ascent, hiker) in [(100, 7), (100, 8), (101, 7), (102, 7)] {
            db.insert_row(links, vec![Value::Int(ascent), Value::Int(hiker)])
                .unwrap();
        }

        Fixture {
            db,
            countries,
            regions,
            peaks,
            ascents,
            country_pk,
            country_name,
            region_pk,
            region_country,
            peak_pk,
            peak_region,
            hiker_pk,
            ascent_pk,
            ascent_peak,
            link_ascent,
            link_hiker,
        }
    }

    fn hop(f: &Fixture, first: ColumnId, second: ColumnId) -> Breadcrumb {
        Breadcrumb::new(first, second, f.db.schema()).unwrap()
    }

    #[test]
    fn test_hop_orientation() {
        let f = fixture();
        let forward = hop(&f, f.peak_region, f.region_pk);
        assert_eq!(forward.direction, Direction::Forward);
        let backward = hop(&f, f.region_pk, f.peak_region);
        assert_eq!(backward.direction, Direction::Backward);

        // Two unrelated key columns do not form a hop.
        assert!(Breadcrumb::new(f.peak_pk, f.region_pk, f.db.schema()).is_err());
    }

    #[test]
    fn test_chain_construction_errors() {
        let f = fixture();
        let schema = f.db.schema();
        assert!(Chain::new(vec![], schema).is_err());

        // Non-contiguous: peaks->regions followed by ascents->peaks.
        let h1 = hop(&f, f.peak_region, f.region_pk);
        let h2 = hop(&f, f.ascent_peak, f.peak_pk);
        assert!(Chain::new(vec![h1, h2], schema).is_err());

        // Immediate backtrack: peaks->regions->peaks.
        let there = hop(&f, f.peak_region, f.region_pk);
        let back = hop(&f, f.region_pk, f.peak_region);
        assert!(Chain::new(vec![there, back], schema).is_err());

        // Associative endpoint: ascents -> ascent_hikers stops in the
        // associative table.
        let into_links = hop(&f, f.ascent_pk, f.link_ascent);
        assert!(Chain::new(vec![into_links], schema).is_err());

        // Backward hop rejected by the forward constructor.
        let backward = hop(&f, f.region_pk, f.peak_region);
        assert!(Chain::forward(vec![backward], schema).is_err());
    }

    #[test]
    fn test_forward_chain_dereference() {
        let f = fixture();
        let chain = Chain::forward(
            vec![
                hop(&f, f.ascent_peak, f.peak_pk),
                hop(&f, f.peak_region, f.region_pk),
                hop(&f, f.region_country, f.country_pk),
            ],
            f.db.schema(),
        )
        .unwrap();
        assert_eq!(chain.start_table(), f.ascents);
        assert_eq!(chain.target_table(), f.countries);

        // Ascent 100 -> peak 10 -> region 1 -> country CH.
        let start = f.db.row_for_primary_key(f.ascents, 100).unwrap();
        let country = chain.evaluate_forward(&f.db, start).unwrap();
        assert_eq!(
            f.db.value_at(f.country_name, country).as_str(),
            Some("CH")
        );

        // Ascent 102 -> peak 12 -> region 2 has no country set.
        let start = f.db.row_for_primary_key(f.ascents, 102).unwrap();
        assert!(chain.evaluate_forward(&f.db, start).is_none());
    }

    #[test]
    fn test_forward_evaluate_never_grows() {
        let f = fixture();
        let chain = Chain::new(
            vec![
                hop(&f, f.ascent_peak, f.peak_pk),
                hop(&f, f.peak_region, f.region_pk),
            ],
            f.db.schema(),
        )
        .unwrap();
        for ascent in [100, 101, 102] {
            let start = f.db.row_for_primary_key(f.ascents, ascent).unwrap();
            let result = chain.evaluate(&f.db, start);
            assert!(result.len() <= 1);
        }
    }

    #[test]
    fn test_backward_hop_cardinality() {
        let f = fixture();
        let chain = Chain::new(vec![hop(&f, f.region_pk, f.peak_region)], f.db.schema()).unwrap();

        // Region 1 has two peaks, region 2 has one.
        let r1 = f.db.row_for_primary_key(f.regions, 1).unwrap();
        assert_eq!(chain.evaluate(&f.db, r1).len(), 2);
        let r2 = f.db.row_for_primary_key(f.regions, 2).unwrap();
        assert_eq!(chain.evaluate(&f.db, r2).len(), 1);

        // A region with no peaks yields the empty set.
        let mut db = f.db.clone();
        db.insert_row(f.regions, vec![Value::Int(3), Value::Int(1)])
            .unwrap();
        let r3 = db.row_for_primary_key(f.regions, 3).unwrap();
        assert!(chain.evaluate(&db, r3).is_empty());
    }

    #[test]
    fn test_null_key_short_circuits() {
        let f = fixture();
        let chain = Chain::new(
            vec![
                hop(&f, f.peak_region, f.region_pk),
                hop(&f, f.region_country, f.country_pk),
            ],
            f.db.schema(),
        )
        .unwrap();
        // Peak 13 has no region: empty all the way through.
        let start = f.db.row_for_primary_key(f.peaks, 13).unwrap();
        assert!(chain.evaluate(&f.db, start).is_empty());
        assert!(chain.evaluate_all(&f.db, &[start]).is_empty());
    }

    #[test]
    fn test_ascent_to_hikers_through_associative() {
        let f = fixture();
        let chain = Chain::new(
            vec![
                hop(&f, f.ascent_pk, f.link_ascent),
                hop(&f, f.link_hiker, f.hiker_pk),
            ],
            f.db.schema(),
        )
        .unwrap();
        let start = f.db.row_for_primary_key(f.ascents, 100).unwrap();
        assert_eq!(chain.evaluate(&f.db, start).len(), 2);
        let start = f.db.row_for_primary_key(f.ascents, 101).unwrap();
        assert_eq!(chain.evaluate(&f.db, start).len(), 1);
    }

    #[test]
    fn test_multiset_pruning_after_associative_hop() {
        let f = fixture();
        // peaks -> ascents -> links -> hikers: hiker 7 is reachable from
        // peak 10 via ascents 100 and 101, and hop keys within the
        // associative table would multiply paths further.
        let chain = Chain::new(
            vec![
                hop(&f, f.peak_pk, f.ascent_peak),
                hop(&f, f.ascent_pk, f.link_ascent),
                hop(&f, f.link_hiker, f.hiker_pk),
            ],
            f.db.schema(),
        )
        .unwrap();

        let p10 = f.db.row_for_primary_key(f.peaks, 10).unwrap();
        let p12 = f.db.row_for_primary_key(f.peaks, 12).unwrap();

        // Single start: multiset fidelity, hiker 7 counted per ascent.
        let single = chain.evaluate_all(&f.db, &[p10]);
        assert_eq!(single.len(), 3); // hikers 7, 8 via ascent 100; 7 via 101

        // Two simultaneous starts: the hop leaving the associative table
        // deduplicates, so each hiker appears once.
        let multi = chain.evaluate_all(&f.db, &[p10, p12]);
        let unique: HashSet<_> = multi.iter().copied().collect();
        assert_eq!(multi.len(), unique.len());
        assert_eq!(unique.len(), 2); // hikers 7 and 8
    }
}
