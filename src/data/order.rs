use std::collections::{BTreeSet, HashMap};

use crate::error::PipelineError;

use super::model::{AudienceRank, MeasurementTable, RankedRow, ALL};

// ---------------------------------------------------------------------------
// AudienceOrder – the analyst's permutation of audiences
// ---------------------------------------------------------------------------

/// Rank assignment built once from the analyst's permutation.
///
/// Immutable once built: a new permutation means a new `AudienceOrder` and a
/// freshly ordered table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudienceOrder {
    sequence: Vec<String>,
    ranks: HashMap<String, usize>,
}

impl AudienceOrder {
    /// Build the rank map. Duplicates and the reserved sentinel are rejected.
    pub fn new<I, S>(audiences: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sequence = Vec::new();
        let mut ranks = HashMap::new();
        for audience in audiences {
            let audience = audience.into();
            if audience == ALL {
                return Err(PipelineError::configuration(
                    "audience_order",
                    audience,
                    "the sentinel is always ranked last and cannot be placed",
                ));
            }
            if ranks.insert(audience.clone(), sequence.len()).is_some() {
                return Err(PipelineError::configuration(
                    "audience_order",
                    audience,
                    "audience listed more than once",
                ));
            }
            sequence.push(audience);
        }
        Ok(Self { sequence, ranks })
    }

    /// The permutation, sentinel excluded.
    pub fn audiences(&self) -> &[String] {
        &self.sequence
    }

    /// `None` for an audience the permutation does not place.
    pub fn rank(&self, audience: &str) -> Option<AudienceRank> {
        if audience == ALL {
            return Some(AudienceRank::All);
        }
        self.ranks.get(audience).copied().map(AudienceRank::Position)
    }

    /// Fail if any non-sentinel audience in `table` is missing from the
    /// permutation. All missing values are reported together.
    pub fn check_covers(&self, table: &MeasurementTable) -> Result<(), PipelineError> {
        let missing: BTreeSet<&str> = table
            .rows()
            .iter()
            .map(|r| r.audience.as_str())
            .filter(|a| self.rank(a).is_none())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(PipelineError::configuration(
            "audience_order",
            missing.into_iter().collect::<Vec<_>>().join(", "),
            "audience present in the data but missing from the permutation",
        ))
    }

    /// Attach the rank column to every row.
    pub fn apply(&self, table: &MeasurementTable) -> Result<OrderedTable, PipelineError> {
        self.check_covers(table)?;

        let present: BTreeSet<&str> = table.rows().iter().map(|r| r.audience.as_str()).collect();
        let unused: Vec<&str> = self
            .sequence
            .iter()
            .map(String::as_str)
            .filter(|a| !present.contains(a))
            .collect();
        if !unused.is_empty() {
            log::warn!("audience order names audiences absent from the data: {unused:?}");
        }

        let rows = table
            .rows()
            .iter()
            .map(|row| RankedRow {
                audience_rank: self.rank(&row.audience).unwrap_or(AudienceRank::All),
                row: row.clone(),
            })
            .collect();
        Ok(OrderedTable {
            rows,
            order: self.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// OrderedTable – measurement rows with their audience rank attached
// ---------------------------------------------------------------------------

/// The only input the aggregator accepts.
#[derive(Debug, Clone)]
pub struct OrderedTable {
    rows: Vec<RankedRow>,
    order: AudienceOrder,
}

impl OrderedTable {
    pub fn rows(&self) -> &[RankedRow] {
        &self.rows
    }

    /// The permutation this table was ranked with.
    pub fn order(&self) -> &AudienceOrder {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::fixtures::row;

    fn table(audiences: &[&str]) -> MeasurementTable {
        MeasurementTable::new(audiences.iter().map(|a| row(a, "v", 1.0, 0.5)).collect()).unwrap()
    }

    #[test]
    fn rank_follows_permutation() {
        let order = AudienceOrder::new(["hcp", "dso", "nurse"]).unwrap();
        assert_eq!(order.rank("hcp"), Some(AudienceRank::Position(0)));
        assert_eq!(order.rank("nurse"), Some(AudienceRank::Position(2)));
        assert!(order.rank("dso") < order.rank("nurse"));
        assert_eq!(order.rank("unknown"), None);
    }

    #[test]
    fn sentinel_ranks_after_every_audience() {
        let order = AudienceOrder::new(["c", "a", "b"]).unwrap();
        let all = order.rank(ALL).unwrap();
        for a in order.audiences() {
            assert!(order.rank(a).unwrap() < all);
        }
    }

    #[test]
    fn omitted_audience_is_rejected() {
        let order = AudienceOrder::new(["a"]).unwrap();
        let err = order.apply(&table(&["a", "b", "c", "all"])).unwrap_err();
        assert_eq!(
            err,
            PipelineError::configuration(
                "audience_order",
                "b, c",
                "audience present in the data but missing from the permutation"
            )
        );
    }

    #[test]
    fn duplicate_and_sentinel_entries_are_rejected() {
        assert!(matches!(
            AudienceOrder::new(["a", "a"]),
            Err(PipelineError::Configuration { ref value, .. }) if value == "a"
        ));
        assert!(AudienceOrder::new(["a", "all"]).is_err());
    }

    #[test]
    fn apply_attaches_rank_column() {
        let order = AudienceOrder::new(["b", "a"]).unwrap();
        let ordered = order.apply(&table(&["a", "all", "b"])).unwrap();
        let ranks: Vec<_> = ordered.rows().iter().map(|r| r.audience_rank).collect();
        assert_eq!(
            ranks,
            vec![AudienceRank::Position(1), AudienceRank::All, AudienceRank::Position(0)]
        );
        assert_eq!(ordered.order(), &order);
    }

    #[test]
    fn subset_tables_order_deterministically() {
        let order = AudienceOrder::new(["z", "y", "x"]).unwrap();
        let ordered = order.apply(&table(&["x", "z"])).unwrap();
        let mut rows = ordered.rows().to_vec();
        rows.sort_by_key(|r| r.audience_rank);
        let audiences: Vec<_> = rows.iter().map(|r| r.audience.as_str()).collect();
        assert_eq!(audiences, vec!["z", "x"]);
    }
}
