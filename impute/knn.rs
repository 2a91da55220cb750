//! Nearest-neighbor score imputation constrained to comparable substitutions.

use super::similarity::{NeighborAggregation, SubstitutionSimilarity};
use crate::shared::table::VariantRecord;
use crate::stats::{nan_mean, nan_median};
use ahash::AHashMap;

/// Number of neighbors combined into one imputed score.
pub const NEIGHBOR_COUNT: usize = 5;

/// A selected neighbor and its similarity to the query.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<'a> {
    pub record: &'a VariantRecord,
    pub similarity: f64,
}

type ResidueKey = (String, i64, String);

/// Imputes normalized scores from training variants at the same `(gene, position, wt)`.
pub struct SimilarityImputer<'a, S: SubstitutionSimilarity + ?Sized> {
    metric: &'a S,
    by_residue: AHashMap<ResidueKey, Vec<&'a VariantRecord>>,
    k: usize,
}

impl<'a, S: SubstitutionSimilarity + ?Sized> SimilarityImputer<'a, S> {
    pub fn new<I>(training: I, metric: &'a S) -> Self
    where
        I: IntoIterator<Item = &'a VariantRecord>,
    {
        let mut by_residue: AHashMap<ResidueKey, Vec<&'a VariantRecord>> = AHashMap::new();
        for record in training {
            by_residue
                .entry(residue_key(record))
                .or_default()
                .push(record);
        }
        Self {
            metric,
            by_residue,
            k: NEIGHBOR_COUNT,
        }
    }

    /// Candidates ranked by descending similarity, at most `k` of them.
    ///
    /// Candidates share gene, position and wild-type residue with the query, carry a
    /// different variant residue, and have a defined similarity. Ties keep training
    /// order.
    pub fn neighbors(&self, query: &VariantRecord) -> Vec<Neighbor<'a>> {
        let Some(pool) = self.by_residue.get(&residue_key(query)) else {
            return Vec::new();
        };
        let mut ranked: Vec<Neighbor<'a>> = pool
            .iter()
            .filter(|c| c.variant_residue != query.variant_residue)
            .filter_map(|&c| {
                self.metric
                    .similarity(c, query)
                    .filter(|s| s.is_finite())
                    .map(|similarity| Neighbor {
                        record: c,
                        similarity,
                    })
            })
            .collect();
        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        ranked.truncate(self.k);
        ranked
    }

    /// The imputed score, or `None` when no neighbor with a defined score exists.
    pub fn impute(&self, query: &VariantRecord) -> Option<f64> {
        let scores: Vec<f64> = self
            .neighbors(query)
            .iter()
            .map(|n| n.record.normalized_dms_score)
            .collect();
        let value = match self.metric.aggregation() {
            NeighborAggregation::Median => nan_median(&scores),
            NeighborAggregation::Mean => nan_mean(&scores),
        };
        value.is_finite().then_some(value)
    }
}

fn residue_key(record: &VariantRecord) -> ResidueKey {
    (
        record.gene_id.clone(),
        record.position,
        record.wt_residue.clone(),
    )
}
