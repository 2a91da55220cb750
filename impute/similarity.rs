//! Pluggable similarity between two substitutions at the same residue.
//!
//! Both implementations return `None` when similarity cannot be determined; the
//! imputer then drops that candidate.

use crate::features::SubstitutionPrior;
use crate::shared::table::VariantRecord;
use ahash::AHashMap;

/// How the scores of the selected neighbors are combined into one imputed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborAggregation {
    Median,
    Mean,
}

pub trait SubstitutionSimilarity: Sync {
    /// Similarity of `candidate` to `query`; higher means more alike.
    fn similarity(&self, candidate: &VariantRecord, query: &VariantRecord) -> Option<f64>;

    fn aggregation(&self) -> NeighborAggregation;

    fn name(&self) -> &str;
}

/// A named amino-acid substitution matrix such as BLOSUM100.
///
/// Lookups are directional: the score of `(x, y)` is read exactly as stored, and a
/// missing pair is not completed from `(y, x)`.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionMatrix {
    name: String,
    // from residue -> to residue -> score
    scores: AHashMap<String, AHashMap<String, f64>>,
}

impl SubstitutionMatrix {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scores: AHashMap::new(),
        }
    }

    pub fn from_pairs<I, S>(name: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S, f64)>,
        S: Into<String>,
    {
        let mut matrix = Self::new(name);
        for (x, y, score) in pairs {
            matrix.insert(x, y, score);
        }
        matrix
    }

    /// Stores a pair; non-finite scores are treated as absent.
    pub fn insert(
        &mut self,
        amino_acid_x: impl Into<String>,
        amino_acid_y: impl Into<String>,
        score: f64,
    ) {
        if score.is_finite() {
            self.scores
                .entry(amino_acid_x.into())
                .or_default()
                .insert(amino_acid_y.into(), score);
        }
    }

    pub fn score(&self, from: &str, to: &str) -> Option<f64> {
        self.scores.get(from)?.get(to).copied()
    }

    /// Number of stored pairs.
    pub fn len(&self) -> usize {
        self.scores.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SubstitutionSimilarity for SubstitutionMatrix {
    /// Matrix score from the query's variant residue to the candidate's. The
    /// wild-type residue is shared by construction and does not enter the lookup.
    fn similarity(&self, candidate: &VariantRecord, query: &VariantRecord) -> Option<f64> {
        self.score(&query.variant_residue, &candidate.variant_residue)
    }

    fn aggregation(&self) -> NeighborAggregation {
        NeighborAggregation::Median
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Similarity as the negative distance between empirical substitution fitness means.
#[derive(Debug, Clone)]
pub struct FitnessDistance {
    prior: SubstitutionPrior,
}

impl FitnessDistance {
    /// `prior` must have been fitted on training variants only.
    pub fn new(prior: SubstitutionPrior) -> Self {
        Self { prior }
    }
}

impl SubstitutionSimilarity for FitnessDistance {
    fn similarity(&self, candidate: &VariantRecord, query: &VariantRecord) -> Option<f64> {
        let c = self.prior.get(candidate)?;
        let q = self.prior.get(query)?;
        Some(-(c - q).abs())
    }

    fn aggregation(&self) -> NeighborAggregation {
        NeighborAggregation::Mean
    }

    fn name(&self) -> &str {
        "fitness"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(residue: &str, score: f64) -> VariantRecord {
        VariantRecord::new("A", format!("G5{residue}"), 5, "G", residue).with_normalized(score)
    }

    #[test]
    fn matrix_lookup_is_directional() {
        let matrix =
            SubstitutionMatrix::from_pairs("blosum100", [("D", "E", 2.0), ("E", "D", 1.0)]);
        let query = variant("D", 0.5);
        let candidate = variant("E", 0.7);
        assert_eq!(matrix.similarity(&candidate, &query), Some(2.0));
        assert_eq!(matrix.similarity(&query, &candidate), Some(1.0));
        assert_eq!(matrix.similarity(&variant("W", 0.1), &query), None);
        assert_eq!(matrix.aggregation(), NeighborAggregation::Median);
    }

    #[test]
    fn non_finite_matrix_entries_are_absent() {
        let matrix = SubstitutionMatrix::from_pairs("m", [("D", "E", f64::NAN)]);
        assert!(matrix.is_empty());
        assert_eq!(matrix.score("D", "E"), None);
    }

    #[test]
    fn matrix_counts_pairs_and_overwrites_repeated_ones() {
        let mut matrix = SubstitutionMatrix::from_pairs("m", [("D", "E", 2.0), ("D", "W", -4.0)]);
        matrix.insert("D", "E", 3.0);
        matrix.insert("E", "D", 1.0);
        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix.score("D", "E"), Some(3.0));
        assert_eq!(matrix.score("W", "D"), None);
    }

    #[test]
    fn fitness_distance_prefers_closer_priors() {
        let train = vec![
            VariantRecord::new("A", "x1", 1, "G", "D").with_normalized(0.5),
            VariantRecord::new("A", "x2", 2, "G", "E").with_normalized(0.6),
            VariantRecord::new("A", "x3", 3, "G", "W").with_normalized(0.0),
        ];
        let metric = FitnessDistance::new(SubstitutionPrior::fit(&train));
        let query = variant("D", 0.4);
        let near = metric.similarity(&variant("E", 0.9), &query).unwrap();
        let far = metric.similarity(&variant("W", 0.9), &query).unwrap();
        assert!(near > far);
        assert!(metric.similarity(&variant("P", 0.9), &query).is_none());
        assert_eq!(metric.aggregation(), NeighborAggregation::Mean);
    }
}
