//! # Similarity Imputation
//!
//! k-nearest-neighbor imputation of normalized scores, where neighbors are the other
//! substitutions observed at the same residue and similarity is pluggable.

pub mod benchmark;
pub mod knn;
pub mod similarity;

pub use benchmark::{
    GeneCorrelation, ImputationConfig, ImputationMetric, ImputationReport, ImputedVariant,
    run_imputation_benchmark,
};
pub use knn::{NEIGHBOR_COUNT, Neighbor, SimilarityImputer};
pub use similarity::{
    FitnessDistance, NeighborAggregation, SubstitutionMatrix, SubstitutionSimilarity,
};
