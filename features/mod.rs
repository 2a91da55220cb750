//! # Feature Enrichment
//!
//! Score normalization and the group statistics derived from it. The functions that
//! operate on a whole [`VariantTable`] check their column preconditions and fail with
//! [`FeatureError::MissingColumn`] instead of producing silently empty output.

pub mod normalize;
pub mod position;
pub mod schema;
pub mod shrinkage;
pub mod substitution;

use crate::shared::table::VariantTable;
use thiserror::Error;

pub use normalize::{normalize_score, normalize_table};
pub use position::{PositionMeans, aggregate_positions};
pub use schema::{DerivedFeature, FEATURE_SCHEMA_VERSION, FeatureSchema};
pub use shrinkage::{james_stein, shrink_by_gene};
pub use substitution::SubstitutionPrior;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("The required column '{0}' is not available for this operation.")]
    MissingColumn(String),
}

/// Counters describing one preprocessing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreprocessSummary {
    pub undefined_scores: usize,
    pub unshrunk_genes: usize,
    pub positions: usize,
}

/// Normalizes raw scores (when present), then derives the gene-level shrunken score
/// and the position-level mean.
pub fn preprocess(table: &mut VariantTable) -> Result<PreprocessSummary, FeatureError> {
    let undefined_scores = if table.columns().raw_scores {
        normalize_table(table)?
    } else {
        log::info!("No raw assay scores present; using the supplied normalized_dms_score.");
        table
            .records()
            .iter()
            .filter(|r| r.normalized_dms_score.is_nan())
            .count()
    };
    let unshrunk_genes = shrink_by_gene(table)?;
    let positions = aggregate_positions(table)?;
    Ok(PreprocessSummary {
        undefined_scores,
        unshrunk_genes,
        positions,
    })
}
