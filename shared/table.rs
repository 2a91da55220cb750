// ========================================================================================
//
//                        CORE DATA TYPES FOR THE VEFILL HARNESS
//
// ========================================================================================
//
// This module is the canonical dictionary for the variant-level data shared across the
// feature, imputation, and evaluation modules. Records carry identifiers and scores;
// opaque model features live in a row-aligned matrix next to them so that a split can
// slice both with the same index vector.

use ahash::AHashMap;
use ndarray::{Array2, Axis};
use std::hash::Hash;
use thiserror::Error;

/// Raw assay measurements required for normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssayScores {
    pub dms_score: f64,
    pub wt_score: f64,
    pub non_score: f64,
}

/// One measured substitution.
///
/// Derived score columns hold `f64::NAN` until the corresponding feature step
/// has been run, or when the value is undefined for this record.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRecord {
    pub gene_id: String,
    pub mutation_id: String,
    pub position: i64,
    pub wt_residue: String,
    pub variant_residue: String,
    /// Nucleotide edits needed to reach this substitution. `1` marks an SNV.
    pub edit_distance: u32,
    pub raw: Option<AssayScores>,
    /// Per-variant experimental uncertainty, when the assay reports one.
    pub sigma: f64,
    pub normalized_dms_score: f64,
    pub jse_normalized_dms: f64,
    pub mean_normalized_dms: f64,
}

impl VariantRecord {
    pub fn new(
        gene_id: impl Into<String>,
        mutation_id: impl Into<String>,
        position: i64,
        wt_residue: impl Into<String>,
        variant_residue: impl Into<String>,
    ) -> Self {
        Self {
            gene_id: gene_id.into(),
            mutation_id: mutation_id.into(),
            position,
            wt_residue: wt_residue.into(),
            variant_residue: variant_residue.into(),
            edit_distance: 1,
            raw: None,
            sigma: f64::NAN,
            normalized_dms_score: f64::NAN,
            jse_normalized_dms: f64::NAN,
            mean_normalized_dms: f64::NAN,
        }
    }

    pub fn with_scores(mut self, dms_score: f64, wt_score: f64, non_score: f64) -> Self {
        self.raw = Some(AssayScores {
            dms_score,
            wt_score,
            non_score,
        });
        self
    }

    pub fn with_normalized(mut self, normalized_dms_score: f64) -> Self {
        self.normalized_dms_score = normalized_dms_score;
        self
    }

    pub fn with_edit_distance(mut self, edit_distance: u32) -> Self {
        self.edit_distance = edit_distance;
        self
    }

    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }
}

/// Which score columns currently hold meaningful values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreColumns {
    pub raw_scores: bool,
    pub normalized: bool,
    pub shrunk: bool,
    pub position_mean: bool,
    pub sigma: bool,
}

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Feature matrix has {rows} rows but the table holds {records} records.")]
    RowCountMismatch { rows: usize, records: usize },
    #[error("Feature matrix has {found} columns but {expected} feature names were given.")]
    ColumnCountMismatch { found: usize, expected: usize },
}

/// Variant records with their row-aligned feature matrix.
#[derive(Debug, Clone)]
pub struct VariantTable {
    records: Vec<VariantRecord>,
    feature_names: Vec<String>,
    features: Array2<f64>,
    columns: ScoreColumns,
}

impl VariantTable {
    pub fn new(
        records: Vec<VariantRecord>,
        feature_names: Vec<String>,
        features: Array2<f64>,
        columns: ScoreColumns,
    ) -> Result<Self, TableError> {
        if features.nrows() != records.len() {
            return Err(TableError::RowCountMismatch {
                rows: features.nrows(),
                records: records.len(),
            });
        }
        if features.ncols() != feature_names.len() {
            return Err(TableError::ColumnCountMismatch {
                found: features.ncols(),
                expected: feature_names.len(),
            });
        }
        Ok(Self {
            records,
            feature_names,
            features,
            columns,
        })
    }

    /// A table without passthrough features. Score columns are inferred from the records.
    pub fn from_records(records: Vec<VariantRecord>) -> Self {
        let columns = ScoreColumns {
            raw_scores: !records.is_empty() && records.iter().all(|r| r.raw.is_some()),
            normalized: records.iter().any(|r| !r.normalized_dms_score.is_nan()),
            shrunk: false,
            position_mean: false,
            sigma: records.iter().any(|r| !r.sigma.is_nan()),
        };
        let features = Array2::zeros((records.len(), 0));
        Self {
            records,
            feature_names: Vec::new(),
            features,
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[VariantRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [VariantRecord] {
        &mut self.records
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn columns(&self) -> ScoreColumns {
        self.columns
    }

    pub fn columns_mut(&mut self) -> &mut ScoreColumns {
        &mut self.columns
    }

    /// Drops rows whose normalized score is undefined and returns how many were removed.
    pub fn retain_defined_scores(&mut self) -> usize {
        let keep: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.normalized_dms_score.is_finite())
            .map(|(i, _)| i)
            .collect();
        let removed = self.records.len() - keep.len();
        if removed == 0 {
            return 0;
        }
        self.features = self.features.select(Axis(0), &keep);
        self.records.retain(|r| r.normalized_dms_score.is_finite());
        removed
    }

    /// Row indices grouped by gene, in order of first appearance.
    pub fn gene_groups(&self) -> Vec<(String, Vec<usize>)> {
        group_indices(self.records.iter().enumerate(), |r| r.gene_id.clone())
    }
}

/// Groups row indices by a key while keeping groups in order of first appearance and
/// rows in input order within each group.
pub fn group_indices<'a, K, F, I>(rows: I, mut key: F) -> Vec<(K, Vec<usize>)>
where
    K: Eq + Hash + Clone,
    F: FnMut(&VariantRecord) -> K,
    I: IntoIterator<Item = (usize, &'a VariantRecord)>,
{
    let mut slots: AHashMap<K, usize> = AHashMap::new();
    let mut groups: Vec<(K, Vec<usize>)> = Vec::new();
    for (index, record) in rows {
        let k = key(record);
        match slots.get(&k) {
            Some(&slot) => groups[slot].1.push(index),
            None => {
                slots.insert(k.clone(), groups.len());
                groups.push((k, vec![index]));
            }
        }
    }
    groups
}
