//! Result rows produced by the split runner.
//!
//! Every row carries its policy and the columns identifying the held-out unit, so
//! tables from different policies stay distinguishable after concatenation.

use crate::metrics::{PointError, RegressionMetrics};
use crate::splits::{SplitKey, SplitPolicy};

/// One row per evaluated split.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
    pub policy: SplitPolicy,
    pub key: SplitKey,
    pub train_size: usize,
    pub test_size: usize,
    pub train: RegressionMetrics,
    pub test: RegressionMetrics,
}

/// One row per held-out variant.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub policy: SplitPolicy,
    pub key: SplitKey,
    /// Gene of the variant itself, which names the per-gene output file.
    pub gene_id: String,
    pub mutation_id: String,
    pub y_true: f64,
    pub y_pred: f64,
    pub error: PointError,
}

/// Columns that identify the held-out unit for `policy`.
pub fn key_columns(policy: SplitPolicy) -> &'static [&'static str] {
    match policy {
        SplitPolicy::LeaveGeneOut | SplitPolicy::GeneHoldout => &["gene_id_out"],
        SplitPolicy::LeavePositionOut => &["gene_id", "position_out"],
        SplitPolicy::LeaveVariantOut => &["gene_id", "variant_out"],
        SplitPolicy::Random
        | SplitPolicy::LeaveNonSnvOut
        | SplitPolicy::SubstitutionClassHoldout
        | SplitPolicy::PositionHoldout => &["gene_id"],
    }
}

/// Value of a key column; empty when the key does not define it.
pub fn key_value(key: &SplitKey, column: &str) -> String {
    match (key, column) {
        (SplitKey::Gene { gene_id }, "gene_id")
        | (SplitKey::Position { gene_id, .. }, "gene_id")
        | (SplitKey::Variant { gene_id, .. }, "gene_id") => gene_id.clone(),
        (SplitKey::GeneOut { gene_id_out }, "gene_id_out") => gene_id_out.clone(),
        (SplitKey::GenesOut { gene_ids_out }, "gene_id_out") => gene_ids_out.join(";"),
        (SplitKey::Position { position_out, .. }, "position_out") => position_out.to_string(),
        (SplitKey::Variant { variant_out, .. }, "variant_out") => variant_out.clone(),
        _ => String::new(),
    }
}

const EVALUATION_METRIC_COLUMNS: [&str; 10] = [
    "train_size",
    "train_RMSE",
    "train_MAE",
    "train_R2",
    "train_pearson_r",
    "test_size",
    "test_RMSE",
    "test_MAE",
    "test_R2",
    "test_pearson_r",
];

const MUTATION_COLUMNS: [&str; 6] = [
    "mutation_id",
    "y_true",
    "y_pred",
    "absolute_error",
    "squared_error",
    "percentage_error",
];

pub fn evaluation_header(policy: SplitPolicy) -> Vec<String> {
    std::iter::once("policy")
        .chain(key_columns(policy).iter().copied())
        .chain(EVALUATION_METRIC_COLUMNS)
        .map(str::to_string)
        .collect()
}

pub fn mutation_header(policy: SplitPolicy) -> Vec<String> {
    std::iter::once("policy")
        .chain(key_columns(policy).iter().copied())
        .chain(MUTATION_COLUMNS)
        .map(str::to_string)
        .collect()
}

impl EvaluationRecord {
    pub fn to_row(&self) -> Vec<String> {
        let mut row = vec![self.policy.label().to_string()];
        row.extend(key_columns(self.policy).iter().map(|c| key_value(&self.key, c)));
        row.push(self.train_size.to_string());
        push_metrics(&mut row, &self.train);
        row.push(self.test_size.to_string());
        push_metrics(&mut row, &self.test);
        row
    }
}

impl MutationRecord {
    pub fn to_row(&self) -> Vec<String> {
        let mut row = vec![self.policy.label().to_string()];
        row.extend(key_columns(self.policy).iter().map(|c| key_value(&self.key, c)));
        row.push(self.mutation_id.clone());
        row.push(format_value(self.y_true));
        row.push(format_value(self.y_pred));
        row.push(format_value(self.error.absolute_error));
        row.push(format_value(self.error.squared_error));
        row.push(format_value(self.error.percentage_error));
        row
    }
}

fn push_metrics(row: &mut Vec<String>, metrics: &RegressionMetrics) {
    row.push(format_value(metrics.rmse));
    row.push(format_value(metrics.mae));
    row.push(format_value(metrics.r2));
    row.push(format_value(metrics.pearson_r));
}

/// Formats a numeric cell. Undefined values are written as `NaN`, infinities as `inf`.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        value.to_string()
    }
}
