//! Per-gene holdout benchmark of the nearest-neighbor imputer.

use super::knn::SimilarityImputer;
use super::similarity::{FitnessDistance, SubstitutionMatrix, SubstitutionSimilarity};
use crate::features::SubstitutionPrior;
use crate::shared::table::{VariantRecord, VariantTable};
use crate::splits::sample_holdout;
use crate::stats::pearson_defined;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputationConfig {
    /// Fraction of each gene's variants held out for imputation.
    pub holdout_fraction: f64,
    /// Genes with fewer variants are skipped. Defaults per metric when unset.
    pub min_gene_size: Option<usize>,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            holdout_fraction: 0.1,
            min_gene_size: None,
        }
    }
}

/// Similarity used by the benchmark.
#[derive(Debug, Clone)]
pub enum ImputationMetric {
    Matrix(SubstitutionMatrix),
    /// Distance between substitution-mean priors fitted on each gene's training variants.
    Fitness,
}

impl ImputationMetric {
    pub fn name(&self) -> &str {
        match self {
            Self::Matrix(matrix) => matrix.name(),
            Self::Fitness => "fitness",
        }
    }

    pub fn default_min_gene_size(&self) -> usize {
        match self {
            Self::Matrix(_) => 2,
            Self::Fitness => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImputedVariant {
    pub gene_id: String,
    pub mutation_id: String,
    pub position: i64,
    pub wt_residue: String,
    pub variant_residue: String,
    pub normalized_dms_score: f64,
    /// `None` when no comparable neighbor exists.
    pub imputed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneCorrelation {
    pub gene_id: String,
    pub n_test: usize,
    /// Held-out variants with both an imputed and a true score.
    pub n_defined: usize,
    pub pearson_r: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ImputationReport {
    pub correlations: Vec<GeneCorrelation>,
    pub imputations: Vec<ImputedVariant>,
    /// Genes below the minimum size, with their variant count.
    pub skipped: Vec<(String, usize)>,
}

/// Holds out `max(1, round(fraction * n))` variants of every gene, imputes them from the
/// remaining variants of that gene and correlates imputed against true scores.
pub fn run_imputation_benchmark(
    table: &VariantTable,
    metric: &ImputationMetric,
    config: &ImputationConfig,
    seed: u64,
) -> ImputationReport {
    let min_gene_size = config
        .min_gene_size
        .unwrap_or_else(|| metric.default_min_gene_size())
        .max(2);
    let records = table.records();

    let mut report = ImputationReport::default();
    let mut eligible = Vec::new();
    for (gene_id, rows) in table.gene_groups() {
        if rows.len() < min_gene_size {
            log::info!(
                "Skipping imputation for gene {gene_id}: {} variants, \
                 at least {min_gene_size} required.",
                rows.len()
            );
            report.skipped.push((gene_id, rows.len()));
        } else {
            eligible.push((gene_id, rows));
        }
    }

    let per_gene: Vec<(GeneCorrelation, Vec<ImputedVariant>)> = eligible
        .par_iter()
        .map(|(gene_id, rows)| {
            let n_test = holdout_size(config.holdout_fraction, rows.len());
            let (train_rows, test_rows) = sample_holdout(rows, n_test, seed);
            let train: Vec<&VariantRecord> = train_rows.iter().map(|&i| &records[i]).collect();
            let test: Vec<&VariantRecord> = test_rows.iter().map(|&i| &records[i]).collect();

            let imputed = match metric {
                ImputationMetric::Matrix(matrix) => impute_all(&train, matrix, &test),
                ImputationMetric::Fitness => {
                    let prior = SubstitutionPrior::fit(train.iter().copied());
                    impute_all(&train, &FitnessDistance::new(prior), &test)
                }
            };
            summarize_gene(gene_id, &test, imputed)
        })
        .collect();

    for (correlation, imputations) in per_gene {
        log::debug!(
            "Gene {}: r = {:.3} over {} of {} held-out variants.",
            correlation.gene_id,
            correlation.pearson_r,
            correlation.n_defined,
            correlation.n_test
        );
        report.correlations.push(correlation);
        report.imputations.extend(imputations);
    }
    log::info!(
        "Imputation benchmark with the {} metric: {} genes evaluated, {} skipped.",
        metric.name(),
        report.correlations.len(),
        report.skipped.len()
    );
    report
}

/// `max(1, round(fraction * n))`, never the whole gene.
pub fn holdout_size(fraction: f64, n: usize) -> usize {
    let rounded = (fraction * n as f64).round().max(1.0) as usize;
    rounded.min(n.saturating_sub(1))
}

fn impute_all<S: SubstitutionSimilarity + ?Sized>(
    train: &[&VariantRecord],
    metric: &S,
    test: &[&VariantRecord],
) -> Vec<Option<f64>> {
    let imputer = SimilarityImputer::new(train.iter().copied(), metric);
    test.iter().map(|query| imputer.impute(query)).collect()
}

fn summarize_gene(
    gene_id: &str,
    test: &[&VariantRecord],
    imputed: Vec<Option<f64>>,
) -> (GeneCorrelation, Vec<ImputedVariant>) {
    let truth: Vec<f64> = test.iter().map(|r| r.normalized_dms_score).collect();
    let estimates: Vec<f64> = imputed.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
    let (pearson_r, n_defined) = pearson_defined(&estimates, &truth);

    let variants = test
        .iter()
        .zip(imputed)
        .map(|(record, imputed)| ImputedVariant {
            gene_id: record.gene_id.clone(),
            mutation_id: record.mutation_id.clone(),
            position: record.position,
            wt_residue: record.wt_residue.clone(),
            variant_residue: record.variant_residue.clone(),
            normalized_dms_score: record.normalized_dms_score,
            imputed,
        })
        .collect();
    (
        GeneCorrelation {
            gene_id: gene_id.to_string(),
            n_test: test.len(),
            n_defined,
            pearson_r,
        },
        variants,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESIDUES: [&str; 6] = ["A", "C", "D", "E", "F", "G"];

    /// Every residue at a position scores the same, so a perfect neighbor always exists.
    fn position_driven_gene(gene_id: &str, positions: i64) -> Vec<VariantRecord> {
        let mut records = Vec::new();
        for position in 1..=positions {
            for residue in RESIDUES {
                let mutation_id = format!("L{position}{residue}");
                records.push(
                    VariantRecord::new(gene_id, mutation_id, position, "L", residue)
                        .with_normalized(position as f64 / positions as f64),
                );
            }
        }
        records
    }

    fn uniform_matrix() -> SubstitutionMatrix {
        let pairs = RESIDUES
            .iter()
            .flat_map(|&x| RESIDUES.iter().map(move |&y| (x, y, 1.0)));
        SubstitutionMatrix::from_pairs("uniform", pairs)
    }

    #[test]
    fn holdout_sizes_round_and_stay_within_the_gene() {
        assert_eq!(holdout_size(0.1, 2), 1);
        assert_eq!(holdout_size(0.1, 14), 1);
        assert_eq!(holdout_size(0.1, 16), 2);
        assert_eq!(holdout_size(0.1, 60), 6);
        assert_eq!(holdout_size(0.9, 3), 2);
    }

    #[test]
    fn matrix_benchmark_recovers_position_driven_scores() {
        let table = VariantTable::from_records(position_driven_gene("G1", 10));
        let report = run_imputation_benchmark(
            &table,
            &ImputationMetric::Matrix(uniform_matrix()),
            &ImputationConfig::default(),
            42,
        );
        assert_eq!(report.correlations.len(), 1);
        let gene = &report.correlations[0];
        assert_eq!(gene.n_test, 6);
        assert_eq!(report.imputations.len(), 6);
        for variant in &report.imputations {
            assert_eq!(variant.imputed, Some(variant.normalized_dms_score));
        }
        if gene.n_defined >= 2 {
            assert!((gene.pearson_r - 1.0).abs() < 1e-9 || gene.pearson_r.is_nan());
        }
    }

    #[test]
    fn fitness_metric_skips_small_genes() {
        let mut records = position_driven_gene("BIG", 5);
        records.extend(position_driven_gene("SMALL", 1).into_iter().take(4));
        let table = VariantTable::from_records(records);
        let report = run_imputation_benchmark(
            &table,
            &ImputationMetric::Fitness,
            &ImputationConfig::default(),
            42,
        );
        assert_eq!(report.skipped, vec![("SMALL".to_string(), 4)]);
        assert_eq!(report.correlations.len(), 1);
        assert_eq!(report.correlations[0].gene_id, "BIG");
        assert_eq!(report.correlations[0].n_test, 3);
    }

    #[test]
    fn single_holdout_correlation_is_undefined() {
        let table = VariantTable::from_records(position_driven_gene("G1", 1));
        let report = run_imputation_benchmark(
            &table,
            &ImputationMetric::Matrix(uniform_matrix()),
            &ImputationConfig::default(),
            42,
        );
        assert_eq!(report.correlations[0].n_test, 1);
        assert!(report.correlations[0].pearson_r.is_nan());
    }
}
