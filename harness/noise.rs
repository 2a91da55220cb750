//! Noise ceiling: how well a gene's scores can correlate with themselves once the
//! reported measurement uncertainty is taken into account.
//!
//! Each replicate perturbs every score with Gaussian noise of the variant's `sigma`
//! and correlates the perturbed vector against the measured one. The spread of those
//! correlations bounds what any predictor can be expected to reach on that gene.

use crate::shared::table::VariantTable;
use crate::stats::{nan_mean, nan_median, nan_percentile, pearson};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub replicates: usize,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self { replicates: 300 }
    }
}

/// Summary of the replicate correlations of one gene.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseCeiling {
    pub gene_id: String,
    pub n_variants: usize,
    pub mean_r: f64,
    pub median_r: f64,
    pub p05_r: f64,
    pub p95_r: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseSkip {
    NoSigma,
    ZeroSigma,
    TooFewVariants(usize),
}

impl fmt::Display for NoiseSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSigma => f.write_str("no sigma reported"),
            Self::ZeroSigma => f.write_str("every sigma is zero"),
            Self::TooFewVariants(n) => write!(f, "{n} variants with a defined score and sigma"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoiseReport {
    pub ceilings: Vec<NoiseCeiling>,
    pub skipped: Vec<(String, NoiseSkip)>,
}

/// Simulates the noise ceiling of every gene in `table`.
///
/// The perturbed score is the raw `dms_score` when the table carries raw scores, and
/// `normalized_dms_score` otherwise. The generator is re-seeded with `seed` for each
/// gene so that a gene's result does not depend on the other genes in the table.
pub fn noise_ceiling(table: &VariantTable, config: &NoiseConfig, seed: u64) -> NoiseReport {
    let use_raw = table.columns().raw_scores;
    let mut report = NoiseReport::default();

    for (gene_id, rows) in table.gene_groups() {
        let records: Vec<_> = rows.iter().map(|&i| &table.records()[i]).collect();
        if records.iter().all(|r| r.sigma.is_nan()) {
            log::info!("Skipping noise ceiling for gene {gene_id}: {}", NoiseSkip::NoSigma);
            report.skipped.push((gene_id, NoiseSkip::NoSigma));
            continue;
        }
        if records.iter().filter(|r| !r.sigma.is_nan()).all(|r| r.sigma == 0.0) {
            log::info!("Skipping noise ceiling for gene {gene_id}: {}", NoiseSkip::ZeroSigma);
            report.skipped.push((gene_id, NoiseSkip::ZeroSigma));
            continue;
        }

        let (scores, sigmas): (Vec<f64>, Vec<f64>) = records
            .iter()
            .map(|r| {
                let score = match (&r.raw, use_raw) {
                    (Some(raw), true) => raw.dms_score,
                    _ => r.normalized_dms_score,
                };
                (score, r.sigma)
            })
            .filter(|(score, sigma)| score.is_finite() && sigma.is_finite() && *sigma >= 0.0)
            .unzip();
        if scores.len() < 2 {
            let reason = NoiseSkip::TooFewVariants(scores.len());
            log::info!("Skipping noise ceiling for gene {gene_id}: {reason}");
            report.skipped.push((gene_id, reason));
            continue;
        }

        let correlations = replicate_correlations(&scores, &sigmas, config.replicates, seed);
        log::debug!(
            "Gene {gene_id}: {} replicates over {} variants.",
            correlations.len(),
            scores.len()
        );
        report.ceilings.push(NoiseCeiling {
            gene_id,
            n_variants: scores.len(),
            mean_r: nan_mean(&correlations),
            median_r: nan_median(&correlations),
            p05_r: nan_percentile(&correlations, 5.0),
            p95_r: nan_percentile(&correlations, 95.0),
        });
    }
    report
}

/// Pearson r between `scores` and `replicates` noisy copies of them.
pub fn replicate_correlations(
    scores: &[f64],
    sigmas: &[f64],
    replicates: usize,
    seed: u64,
) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut noisy = vec![0.0; scores.len()];
    (0..replicates)
        .map(|_| {
            for ((value, &score), &sigma) in noisy.iter_mut().zip(scores).zip(sigmas) {
                let z: f64 = rng.sample(StandardNormal);
                *value = score + sigma * z;
            }
            pearson(scores, &noisy)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::table::VariantRecord;

    fn gene(gene_id: &str, sigma: f64, n: usize) -> Vec<VariantRecord> {
        (0..n)
            .map(|i| {
                VariantRecord::new(gene_id, format!("{gene_id}{i}"), i as i64, "A", "V")
                    .with_scores(i as f64, 10.0, 0.0)
                    .with_sigma(sigma)
            })
            .collect()
    }

    #[test]
    fn noiseless_replicates_correlate_perfectly() {
        let scores = [0.1, 0.4, 0.2, 0.9];
        let r = replicate_correlations(&scores, &[0.0; 4], 10, 42);
        assert_eq!(r.len(), 10);
        assert!(r.iter().all(|v| (v - 1.0).abs() < 1e-12));
    }

    #[test]
    fn more_noise_lowers_the_ceiling() {
        let mut records = gene("LOW", 0.5, 40);
        records.extend(gene("HIGH", 20.0, 40));
        let table = VariantTable::from_records(records);
        let report = noise_ceiling(&table, &NoiseConfig { replicates: 200 }, 42);

        assert_eq!(report.ceilings.len(), 2);
        let low = &report.ceilings[0];
        let high = &report.ceilings[1];
        assert_eq!(low.n_variants, 40);
        assert!(low.mean_r > 0.99);
        assert!(high.mean_r < low.mean_r);
        assert!(high.p05_r <= high.median_r && high.median_r <= high.p95_r);
    }

    #[test]
    fn results_are_reproducible_for_a_seed() {
        let table = VariantTable::from_records(gene("G", 5.0, 20));
        let config = NoiseConfig { replicates: 50 };
        let a = noise_ceiling(&table, &config, 7);
        let b = noise_ceiling(&table, &config, 7);
        assert_eq!(a.ceilings, b.ceilings);
    }

    #[test]
    fn genes_without_usable_sigma_are_skipped() {
        let mut records = gene("NONE", f64::NAN, 5);
        records.extend(gene("ZERO", 0.0, 5));
        let mut partial = gene("PARTIAL", 1.0, 3);
        partial[0].sigma = f64::NAN;
        partial[1].sigma = f64::NAN;
        records.extend(partial);
        let table = VariantTable::from_records(records);
        let report = noise_ceiling(&table, &NoiseConfig::default(), 42);

        assert!(report.ceilings.is_empty());
        assert_eq!(
            report.skipped,
            vec![
                ("NONE".to_string(), NoiseSkip::NoSigma),
                ("ZERO".to_string(), NoiseSkip::ZeroSigma),
                ("PARTIAL".to_string(), NoiseSkip::TooFewVariants(1)),
            ]
        );
    }
}
