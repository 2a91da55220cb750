//! # James-Stein Shrinkage
//!
//! Empirical-Bayes estimate that pulls each normalized score of a gene toward the
//! gene mean:
//!
//! `estimate_i = mu + shrink * (x_i - mu)`, with
//! `shrink = max(0, 1 - (n - 2) * var / sum((x - mu)^2))`
//!
//! where `var` is the unbiased sample variance. With two or fewer observations, or
//! zero variance, the factor is not estimable and every element receives the mean.

use super::FeatureError;
use crate::shared::table::VariantTable;
use crate::stats::sample_variance;

/// Minimum group size above which the shrinkage factor is estimated.
const MIN_SHRINKAGE_GROUP: usize = 2;

/// Shrinkage factor for a group of defined values, or `None` when it is not estimable.
pub fn shrinkage_factor(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n <= MIN_SHRINKAGE_GROUP {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = sample_variance(values);
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    if var == 0.0 || sum_sq == 0.0 {
        return None;
    }
    Some((1.0 - (n - 2) as f64 * var / sum_sq).max(0.0))
}

/// Shrunken estimates for one group.
///
/// Undefined inputs do not contribute to the group statistics and stay undefined
/// in the output.
pub fn james_stein(values: &[f64]) -> Vec<f64> {
    let defined: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if defined.is_empty() {
        return vec![f64::NAN; values.len()];
    }
    let mean = defined.iter().sum::<f64>() / defined.len() as f64;
    let factor = shrinkage_factor(&defined);

    values
        .iter()
        .map(|&x| {
            if !x.is_finite() {
                f64::NAN
            } else {
                match factor {
                    Some(shrink) => mean + shrink * (x - mean),
                    None => mean,
                }
            }
        })
        .collect()
}

/// Fills `jse_normalized_dms` for every record, grouping by gene.
///
/// Returns the number of genes that were too small or too uniform to shrink.
pub fn shrink_by_gene(table: &mut VariantTable) -> Result<usize, FeatureError> {
    if !table.columns().normalized {
        return Err(FeatureError::MissingColumn(
            "normalized_dms_score".to_string(),
        ));
    }

    let groups = table.gene_groups();
    let mut unshrunk = 0;
    for (gene_id, indices) in &groups {
        let values: Vec<f64> = indices
            .iter()
            .map(|&i| table.records()[i].normalized_dms_score)
            .collect();
        let defined: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if shrinkage_factor(&defined).is_none() {
            unshrunk += 1;
            log::debug!(
                "Gene {gene_id}: {} defined scores, shrinkage not estimable; using the gene mean.",
                defined.len()
            );
        }
        let estimates = james_stein(&values);
        for (&i, estimate) in indices.iter().zip(estimates) {
            table.records_mut()[i].jse_normalized_dms = estimate;
        }
    }
    table.columns_mut().shrunk = true;

    log::info!(
        "Computed James-Stein estimates for {} genes ({unshrunk} left at the gene mean).",
        groups.len()
    );
    Ok(unshrunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::table::VariantRecord;
    use approx::assert_abs_diff_eq;

    #[test]
    fn small_groups_return_the_mean() {
        let out = james_stein(&[0.2, 0.8]);
        assert_eq!(out.len(), 2);
        for v in out {
            assert_abs_diff_eq!(v, 0.5, epsilon = 1e-12);
        }
        let single = james_stein(&[0.7]);
        assert_abs_diff_eq!(single[0], 0.7, epsilon = 1e-12);
    }

    #[test]
    fn zero_variance_returns_the_mean() {
        let out = james_stein(&[0.4, 0.4, 0.4, 0.4]);
        for v in out {
            assert_abs_diff_eq!(v, 0.4, epsilon = 1e-12);
        }
    }

    #[test]
    fn estimates_lie_between_raw_value_and_mean() {
        let values = [0.1, 0.5, 0.9, 1.3];
        let mean = 0.7;
        let out = james_stein(&values);
        let factor = shrinkage_factor(&values).unwrap();
        assert!(factor > 0.0 && factor <= 1.0);
        for (&raw, &est) in values.iter().zip(&out) {
            let (lo, hi) = if raw < mean { (raw, mean) } else { (mean, raw) };
            assert!(est >= lo - 1e-12 && est <= hi + 1e-12);
            assert_abs_diff_eq!(est, mean + factor * (raw - mean), epsilon = 1e-12);
        }
    }

    #[test]
    fn factor_matches_closed_form() {
        // With the unbiased variance the factor reduces to 1 / (n - 1).
        let values = [0.0, 1.0, 3.0, 4.0, 7.0];
        assert_abs_diff_eq!(shrinkage_factor(&values).unwrap(), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn undefined_members_stay_undefined() {
        let out = james_stein(&[0.1, f64::NAN, 0.9]);
        assert!(out[1].is_nan());
        assert_abs_diff_eq!(out[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn shrink_by_gene_groups_independently() {
        let mut records = Vec::new();
        for (i, score) in [0.0, 1.0, 2.0].iter().enumerate() {
            let record = VariantRecord::new("A", format!("a{i}"), i as i64, "L", "P");
            records.push(record.with_normalized(*score));
        }
        records.push(VariantRecord::new("B", "b0", 1, "L", "P").with_normalized(5.0));
        let mut table = VariantTable::from_records(records);

        let unshrunk = shrink_by_gene(&mut table).unwrap();
        assert_eq!(unshrunk, 1);
        assert_abs_diff_eq!(table.records()[3].jse_normalized_dms, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(table.records()[0].jse_normalized_dms, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn shrinking_before_normalization_is_rejected() {
        let records = vec![VariantRecord::new("A", "a", 1, "L", "P").with_scores(1.0, 1.0, 0.0)];
        let mut table = VariantTable::from_records(records);
        assert!(matches!(
            shrink_by_gene(&mut table),
            Err(FeatureError::MissingColumn(_))
        ));
    }
}
