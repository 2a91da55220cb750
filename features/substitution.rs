//! Substitution-level fitness prior.
//!
//! For each gene and amino-acid substitution `wt -> variant`, the mean normalized
//! score over every position where that substitution was measured. The prior must be
//! fitted on the training partition of a split only; held-out variants read it but
//! never contribute to it.

use crate::shared::table::VariantRecord;
use ahash::AHashMap;

/// Nested by gene, then wild-type residue, then variant residue.
type ByGene<T> = AHashMap<String, AHashMap<String, AHashMap<String, T>>>;

#[derive(Debug, Clone, Default)]
pub struct SubstitutionPrior {
    means: ByGene<f64>,
}

impl SubstitutionPrior {
    pub fn fit<'a, I>(training: I) -> Self
    where
        I: IntoIterator<Item = &'a VariantRecord>,
    {
        let mut sums: ByGene<(f64, usize)> = AHashMap::new();
        for record in training {
            if !record.normalized_dms_score.is_finite() {
                continue;
            }
            let (sum, count) = entry(
                &mut sums,
                &record.gene_id,
                &record.wt_residue,
                &record.variant_residue,
            );
            *sum += record.normalized_dms_score;
            *count += 1;
        }
        let means = sums
            .into_iter()
            .map(|(gene, by_wt)| {
                let by_wt: AHashMap<String, AHashMap<String, f64>> = by_wt
                    .into_iter()
                    .map(|(wt, by_variant)| {
                        let by_variant: AHashMap<String, f64> = by_variant
                            .into_iter()
                            .map(|(variant, (sum, count))| (variant, sum / count as f64))
                            .collect();
                        (wt, by_variant)
                    })
                    .collect();
                (gene, by_wt)
            })
            .collect();
        Self { means }
    }

    /// The fitted mean for the record's substitution within its gene.
    pub fn get(&self, record: &VariantRecord) -> Option<f64> {
        self.means
            .get(record.gene_id.as_str())?
            .get(record.wt_residue.as_str())?
            .get(record.variant_residue.as_str())
            .copied()
    }

    /// Same as [`get`](Self::get) with `NaN` for unseen substitutions, for design matrices.
    pub fn lookup(&self, record: &VariantRecord) -> f64 {
        self.get(record).unwrap_or(f64::NAN)
    }

    /// Number of fitted `(gene_id, wt, variant)` substitutions.
    pub fn len(&self) -> usize {
        self.means
            .values()
            .flat_map(|m| m.values())
            .map(|m| m.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn entry<'a, T: Default>(
    map: &'a mut ByGene<T>,
    gene: &str,
    wt: &str,
    variant: &str,
) -> &'a mut T {
    map.entry(gene.to_string())
        .or_default()
        .entry(wt.to_string())
        .or_default()
        .entry(variant.to_string())
        .or_default()
}
