//! Per-residue aggregation: mean normalized score across every substitution observed
//! at the same `(gene_id, position)`.

use super::FeatureError;
use crate::shared::table::{VariantRecord, VariantTable};
use ahash::AHashMap;

/// Position means fitted on a set of records.
#[derive(Debug, Clone, Default)]
pub struct PositionMeans {
    // gene -> position -> mean
    means: AHashMap<String, AHashMap<i64, f64>>,
}

impl PositionMeans {
    /// Fits means over the defined normalized scores of `records`.
    pub fn fit<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a VariantRecord>,
    {
        let mut sums: AHashMap<String, AHashMap<i64, (f64, usize)>> = AHashMap::new();
        for record in records {
            let entry = sums
                .entry(record.gene_id.clone())
                .or_default()
                .entry(record.position)
                .or_insert((0.0, 0));
            if record.normalized_dms_score.is_finite() {
                entry.0 += record.normalized_dms_score;
                entry.1 += 1;
            }
        }
        let means = sums
            .into_iter()
            .map(|(gene_id, positions)| {
                let positions: AHashMap<i64, f64> = positions
                    .into_iter()
                    .map(|(position, (sum, count))| {
                        let mean = if count == 0 {
                            f64::NAN
                        } else {
                            sum / count as f64
                        };
                        (position, mean)
                    })
                    .collect();
                (gene_id, positions)
            })
            .collect();
        Self { means }
    }

    /// Mean at the record's residue, `NaN` when the residue was not seen during fitting.
    pub fn lookup(&self, record: &VariantRecord) -> f64 {
        self.means
            .get(record.gene_id.as_str())
            .and_then(|positions| positions.get(&record.position))
            .copied()
            .unwrap_or(f64::NAN)
    }

    /// Number of fitted `(gene_id, position)` residues.
    pub fn len(&self) -> usize {
        self.means.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Broadcasts the per-position mean back onto every record as `mean_normalized_dms`.
pub fn aggregate_positions(table: &mut VariantTable) -> Result<usize, FeatureError> {
    if !table.columns().normalized {
        return Err(FeatureError::MissingColumn(
            "normalized_dms_score".to_string(),
        ));
    }

    let means = PositionMeans::fit(table.records());
    for record in table.records_mut() {
        record.mean_normalized_dms = means.lookup(record);
    }
    table.columns_mut().position_mean = true;
    log::info!("Aggregated normalized scores over {} residue positions.", means.len());
    Ok(means.len())
}
