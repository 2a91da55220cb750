//! # Score Normalization
//!
//! Rescales raw assay scores so that every assay shares one scale: the wild-type
//! reference maps to `1.0` and the nonsense (null) reference maps to `0.0`.
//!
//! `normalized = (dms_score - wt_score) / (wt_score - non_score) + 1`
//!
//! The transform is undefined when the two references coincide. Such records get
//! `NaN` and are filtered by the consumers rather than rejected here.

use super::FeatureError;
use crate::shared::table::VariantTable;

pub fn normalize_score(dms_score: f64, wt_score: f64, non_score: f64) -> f64 {
    let span = wt_score - non_score;
    if span == 0.0 || !span.is_finite() {
        return f64::NAN;
    }
    (dms_score - wt_score) / span + 1.0
}

/// Writes `normalized_dms_score` for every record and returns how many came out undefined.
pub fn normalize_table(table: &mut VariantTable) -> Result<usize, FeatureError> {
    if !table.columns().raw_scores {
        return Err(FeatureError::MissingColumn("dms_score".to_string()));
    }

    let mut undefined = 0;
    for record in table.records_mut() {
        let Some(raw) = record.raw else {
            return Err(FeatureError::MissingColumn("dms_score".to_string()));
        };
        record.normalized_dms_score = normalize_score(raw.dms_score, raw.wt_score, raw.non_score);
        if record.normalized_dms_score.is_nan() {
            undefined += 1;
        }
    }
    table.columns_mut().normalized = true;

    if undefined > 0 {
        log::warn!(
            "{undefined} of {} records have wt_score == non_score; \
             their normalized score is undefined.",
            table.len()
        );
    }
    Ok(undefined)
}
