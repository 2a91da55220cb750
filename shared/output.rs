//! CSV result tables.

use crate::impute::ImputationReport;
use crate::noise::NoiseReport;
use crate::records::{evaluation_header, format_value, mutation_header};
use crate::runner::PolicyReport;
use crate::shared::table::VariantTable;
use csv::Writer;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn prepare_output_path(path: &Path) -> Result<(), io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn create_writer(path: &Path) -> Result<Writer<File>, OutputError> {
    prepare_output_path(path)?;
    Ok(Writer::from_path(path)?)
}

/// Gene ids may contain characters that are unsafe in file names.
fn file_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

/// Writes `{policy}_results.csv` and one `{policy}_mutations_gene_{gene}.csv` per gene.
///
/// Returns every path written, results table first.
pub fn write_policy_report(dir: &Path, report: &PolicyReport) -> Result<Vec<PathBuf>, OutputError> {
    let label = report.policy.label();
    let results_path = dir.join(format!("{label}_results.csv"));
    let mut writer = create_writer(&results_path)?;
    writer.write_record(evaluation_header(report.policy))?;
    for evaluation in &report.evaluations {
        writer.write_record(evaluation.to_row())?;
    }
    writer.flush()?;

    let mut written = vec![results_path];
    let mut genes: Vec<&str> = Vec::new();
    for mutation in &report.mutations {
        if !genes.contains(&mutation.gene_id.as_str()) {
            genes.push(&mutation.gene_id);
        }
    }
    for gene in genes {
        let path = dir.join(format!("{label}_mutations_gene_{}.csv", file_component(gene)));
        let mut writer = create_writer(&path)?;
        writer.write_record(mutation_header(report.policy))?;
        for mutation in report.mutations.iter().filter(|m| m.gene_id == gene) {
            writer.write_record(mutation.to_row())?;
        }
        writer.flush()?;
        written.push(path);
    }
    Ok(written)
}

/// Writes the enriched table: identifiers, raw and derived scores, then schema features.
pub fn write_variant_table(path: &Path, table: &VariantTable) -> Result<(), OutputError> {
    let mut writer = create_writer(path)?;
    let columns = table.columns();
    let mut header: Vec<String> = [
        "gene_id",
        "mutation_id",
        "position",
        "wt_residue",
        "variant_residue",
        "edit_distance",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    if columns.raw_scores {
        header.extend(["dms_score", "wt_score", "non_score"].map(String::from));
    }
    if columns.sigma {
        header.push("sigma".to_string());
    }
    header.extend(
        ["normalized_dms_score", "jse_normalized_dms", "mean_normalized_dms"].map(String::from),
    );
    header.extend(table.feature_names().iter().cloned());
    writer.write_record(&header)?;

    for (record, features) in table.records().iter().zip(table.features().rows()) {
        let mut row = vec![
            record.gene_id.clone(),
            record.mutation_id.clone(),
            record.position.to_string(),
            record.wt_residue.clone(),
            record.variant_residue.clone(),
            record.edit_distance.to_string(),
        ];
        if columns.raw_scores {
            let (dms, wt, non) = record
                .raw
                .map_or((f64::NAN, f64::NAN, f64::NAN), |r| (r.dms_score, r.wt_score, r.non_score));
            row.extend([dms, wt, non].map(format_value));
        }
        if columns.sigma {
            row.push(format_value(record.sigma));
        }
        row.extend(
            [
                record.normalized_dms_score,
                record.jse_normalized_dms,
                record.mean_normalized_dms,
            ]
            .map(format_value),
        );
        row.extend(features.iter().map(|&v| format_value(v)));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `{metric}_correlations.csv` and `{metric}_imputations.csv`.
pub fn write_imputation_report(
    dir: &Path,
    metric: &str,
    report: &ImputationReport,
) -> Result<(PathBuf, PathBuf), OutputError> {
    let stem = file_component(metric);
    let correlations_path = dir.join(format!("{stem}_correlations.csv"));
    let mut writer = create_writer(&correlations_path)?;
    writer.write_record(["gene_id", "n_test", "n_defined", "pearson_r"])?;
    for gene in &report.correlations {
        writer.write_record([
            gene.gene_id.clone(),
            gene.n_test.to_string(),
            gene.n_defined.to_string(),
            format_value(gene.pearson_r),
        ])?;
    }
    writer.flush()?;

    let imputations_path = dir.join(format!("{stem}_imputations.csv"));
    let mut writer = create_writer(&imputations_path)?;
    writer.write_record([
        "gene_id",
        "mutation_id",
        "position",
        "wt_residue",
        "variant_residue",
        "normalized_dms_score",
        "imputed_score",
    ])?;
    for variant in &report.imputations {
        writer.write_record([
            variant.gene_id.clone(),
            variant.mutation_id.clone(),
            variant.position.to_string(),
            variant.wt_residue.clone(),
            variant.variant_residue.clone(),
            format_value(variant.normalized_dms_score),
            format_value(variant.imputed.unwrap_or(f64::NAN)),
        ])?;
    }
    writer.flush()?;
    Ok((correlations_path, imputations_path))
}

pub fn write_noise_report(path: &Path, report: &NoiseReport) -> Result<(), OutputError> {
    let mut writer = create_writer(path)?;
    writer.write_record(["gene_id", "n_variants", "mean_r", "median_r", "p05_r", "p95_r"])?;
    for ceiling in &report.ceilings {
        writer.write_record([
            ceiling.gene_id.clone(),
            ceiling.n_variants.to_string(),
            format_value(ceiling.mean_r),
            format_value(ceiling.median_r),
            format_value(ceiling.p05_r),
            format_value(ceiling.p95_r),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
