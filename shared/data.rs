//! # Data Loading and Validation
//!
//! Reads the variant table and substitution matrices from CSV (or TSV, chosen by the
//! `.tsv` extension) with polars and validates them against a fixed schema:
//!
//! - Identifier columns `gene_id`, `mutation_id`, `position`, `wt_residue` and
//!   `variant_residue` are required and may not contain nulls.
//! - Scores are either the raw triple `dms_score`, `wt_score`, `non_score`, or a
//!   precomputed `normalized_dms_score`. Nulls in score columns become `NaN`.
//! - Model features are exactly the columns named by the [`FeatureSchema`].

use crate::features::FeatureSchema;
use crate::impute::SubstitutionMatrix;
use crate::shared::table::{AssayScores, ScoreColumns, TableError, VariantRecord, VariantTable};
use ndarray::Array2;
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

pub const IDENTIFIER_COLUMNS: [&str; 5] = [
    "gene_id",
    "mutation_id",
    "position",
    "wt_residue",
    "variant_residue",
];

pub const RAW_SCORE_COLUMNS: [&str; 3] = ["dms_score", "wt_score", "non_score"];

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. \
         Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The column '{column_name}' could not be converted to the expected type \
         '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Missing or null values were found in the required identifier column '{0}'.")]
    MissingValuesFound(String),
    #[error(
        "No score columns found. Provide either 'dms_score', 'wt_score' and 'non_score', \
         or 'normalized_dms_score'."
    )]
    NoScoreColumns,
    #[error("The input file '{0}' contains no data rows.")]
    EmptyTable(String),
    #[error(transparent)]
    Table(#[from] TableError),
}

fn separator_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

fn read_frame(path: &Path) -> Result<DataFrame, DataError> {
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(separator_for(path))),
        )
        .finish()?;
    if df.height() == 0 {
        return Err(DataError::EmptyTable(path.display().to_string()));
    }
    Ok(df)
}

fn column_names(df: &DataFrame) -> HashSet<String> {
    df.get_column_names().into_iter().map(|s| s.to_string()).collect()
}

/// A numeric column with nulls (and unparseable entries) as `NaN`.
fn numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let column = df.column(column_name)?;
    let casted = column
        .cast(&DataType::Float64)
        .map_err(|_| DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64",
            found_type: format!("{:?}", column.dtype()),
        })?;
    let chunked = casted.f64()?;
    Ok(chunked
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// A required identifier column rendered as strings.
fn identifier_column(df: &DataFrame, column_name: &str) -> Result<Vec<String>, DataError> {
    let column = df.column(column_name)?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }
    let casted = column.cast(&DataType::String)?;
    let chunked = casted.str()?;
    Ok(chunked
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

fn position_column(df: &DataFrame) -> Result<Vec<i64>, DataError> {
    let column = df.column("position")?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound("position".to_string()));
    }
    let wrong_type = || DataError::ColumnWrongType {
        column_name: "position".to_string(),
        expected_type: "i64",
        found_type: format!("{:?}", column.dtype()),
    };
    let casted = column.cast(&DataType::Int64).map_err(|_| wrong_type())?;
    if casted.null_count() > 0 {
        return Err(wrong_type());
    }
    let chunked = casted.i64()?.rechunk();
    Ok(chunked.into_no_null_iter().collect())
}

/// Loads the variant table with the passthrough features named by `schema`.
pub fn load_variant_table(path: &str, schema: &FeatureSchema) -> Result<VariantTable, DataError> {
    let path = Path::new(path);
    log::info!("Loading variant table from '{}'", path.display());
    let df = read_frame(path)?;
    let available = column_names(&df);

    let required = IDENTIFIER_COLUMNS
        .iter()
        .copied()
        .chain(schema.columns.iter().map(String::as_str));
    for name in required {
        if !available.contains(name) {
            return Err(DataError::ColumnNotFound(name.to_string()));
        }
    }
    let has_raw = RAW_SCORE_COLUMNS.iter().all(|c| available.contains(*c));
    let has_normalized = available.contains("normalized_dms_score");
    if !has_raw && !has_normalized {
        return Err(DataError::NoScoreColumns);
    }

    let gene_ids = identifier_column(&df, "gene_id")?;
    let mutation_ids = identifier_column(&df, "mutation_id")?;
    let positions = position_column(&df)?;
    let wt_residues = identifier_column(&df, "wt_residue")?;
    let variant_residues = identifier_column(&df, "variant_residue")?;

    let n = df.height();
    let optional = |name: &str| -> Result<Option<Vec<f64>>, DataError> {
        if available.contains(name) {
            numeric_column(&df, name).map(Some)
        } else {
            Ok(None)
        }
    };
    let raw = if has_raw {
        Some((
            numeric_column(&df, "dms_score")?,
            numeric_column(&df, "wt_score")?,
            numeric_column(&df, "non_score")?,
        ))
    } else {
        None
    };
    let normalized = optional("normalized_dms_score")?;
    let shrunk = optional("jse_normalized_dms")?;
    let position_mean = optional("mean_normalized_dms")?;
    let sigma = optional("sigma")?;
    let edit_distance = optional("edit_distance")?;

    let mut records = Vec::with_capacity(n);
    for i in 0..n {
        let mut record = VariantRecord::new(
            gene_ids[i].clone(),
            mutation_ids[i].clone(),
            positions[i],
            wt_residues[i].clone(),
            variant_residues[i].clone(),
        );
        record.edit_distance = edit_distance
            .as_ref()
            .map_or(0, |values| coerce_edit_distance(values[i]));
        if let Some((dms, wt, non)) = &raw {
            record.raw = Some(AssayScores {
                dms_score: dms[i],
                wt_score: wt[i],
                non_score: non[i],
            });
        }
        let at = |values: &Option<Vec<f64>>| values.as_ref().map_or(f64::NAN, |v| v[i]);
        record.normalized_dms_score = at(&normalized);
        record.jse_normalized_dms = at(&shrunk);
        record.mean_normalized_dms = at(&position_mean);
        record.sigma = at(&sigma);
        records.push(record);
    }

    let mut features = Array2::<f64>::zeros((n, schema.columns.len()));
    for (j, name) in schema.columns.iter().enumerate() {
        let values = numeric_column(&df, name)?;
        for (i, value) in values.into_iter().enumerate() {
            features[[i, j]] = value;
        }
    }

    let columns = ScoreColumns {
        raw_scores: has_raw,
        normalized: has_normalized,
        shrunk: shrunk.is_some(),
        position_mean: position_mean.is_some(),
        sigma: sigma.is_some(),
    };
    log::info!(
        "Loaded {} variants with {} feature columns (raw scores: {}, normalized scores: {}).",
        n,
        schema.columns.len(),
        has_raw,
        has_normalized
    );
    Ok(VariantTable::new(records, schema.columns.clone(), features, columns)?)
}

/// Missing, negative or non-numeric edit distances count as 0, which excludes the
/// variant from the SNV training partition.
fn coerce_edit_distance(value: f64) -> u32 {
    if value.is_finite() && value >= 0.0 {
        value.round() as u32
    } else {
        0
    }
}

/// Loads one named matrix column from a table keyed by `amino_acid_x`, `amino_acid_y`.
pub fn load_substitution_matrix(
    path: &str,
    matrix_column: &str,
) -> Result<SubstitutionMatrix, DataError> {
    let path = Path::new(path);
    log::info!("Loading substitution matrix '{matrix_column}' from '{}'", path.display());
    let df = read_frame(path)?;
    let available = column_names(&df);
    for name in ["amino_acid_x", "amino_acid_y", matrix_column] {
        if !available.contains(name) {
            return Err(DataError::ColumnNotFound(name.to_string()));
        }
    }
    let from = identifier_column(&df, "amino_acid_x")?;
    let to = identifier_column(&df, "amino_acid_y")?;
    let scores = numeric_column(&df, matrix_column)?;
    let matrix = SubstitutionMatrix::from_pairs(
        matrix_column,
        from.into_iter().zip(to).zip(scores).map(|((x, y), s)| (x, y, s)),
    );
    if matrix.len() < df.height() {
        log::warn!(
            "{} of {} rows of matrix '{matrix_column}' were skipped \
             (missing score or duplicate pair).",
            df.height() - matrix.len(),
            df.height()
        );
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::{self, Write};
    use tempfile::{Builder, NamedTempFile};

    fn create_test_csv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = Builder::new().suffix(".csv").tempfile()?;
        write!(file, "{content}")?;
        file.flush()?;
        Ok(file)
    }

    fn path_of(file: &NamedTempFile) -> &str {
        file.path().to_str().unwrap()
    }

    #[test]
    fn loads_raw_scores_and_schema_features() {
        let file = create_test_csv(
            "gene_id,mutation_id,position,wt_residue,variant_residue,edit_distance,\
             dms_score,wt_score,non_score,conservation\n\
             P53,R175H,175,R,H,1,0.2,1.0,0.0,0.9\n\
             P53,R175W,175,R,W,,0.4,1.0,0.0,\n\
             BRCA1,C61G,61,C,G,2,0.6,1.0,0.0,0.1\n",
        )
        .unwrap();
        let schema = FeatureSchema::with_columns(["conservation"]);
        let table = load_variant_table(path_of(&file), &schema).unwrap();

        assert_eq!(table.len(), 3);
        assert!(table.columns().raw_scores);
        assert!(!table.columns().normalized);
        let records = table.records();
        assert_eq!(records[0].gene_id, "P53");
        assert_eq!(records[0].position, 175);
        assert_eq!(records[0].edit_distance, 1);
        assert_eq!(records[1].edit_distance, 0);
        assert_eq!(records[2].edit_distance, 2);
        assert_abs_diff_eq!(records[2].raw.unwrap().dms_score, 0.6, epsilon = 1e-12);
        assert!(records[0].normalized_dms_score.is_nan());

        assert_eq!(table.feature_names(), ["conservation".to_string()]);
        assert_abs_diff_eq!(table.features()[[0, 0]], 0.9, epsilon = 1e-12);
        assert!(table.features()[[1, 0]].is_nan());
    }

    #[test]
    fn normalized_scores_alone_are_enough() {
        let file = create_test_csv(
            "gene_id,mutation_id,position,wt_residue,variant_residue,normalized_dms_score,sigma\n\
             G,A1V,1,A,V,0.75,0.1\n\
             G,A1L,1,A,L,,0.2\n",
        )
        .unwrap();
        let table = load_variant_table(path_of(&file), &FeatureSchema::default()).unwrap();
        assert!(table.columns().normalized && table.columns().sigma);
        assert!(!table.columns().raw_scores);
        assert_abs_diff_eq!(table.records()[0].normalized_dms_score, 0.75, epsilon = 1e-12);
        assert!(table.records()[1].normalized_dms_score.is_nan());
        assert_eq!(table.records()[0].edit_distance, 0);
    }

    #[test]
    fn tab_separated_files_are_detected() {
        let mut file = Builder::new().suffix(".tsv").tempfile().unwrap();
        write!(
            file,
            "gene_id\tmutation_id\tposition\twt_residue\tvariant_residue\tnormalized_dms_score\n\
             G\tA1V\t1\tA\tV\t0.5\n"
        )
        .unwrap();
        file.flush().unwrap();
        let table = load_variant_table(path_of(&file), &FeatureSchema::default()).unwrap();
        assert_eq!(table.records()[0].mutation_id, "A1V");
    }

    #[test]
    fn error_column_not_found() {
        let file = create_test_csv(
            "gene_id,mutation_id,wt_residue,variant_residue,normalized_dms_score\nG,A1V,A,V,0.5\n",
        )
        .unwrap();
        match load_variant_table(path_of(&file), &FeatureSchema::default()) {
            Err(DataError::ColumnNotFound(col)) => assert_eq!(col, "position"),
            other => panic!("Expected ColumnNotFound, got {other:?}"),
        }
    }

    #[test]
    fn error_missing_feature_column() {
        let file = create_test_csv(
            "gene_id,mutation_id,position,wt_residue,variant_residue,normalized_dms_score\n\
             G,A1V,1,A,V,0.5\n",
        )
        .unwrap();
        let schema = FeatureSchema::with_columns(["hydrophobicity"]);
        match load_variant_table(path_of(&file), &schema) {
            Err(DataError::ColumnNotFound(col)) => assert_eq!(col, "hydrophobicity"),
            other => panic!("Expected ColumnNotFound, got {other:?}"),
        }
    }

    #[test]
    fn error_no_score_columns() {
        let file = create_test_csv(
            "gene_id,mutation_id,position,wt_residue,variant_residue,dms_score\nG,A1V,1,A,V,0.5\n",
        )
        .unwrap();
        assert!(matches!(
            load_variant_table(path_of(&file), &FeatureSchema::default()),
            Err(DataError::NoScoreColumns)
        ));
    }

    #[test]
    fn error_null_identifier() {
        let file = create_test_csv(
            "gene_id,mutation_id,position,wt_residue,variant_residue,normalized_dms_score\n\
             G,A1V,1,A,V,0.5\n\
             ,A2V,2,A,V,0.5\n",
        )
        .unwrap();
        match load_variant_table(path_of(&file), &FeatureSchema::default()) {
            Err(DataError::MissingValuesFound(col)) => assert_eq!(col, "gene_id"),
            other => panic!("Expected MissingValuesFound, got {other:?}"),
        }
    }

    #[test]
    fn error_non_numeric_position() {
        let file = create_test_csv(
            "gene_id,mutation_id,position,wt_residue,variant_residue,normalized_dms_score\n\
             G,A1V,first,A,V,0.5\n",
        )
        .unwrap();
        assert!(matches!(
            load_variant_table(path_of(&file), &FeatureSchema::default()),
            Err(DataError::ColumnWrongType { column_name, .. }) if column_name == "position"
        ));
    }

    #[test]
    fn loads_a_named_matrix_column() {
        let file = create_test_csv(
            "amino_acid_x,amino_acid_y,blosum62,blosum100\n\
             D,E,2,3\n\
             E,D,2,1\n\
             W,C,-2,\n",
        )
        .unwrap();
        let matrix = load_substitution_matrix(path_of(&file), "blosum100").unwrap();
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.score("D", "E"), Some(3.0));
        assert_eq!(matrix.score("E", "D"), Some(1.0));
        assert_eq!(matrix.score("W", "C"), None);

        assert!(matches!(
            load_substitution_matrix(path_of(&file), "pam250"),
            Err(DataError::ColumnNotFound(col)) if col == "pam250"
        ));
    }
}
