use approx::assert_abs_diff_eq;
use std::fs;
use std::io::Write;
use tempfile::{Builder, NamedTempFile, tempdir};
use vefill::config::RunConfig;
use vefill::features::{FeatureSchema, preprocess};
use vefill::impute::{ImputationMetric, run_imputation_benchmark};
use vefill::noise::noise_ceiling;
use vefill::runner::EvaluationHarness;
use vefill::shared::data::{load_substitution_matrix, load_variant_table};
use vefill::shared::output::{write_imputation_report, write_noise_report, write_policy_report};
use vefill::shared::table::VariantTable;
use vefill::splits::{GroupSplitter, SplitPolicy};
use vefill::trainer::{MeanBaseline, RidgeTrainer};

fn csv_file(content: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
    write!(file, "{content}").unwrap();
    file.flush().unwrap();
    file
}

fn load_default(file: &NamedTempFile) -> VariantTable {
    load_variant_table(file.path().to_str().unwrap(), &FeatureSchema::default()).unwrap()
}

/// Gene A: three positions with two substitutions each. Gene B: one position, two substitutions.
fn two_gene_csv() -> NamedTempFile {
    csv_file(
        "gene_id,mutation_id,position,wt_residue,variant_residue,edit_distance,\
         dms_score,wt_score,non_score,sigma\n\
         A,L1G,1,L,G,1,0.9,1.0,0.0,0.05\n\
         A,L1W,1,L,W,2,0.7,1.0,0.0,0.05\n\
         A,K2E,2,K,E,1,0.4,1.0,0.0,0.05\n\
         A,K2P,2,K,P,3,0.1,1.0,0.0,0.05\n\
         A,M3I,3,M,I,1,0.8,1.0,0.0,0.05\n\
         A,M3D,3,M,D,2,0.3,1.0,0.0,0.05\n\
         B,S7N,7,S,N,1,0.6,1.0,0.0,\n\
         B,S7R,7,S,R,2,0.5,1.0,0.0,\n",
    )
}

#[test]
fn leave_position_out_on_the_two_gene_table() {
    let file = two_gene_csv();
    let mut table = load_default(&file);
    let summary = preprocess(&mut table).unwrap();
    assert_eq!(summary.undefined_scores, 0);
    assert_eq!(summary.positions, 4);
    assert_abs_diff_eq!(table.records()[0].normalized_dms_score, 0.9, epsilon = 1e-12);

    let trainer = MeanBaseline;
    let harness = EvaluationHarness::new(
        GroupSplitter::new(RunConfig::default().split_config()),
        FeatureSchema::default(),
        &trainer,
    );
    let report = harness.evaluate(&table, SplitPolicy::LeavePositionOut).unwrap();
    assert_eq!(report.evaluations.len(), 3);
    for evaluation in &report.evaluations {
        assert_eq!(evaluation.train_size, 4);
        assert_eq!(evaluation.test_size, 2);
    }
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].gene_id, "B");

    let dir = tempdir().unwrap();
    let written = write_policy_report(dir.path(), &report).unwrap();
    assert_eq!(written.len(), 2);
    let results = fs::read_to_string(dir.path().join("leave_position_out_results.csv")).unwrap();
    let mut lines = results.lines();
    assert_eq!(
        lines.next(),
        Some(
            "policy,gene_id,position_out,train_size,train_RMSE,train_MAE,train_R2,train_pearson_r,\
             test_size,test_RMSE,test_MAE,test_R2,test_pearson_r"
        )
    );
    assert_eq!(lines.count(), 3);

    let mutations =
        fs::read_to_string(dir.path().join("leave_position_out_mutations_gene_A.csv")).unwrap();
    assert_eq!(mutations.lines().count(), 7);
    assert!(!dir.path().join("leave_position_out_mutations_gene_B.csv").exists());
}

#[test]
fn every_policy_runs_end_to_end_with_ridge() {
    let mut rows = String::from(
        "gene_id,mutation_id,position,wt_residue,variant_residue,edit_distance,\
         normalized_dms_score,hydrophobicity\n",
    );
    let residues = ["H", "E", "W", "P"];
    for gene in ["G1", "G2", "G3"] {
        for position in 1..=8 {
            for (k, residue) in residues.iter().enumerate() {
                let hydrophobicity = (position * 7 + k * 3) % 11;
                let score = 0.05 * hydrophobicity as f64 + 0.02 * position as f64;
                let edit = if k % 2 == 0 { 1 } else { 2 };
                rows.push_str(&format!(
                    "{gene},A{position}{residue},{position},A,{residue},\
                     {edit},{score},{hydrophobicity}\n"
                ));
            }
        }
    }
    let file = csv_file(&rows);
    let schema = FeatureSchema::with_columns(["hydrophobicity"]);
    let mut table = load_variant_table(file.path().to_str().unwrap(), &schema).unwrap();
    preprocess(&mut table).unwrap();

    let trainer = RidgeTrainer::new(1.0).unwrap();
    let splitter = GroupSplitter::new(RunConfig::default().split_config());
    let harness = EvaluationHarness::new(splitter, schema, &trainer);
    let dir = tempdir().unwrap();
    for policy in SplitPolicy::ALL {
        let report = harness.evaluate(&table, policy).unwrap();
        assert!(report.failed.is_empty(), "{policy} failed: {:?}", report.failed);
        assert!(!report.evaluations.is_empty(), "{policy} produced no evaluations");
        let held_out: usize = report.evaluations.iter().map(|e| e.test_size).sum();
        assert_eq!(report.mutations.len(), held_out);
        for evaluation in &report.evaluations {
            assert!(evaluation.train.rmse.is_finite());
        }
        write_policy_report(dir.path(), &report).unwrap();
        assert!(dir.path().join(format!("{}_results.csv", policy.label())).exists());
    }
}

#[test]
fn imputation_benchmark_from_files() {
    let mut rows = String::from(
        "gene_id,mutation_id,position,wt_residue,variant_residue,normalized_dms_score\n",
    );
    let residues = ["A", "C", "D", "E", "F"];
    for position in 1..=12 {
        for residue in residues {
            let score = position as f64 / 12.0;
            rows.push_str(&format!("P1,L{position}{residue},{position},L,{residue},{score}\n"));
        }
    }
    let table_file = csv_file(&rows);

    let mut matrix_rows = String::from("amino_acid_x,amino_acid_y,blosum100\n");
    for x in residues {
        for y in residues {
            matrix_rows.push_str(&format!("{x},{y},1\n"));
        }
    }
    let matrix_file = csv_file(&matrix_rows);

    let mut table = load_default(&table_file);
    preprocess(&mut table).unwrap();
    let matrix =
        load_substitution_matrix(matrix_file.path().to_str().unwrap(), "blosum100").unwrap();
    let config = RunConfig::default();
    let metric = ImputationMetric::Matrix(matrix);
    let report = run_imputation_benchmark(&table, &metric, &config.imputation, config.seed);

    assert_eq!(report.correlations.len(), 1);
    assert_eq!(report.correlations[0].n_test, 6);
    for variant in &report.imputations {
        assert_eq!(variant.imputed, Some(variant.normalized_dms_score));
    }

    let dir = tempdir().unwrap();
    let (correlations, imputations) =
        write_imputation_report(dir.path(), metric.name(), &report).unwrap();
    assert!(correlations.ends_with("blosum100_correlations.csv"));
    assert_eq!(fs::read_to_string(imputations).unwrap().lines().count(), 7);
}

#[test]
fn noise_ceiling_skips_genes_without_sigma() {
    let file = two_gene_csv();
    let table = load_default(&file);
    let config = RunConfig::default();
    let report = noise_ceiling(&table, &config.noise, config.seed);

    assert_eq!(report.ceilings.len(), 1);
    assert_eq!(report.ceilings[0].gene_id, "A");
    assert_eq!(report.ceilings[0].n_variants, 6);
    assert!(report.ceilings[0].median_r > 0.9);
    assert_eq!(report.skipped.len(), 1);

    let dir = tempdir().unwrap();
    let path = dir.path().join("noise_ceiling.csv");
    write_noise_report(&path, &report).unwrap();
    let text = fs::read_to_string(path).unwrap();
    assert!(text.starts_with("gene_id,n_variants,mean_r,median_r,p05_r,p95_r\n"));
}
