#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

use vefill::config::RunConfig;
use vefill::features::preprocess;
use vefill::impute::{ImputationMetric, run_imputation_benchmark};
use vefill::noise::noise_ceiling;
use vefill::runner::EvaluationHarness;
use vefill::shared::data::{load_substitution_matrix, load_variant_table};
use vefill::shared::output::{
    write_imputation_report, write_noise_report, write_policy_report, write_variant_table,
};
use vefill::shared::table::VariantTable;
use vefill::splits::{GroupSplitter, SplitPolicy};

#[derive(Parser)]
#[command(
    name = "vefill",
    version,
    about = "Grouped evaluation harness for variant-effect score prediction",
    long_about = "Normalizes deep mutational scanning scores, derives gene- and position-level \
                 statistics, and evaluates predictors under group-aware train/test policies."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct CommonArgs {
    /// Run configuration in TOML; defaults apply for anything it omits
    #[arg(long, value_name = "PATH")]
    config: Option<String>,

    /// Directory for result tables (overrides `output_dir` from the configuration)
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

#[derive(Clone, ValueEnum)]
enum MetricCli {
    Matrix,
    Fitness,
}

#[derive(Clone)]
enum PolicySelection {
    All,
    One(SplitPolicy),
}

impl PolicySelection {
    fn policies(&self) -> Vec<SplitPolicy> {
        match self {
            Self::All => SplitPolicy::ALL.to_vec(),
            Self::One(policy) => vec![*policy],
        }
    }
}

fn parse_policy_selection(value: &str) -> Result<PolicySelection, String> {
    if value.eq_ignore_ascii_case("all") {
        Ok(PolicySelection::All)
    } else {
        SplitPolicy::from_str(value).map(PolicySelection::One)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize scores and derive the shrunken and position-level columns
    #[command(about = "Normalize and enrich a variant table (outputs: enriched CSV)")]
    Preprocess {
        /// Variant table (CSV, or TSV by extension)
        #[arg(value_name = "INPUT")]
        input: String,

        /// Path of the enriched table
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Run configuration selecting the passthrough feature columns
        #[arg(long, value_name = "PATH")]
        config: Option<String>,
    },

    /// Evaluate the configured trainer under one or all split policies
    #[command(
        about = "Run grouped evaluation (outputs: {policy}_results.csv, per-gene mutation tables)"
    )]
    Evaluate {
        #[arg(value_name = "TABLE")]
        table: String,

        /// Split policy name, or `all`
        #[arg(long, value_parser = parse_policy_selection, default_value = "all")]
        policy: PolicySelection,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Benchmark nearest-neighbor imputation on per-gene holdouts
    #[command(about = "Run the imputation benchmark (outputs: correlation and imputation tables)")]
    Impute {
        #[arg(value_name = "TABLE")]
        table: String,

        #[arg(long, value_enum)]
        metric: MetricCli,

        /// Substitution matrix table with `amino_acid_x`, `amino_acid_y` and matrix columns
        #[arg(long, value_name = "PATH", required_if_eq("metric", "matrix"))]
        matrix: Option<String>,

        /// Name of the matrix column to use
        #[arg(long, value_name = "NAME", required_if_eq("metric", "matrix"))]
        matrix_column: Option<String>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Simulate per-gene noise ceilings from the reported sigma
    #[command(about = "Simulate noise ceilings (outputs: noise_ceiling.csv)")]
    NoiseCeiling {
        #[arg(value_name = "TABLE")]
        table: String,

        #[command(flatten)]
        common: CommonArgs,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Preprocess {
            input,
            output,
            config,
        }) => run_preprocess(&input, &output, config.as_deref()),
        Some(Commands::Evaluate {
            table,
            policy,
            common,
        }) => run_evaluate(&table, &policy, &common),
        Some(Commands::Impute {
            table,
            metric,
            matrix,
            matrix_column,
            common,
        }) => run_impute(&table, &metric, matrix.as_deref(), matrix_column.as_deref(), &common),
        Some(Commands::NoiseCeiling { table, common }) => run_noise_ceiling(&table, &common),
        None => match Cli::command().print_help() {
            Ok(()) => {
                println!();
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(path: Option<&str>) -> Result<RunConfig, Box<dyn Error>> {
    match path {
        Some(path) => Ok(RunConfig::load(path)?),
        None => Ok(RunConfig::default()),
    }
}

fn output_dir(config: &RunConfig, common: &CommonArgs) -> PathBuf {
    common
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output_dir.clone())
}

/// Loads the table, derives scores when missing and drops undefined scores.
fn prepared_table(path: &str, config: &RunConfig) -> Result<VariantTable, Box<dyn Error>> {
    let mut table = load_variant_table(path, &config.features)?;
    if table.columns().raw_scores || !table.columns().normalized {
        let summary = preprocess(&mut table)?;
        println!(
            "Preprocessed {} variants: {} undefined scores, {} positions.",
            table.len(),
            summary.undefined_scores,
            summary.positions
        );
    }
    let dropped = table.retain_defined_scores();
    if dropped > 0 {
        log::warn!("Dropped {dropped} variants with an undefined normalized score.");
    }
    Ok(table)
}

fn run_preprocess(input: &str, output: &Path, config: Option<&str>) -> Result<(), Box<dyn Error>> {
    let config = load_config(config)?;
    let mut table = load_variant_table(input, &config.features)?;
    let summary = preprocess(&mut table)?;
    write_variant_table(output, &table)?;
    println!(
        "Wrote {} variants to '{}' ({} undefined scores, {} genes left unshrunk, {} positions).",
        table.len(),
        output.display(),
        summary.undefined_scores,
        summary.unshrunk_genes,
        summary.positions
    );
    Ok(())
}

fn run_evaluate(
    path: &str,
    selection: &PolicySelection,
    common: &CommonArgs,
) -> Result<(), Box<dyn Error>> {
    let config = load_config(common.config.as_deref())?;
    let out = output_dir(&config, common);
    let table = prepared_table(path, &config)?;

    let trainer = config.trainer.build()?;
    let harness = EvaluationHarness::new(
        GroupSplitter::new(config.split_config()),
        config.features.clone(),
        trainer.as_ref(),
    );

    let policies = selection.policies();
    let progress = ProgressBar::new(policies.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} policies {msg}")?
            .progress_chars("=> "),
    );
    for policy in policies {
        progress.set_message(policy.label());
        let report = harness.evaluate(&table, policy)?;
        let written = write_policy_report(&out, &report)?;
        progress.println(format!(
            "{policy}: {} splits evaluated, {} skipped groups, {} failed splits, \
             {} rows without a target, {} files written.",
            report.evaluations.len(),
            report.skipped.len(),
            report.failed.len(),
            report.undefined_targets,
            written.len()
        ));
        progress.inc(1);
    }
    progress.finish_with_message("done");
    println!("Results written to '{}'.", out.display());
    Ok(())
}

fn run_impute(
    path: &str,
    metric: &MetricCli,
    matrix: Option<&str>,
    matrix_column: Option<&str>,
    common: &CommonArgs,
) -> Result<(), Box<dyn Error>> {
    let config = load_config(common.config.as_deref())?;
    let out = output_dir(&config, common);
    let metric = match (metric, matrix, matrix_column) {
        (MetricCli::Matrix, Some(matrix), Some(column)) => {
            ImputationMetric::Matrix(load_substitution_matrix(matrix, column)?)
        }
        (MetricCli::Matrix, _, _) => {
            return Err("--metric matrix requires --matrix and --matrix-column".into());
        }
        (MetricCli::Fitness, _, _) => ImputationMetric::Fitness,
    };
    let table = prepared_table(path, &config)?;

    let report = run_imputation_benchmark(&table, &metric, &config.imputation, config.seed);
    let (correlations, imputations) = write_imputation_report(&out, metric.name(), &report)?;
    println!(
        "Imputed {} held-out variants across {} genes ({} genes skipped).",
        report.imputations.len(),
        report.correlations.len(),
        report.skipped.len()
    );
    println!(
        "Wrote '{}' and '{}'.",
        correlations.display(),
        imputations.display()
    );
    Ok(())
}

fn run_noise_ceiling(path: &str, common: &CommonArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(common.config.as_deref())?;
    let out = output_dir(&config, common);
    let table = load_variant_table(path, &config.features)?;
    if !table.columns().sigma {
        return Err("the table has no 'sigma' column".into());
    }

    let report = noise_ceiling(&table, &config.noise, config.seed);
    let target = out.join("noise_ceiling.csv");
    write_noise_report(&target, &report)?;
    println!(
        "Noise ceiling for {} genes ({} skipped) written to '{}'.",
        report.ceilings.len(),
        report.skipped.len(),
        target.display()
    );
    Ok(())
}
