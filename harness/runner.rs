//! Runs a split policy end to end: plan, fit derived statistics on train, train,
//! predict and record.

use crate::features::{
    DerivedFeature, FeatureError, FeatureSchema, PositionMeans, SubstitutionPrior,
};
use crate::metrics::{evaluate_predictions, point_error};
use crate::records::{EvaluationRecord, MutationRecord};
use crate::shared::table::{VariantRecord, VariantTable};
use crate::splits::{
    GroupSplitter, Partition, SkipReason, SkippedGroup, Split, SplitKey, SplitPlan, SplitPolicy,
};
use crate::trainer::{ModelTrainer, TrainerError};
use ndarray::{Array1, Array2};
use rayon::prelude::*;

/// A split whose trainer failed. It contributes no records.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedSplit {
    pub policy: SplitPolicy,
    pub key: SplitKey,
    pub error: String,
}

/// Everything produced by one policy invocation.
#[derive(Debug, Clone)]
pub struct PolicyReport {
    pub policy: SplitPolicy,
    pub evaluations: Vec<EvaluationRecord>,
    pub mutations: Vec<MutationRecord>,
    pub skipped: Vec<SkippedGroup>,
    pub failed: Vec<FailedSplit>,
    /// Rows left out of every split because their target was not finite.
    pub undefined_targets: usize,
}

type SplitOutcome = Result<(EvaluationRecord, Vec<MutationRecord>), TrainerError>;

/// Group statistics fitted on the training rows of one split.
struct DerivedStatistics {
    position: Option<PositionMeans>,
    substitution: Option<SubstitutionPrior>,
}

impl DerivedStatistics {
    fn fit(schema: &FeatureSchema, training: &[&VariantRecord]) -> Self {
        let wants = |feature| schema.derived.contains(&feature);
        Self {
            position: wants(DerivedFeature::PositionMean)
                .then(|| PositionMeans::fit(training.iter().copied())),
            substitution: wants(DerivedFeature::SubstitutionMean)
                .then(|| SubstitutionPrior::fit(training.iter().copied())),
        }
    }

    fn value(&self, feature: DerivedFeature, record: &VariantRecord) -> f64 {
        match feature {
            DerivedFeature::PositionMean => self
                .position
                .as_ref()
                .map_or(f64::NAN, |m| m.lookup(record)),
            DerivedFeature::SubstitutionMean => self
                .substitution
                .as_ref()
                .map_or(f64::NAN, |p| p.lookup(record)),
        }
    }
}

pub struct EvaluationHarness<'a> {
    splitter: GroupSplitter,
    schema: FeatureSchema,
    trainer: &'a dyn ModelTrainer,
}

impl<'a> EvaluationHarness<'a> {
    pub fn new(
        splitter: GroupSplitter,
        schema: FeatureSchema,
        trainer: &'a dyn ModelTrainer,
    ) -> Self {
        Self {
            splitter,
            schema,
            trainer,
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Evaluates every split of `policy`. Splits run in parallel; records keep plan order.
    ///
    /// Fails only on precondition violations: a table without normalized scores, or a
    /// schema column the table does not carry. Rows with a non-finite target are left
    /// out of both partitions, and a split emptied that way is reported as skipped.
    pub fn evaluate(
        &self,
        table: &VariantTable,
        policy: SplitPolicy,
    ) -> Result<PolicyReport, FeatureError> {
        if !table.columns().normalized {
            return Err(FeatureError::MissingColumn("normalized_dms_score".to_string()));
        }
        let passthrough = self.resolve_columns(table)?;

        let mut plan = self.splitter.split(table, policy);
        let undefined_targets = drop_undefined_targets(table.records(), &mut plan);
        if undefined_targets > 0 {
            log::info!(
                "Policy {policy}: {undefined_targets} split rows without a finite target \
                 were left out."
            );
        }
        log::debug!("Design columns: {}", self.schema.design_columns().join(", "));
        log::info!(
            "Evaluating {} splits for policy {} with the {} trainer.",
            plan.splits.len(),
            policy,
            self.trainer.name()
        );

        let outcomes: Vec<(&Split, SplitOutcome)> = plan
            .splits
            .par_iter()
            .map(|split| (split, self.evaluate_split(table, &passthrough, split)))
            .collect();

        let mut report = PolicyReport {
            policy,
            evaluations: Vec::with_capacity(outcomes.len()),
            mutations: Vec::new(),
            skipped: plan.skipped,
            failed: Vec::new(),
            undefined_targets,
        };
        for (split, outcome) in outcomes {
            match outcome {
                Ok((evaluation, mutations)) => {
                    report.evaluations.push(evaluation);
                    report.mutations.extend(mutations);
                }
                Err(e) => {
                    log::warn!("Split {} of policy {} abandoned: {}", split.key, policy, e);
                    report.failed.push(FailedSplit {
                        policy,
                        key: split.key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    fn resolve_columns(&self, table: &VariantTable) -> Result<Vec<usize>, FeatureError> {
        self.schema
            .columns
            .iter()
            .map(|name| {
                table
                    .feature_names()
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| FeatureError::MissingColumn(name.clone()))
            })
            .collect()
    }

    fn evaluate_split(
        &self,
        table: &VariantTable,
        passthrough: &[usize],
        split: &Split,
    ) -> SplitOutcome {
        let records = table.records();
        let training: Vec<&VariantRecord> = split.train.iter().map(|&i| &records[i]).collect();
        let statistics = DerivedStatistics::fit(&self.schema, &training);

        let x_train = self.design_matrix(table, passthrough, &split.train, &statistics);
        let x_test = self.design_matrix(table, passthrough, &split.test, &statistics);
        let y_train = targets(records, &split.train);
        let y_test = targets(records, &split.test);

        let model = self
            .trainer
            .train(x_train.view(), y_train.view(), x_test.view(), y_test.view())?;
        let train_pred = model.predict(x_train.view())?;
        let test_pred = model.predict(x_test.view())?;

        let (train_true, train_hat) = (y_train.to_vec(), train_pred.to_vec());
        let (test_true, test_hat) = (y_test.to_vec(), test_pred.to_vec());
        let evaluation = EvaluationRecord {
            policy: split.policy,
            key: split.key.clone(),
            train_size: split.train.len(),
            test_size: split.test.len(),
            train: evaluate_predictions(&train_true, &train_hat),
            test: evaluate_predictions(&test_true, &test_hat),
        };

        let mutations = split
            .test
            .iter()
            .zip(test_true.iter().zip(&test_hat))
            .map(|(&row, (&y_true, &y_pred))| MutationRecord {
                policy: split.policy,
                key: split.key.clone(),
                gene_id: records[row].gene_id.clone(),
                mutation_id: records[row].mutation_id.clone(),
                y_true,
                y_pred,
                error: point_error(y_true, y_pred),
            })
            .collect();
        Ok((evaluation, mutations))
    }

    /// Passthrough columns followed by the derived columns, for `rows` in order.
    fn design_matrix(
        &self,
        table: &VariantTable,
        passthrough: &[usize],
        rows: &[usize],
        statistics: &DerivedStatistics,
    ) -> Array2<f64> {
        let p = passthrough.len();
        let features = table.features();
        let mut x = Array2::<f64>::from_elem((rows.len(), self.schema.width()), f64::NAN);
        for (mut out, &row) in x.rows_mut().into_iter().zip(rows) {
            for (cell, &column) in out.iter_mut().zip(passthrough) {
                *cell = features[[row, column]];
            }
        }
        for (offset, &feature) in self.schema.derived.iter().enumerate() {
            let mut column = x.column_mut(p + offset);
            for (cell, &row) in column.iter_mut().zip(rows) {
                *cell = statistics.value(feature, &table.records()[row]);
            }
        }
        x
    }
}

/// Removes rows with a non-finite target from every split and returns how many went.
fn drop_undefined_targets(records: &[VariantRecord], plan: &mut SplitPlan) -> usize {
    let defined = |i: &usize| records[*i].normalized_dms_score.is_finite();
    let mut dropped = 0;
    for mut split in std::mem::take(&mut plan.splits) {
        let before = split.train.len() + split.test.len();
        split.train.retain(&defined);
        split.test.retain(&defined);
        dropped += before - split.train.len() - split.test.len();

        let emptied = if split.train.is_empty() {
            Some(Partition::Train)
        } else if split.test.is_empty() {
            Some(Partition::Test)
        } else {
            None
        };
        match emptied {
            Some(partition) => plan.skipped.push(SkippedGroup {
                policy: split.policy,
                gene_id: split.key.gene_id().unwrap_or("*").to_string(),
                reason: SkipReason::EmptyPartition(partition),
            }),
            None => plan.splits.push(split),
        }
    }
    dropped
}

fn targets(records: &[VariantRecord], rows: &[usize]) -> Array1<f64> {
    rows.iter().map(|&i| records[i].normalized_dms_score).collect()
}
