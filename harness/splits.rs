// ========================================================================================
//
//                            GROUP-AWARE TRAIN/TEST PARTITIONING
//
// ========================================================================================
//
// Every policy partitions row indices of a `VariantTable` by exactly one key. Within
// a split the train and test index vectors are disjoint and together cover the rows
// the policy operates on (one gene, or the whole table for the cross-gene policies).
// Groups that cannot be split are reported as `SkippedGroup` rather than dropped
// silently. Random sampling re-seeds a fresh generator per gene, so a gene's split does
// not depend on the genes visited before it.

use crate::shared::table::{VariantTable, group_indices};
use ahash::AHashSet;
use itertools::Itertools;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Variant residues that form the training set of the substitution-class holdout.
pub const DEFAULT_SUBSTITUTION_CLASSES: [&str; 5] = ["H", "E", "N", "I", "G"];

/// Genes with more distinct positions than this hold out a fraction of them;
/// smaller genes hold out a single position.
const POSITION_HOLDOUT_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Per gene: random 80/20 partition of the gene's variants.
    Random,
    /// One split per gene: train on every other gene, test on this one.
    LeaveGeneOut,
    /// Per gene: one split per residue position.
    LeavePositionOut,
    /// Per gene: one split per substitution.
    LeaveVariantOut,
    /// Per gene: train on single-nucleotide substitutions, test on the rest.
    LeaveNonSnvOut,
    /// Per gene: train on a fixed set of variant residues, test on the complement.
    SubstitutionClassHoldout,
    /// Per gene: hold out a random subset of positions.
    PositionHoldout,
    /// Whole table: hold out a random subset of genes.
    GeneHoldout,
}

impl SplitPolicy {
    pub const ALL: [SplitPolicy; 8] = [
        SplitPolicy::Random,
        SplitPolicy::LeaveGeneOut,
        SplitPolicy::LeavePositionOut,
        SplitPolicy::LeaveVariantOut,
        SplitPolicy::LeaveNonSnvOut,
        SplitPolicy::SubstitutionClassHoldout,
        SplitPolicy::PositionHoldout,
        SplitPolicy::GeneHoldout,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::LeaveGeneOut => "leave_gene_out",
            Self::LeavePositionOut => "leave_position_out",
            Self::LeaveVariantOut => "leave_variant_out",
            Self::LeaveNonSnvOut => "leave_non_snv_out",
            Self::SubstitutionClassHoldout => "substitution_class_holdout",
            Self::PositionHoldout => "position_holdout",
            Self::GeneHoldout => "gene_holdout",
        }
    }
}

impl fmt::Display for SplitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SplitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|p| p.label() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown split policy '{s}'; expected one of: {}",
                    Self::ALL.iter().map(|p| p.label()).join(", ")
                )
            })
    }
}

/// The unit held out by a split, used to tag every output record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SplitKey {
    /// A per-gene split whose test set is one part of the gene.
    Gene { gene_id: String },
    /// All variants of one gene held out.
    GeneOut { gene_id_out: String },
    /// A set of genes held out together.
    GenesOut { gene_ids_out: Vec<String> },
    Position { gene_id: String, position_out: i64 },
    Variant { gene_id: String, variant_out: String },
}

impl SplitKey {
    /// Gene the split belongs to, if it is a per-gene split.
    pub fn gene_id(&self) -> Option<&str> {
        match self {
            Self::Gene { gene_id }
            | Self::Position { gene_id, .. }
            | Self::Variant { gene_id, .. } => Some(gene_id),
            Self::GeneOut { gene_id_out } => Some(gene_id_out),
            Self::GenesOut { .. } => None,
        }
    }
}

impl fmt::Display for SplitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gene { gene_id } => write!(f, "gene {gene_id}"),
            Self::GeneOut { gene_id_out } => write!(f, "gene {gene_id_out} held out"),
            Self::GenesOut { gene_ids_out } => {
                write!(f, "genes {} held out", gene_ids_out.join(","))
            }
            Self::Position {
                gene_id,
                position_out,
            } => write!(f, "gene {gene_id}, position {position_out}"),
            Self::Variant {
                gene_id,
                variant_out,
            } => write!(f, "gene {gene_id}, variant {variant_out}"),
        }
    }
}

/// Row indices of one train/test partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub policy: SplitPolicy,
    pub key: SplitKey,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Train,
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    TooFewRecords { found: usize, required: usize },
    TooFewPositions { found: usize },
    TooFewVariants { found: usize },
    TooFewGenes { found: usize },
    EmptyPartition(Partition),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewRecords { found, required } => {
                write!(f, "{found} records, at least {required} required")
            }
            Self::TooFewPositions { found } => write!(f, "{found} distinct positions"),
            Self::TooFewVariants { found } => write!(f, "{found} distinct variants"),
            Self::TooFewGenes { found } => write!(f, "{found} genes"),
            Self::EmptyPartition(Partition::Train) => f.write_str("empty training partition"),
            Self::EmptyPartition(Partition::Test) => f.write_str("empty test partition"),
        }
    }
}

/// A gene (or the whole table, for `gene_id == "*"`) that a policy could not split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedGroup {
    pub policy: SplitPolicy,
    pub gene_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct SplitPlan {
    pub splits: Vec<Split>,
    pub skipped: Vec<SkippedGroup>,
}

/// Parameters of the splitting policies.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitConfig {
    pub seed: u64,
    /// Test fraction of the random per-gene split.
    pub test_fraction: f64,
    /// Fraction of positions held out by the position holdout for larger genes.
    pub position_test_fraction: f64,
    /// Fraction of genes held out by the gene holdout.
    pub gene_test_fraction: f64,
    pub substitution_classes: Vec<String>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
            position_test_fraction: 0.2,
            gene_test_fraction: 0.1,
            substitution_classes: DEFAULT_SUBSTITUTION_CLASSES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

pub struct GroupSplitter {
    config: SplitConfig,
}

impl GroupSplitter {
    pub fn new(config: SplitConfig) -> Self {
        Self { config }
    }

    /// Plans every split of `policy` over `table`.
    pub fn split(&self, table: &VariantTable, policy: SplitPolicy) -> SplitPlan {
        let mut plan = SplitPlan::default();
        match policy {
            SplitPolicy::LeaveGeneOut => self.leave_gene_out(table, &mut plan),
            SplitPolicy::GeneHoldout => self.gene_holdout(table, &mut plan),
            _ => {
                for (gene_id, rows) in table.gene_groups() {
                    let outcome = match policy {
                        SplitPolicy::Random => self.random(&gene_id, &rows),
                        SplitPolicy::LeavePositionOut => leave_position_out(table, &gene_id, &rows),
                        SplitPolicy::LeaveVariantOut => leave_variant_out(table, &gene_id, &rows),
                        SplitPolicy::LeaveNonSnvOut => partition_gene(&gene_id, &rows, |i| {
                            table.records()[i].edit_distance == 1
                        }),
                        SplitPolicy::SubstitutionClassHoldout => {
                            partition_gene(&gene_id, &rows, |i| {
                                let residue = &table.records()[i].variant_residue;
                                self.config.substitution_classes.iter().any(|c| c == residue)
                            })
                        }
                        SplitPolicy::PositionHoldout => {
                            self.position_holdout(table, &gene_id, &rows)
                        }
                        SplitPolicy::LeaveGeneOut | SplitPolicy::GeneHoldout => continue,
                    };
                    match outcome {
                        Ok(splits) => plan.splits.extend(splits.into_iter().map(
                            |(key, train, test)| Split {
                                policy,
                                key,
                                train,
                                test,
                            },
                        )),
                        Err(reason) => plan.skipped.push(SkippedGroup {
                            policy,
                            gene_id,
                            reason,
                        }),
                    }
                }
            }
        }

        for skipped in &plan.skipped {
            log::info!("[{policy}] Skipping gene {}: {}.", skipped.gene_id, skipped.reason);
        }
        log::info!(
            "[{policy}] Planned {} splits ({} groups skipped).",
            plan.splits.len(),
            plan.skipped.len()
        );
        plan
    }

    fn random(&self, gene_id: &str, rows: &[usize]) -> GeneOutcome {
        if rows.len() < 2 {
            return Err(SkipReason::TooFewRecords {
                found: rows.len(),
                required: 2,
            });
        }
        let n_test = fraction_count(self.config.test_fraction, rows.len());
        let (train, test) = sample_holdout(rows, n_test, self.config.seed);
        Ok(vec![(gene_key(gene_id), train, test)])
    }

    fn position_holdout(&self, table: &VariantTable, gene_id: &str, rows: &[usize]) -> GeneOutcome {
        let positions = group_indices(rows.iter().map(|&i| (i, &table.records()[i])), |r| {
            r.position
        });
        if positions.len() < 2 {
            return Err(SkipReason::TooFewPositions {
                found: positions.len(),
            });
        }
        let n_test = if positions.len() > POSITION_HOLDOUT_THRESHOLD {
            fraction_count(self.config.position_test_fraction, positions.len())
        } else {
            1
        };
        let slots: Vec<usize> = (0..positions.len()).collect();
        let (_, held_out) = sample_holdout(&slots, n_test, self.config.seed);
        let held_out: AHashSet<i64> = held_out.iter().map(|&s| positions[s].0).collect();
        let (test, train): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| held_out.contains(&table.records()[i].position));
        Ok(vec![(gene_key(gene_id), train, test)])
    }

    fn leave_gene_out(&self, table: &VariantTable, plan: &mut SplitPlan) {
        let genes = table.gene_groups();
        for (gene_id, rows) in &genes {
            let held_out: AHashSet<usize> = rows.iter().copied().collect();
            let train: Vec<usize> = (0..table.len()).filter(|i| !held_out.contains(i)).collect();
            if train.is_empty() {
                plan.skipped.push(SkippedGroup {
                    policy: SplitPolicy::LeaveGeneOut,
                    gene_id: gene_id.clone(),
                    reason: SkipReason::EmptyPartition(Partition::Train),
                });
                continue;
            }
            plan.splits.push(Split {
                policy: SplitPolicy::LeaveGeneOut,
                key: SplitKey::GeneOut {
                    gene_id_out: gene_id.clone(),
                },
                train,
                test: rows.clone(),
            });
        }
    }

    fn gene_holdout(&self, table: &VariantTable, plan: &mut SplitPlan) {
        let genes = table.gene_groups();
        if genes.len() < 2 {
            plan.skipped.push(SkippedGroup {
                policy: SplitPolicy::GeneHoldout,
                gene_id: "*".to_string(),
                reason: SkipReason::TooFewGenes { found: genes.len() },
            });
            return;
        }
        let slots: Vec<usize> = (0..genes.len()).collect();
        let n_test = fraction_count(self.config.gene_test_fraction, genes.len());
        let (_, held_out) = sample_holdout(&slots, n_test, self.config.seed);
        let held_out: AHashSet<usize> = held_out.into_iter().collect();

        let mut train = Vec::new();
        let mut test = Vec::new();
        let mut gene_ids_out = Vec::new();
        for (slot, (gene_id, rows)) in genes.iter().enumerate() {
            if held_out.contains(&slot) {
                gene_ids_out.push(gene_id.clone());
                test.extend_from_slice(rows);
            } else {
                train.extend_from_slice(rows);
            }
        }
        train.sort_unstable();
        test.sort_unstable();
        plan.splits.push(Split {
            policy: SplitPolicy::GeneHoldout,
            key: SplitKey::GenesOut { gene_ids_out },
            train,
            test,
        });
    }
}

type GeneOutcome = Result<Vec<(SplitKey, Vec<usize>, Vec<usize>)>, SkipReason>;

fn gene_key(gene_id: &str) -> SplitKey {
    SplitKey::Gene {
        gene_id: gene_id.to_string(),
    }
}

fn leave_position_out(table: &VariantTable, gene_id: &str, rows: &[usize]) -> GeneOutcome {
    let positions = group_indices(rows.iter().map(|&i| (i, &table.records()[i])), |r| {
        r.position
    });
    if positions.len() < 2 {
        return Err(SkipReason::TooFewPositions {
            found: positions.len(),
        });
    }
    Ok(positions
        .into_iter()
        .map(|(position_out, test)| {
            let held_out: AHashSet<usize> = test.iter().copied().collect();
            let train = rows.iter().copied().filter(|i| !held_out.contains(i)).collect();
            (
                SplitKey::Position {
                    gene_id: gene_id.to_string(),
                    position_out,
                },
                train,
                test,
            )
        })
        .collect())
}

fn leave_variant_out(table: &VariantTable, gene_id: &str, rows: &[usize]) -> GeneOutcome {
    let variants = group_indices(rows.iter().map(|&i| (i, &table.records()[i])), |r| {
        r.mutation_id.clone()
    });
    if variants.len() < 2 {
        return Err(SkipReason::TooFewVariants {
            found: variants.len(),
        });
    }
    Ok(variants
        .into_iter()
        .map(|(variant_out, test)| {
            let held_out: AHashSet<usize> = test.iter().copied().collect();
            let train = rows.iter().copied().filter(|i| !held_out.contains(i)).collect();
            (
                SplitKey::Variant {
                    gene_id: gene_id.to_string(),
                    variant_out,
                },
                train,
                test,
            )
        })
        .collect())
}

/// Rows satisfying `in_train` form the training set, the rest the test set.
fn partition_gene<F>(gene_id: &str, rows: &[usize], in_train: F) -> GeneOutcome
where
    F: Fn(usize) -> bool,
{
    let (train, test): (Vec<usize>, Vec<usize>) = rows.iter().partition(|&&i| in_train(i));
    if train.is_empty() {
        return Err(SkipReason::EmptyPartition(Partition::Train));
    }
    if test.is_empty() {
        return Err(SkipReason::EmptyPartition(Partition::Test));
    }
    Ok(vec![(gene_key(gene_id), train, test)])
}

/// Size of the held-out part for a fraction of `n` items: rounded up, and leaving at
/// least one item on each side when `n >= 2`.
pub fn fraction_count(fraction: f64, n: usize) -> usize {
    if n < 2 {
        return n;
    }
    let raw = (fraction * n as f64).ceil();
    (raw.max(1.0) as usize).min(n - 1)
}

/// Draws `n_test` of `items` without replacement using a generator seeded with `seed`.
///
/// Returns `(train, test)`, each in the input order of `items`.
pub fn sample_holdout(items: &[usize], n_test: usize, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut shuffled = items.to_vec();
    shuffled.shuffle(&mut rng);
    let chosen: AHashSet<usize> = shuffled.into_iter().take(n_test).collect();
    items.iter().partition(|&&i| !chosen.contains(&i))
}
