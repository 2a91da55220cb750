use serde::{Deserialize, Serialize};

/// Current layout of [`FeatureSchema`]. Bumped whenever the set of derived features changes.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Group statistics that are appended to the design matrix of every split.
///
/// They are always fitted on the training partition of that split and then applied
/// to both partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedFeature {
    /// Mean normalized score of the training variants at the same `(gene, position)`.
    PositionMean,
    /// Mean normalized score of the training variants with the same
    /// `(gene, wt_residue, variant_residue)`.
    SubstitutionMean,
}

impl DerivedFeature {
    pub fn column_name(self) -> &'static str {
        match self {
            Self::PositionMean => "mean_normalized_dms",
            Self::SubstitutionMean => "substitution_mean_fitness",
        }
    }
}

/// The explicit list of model inputs, resolved once when the table is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Input columns passed through unchanged to the trainer, in design-matrix order.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default = "default_derived")]
    pub derived: Vec<DerivedFeature>,
}

fn default_version() -> u32 {
    FEATURE_SCHEMA_VERSION
}

fn default_derived() -> Vec<DerivedFeature> {
    vec![DerivedFeature::PositionMean]
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self {
            version: FEATURE_SCHEMA_VERSION,
            columns: Vec::new(),
            derived: default_derived(),
        }
    }
}

impl FeatureSchema {
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Names of every design-matrix column: passthrough columns, then derived ones.
    pub fn design_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .cloned()
            .chain(self.derived.iter().map(|d| d.column_name().to_string()))
            .collect()
    }

    pub fn width(&self) -> usize {
        self.columns.len() + self.derived.len()
    }
}
