//! Run configuration, loaded from TOML and handed to each component at construction.
//!
//! Every field has a default, so an empty file (or no file) describes the standard run.

use crate::features::{FEATURE_SCHEMA_VERSION, FeatureSchema};
use crate::impute::ImputationConfig;
use crate::noise::NoiseConfig;
use crate::splits::{DEFAULT_SUBSTITUTION_CLASSES, SplitConfig};
use crate::trainer::TrainerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub seed: u64,
    pub test_fraction: f64,
    pub position_test_fraction: f64,
    pub gene_test_fraction: f64,
    pub allowed_substitution_classes: Vec<String>,
    pub output_dir: PathBuf,
    pub features: FeatureSchema,
    pub trainer: TrainerConfig,
    pub imputation: ImputationConfig,
    pub noise: NoiseConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
            position_test_fraction: 0.2,
            gene_test_fraction: 0.1,
            allowed_substitution_classes: DEFAULT_SUBSTITUTION_CLASSES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output_dir: PathBuf::from("results"),
            features: FeatureSchema::default(),
            trainer: TrainerConfig::default(),
            imputation: ImputationConfig::default(),
            noise: NoiseConfig::default(),
        }
    }
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: format!("{value} is not a fraction strictly between 0 and 1"),
        })
    }
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        log::info!("Loaded run configuration from '{path}'");
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("test_fraction", self.test_fraction)?;
        check_fraction("position_test_fraction", self.position_test_fraction)?;
        check_fraction("gene_test_fraction", self.gene_test_fraction)?;
        check_fraction("imputation.holdout_fraction", self.imputation.holdout_fraction)?;
        if self.features.version != FEATURE_SCHEMA_VERSION {
            return Err(ConfigError::InvalidValue {
                field: "features.version",
                reason: format!(
                    "schema version {} is not supported; this build reads version {}",
                    self.features.version, FEATURE_SCHEMA_VERSION
                ),
            });
        }
        if self.allowed_substitution_classes.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "allowed_substitution_classes",
                reason: "at least one residue class is required".to_string(),
            });
        }
        if !self.trainer.lambda.is_finite() || self.trainer.lambda < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "trainer.lambda",
                reason: format!("{} is not a finite non-negative penalty", self.trainer.lambda),
            });
        }
        if self.noise.replicates == 0 {
            return Err(ConfigError::InvalidValue {
                field: "noise.replicates",
                reason: "at least one replicate is required".to_string(),
            });
        }
        Ok(())
    }

    pub fn split_config(&self) -> SplitConfig {
        SplitConfig {
            seed: self.seed,
            test_fraction: self.test_fraction,
            position_test_fraction: self.position_test_fraction,
            gene_test_fraction: self.gene_test_fraction,
            substitution_classes: self.allowed_substitution_classes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::DerivedFeature;
    use crate::trainer::TrainerKind;

    #[test]
    fn empty_file_gives_the_defaults() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.split_config(), SplitConfig::default());
        assert_eq!(config.noise.replicates, 300);
        assert_eq!(config.trainer.kind, TrainerKind::Ridge);
    }

    #[test]
    fn nested_sections_override_defaults() {
        let config = RunConfig::from_toml_str(
            r#"
            seed = 7
            output_dir = "out"

            [features]
            columns = ["esm1v", "conservation"]
            derived = ["position_mean", "substitution_mean"]

            [trainer]
            kind = "mean"

            [imputation]
            min_gene_size = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.features.columns, vec!["esm1v", "conservation"]);
        assert_eq!(
            config.features.derived,
            vec![DerivedFeature::PositionMean, DerivedFeature::SubstitutionMean]
        );
        assert_eq!(config.trainer.kind, TrainerKind::Mean);
        assert_eq!(config.trainer.lambda, 1.0);
        assert_eq!(config.imputation.min_gene_size, Some(10));
        assert_eq!(config.imputation.holdout_fraction, 0.1);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let result = RunConfig::from_toml_str("test_fraction = 1.5");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "test_fraction", .. })
        ));
        assert!(matches!(
            RunConfig::from_toml_str("unknown_key = 1"),
            Err(ConfigError::TomlParseError(_))
        ));
    }

    #[test]
    fn unsupported_feature_schema_version_is_rejected() {
        let result = RunConfig::from_toml_str("[features]\nversion = 2\n");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "features.version", .. })
        ));
        let current = format!("[features]\nversion = {FEATURE_SCHEMA_VERSION}\n");
        assert!(RunConfig::from_toml_str(&current).is_ok());
    }

    #[test]
    fn configuration_round_trips_through_toml() {
        let config = RunConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(RunConfig::from_toml_str(&text).unwrap(), config);
    }
}
