#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Grouped evaluation harness for variant-effect score prediction.
//!
//! Raw deep mutational scanning scores are normalized onto a wild type = 1,
//! nonsense = 0 scale, enriched with gene- and position-level statistics, and
//! evaluated under several group-aware train/test policies. A nearest-neighbor
//! imputation benchmark and a noise-ceiling simulation complete the toolkit.

pub mod config;
pub mod metrics;
pub mod noise;
pub mod records;
pub mod runner;
pub mod splits;
pub mod stats;
pub mod trainer;

#[path = "../features/mod.rs"]
pub mod features;

#[path = "../impute/mod.rs"]
pub mod impute;

#[path = "../shared/mod.rs"]
pub mod shared;
