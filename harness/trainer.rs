//! The boundary to the regressor that is trained on every split.
//!
//! The harness only needs `train` and `predict`, so any regressor can sit behind
//! [`ModelTrainer`]. Two built-in trainers are provided: a mean baseline and a ridge
//! regression solved directly on its penalized normal equations.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::error::LinalgError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("Cannot train on an empty training partition.")]
    EmptyTrainingSet,
    #[error("Design matrix has {rows} rows but {targets} targets were given.")]
    ShapeMismatch { rows: usize, targets: usize },
    #[error("Model was trained on {expected} features but received {found}.")]
    FeatureCountMismatch { expected: usize, found: usize },
    #[error("Training targets contain non-finite values.")]
    NonFiniteTarget,
    #[error("Validation matrix has {rows} rows but {targets} targets were given.")]
    ValidationShapeMismatch { rows: usize, targets: usize },
    #[error("Ridge normal equations could not be solved: {0}")]
    LinearSystemSolveFailed(#[from] LinalgError),
    #[error("Ridge solve produced non-finite coefficients (lambda = {lambda}).")]
    NonFiniteCoefficients { lambda: f64 },
    #[error("Invalid ridge penalty {0}; it must be finite and non-negative.")]
    InvalidPenalty(f64),
    #[error("External trainer failed: {0}")]
    External(String),
}

pub trait Regressor: Send + Sync {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, TrainerError>;
}

/// Trains one regressor per split. `x_valid`/`y_valid` are available to trainers that
/// use a validation set for early stopping; the built-in trainers only check their shape.
pub trait ModelTrainer: Sync {
    fn train(
        &self,
        x_train: ArrayView2<'_, f64>,
        y_train: ArrayView1<'_, f64>,
        x_valid: ArrayView2<'_, f64>,
        y_valid: ArrayView1<'_, f64>,
    ) -> Result<Box<dyn Regressor>, TrainerError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainerKind {
    Mean,
    Ridge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub kind: TrainerKind,
    pub lambda: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            kind: TrainerKind::Ridge,
            lambda: 1.0,
        }
    }
}

impl TrainerConfig {
    pub fn build(&self) -> Result<Box<dyn ModelTrainer>, TrainerError> {
        Ok(match self.kind {
            TrainerKind::Mean => Box::new(MeanBaseline),
            TrainerKind::Ridge => Box::new(RidgeTrainer::new(self.lambda)?),
        })
    }
}

fn check_training_shape(
    x_train: ArrayView2<'_, f64>,
    y_train: ArrayView1<'_, f64>,
    x_valid: ArrayView2<'_, f64>,
    y_valid: ArrayView1<'_, f64>,
) -> Result<(), TrainerError> {
    if y_train.is_empty() {
        return Err(TrainerError::EmptyTrainingSet);
    }
    if x_train.nrows() != y_train.len() {
        return Err(TrainerError::ShapeMismatch {
            rows: x_train.nrows(),
            targets: y_train.len(),
        });
    }
    if x_valid.nrows() != y_valid.len() {
        return Err(TrainerError::ValidationShapeMismatch {
            rows: x_valid.nrows(),
            targets: y_valid.len(),
        });
    }
    if x_valid.ncols() != x_train.ncols() {
        return Err(TrainerError::FeatureCountMismatch {
            expected: x_train.ncols(),
            found: x_valid.ncols(),
        });
    }
    if y_train.iter().any(|y| !y.is_finite()) {
        return Err(TrainerError::NonFiniteTarget);
    }
    Ok(())
}

/// Predicts the training mean for every row.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanBaseline;

struct ConstantModel {
    value: f64,
}

impl Regressor for ConstantModel {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, TrainerError> {
        Ok(Array1::from_elem(x.nrows(), self.value))
    }
}

impl ModelTrainer for MeanBaseline {
    fn train(
        &self,
        x_train: ArrayView2<'_, f64>,
        y_train: ArrayView1<'_, f64>,
        x_valid: ArrayView2<'_, f64>,
        y_valid: ArrayView1<'_, f64>,
    ) -> Result<Box<dyn Regressor>, TrainerError> {
        check_training_shape(x_train, y_train, x_valid, y_valid)?;
        let value = y_train.sum() / y_train.len() as f64;
        Ok(Box::new(ConstantModel { value }))
    }

    fn name(&self) -> &str {
        "mean"
    }
}

/// L2-penalized least squares on standardized features.
#[derive(Debug, Clone, Copy)]
pub struct RidgeTrainer {
    lambda: f64,
}

impl RidgeTrainer {
    pub fn new(lambda: f64) -> Result<Self, TrainerError> {
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(TrainerError::InvalidPenalty(lambda));
        }
        Ok(Self { lambda })
    }
}

/// Column statistics of the training design matrix. Missing entries become the column
/// mean; constant or entirely missing columns are given zero weight.
#[derive(Debug, Clone)]
struct Standardizer {
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl Standardizer {
    fn fit(x: ArrayView2<'_, f64>) -> Self {
        let p = x.ncols();
        let mut means = Array1::zeros(p);
        let mut scales = Array1::zeros(p);
        for (j, column) in x.axis_iter(Axis(1)).enumerate() {
            let finite: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
            if finite.is_empty() {
                continue;
            }
            let n = finite.len() as f64;
            let mean = finite.iter().sum::<f64>() / n;
            let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            means[j] = mean;
            scales[j] = if var > 0.0 { 1.0 / var.sqrt() } else { 0.0 };
        }
        Self { means, scales }
    }

    fn transform(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut z = x.to_owned();
        for (j, mut column) in z.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, scale) = (self.means[j], self.scales[j]);
            column.mapv_inplace(|v| if v.is_finite() { (v - mean) * scale } else { 0.0 });
        }
        z
    }
}

struct RidgeModel {
    standardizer: Standardizer,
    coefficients: Array1<f64>,
    intercept: f64,
}

impl Regressor for RidgeModel {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, TrainerError> {
        if x.ncols() != self.coefficients.len() {
            return Err(TrainerError::FeatureCountMismatch {
                expected: self.coefficients.len(),
                found: x.ncols(),
            });
        }
        let z = self.standardizer.transform(x);
        Ok(z.dot(&self.coefficients) + self.intercept)
    }
}

impl ModelTrainer for RidgeTrainer {
    fn train(
        &self,
        x_train: ArrayView2<'_, f64>,
        y_train: ArrayView1<'_, f64>,
        x_valid: ArrayView2<'_, f64>,
        y_valid: ArrayView1<'_, f64>,
    ) -> Result<Box<dyn Regressor>, TrainerError> {
        check_training_shape(x_train, y_train, x_valid, y_valid)?;
        let standardizer = Standardizer::fit(x_train);
        let z = standardizer.transform(x_train);
        let intercept = y_train.sum() / y_train.len() as f64;
        let centered = y_train.mapv(|y| y - intercept);

        let coefficients = solve_normal_equations(&z, &centered, self.lambda)?;
        if coefficients.iter().any(|b| !b.is_finite()) {
            return Err(TrainerError::NonFiniteCoefficients {
                lambda: self.lambda,
            });
        }
        log::debug!(
            "Ridge fit on {} rows and {} features, intercept {:.4}.",
            z.nrows(),
            z.ncols(),
            intercept
        );
        Ok(Box::new(RidgeModel {
            standardizer,
            coefficients,
            intercept,
        }))
    }

    fn name(&self) -> &str {
        "ridge"
    }
}

/// Solves `(Z'Z + lambda * I) b = Z'y`. Zero-weight columns stay solvable for `lambda > 0`.
fn solve_normal_equations(
    z: &Array2<f64>,
    y: &Array1<f64>,
    lambda: f64,
) -> Result<Array1<f64>, TrainerError> {
    use ndarray_linalg::Solve;

    let mut gram = z.t().dot(z);
    gram.diag_mut().mapv_inplace(|d| d + lambda);
    let rhs = z.t().dot(y);
    if rhs.is_empty() {
        return Ok(rhs);
    }
    Ok(gram.solve_into(rhs)?)
}
