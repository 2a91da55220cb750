//! Regression metrics for one set of predictions.

use crate::stats::{finite_pairs, pearson};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    pub pearson_r: f64,
}

impl RegressionMetrics {
    pub fn undefined() -> Self {
        Self {
            rmse: f64::NAN,
            mae: f64::NAN,
            r2: f64::NAN,
            pearson_r: f64::NAN,
        }
    }
}

/// RMSE, MAE, coefficient of determination and Pearson r of `y_pred` against `y_true`.
///
/// Pairs where either value is not finite are ignored. Every metric is `NaN` when no
/// pair remains. When `y_true` is constant the coefficient of determination is `1.0`
/// for a perfect fit and `0.0` otherwise. Pearson r follows [`pearson`] and is
/// undefined below two points.
pub fn evaluate_predictions(y_true: &[f64], y_pred: &[f64]) -> RegressionMetrics {
    if y_true.len() != y_pred.len() {
        return RegressionMetrics::undefined();
    }
    let (y_true, y_pred) = finite_pairs(y_true, y_pred);
    let n = y_true.len();
    if n == 0 {
        return RegressionMetrics::undefined();
    }
    let nf = n as f64;

    let mut ss_res = 0.0;
    let mut abs_sum = 0.0;
    for (&t, &p) in y_true.iter().zip(&y_pred) {
        let diff = p - t;
        ss_res += diff * diff;
        abs_sum += diff.abs();
    }

    let mean_true = y_true.iter().sum::<f64>() / nf;
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean_true).powi(2)).sum();
    let r2 = if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    };

    RegressionMetrics {
        rmse: (ss_res / nf).sqrt(),
        mae: abs_sum / nf,
        r2,
        pearson_r: pearson(&y_true, &y_pred),
    }
}

/// Per-variant errors of one prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointError {
    pub absolute_error: f64,
    pub squared_error: f64,
    /// `+inf` when the true value is zero.
    pub percentage_error: f64,
}

pub fn point_error(y_true: f64, y_pred: f64) -> PointError {
    let absolute_error = (y_true - y_pred).abs();
    let percentage_error = if y_true == 0.0 {
        f64::INFINITY
    } else {
        absolute_error / y_true.abs() * 100.0
    };
    PointError {
        absolute_error,
        squared_error: absolute_error * absolute_error,
        percentage_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn perfect_predictions() {
        let y = [0.1, 0.5, 0.9, 1.2];
        let m = evaluate_predictions(&y, &y);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.r2, 1.0);
        assert_abs_diff_eq!(m.pearson_r, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn single_perfect_prediction_has_no_correlation() {
        let m = evaluate_predictions(&[0.4], &[0.4]);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.r2, 1.0);
        assert!(m.pearson_r.is_nan());
    }

    #[test]
    fn known_errors() {
        let y_true = [1.0, 2.0, 3.0];
        let y_pred = [1.5, 2.0, 2.0];
        let m = evaluate_predictions(&y_true, &y_pred);
        assert_abs_diff_eq!(m.rmse, (1.25f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(m.mae, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(m.r2, 1.0 - 1.25 / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_input_is_undefined() {
        let m = evaluate_predictions(&[], &[]);
        assert!(m.rmse.is_nan() && m.mae.is_nan() && m.r2.is_nan() && m.pearson_r.is_nan());
    }

    #[test]
    fn non_finite_pairs_are_ignored() {
        let m = evaluate_predictions(&[0.1, 0.5, 0.9], &[0.1, f64::NAN, 0.9]);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.r2, 1.0);
        assert_abs_diff_eq!(m.pearson_r, 1.0, epsilon = 1e-12);

        let m = evaluate_predictions(&[f64::NAN, 1.0, 3.0], &[2.0, 2.0, 2.0]);
        assert_abs_diff_eq!(m.rmse, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.mae, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.r2, 0.0, epsilon = 1e-12);

        let m = evaluate_predictions(&[f64::NAN], &[0.3]);
        assert!(m.rmse.is_nan() && m.r2.is_nan());
    }

    #[test]
    fn point_errors() {
        let e = point_error(0.5, 0.3);
        assert_abs_diff_eq!(e.absolute_error, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(e.squared_error, 0.04, epsilon = 1e-12);
        assert_abs_diff_eq!(e.percentage_error, 40.0, epsilon = 1e-9);
        assert_eq!(point_error(0.0, 0.3).percentage_error, f64::INFINITY);
    }
}
