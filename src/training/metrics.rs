//! Accuracy scoring shared by every trainer
//!
//! Classifiers are compared by match rate, regressors by the coefficient of
//! determination. Both functions refuse empty or misaligned inputs instead of
//! returning a silent default.

use crate::error::{EasyMlError, Result};
use ndarray::Array1;

fn check_aligned(predicted: &Array1<f64>, truth: &Array1<f64>) -> Result<()> {
    if predicted.len() != truth.len() {
        return Err(EasyMlError::length_mismatch(truth.len(), predicted.len()));
    }
    if truth.is_empty() {
        return Err(EasyMlError::InvalidInput(
            "cannot score an empty prediction set".to_string(),
        ));
    }
    Ok(())
}

/// Fraction (0..=1) of positions where the predicted label equals the true label
pub fn match_fraction(predicted: &Array1<f64>, truth: &Array1<f64>) -> Result<f64> {
    check_aligned(predicted, truth)?;
    let matches = predicted
        .iter()
        .zip(truth.iter())
        .filter(|(p, t)| p == t)
        .count();
    Ok(matches as f64 / truth.len() as f64)
}

/// Match rate as a percentage (0..=100), the value reported as `Accuracy [%]`
pub fn match_accuracy(predicted: &Array1<f64>, truth: &Array1<f64>) -> Result<f64> {
    Ok(match_fraction(predicted, truth)? * 100.0)
}

/// Coefficient of determination of `predicted` against `truth`.
///
/// A constant `truth` has no variance to explain: the score is 1.0 for an exact
/// prediction and 0.0 otherwise.
pub fn r2_score(predicted: &Array1<f64>, truth: &Array1<f64>) -> Result<f64> {
    check_aligned(predicted, truth)?;
    let mean = truth.sum() / truth.len() as f64;
    let ss_res: f64 = predicted
        .iter()
        .zip(truth.iter())
        .map(|(p, t)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// Round to 4 decimal digits
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_match_accuracy_percentage() {
        let truth = array![0.0, 1.0, 2.0, 1.0];
        let predicted = array![0.0, 1.0, 1.0, 1.0];
        assert_eq!(match_accuracy(&predicted, &truth).unwrap(), 75.0);
        assert_eq!(match_fraction(&predicted, &truth).unwrap(), 0.75);
    }

    #[test]
    fn test_match_accuracy_rejects_bad_input() {
        let empty: Array1<f64> = Array1::zeros(0);
        assert!(match_accuracy(&empty, &empty).is_err());

        let short = array![1.0];
        let long = array![1.0, 0.0];
        assert!(matches!(
            match_accuracy(&short, &long),
            Err(EasyMlError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_r2_perfect_and_mean() {
        let truth = array![1.0, 2.0, 3.0, 4.0];
        assert_eq!(r2_score(&truth, &truth).unwrap(), 1.0);

        let mean_prediction = array![2.5, 2.5, 2.5, 2.5];
        assert!(r2_score(&mean_prediction, &truth).unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_r2_constant_truth() {
        let truth = array![3.0, 3.0, 3.0];
        assert_eq!(r2_score(&array![3.0, 3.0, 3.0], &truth).unwrap(), 1.0);
        assert_eq!(r2_score(&array![3.0, 3.0, 2.0], &truth).unwrap(), 0.0);
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(-0.00004), -0.0);
        assert_eq!(round4(1.0), 1.0);
    }
}
