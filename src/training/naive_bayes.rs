//! Gaussian Naive Bayes for continuous features

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::models::{argmax, check_n_features, check_xy, class_index, sorted_classes, Model, Task};
use crate::error::{EasyMlError, Result};

/// Gaussian Naive Bayes Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Per-class feature means, `n_classes x n_features`
    means: Array2<f64>,
    /// Per-class feature variances, `n_classes x n_features`
    variances: Array2<f64>,
    /// Prior probability of each class
    priors: Vec<f64>,
    /// Sorted class labels
    classes: Vec<f64>,
    /// Portion of the largest feature variance added to every variance
    var_smoothing: f64,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            means: Array2::zeros((0, 0)),
            variances: Array2::zeros((0, 0)),
            priors: Vec::new(),
            classes: Vec::new(),
            var_smoothing: 1e-9,
        }
    }

    /// Set variance smoothing parameter
    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    /// Class priors, aligned with the sorted class labels
    pub fn class_priors(&self) -> &[f64] {
        &self.priors
    }

    /// Per-class log joint likelihood (unnormalized posterior) of one sample
    fn joint_log_likelihood(&self, sample: ArrayView1<f64>) -> Vec<f64> {
        self.classes
            .iter()
            .enumerate()
            .map(|(c, _)| {
                let log_likelihood: f64 = sample
                    .iter()
                    .zip(self.means.row(c).iter())
                    .zip(self.variances.row(c).iter())
                    .map(|((&xi, &mean), &var)| {
                        -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln())
                    })
                    .sum();
                self.priors[c].ln() + log_likelihood
            })
            .collect()
    }

    /// Posterior class probabilities, one row per sample
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.classes.is_empty() {
            return Err(EasyMlError::ModelNotFitted);
        }
        check_n_features(self.means.ncols(), x)?;

        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (sample, mut out) in x.rows().into_iter().zip(proba.rows_mut()) {
            let jll = self.joint_log_likelihood(sample);
            // log-sum-exp normalization
            let max = jll.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let sum: f64 = jll.iter().map(|v| (v - max).exp()).sum();
            for (o, v) in out.iter_mut().zip(jll.iter()) {
                *o = (v - max).exp() / sum;
            }
        }
        Ok(proba)
    }
}

impl Model for GaussianNaiveBayes {
    fn task(&self) -> Task {
        Task::Classification
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();

        let classes = sorted_classes(y);
        let k = classes.len();
        let mut counts = vec![0usize; k];
        let mut means: Array2<f64> = Array2::zeros((k, n_features));
        let mut m2: Array2<f64> = Array2::zeros((k, n_features));

        // Single-pass Welford's algorithm per class
        for (row, &label) in x.rows().into_iter().zip(y.iter()) {
            let c = class_index(&classes, label).ok_or_else(|| {
                EasyMlError::ComputationError(format!("label {} missing from class list", label))
            })?;
            counts[c] += 1;
            let count = counts[c] as f64;
            for (j, &val) in row.iter().enumerate() {
                let delta = val - means[[c, j]];
                means[[c, j]] += delta / count;
                let delta2 = val - means[[c, j]];
                m2[[c, j]] += delta * delta2;
            }
        }

        let epsilon = self.var_smoothing
            * x.var_axis(Axis(0), 0.0)
                .iter()
                .cloned()
                .fold(0.0_f64, f64::max);
        let mut variances = m2;
        for (c, mut row) in variances.rows_mut().into_iter().enumerate() {
            let n_class = counts[c] as f64;
            row.mapv_inplace(|v| v / n_class + epsilon);
        }
        // Zero-variance data with zero smoothing would divide by zero
        variances.mapv_inplace(|v| if v > 0.0 { v } else { f64::MIN_POSITIVE.sqrt() });

        self.priors = counts.iter().map(|&c| c as f64 / n_samples as f64).collect();
        self.means = means;
        self.variances = variances;
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.classes.is_empty() {
            return Err(EasyMlError::ModelNotFitted);
        }
        check_n_features(self.means.ncols(), x)?;

        Ok(x.rows()
            .into_iter()
            .map(|sample| self.classes[argmax(&self.joint_log_likelihood(sample))])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_gaussian_naive_bayes() {
        let x = array![
            [1.0, 2.0],
            [1.5, 1.8],
            [1.2, 2.2],
            [5.0, 8.0],
            [5.5, 7.8],
            [5.2, 8.2],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut model = GaussianNaiveBayes::new();
        model.fit(&x, &y).unwrap();

        let predictions = model.predict(&x).unwrap();
        assert_eq!(predictions, y);
    }

    #[test]
    fn test_gaussian_proba() {
        let x = array![[0.0], [0.5], [10.0], [10.5]];
        let y = array![2.0, 2.0, 4.0, 4.0];

        let mut model = GaussianNaiveBayes::new();
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&array![[0.2], [10.2]]).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert!(proba[[0, 0]] > 0.99);
        assert!(proba[[1, 1]] > 0.99);
    }

    #[test]
    fn test_class_priors() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![0.0, 0.0, 0.0, 1.0];

        let mut model = GaussianNaiveBayes::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.class_priors(), &[0.75, 0.25]);
    }

    #[test]
    fn test_constant_feature_does_not_break_prediction() {
        let x = array![[1.0, 3.0], [1.0, 3.1], [1.0, 9.0], [1.0, 9.2]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut model = GaussianNaiveBayes::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }
}
