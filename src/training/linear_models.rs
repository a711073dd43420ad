//! Linear model implementations

use crate::error::{EasyMlError, Result};
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;

use super::linalg::least_squares;
use super::models::{argmax, check_n_features, check_xy, class_index, sorted_classes, Model, Task};
use super::scaler::StandardScaler;

/// Ordinary least squares regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    /// Fitted coefficients (weights)
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept (bias), zero without `fit_intercept`
    pub intercept: f64,
    /// Whether to fit intercept
    pub fit_intercept: bool,
    /// Scale centered columns to unit L2 norm before solving.
    /// Only applies together with `fit_intercept`.
    pub normalize: bool,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    /// Create a new linear regression model
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            fit_intercept: false,
            normalize: false,
        }
    }

    /// Enable/disable fitting intercept
    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    /// Enable/disable column normalization
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}

impl Model for LinearRegression {
    fn task(&self) -> Task {
        Task::Regression
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;

        if !self.fit_intercept {
            self.coefficients = Some(least_squares(x, y)?);
            self.intercept = 0.0;
            return Ok(());
        }

        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| EasyMlError::InsufficientData("empty input table".to_string()))?;
        let y_mean = y.mean().unwrap_or(0.0);
        let mut x_centered = x - &x_mean;
        let y_centered = y - y_mean;

        let norms = if self.normalize {
            let norms = x_centered
                .map_axis(Axis(0), |col| col.dot(&col).sqrt())
                .mapv(|n| if n > f64::EPSILON { n } else { 1.0 });
            x_centered /= &norms;
            Some(norms)
        } else {
            None
        };

        let mut coefficients = least_squares(&x_centered, &y_centered)?;
        if let Some(norms) = norms {
            coefficients /= &norms;
        }

        self.intercept = y_mean - coefficients.dot(&x_mean);
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(EasyMlError::ModelNotFitted)?;
        check_n_features(coefficients.len(), x)?;
        Ok(x.dot(coefficients) + self.intercept)
    }
}

/// Regularization applied to logistic regression weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Penalty {
    L1,
    L2,
}

impl FromStr for Penalty {
    type Err = EasyMlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l1" => Ok(Penalty::L1),
            "l2" => Ok(Penalty::L2),
            other => Err(EasyMlError::invalid_parameter(
                "logreg_penalty",
                other,
                "expected 'l1' or 'l2'",
            )),
        }
    }
}

/// Multinomial logistic regression.
///
/// The objective is `C * sum(cross_entropy) + penalty(W)`; the intercept is
/// never penalized. The smooth L2 problem is solved with L-BFGS, the L1 problem
/// with proximal gradient steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub penalty: Penalty,
    /// Inverse regularization strength
    pub c: f64,
    pub fit_intercept: bool,
    /// Standardize features before fitting (and before every prediction)
    pub standardize: bool,
    pub max_iter: usize,
    pub tol: f64,
    classes: Vec<f64>,
    /// `(n_features + 1) x n_classes`; the last row holds the intercepts
    weights: Option<Array2<f64>>,
    scaler: Option<StandardScaler>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    /// Create a new logistic regression model
    pub fn new() -> Self {
        Self {
            penalty: Penalty::L2,
            c: 1.0,
            fit_intercept: false,
            standardize: false,
            max_iter: 200,
            tol: 1e-6,
            classes: Vec::new(),
            weights: None,
            scaler: None,
        }
    }

    pub fn with_penalty(mut self, penalty: Penalty) -> Self {
        self.penalty = penalty;
        self
    }

    /// Set inverse regularization strength
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    pub fn with_standardize(mut self, standardize: bool) -> Self {
        self.standardize = standardize;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Fitted class labels in ascending order
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Feature weights, one column per class
    pub fn coefficients(&self) -> Option<Array2<f64>> {
        self.weights.as_ref().map(|w| {
            let d = w.nrows() - 1;
            w.slice(s![..d, ..]).to_owned()
        })
    }

    fn prepare(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match &self.scaler {
            Some(scaler) => scaler.transform(x),
            None => Ok(x.clone()),
        }
    }

    fn logits(&self, x: &Array2<f64>, theta: &Array2<f64>) -> Array2<f64> {
        let d = x.ncols();
        let mut logits = x.dot(&theta.slice(s![..d, ..]));
        if self.fit_intercept {
            logits += &theta.row(d);
        }
        logits
    }

    /// Mean cross-entropy plus `0.5 * l2 * ||W||²`, with its gradient
    fn loss_grad(
        &self,
        x: &Array2<f64>,
        onehot: &Array2<f64>,
        theta: &Array2<f64>,
        l2: f64,
    ) -> (f64, Array2<f64>) {
        let n = x.nrows() as f64;
        let d = x.ncols();
        let mut probs = self.logits(x, theta);

        let mut loss = 0.0;
        for (mut row, target) in probs.rows_mut().into_iter().zip(onehot.rows()) {
            let true_logit = row.dot(&target);
            let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row /= sum;
            loss += max + sum.ln() - true_logit;
        }

        let diff = probs - onehot;
        let w = theta.slice(s![..d, ..]);
        let mut grad: Array2<f64> = Array2::zeros(theta.raw_dim());
        grad.slice_mut(s![..d, ..])
            .assign(&(x.t().dot(&diff) / n + &w * l2));
        if self.fit_intercept {
            grad.row_mut(d).assign(&(diff.sum_axis(Axis(0)) / n));
        }

        let loss = loss / n + 0.5 * l2 * w.iter().map(|v| v * v).sum::<f64>();
        (loss, grad)
    }

    fn minimize_lbfgs(&self, x: &Array2<f64>, onehot: &Array2<f64>, mut theta: Array2<f64>) -> Array2<f64> {
        const MEMORY: usize = 10;
        let l2 = 1.0 / (self.c * x.nrows() as f64);
        let (mut fx, mut g) = self.loss_grad(x, onehot, &theta, l2);
        let mut history: VecDeque<(Array2<f64>, Array2<f64>, f64)> = VecDeque::with_capacity(MEMORY);

        for _ in 0..self.max_iter {
            if max_abs(&g) < self.tol {
                break;
            }

            // Two-loop recursion
            let mut q = g.clone();
            let mut alphas = Vec::with_capacity(history.len());
            for (s_k, y_k, rho) in history.iter().rev() {
                let alpha = rho * dot(s_k, &q);
                q.scaled_add(-alpha, y_k);
                alphas.push(alpha);
            }
            if let Some((s_k, y_k, _)) = history.back() {
                q *= dot(s_k, y_k) / dot(y_k, y_k);
            }
            for ((s_k, y_k, rho), alpha) in history.iter().zip(alphas.iter().rev()) {
                let beta = rho * dot(y_k, &q);
                q.scaled_add(alpha - beta, s_k);
            }

            let mut direction = -q;
            let mut slope = dot(&g, &direction);
            if slope >= 0.0 {
                direction = -&g;
                slope = -dot(&g, &g);
                history.clear();
            }

            let mut step = 1.0;
            let mut accepted = None;
            for _ in 0..40 {
                let candidate = &theta + &(&direction * step);
                let (fc, gc) = self.loss_grad(x, onehot, &candidate, l2);
                if fc <= fx + 1e-4 * step * slope {
                    accepted = Some((candidate, fc, gc));
                    break;
                }
                step *= 0.5;
            }
            let Some((candidate, fc, gc)) = accepted else {
                break;
            };

            let s_k = &candidate - &theta;
            let y_k = &gc - &g;
            let sy = dot(&s_k, &y_k);
            if sy > 1e-12 {
                if history.len() == MEMORY {
                    history.pop_front();
                }
                history.push_back((s_k, y_k, 1.0 / sy));
            }

            let improvement = fx - fc;
            theta = candidate;
            fx = fc;
            g = gc;
            if improvement.abs() <= 1e-12 * fx.abs().max(1.0) {
                break;
            }
        }
        theta
    }

    fn minimize_proximal(&self, x: &Array2<f64>, onehot: &Array2<f64>, mut theta: Array2<f64>) -> Array2<f64> {
        let d = x.ncols();
        let lambda = 1.0 / (self.c * x.nrows() as f64);
        let mut t = 1.0;

        for _ in 0..self.max_iter.max(1) * 5 {
            let (fx, g) = self.loss_grad(x, onehot, &theta, 0.0);

            let mut candidate;
            let mut diff;
            let mut tries = 0;
            loop {
                candidate = &theta - &(&g * t);
                candidate
                    .slice_mut(s![..d, ..])
                    .mapv_inplace(|v| soft_threshold(v, t * lambda));
                diff = &candidate - &theta;
                let (fc, _) = self.loss_grad(x, onehot, &candidate, 0.0);
                tries += 1;
                if fc <= fx + dot(&g, &diff) + dot(&diff, &diff) / (2.0 * t) || tries >= 50 {
                    break;
                }
                t *= 0.5;
            }

            theta = candidate;
            if max_abs(&diff) < self.tol {
                break;
            }
            t *= 1.25;
        }
        theta
    }
}

fn dot(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn max_abs(a: &Array2<f64>) -> f64 {
    a.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
}

/// Soft-threshold operator for the L1 proximal step
fn soft_threshold(val: f64, threshold: f64) -> f64 {
    if val > threshold {
        val - threshold
    } else if val < -threshold {
        val + threshold
    } else {
        0.0
    }
}

impl Model for LogisticRegression {
    fn task(&self) -> Task {
        Task::Classification
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(EasyMlError::invalid_parameter("C", self.c, "must be positive"));
        }

        let classes = sorted_classes(y);
        if classes.len() < 2 {
            return Err(EasyMlError::InsufficientData(format!(
                "logistic regression needs at least 2 classes, got {}",
                classes.len()
            )));
        }

        self.scaler = if self.standardize {
            Some(StandardScaler::fit(x)?)
        } else {
            None
        };
        let x = self.prepare(x)?;

        let k = classes.len();
        let mut onehot = Array2::zeros((y.len(), k));
        for (i, &label) in y.iter().enumerate() {
            if let Some(c) = class_index(&classes, label) {
                onehot[[i, c]] = 1.0;
            }
        }
        self.classes = classes;

        let theta = Array2::zeros((x.ncols() + 1, k));
        let theta = match self.penalty {
            Penalty::L2 => self.minimize_lbfgs(&x, &onehot, theta),
            Penalty::L1 => self.minimize_proximal(&x, &onehot, theta),
        };

        if theta.iter().any(|v| !v.is_finite()) {
            return Err(EasyMlError::ComputationError(
                "logistic regression diverged".to_string(),
            ));
        }
        self.weights = Some(theta);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let theta = self.weights.as_ref().ok_or(EasyMlError::ModelNotFitted)?;
        check_n_features(theta.nrows() - 1, x)?;
        let x = self.prepare(x)?;
        let logits = self.logits(&x, theta);

        Ok(logits
            .rows()
            .into_iter()
            .map(|row| self.classes[argmax(&row.to_vec())])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_regression_simple() {
        // y = 2x + 1
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![3.0, 5.0, 7.0, 9.0, 11.0];

        let mut model = LinearRegression::new().with_fit_intercept(true);
        model.fit(&x, &y).unwrap();

        let coef = model.coefficients.as_ref().unwrap();
        assert!((coef[0] - 2.0).abs() < 1e-8);
        assert!((model.intercept - 1.0).abs() < 1e-8);

        let r2 = model.score(&x, &y).unwrap();
        assert!(r2 > 0.99, "R² should be > 0.99, got {}", r2);
    }

    #[test]
    fn test_linear_regression_without_intercept_passes_origin() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![3.0, 5.0, 7.0];

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.intercept, 0.0);
        assert_eq!(model.predict(&array![[0.0]]).unwrap()[0], 0.0);
    }

    #[test]
    fn test_normalize_does_not_change_ols_solution() {
        let x = array![[1.0, 100.0], [2.0, 300.0], [3.0, 200.0], [4.0, 500.0], [5.0, 400.0]];
        let y = array![1.0, 4.0, 5.0, 9.0, 10.0];

        let mut plain = LinearRegression::new().with_fit_intercept(true);
        plain.fit(&x, &y).unwrap();
        let mut normalized = LinearRegression::new()
            .with_fit_intercept(true)
            .with_normalize(true);
        normalized.fit(&x, &y).unwrap();

        let a = plain.predict(&x).unwrap();
        let b = normalized.predict(&x).unwrap();
        for (p, q) in a.iter().zip(b.iter()) {
            assert!((p - q).abs() < 1e-6);
        }
    }

    #[test]
    fn test_linear_regression_requires_fit() {
        let model = LinearRegression::new();
        assert!(matches!(
            model.predict(&array![[1.0]]),
            Err(EasyMlError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_penalty_parsing() {
        assert_eq!("l1".parse::<Penalty>().unwrap(), Penalty::L1);
        assert_eq!("L2".parse::<Penalty>().unwrap(), Penalty::L2);
        assert!("elasticnet".parse::<Penalty>().is_err());
    }

    #[test]
    fn test_logistic_regression() {
        let x = array![
            [1.0, 2.0],
            [2.0, 1.0],
            [1.5, 1.5],
            [5.0, 6.0],
            [6.0, 5.0],
            [5.5, 5.5],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut model = LogisticRegression::new().with_fit_intercept(true);
        model.fit(&x, &y).unwrap();

        let accuracy = model.score(&x, &y).unwrap();
        assert!(accuracy >= 0.99, "Accuracy should be 1.0, got {}", accuracy);
    }

    #[test]
    fn test_logistic_regression_multiclass_keeps_labels() {
        let x = array![[0.0], [0.2], [5.0], [5.2], [10.0], [10.2]];
        let y = array![3.0, 3.0, 7.0, 7.0, 9.0, 9.0];

        let mut model = LogisticRegression::new()
            .with_fit_intercept(true)
            .with_standardize(true)
            .with_c(100.0);
        model.fit(&x, &y).unwrap();

        assert_eq!(model.classes(), &[3.0, 7.0, 9.0]);
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_l1_with_tiny_c_zeroes_every_weight() {
        let x = array![[1.0, 0.5], [2.0, 0.1], [8.0, 0.3], [9.0, 0.7]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut model = LogisticRegression::new()
            .with_penalty(Penalty::L1)
            .with_c(1e-4);
        model.fit(&x, &y).unwrap();

        let coef = model.coefficients().unwrap();
        assert!(coef.iter().all(|&w| w == 0.0), "coef = {:?}", coef);
    }

    #[test]
    fn test_l1_separates_easy_data() {
        let x = array![[0.0, 1.0], [0.5, 1.0], [4.0, 1.0], [4.5, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut model = LogisticRegression::new()
            .with_penalty(Penalty::L1)
            .with_fit_intercept(true)
            .with_c(10.0);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_single_class_is_rejected() {
        let mut model = LogisticRegression::new();
        let x = array![[1.0], [2.0]];
        assert!(model.fit(&x, &array![1.0, 1.0]).is_err());
    }
}
