//! Support Vector Machine implementations
//!
//! Kernel SVM classifier (one-vs-rest) and epsilon-SVR, both trained by dual
//! coordinate descent. The bias is absorbed into the kernel as `K(x, z) + 1`,
//! which removes the equality constraint of the classic dual.

use crate::error::{EasyMlError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::models::{check_n_features, check_xy, sorted_classes, Model, Task};

/// Maximum number of samples for eager kernel matrix computation.
/// Beyond this, training returns an error to prevent OOM.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Kernel function type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KernelType {
    /// K(x, y) = x · y
    Linear,
    /// K(x, y) = (γ x · y + coef0)^degree
    Polynomial,
    /// K(x, y) = exp(-γ ||x - y||²)
    #[default]
    RBF,
    /// K(x, y) = tanh(γ x · y + coef0)
    Sigmoid,
}

impl FromStr for KernelType {
    type Err = EasyMlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(KernelType::Linear),
            "poly" | "polynomial" => Ok(KernelType::Polynomial),
            "rbf" => Ok(KernelType::RBF),
            "sigmoid" => Ok(KernelType::Sigmoid),
            other => Err(EasyMlError::invalid_parameter(
                "kernel",
                other,
                "expected 'linear', 'poly', 'rbf' or 'sigmoid'",
            )),
        }
    }
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    pub kernel: KernelType,
    /// Polynomial degree, ignored by the other kernels
    pub degree: u32,
    /// Independent term of the polynomial and sigmoid kernels
    pub coef0: f64,
    /// Kernel coefficient; `None` uses `1 / (n_features * Var(X))`
    pub gamma: Option<f64>,
    /// Epsilon for regression (SVR tube width)
    pub epsilon: f64,
    /// Tolerance for stopping criterion
    pub tol: f64,
    /// Maximum number of coordinate sweeps
    pub max_iter: usize,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelType::RBF,
            degree: 3,
            coef0: 0.0,
            gamma: None,
            epsilon: 0.1,
            tol: 1e-3,
            max_iter: 1000,
        }
    }
}

impl SVMConfig {
    fn validate(&self, n_samples: usize) -> Result<()> {
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(EasyMlError::invalid_parameter("C", self.c, "must be positive"));
        }
        if self.kernel == KernelType::Polynomial && self.degree == 0 {
            return Err(EasyMlError::invalid_parameter("degree", 0, "must be at least 1"));
        }
        if self.epsilon < 0.0 {
            return Err(EasyMlError::invalid_parameter(
                "epsilon",
                self.epsilon,
                "must be non-negative",
            ));
        }
        if n_samples > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(EasyMlError::InvalidInput(format!(
                "SVM training supports at most {} samples, got {}",
                MAX_KERNEL_MATRIX_SAMPLES, n_samples
            )));
        }
        Ok(())
    }

    /// Resolve `gamma`, applying the 'scale' heuristic when unset
    fn fitted_kernel(&self, x: &Array2<f64>) -> Kernel {
        let gamma = self.gamma.unwrap_or_else(|| {
            let var = x.var(0.0);
            if var > 0.0 {
                1.0 / (x.ncols() as f64 * var)
            } else {
                1.0
            }
        });
        Kernel {
            kind: self.kernel,
            gamma,
            degree: self.degree,
            coef0: self.coef0,
        }
    }
}

/// Kernel with every coefficient fixed at fit time
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Kernel {
    kind: KernelType,
    gamma: f64,
    degree: u32,
    coef0: f64,
}

impl Kernel {
    fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self.kind {
            KernelType::Linear => a.dot(&b),
            KernelType::Polynomial => (self.gamma * a.dot(&b) + self.coef0).powi(self.degree as i32),
            KernelType::RBF => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
                (-self.gamma * sq).exp()
            }
            KernelType::Sigmoid => (self.gamma * a.dot(&b) + self.coef0).tanh(),
        }
    }

    /// `K(x_i, x_j) + 1` over all training pairs
    fn augmented_matrix(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let n = x.nrows();
        let flat: Vec<f64> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                let xi = x.row(i);
                (0..n).map(move |j| self.eval(xi, x.row(j)) + 1.0)
            })
            .collect();
        Ok(Array2::from_shape_vec((n, n), flat)?)
    }
}

/// Kernel expansion `f(x) = sum_j coef_j * (K(sv_j, x) + 1)`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KernelMachine {
    support_vectors: Array2<f64>,
    coef: Array1<f64>,
}

impl KernelMachine {
    /// Keep only the rows with a non-zero dual coefficient
    fn from_dual(x: &Array2<f64>, dual: &Array1<f64>) -> Self {
        let support: Vec<usize> = dual
            .iter()
            .enumerate()
            .filter(|(_, &c)| c != 0.0)
            .map(|(i, _)| i)
            .collect();
        Self {
            support_vectors: x.select(Axis(0), &support),
            coef: dual.select(Axis(0), &support),
        }
    }

    fn decision(&self, kernel: &Kernel, sample: ArrayView1<f64>) -> f64 {
        self.support_vectors
            .rows()
            .into_iter()
            .zip(self.coef.iter())
            .map(|(sv, &c)| c * (kernel.eval(sv, sample) + 1.0))
            .sum()
    }
}

/// Dual coordinate descent for the hinge-loss SVM with labels in {-1, +1}.
/// Returns `alpha_i * y_i`.
fn solve_classification(k: &Array2<f64>, y: &[f64], config: &SVMConfig) -> Array1<f64> {
    let n = y.len();
    let mut alpha = vec![0.0; n];
    // f_i = sum_j alpha_j y_j K'_ij
    let mut f = vec![0.0; n];

    for _sweep in 0..config.max_iter {
        let mut max_change = 0.0_f64;
        for i in 0..n {
            let q_ii = k[[i, i]];
            let gradient = y[i] * f[i] - 1.0;
            let updated = (alpha[i] - gradient / q_ii).clamp(0.0, config.c);
            let delta = updated - alpha[i];
            if delta != 0.0 {
                alpha[i] = updated;
                let step = delta * y[i];
                for (fj, kij) in f.iter_mut().zip(k.row(i).iter()) {
                    *fj += step * kij;
                }
                max_change = max_change.max(delta.abs());
            }
        }
        if max_change < config.tol {
            break;
        }
    }

    alpha.iter().zip(y.iter()).map(|(a, y)| a * y).collect()
}

/// Dual coordinate descent for epsilon-insensitive regression.
/// Returns `beta_i = alpha_i - alpha_i*`.
fn solve_regression(k: &Array2<f64>, y: &Array1<f64>, config: &SVMConfig) -> Array1<f64> {
    let n = y.len();
    let mut beta = vec![0.0; n];
    // f_i = sum_j beta_j K'_ij
    let mut f = vec![0.0; n];

    for _sweep in 0..config.max_iter {
        let mut max_change = 0.0_f64;
        for i in 0..n {
            let k_ii = k[[i, i]];
            let others = f[i] - k_ii * beta[i];
            let z = (y[i] - others) / k_ii;
            let threshold = config.epsilon / k_ii;
            let shrunk = if z > threshold {
                z - threshold
            } else if z < -threshold {
                z + threshold
            } else {
                0.0
            };
            let updated = shrunk.clamp(-config.c, config.c);
            let delta = updated - beta[i];
            if delta != 0.0 {
                beta[i] = updated;
                for (fj, kij) in f.iter_mut().zip(k.row(i).iter()) {
                    *fj += delta * kij;
                }
                max_change = max_change.max(delta.abs());
            }
        }
        if max_change < config.tol {
            break;
        }
    }

    Array1::from_vec(beta)
}

/// Support Vector Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    config: SVMConfig,
    kernel: Option<Kernel>,
    classes: Vec<f64>,
    /// One machine for binary problems (positive = second class),
    /// otherwise one per class against the rest
    machines: Vec<KernelMachine>,
    n_features: usize,
}

impl SVMClassifier {
    /// Create a new SVM classifier
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            kernel: None,
            classes: Vec::new(),
            machines: Vec::new(),
            n_features: 0,
        }
    }

    pub fn config(&self) -> &SVMConfig {
        &self.config
    }

    /// Total number of stored support vectors
    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().map(|m| m.coef.len()).sum()
    }
}

impl Model for SVMClassifier {
    fn task(&self) -> Task {
        Task::Classification
    }

    /// Fit the classifier (binary directly, multi-class via one-vs-rest)
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.config.validate(x.nrows())?;

        let classes = sorted_classes(y);
        if classes.len() < 2 {
            return Err(EasyMlError::InsufficientData(
                "SVM requires at least 2 distinct classes".to_string(),
            ));
        }

        let kernel = self.config.fitted_kernel(x);
        let gram = kernel.augmented_matrix(x)?;

        let positives: Vec<f64> = if classes.len() == 2 {
            vec![classes[1]]
        } else {
            classes.clone()
        };
        let machines = positives
            .iter()
            .map(|&positive| {
                let signs: Vec<f64> = y
                    .iter()
                    .map(|&label| if label == positive { 1.0 } else { -1.0 })
                    .collect();
                let dual = solve_classification(&gram, &signs, &self.config);
                KernelMachine::from_dual(x, &dual)
            })
            .collect();

        self.kernel = Some(kernel);
        self.classes = classes;
        self.machines = machines;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let kernel = self.kernel.as_ref().ok_or(EasyMlError::ModelNotFitted)?;
        check_n_features(self.n_features, x)?;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let sample = x.row(i);
                if let [machine] = self.machines.as_slice() {
                    let score = machine.decision(kernel, sample);
                    return if score > 0.0 { self.classes[1] } else { self.classes[0] };
                }
                let mut best = 0;
                let mut best_score = f64::NEG_INFINITY;
                for (c, machine) in self.machines.iter().enumerate() {
                    let score = machine.decision(kernel, sample);
                    if score > best_score {
                        best = c;
                        best_score = score;
                    }
                }
                self.classes[best]
            })
            .collect();
        Ok(Array1::from_vec(predictions))
    }
}

/// Epsilon-insensitive Support Vector Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMRegressor {
    config: SVMConfig,
    kernel: Option<Kernel>,
    machine: Option<KernelMachine>,
    n_features: usize,
}

impl SVMRegressor {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            kernel: None,
            machine: None,
            n_features: 0,
        }
    }

    pub fn config(&self) -> &SVMConfig {
        &self.config
    }

    pub fn n_support_vectors(&self) -> usize {
        self.machine.as_ref().map_or(0, |m| m.coef.len())
    }
}

impl Model for SVMRegressor {
    fn task(&self) -> Task {
        Task::Regression
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.config.validate(x.nrows())?;

        let kernel = self.config.fitted_kernel(x);
        let gram = kernel.augmented_matrix(x)?;
        let dual = solve_regression(&gram, y, &self.config);

        self.machine = Some(KernelMachine::from_dual(x, &dual));
        self.kernel = Some(kernel);
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (kernel, machine) = match (&self.kernel, &self.machine) {
            (Some(k), Some(m)) => (k, m),
            _ => return Err(EasyMlError::ModelNotFitted),
        };
        check_n_features(self.n_features, x)?;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| machine.decision(kernel, x.row(i)))
            .collect();
        Ok(Array1::from_vec(predictions))
    }
}
