//! Linear Discriminant Analysis classifier

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::linalg::{solve_symmetric, symmetric_pinv};
use super::models::{argmax, check_n_features, check_xy, class_index, sorted_classes, Model, Task};
use crate::error::{EasyMlError, Result};

/// How the shared covariance is inverted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LdaSolver {
    /// Pseudo-inverse through the spectral decomposition; tolerates collinear features
    #[default]
    Svd,
    /// Direct solve of `Sigma w = mu` per class
    Lsqr,
    /// Eigen-decomposition of the covariance
    Eigen,
}

impl FromStr for LdaSolver {
    type Err = EasyMlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "svd" => Ok(LdaSolver::Svd),
            "lsqr" => Ok(LdaSolver::Lsqr),
            "eigen" => Ok(LdaSolver::Eigen),
            other => Err(EasyMlError::invalid_parameter(
                "lda_solver",
                other,
                "expected 'svd', 'lsqr' or 'eigen'",
            )),
        }
    }
}

/// Gaussian class-conditional model with a covariance shared by all classes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearDiscriminantAnalysis {
    pub solver: LdaSolver,
    classes: Vec<f64>,
    /// `n_features x n_classes`
    coef: Option<Array2<f64>>,
    intercept: Array1<f64>,
}

impl Default for LinearDiscriminantAnalysis {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearDiscriminantAnalysis {
    pub fn new() -> Self {
        Self {
            solver: LdaSolver::Svd,
            classes: Vec::new(),
            coef: None,
            intercept: Array1::zeros(0),
        }
    }

    pub fn with_solver(mut self, solver: LdaSolver) -> Self {
        self.solver = solver;
        self
    }

    /// Linear discriminant score of every class, one row per sample
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let coef = self.coef.as_ref().ok_or(EasyMlError::ModelNotFitted)?;
        check_n_features(coef.nrows(), x)?;
        Ok(x.dot(coef) + &self.intercept)
    }
}

impl Model for LinearDiscriminantAnalysis {
    fn task(&self) -> Task {
        Task::Classification
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let n = x.nrows();
        let d = x.ncols();

        let classes = sorted_classes(y);
        let k = classes.len();
        if k < 2 {
            return Err(EasyMlError::InsufficientData(format!(
                "discriminant analysis needs at least 2 classes, got {}",
                k
            )));
        }

        let mut counts = vec![0usize; k];
        let mut means: Array2<f64> = Array2::zeros((k, d));
        let labels: Vec<usize> = y
            .iter()
            .map(|&label| class_index(&classes, label).unwrap_or(0))
            .collect();
        for (row, &c) in x.rows().into_iter().zip(labels.iter()) {
            counts[c] += 1;
            let mut mean = means.row_mut(c);
            mean += &row;
        }
        for (c, mut mean) in means.axis_iter_mut(Axis(0)).enumerate() {
            mean /= counts[c] as f64;
        }

        // Within-class covariance weighted by the class priors
        let mut centered = x.clone();
        for (mut row, &c) in centered.rows_mut().into_iter().zip(labels.iter()) {
            row -= &means.row(c);
        }
        let covariance = centered.t().dot(&centered) / n as f64;

        let means_t = means.t().to_owned();
        let coef = match self.solver {
            LdaSolver::Svd | LdaSolver::Eigen => symmetric_pinv(&covariance, 1e-10).dot(&means_t),
            LdaSolver::Lsqr => {
                let mut coef = Array2::zeros((d, k));
                for c in 0..k {
                    let w = solve_symmetric(&covariance, &means.row(c).to_owned())?;
                    coef.column_mut(c).assign(&w);
                }
                coef
            }
        };

        let intercept: Array1<f64> = (0..k)
            .map(|c| {
                let prior = counts[c] as f64 / n as f64;
                -0.5 * means.row(c).dot(&coef.column(c)) + prior.ln()
            })
            .collect();

        self.classes = classes;
        self.coef = Some(coef);
        self.intercept = intercept;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.decision_function(x)?;
        Ok(scores
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

    fn three_clusters() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 0.1],
            [0.3, -0.2],
            [-0.2, 0.2],
            [5.0, 5.1],
            [5.3, 4.8],
            [4.8, 5.2],
            [0.1, 9.9],
            [-0.3, 10.2],
            [0.2, 10.1],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        (x, y)
    }

    #[test]
    fn test_every_solver_separates_clusters() {
        let (x, y) = three_clusters();
        for solver in [LdaSolver::Svd, LdaSolver::Lsqr, LdaSolver::Eigen] {
            let mut lda = LinearDiscriminantAnalysis::new().with_solver(solver);
            lda.fit(&x, &y).unwrap();
            assert_eq!(lda.predict(&x).unwrap(), y, "solver {:?}", solver);
        }
    }

    #[test]
    fn test_duplicated_feature_is_tolerated() {
        let x = array![[0.0, 0.0], [1.0, 1.0], [0.5, 0.5], [6.0, 6.0], [7.0, 7.0], [6.5, 6.5]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut lda = LinearDiscriminantAnalysis::new();
        lda.fit(&x, &y).unwrap();
        assert_eq!(lda.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_solver_parsing() {
        assert_eq!("lsqr".parse::<LdaSolver>().unwrap(), LdaSolver::Lsqr);
        assert!("qr".parse::<LdaSolver>().is_err());
    }

    #[test]
    fn test_single_class_is_rejected() {
        let mut lda = LinearDiscriminantAnalysis::new();
        assert!(lda.fit(&array![[1.0], [2.0]], &array![0.0, 0.0]).is_err());
    }
}
