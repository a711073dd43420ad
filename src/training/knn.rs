//! K-Nearest Neighbors implementation
//!
//! KNN classifier and regressor over the Minkowski distance family.

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::str::FromStr;

use super::models::{check_n_features, check_xy, class_index, sorted_classes, Model, Task};
use crate::error::{EasyMlError, Result};

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

impl FromStr for WeightScheme {
    type Err = EasyMlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" => Ok(WeightScheme::Uniform),
            "distance" => Ok(WeightScheme::Distance),
            other => Err(EasyMlError::invalid_parameter(
                "weights",
                other,
                "expected 'uniform' or 'distance'",
            )),
        }
    }
}

/// Neighbor search strategy requested by the caller.
///
/// Every strategy returns the exact neighbors; the search itself is always a
/// brute-force scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchAlgorithm {
    #[default]
    Auto,
    BallTree,
    KdTree,
    Brute,
}

impl FromStr for SearchAlgorithm {
    type Err = EasyMlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SearchAlgorithm::Auto),
            "ball_tree" => Ok(SearchAlgorithm::BallTree),
            "kd_tree" => Ok(SearchAlgorithm::KdTree),
            "brute" => Ok(SearchAlgorithm::Brute),
            other => Err(EasyMlError::invalid_parameter(
                "algorithm",
                other,
                "expected 'auto', 'ball_tree', 'kd_tree' or 'brute'",
            )),
        }
    }
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    /// Number of neighbors
    pub n_neighbors: usize,
    /// Minkowski power: 1 is Manhattan, 2 is Euclidean
    pub p: f64,
    /// Weighting scheme
    pub weights: WeightScheme,
    pub algorithm: SearchAlgorithm,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            p: 2.0,
            weights: WeightScheme::Uniform,
            algorithm: SearchAlgorithm::Auto,
        }
    }
}

impl KNNConfig {
    fn validate(&self, n_train: usize) -> Result<()> {
        if self.n_neighbors == 0 {
            return Err(EasyMlError::invalid_parameter(
                "nnc_k",
                0,
                "must be at least 1",
            ));
        }
        if self.n_neighbors > n_train {
            return Err(EasyMlError::invalid_parameter(
                "nnc_k",
                self.n_neighbors,
                format!("exceeds the {} training samples", n_train),
            ));
        }
        if !(self.p >= 1.0 && self.p.is_finite()) {
            return Err(EasyMlError::invalid_parameter("nnc_p", self.p, "must be >= 1"));
        }
        Ok(())
    }
}

/// Stored training data shared by both estimators
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TrainingSet {
    x: Option<Array2<f64>>,
    y: Option<Array1<f64>>,
}

impl TrainingSet {
    fn store(&mut self, config: &KNNConfig, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        config.validate(x.nrows())?;
        self.x = Some(x.clone());
        self.y = Some(y.clone());
        Ok(())
    }

    /// Neighbors of every query row, each sorted by ascending distance
    fn neighbors(&self, config: &KNNConfig, x: &Array2<f64>) -> Result<Vec<Vec<(f64, f64)>>> {
        let (x_train, y_train) = match (&self.x, &self.y) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(EasyMlError::ModelNotFitted),
        };
        check_n_features(x_train.ncols(), x)?;

        Ok((0..x.nrows())
            .into_par_iter()
            .map(|i| find_k_nearest(x.row(i), x_train, y_train, config.n_neighbors, config.p))
            .collect())
    }
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    config: KNNConfig,
    data: TrainingSet,
    classes: Vec<f64>,
}

impl KNNClassifier {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            data: TrainingSet::default(),
            classes: Vec::new(),
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &KNNConfig {
        &self.config
    }
}

impl Model for KNNClassifier {
    fn task(&self) -> Task {
        Task::Classification
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.data.store(&self.config, x, y)?;
        self.classes = sorted_classes(y);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let neighbors = self.data.neighbors(&self.config, x)?;
        Ok(neighbors
            .iter()
            .map(|n| vote_classify(n, &self.classes, self.config.weights))
            .collect())
    }
}

/// K-Nearest Neighbors Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNRegressor {
    config: KNNConfig,
    data: TrainingSet,
}

impl KNNRegressor {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            data: TrainingSet::default(),
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &KNNConfig {
        &self.config
    }
}

impl Model for KNNRegressor {
    fn task(&self) -> Task {
        Task::Regression
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.data.store(&self.config, x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let neighbors = self.data.neighbors(&self.config, x)?;
        Ok(neighbors
            .iter()
            .map(|n| weighted_mean_from(n, self.config.weights))
            .collect())
    }
}

/// Max-heap entry ordered by distance, then by training row
struct Candidate {
    dist: f64,
    row: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then(self.row.cmp(&other.row))
    }
}

/// Find k nearest neighbors using a max-heap; equal distances keep training order
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
    p: f64,
) -> Vec<(f64, f64)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (row, sample) in x_train.rows().into_iter().enumerate() {
        let candidate = Candidate {
            dist: minkowski(point, sample, p),
            row,
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().map_or(false, |top| candidate < *top) {
            heap.pop();
            heap.push(candidate);
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|c| (c.dist, y_train[c.row]))
        .collect()
}

fn minkowski(a: ArrayView1<f64>, b: ArrayView1<f64>, p: f64) -> f64 {
    let diffs = a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs());
    if p == 1.0 {
        diffs.sum()
    } else if p == 2.0 {
        diffs.map(|d| d * d).sum::<f64>().sqrt()
    } else {
        diffs.map(|d| d.powf(p)).sum::<f64>().powf(1.0 / p)
    }
}

/// Neighbor weights; with distance weighting, exact matches take all the weight
fn neighbor_weights(neighbors: &[(f64, f64)], weights: WeightScheme) -> Vec<f64> {
    match weights {
        WeightScheme::Uniform => vec![1.0; neighbors.len()],
        WeightScheme::Distance => {
            if neighbors.iter().any(|(d, _)| *d == 0.0) {
                neighbors
                    .iter()
                    .map(|(d, _)| if *d == 0.0 { 1.0 } else { 0.0 })
                    .collect()
            } else {
                neighbors.iter().map(|(d, _)| 1.0 / d).collect()
            }
        }
    }
}

/// Classify by weighted majority vote; the lowest label wins ties
fn vote_classify(neighbors: &[(f64, f64)], classes: &[f64], weights: WeightScheme) -> f64 {
    let mut votes = vec![0.0; classes.len()];
    for (&(_, label), w) in neighbors.iter().zip(neighbor_weights(neighbors, weights)) {
        if let Some(c) = class_index(classes, label) {
            votes[c] += w;
        }
    }
    let mut best = 0;
    for (c, &v) in votes.iter().enumerate() {
        if v > votes[best] {
            best = c;
        }
    }
    classes[best]
}

/// Compute weighted mean for regression
fn weighted_mean_from(neighbors: &[(f64, f64)], weights: WeightScheme) -> f64 {
    let w = neighbor_weights(neighbors, weights);
    let total: f64 = w.iter().sum();
    neighbors
        .iter()
        .zip(w.iter())
        .map(|(&(_, y), w)| w * y)
        .sum::<f64>()
        / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec(
            (20, 2),
            vec![
                // Class 0 (low values)
                1.0, 1.0, 1.5, 1.5, 2.0, 2.0, 2.5, 2.5, 1.0, 2.0, 1.5, 2.5, 2.0, 1.5, 2.5, 1.0,
                1.2, 1.8, 1.8, 1.2, // Class 1 (high values)
                8.0, 8.0, 8.5, 8.5, 9.0, 9.0, 9.5, 9.5, 8.0, 9.0, 8.5, 9.5, 9.0, 8.5, 9.5, 8.0,
                8.2, 8.8, 8.8, 8.2,
            ],
        )
        .unwrap();
        let y = Array1::from_iter((0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }));
        (x, y)
    }

    #[test]
    fn test_knn_classifier() {
        let (x, y) = create_classification_data();
        let mut knn = KNNClassifier::with_k(3);
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_knn_regressor_uniform_mean() {
        let x = array![[0.0], [1.0], [2.0], [10.0]];
        let y = array![0.0, 1.0, 2.0, 10.0];

        let mut knn = KNNRegressor::with_k(3);
        knn.fit(&x, &y).unwrap();
        let predictions = knn.predict(&array![[1.0]]).unwrap();
        assert!((predictions[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_distance_weighting_prefers_exact_match() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![5.0, 7.0, 9.0];

        let mut knn = KNNRegressor::new(KNNConfig {
            n_neighbors: 3,
            weights: WeightScheme::Distance,
            ..Default::default()
        });
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&array![[1.0]]).unwrap()[0], 7.0);
    }

    #[test]
    fn test_minkowski_distances() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert!((minkowski(a.view(), b.view(), 2.0) - 5.0).abs() < 1e-12);
        assert!((minkowski(a.view(), b.view(), 1.0) - 7.0).abs() < 1e-12);
        let d3 = minkowski(a.view(), b.view(), 3.0);
        assert!((d3 - (27.0_f64 + 64.0).powf(1.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_vote_tie_goes_to_lowest_label() {
        let x = array![[0.0], [2.0]];
        let y = array![4.0, 1.0];
        let mut knn = KNNClassifier::with_k(2);
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&array![[1.0]]).unwrap()[0], 1.0);
    }

    #[test]
    fn test_invalid_configuration() {
        let (x, y) = create_classification_data();
        assert!(KNNClassifier::with_k(0).fit(&x, &y).is_err());
        assert!(KNNClassifier::with_k(21).fit(&x, &y).is_err());

        let mut knn = KNNRegressor::new(KNNConfig {
            p: 0.5,
            ..Default::default()
        });
        assert!(knn.fit(&x, &y).is_err());

        assert!("ball_tree".parse::<SearchAlgorithm>().is_ok());
        assert!("octree".parse::<SearchAlgorithm>().is_err());
        assert!("distance".parse::<WeightScheme>().is_ok());
    }
}
