//! CART decision tree for classification and regression

use crate::error::{EasyMlError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::models::{check_n_features, check_xy, class_index, sorted_classes, Model, Task};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node; samples with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    MSE,
    /// Mean absolute deviation from the median (regression)
    MAE,
}

impl Criterion {
    pub fn task(self) -> Task {
        match self {
            Criterion::Gini | Criterion::Entropy => Task::Classification,
            Criterion::MSE | Criterion::MAE => Task::Regression,
        }
    }
}

impl FromStr for Criterion {
    type Err = EasyMlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gini" => Ok(Criterion::Gini),
            "entropy" | "log_loss" => Ok(Criterion::Entropy),
            "mse" | "squared_error" | "friedman_mse" => Ok(Criterion::MSE),
            "mae" | "absolute_error" => Ok(Criterion::MAE),
            other => Err(EasyMlError::invalid_parameter(
                "criterion",
                other,
                "unknown split criterion",
            )),
        }
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    /// Maximum depth; `None` grows until leaves are pure
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn at random for every split; `None` scans all of them
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    pub random_state: Option<u64>,
    n_features: usize,
    is_classification: bool,
    classes: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_regressor()
    }
}

/// Per-fit view of the training data shared by the recursive builder
struct Builder<'a> {
    tree: &'a DecisionTree,
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    /// Class index of every sample (classification only)
    encoded: Vec<usize>,
    n_classes: usize,
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            is_classification: true,
            classes: Vec::new(),
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier()
        }
    }

    /// Set maximum depth (`None` for unlimited)
    pub fn with_max_depth(mut self, depth: impl Into<Option<usize>>) -> Self {
        self.max_depth = depth.into();
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set criterion; it must suit the tree's task
    pub fn with_criterion(mut self, criterion: Criterion) -> Result<Self> {
        if criterion.task() != self.task() {
            return Err(EasyMlError::invalid_parameter(
                "criterion",
                format!("{:?}", criterion),
                format!("not applicable to {:?}", self.task()),
            ));
        }
        self.criterion = criterion;
        Ok(self)
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    /// Depth of the fitted tree; a lone leaf has depth 0
    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        self.root.as_ref().map_or(0, walk)
    }

    /// Number of leaves
    pub fn n_leaves(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => walk(left) + walk(right),
            }
        }
        self.root.as_ref().map_or(0, walk)
    }

    pub(crate) fn predict_row(&self, sample: ArrayView1<f64>) -> Result<f64> {
        let mut node = self.root.as_ref().ok_or(EasyMlError::ModelNotFitted)?;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return Ok(*value),
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if sample[*feature_idx] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

impl<'a> Builder<'a> {
    fn build(&self, indices: &[usize], depth: usize, rng: &mut ChaCha8Rng) -> TreeNode {
        let tree = self.tree;
        let n_samples = indices.len();

        let should_stop = n_samples < tree.min_samples_split
            || n_samples < 2 * tree.min_samples_leaf
            || tree.max_depth.map_or(false, |d| depth >= d)
            || self.is_pure(indices);

        if !should_stop {
            let features = self.candidate_features(rng);
            if let Some((feature_idx, threshold)) = self.find_best_split(indices, &features) {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| self.x[[i, feature_idx]] <= threshold);

                let left = Box::new(self.build(&left_idx, depth + 1, rng));
                let right = Box::new(self.build(&right_idx, depth + 1, rng));
                return TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    n_samples,
                };
            }
        }

        TreeNode::Leaf {
            value: self.leaf_value(indices),
            n_samples,
        }
    }

    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let n_features = self.x.ncols();
        match self.tree.max_features {
            Some(k) if k < n_features => {
                let mut features = sample(rng, n_features, k.max(1)).into_vec();
                features.sort_unstable();
                features
            }
            _ => (0..n_features).collect(),
        }
    }

    fn is_pure(&self, indices: &[usize]) -> bool {
        match indices.first() {
            None => true,
            Some(&first) => {
                if self.tree.is_classification {
                    indices.iter().all(|&i| self.encoded[i] == self.encoded[first])
                } else {
                    indices.iter().all(|&i| self.y[i] == self.y[first])
                }
            }
        }
    }

    fn leaf_value(&self, indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        if self.tree.is_classification {
            let mut counts = vec![0usize; self.n_classes];
            for &i in indices {
                counts[self.encoded[i]] += 1;
            }
            // First (lowest) class wins ties
            let mut best = 0;
            for (c, &count) in counts.iter().enumerate() {
                if count > counts[best] {
                    best = c;
                }
            }
            self.tree.classes[best]
        } else if self.tree.criterion == Criterion::MAE {
            let mut values: Vec<f64> = indices.iter().map(|&i| self.y[i]).collect();
            median(&mut values)
        } else {
            indices.iter().map(|&i| self.y[i]).sum::<f64>() / indices.len() as f64
        }
    }

    fn class_impurity(&self, counts: &[usize], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        match self.tree.criterion {
            Criterion::Entropy => -counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
            _ => 1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>(),
        }
    }

    /// Best `(feature, threshold)` by impurity decrease; earlier features and
    /// lower thresholds win ties
    fn find_best_split(&self, indices: &[usize], features: &[usize]) -> Option<(usize, f64)> {
        let per_feature: Vec<Option<(f64, usize, f64)>> = features
            .par_iter()
            .map(|&feature_idx| self.best_split_for_feature(indices, feature_idx))
            .collect();

        let mut best: Option<(f64, usize, f64)> = None;
        for candidate in per_feature.into_iter().flatten() {
            if best.map_or(true, |b| candidate.0 > b.0) {
                best = Some(candidate);
            }
        }
        best.map(|(_, feature_idx, threshold)| (feature_idx, threshold))
    }

    /// Sorted sweep over one feature, returning `(gain, feature, threshold)`
    fn best_split_for_feature(&self, indices: &[usize], feature_idx: usize) -> Option<(f64, usize, f64)> {
        let min_leaf = self.tree.min_samples_leaf.max(1);
        let n = indices.len();
        let mut order: Vec<usize> = indices.to_vec();
        order.sort_by(|&a, &b| self.x[[a, feature_idx]].total_cmp(&self.x[[b, feature_idx]]));

        let parent = self.node_impurity(&order);
        let mut best: Option<(f64, f64)> = None;

        // Running statistics of the left part
        let mut left_counts = vec![0usize; self.n_classes];
        let mut right_counts = vec![0usize; self.n_classes];
        let (mut left_sum, mut left_sq) = (0.0, 0.0);
        let (mut total_sum, mut total_sq) = (0.0, 0.0);
        for &i in &order {
            if self.tree.is_classification {
                right_counts[self.encoded[i]] += 1;
            } else {
                total_sum += self.y[i];
                total_sq += self.y[i] * self.y[i];
            }
        }

        for pos in 0..n - 1 {
            let i = order[pos];
            if self.tree.is_classification {
                left_counts[self.encoded[i]] += 1;
                right_counts[self.encoded[i]] -= 1;
            } else {
                left_sum += self.y[i];
                left_sq += self.y[i] * self.y[i];
            }

            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }

            let lo = self.x[[i, feature_idx]];
            let hi = self.x[[order[pos + 1], feature_idx]];
            if lo >= hi {
                continue;
            }

            let (left_imp, right_imp) = if self.tree.is_classification {
                (
                    self.class_impurity(&left_counts, n_left),
                    self.class_impurity(&right_counts, n_right),
                )
            } else if self.tree.criterion == Criterion::MAE {
                (
                    self.node_impurity(&order[..n_left]),
                    self.node_impurity(&order[n_left..]),
                )
            } else {
                (
                    variance(n_left, left_sum, left_sq),
                    variance(n_right, total_sum - left_sum, total_sq - left_sq),
                )
            };

            let weighted = (n_left as f64 * left_imp + n_right as f64 * right_imp) / n as f64;
            let gain = parent - weighted;
            if best.map_or(true, |(g, _)| gain > g) {
                let mut threshold = (lo + hi) / 2.0;
                if threshold >= hi || !threshold.is_finite() {
                    threshold = lo;
                }
                best = Some((gain, threshold));
            }
        }

        best.map(|(gain, threshold)| (gain, feature_idx, threshold))
    }

    fn node_impurity(&self, indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        if self.tree.is_classification {
            let mut counts = vec![0usize; self.n_classes];
            for &i in indices {
                counts[self.encoded[i]] += 1;
            }
            return self.class_impurity(&counts, indices.len());
        }

        let mut values: Vec<f64> = indices.iter().map(|&i| self.y[i]).collect();
        match self.tree.criterion {
            Criterion::MAE => {
                let m = median(&mut values);
                values.iter().map(|v| (v - m).abs()).sum::<f64>() / values.len() as f64
            }
            _ => {
                let sum: f64 = values.iter().sum();
                let sq: f64 = values.iter().map(|v| v * v).sum();
                variance(values.len(), sum, sq)
            }
        }
    }
}

fn variance(count: usize, sum: f64, sq_sum: f64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let n = count as f64;
    (sq_sum / n - (sum / n).powi(2)).max(0.0)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let len = values.len();
    if len == 0 {
        0.0
    } else if len % 2 == 0 {
        (values[len / 2 - 1] + values[len / 2]) / 2.0
    } else {
        values[len / 2]
    }
}

impl Model for DecisionTree {
    fn task(&self) -> Task {
        if self.is_classification {
            Task::Classification
        } else {
            Task::Regression
        }
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        if let Some(0) = self.max_depth {
            return Err(EasyMlError::invalid_parameter(
                "max_depth",
                0,
                "must be at least 1",
            ));
        }

        self.n_features = x.ncols();
        let (encoded, n_classes) = if self.is_classification {
            self.classes = sorted_classes(y);
            let encoded = y
                .iter()
                .map(|&label| class_index(&self.classes, label).unwrap_or(0))
                .collect();
            (encoded, self.classes.len())
        } else {
            (Vec::new(), 0)
        };

        let mut rng = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let builder = Builder {
            tree: self,
            x,
            y,
            encoded,
            n_classes,
        };
        let indices: Vec<usize> = (0..x.nrows()).collect();
        let root = builder.build(&indices, 0, &mut rng);
        self.root = Some(root);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.root.is_none() {
            return Err(EasyMlError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }
}
