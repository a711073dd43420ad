//! Random Forest implementation

use crate::error::{EasyMlError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::decision_tree::{Criterion, DecisionTree};
use super::metrics::{match_fraction, r2_score};
use super::models::{check_n_features, check_xy, class_index, sorted_classes, Model, Task};

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features (classification)
    Sqrt,
    /// All features (regression)
    All,
}

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered at every split
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Compute the out-of-bag score while fitting
    pub oob_score: bool,
    pub criterion: Criterion,
    pub random_state: Option<u64>,
    is_classification: bool,
    oob_score_value: Option<f64>,
    n_features: usize,
    classes: Vec<f64>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new_classifier(100)
    }
}

impl RandomForest {
    /// Create a new classifier forest
    pub fn new_classifier(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            oob_score: false,
            criterion: Criterion::Gini,
            random_state: None,
            is_classification: true,
            oob_score_value: None,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    /// Create a new regressor forest
    pub fn new_regressor(n_estimators: usize) -> Self {
        Self {
            max_features: MaxFeatures::All,
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier(n_estimators)
        }
    }

    /// Set maximum depth (`None` for unlimited)
    pub fn with_max_depth(mut self, depth: impl Into<Option<usize>>) -> Self {
        self.max_depth = depth.into();
        self
    }

    /// Set criterion; it must suit the forest's task
    pub fn with_criterion(mut self, criterion: Criterion) -> Result<Self> {
        if criterion.task() != self.task() {
            return Err(EasyMlError::invalid_parameter(
                "rfc_criterion",
                format!("{:?}", criterion),
                format!("not applicable to {:?}", self.task()),
            ));
        }
        self.criterion = criterion;
        Ok(self)
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    /// Enable OOB score computation
    pub fn with_oob_score(mut self, oob_score: bool) -> Self {
        self.oob_score = oob_score;
        self
    }

    /// Out-of-bag accuracy (classification, 0..=1) or R² (regression)
    pub fn oob_score_value(&self) -> Option<f64> {
        self.oob_score_value
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn compute_max_features(&self, n_features: usize) -> usize {
        match self.max_features {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::All => n_features,
        }
        .max(1)
    }

    /// Majority vote (lowest class on ties) or mean of the given tree outputs
    fn aggregate(&self, outputs: impl Iterator<Item = f64>) -> Option<f64> {
        if self.is_classification {
            let mut votes = vec![0usize; self.classes.len()];
            let mut any = false;
            for label in outputs {
                if let Some(c) = class_index(&self.classes, label) {
                    votes[c] += 1;
                    any = true;
                }
            }
            if !any {
                return None;
            }
            let mut best = 0;
            for (c, &count) in votes.iter().enumerate() {
                if count > votes[best] {
                    best = c;
                }
            }
            Some(self.classes[best])
        } else {
            let (sum, count) = outputs.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            (count > 0).then(|| sum / count as f64)
        }
    }

    fn compute_oob_score(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        in_bag: &[Vec<bool>],
    ) -> Result<f64> {
        let rows: Vec<(f64, f64)> = (0..x.nrows())
            .into_par_iter()
            .map(|i| -> Result<Option<(f64, f64)>> {
                let sample = x.row(i);
                let mut outputs = Vec::new();
                for (tree, bag) in self.trees.iter().zip(in_bag) {
                    if !bag[i] {
                        outputs.push(tree.predict_row(sample)?);
                    }
                }
                Ok(self.aggregate(outputs.into_iter()).map(|p| (p, y[i])))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        if rows.is_empty() {
            return Err(EasyMlError::InsufficientData(
                "no sample was left out of every bootstrap; out-of-bag score is undefined"
                    .to_string(),
            ));
        }

        let predicted: Array1<f64> = rows.iter().map(|r| r.0).collect();
        let truth: Array1<f64> = rows.iter().map(|r| r.1).collect();
        if self.is_classification {
            match_fraction(&predicted, &truth)
        } else {
            r2_score(&predicted, &truth)
        }
    }
}

impl Model for RandomForest {
    fn task(&self) -> Task {
        if self.is_classification {
            Task::Classification
        } else {
            Task::Regression
        }
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        if self.n_estimators == 0 {
            return Err(EasyMlError::invalid_parameter(
                "rfc_n_estimators",
                0,
                "must be at least 1",
            ));
        }
        if self.oob_score && !self.bootstrap {
            return Err(EasyMlError::InvalidInput(
                "out-of-bag score requires bootstrap sampling".to_string(),
            ));
        }

        let n_samples = x.nrows();
        self.n_features = x.ncols();
        if self.is_classification {
            self.classes = sorted_classes(y);
        }
        let max_features = self.compute_max_features(self.n_features);

        // Tree seeds are drawn up front so results do not depend on scheduling
        let mut master = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let seeds: Vec<u64> = (0..self.n_estimators).map(|_| master.next_u64()).collect();

        let fitted: Vec<(DecisionTree, Vec<bool>)> = seeds
            .into_par_iter()
            .map(|seed| -> Result<(DecisionTree, Vec<bool>)> {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                let mut in_bag = vec![false; n_samples];
                for &i in &sample_indices {
                    in_bag[i] = true;
                }

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot = y.select(Axis(0), &sample_indices);

                let tree = if self.is_classification {
                    DecisionTree::new_classifier()
                } else {
                    DecisionTree::new_regressor()
                };
                let mut tree = tree
                    .with_criterion(self.criterion)?
                    .with_max_depth(self.max_depth)
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(Some(max_features))
                    .with_random_state(Some(rng.next_u64()));
                tree.fit(&x_boot, &y_boot)?;
                Ok((tree, in_bag))
            })
            .collect::<Result<Vec<_>>>()?;

        let (trees, in_bag): (Vec<DecisionTree>, Vec<Vec<bool>>) = fitted.into_iter().unzip();
        self.trees = trees;

        self.oob_score_value = if self.oob_score {
            Some(self.compute_oob_score(x, y, &in_bag)?)
        } else {
            None
        };
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(EasyMlError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;

        let all_predictions: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        (0..x.nrows())
            .map(|i| {
                self.aggregate(all_predictions.iter().map(|p| p[i]))
                    .ok_or_else(|| EasyMlError::ComputationError("no tree produced a prediction".to_string()))
            })
            .collect()
    }
}
