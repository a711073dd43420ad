//! Stratified cross-validation and fold scoring

use crate::error::{EasyMlError, Result};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::models::{class_index, sorted_classes, Model};

/// Default number of folds
pub const DEFAULT_N_SPLITS: usize = 5;

/// A single train/test split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Stratified k-fold splitter over the sample order.
///
/// Samples of each class are dealt round-robin, so every fold keeps the class
/// proportions of the target and the folds depend only on `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratifiedKFold {
    pub n_splits: usize,
}

impl Default for StratifiedKFold {
    fn default() -> Self {
        Self::new(DEFAULT_N_SPLITS)
    }
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    /// Generate train/test splits for `y`
    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<CVSplit>> {
        let n_splits = self.n_splits;
        if n_splits < 2 {
            return Err(EasyMlError::invalid_parameter(
                "n_splits",
                n_splits,
                "must be at least 2",
            ));
        }
        if y.len() < n_splits {
            return Err(EasyMlError::InsufficientData(format!(
                "{} samples cannot fill {} folds",
                y.len(),
                n_splits
            )));
        }

        let classes = sorted_classes(y);
        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (idx, &label) in y.iter().enumerate() {
            let c = class_index(&classes, label).unwrap_or(0);
            by_class.entry(c).or_default().push(idx);
        }

        // The count continues across classes so fold sizes differ by at most one
        let mut folds = vec![Vec::new(); n_splits];
        let mut dealt = 0;
        for members in by_class.values() {
            for &idx in members {
                folds[dealt % n_splits].push(idx);
                dealt += 1;
            }
        }
        for fold in &mut folds {
            fold.sort_unstable();
        }

        Ok(folds_to_splits(folds))
    }
}

fn folds_to_splits(folds: Vec<Vec<usize>>) -> Vec<CVSplit> {
    (0..folds.len())
        .map(|fold_idx| {
            let train_indices = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            CVSplit {
                train_indices,
                test_indices: folds[fold_idx].clone(),
                fold_idx,
            }
        })
        .collect()
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold, in fold order
    pub scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let mean_score = scores.iter().sum::<f64>() / n_folds.max(1) as f64;
        let variance =
            scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds.max(1) as f64;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

/// Fit a fresh model per split and collect its native score on the held-out fold
pub fn cross_val_score<M, F>(
    make_model: F,
    x: &Array2<f64>,
    y: &Array1<f64>,
    splits: &[CVSplit],
) -> Result<CVResults>
where
    M: Model,
    F: Fn() -> M + Sync,
{
    let scores = splits
        .par_iter()
        .map(|split| {
            let mut model = make_model();
            model.fit(
                &x.select(Axis(0), &split.train_indices),
                &y.select(Axis(0), &split.train_indices),
            )?;
            model.score(
                &x.select(Axis(0), &split.test_indices),
                &y.select(Axis(0), &split.test_indices),
            )
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(CVResults::from_scores(scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::nearest_centroid::NearestCentroid;

    #[test]
    fn test_folds_balance_classes() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let splits = StratifiedKFold::new(5).split(&y).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 2);
            assert_eq!(split.train_indices.len(), 8);
            let positives = split.test_indices.iter().filter(|&&i| y[i] == 1.0).count();
            assert_eq!(positives, 1, "fold {} is unbalanced", split.fold_idx);
        }

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_deterministic() {
        let y = Array1::from_vec(vec![2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
        let cv = StratifiedKFold::default();
        assert_eq!(cv.split(&y).unwrap(), cv.split(&y).unwrap());
    }

    #[test]
    fn test_invalid_fold_counts() {
        assert!(StratifiedKFold::default().split(&Array1::zeros(3)).is_err());
        assert!(StratifiedKFold::new(1).split(&Array1::zeros(10)).is_err());
    }

    #[test]
    fn test_cross_val_score_on_separable_data() {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| if i % 2 == 0 { i as f64 } else { 100.0 + i as f64 });
        let y = Array1::from_shape_fn(20, |i| (i % 2) as f64);
        let splits = StratifiedKFold::default().split(&y).unwrap();

        let results = cross_val_score(NearestCentroid::new, &x, &y, &splits).unwrap();
        assert_eq!(results.n_folds, 5);
        assert_eq!(results.mean_score, 1.0);
        assert_eq!(results.std_score, 0.0);
    }
}
