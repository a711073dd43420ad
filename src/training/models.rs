//! Estimator trait and the serializable fitted-model capability

use crate::error::{EasyMlError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::decision_tree::DecisionTree;
use super::knn::{KNNClassifier, KNNRegressor};
use super::lda::LinearDiscriminantAnalysis;
use super::linear_models::{LinearRegression, LogisticRegression};
use super::metrics::{match_fraction, r2_score};
use super::naive_bayes::GaussianNaiveBayes;
use super::nearest_centroid::NearestCentroid;
use super::random_forest::RandomForest;
use super::svm::{SVMClassifier, SVMRegressor};

/// Kind of supervised problem an estimator solves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Task {
    Classification,
    Regression,
}

/// Trait for ML models
pub trait Model: Send + Sync {
    /// Problem kind, which decides how `score` is computed
    fn task(&self) -> Task;

    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Make predictions
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Mean accuracy (classification, 0..=1) or R² (regression)
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let predicted = self.predict(x)?;
        match self.task() {
            Task::Classification => match_fraction(&predicted, y),
            Task::Regression => r2_score(&predicted, y),
        }
    }
}

/// Reject empty inputs and row-count mismatches before fitting
pub(crate) fn check_xy(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(EasyMlError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(EasyMlError::InsufficientData(format!(
            "cannot fit on a {}x{} table",
            x.nrows(),
            x.ncols()
        )));
    }
    Ok(())
}

/// Reject prediction inputs whose width differs from the training data
pub(crate) fn check_n_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(EasyMlError::ShapeError {
            expected: format!("{} features", expected),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Sorted distinct class labels
pub(crate) fn sorted_classes(y: &Array1<f64>) -> Vec<f64> {
    let mut classes: Vec<f64> = y.iter().copied().collect();
    classes.sort_by(f64::total_cmp);
    classes.dedup();
    classes
}

/// Position of `label` in a list produced by [`sorted_classes`]
pub(crate) fn class_index(classes: &[f64], label: f64) -> Option<usize> {
    classes.binary_search_by(|c| c.total_cmp(&label)).ok()
}

/// Index of the largest score; the lowest index wins ties
pub(crate) fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, score) in scores.iter().enumerate().skip(1) {
        if score.partial_cmp(&scores[best]) == Some(Ordering::Greater) {
            best = i;
        }
    }
    best
}

/// A fitted estimator of any supported algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model")]
pub enum TrainedModel {
    LinearRegression(LinearRegression),
    LogisticRegression(LogisticRegression),
    LinearDiscriminantAnalysis(LinearDiscriminantAnalysis),
    DecisionTreeRegressor(DecisionTree),
    GaussianNaiveBayes(GaussianNaiveBayes),
    RandomForestClassifier(RandomForest),
    RandomForestRegressor(RandomForest),
    KNNClassifier(KNNClassifier),
    KNNRegressor(KNNRegressor),
    NearestCentroid(NearestCentroid),
    SVMClassifier(SVMClassifier),
    SVMRegressor(SVMRegressor),
}

impl TrainedModel {
    fn inner(&self) -> &dyn Model {
        match self {
            TrainedModel::LinearRegression(m) => m,
            TrainedModel::LogisticRegression(m) => m,
            TrainedModel::LinearDiscriminantAnalysis(m) => m,
            TrainedModel::DecisionTreeRegressor(m) => m,
            TrainedModel::GaussianNaiveBayes(m) => m,
            TrainedModel::RandomForestClassifier(m) => m,
            TrainedModel::RandomForestRegressor(m) => m,
            TrainedModel::KNNClassifier(m) => m,
            TrainedModel::KNNRegressor(m) => m,
            TrainedModel::NearestCentroid(m) => m,
            TrainedModel::SVMClassifier(m) => m,
            TrainedModel::SVMRegressor(m) => m,
        }
    }

    /// Problem kind of the wrapped estimator
    pub fn task(&self) -> Task {
        self.inner().task()
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict(x)
    }

    /// Native score of the wrapped estimator
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        self.inner().score(x, y)
    }

    /// Serialize to an opaque payload
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Restore from a payload produced by [`TrainedModel::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

macro_rules! impl_from_model {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for TrainedModel {
                fn from(model: $ty) -> Self {
                    TrainedModel::$variant(model)
                }
            }
        )*
    };
}

impl_from_model! {
    LinearRegression => LinearRegression,
    LogisticRegression => LogisticRegression,
    LinearDiscriminantAnalysis => LinearDiscriminantAnalysis,
    GaussianNaiveBayes => GaussianNaiveBayes,
    KNNClassifier => KNNClassifier,
    KNNRegressor => KNNRegressor,
    NearestCentroid => NearestCentroid,
    SVMClassifier => SVMClassifier,
    SVMRegressor => SVMRegressor,
}

impl From<DecisionTree> for TrainedModel {
    fn from(model: DecisionTree) -> Self {
        TrainedModel::DecisionTreeRegressor(model)
    }
}

impl From<RandomForest> for TrainedModel {
    fn from(model: RandomForest) -> Self {
        match model.task() {
            Task::Classification => TrainedModel::RandomForestClassifier(model),
            Task::Regression => TrainedModel::RandomForestRegressor(model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_sorted_classes_and_index() {
        let y = array![2.0, 0.0, 1.0, 2.0, 0.0];
        let classes = sorted_classes(&y);
        assert_eq!(classes, vec![0.0, 1.0, 2.0]);
        assert_eq!(class_index(&classes, 2.0), Some(2));
        assert_eq!(class_index(&classes, 5.0), None);
    }

    #[test]
    fn test_argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[0.2, 0.7, 0.7]), 1);
        assert_eq!(argmax(&[1.0]), 0);
    }

    #[test]
    fn test_check_xy_rejects_mismatch() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0];
        assert!(check_xy(&x, &y).is_err());
    }

    #[test]
    fn test_trained_model_bytes_roundtrip_predicts_identically() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let mut lr = LinearRegression::new();
        lr.fit(&x, &y).unwrap();

        let model = TrainedModel::from(lr);
        let restored = TrainedModel::from_bytes(&model.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.task(), Task::Regression);
        assert_eq!(model.predict(&x).unwrap(), restored.predict(&x).unwrap());
    }
}
