//! Estimators and evaluation helpers
//!
//! Every algorithm the selector can train lives here as a plain `Model`
//! implementation on `ndarray`:
//! - Linear and logistic regression, linear discriminant analysis
//! - Decision trees and random forests
//! - Gaussian naive Bayes, nearest centroid, k-nearest neighbors
//! - Kernel support vector machines
//!
//! plus the hold-out split, cross-validation, scaling and scoring they share.

mod linalg;
mod models;
pub mod cross_validation;
pub mod decision_tree;
pub mod knn;
pub mod lda;
pub mod linear_models;
pub mod metrics;
pub mod naive_bayes;
pub mod nearest_centroid;
pub mod random_forest;
pub mod scaler;
pub mod split;
pub mod svm;

pub use cross_validation::{cross_val_score, CVResults, CVSplit, StratifiedKFold};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use knn::{KNNClassifier, KNNConfig, KNNRegressor, SearchAlgorithm, WeightScheme};
pub use lda::{LdaSolver, LinearDiscriminantAnalysis};
pub use linear_models::{LinearRegression, LogisticRegression, Penalty};
pub use metrics::{match_accuracy, match_fraction, r2_score, round4};
pub use models::{Model, Task, TrainedModel};
pub use naive_bayes::GaussianNaiveBayes;
pub use nearest_centroid::NearestCentroid;
pub use random_forest::{MaxFeatures, RandomForest};
pub use scaler::StandardScaler;
pub use split::{HoldoutSplit, SplitData, DEFAULT_TEST_SIZE};
pub use svm::{KernelType, SVMClassifier, SVMConfig, SVMRegressor};
