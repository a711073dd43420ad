//! One trainer per algorithm
//!
//! A trainer reads its hyperparameters from the request's [`ParameterBag`],
//! scores a candidate fitted on the training part of a shuffled hold-out split,
//! then refits the same configuration on every row. The held-out score is the
//! accuracy reported for the model: match percentage for classifiers and R²
//! rounded to four digits for regressors.

use ndarray::{Array1, Array2};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::algorithm::Algorithm;
use super::params::ParameterBag;
use crate::config::EngineConfig;
use crate::error::{EasyMlError, Result};
use crate::training::{
    cross_val_score, match_accuracy, r2_score, round4, Criterion, DecisionTree,
    GaussianNaiveBayes, HoldoutSplit, KNNClassifier, KNNConfig, KNNRegressor, KernelType,
    LdaSolver, LinearDiscriminantAnalysis, LinearRegression, LogisticRegression, Model,
    NearestCentroid, Penalty, RandomForest, SVMClassifier, SVMConfig, SVMRegressor,
    SearchAlgorithm, SplitData, StratifiedKFold, Task, TrainedModel, WeightScheme,
};

/// Depths tried by a depth search, shallowest first
pub const DEPTH_LADDER: [usize; 5] = [1, 10, 100, 1_000, 10_000];

/// Inverse regularization strengths tried by the logistic regression grid
pub const LOGREG_C_GRID: [f64; 8] = [1e-4, 1e-3, 1e-2, 1e-1, 1.0, 10.0, 100.0, 1_000.0];

/// How an accuracy value was measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccuracyKind {
    /// Coefficient of determination on the held-out rows
    #[serde(rename = "R^2")]
    R2,
    /// Percentage of held-out rows labeled correctly
    #[serde(rename = "Accuracy [%]")]
    MatchPercent,
}

impl AccuracyKind {
    pub fn label(self) -> &'static str {
        match self {
            AccuracyKind::R2 => "R^2",
            AccuracyKind::MatchPercent => "Accuracy [%]",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "R^2" => Some(AccuracyKind::R2),
            "Accuracy [%]" => Some(AccuracyKind::MatchPercent),
            _ => None,
        }
    }

    fn for_task(task: Task) -> Self {
        match task {
            Task::Classification => AccuracyKind::MatchPercent,
            Task::Regression => AccuracyKind::R2,
        }
    }
}

impl fmt::Display for AccuracyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Held-out accuracy of a trained model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Accuracy {
    pub value: f64,
    pub kind: AccuracyKind,
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.kind)
    }
}

/// A model refit on all rows, with the score it earned on held-out rows
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub algorithm: Algorithm,
    pub model: TrainedModel,
    pub accuracy: Accuracy,
    /// The request's parameters plus any hyperparameters chosen by a search
    pub selected: ParameterBag,
}

impl TrainingOutcome {
    /// Parameters to persist: `selected` with `accuracy` and `accuracy_type` set
    pub fn parameters(&self) -> ParameterBag {
        self.selected
            .clone()
            .with("accuracy", self.accuracy.value)
            .with("accuracy_type", self.accuracy.kind.label())
    }
}

/// Randomness and evaluation settings for one candidate
pub struct TrainContext {
    pub test_size: f64,
    pub cv_folds: usize,
    rng: ChaCha8Rng,
}

impl TrainContext {
    pub fn new(config: &EngineConfig, seed: Option<u64>) -> Self {
        Self {
            test_size: config.test_size,
            cv_folds: config.cv_folds,
            rng: match seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            },
        }
    }

    fn holdout(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<SplitData> {
        let split = HoldoutSplit::shuffled(x.nrows(), self.test_size, &mut self.rng)?;
        Ok(split.apply(x, y))
    }

    /// Seed for an estimator with its own randomness
    fn estimator_seed(&mut self) -> u64 {
        self.rng.next_u64()
    }
}

/// Trains one algorithm from a parameter bag
pub trait Trainer: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    fn train(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &ParameterBag,
        ctx: &mut TrainContext,
    ) -> Result<TrainingOutcome>;
}

/// Trainer registered for `algorithm`
pub fn trainer_for(algorithm: Algorithm) -> &'static dyn Trainer {
    match algorithm {
        Algorithm::LinearRegression => &LinearRegressionTrainer,
        Algorithm::LogisticRegression => &LogisticRegressionTrainer,
        Algorithm::LinearDiscriminantAnalysis => &LdaTrainer,
        Algorithm::DecisionTreeRegressor => &DecisionTreeRegressorTrainer,
        Algorithm::GaussianNaiveBayes => &GaussianNaiveBayesTrainer,
        Algorithm::RandomForestClassifier => &RandomForestTrainer { task: Task::Classification },
        Algorithm::RandomForestRegressor => &RandomForestTrainer { task: Task::Regression },
        Algorithm::KNearestNeighborsClassifier => &KnnTrainer { task: Task::Classification },
        Algorithm::KNearestNeighborsRegressor => &KnnTrainer { task: Task::Regression },
        Algorithm::NearestCentroid => &NearestCentroidTrainer,
        Algorithm::SupportVectorMachineClassifier => &SvmTrainer { task: Task::Classification },
        Algorithm::SupportVectorMachineRegressor => &SvmTrainer { task: Task::Regression },
    }
}

/// Score `model` on the held-out rows
fn evaluate<M: Model>(model: &M, x_test: &Array2<f64>, y_test: &Array1<f64>) -> Result<Accuracy> {
    let predicted = model.predict(x_test)?;
    let kind = AccuracyKind::for_task(model.task());
    let value = match kind {
        AccuracyKind::MatchPercent => match_accuracy(&predicted, y_test)?,
        AccuracyKind::R2 => round4(r2_score(&predicted, y_test)?),
    };
    if !value.is_finite() {
        return Err(EasyMlError::TrainingError(format!(
            "{} on the held-out rows is not a finite number",
            kind.label()
        )));
    }
    Ok(Accuracy { value, kind })
}

/// Fit on the training part, score on the test part, then refit on everything
fn holdout_and_refit<M, F>(
    make_model: F,
    x: &Array2<f64>,
    y: &Array1<f64>,
    split: &SplitData,
) -> Result<(M, Accuracy)>
where
    M: Model,
    F: Fn() -> M,
{
    let mut holdout_model = make_model();
    holdout_model.fit(&split.x_train, &split.y_train)?;
    let accuracy = evaluate(&holdout_model, &split.x_test, &split.y_test)?;

    let mut model = make_model();
    model.fit(x, y)?;
    Ok((model, accuracy))
}

fn outcome<M: Into<TrainedModel>>(
    algorithm: Algorithm,
    model: M,
    accuracy: Accuracy,
    selected: ParameterBag,
) -> TrainingOutcome {
    debug!(algorithm = %algorithm, accuracy = accuracy.value, kind = %accuracy.kind, "Candidate trained");
    TrainingOutcome {
        algorithm,
        model: model.into(),
        accuracy,
        selected,
    }
}

/// Index of the first metric closest to 1.0; NaN never wins
pub fn closest_to_one(metrics: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &metric) in metrics.iter().enumerate() {
        let distance = (metric - 1.0).abs();
        if distance.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((i, distance));
        }
    }
    best.map(|(i, _)| i)
}

/// Depth choice shared by the tree-based trainers
enum DepthChoice {
    Unlimited,
    Fixed(Option<usize>),
    Search,
}

impl DepthChoice {
    fn read(params: &ParameterBag, mode_key: &str, depth_key: &str) -> Result<Self> {
        match params.str_or(mode_key, "none").to_ascii_lowercase().as_str() {
            "none" => Ok(DepthChoice::Unlimited),
            "custom" => Ok(DepthChoice::Fixed(params.opt_usize(depth_key)?)),
            "search" => Ok(DepthChoice::Search),
            other => Err(EasyMlError::invalid_parameter(
                mode_key,
                other,
                "expected 'none', 'custom' or 'search'",
            )),
        }
    }

    /// Resolve to a depth, running `score_depth` over the ladder when searching
    fn resolve<F>(self, mut score_depth: F) -> Result<(Option<usize>, bool)>
    where
        F: FnMut(usize) -> Result<f64>,
    {
        match self {
            DepthChoice::Unlimited => Ok((None, false)),
            DepthChoice::Fixed(depth) => Ok((depth, false)),
            DepthChoice::Search => {
                let metrics = DEPTH_LADDER
                    .iter()
                    .map(|&depth| score_depth(depth))
                    .collect::<Result<Vec<f64>>>()?;
                let best = closest_to_one(&metrics).ok_or_else(|| {
                    EasyMlError::TrainingError("depth search produced no usable score".to_string())
                })?;
                debug!(?metrics, depth = DEPTH_LADDER[best], "Depth search finished");
                Ok((Some(DEPTH_LADDER[best]), true))
            }
        }
    }
}

struct LinearRegressionTrainer;

impl Trainer for LinearRegressionTrainer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::LinearRegression
    }

    fn train(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &ParameterBag,
        ctx: &mut TrainContext,
    ) -> Result<TrainingOutcome> {
        let fit_intercept = params.bool_or("linreg_fit_intercept", false)?;
        let normalize = params.bool_or("linreg_normalize", false)?;

        let split = ctx.holdout(x, y)?;
        let (model, accuracy) = holdout_and_refit(
            || {
                LinearRegression::new()
                    .with_fit_intercept(fit_intercept)
                    .with_normalize(normalize)
            },
            x,
            y,
            &split,
        )?;
        Ok(outcome(self.algorithm(), model, accuracy, params.clone()))
    }
}

struct LogisticRegressionTrainer;

impl LogisticRegressionTrainer {
    /// Best C of the grid by mean cross-validated accuracy; the first wins ties
    fn search_c(
        penalty: Penalty,
        fit_intercept: bool,
        x: &Array2<f64>,
        y: &Array1<f64>,
        folds: usize,
    ) -> Result<f64> {
        let splits = StratifiedKFold::new(folds).split(y)?;

        let mut best: Option<(f64, f64)> = None;
        for &c in LOGREG_C_GRID.iter() {
            let results = cross_val_score(
                || {
                    LogisticRegression::new()
                        .with_penalty(penalty)
                        .with_c(c)
                        .with_fit_intercept(fit_intercept)
                        .with_standardize(true)
                },
                x,
                y,
                &splits,
            )?;
            debug!(c, mean = results.mean_score, "Logistic regression grid point");
            if best.map_or(true, |(_, score)| results.mean_score > score) {
                best = Some((c, results.mean_score));
            }
        }
        best.map(|(c, _)| c)
            .ok_or_else(|| EasyMlError::TrainingError("empty C grid".to_string()))
    }
}

impl Trainer for LogisticRegressionTrainer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::LogisticRegression
    }

    fn train(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &ParameterBag,
        ctx: &mut TrainContext,
    ) -> Result<TrainingOutcome> {
        let penalty: Penalty = params.parse_or("logreg_penalty", Penalty::L2)?;
        let fit_intercept = params.bool_or("logreg_fit_intercept", false)?;
        let grid = match params.str_or("logreg_C_select", "custom").to_ascii_lowercase().as_str() {
            "custom" => false,
            "grid" => true,
            other => {
                return Err(EasyMlError::invalid_parameter(
                    "logreg_C_select",
                    other,
                    "expected 'custom' or 'grid'",
                ))
            }
        };

        let split = ctx.holdout(x, y)?;
        let mut selected = params.clone();
        let c = if grid {
            let c = Self::search_c(penalty, fit_intercept, &split.x_train, &split.y_train, ctx.cv_folds)?;
            selected.insert("logreg_best_C", c);
            c
        } else {
            params.f64_or("logreg_C", 1.0)?
        };

        let (model, accuracy) = holdout_and_refit(
            || {
                LogisticRegression::new()
                    .with_penalty(penalty)
                    .with_c(c)
                    .with_fit_intercept(fit_intercept)
                    .with_standardize(grid)
            },
            x,
            y,
            &split,
        )?;
        Ok(outcome(self.algorithm(), model, accuracy, selected))
    }
}

struct LdaTrainer;

impl Trainer for LdaTrainer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::LinearDiscriminantAnalysis
    }

    fn train(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &ParameterBag,
        ctx: &mut TrainContext,
    ) -> Result<TrainingOutcome> {
        let solver: LdaSolver = params.parse_or("lda_solver", LdaSolver::Svd)?;

        let split = ctx.holdout(x, y)?;
        let (model, accuracy) = holdout_and_refit(
            || LinearDiscriminantAnalysis::new().with_solver(solver),
            x,
            y,
            &split,
        )?;
        Ok(outcome(self.algorithm(), model, accuracy, params.clone()))
    }
}

struct DecisionTreeRegressorTrainer;

impl Trainer for DecisionTreeRegressorTrainer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::DecisionTreeRegressor
    }

    fn train(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &ParameterBag,
        ctx: &mut TrainContext,
    ) -> Result<TrainingOutcome> {
        let criterion: Criterion = params.parse_or("dtr_criterion", Criterion::MSE)?;
        // Accepted for compatibility; the split search always sorts per feature
        params.bool_or("dtr_presort", false)?;
        let choice = DepthChoice::read(params, "dtr_max_depth", "dtr_custom_depth")?;
        let template = DecisionTree::new_regressor().with_criterion(criterion)?;

        let split = ctx.holdout(x, y)?;
        let (depth, searched) = choice.resolve(|depth| {
            let mut tree = template.clone().with_max_depth(depth);
            tree.fit(&split.x_train, &split.y_train)?;
            tree.score(&split.x_test, &split.y_test)
        })?;

        let mut selected = params.clone();
        if let (true, Some(depth)) = (searched, depth) {
            selected.insert("dtr_best_depth", depth);
        }

        let (model, accuracy) =
            holdout_and_refit(|| template.clone().with_max_depth(depth), x, y, &split)?;
        Ok(outcome(self.algorithm(), model, accuracy, selected))
    }
}

struct GaussianNaiveBayesTrainer;

impl Trainer for GaussianNaiveBayesTrainer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::GaussianNaiveBayes
    }

    fn train(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &ParameterBag,
        ctx: &mut TrainContext,
    ) -> Result<TrainingOutcome> {
        let split = ctx.holdout(x, y)?;
        let (model, accuracy) = holdout_and_refit(GaussianNaiveBayes::new, x, y, &split)?;
        Ok(outcome(self.algorithm(), model, accuracy, params.clone()))
    }
}

/// Random forest classifier or regressor; both read the `rfc_*` keys
struct RandomForestTrainer {
    task: Task,
}

impl Trainer for RandomForestTrainer {
    fn algorithm(&self) -> Algorithm {
        match self.task {
            Task::Classification => Algorithm::RandomForestClassifier,
            Task::Regression => Algorithm::RandomForestRegressor,
        }
    }

    fn train(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &ParameterBag,
        ctx: &mut TrainContext,
    ) -> Result<TrainingOutcome> {
        let n_estimators = params.usize_or("rfc_n_estimators", 100)?;
        let (template, default_criterion) = match self.task {
            Task::Classification => (RandomForest::new_classifier(n_estimators), Criterion::Gini),
            Task::Regression => (RandomForest::new_regressor(n_estimators), Criterion::MSE),
        };
        let criterion: Criterion = params.parse_or("rfc_criterion", default_criterion)?;
        let choice = DepthChoice::read(params, "rfc_max_depth", "rfc_custom_depth")?;
        let template = template
            .with_criterion(criterion)?
            .with_random_state(Some(ctx.estimator_seed()));

        let split = ctx.holdout(x, y)?;
        let (depth, searched) = choice.resolve(|depth| {
            let mut forest = template.clone().with_max_depth(depth).with_oob_score(true);
            forest.fit(&split.x_train, &split.y_train)?;
            forest.oob_score_value().ok_or_else(|| {
                EasyMlError::TrainingError("forest produced no out-of-bag score".to_string())
            })
        })?;

        let mut selected = params.clone();
        if let (true, Some(depth)) = (searched, depth) {
            selected.insert("rfc_best_depth", depth);
        }

        let (model, accuracy) =
            holdout_and_refit(|| template.clone().with_max_depth(depth), x, y, &split)?;
        Ok(outcome(self.algorithm(), model, accuracy, selected))
    }
}

/// k-nearest neighbors; classifier and regressor share the `nnc_*` keys
struct KnnTrainer {
    task: Task,
}

impl Trainer for KnnTrainer {
    fn algorithm(&self) -> Algorithm {
        match self.task {
            Task::Classification => Algorithm::KNearestNeighborsClassifier,
            Task::Regression => Algorithm::KNearestNeighborsRegressor,
        }
    }

    fn train(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &ParameterBag,
        ctx: &mut TrainContext,
    ) -> Result<TrainingOutcome> {
        let config = KNNConfig {
            n_neighbors: params.usize_or("nnc_k", 5)?,
            p: params.f64_or("nnc_p", 2.0)?,
            weights: params.parse_or("weights", WeightScheme::Uniform)?,
            algorithm: params.parse_or("algorithm", SearchAlgorithm::Auto)?,
        };

        let split = ctx.holdout(x, y)?;
        let (model, accuracy): (TrainedModel, Accuracy) = match self.task {
            Task::Classification => {
                let (m, a) = holdout_and_refit(|| KNNClassifier::new(config.clone()), x, y, &split)?;
                (m.into(), a)
            }
            Task::Regression => {
                let (m, a) = holdout_and_refit(|| KNNRegressor::new(config.clone()), x, y, &split)?;
                (m.into(), a)
            }
        };
        Ok(outcome(self.algorithm(), model, accuracy, params.clone()))
    }
}

struct NearestCentroidTrainer;

impl Trainer for NearestCentroidTrainer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::NearestCentroid
    }

    fn train(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &ParameterBag,
        ctx: &mut TrainContext,
    ) -> Result<TrainingOutcome> {
        let split = ctx.holdout(x, y)?;
        let (model, accuracy) = holdout_and_refit(NearestCentroid::new, x, y, &split)?;
        Ok(outcome(self.algorithm(), model, accuracy, params.clone()))
    }
}

/// Kernel SVM; the classifier reads `svc_*` keys, the regressor `svr_*`
struct SvmTrainer {
    task: Task,
}

impl SvmTrainer {
    fn config(&self, params: &ParameterBag) -> Result<SVMConfig> {
        let prefix = match self.task {
            Task::Classification => "svc",
            Task::Regression => "svr",
        };
        let kernel_key = format!("{}_kernel", prefix);
        let degree_key = format!("{}_degree", prefix);

        let kernel: KernelType = params
            .parse_or(&kernel_key, KernelType::RBF)
            .map_err(|_| {
                EasyMlError::invalid_parameter(
                    &kernel_key,
                    params.str_or(&kernel_key, ""),
                    "expected 'linear', 'poly', 'rbf' or 'sigmoid'",
                )
            })?;
        let degree = params.usize_or(&degree_key, 3)?;
        let degree = u32::try_from(degree)
            .map_err(|_| EasyMlError::invalid_parameter(&degree_key, degree, "too large"))?;
        let c = match self.task {
            Task::Classification => params.f64_or("svc_C", 1.0)?,
            Task::Regression => 1.0,
        };

        Ok(SVMConfig {
            c,
            kernel,
            degree,
            ..SVMConfig::default()
        })
    }
}

impl Trainer for SvmTrainer {
    fn algorithm(&self) -> Algorithm {
        match self.task {
            Task::Classification => Algorithm::SupportVectorMachineClassifier,
            Task::Regression => Algorithm::SupportVectorMachineRegressor,
        }
    }

    fn train(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &ParameterBag,
        ctx: &mut TrainContext,
    ) -> Result<TrainingOutcome> {
        let config = self.config(params)?;

        let split = ctx.holdout(x, y)?;
        let (model, accuracy): (TrainedModel, Accuracy) = match self.task {
            Task::Classification => {
                let (m, a) = holdout_and_refit(|| SVMClassifier::new(config.clone()), x, y, &split)?;
                (m.into(), a)
            }
            Task::Regression => {
                let (m, a) = holdout_and_refit(|| SVMRegressor::new(config.clone()), x, y, &split)?;
                (m.into(), a)
            }
        };
        Ok(outcome(self.algorithm(), model, accuracy, params.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::algorithm::{CLASSIFICATION, REGRESSION};
    use ndarray::Array;
    use rand::Rng;
    use serde_json::Value;

    fn context(seed: u64) -> TrainContext {
        TrainContext::new(&EngineConfig::default(), Some(seed))
    }

    /// 60 rows, two well separated classes
    fn blobs() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| {
            let base = if i % 2 == 0 { 0.0 } else { 10.0 };
            base + ((i * 7 + j * 3) % 10) as f64 * 0.1
        });
        let y = Array::from_shape_fn(60, |i| (i % 2) as f64);
        (x, y)
    }

    /// y = 3 x0 - 2 x1 + 5 on 80 rows
    fn linear() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((80, 2), |(i, j)| {
            if j == 0 {
                i as f64 * 0.5
            } else {
                ((i * 13) % 17) as f64
            }
        });
        let y = x.rows().into_iter().map(|r| 3.0 * r[0] - 2.0 * r[1] + 5.0).collect();
        (x, y)
    }

    #[test]
    fn test_registry_covers_every_algorithm() {
        for alg in Algorithm::ALL {
            assert_eq!(trainer_for(alg).algorithm(), alg);
        }
    }

    #[test]
    fn test_closest_to_one() {
        assert_eq!(closest_to_one(&[0.5, 0.9, 1.1, 0.9]), Some(1));
        assert_eq!(closest_to_one(&[f64::NAN, 0.2]), Some(1));
        assert_eq!(closest_to_one(&[]), None);
    }

    #[test]
    fn test_every_classifier_reports_a_percentage() {
        let (x, y) = blobs();
        for &alg in CLASSIFICATION {
            let result = trainer_for(alg)
                .train(&x, &y, &ParameterBag::new(), &mut context(3))
                .unwrap();
            assert_eq!(result.accuracy.kind, AccuracyKind::MatchPercent);
            assert!(
                (0.0..=100.0).contains(&result.accuracy.value),
                "{} accuracy {}",
                alg,
                result.accuracy.value
            );
        }
    }

    #[test]
    fn test_every_regressor_reports_rounded_r2() {
        let (x, y) = linear();
        for &alg in REGRESSION {
            let result = trainer_for(alg)
                .train(&x, &y, &ParameterBag::new(), &mut context(5))
                .unwrap();
            assert_eq!(result.accuracy.kind, AccuracyKind::R2);
            assert_eq!(result.accuracy.value, round4(result.accuracy.value));
        }
    }

    #[test]
    fn test_classifier_accuracy_is_holdout_match_rate() {
        let (x, y) = blobs();
        let result = trainer_for(Algorithm::NearestCentroid)
            .train(&x, &y, &ParameterBag::new(), &mut context(11))
            .unwrap();
        assert_eq!(result.accuracy.value, 100.0);

        let params = result.parameters();
        assert_eq!(params.get("accuracy"), Some(&Value::from(100.0)));
        assert_eq!(params.get("accuracy_type"), Some(&Value::from("Accuracy [%]")));
    }

    #[test]
    fn test_linear_regression_with_intercept() {
        let (x, y) = linear();
        let params = ParameterBag::new().with("linreg_fit_intercept", true);
        let result = trainer_for(Algorithm::LinearRegression)
            .train(&x, &y, &params, &mut context(1))
            .unwrap();
        assert_eq!(result.accuracy.kind.label(), "R^2");
        assert!(result.accuracy.value > 0.95, "R² = {}", result.accuracy.value);
    }

    #[test]
    fn test_depth_search_is_reproducible() {
        let (x, y) = linear();
        let params = ParameterBag::new().with("dtr_max_depth", "search");

        let first = trainer_for(Algorithm::DecisionTreeRegressor)
            .train(&x, &y, &params, &mut context(21))
            .unwrap();
        let second = trainer_for(Algorithm::DecisionTreeRegressor)
            .train(&x, &y, &params, &mut context(21))
            .unwrap();

        let depth = first.selected.get("dtr_best_depth").cloned();
        assert!(depth.is_some());
        assert_eq!(depth, second.selected.get("dtr_best_depth").cloned());
        assert!(DEPTH_LADDER
            .iter()
            .any(|&d| Some(Value::from(d)) == depth));
        assert_eq!(first.accuracy, second.accuracy);
    }

    #[test]
    fn test_forest_depth_search_records_depth() {
        let (x, y) = blobs();
        let params = ParameterBag::new()
            .with("rfc_max_depth", "search")
            .with("rfc_n_estimators", 10);
        let result = trainer_for(Algorithm::RandomForestClassifier)
            .train(&x, &y, &params, &mut context(8))
            .unwrap();
        assert!(result.selected.contains_key("rfc_best_depth"));
        assert!(!params.contains_key("rfc_best_depth"), "input bag must stay untouched");
    }

    #[test]
    fn test_logistic_grid_records_c() {
        let (x, y) = blobs();
        let params = ParameterBag::new().with("logreg_C_select", "grid");
        let result = trainer_for(Algorithm::LogisticRegression)
            .train(&x, &y, &params, &mut context(2))
            .unwrap();

        let c = result.selected.get("logreg_best_C").and_then(Value::as_f64).unwrap();
        assert!(LOGREG_C_GRID.contains(&c));
        assert!(result.accuracy.value > 90.0);
    }

    #[test]
    fn test_invalid_parameters() {
        let (x, y) = blobs();
        let cases = [
            (Algorithm::KNearestNeighborsClassifier, ParameterBag::new().with("nnc_k", "many")),
            (Algorithm::KNearestNeighborsClassifier, ParameterBag::new().with("weights", "gaussian")),
            (Algorithm::LinearDiscriminantAnalysis, ParameterBag::new().with("lda_solver", "qr")),
            (Algorithm::RandomForestClassifier, ParameterBag::new().with("rfc_max_depth", "deep")),
            (Algorithm::SupportVectorMachineClassifier, ParameterBag::new().with("svc_kernel", "cosine")),
            (Algorithm::LogisticRegression, ParameterBag::new().with("logreg_penalty", "l3")),
        ];
        for (alg, params) in cases {
            let result = trainer_for(alg).train(&x, &y, &params, &mut context(4));
            assert!(
                matches!(result, Err(EasyMlError::InvalidParameter { .. })),
                "{} accepted {:?}",
                alg,
                params
            );
        }
    }

    /// 80 rows of overlapping classes, so hold-out scores fall short of 100
    fn noisy_classes() -> (Array2<f64>, Array1<f64>) {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let x = Array2::from_shape_fn((80, 2), |_| rng.gen::<f64>());
        let y = x
            .rows()
            .into_iter()
            .map(|r| if r[0] + r[1] + rng.gen::<f64>() * 0.6 > 1.3 { 1.0 } else { 0.0 })
            .collect();
        (x, y)
    }

    /// y = 2 x0 - x1 plus uniform noise on 80 rows
    fn noisy_linear() -> (Array2<f64>, Array1<f64>) {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let x = Array2::from_shape_fn((80, 2), |_| rng.gen::<f64>() * 10.0);
        let y = x
            .rows()
            .into_iter()
            .map(|r| 2.0 * r[0] - r[1] + rng.gen::<f64>() * 4.0)
            .collect();
        (x, y)
    }

    /// Split a trainer that draws nothing before its hold-out would use
    fn replay_split(x: &Array2<f64>, y: &Array1<f64>, seed: u64) -> SplitData {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        HoldoutSplit::shuffled(x.nrows(), EngineConfig::default().test_size, &mut rng)
            .unwrap()
            .apply(x, y)
    }

    /// First depth with the smallest `|metric - 1|`, NaN skipped
    fn first_closest_depth(metrics: &[f64]) -> usize {
        let mut best = (usize::MAX, f64::INFINITY);
        for (i, metric) in metrics.iter().enumerate() {
            let distance = (metric - 1.0).abs();
            if distance < best.1 {
                best = (i, distance);
            }
        }
        DEPTH_LADDER[best.0]
    }

    #[test]
    fn test_classifier_accuracy_matches_replayed_holdout() {
        let (x, y) = noisy_classes();
        let seed = 31;
        let split = replay_split(&x, &y, seed);

        let fitted: Vec<(Algorithm, TrainedModel)> = vec![
            (Algorithm::NearestCentroid, {
                let mut m = NearestCentroid::new();
                m.fit(&split.x_train, &split.y_train).unwrap();
                m.into()
            }),
            (Algorithm::GaussianNaiveBayes, {
                let mut m = GaussianNaiveBayes::new();
                m.fit(&split.x_train, &split.y_train).unwrap();
                m.into()
            }),
            (Algorithm::KNearestNeighborsClassifier, {
                let mut m = KNNClassifier::new(KNNConfig::default());
                m.fit(&split.x_train, &split.y_train).unwrap();
                m.into()
            }),
            (Algorithm::SupportVectorMachineClassifier, {
                let mut m = SVMClassifier::new(SVMConfig::default());
                m.fit(&split.x_train, &split.y_train).unwrap();
                m.into()
            }),
            (Algorithm::LogisticRegression, {
                let mut m = LogisticRegression::new();
                m.fit(&split.x_train, &split.y_train).unwrap();
                m.into()
            }),
        ];

        for (alg, model) in fitted {
            let expected = match_accuracy(&model.predict(&split.x_test).unwrap(), &split.y_test).unwrap();
            let result = trainer_for(alg)
                .train(&x, &y, &ParameterBag::new(), &mut context(seed))
                .unwrap();
            assert_eq!(result.accuracy.value, expected, "{}", alg);
        }
    }

    #[test]
    fn test_regressor_accuracy_matches_replayed_holdout() {
        let (x, y) = noisy_linear();
        let seed = 12;
        let split = replay_split(&x, &y, seed);

        let fitted: Vec<(Algorithm, TrainedModel)> = vec![
            (Algorithm::LinearRegression, {
                let mut m = LinearRegression::new();
                m.fit(&split.x_train, &split.y_train).unwrap();
                m.into()
            }),
            (Algorithm::KNearestNeighborsRegressor, {
                let mut m = KNNRegressor::new(KNNConfig::default());
                m.fit(&split.x_train, &split.y_train).unwrap();
                m.into()
            }),
            (Algorithm::SupportVectorMachineRegressor, {
                let mut m = SVMRegressor::new(SVMConfig::default());
                m.fit(&split.x_train, &split.y_train).unwrap();
                m.into()
            }),
        ];

        for (alg, model) in fitted {
            let expected = round4(r2_score(&model.predict(&split.x_test).unwrap(), &split.y_test).unwrap());
            let result = trainer_for(alg)
                .train(&x, &y, &ParameterBag::new(), &mut context(seed))
                .unwrap();
            assert_eq!(result.accuracy.value, expected, "{}", alg);
        }
    }

    #[test]
    fn test_tree_depth_search_picks_first_closest_holdout_r2() {
        let (x, y) = noisy_linear();
        let seed = 40;
        let split = replay_split(&x, &y, seed);

        let scores: Vec<f64> = DEPTH_LADDER
            .iter()
            .map(|&depth| {
                let mut tree = DecisionTree::new_regressor()
                    .with_criterion(Criterion::MSE)
                    .unwrap()
                    .with_max_depth(depth);
                tree.fit(&split.x_train, &split.y_train).unwrap();
                tree.score(&split.x_test, &split.y_test).unwrap()
            })
            .collect();
        let depth = first_closest_depth(&scores);

        let params = ParameterBag::new().with("dtr_max_depth", "search");
        let result = trainer_for(Algorithm::DecisionTreeRegressor)
            .train(&x, &y, &params, &mut context(seed))
            .unwrap();

        assert_eq!(result.selected.get("dtr_best_depth"), Some(&Value::from(depth)));
        let position = DEPTH_LADDER.iter().position(|&d| d == depth).unwrap();
        assert_eq!(result.accuracy.value, round4(scores[position]));
    }

    #[test]
    fn test_forest_depth_search_picks_first_closest_oob_score() {
        let (x, y) = noisy_linear();
        let seed = 6;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let forest_seed = rng.next_u64();
        let split = HoldoutSplit::shuffled(x.nrows(), EngineConfig::default().test_size, &mut rng)
            .unwrap()
            .apply(&x, &y);
        let template = RandomForest::new_regressor(10)
            .with_criterion(Criterion::MSE)
            .unwrap()
            .with_random_state(Some(forest_seed));

        let oob: Vec<f64> = DEPTH_LADDER
            .iter()
            .map(|&depth| {
                let mut forest = template.clone().with_max_depth(depth).with_oob_score(true);
                forest.fit(&split.x_train, &split.y_train).unwrap();
                forest.oob_score_value().unwrap()
            })
            .collect();
        let depth = first_closest_depth(&oob);

        let mut forest = template.clone().with_max_depth(depth);
        forest.fit(&split.x_train, &split.y_train).unwrap();
        let expected = round4(forest.score(&split.x_test, &split.y_test).unwrap());

        let params = ParameterBag::new()
            .with("rfc_max_depth", "search")
            .with("rfc_n_estimators", 10);
        let result = trainer_for(Algorithm::RandomForestRegressor)
            .train(&x, &y, &params, &mut context(seed))
            .unwrap();

        assert_eq!(result.selected.get("rfc_best_depth"), Some(&Value::from(depth)));
        assert_eq!(result.accuracy.value, expected);
    }

    #[test]
    fn test_non_finite_score_is_a_training_error() {
        let (x, mut y) = linear();
        y[3] = f64::NAN;
        let result = trainer_for(Algorithm::LinearRegression).train(&x, &y, &ParameterBag::new(), &mut context(1));
        assert!(matches!(result, Err(EasyMlError::TrainingError(_))));
    }

    #[test]
    fn test_svc_kernel_error_names_key() {
        let (x, y) = blobs();
        let params = ParameterBag::new().with("svc_kernel", "cosine");
        match trainer_for(Algorithm::SupportVectorMachineClassifier).train(&x, &y, &params, &mut context(4)) {
            Err(EasyMlError::InvalidParameter { name, .. }) => assert_eq!(name, "svc_kernel"),
            other => panic!("unexpected result {:?}", other.map(|o| o.algorithm)),
        }
    }
}
