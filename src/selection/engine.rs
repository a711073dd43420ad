//! Training orchestration: dispatch, best-of search and hand-off to storage

use tracing::{info, warn};

use super::algorithm::{Algorithm, AlgorithmFamily, AlgorithmSelector};
use super::params::ParameterBag;
use super::trainers::{trainer_for, TrainContext, TrainingOutcome};
use crate::config::EngineConfig;
use crate::error::{EasyMlError, Result};
use crate::store::{DataAdapter, ModelRecord, ModelSink, SaveModelRequest};

/// Keeps the first candidate, then any candidate with a strictly higher accuracy
#[derive(Debug, Default)]
pub struct BestOf {
    best: Option<TrainingOutcome>,
}

impl BestOf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `candidate` became the new best
    pub fn offer(&mut self, candidate: TrainingOutcome) -> bool {
        let replace = match &self.best {
            None => true,
            Some(best) => candidate.accuracy.value > best.accuracy.value,
        };
        if replace {
            self.best = Some(candidate);
        }
        replace
    }

    pub fn best(&self) -> Option<&TrainingOutcome> {
        self.best.as_ref()
    }

    pub fn into_best(self) -> Option<TrainingOutcome> {
        self.best
    }
}

/// Algorithms to train for a request, in training order
pub fn candidates(selector: AlgorithmSelector, params: &ParameterBag) -> Result<Vec<Algorithm>> {
    match selector {
        AlgorithmSelector::Single(algorithm) => Ok(vec![algorithm]),
        AlgorithmSelector::Automatic => {
            let family: AlgorithmFamily = params
                .get_str("auto_alg_type")
                .ok_or_else(|| {
                    EasyMlError::invalid_parameter(
                        "auto_alg_type",
                        "<missing>",
                        "required for automatic selection",
                    )
                })?
                .parse()?;
            Ok(family.members().to_vec())
        }
    }
}

/// Trains the requested algorithm (or family) on a stored file and persists the winner
pub struct ModelSelector<'a> {
    data: &'a dyn DataAdapter,
    sink: &'a dyn ModelSink,
    config: &'a EngineConfig,
}

impl<'a> ModelSelector<'a> {
    pub fn new(data: &'a dyn DataAdapter, sink: &'a dyn ModelSink, config: &'a EngineConfig) -> Self {
        Self { data, sink, config }
    }

    /// Train, pick the best candidate and store it.
    ///
    /// Nothing is persisted unless every candidate trains successfully.
    pub fn train_model(
        &self,
        algorithm_code: i64,
        file_id: u64,
        params: &ParameterBag,
    ) -> Result<ModelRecord> {
        let selector = AlgorithmSelector::from_code(algorithm_code)?;

        let dataset = self.data.eligible_dataset(file_id).map_err(|e| {
            if matches!(e, EasyMlError::NoEligibleData { .. }) {
                warn!(file_id, error = %e, "Training aborted");
            }
            e
        })?;
        let algorithms = candidates(selector, params)?;

        info!(
            file_id,
            selector = selector.display_name(),
            candidates = algorithms.len(),
            rows = dataset.n_samples(),
            features = dataset.n_features(),
            "Training started"
        );

        let mut tracker = BestOf::new();
        for (index, &algorithm) in algorithms.iter().enumerate() {
            let seed = self.config.random_state.map(|s| s.wrapping_add(index as u64));
            let mut ctx = TrainContext::new(self.config, seed);
            let outcome =
                trainer_for(algorithm).train(&dataset.inputs, &dataset.target, params, &mut ctx)?;
            info!(
                algorithm = %algorithm,
                accuracy = outcome.accuracy.value,
                kind = %outcome.accuracy.kind,
                "Candidate finished"
            );
            tracker.offer(outcome);
        }

        let best = tracker
            .into_best()
            .ok_or_else(|| EasyMlError::TrainingError("no candidate was trained".to_string()))?;
        let label = selector.label_for(best.algorithm);
        info!(label = %label, accuracy = best.accuracy.value, "Best candidate selected");

        let parameters = best.parameters();
        self.sink.save_model(SaveModelRequest {
            file_id,
            label,
            type_num: selector.code(),
            model: best.model,
            parameters,
            accuracy: best.accuracy,
            target_labels: dataset.target_labels,
            input_columns: dataset.input_columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::trainers::{Accuracy, AccuracyKind};
    use crate::training::NearestCentroid;

    fn synthetic(algorithm: Algorithm, value: f64) -> TrainingOutcome {
        TrainingOutcome {
            algorithm,
            model: NearestCentroid::new().into(),
            accuracy: Accuracy {
                value,
                kind: AccuracyKind::MatchPercent,
            },
            selected: ParameterBag::new(),
        }
    }

    #[test]
    fn test_increasing_accuracies_pick_the_last() {
        let mut tracker = BestOf::new();
        for (i, &alg) in crate::selection::CLASSIFICATION.iter().enumerate() {
            assert!(tracker.offer(synthetic(alg, 10.0 * i as f64)));
        }
        assert_eq!(
            tracker.into_best().map(|b| b.algorithm),
            Some(Algorithm::SupportVectorMachineClassifier)
        );
    }

    #[test]
    fn test_ties_keep_the_earlier_candidate() {
        let mut tracker = BestOf::new();
        tracker.offer(synthetic(Algorithm::LogisticRegression, 80.0));
        assert!(!tracker.offer(synthetic(Algorithm::NearestCentroid, 80.0)));
        assert!(!tracker.offer(synthetic(Algorithm::GaussianNaiveBayes, 60.0)));
        assert_eq!(
            tracker.best().map(|b| b.algorithm),
            Some(Algorithm::LogisticRegression)
        );
    }

    #[test]
    fn test_first_candidate_wins_even_when_negative() {
        let mut tracker = BestOf::new();
        assert!(tracker.offer(synthetic(Algorithm::LinearRegression, -3.5)));
        assert!(tracker.best().is_some());
    }

    #[test]
    fn test_candidates() {
        let single = candidates(
            AlgorithmSelector::Single(Algorithm::NearestCentroid),
            &ParameterBag::new(),
        )
        .unwrap();
        assert_eq!(single, vec![Algorithm::NearestCentroid]);

        let params = ParameterBag::new().with("auto_alg_type", "auto_regression");
        let family = candidates(AlgorithmSelector::Automatic, &params).unwrap();
        assert_eq!(family, crate::selection::REGRESSION.to_vec());

        assert!(matches!(
            candidates(AlgorithmSelector::Automatic, &ParameterBag::new()),
            Err(EasyMlError::InvalidParameter { .. })
        ));
    }
}
