//! Model selection
//!
//! Maps algorithm codes to trainers, runs the automatic best-of search over a
//! family, and hands the winner to a [`ModelSink`](crate::store::ModelSink).

pub mod algorithm;
pub mod engine;
pub mod params;
pub mod trainers;

pub use algorithm::{
    Algorithm, AlgorithmFamily, AlgorithmSelector, AUTOMATIC_CODE, AUTOMATIC_NAME,
    CLASSIFICATION, REGRESSION,
};
pub use engine::{candidates, BestOf, ModelSelector};
pub use params::ParameterBag;
pub use trainers::{
    closest_to_one, trainer_for, Accuracy, AccuracyKind, TrainContext, Trainer, TrainingOutcome,
    DEPTH_LADDER, LOGREG_C_GRID,
};
