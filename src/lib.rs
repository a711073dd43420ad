//! easyml - Tabular model training service
//!
//! Users upload CSV files, tag columns as inputs or the target, and train one of
//! twelve classic estimators or an automatic best-of search over a family of them.
//! The winning model is stored with its parameters and held-out accuracy.
//!
//! # Modules
//!
//! - [`data`] - Stored files and cells, CSV ingestion, training tables
//! - [`training`] - Estimators, metrics, splits and cross-validation
//! - [`selection`] - Algorithm codes, per-algorithm trainers, best-of orchestration
//! - [`store`] - Record store for files, cells and models
//! - [`service`] - User-facing workspace with a message channel
//! - [`cli`] - Command-line interface
//! - [`config`] - Engine and application configuration

pub mod error;

pub mod config;
pub mod data;
pub mod selection;
pub mod store;
pub mod training;

pub mod cli;
pub mod service;

pub use error::{EasyMlError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{AppConfig, EngineConfig};
    pub use crate::data::{ColumnRole, CsvFile, Dataset};
    pub use crate::error::{EasyMlError, Result};
    pub use crate::selection::{
        Accuracy, AccuracyKind, Algorithm, AlgorithmFamily, AlgorithmSelector, ModelSelector,
        ParameterBag,
    };
    pub use crate::service::{Message, MessageLevel, Workspace};
    pub use crate::store::{DataAdapter, ModelRecord, ModelSink, RecordStore};
    pub use crate::training::{Model, Task, TrainedModel};
}
