//! Persistence of files, cells and trained models
//!
//! The training pipeline only sees the two traits below; [`RecordStore`]
//! implements both.

mod models;
mod record_store;

pub use models::{model_display_name, ModelRecord, SaveModelRequest};
pub use record_store::{RecordStore, STORE_FILE_NAME};

use crate::data::Dataset;
use crate::error::Result;

/// Source of training tables
pub trait DataAdapter: Send + Sync {
    /// Input and target tables of a file, honoring its column roles
    fn eligible_dataset(&self, file_id: u64) -> Result<Dataset>;
}

/// Destination of trained models
pub trait ModelSink: Send + Sync {
    /// Name and insert a model record as one atomic step
    fn save_model(&self, request: SaveModelRequest) -> Result<ModelRecord>;
}
