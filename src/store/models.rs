//! Persisted model records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::selection::{Accuracy, AccuracyKind, ParameterBag};
use crate::training::TrainedModel;

/// Everything needed to store a freshly trained model
#[derive(Debug, Clone)]
pub struct SaveModelRequest {
    pub file_id: u64,
    /// Algorithm label, `Automatic_` prefixed for automatic searches
    pub label: String,
    /// Requested algorithm code
    pub type_num: i64,
    pub model: TrainedModel,
    pub parameters: ParameterBag,
    pub accuracy: Accuracy,
    pub target_labels: Option<Vec<String>>,
    pub input_columns: Vec<String>,
}

/// A stored model. Records are immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: u64,
    pub owner: String,
    pub file_id: u64,
    /// Display name of the source file when the model was saved
    pub name: String,
    pub display_name: String,
    pub type_label: String,
    pub type_num: i64,
    /// Parameter bag as JSON text
    pub parameters: String,
    pub accuracy: f64,
    pub accuracy_type: String,
    pub target_labels: Option<Vec<String>>,
    pub input_columns: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub payload: Vec<u8>,
}

impl ModelRecord {
    /// Deserialize the fitted model
    pub fn model(&self) -> Result<TrainedModel> {
        TrainedModel::from_bytes(&self.payload)
    }

    pub fn parameter_bag(&self) -> Result<ParameterBag> {
        Ok(serde_json::from_str(&self.parameters)?)
    }

    pub fn accuracy(&self) -> Option<Accuracy> {
        AccuracyKind::from_label(&self.accuracy_type).map(|kind| Accuracy {
            value: self.accuracy,
            kind,
        })
    }
}

/// Base name of a model: `<file>_<label>`, then ` (<n>)` when `n` earlier
/// models share the file name and label, with spaces replaced by `_`
pub fn model_display_name(file_display_name: &str, label: &str, same_name_count: usize) -> String {
    let mut name = format!("{}_{}", file_display_name, label);
    if same_name_count > 0 {
        name.push_str(&format!(" ({})", same_name_count));
    }
    name.replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        assert_eq!(
            model_display_name("iris data", "Automatic_Nearest Centroid", 0),
            "iris_data_Automatic_Nearest_Centroid"
        );
        assert_eq!(
            model_display_name("iris", "Gaussian Naive Bayes", 2),
            "iris_Gaussian_Naive_Bayes_(2)"
        );
    }
}
