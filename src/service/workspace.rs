//! Operations exposed to users, reporting through a message channel

use std::path::Path;
use tracing::{error, info};

use super::messages::Messages;
use crate::config::AppConfig;
use crate::data::{build_inputs, decode_label, read_csv_bytes, ColumnMeta, ColumnRole, CsvFile};
use crate::error::{EasyMlError, Result};
use crate::selection::{ModelSelector, ParameterBag};
use crate::store::{ModelRecord, RecordStore};

/// One predicted value and the source row it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub row_num: usize,
    pub value: String,
}

/// A user-facing workspace: a record store, its configuration and a message channel.
///
/// Operations never return errors. Failures become error messages and the
/// operation yields `None`.
pub struct Workspace {
    store: RecordStore,
    config: AppConfig,
    messages: Messages,
}

impl Workspace {
    /// Open the workspace described by `config`; without a directory the
    /// records live in memory only
    pub fn open(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let store = match &config.workspace_dir {
            Some(dir) => RecordStore::open_dir(dir)?,
            None => RecordStore::in_memory(),
        };
        Ok(Self::with_store(store, config))
    }

    pub fn in_memory(config: AppConfig) -> Self {
        Self::with_store(RecordStore::in_memory(), config)
    }

    pub fn with_store(store: RecordStore, config: AppConfig) -> Self {
        Self {
            store,
            config,
            messages: Messages::new(),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    fn report<T>(&self, context: &str, result: Result<T>, success: impl FnOnce(&T) -> String) -> Option<T> {
        match result {
            Ok(value) => {
                self.messages.success(success(&value));
                Some(value)
            }
            Err(e) => {
                error!(error = %e, "{}", context);
                self.messages.error(format!("{} - {}", context, e));
                None
            }
        }
    }

    /// Upload a CSV file from disk
    pub fn upload_csv(&self, owner: &str, path: &Path) -> Option<CsvFile> {
        let raw_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = self.check_upload(&raw_name, || Ok(std::fs::metadata(path)?.len())).and_then(|_| {
            let bytes = std::fs::read(path)?;
            self.store_upload(owner, &raw_name, &bytes)
        });
        self.report("Unable to upload file", result, |_| "File successfully uploaded".to_string())
    }

    /// Upload CSV content received under `raw_name`
    pub fn upload_bytes(&self, owner: &str, raw_name: &str, bytes: &[u8]) -> Option<CsvFile> {
        let result = self
            .check_upload(raw_name, || Ok(bytes.len() as u64))
            .and_then(|_| self.store_upload(owner, raw_name, bytes));
        self.report("Unable to upload file", result, |_| "File successfully uploaded".to_string())
    }

    fn check_upload(&self, raw_name: &str, size: impl FnOnce() -> Result<u64>) -> Result<()> {
        if !raw_name.ends_with(".csv") {
            return Err(EasyMlError::InvalidInput("File is not CSV type".to_string()));
        }
        let size = size()?;
        if size > self.config.max_upload_bytes {
            return Err(EasyMlError::InvalidInput(format!(
                "Uploaded file is too big ({:.2} MB)",
                size as f64 / 1_000_000.0
            )));
        }
        Ok(())
    }

    fn store_upload(&self, owner: &str, raw_name: &str, bytes: &[u8]) -> Result<CsvFile> {
        let table = read_csv_bytes(bytes)?;
        let file = self.store.add_file(owner, raw_name, table)?;
        info!(file_id = file.id, name = %file.display_name, columns = file.columns.len(), "File uploaded");
        Ok(file)
    }

    pub fn rename_file(&self, owner: &str, file_id: u64, new_name: &str) -> Option<CsvFile> {
        let result = self.store.rename_file(owner, file_id, new_name);
        self.report("Unable to rename file", result, |_| "File successfully renamed".to_string())
    }

    pub fn delete_file(&self, owner: &str, file_id: u64) -> Option<CsvFile> {
        let result = self.store.delete_file(owner, file_id);
        self.report("Unable to delete file", result, |_| "File deleted successfully".to_string())
    }

    pub fn set_column_role(
        &self,
        owner: &str,
        file_id: u64,
        column: &str,
        role: ColumnRole,
    ) -> Option<ColumnMeta> {
        let result = self.store.set_column_role(owner, file_id, column, role);
        self.report("Unable to update column", result, |c| {
            format!("Column '{}' is now {}", c.header, c.role)
        })
    }

    /// Train the algorithm (or family) `algorithm_code` on one of the owner's files
    pub fn train_model(
        &self,
        owner: &str,
        algorithm_code: i64,
        file_id: u64,
        params: &ParameterBag,
    ) -> Option<ModelRecord> {
        let result = self.owned_file(owner, file_id).and_then(|_| {
            ModelSelector::new(&self.store, &self.store, &self.config.engine)
                .train_model(algorithm_code, file_id, params)
        });
        self.report("Unable to create model", result, |m| {
            format!(
                "Model {} created ({} {})",
                m.display_name, m.accuracy_type, m.accuracy
            )
        })
    }

    /// Predict every complete row of `file_id` with a stored model
    pub fn predict(&self, owner: &str, model_id: u64, file_id: u64) -> Option<Vec<Prediction>> {
        let result = self.run_prediction(owner, model_id, file_id);
        self.report("Unable to predict", result, |p| {
            format!("Predicted {} rows", p.len())
        })
    }

    fn run_prediction(&self, owner: &str, model_id: u64, file_id: u64) -> Result<Vec<Prediction>> {
        let record = self.store.model(model_id)?;
        if record.owner != owner {
            return Err(EasyMlError::PermissionDenied(format!(
                "model {} belongs to another user",
                model_id
            )));
        }
        self.owned_file(owner, file_id)?;

        let (file, cells) = self.store.file_with_cells(file_id)?;
        let (rows, x) = build_inputs(&file, &cells, &record.input_columns)?;
        let model = record.model()?;
        let predicted = model.predict(&x)?;

        let labels = record.target_labels.as_deref();
        Ok(rows
            .into_iter()
            .zip(predicted.iter())
            .map(|(row_num, &value)| Prediction {
                row_num,
                value: decode_label(value, labels),
            })
            .collect())
    }

    fn owned_file(&self, owner: &str, file_id: u64) -> Result<CsvFile> {
        let file = self.store.file(file_id)?;
        if file.owner != owner {
            return Err(EasyMlError::PermissionDenied(format!(
                "file {} belongs to another user",
                file_id
            )));
        }
        Ok(file)
    }

    pub fn files(&self, owner: &str) -> Vec<CsvFile> {
        self.store.files_for(owner)
    }

    pub fn models(&self, owner: &str, file_id: Option<u64>) -> Vec<ModelRecord> {
        self.store.models_for(owner, file_id)
    }
}
