//! File, cell and model records, in memory or backed by a JSON snapshot

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::models::{model_display_name, ModelRecord, SaveModelRequest};
use super::{DataAdapter, ModelSink};
use crate::data::{build_dataset, CellRecord, ColumnMeta, ColumnRole, CsvFile, CsvTable, Dataset};
use crate::error::{EasyMlError, Result};

/// Name of the snapshot file inside a workspace directory
pub const STORE_FILE_NAME: &str = "easyml-store.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    next_file_id: u64,
    next_model_id: u64,
    files: BTreeMap<u64, CsvFile>,
    cells: BTreeMap<u64, Vec<CellRecord>>,
    models: BTreeMap<u64, ModelRecord>,
}

impl StoreState {
    fn file(&self, file_id: u64) -> Result<&CsvFile> {
        self.files.get(&file_id).ok_or(EasyMlError::NotFound {
            kind: "file",
            id: file_id,
        })
    }

    fn owned_file_mut(&mut self, owner: &str, file_id: u64) -> Result<&mut CsvFile> {
        let file = self.files.get_mut(&file_id).ok_or(EasyMlError::NotFound {
            kind: "file",
            id: file_id,
        })?;
        if file.owner != owner {
            return Err(EasyMlError::PermissionDenied(format!(
                "file {} belongs to another user",
                file_id
            )));
        }
        Ok(file)
    }
}

/// Thread-safe record store.
///
/// Every mutation happens under one write lock. A file-backed store applies the
/// mutation to a copy, writes the snapshot, and only then publishes the copy,
/// so a failed write leaves the store unchanged.
pub struct RecordStore {
    state: RwLock<StoreState>,
    path: Option<PathBuf>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl RecordStore {
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            path: None,
        }
    }

    /// Open the snapshot at `path`, starting empty when it does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str::<StoreState>(&text).map_err(|e| {
                EasyMlError::PersistenceFault(format!("corrupt store {}: {}", path.display(), e))
            })?
        } else {
            StoreState::default()
        };
        info!(path = %path.display(), "Record store opened");
        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
        })
    }

    /// Open `<dir>/easyml-store.json`, creating `dir` if needed
    pub fn open_dir(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Self::open(dir.join(STORE_FILE_NAME))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn mutate<T, F>(&self, apply: F) -> Result<T>
    where
        F: FnOnce(&mut StoreState) -> Result<T>,
    {
        let mut state = self.state.write();
        match &self.path {
            None => apply(&mut state),
            Some(path) => {
                let mut draft = state.clone();
                let value = apply(&mut draft)?;
                write_snapshot(path, &draft)?;
                *state = draft;
                Ok(value)
            }
        }
    }

    /// Store a parsed CSV under `owner`; every column starts as an input
    pub fn add_file(&self, owner: &str, raw_name: &str, table: CsvTable) -> Result<CsvFile> {
        let stem = raw_name.strip_suffix(".csv").unwrap_or(raw_name);
        self.mutate(|state| {
            let same_raw = state
                .files
                .values()
                .filter(|f| f.owner == owner && f.raw_name == raw_name)
                .count();
            let display_name = if same_raw > 0 {
                format!("{} ({})", stem, same_raw)
            } else {
                stem.to_string()
            };

            state.next_file_id += 1;
            let file = CsvFile {
                id: state.next_file_id,
                owner: owner.to_string(),
                raw_name: raw_name.to_string(),
                display_name,
                columns: table
                    .headers
                    .iter()
                    .enumerate()
                    .map(|(column_num, header)| ColumnMeta {
                        column_num,
                        header: header.clone(),
                        role: ColumnRole::Input,
                    })
                    .collect(),
                created_at: Utc::now(),
            };
            debug!(file_id = file.id, cells = table.cells.len(), "File stored");
            state.files.insert(file.id, file.clone());
            state.cells.insert(file.id, table.cells);
            Ok(file)
        })
    }

    pub fn file(&self, file_id: u64) -> Result<CsvFile> {
        self.state.read().file(file_id).cloned()
    }

    pub fn files_for(&self, owner: &str) -> Vec<CsvFile> {
        self.state
            .read()
            .files
            .values()
            .filter(|f| f.owner == owner)
            .cloned()
            .collect()
    }

    pub fn cells(&self, file_id: u64) -> Result<Vec<CellRecord>> {
        let state = self.state.read();
        state.file(file_id)?;
        Ok(state.cells.get(&file_id).cloned().unwrap_or_default())
    }

    /// File and its cells under a single read lock
    pub fn file_with_cells(&self, file_id: u64) -> Result<(CsvFile, Vec<CellRecord>)> {
        let state = self.state.read();
        let file = state.file(file_id)?.clone();
        let cells = state.cells.get(&file_id).cloned().unwrap_or_default();
        Ok((file, cells))
    }

    /// Rename a file; the owner may not have two files with the same name
    pub fn rename_file(&self, owner: &str, file_id: u64, new_name: &str) -> Result<CsvFile> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(EasyMlError::InvalidInput("file name must not be empty".to_string()));
        }
        self.mutate(|state| {
            state.owned_file_mut(owner, file_id)?;
            if state
                .files
                .values()
                .any(|f| f.owner == owner && f.display_name == new_name)
            {
                return Err(EasyMlError::InvalidInput(
                    "A file with that name already exists".to_string(),
                ));
            }
            let file = state.owned_file_mut(owner, file_id)?;
            file.display_name = new_name.to_string();
            Ok(file.clone())
        })
    }

    /// Delete a file together with its cells and models
    pub fn delete_file(&self, owner: &str, file_id: u64) -> Result<CsvFile> {
        self.mutate(|state| {
            state.owned_file_mut(owner, file_id)?;
            state.cells.remove(&file_id);
            state.models.retain(|_, m| m.file_id != file_id);
            state.files.remove(&file_id).ok_or(EasyMlError::NotFound {
                kind: "file",
                id: file_id,
            })
        })
    }

    /// Change the role of the column whose header or number is `column`
    pub fn set_column_role(
        &self,
        owner: &str,
        file_id: u64,
        column: &str,
        role: ColumnRole,
    ) -> Result<ColumnMeta> {
        self.mutate(|state| {
            let file = state.owned_file_mut(owner, file_id)?;
            let column_num = file
                .find_column(column)
                .map(|c| c.column_num)
                .ok_or_else(|| {
                    EasyMlError::InvalidInput(format!(
                        "file '{}' has no column '{}'",
                        file.display_name, column
                    ))
                })?;
            let meta = file
                .columns
                .iter_mut()
                .find(|c| c.column_num == column_num)
                .ok_or_else(|| EasyMlError::InvalidInput(format!("no column {}", column_num)))?;
            meta.role = role;
            Ok(meta.clone())
        })
    }

    pub fn model(&self, model_id: u64) -> Result<ModelRecord> {
        self.state
            .read()
            .models
            .get(&model_id)
            .cloned()
            .ok_or(EasyMlError::NotFound {
                kind: "model",
                id: model_id,
            })
    }

    /// Models of `owner`, optionally restricted to one source file
    pub fn models_for(&self, owner: &str, file_id: Option<u64>) -> Vec<ModelRecord> {
        self.state
            .read()
            .models
            .values()
            .filter(|m| m.owner == owner && file_id.map_or(true, |id| m.file_id == id))
            .cloned()
            .collect()
    }
}

fn write_snapshot(path: &Path, state: &StoreState) -> Result<()> {
    let fault = |e: String| {
        EasyMlError::PersistenceFault(format!("cannot write {}: {}", path.display(), e))
    };
    let json = serde_json::to_vec(state).map_err(|e| fault(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| fault(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| fault(e.to_string()))?;
    Ok(())
}

impl DataAdapter for RecordStore {
    fn eligible_dataset(&self, file_id: u64) -> Result<Dataset> {
        let state = self.state.read();
        let file = state.file(file_id)?;
        let cells = state.cells.get(&file_id).map(Vec::as_slice).unwrap_or(&[]);
        build_dataset(file, cells)
    }
}

impl ModelSink for RecordStore {
    /// The name counter is per owner: it counts this owner's models with the
    /// same file display name and type label, so two owners can both hold
    /// `data_Nearest_Centroid`.
    fn save_model(&self, request: SaveModelRequest) -> Result<ModelRecord> {
        let payload = request
            .model
            .to_bytes()
            .map_err(|e| EasyMlError::PersistenceFault(format!("cannot encode model: {}", e)))?;
        let parameters = serde_json::to_string(&request.parameters)
            .map_err(|e| EasyMlError::PersistenceFault(format!("cannot encode parameters: {}", e)))?;

        // Naming and insertion share the write lock taken by `mutate`
        self.mutate(move |state| {
            let file = state
                .file(request.file_id)
                .map_err(|e| EasyMlError::PersistenceFault(e.to_string()))?;
            let owner = file.owner.clone();
            let name = file.display_name.clone();

            let same_name = state
                .models
                .values()
                .filter(|m| m.owner == owner && m.name == name && m.type_label == request.label)
                .count();
            let display_name = model_display_name(&name, &request.label, same_name);
            if state
                .models
                .values()
                .any(|m| m.owner == owner && m.display_name == display_name)
            {
                return Err(EasyMlError::PersistenceConflict(display_name));
            }

            state.next_model_id += 1;
            let record = ModelRecord {
                id: state.next_model_id,
                owner,
                file_id: request.file_id,
                name,
                display_name,
                type_label: request.label,
                type_num: request.type_num,
                parameters,
                accuracy: request.accuracy.value,
                accuracy_type: request.accuracy.kind.label().to_string(),
                target_labels: request.target_labels,
                input_columns: request.input_columns,
                created_at: Utc::now(),
                payload,
            };
            info!(model_id = record.id, name = %record.display_name, "Model saved");
            state.models.insert(record.id, record.clone());
            Ok(record)
        })
    }
}
