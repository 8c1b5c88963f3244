//! Placement persistence: CSV history file, or memory.

use super::PlacementStore;
use crate::models::{CollaboratorError, PlacementRecord};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Appends one row per finished tournament to a CSV file.
#[derive(Debug)]
pub struct CsvPlacementStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

fn store_error(e: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::new("placement-store", e.to_string())
}

impl CsvPlacementStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record written so far, oldest first. A missing file is an empty history.
    pub fn history(&self) -> Result<Vec<PlacementRecord>, CollaboratorError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path).map_err(store_error)?;
        reader
            .deserialize()
            .collect::<Result<Vec<PlacementRecord>, csv::Error>>()
            .map_err(store_error)
    }
}

impl PlacementStore for CsvPlacementStore {
    fn record_winners(&self, record: &PlacementRecord) -> Result<(), CollaboratorError> {
        let _guard = self.write_lock.lock().map_err(|_| store_error("lock poisoned"))?;
        let write_header = std::fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(store_error)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        writer.serialize(record).map_err(store_error)?;
        writer.flush().map_err(store_error)?;
        log::info!("Recorded placements of {} to {}", record.tournament, self.path.display());
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryPlacementStore {
    records: Mutex<Vec<PlacementRecord>>,
}

impl MemoryPlacementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<PlacementRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl PlacementStore for MemoryPlacementStore {
    fn record_winners(&self, record: &PlacementRecord) -> Result<(), CollaboratorError> {
        self.records
            .lock()
            .map_err(|_| store_error("lock poisoned"))?
            .push(record.clone());
        Ok(())
    }
}
