use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::manager::{
    Archive, ArchiveDescriptor, ArchiveManager, RowKeyState, VersionRecord,
};
use crate::document::{DatasetSnapshot, Document, PrimaryKey, SnapshotHandle};
use crate::error::DatastoreError;
use crate::ident::unique_identifier;

const ARCHIVES_DIR: &str = "archives";
const MANIFEST_FILE: &str = "manifest.json";

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, DatastoreError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DatastoreError> {
    let data = serde_json::to_string_pretty(value)?;
    fs::write(path, data)?;
    Ok(())
}

/// On-disk state of one archive: descriptor, version listing, and row-id
/// assignment state. Documents live in one JSON file per version next to it.
#[derive(Serialize, Deserialize)]
struct ArchiveManifest {
    descriptor: ArchiveDescriptor,
    snapshots: Vec<SnapshotHandle>,
    row_keys: RowKeyState,
}

/// Archive persisted as a directory of JSON files, one per committed version,
/// plus a manifest.
pub struct FileSystemArchive {
    dir: PathBuf,
    state: RwLock<ArchiveManifest>,
}

impl FileSystemArchive {
    fn open(dir: PathBuf) -> Result<Self, DatastoreError> {
        let manifest: ArchiveManifest = read_json(&dir.join(MANIFEST_FILE))?;
        Ok(FileSystemArchive {
            dir,
            state: RwLock::new(manifest),
        })
    }

    fn version_path(&self, version: u64) -> PathBuf {
        self.dir.join(format!("{}.json", version))
    }
}

impl Archive for FileSystemArchive {
    fn commit(
        &self,
        mut document: Document,
        action: Option<Value>,
    ) -> Result<DatasetSnapshot, DatastoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| DatastoreError::LockPoisoned("archive write"))?;
        let primary_key = state.descriptor.primary_key.clone();
        state.row_keys.assign(&mut document, primary_key.as_ref())?;
        let handle = SnapshotHandle {
            version: state.snapshots.len() as u64,
            created_at: Utc::now(),
        };
        let record = VersionRecord {
            handle: handle.clone(),
            action,
            document,
        };
        write_json(&self.version_path(handle.version), &record)?;
        state.snapshots.push(handle.clone());
        write_json(&self.dir.join(MANIFEST_FILE), &*state)?;
        Ok(DatasetSnapshot {
            document: record.document,
            version: handle.version,
            created_at: handle.created_at,
        })
    }

    fn checkout(&self, version: Option<u64>) -> Result<DatasetSnapshot, DatastoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("archive read"))?;
        let version = version.unwrap_or_else(|| state.snapshots.len().saturating_sub(1) as u64);
        if state.snapshots.get(version as usize).is_none() {
            return Err(DatastoreError::UnknownVersion {
                name: state.descriptor.name.clone(),
                version,
            });
        }
        let record: VersionRecord = read_json(&self.version_path(version))?;
        Ok(DatasetSnapshot {
            document: record.document,
            version: record.handle.version,
            created_at: record.handle.created_at,
        })
    }

    fn snapshots(&self) -> Result<Vec<SnapshotHandle>, DatastoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("archive read"))?;
        Ok(state.snapshots.clone())
    }

    fn last_version(&self) -> Result<Option<u64>, DatastoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("archive read"))?;
        Ok(state.snapshots.last().map(|handle| handle.version))
    }
}

/// Archive manager that persists every archive under a base directory.
///
/// Layout: `<basedir>/archives/<id>/manifest.json` plus one `<version>.json`
/// per committed version. Open handles are shared, so all access to one
/// archive within a process goes through the same lock.
pub struct PersistentArchiveManager {
    basedir: PathBuf,
    handles: RwLock<HashMap<String, Arc<FileSystemArchive>>>,
}

impl PersistentArchiveManager {
    pub fn new(basedir: impl Into<PathBuf>) -> Result<Self, DatastoreError> {
        let basedir = basedir.into();
        fs::create_dir_all(basedir.join(ARCHIVES_DIR))?;
        Ok(PersistentArchiveManager {
            basedir,
            handles: RwLock::new(HashMap::new()),
        })
    }

    fn archive_dir(&self, identifier: &str) -> PathBuf {
        self.basedir.join(ARCHIVES_DIR).join(identifier)
    }
}

impl ArchiveManager for PersistentArchiveManager {
    fn create(
        &self,
        name: &str,
        primary_key: Option<PrimaryKey>,
    ) -> Result<ArchiveDescriptor, DatastoreError> {
        let mut identifier = unique_identifier(16);
        while self.archive_dir(&identifier).exists() {
            identifier = unique_identifier(16);
        }
        let dir = self.archive_dir(&identifier);
        fs::create_dir_all(&dir)?;
        let descriptor = ArchiveDescriptor {
            identifier: identifier.clone(),
            name: name.to_string(),
            primary_key,
        };
        let manifest = ArchiveManifest {
            descriptor: descriptor.clone(),
            snapshots: Vec::new(),
            row_keys: RowKeyState::default(),
        };
        write_json(&dir.join(MANIFEST_FILE), &manifest)?;
        debug!("created archive {} for dataset '{}'", identifier, name);
        Ok(descriptor)
    }

    fn get(&self, identifier: &str) -> Result<Arc<dyn Archive>, DatastoreError> {
        {
            let handles = self
                .handles
                .read()
                .map_err(|_| DatastoreError::LockPoisoned("manager read"))?;
            if let Some(archive) = handles.get(identifier) {
                return Ok(archive.clone());
            }
        }
        let dir = self.archive_dir(identifier);
        if !dir.join(MANIFEST_FILE).exists() {
            return Err(DatastoreError::NotFound(identifier.to_string()));
        }
        let archive = Arc::new(FileSystemArchive::open(dir)?);
        let mut handles = self
            .handles
            .write()
            .map_err(|_| DatastoreError::LockPoisoned("manager write"))?;
        Ok(handles
            .entry(identifier.to_string())
            .or_insert(archive)
            .clone())
    }

    fn delete(&self, identifier: &str) -> Result<(), DatastoreError> {
        let mut handles = self
            .handles
            .write()
            .map_err(|_| DatastoreError::LockPoisoned("manager write"))?;
        handles.remove(identifier);
        let dir = self.archive_dir(identifier);
        if !dir.exists() {
            return Err(DatastoreError::NotFound(identifier.to_string()));
        }
        fs::remove_dir_all(dir)?;
        debug!("deleted archive {}", identifier);
        Ok(())
    }

    fn list(&self) -> Result<Vec<ArchiveDescriptor>, DatastoreError> {
        let mut descriptors = Vec::new();
        for entry in fs::read_dir(self.basedir.join(ARCHIVES_DIR))? {
            let manifest_path = entry?.path().join(MANIFEST_FILE);
            if manifest_path.exists() {
                let manifest: ArchiveManifest = read_json(&manifest_path)?;
                descriptors.push(manifest.descriptor);
            }
        }
        Ok(descriptors)
    }
}
