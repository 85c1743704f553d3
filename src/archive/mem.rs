use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::Value;

use super::manager::{
    Archive, ArchiveDescriptor, ArchiveManager, RowKeyState, VersionRecord,
};
use crate::document::{DatasetSnapshot, Document, PrimaryKey, SnapshotHandle};
use crate::error::DatastoreError;
use crate::ident::unique_identifier;

struct ArchiveState {
    versions: Vec<VersionRecord>,
    row_keys: RowKeyState,
}

/// In-memory archive. Lost on process exit.
pub struct VolatileArchive {
    descriptor: ArchiveDescriptor,
    state: RwLock<ArchiveState>,
}

impl VolatileArchive {
    fn new(descriptor: ArchiveDescriptor) -> Self {
        VolatileArchive {
            descriptor,
            state: RwLock::new(ArchiveState {
                versions: Vec::new(),
                row_keys: RowKeyState::default(),
            }),
        }
    }
}

impl Archive for VolatileArchive {
    fn commit(
        &self,
        mut document: Document,
        action: Option<Value>,
    ) -> Result<DatasetSnapshot, DatastoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| DatastoreError::LockPoisoned("archive write"))?;
        state
            .row_keys
            .assign(&mut document, self.descriptor.primary_key.as_ref())?;
        let handle = SnapshotHandle {
            version: state.versions.len() as u64,
            created_at: Utc::now(),
        };
        state.versions.push(VersionRecord {
            handle: handle.clone(),
            action,
            document: document.clone(),
        });
        Ok(DatasetSnapshot {
            document,
            version: handle.version,
            created_at: handle.created_at,
        })
    }

    fn checkout(&self, version: Option<u64>) -> Result<DatasetSnapshot, DatastoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("archive read"))?;
        let version = match version {
            Some(version) => version,
            None => state.versions.len().saturating_sub(1) as u64,
        };
        let record = state.versions.get(version as usize).ok_or_else(|| {
            DatastoreError::UnknownVersion {
                name: self.descriptor.name.clone(),
                version,
            }
        })?;
        Ok(DatasetSnapshot {
            document: record.document.clone(),
            version: record.handle.version,
            created_at: record.handle.created_at,
        })
    }

    fn snapshots(&self) -> Result<Vec<SnapshotHandle>, DatastoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("archive read"))?;
        Ok(state.versions.iter().map(|r| r.handle.clone()).collect())
    }

    fn last_version(&self) -> Result<Option<u64>, DatastoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("archive read"))?;
        Ok(state.versions.last().map(|r| r.handle.version))
    }
}

/// Archive manager that keeps every archive in memory. Used for volatile
/// engine sessions and for tests.
pub struct VolatileArchiveManager {
    archives: RwLock<HashMap<String, Arc<VolatileArchive>>>,
}

impl Default for VolatileArchiveManager {
    fn default() -> Self {
        Self::new()
    }
}

impl VolatileArchiveManager {
    pub fn new() -> Self {
        VolatileArchiveManager {
            archives: RwLock::new(HashMap::new()),
        }
    }
}

impl ArchiveManager for VolatileArchiveManager {
    fn create(
        &self,
        name: &str,
        primary_key: Option<PrimaryKey>,
    ) -> Result<ArchiveDescriptor, DatastoreError> {
        let mut archives = self
            .archives
            .write()
            .map_err(|_| DatastoreError::LockPoisoned("manager write"))?;
        let mut identifier = unique_identifier(16);
        while archives.contains_key(&identifier) {
            identifier = unique_identifier(16);
        }
        let descriptor = ArchiveDescriptor {
            identifier: identifier.clone(),
            name: name.to_string(),
            primary_key,
        };
        archives.insert(identifier, Arc::new(VolatileArchive::new(descriptor.clone())));
        Ok(descriptor)
    }

    fn get(&self, identifier: &str) -> Result<Arc<dyn Archive>, DatastoreError> {
        let archives = self
            .archives
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("manager read"))?;
        archives
            .get(identifier)
            .map(|archive| archive.clone() as Arc<dyn Archive>)
            .ok_or_else(|| DatastoreError::NotFound(identifier.to_string()))
    }

    fn delete(&self, identifier: &str) -> Result<(), DatastoreError> {
        let mut archives = self
            .archives
            .write()
            .map_err(|_| DatastoreError::LockPoisoned("manager write"))?;
        archives
            .remove(identifier)
            .map(|_| ())
            .ok_or_else(|| DatastoreError::NotFound(identifier.to_string()))
    }

    fn list(&self) -> Result<Vec<ArchiveDescriptor>, DatastoreError> {
        let archives = self
            .archives
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("manager read"))?;
        Ok(archives
            .values()
            .map(|archive| archive.descriptor.clone())
            .collect())
    }
}
