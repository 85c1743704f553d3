use std::sync::Arc;

use serde_json::Value;

use crate::document::{DatasetSnapshot, Document, PrimaryKey, SnapshotHandle};
use crate::error::DatastoreError;
use crate::metadata::MetadataStore;

/// Store for a named collection of versioned datasets.
///
/// Every dataset is an independent, append-only version history identified by
/// a unique name. There is one interface and several implementations composed
/// by wrapping: `ArchiveDatastore` persists against an archive manager, and
/// `CachedDatastore` decorates any other implementation with a bounded
/// in-memory snapshot cache.
pub trait Datastore: Send + Sync {
    /// Create a new dataset under the given name. The document becomes
    /// version 0. The primary key, if given, is forwarded to the backing
    /// archive for row-identity tracking and is otherwise opaque.
    ///
    /// Fails with `AlreadyExists` if the name is already in use.
    fn load(
        &self,
        document: Document,
        name: &str,
        primary_key: Option<PrimaryKey>,
    ) -> Result<DatasetSnapshot, DatastoreError>;

    /// Get the snapshot for the given version, or the latest version if none
    /// is given.
    ///
    /// Fails with `NotFound` for an unknown dataset name and with
    /// `UnknownVersion` for a version that is not in the dataset's history.
    fn checkout(
        &self,
        name: &str,
        version: Option<u64>,
    ) -> Result<DatasetSnapshot, DatastoreError>;

    /// Append a new version built from the given document. The backing
    /// archive assigns the version number and creation timestamp. `action`
    /// is opaque provenance metadata stored for audit.
    ///
    /// Fails with `NotFound` for an unknown dataset name.
    fn commit(
        &self,
        document: Document,
        name: &str,
        action: Option<Value>,
    ) -> Result<DatasetSnapshot, DatastoreError>;

    /// Delete every version and all metadata of the dataset. A second drop
    /// of the same name fails with `NotFound`.
    fn drop_dataset(&self, name: &str) -> Result<(), DatastoreError>;

    /// Highest existing version number.
    fn last_version(&self, name: &str) -> Result<u64, DatastoreError>;

    /// Handles for all versions, in creation order.
    fn snapshots(&self, name: &str) -> Result<Vec<SnapshotHandle>, DatastoreError>;

    /// Annotation store for the given dataset version (latest if omitted).
    fn metadata(
        &self,
        name: &str,
        version: Option<u64>,
    ) -> Result<Arc<dyn MetadataStore>, DatastoreError>;
}
