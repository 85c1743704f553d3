use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use log::{debug, info};
use serde_json::Value;

use super::store::Datastore;
use crate::archive::{Archive, ArchiveManager};
use crate::document::{DatasetSnapshot, Document, PrimaryKey, SnapshotHandle};
use crate::error::DatastoreError;
use crate::metadata::{
    FileSystemMetadataStoreFactory, MetadataStore, MetadataStoreFactory,
    VolatileMetadataStoreFactory,
};

const ANNOTATIONS_DIR: &str = ".annotations";

struct StoredDataset {
    archive: Arc<dyn Archive>,
    archive_id: String,
    primary_key: Option<PrimaryKey>,
    metadata: Arc<dyn MetadataStoreFactory>,
}

/// Durable datastore over an archive manager.
///
/// Maintains the name-to-archive mapping for every dataset in the collection
/// and a per-archive metadata factory. With a base directory, annotations are
/// kept on the file system next to the archives; without one they are held in
/// memory and lost on process exit.
pub struct ArchiveDatastore {
    manager: Arc<dyn ArchiveManager>,
    basedir: Option<PathBuf>,
    datasets: RwLock<HashMap<String, StoredDataset>>,
}

impl ArchiveDatastore {
    /// Open a datastore over the given manager, registering every archive the
    /// manager already maintains. A fresh manager yields an empty collection.
    pub fn open(
        manager: Arc<dyn ArchiveManager>,
        basedir: Option<PathBuf>,
    ) -> Result<Self, DatastoreError> {
        let store = ArchiveDatastore {
            manager,
            basedir,
            datasets: RwLock::new(HashMap::new()),
        };
        for descriptor in store.manager.list()? {
            let archive = store.manager.get(&descriptor.identifier)?;
            let dataset = StoredDataset {
                archive,
                metadata: store.metadata_factory(&descriptor.identifier),
                archive_id: descriptor.identifier,
                primary_key: descriptor.primary_key,
            };
            store
                .datasets
                .write()
                .map_err(|_| DatastoreError::LockPoisoned("dataset map"))?
                .insert(descriptor.name, dataset);
        }
        Ok(store)
    }

    fn metadata_factory(&self, archive_id: &str) -> Arc<dyn MetadataStoreFactory> {
        match &self.basedir {
            Some(basedir) => Arc::new(FileSystemMetadataStoreFactory::new(
                basedir.join(archive_id).join(ANNOTATIONS_DIR),
            )),
            None => Arc::new(VolatileMetadataStoreFactory::new()),
        }
    }

    fn archive(&self, name: &str) -> Result<Arc<dyn Archive>, DatastoreError> {
        let datasets = self
            .datasets
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("dataset map"))?;
        datasets
            .get(name)
            .map(|dataset| dataset.archive.clone())
            .ok_or_else(|| DatastoreError::NotFound(name.to_string()))
    }

    /// Primary key the dataset was created with.
    pub fn primary_key(&self, name: &str) -> Result<Option<PrimaryKey>, DatastoreError> {
        let datasets = self
            .datasets
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("dataset map"))?;
        datasets
            .get(name)
            .map(|dataset| dataset.primary_key.clone())
            .ok_or_else(|| DatastoreError::NotFound(name.to_string()))
    }

    /// Names of all datasets in the collection.
    pub fn dataset_names(&self) -> Result<Vec<String>, DatastoreError> {
        let datasets = self
            .datasets
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("dataset map"))?;
        Ok(datasets.keys().cloned().collect())
    }
}

impl Datastore for ArchiveDatastore {
    fn load(
        &self,
        document: Document,
        name: &str,
        primary_key: Option<PrimaryKey>,
    ) -> Result<DatasetSnapshot, DatastoreError> {
        let mut datasets = self
            .datasets
            .write()
            .map_err(|_| DatastoreError::LockPoisoned("dataset map"))?;
        if datasets.contains_key(name) {
            return Err(DatastoreError::AlreadyExists(name.to_string()));
        }
        let descriptor = self.manager.create(name, primary_key.clone())?;
        let archive = self.manager.get(&descriptor.identifier)?;
        let snapshot = match archive.commit(document, None) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                // Do not leave an empty archive behind for a failed load.
                let _ = self.manager.delete(&descriptor.identifier);
                return Err(err);
            }
        };
        datasets.insert(
            name.to_string(),
            StoredDataset {
                archive,
                metadata: self.metadata_factory(&descriptor.identifier),
                archive_id: descriptor.identifier,
                primary_key,
            },
        );
        info!("loaded dataset '{}' at version {}", name, snapshot.version);
        Ok(snapshot)
    }

    fn checkout(
        &self,
        name: &str,
        version: Option<u64>,
    ) -> Result<DatasetSnapshot, DatastoreError> {
        self.archive(name)?.checkout(version)
    }

    fn commit(
        &self,
        document: Document,
        name: &str,
        action: Option<Value>,
    ) -> Result<DatasetSnapshot, DatastoreError> {
        let snapshot = self.archive(name)?.commit(document, action)?;
        debug!("committed version {} of dataset '{}'", snapshot.version, name);
        Ok(snapshot)
    }

    fn drop_dataset(&self, name: &str) -> Result<(), DatastoreError> {
        let mut datasets = self
            .datasets
            .write()
            .map_err(|_| DatastoreError::LockPoisoned("dataset map"))?;
        let dataset = datasets
            .remove(name)
            .ok_or_else(|| DatastoreError::NotFound(name.to_string()))?;
        self.manager.delete(&dataset.archive_id)?;
        if let Some(basedir) = &self.basedir {
            let metadir = basedir.join(&dataset.archive_id);
            if metadir.exists() {
                fs::remove_dir_all(metadir)?;
            }
        }
        info!("dropped dataset '{}'", name);
        Ok(())
    }

    fn last_version(&self, name: &str) -> Result<u64, DatastoreError> {
        self.archive(name)?
            .last_version()?
            .ok_or(DatastoreError::UnknownVersion {
                name: name.to_string(),
                version: 0,
            })
    }

    fn snapshots(&self, name: &str) -> Result<Vec<SnapshotHandle>, DatastoreError> {
        self.archive(name)?.snapshots()
    }

    fn metadata(
        &self,
        name: &str,
        version: Option<u64>,
    ) -> Result<Arc<dyn MetadataStore>, DatastoreError> {
        let (factory, last) = {
            let datasets = self
                .datasets
                .read()
                .map_err(|_| DatastoreError::LockPoisoned("dataset map"))?;
            let dataset = datasets
                .get(name)
                .ok_or_else(|| DatastoreError::NotFound(name.to_string()))?;
            (dataset.metadata.clone(), dataset.archive.last_version()?)
        };
        let last = last.ok_or(DatastoreError::UnknownVersion {
            name: name.to_string(),
            version: 0,
        })?;
        let version = version.unwrap_or(last);
        if version > last {
            return Err(DatastoreError::UnknownVersion {
                name: name.to_string(),
                version,
            });
        }
        factory.for_version(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::VolatileArchiveManager;
    use serde_json::json;
    use tempfile::tempdir;

    fn document() -> Document {
        Document::from_values(
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            vec![
                vec![json!(1), json!(2), json!(3)],
                vec![json!(3), json!(4), json!(5)],
            ],
        )
    }

    fn volatile_store() -> ArchiveDatastore {
        ArchiveDatastore::open(Arc::new(VolatileArchiveManager::new()), None).unwrap()
    }

    #[test]
    fn load_checkout_roundtrip() {
        let store = volatile_store();
        let snapshot = store.load(document(), "ds", None).unwrap();
        assert_eq!(snapshot.version, 0);

        let checked_out = store.checkout("ds", Some(snapshot.version)).unwrap();
        assert!(checked_out.document.same_content(&document()));
        assert_eq!(store.last_version("ds").unwrap(), 0);
    }

    #[test]
    fn load_rejects_duplicate_name() {
        let store = volatile_store();
        store.load(document(), "ds", None).unwrap();
        assert!(matches!(
            store.load(document(), "ds", None),
            Err(DatastoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn commit_appends_versions() {
        let store = volatile_store();
        store.load(document(), "ds", None).unwrap();
        let mut updated = document();
        updated.rows[0].values[1] = json!(12);
        let snapshot = store.commit(updated, "ds", None).unwrap();
        assert_eq!(snapshot.version, 1);
        assert_eq!(store.snapshots("ds").unwrap().len(), 2);
        // Earlier versions stay intact.
        assert_eq!(
            store.checkout("ds", Some(0)).unwrap().document.rows[0].values[1],
            json!(2)
        );
    }

    #[test]
    fn unknown_names_fail() {
        let store = volatile_store();
        assert!(matches!(
            store.checkout("nope", None),
            Err(DatastoreError::NotFound(_))
        ));
        assert!(matches!(
            store.commit(document(), "nope", None),
            Err(DatastoreError::NotFound(_))
        ));
        assert!(matches!(
            store.drop_dataset("nope"),
            Err(DatastoreError::NotFound(_))
        ));
        assert!(matches!(
            store.last_version("nope"),
            Err(DatastoreError::NotFound(_))
        ));
        assert!(matches!(
            store.snapshots("nope"),
            Err(DatastoreError::NotFound(_))
        ));
        assert!(matches!(
            store.metadata("nope", None),
            Err(DatastoreError::NotFound(_))
        ));
    }

    #[test]
    fn drop_removes_history_and_frees_name() {
        let store = volatile_store();
        store.load(document(), "ds", None).unwrap();
        store.drop_dataset("ds").unwrap();
        assert!(matches!(
            store.drop_dataset("ds"),
            Err(DatastoreError::NotFound(_))
        ));
        // The name can be reused for a fresh history.
        let snapshot = store.load(document(), "ds", None).unwrap();
        assert_eq!(snapshot.version, 0);
    }

    #[test]
    fn metadata_scoped_per_version() {
        let store = volatile_store();
        store.load(document(), "ds", None).unwrap();
        store
            .metadata("ds", None)
            .unwrap()
            .set_annotation("profile", json!({"rows": 2}), None, None)
            .unwrap();
        store.commit(document(), "ds", None).unwrap();
        // Latest is now version 1 with empty annotations.
        assert!(store
            .metadata("ds", None)
            .unwrap()
            .get_annotation("profile", None, None)
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .metadata("ds", Some(0))
                .unwrap()
                .get_annotation("profile", None, None)
                .unwrap(),
            Some(json!({"rows": 2}))
        );
        assert!(matches!(
            store.metadata("ds", Some(9)),
            Err(DatastoreError::UnknownVersion { version: 9, .. })
        ));
    }

    #[test]
    fn persistent_store_reopens() {
        use crate::archive::PersistentArchiveManager;

        let dir = tempdir().unwrap();
        {
            let manager = Arc::new(PersistentArchiveManager::new(dir.path()).unwrap());
            let store =
                ArchiveDatastore::open(manager, Some(dir.path().to_path_buf())).unwrap();
            store
                .load(document(), "ds", Some(vec!["A".to_string()]))
                .unwrap();
            store.commit(document(), "ds", None).unwrap();
            store
                .metadata("ds", Some(1))
                .unwrap()
                .set_annotation("checked", json!(true), None, None)
                .unwrap();
        }

        let manager = Arc::new(PersistentArchiveManager::new(dir.path()).unwrap());
        let store = ArchiveDatastore::open(manager, Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(store.dataset_names().unwrap(), vec!["ds".to_string()]);
        assert_eq!(store.last_version("ds").unwrap(), 1);
        assert_eq!(store.primary_key("ds").unwrap(), Some(vec!["A".to_string()]));
        assert_eq!(
            store
                .metadata("ds", Some(1))
                .unwrap()
                .get_annotation("checked", None, None)
                .unwrap(),
            Some(json!(true))
        );
    }

    #[test]
    fn drop_removes_persisted_annotations() {
        use crate::archive::PersistentArchiveManager;

        let dir = tempdir().unwrap();
        let manager = Arc::new(PersistentArchiveManager::new(dir.path()).unwrap());
        let store = ArchiveDatastore::open(manager, Some(dir.path().to_path_buf())).unwrap();
        store.load(document(), "ds", None).unwrap();
        store
            .metadata("ds", None)
            .unwrap()
            .set_annotation("k", json!(1), None, None)
            .unwrap();
        store.drop_dataset("ds").unwrap();

        // Only the archives directory remains under the base dir.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name() != "archives")
            .collect();
        assert!(leftovers.is_empty());
    }
}
