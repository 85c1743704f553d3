use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;

use super::command::{CommandRegistry, DatasetOperations};
use super::registry::EngineRegistry;
use crate::archive::{ArchiveManager, PersistentArchiveManager, VolatileArchiveManager};
use crate::datastore::{ArchiveDatastore, CachedDatastore, Datastore};
use crate::document::{DatasetSnapshot, Document, PrimaryKey, Row, SnapshotHandle};
use crate::error::DatastoreError;
use crate::ident::unique_identifier;
use crate::metadata::MetadataStore;

/// Configuration for a new engine instance.
pub struct EngineConfig {
    /// Base directory for archives and metadata. `None` keeps everything in
    /// memory for the lifetime of the process.
    pub basedir: Option<PathBuf>,
    /// Wipe the base directory before use instead of reopening existing
    /// datasets. Ignored in volatile mode.
    pub create: bool,
    /// Number of datasets the snapshot cache may hold. Zero disables caching.
    pub cache_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            basedir: None,
            create: false,
            cache_size: 1,
        }
    }
}

impl EngineConfig {
    pub fn persistent(basedir: impl Into<PathBuf>) -> Self {
        EngineConfig {
            basedir: Some(basedir.into()),
            ..Self::default()
        }
    }

    pub fn create_fresh(mut self) -> Self {
        self.create = true;
        self
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }
}

/// Session-scoped owner of a named collection of versioned datasets.
///
/// An engine wraps one cached datastore and a registry of transformation
/// commands. Most operations are thin delegations to the datastore; the
/// engine adds dataset sampling and command application on top.
pub struct Engine {
    identifier: String,
    store: CachedDatastore<ArchiveDatastore>,
    commands: CommandRegistry,
}

impl Engine {
    fn new(identifier: String, store: CachedDatastore<ArchiveDatastore>) -> Self {
        Engine {
            identifier,
            store,
            commands: CommandRegistry::default(),
        }
    }

    /// Process-wide unique identifier of this engine instance.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Create a new dataset from the given document. The document becomes
    /// version 0. Fails with `AlreadyExists` if the name is taken.
    pub fn create(
        &self,
        document: Document,
        name: &str,
        primary_key: Option<PrimaryKey>,
    ) -> Result<DatasetSnapshot, DatastoreError> {
        self.store.load(document, name, primary_key)
    }

    /// Synonym for `create`.
    pub fn load_dataset(
        &self,
        document: Document,
        name: &str,
        primary_key: Option<PrimaryKey>,
    ) -> Result<DatasetSnapshot, DatastoreError> {
        self.create(document, name, primary_key)
    }

    pub fn checkout(
        &self,
        name: &str,
        version: Option<u64>,
    ) -> Result<DatasetSnapshot, DatastoreError> {
        self.store.checkout(name, version)
    }

    pub fn commit(
        &self,
        document: Document,
        name: &str,
    ) -> Result<DatasetSnapshot, DatastoreError> {
        self.store.commit(document, name, None)
    }

    /// Delete the dataset's full history. Fails with `NotFound` if unknown.
    pub fn drop_dataset(&self, name: &str) -> Result<(), DatastoreError> {
        self.store.drop_dataset(name)
    }

    /// Snapshot handles for all versions of the dataset, in creation order.
    pub fn history(&self, name: &str) -> Result<Vec<SnapshotHandle>, DatastoreError> {
        self.store.snapshots(name)
    }

    pub fn last_version(&self, name: &str) -> Result<u64, DatastoreError> {
        self.store.last_version(name)
    }

    pub fn metadata(
        &self,
        name: &str,
        version: Option<u64>,
    ) -> Result<Arc<dyn MetadataStore>, DatastoreError> {
        self.store.metadata(name, version)
    }

    pub fn dataset_names(&self) -> Result<Vec<String>, DatastoreError> {
        self.store.inner().dataset_names()
    }

    /// Handle for running registered commands against one dataset. Each
    /// invocation produces exactly one new version.
    pub fn apply<'a>(
        &'a self,
        name: &'a str,
    ) -> DatasetOperations<'a, CachedDatastore<ArchiveDatastore>> {
        DatasetOperations::new(&self.store, &self.commands, name)
    }

    /// Register a bounded random sample of the latest snapshot of `name` as a
    /// brand-new dataset, decoupled from the source after creation. The
    /// sample inherits the source's primary key and gets a generated unique
    /// name. Returns that name and the sample's first snapshot.
    pub fn sample(
        &self,
        name: &str,
        n: usize,
        seed: Option<u64>,
    ) -> Result<(String, DatasetSnapshot), DatastoreError> {
        let snapshot = self.store.checkout(name, None)?;
        let primary_key = self.store.inner().primary_key(name)?;
        let source = snapshot.document;

        let rows: Vec<Row> = if n < source.rows.len() {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let mut picked = rand::seq::index::sample(&mut rng, source.rows.len(), n).into_vec();
            picked.sort_unstable();
            picked
                .into_iter()
                .map(|index| Row::new(source.rows[index].values.clone()))
                .collect()
        } else {
            source
                .rows
                .iter()
                .map(|row| Row::new(row.values.clone()))
                .collect()
        };
        let document = Document::new(source.columns, rows);

        let existing = self.dataset_names()?;
        let mut sample_name = unique_identifier(16);
        while existing.contains(&sample_name) {
            sample_name = unique_identifier(16);
        }
        let snapshot = self.store.load(document, &sample_name, primary_key)?;
        info!("sampled dataset '{}' into '{}'", name, sample_name);
        Ok((sample_name, snapshot))
    }
}

/// Create a new engine and register it with the given registry.
///
/// With a base directory the engine persists archives and metadata on the
/// file system and reopens datasets that already exist there; without one
/// everything lives in memory. `create` wipes the base directory first.
pub fn create_engine(
    config: EngineConfig,
    registry: &EngineRegistry,
) -> Result<Arc<Engine>, DatastoreError> {
    let (manager, basedir): (Arc<dyn ArchiveManager>, Option<PathBuf>) = match config.basedir {
        Some(basedir) => {
            if config.create && basedir.exists() {
                fs::remove_dir_all(&basedir)?;
            }
            fs::create_dir_all(&basedir)?;
            (
                Arc::new(PersistentArchiveManager::new(&basedir)?),
                Some(basedir),
            )
        }
        None => (Arc::new(VolatileArchiveManager::new()), None),
    };
    let store = ArchiveDatastore::open(manager, basedir)?;
    let cached = CachedDatastore::with_cache_size(store, config.cache_size);
    registry.register(|identifier| Ok(Arc::new(Engine::new(identifier, cached))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Document {
        Document::from_values(
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            vec![
                vec![json!(1), json!(2), json!(3)],
                vec![json!(3), json!(4), json!(5)],
                vec![json!(5), json!(6), json!(7)],
                vec![json!(7), json!(8), json!(9)],
            ],
        )
    }

    fn engine() -> Arc<Engine> {
        let registry = EngineRegistry::new();
        create_engine(EngineConfig::default(), &registry).unwrap()
    }

    #[test]
    fn create_checkout_commit_drop() {
        let engine = engine();
        let snapshot = engine.create(document(), "ds", None).unwrap();
        assert_eq!(snapshot.version, 0);
        assert!(matches!(
            engine.create(document(), "ds", None),
            Err(DatastoreError::AlreadyExists(_))
        ));

        engine.commit(document(), "ds").unwrap();
        assert_eq!(engine.history("ds").unwrap().len(), 2);
        assert_eq!(engine.last_version("ds").unwrap(), 1);
        assert_eq!(engine.checkout("ds", Some(0)).unwrap().version, 0);

        engine.drop_dataset("ds").unwrap();
        assert!(matches!(
            engine.checkout("ds", None),
            Err(DatastoreError::NotFound(_))
        ));
    }

    #[test]
    fn sample_is_new_decoupled_dataset() {
        let engine = engine();
        engine
            .create(document(), "ds", Some(vec!["A".to_string()]))
            .unwrap();

        let (sample_name, sample) = engine.sample("ds", 2, Some(7)).unwrap();
        assert_ne!(sample_name, "ds");
        assert_eq!(sample.version, 0);
        assert_eq!(sample.document.rows.len(), 2);
        assert_eq!(sample.document.columns, document().columns);

        // Mutating the sample leaves the source untouched.
        engine
            .apply(&sample_name)
            .update_with(&["B"], "add10", |values| {
                json!(values[0].as_i64().unwrap_or(0) + 10)
            })
            .unwrap();
        assert_eq!(engine.last_version(&sample_name).unwrap(), 1);
        assert_eq!(engine.last_version("ds").unwrap(), 0);
        assert!(engine
            .checkout("ds", None)
            .unwrap()
            .document
            .same_content(&engine.checkout("ds", Some(0)).unwrap().document));
    }

    #[test]
    fn sample_larger_than_dataset_keeps_all_rows() {
        let engine = engine();
        engine.create(document(), "ds", None).unwrap();
        let (_, sample) = engine.sample("ds", 100, None).unwrap();
        assert_eq!(sample.document.rows.len(), 4);
    }

    #[test]
    fn sample_of_unknown_dataset_fails() {
        let engine = engine();
        assert!(matches!(
            engine.sample("nope", 2, None),
            Err(DatastoreError::NotFound(_))
        ));
    }
}
