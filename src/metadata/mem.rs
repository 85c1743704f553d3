use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

use super::store::{MetadataStore, MetadataStoreFactory};
use crate::error::DatastoreError;

type Scope = (Option<i64>, Option<i64>);

/// In-memory annotation store. Lost on process exit.
///
/// Clone-friendly (cloning shares the same underlying storage).
#[derive(Clone)]
pub struct VolatileMetadataStore {
    storage: Arc<RwLock<HashMap<Scope, Map<String, Value>>>>,
}

impl Default for VolatileMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VolatileMetadataStore {
    pub fn new() -> Self {
        VolatileMetadataStore {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl MetadataStore for VolatileMetadataStore {
    fn get_annotation(
        &self,
        key: &str,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<Option<Value>, DatastoreError> {
        let storage = self
            .storage
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("metadata read"))?;
        Ok(storage
            .get(&(column_id, row_id))
            .and_then(|doc| doc.get(key).cloned()))
    }

    fn set_annotation(
        &self,
        key: &str,
        value: Value,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<(), DatastoreError> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| DatastoreError::LockPoisoned("metadata write"))?;
        storage
            .entry((column_id, row_id))
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn has_annotation(
        &self,
        key: &str,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<bool, DatastoreError> {
        Ok(self.get_annotation(key, column_id, row_id)?.is_some())
    }

    fn delete_annotation(
        &self,
        key: &str,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<bool, DatastoreError> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| DatastoreError::LockPoisoned("metadata write"))?;
        Ok(storage
            .get_mut(&(column_id, row_id))
            .map(|doc| doc.remove(key).is_some())
            .unwrap_or(false))
    }

    fn list_annotations(
        &self,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<Map<String, Value>, DatastoreError> {
        let storage = self
            .storage
            .read()
            .map_err(|_| DatastoreError::LockPoisoned("metadata read"))?;
        Ok(storage.get(&(column_id, row_id)).cloned().unwrap_or_default())
    }
}

/// Factory that keeps one volatile store per dataset version for the process
/// lifetime.
pub struct VolatileMetadataStoreFactory {
    stores: RwLock<HashMap<u64, Arc<VolatileMetadataStore>>>,
}

impl Default for VolatileMetadataStoreFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl VolatileMetadataStoreFactory {
    pub fn new() -> Self {
        VolatileMetadataStoreFactory {
            stores: RwLock::new(HashMap::new()),
        }
    }
}

impl MetadataStoreFactory for VolatileMetadataStoreFactory {
    fn for_version(&self, version: u64) -> Result<Arc<dyn MetadataStore>, DatastoreError> {
        let mut stores = self
            .stores
            .write()
            .map_err(|_| DatastoreError::LockPoisoned("metadata factory"))?;
        Ok(stores
            .entry(version)
            .or_insert_with(|| Arc::new(VolatileMetadataStore::new()))
            .clone() as Arc<dyn MetadataStore>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_and_get_per_scope() {
        let store = VolatileMetadataStore::new();
        store.set_annotation("type", json!("int"), Some(1), None).unwrap();
        store.set_annotation("type", json!("str"), None, None).unwrap();

        assert_eq!(
            store.get_annotation("type", Some(1), None).unwrap(),
            Some(json!("int"))
        );
        assert_eq!(
            store.get_annotation("type", None, None).unwrap(),
            Some(json!("str"))
        );
        assert_eq!(store.get_annotation("type", None, Some(1)).unwrap(), None);
        assert_eq!(store.get_annotation("type", Some(1), Some(1)).unwrap(), None);
    }

    #[test]
    fn has_delete_list() {
        let store = VolatileMetadataStore::new();
        store.set_annotation("a", json!(1), None, Some(3)).unwrap();
        store.set_annotation("b", json!(2), None, Some(3)).unwrap();

        assert!(store.has_annotation("a", None, Some(3)).unwrap());
        assert_eq!(store.list_annotations(None, Some(3)).unwrap().len(), 2);
        assert!(store.delete_annotation("a", None, Some(3)).unwrap());
        assert!(!store.delete_annotation("a", None, Some(3)).unwrap());
        assert!(!store.has_annotation("a", None, Some(3)).unwrap());
        assert_eq!(store.list_annotations(None, Some(3)).unwrap().len(), 1);
    }

    #[test]
    fn factory_isolates_versions() {
        let factory = VolatileMetadataStoreFactory::new();
        factory
            .for_version(0)
            .unwrap()
            .set_annotation("profile", json!({"rows": 4}), None, None)
            .unwrap();

        assert!(factory
            .for_version(1)
            .unwrap()
            .get_annotation("profile", None, None)
            .unwrap()
            .is_none());
        // Same version resolves to the same underlying store.
        assert_eq!(
            factory
                .for_version(0)
                .unwrap()
                .get_annotation("profile", None, None)
                .unwrap(),
            Some(json!({"rows": 4}))
        );
    }
}
