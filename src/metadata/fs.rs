use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::store::{MetadataStore, MetadataStoreFactory};
use crate::error::DatastoreError;

/// Annotation store that keeps one JSON object file per scope inside a base
/// directory:
///
/// - `ds.json` for dataset annotations
/// - `col_{column_id}.json` for column annotations
/// - `row_{row_id}.json` for row annotations
/// - `cell_{column_id}_{row_id}.json` for cell annotations
pub struct FileSystemMetadataStore {
    basedir: PathBuf,
}

fn scope_file(column_id: Option<i64>, row_id: Option<i64>) -> String {
    match (column_id, row_id) {
        (None, None) => "ds.json".to_string(),
        (Some(column), None) => format!("col_{}.json", column),
        (None, Some(row)) => format!("row_{}.json", row),
        (Some(column), Some(row)) => format!("cell_{}_{}.json", column, row),
    }
}

impl FileSystemMetadataStore {
    /// Create a store rooted at the given directory. The directory is created
    /// if it does not exist.
    pub fn new(basedir: impl Into<PathBuf>) -> Result<Self, DatastoreError> {
        let basedir = basedir.into();
        fs::create_dir_all(&basedir)?;
        Ok(FileSystemMetadataStore { basedir })
    }

    fn read(
        &self,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<Map<String, Value>, DatastoreError> {
        let path = self.basedir.join(scope_file(column_id, row_id));
        if !path.exists() {
            return Ok(Map::new());
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    fn write(
        &self,
        doc: &Map<String, Value>,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<(), DatastoreError> {
        let path = self.basedir.join(scope_file(column_id, row_id));
        fs::write(path, serde_json::to_string_pretty(doc)?)?;
        Ok(())
    }
}

impl MetadataStore for FileSystemMetadataStore {
    fn get_annotation(
        &self,
        key: &str,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<Option<Value>, DatastoreError> {
        Ok(self.read(column_id, row_id)?.get(key).cloned())
    }

    fn set_annotation(
        &self,
        key: &str,
        value: Value,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<(), DatastoreError> {
        let mut doc = self.read(column_id, row_id)?;
        doc.insert(key.to_string(), value);
        self.write(&doc, column_id, row_id)
    }

    fn has_annotation(
        &self,
        key: &str,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<bool, DatastoreError> {
        Ok(self.read(column_id, row_id)?.contains_key(key))
    }

    fn delete_annotation(
        &self,
        key: &str,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<bool, DatastoreError> {
        let mut doc = self.read(column_id, row_id)?;
        let existed = doc.remove(key).is_some();
        if existed {
            self.write(&doc, column_id, row_id)?;
        }
        Ok(existed)
    }

    fn list_annotations(
        &self,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<Map<String, Value>, DatastoreError> {
        self.read(column_id, row_id)
    }
}

/// Factory rooting annotation stores at `<basedir>/<version>`, where basedir
/// is keyed by archive identifier by the owning datastore.
pub struct FileSystemMetadataStoreFactory {
    basedir: PathBuf,
}

impl FileSystemMetadataStoreFactory {
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        FileSystemMetadataStoreFactory {
            basedir: basedir.into(),
        }
    }
}

impl MetadataStoreFactory for FileSystemMetadataStoreFactory {
    fn for_version(&self, version: u64) -> Result<Arc<dyn MetadataStore>, DatastoreError> {
        let store = FileSystemMetadataStore::new(self.basedir.join(version.to_string()))?;
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn scope_file_names() {
        assert_eq!(scope_file(None, None), "ds.json");
        assert_eq!(scope_file(Some(2), None), "col_2.json");
        assert_eq!(scope_file(None, Some(7)), "row_7.json");
        assert_eq!(scope_file(Some(2), Some(7)), "cell_2_7.json");
    }

    #[test]
    fn annotations_persist_across_instances() {
        let dir = tempdir().unwrap();
        {
            let store = FileSystemMetadataStore::new(dir.path()).unwrap();
            store.set_annotation("type", json!("int"), Some(1), None).unwrap();
            store
                .set_annotation("note", json!("outlier"), Some(1), Some(3))
                .unwrap();
        }
        let store = FileSystemMetadataStore::new(dir.path()).unwrap();
        assert_eq!(
            store.get_annotation("type", Some(1), None).unwrap(),
            Some(json!("int"))
        );
        assert_eq!(
            store.get_annotation("note", Some(1), Some(3)).unwrap(),
            Some(json!("outlier"))
        );
        assert!(dir.path().join("col_1.json").exists());
        assert!(dir.path().join("cell_1_3.json").exists());
    }

    #[test]
    fn missing_scope_reads_empty() {
        let dir = tempdir().unwrap();
        let store = FileSystemMetadataStore::new(dir.path()).unwrap();
        assert!(store.list_annotations(None, Some(9)).unwrap().is_empty());
        assert!(!store.has_annotation("x", None, Some(9)).unwrap());
        assert!(!store.delete_annotation("x", None, Some(9)).unwrap());
    }

    #[test]
    fn factory_scopes_by_version() {
        let dir = tempdir().unwrap();
        let factory = FileSystemMetadataStoreFactory::new(dir.path());
        factory
            .for_version(0)
            .unwrap()
            .set_annotation("k", json!(1), None, None)
            .unwrap();
        assert!(factory
            .for_version(1)
            .unwrap()
            .get_annotation("k", None, None)
            .unwrap()
            .is_none());
        assert!(dir.path().join("0").join("ds.json").exists());
    }
}
