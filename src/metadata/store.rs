use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::DatastoreError;

/// Key/value annotation store scoped to one dataset version.
///
/// Annotations attach to one of four scopes, selected by the optional column
/// and row identifiers: both unset addresses the dataset itself, column only
/// addresses one column, row only addresses one row, and both together
/// address a single cell. Metadata for version N is wholly independent of
/// version N + 1.
pub trait MetadataStore: Send + Sync {
    /// Annotation value for the given key, or `None` if the key is not set
    /// for the addressed scope.
    fn get_annotation(
        &self,
        key: &str,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<Option<Value>, DatastoreError>;

    /// Set (or overwrite) the annotation value for the given key.
    fn set_annotation(
        &self,
        key: &str,
        value: Value,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<(), DatastoreError>;

    fn has_annotation(
        &self,
        key: &str,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<bool, DatastoreError>;

    /// Delete the annotation with the given key. Returns true if one existed.
    fn delete_annotation(
        &self,
        key: &str,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<bool, DatastoreError>;

    /// All annotations for the addressed scope.
    fn list_annotations(
        &self,
        column_id: Option<i64>,
        row_id: Option<i64>,
    ) -> Result<Map<String, Value>, DatastoreError>;
}

/// Factory that yields the annotation store for one version of one dataset.
/// The store for an existing version never fails to resolve; it starts empty.
pub trait MetadataStoreFactory: Send + Sync {
    fn for_version(&self, version: u64) -> Result<Arc<dyn MetadataStore>, DatastoreError>;
}
