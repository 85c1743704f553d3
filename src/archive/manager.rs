use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{DatasetSnapshot, Document, PrimaryKey, SnapshotHandle};
use crate::error::DatastoreError;

/// Descriptor for an archive that is maintained by an archive manager.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveDescriptor {
    pub identifier: String,
    pub name: String,
    pub primary_key: Option<PrimaryKey>,
}

/// One committed version of a dataset as stored by an archive: the snapshot
/// descriptor, the optional provenance action, and the document itself. The
/// action is kept verbatim for audit and never interpreted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionRecord {
    pub handle: SnapshotHandle,
    pub action: Option<Value>,
    pub document: Document,
}

/// Append-only version history for a single dataset.
///
/// Archives assign version numbers monotonically from zero at commit time and
/// stamp each version with its creation time. Callers never invent version
/// numbers.
pub trait Archive: Send + Sync {
    /// Append a new version built from the given document. Row identifiers
    /// are assigned by the archive before the document is stored.
    fn commit(
        &self,
        document: Document,
        action: Option<Value>,
    ) -> Result<DatasetSnapshot, DatastoreError>;

    /// Retrieve the document for the given version, or the latest version if
    /// none is given.
    fn checkout(&self, version: Option<u64>) -> Result<DatasetSnapshot, DatastoreError>;

    /// Descriptors for all versions, in creation order.
    fn snapshots(&self) -> Result<Vec<SnapshotHandle>, DatastoreError>;

    /// Highest existing version number, or `None` for an empty archive.
    fn last_version(&self) -> Result<Option<u64>, DatastoreError>;
}

/// Factory and lifecycle manager for a collection of archives.
pub trait ArchiveManager: Send + Sync {
    /// Create a new empty archive. The manager assigns a unique identifier.
    fn create(
        &self,
        name: &str,
        primary_key: Option<PrimaryKey>,
    ) -> Result<ArchiveDescriptor, DatastoreError>;

    /// Get a handle for the archive with the given identifier.
    fn get(&self, identifier: &str) -> Result<Arc<dyn Archive>, DatastoreError>;

    /// Delete the archive and all its versions.
    fn delete(&self, identifier: &str) -> Result<(), DatastoreError>;

    /// Descriptors for all archives the manager maintains.
    fn list(&self) -> Result<Vec<ArchiveDescriptor>, DatastoreError>;
}

/// Row-identity state for one archive.
///
/// With a primary key, the key tuple of a row maps to a stable identifier
/// that is reused whenever the same key appears in a later version. Without
/// one, row identity is positional.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RowKeyState {
    next_id: i64,
    keys: HashMap<String, i64>,
}

impl RowKeyState {
    /// Assign identifiers to every row of the document.
    pub fn assign(
        &mut self,
        document: &mut Document,
        primary_key: Option<&PrimaryKey>,
    ) -> Result<(), DatastoreError> {
        let key_columns = match primary_key {
            Some(columns) if !columns.is_empty() => columns,
            _ => {
                for (position, row) in document.rows.iter_mut().enumerate() {
                    row.id = position as i64;
                }
                return Ok(());
            }
        };
        let mut indexes = Vec::with_capacity(key_columns.len());
        for column in key_columns {
            let index = document.column_index(column).ok_or_else(|| {
                DatastoreError::InvalidArgument(format!(
                    "primary key column '{}' not in document",
                    column
                ))
            })?;
            indexes.push(index);
        }
        for row in &mut document.rows {
            let key_values: Vec<&Value> = indexes.iter().map(|i| &row.values[*i]).collect();
            let key = serde_json::to_string(&key_values)?;
            let id = match self.keys.get(&key) {
                Some(existing) => *existing,
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.keys.insert(key, id);
                    id
                }
            };
            row.id = id;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(rows: Vec<Vec<Value>>) -> Document {
        Document::from_values(vec!["A".to_string(), "B".to_string()], rows)
    }

    #[test]
    fn positional_ids_without_key() {
        let mut state = RowKeyState::default();
        let mut document = doc(vec![vec![json!(1), json!(2)], vec![json!(3), json!(4)]]);
        state.assign(&mut document, None).unwrap();
        assert_eq!(document.rows[0].id, 0);
        assert_eq!(document.rows[1].id, 1);
    }

    #[test]
    fn key_ids_stable_across_versions() {
        let key = Some(vec!["A".to_string()]);
        let mut state = RowKeyState::default();
        let mut first = doc(vec![vec![json!(1), json!(2)], vec![json!(3), json!(4)]]);
        state.assign(&mut first, key.as_ref()).unwrap();

        // Same keys in reverse order plus one new key.
        let mut second = doc(vec![
            vec![json!(3), json!(40)],
            vec![json!(1), json!(20)],
            vec![json!(5), json!(6)],
        ]);
        state.assign(&mut second, key.as_ref()).unwrap();
        assert_eq!(second.rows[0].id, first.rows[1].id);
        assert_eq!(second.rows[1].id, first.rows[0].id);
        assert_eq!(second.rows[2].id, 2);
    }

    #[test]
    fn missing_key_column_is_rejected() {
        let key = Some(vec!["Z".to_string()]);
        let mut state = RowKeyState::default();
        let mut document = doc(vec![vec![json!(1), json!(2)]]);
        let err = state.assign(&mut document, key.as_ref()).unwrap_err();
        assert!(matches!(err, DatastoreError::InvalidArgument(_)));
    }
}
