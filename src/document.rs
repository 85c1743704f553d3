use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Row identifier placeholder for rows that have not been through a commit
/// yet. The archive assigns real identifiers at commit time.
pub const UNASSIGNED_ROW_ID: i64 = -1;

/// One row of a tabular document: an archive-assigned identifier plus one
/// value per column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: i64,
    pub values: Vec<Value>,
}

impl Row {
    /// A fresh row whose identifier will be assigned at commit time.
    pub fn new(values: Vec<Value>) -> Self {
        Row {
            id: UNASSIGNED_ROW_ID,
            values,
        }
    }
}

/// A tabular document: ordered column names and rows of values.
///
/// Documents are plain values. The datastore never interprets cell contents;
/// transformations happen outside and produce a new document to commit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Document {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Document { columns, rows }
    }

    /// Build a document from raw cell values, leaving row ids unassigned.
    pub fn from_values(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Document {
            columns,
            rows: rows.into_iter().map(Row::new).collect(),
        }
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Cell values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<Value>> {
        let index = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.values[index].clone())
                .collect(),
        )
    }

    /// Content equality that ignores archive-assigned row identifiers.
    pub fn same_content(&self, other: &Document) -> bool {
        self.columns == other.columns
            && self.rows.len() == other.rows.len()
            && self
                .rows
                .iter()
                .zip(other.rows.iter())
                .all(|(a, b)| a.values == b.values)
    }
}

/// Column(s) used by the archive to derive stable row identifiers across
/// versions. Opaque to the datastore core.
pub type PrimaryKey = Vec<String>;

/// Descriptor for one committed version of a dataset. Versions are strictly
/// increasing per dataset and assigned by the archive at commit time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHandle {
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

/// A checked-out dataset snapshot. This is a value, not an identity: two
/// checkouts of the same version may be distinct in-memory copies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    pub document: Document,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl DatasetSnapshot {
    pub fn handle(&self) -> SnapshotHandle {
        SnapshotHandle {
            version: self.version,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Document {
        Document::from_values(
            vec!["A".to_string(), "B".to_string()],
            vec![vec![json!(1), json!("x")], vec![json!(2), json!("y")]],
        )
    }

    #[test]
    fn column_lookup() {
        let document = doc();
        assert_eq!(document.column_index("B"), Some(1));
        assert_eq!(document.column_index("C"), None);
        assert_eq!(
            document.column_values("A").unwrap(),
            vec![json!(1), json!(2)]
        );
    }

    #[test]
    fn content_equality_ignores_row_ids() {
        let a = doc();
        let mut b = doc();
        b.rows[0].id = 17;
        b.rows[1].id = 42;
        assert!(a.same_content(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn content_inequality_on_values() {
        let a = doc();
        let mut b = doc();
        b.rows[1].values[1] = json!("z");
        assert!(!a.same_content(&b));
    }
}
