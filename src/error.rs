use std::fmt;

/// Errors surfaced by datastores, archives, metadata stores, and the engine
/// layer. None of these are retried automatically; the backing storage is
/// treated as local and reliable.
#[derive(Debug)]
pub enum DatastoreError {
    /// A dataset is being created under a name that is already registered.
    AlreadyExists(String),
    /// An unknown dataset name or engine identifier was referenced.
    NotFound(String),
    /// A version number that does not exist in the dataset's history.
    UnknownVersion { name: String, version: u64 },
    /// Malformed command or locator arguments at the engine layer.
    InvalidArgument(String),
    LockPoisoned(&'static str),
    /// I/O or serialization failure in the durable layer.
    Storage(String),
}

impl fmt::Display for DatastoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatastoreError::AlreadyExists(name) => {
                write!(f, "dataset '{}' already exists", name)
            }
            DatastoreError::NotFound(name) => write!(f, "unknown dataset '{}'", name),
            DatastoreError::UnknownVersion { name, version } => {
                write!(f, "unknown version {} for dataset '{}'", version, name)
            }
            DatastoreError::InvalidArgument(message) => {
                write!(f, "invalid argument: {}", message)
            }
            DatastoreError::LockPoisoned(operation) => {
                write!(f, "store lock poisoned during {}", operation)
            }
            DatastoreError::Storage(message) => write!(f, "storage error: {}", message),
        }
    }
}

impl std::error::Error for DatastoreError {}

impl From<std::io::Error> for DatastoreError {
    fn from(err: std::io::Error) -> Self {
        DatastoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for DatastoreError {
    fn from(err: serde_json::Error) -> Self {
        DatastoreError::Storage(err.to_string())
    }
}
