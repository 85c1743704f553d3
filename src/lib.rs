//! Versioned tabular dataset store with bounded in-memory snapshot caching.
//!
//! Datasets are named, independently versioned document histories persisted
//! by an append-only archive. The [`Datastore`] trait is the seam: the
//! [`ArchiveDatastore`] implementation persists against an archive manager,
//! and [`CachedDatastore`] decorates any implementation with an at-most-N
//! dataset memory cache with least-recently-inserted eviction. The engine
//! layer owns one cached store per interactive session and adds dataset
//! sampling and command application.

mod archive;
mod datastore;
mod document;
mod engine;
mod error;
mod ident;
mod metadata;

pub use archive::{
    Archive, ArchiveDescriptor, ArchiveManager, PersistentArchiveManager, VolatileArchiveManager,
};
pub use datastore::{ArchiveDatastore, CacheEntry, CachedDatastore, Datastore};
pub use document::{
    DatasetSnapshot, Document, PrimaryKey, Row, SnapshotHandle, UNASSIGNED_ROW_ID,
};
pub use engine::{
    create_engine, CommandRegistry, CommandSpec, DatasetOperations, Engine, EngineConfig,
    EngineRegistry,
};
pub use error::DatastoreError;
pub use metadata::{
    FileSystemMetadataStore, FileSystemMetadataStoreFactory, MetadataStore, MetadataStoreFactory,
    VolatileMetadataStore, VolatileMetadataStoreFactory,
};
