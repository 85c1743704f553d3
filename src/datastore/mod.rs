mod archive_store;
mod cache;
mod store;

pub use archive_store::ArchiveDatastore;
pub use cache::{CacheEntry, CachedDatastore};
pub use store::Datastore;
