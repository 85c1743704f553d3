mod fs;
mod mem;
mod store;

pub use fs::{FileSystemMetadataStore, FileSystemMetadataStoreFactory};
pub use mem::{VolatileMetadataStore, VolatileMetadataStoreFactory};
pub use store::{MetadataStore, MetadataStoreFactory};
