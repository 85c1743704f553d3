mod fs;
mod manager;
mod mem;

pub use fs::PersistentArchiveManager;
pub use manager::{Archive, ArchiveDescriptor, ArchiveManager, RowKeyState, VersionRecord};
pub use mem::VolatileArchiveManager;
