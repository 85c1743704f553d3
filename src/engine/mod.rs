mod base;
mod command;
mod registry;

pub use base::{create_engine, Engine, EngineConfig};
pub use command::{CommandRegistry, CommandSpec, DatasetOperations};
pub use registry::EngineRegistry;
