use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::info;

use super::base::Engine;
use crate::error::DatastoreError;
use crate::ident::unique_identifier;

/// Process-wide registry of engine instances.
///
/// Created once at process start and passed by reference; stateless request
/// handlers look the right engine up per request by its identifier. Entries
/// are inserted on engine construction and never implicitly removed. The
/// registry is the single source of truth for which identifiers are taken, so
/// identifier generation retries against it under the lock.
pub struct EngineRegistry {
    engines: Mutex<HashMap<String, Arc<Engine>>>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineRegistry {
    pub fn new() -> Self {
        EngineRegistry {
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new engine. The registry picks a free identifier and hands
    /// it to the constructor closure.
    pub fn register<F>(&self, build: F) -> Result<Arc<Engine>, DatastoreError>
    where
        F: FnOnce(String) -> Result<Arc<Engine>, DatastoreError>,
    {
        let mut engines = self
            .engines
            .lock()
            .map_err(|_| DatastoreError::LockPoisoned("engine registry"))?;
        let mut identifier = unique_identifier(8);
        while engines.contains_key(&identifier) {
            identifier = unique_identifier(8);
        }
        let engine = build(identifier.clone())?;
        engines.insert(identifier.clone(), engine.clone());
        info!("registered engine {}", identifier);
        Ok(engine)
    }

    /// Look an engine up by its identifier.
    pub fn get(&self, identifier: &str) -> Result<Arc<Engine>, DatastoreError> {
        let engines = self
            .engines
            .lock()
            .map_err(|_| DatastoreError::LockPoisoned("engine registry"))?;
        engines
            .get(identifier)
            .cloned()
            .ok_or_else(|| DatastoreError::NotFound(identifier.to_string()))
    }

    pub fn identifiers(&self) -> Result<Vec<String>, DatastoreError> {
        let engines = self
            .engines
            .lock()
            .map_err(|_| DatastoreError::LockPoisoned("engine registry"))?;
        Ok(engines.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::base::{create_engine, EngineConfig};

    #[test]
    fn register_and_lookup() {
        let registry = EngineRegistry::new();
        let engine = create_engine(EngineConfig::default(), &registry).unwrap();
        let found = registry.get(engine.identifier()).unwrap();
        assert_eq!(found.identifier(), engine.identifier());
        assert_eq!(registry.identifiers().unwrap().len(), 1);
    }

    #[test]
    fn unknown_identifier() {
        let registry = EngineRegistry::new();
        assert!(matches!(
            registry.get("deadbeef"),
            Err(DatastoreError::NotFound(_))
        ));
    }

    #[test]
    fn engines_get_distinct_identifiers() {
        let registry = EngineRegistry::new();
        let first = create_engine(EngineConfig::default(), &registry).unwrap();
        let second = create_engine(EngineConfig::default(), &registry).unwrap();
        assert_ne!(first.identifier(), second.identifier());
        assert_eq!(registry.identifiers().unwrap().len(), 2);
    }
}
