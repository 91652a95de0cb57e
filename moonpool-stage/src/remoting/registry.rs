//! Interface registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::net::InterfaceId;
use crate::stage::StageConfig;

use super::definition::RemoteInterfaceDefinition;

/// Interface definitions known to a node.
///
/// Filled once before the stage starts, then shared read-only.
/// Registration honours the configured packages: an interface outside every
/// configured package is refused.
#[derive(Debug)]
pub struct InterfaceRegistry {
    config: Arc<StageConfig>,
    definitions: HashMap<InterfaceId, Arc<RemoteInterfaceDefinition>>,
}

impl InterfaceRegistry {
    /// Create an empty registry scoped by `config`.
    pub fn new(config: Arc<StageConfig>) -> Self {
        Self {
            config,
            definitions: HashMap::new(),
        }
    }

    /// Add `definition`.
    pub fn register(&mut self, definition: RemoteInterfaceDefinition) -> Result<(), RegistryError> {
        let interface = definition.interface().clone();
        if !self.config.in_scope(&interface) {
            return Err(RegistryError::OutOfScope(interface.to_string()));
        }
        if self.definitions.contains_key(&interface) {
            return Err(RegistryError::AlreadyRegistered(interface.to_string()));
        }

        tracing::debug!(
            interface = %interface,
            methods = definition.method_definitions().len(),
            "registered interface"
        );
        self.definitions.insert(interface, Arc::new(definition));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, definition: RemoteInterfaceDefinition) -> Result<Self, RegistryError> {
        self.register(definition)?;
        Ok(self)
    }

    /// Definition for `interface`, if registered.
    pub fn get(&self, interface: &InterfaceId) -> Option<Arc<RemoteInterfaceDefinition>> {
        self.definitions.get(interface).cloned()
    }

    /// Registered interfaces.
    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceId> {
        self.definitions.keys()
    }

    /// Number of registered interfaces.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
