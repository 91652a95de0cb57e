//! Invocation dispatch.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::RemoteError;
use crate::net::{AddressableReference, Invocation};
use crate::pipeline::Dispatcher;

use super::definition::AnyAddressable;
use super::registry::InterfaceRegistry;

/// Finds the live instance behind an addressable reference.
pub trait AddressableResolver: Send + Sync {
    /// The instance for `reference`, or
    /// [`RemoteError::AddressableNotFound`].
    fn resolve(&self, reference: &AddressableReference) -> Result<AnyAddressable, RemoteError>;
}

/// Keyed in-memory store of addressable instances.
#[derive(Default)]
pub struct InMemoryAddressables {
    instances: RwLock<HashMap<AddressableReference, AnyAddressable>>,
}

impl InMemoryAddressables {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `instance` under `reference`, returning the previous one.
    pub fn insert<A>(
        &self,
        reference: AddressableReference,
        instance: Arc<A>,
    ) -> Option<AnyAddressable>
    where
        A: Any + Send + Sync,
    {
        tracing::debug!(addressable = %reference, "addressable registered");
        self.instances.write().insert(reference, instance)
    }

    /// Remove the instance under `reference`.
    pub fn remove(&self, reference: &AddressableReference) -> Option<AnyAddressable> {
        self.instances.write().remove(reference)
    }

    /// True when an instance is stored under `reference`.
    pub fn contains(&self, reference: &AddressableReference) -> bool {
        self.instances.read().contains_key(reference)
    }

    /// Number of stored instances.
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    /// True when the store is empty.
    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}

impl AddressableResolver for InMemoryAddressables {
    fn resolve(&self, reference: &AddressableReference) -> Result<AnyAddressable, RemoteError> {
        self.instances
            .read()
            .get(reference)
            .cloned()
            .ok_or_else(|| RemoteError::AddressableNotFound(reference.to_string()))
    }
}

impl std::fmt::Debug for InMemoryAddressables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAddressables")
            .field("instances", &self.len())
            .finish()
    }
}

/// [`Dispatcher`] backed by an [`InterfaceRegistry`] and an
/// [`AddressableResolver`].
///
/// Lookups happen in order: interface, method, instance. The first miss is
/// the error the caller sees.
pub struct InvocationDispatcher {
    registry: Arc<InterfaceRegistry>,
    resolver: Arc<dyn AddressableResolver>,
}

impl InvocationDispatcher {
    /// Create a dispatcher.
    pub fn new(registry: Arc<InterfaceRegistry>, resolver: Arc<dyn AddressableResolver>) -> Self {
        Self { registry, resolver }
    }
}

#[async_trait]
impl Dispatcher for InvocationDispatcher {
    async fn dispatch(&self, invocation: &Invocation) -> Result<Value, RemoteError> {
        let target = &invocation.target;
        let definition = self
            .registry
            .get(&target.interface)
            .ok_or_else(|| RemoteError::UnknownInterface(target.interface.to_string()))?;

        let unknown_method = || RemoteError::UnknownMethod {
            interface: target.interface.to_string(),
            method: invocation.method.name.clone(),
        };
        if invocation.method.interface != target.interface {
            return Err(unknown_method());
        }
        let method = definition
            .method(&invocation.method.name)
            .ok_or_else(unknown_method)?;

        let addressable = self.resolver.resolve(target)?;

        tracing::debug!(addressable = %target, method = %method.method(), "invoking");
        let result = method
            .invoke(addressable, invocation.arguments.clone())
            .await;
        if let Err(err) = &result {
            tracing::debug!(
                addressable = %target,
                method = %method.method(),
                error = %err,
                "invocation failed"
            );
        }
        result
    }
}

impl std::fmt::Debug for InvocationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationDispatcher")
            .field("interfaces", &self.registry.len())
            .finish_non_exhaustive()
    }
}
