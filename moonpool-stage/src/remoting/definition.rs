//! Interface definitions built from explicitly registered typed thunks.
//!
//! There is no reflection to discover methods, so an interface definition is
//! a table from method name to a type-erased closure. Each closure:
//!
//! ```text
//! (Arc<dyn Any>, Vec<Value>)
//!   1. downcast the addressable to its concrete type
//!   2. decode the positional arguments into the method's tuple
//!   3. call the handler
//!   4. encode the return value back to a Value
//! ```

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::RemoteError;
use crate::net::{InterfaceId, MethodDescriptor};

/// A live addressable instance, type-erased.
pub type AnyAddressable = Arc<dyn Any + Send + Sync>;

type InvokeFuture = Pin<Box<dyn Future<Output = Result<Value, RemoteError>> + Send>>;

type InvokerFn = Arc<dyn Fn(AnyAddressable, Vec<Value>) -> InvokeFuture + Send + Sync>;

/// One invocable method of an interface.
#[derive(Clone)]
pub struct RemoteMethodDefinition {
    method: MethodDescriptor,
    invoker: InvokerFn,
}

impl RemoteMethodDefinition {
    /// The method this definition invokes.
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Call the method on `addressable` with positional `arguments`.
    pub async fn invoke(
        &self,
        addressable: AnyAddressable,
        arguments: Vec<Value>,
    ) -> Result<Value, RemoteError> {
        (self.invoker)(addressable, arguments).await
    }
}

impl fmt::Debug for RemoteMethodDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteMethodDefinition")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// The invocable surface of one interface.
///
/// # Example
///
/// ```rust,ignore
/// let id = InterfaceId::new("math.Calculator");
/// let definition = RemoteInterfaceDefinition::builder::<Calculator>(id)
///     .method("add", |calc: Arc<Calculator>, (a, b): (i64, i64)| async move {
///         Ok::<_, RemoteError>(calc.add(a, b))
///     })
///     .method("reset", |calc: Arc<Calculator>, (): ()| async move {
///         calc.reset();
///         Ok::<_, RemoteError>(())
///     })
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct RemoteInterfaceDefinition {
    interface: InterfaceId,
    method_definitions: HashMap<String, RemoteMethodDefinition>,
}

impl RemoteInterfaceDefinition {
    /// Start a definition for addressables of type `A`.
    pub fn builder<A>(interface: InterfaceId) -> RemoteInterfaceDefinitionBuilder<A>
    where
        A: Send + Sync + 'static,
    {
        RemoteInterfaceDefinitionBuilder {
            interface,
            method_definitions: HashMap::new(),
            _addressable: PhantomData,
        }
    }

    /// Interface this definition describes.
    pub fn interface(&self) -> &InterfaceId {
        &self.interface
    }

    /// Look up a method by name.
    pub fn method(&self, name: &str) -> Option<&RemoteMethodDefinition> {
        self.method_definitions.get(name)
    }

    /// All methods, keyed by name.
    pub fn method_definitions(&self) -> &HashMap<String, RemoteMethodDefinition> {
        &self.method_definitions
    }
}

/// Builder for [`RemoteInterfaceDefinition`].
pub struct RemoteInterfaceDefinitionBuilder<A> {
    interface: InterfaceId,
    method_definitions: HashMap<String, RemoteMethodDefinition>,
    _addressable: PhantomData<fn() -> A>,
}

impl<A> RemoteInterfaceDefinitionBuilder<A>
where
    A: Send + Sync + 'static,
{
    /// Register `handler` as method `name`.
    ///
    /// `Args` is the tuple of positional parameters (`()` for none). A method
    /// registered twice keeps the last handler.
    pub fn method<Args, Ret, F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        Args: DeserializeOwned + Send + 'static,
        Ret: Serialize + 'static,
        F: Fn(Arc<A>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Ret, RemoteError>> + Send + 'static,
    {
        let method = MethodDescriptor::new(self.interface.clone(), name);
        let label = method.to_string();
        let handler = Arc::new(handler);

        let invoke = move |addressable: AnyAddressable, arguments: Vec<Value>| {
            let handler = Arc::clone(&handler);
            let label = label.clone();
            Box::pin(async move {
                let addressable = addressable.downcast::<A>().map_err(|_| {
                    RemoteError::invocation(format!(
                        "{label} expects an addressable of type {}",
                        type_name::<A>()
                    ))
                })?;
                let args: Args = decode_arguments(&label, arguments)?;
                let ret = (*handler)(addressable, args).await?;
                serde_json::to_value(ret).map_err(|err| {
                    RemoteError::invocation(format!("failed to encode result of {label}: {err}"))
                })
            }) as InvokeFuture
        };
        let invoker: InvokerFn = Arc::new(invoke);

        tracing::trace!(method = %method, addressable = type_name::<A>(), "registering method");
        self.method_definitions
            .insert(name.to_string(), RemoteMethodDefinition { method, invoker });
        self
    }

    /// Finish the definition.
    pub fn build(self) -> RemoteInterfaceDefinition {
        RemoteInterfaceDefinition {
            interface: self.interface,
            method_definitions: self.method_definitions,
        }
    }
}

/// Decode positional arguments into the parameter tuple.
///
/// No arguments decode from `null`, so `()` accepts an empty list.
fn decode_arguments<Args: DeserializeOwned>(
    method: &str,
    arguments: Vec<Value>,
) -> Result<Args, RemoteError> {
    let value = if arguments.is_empty() {
        Value::Null
    } else {
        Value::Array(arguments)
    };
    serde_json::from_value(value).map_err(|err| RemoteError::InvalidArguments {
        method: method.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Counter {
        value: AtomicI64,
    }

    fn counter_definition() -> RemoteInterfaceDefinition {
        RemoteInterfaceDefinition::builder::<Counter>(InterfaceId::new("test.Counter"))
            .method("add", |counter: Arc<Counter>, (delta,): (i64,)| async move {
                Ok::<_, RemoteError>(counter.value.fetch_add(delta, Ordering::SeqCst) + delta)
            })
            .method("get", |counter: Arc<Counter>, (): ()| async move {
                Ok::<_, RemoteError>(counter.value.load(Ordering::SeqCst))
            })
            .method("fail", |_: Arc<Counter>, (): ()| async move {
                Err::<(), _>(RemoteError::invocation("counter exploded"))
            })
            .build()
    }

    #[tokio::test]
    async fn test_invoke_typed_method() {
        let definition = counter_definition();
        let counter: AnyAddressable = Arc::new(Counter::default());

        let add = definition.method("add").expect("add is defined");
        assert_eq!(add.method().name, "add");
        assert_eq!(
            add.invoke(counter.clone(), vec![json!(5)]).await,
            Ok(json!(5))
        );

        let get = definition.method("get").expect("get is defined");
        assert_eq!(get.invoke(counter, Vec::new()).await, Ok(json!(5)));
    }

    #[tokio::test]
    async fn test_wrong_arity_is_invalid_arguments() {
        let definition = counter_definition();
        let counter: AnyAddressable = Arc::new(Counter::default());
        let add = definition.method("add").expect("add is defined");

        let err = add.invoke(counter.clone(), Vec::new()).await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::InvalidArguments { ref method, .. } if method == "test.Counter::add"
        ));

        let err = add
            .invoke(counter, vec![json!("five")])
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_handler_error_is_returned() {
        let definition = counter_definition();
        let counter: AnyAddressable = Arc::new(Counter::default());

        let err = definition
            .method("fail")
            .expect("fail is defined")
            .invoke(counter, Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::Invocation("counter exploded".to_string()));
    }

    #[tokio::test]
    async fn test_wrong_addressable_type() {
        let definition = counter_definition();
        let not_a_counter: AnyAddressable = Arc::new("hello".to_string());

        let err = definition
            .method("get")
            .expect("get is defined")
            .invoke(not_a_counter, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Invocation(_)));
    }

    #[test]
    fn test_definition_lists_methods() {
        let definition = counter_definition();
        assert_eq!(definition.interface().as_str(), "test.Counter");
        assert_eq!(definition.method_definitions().len(), 3);
        assert!(definition.method("missing").is_none());
    }
}
