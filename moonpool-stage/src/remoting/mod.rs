//! Remote interfaces: definitions, registry and dispatch.
//!
//! ```text
//! Invocation ──▶ InvocationDispatcher
//!                  ├─ InterfaceRegistry      interface → definition
//!                  ├─ definition.method()    name → typed thunk
//!                  ├─ AddressableResolver    reference → instance
//!                  └─ thunk(instance, args)  → Result<Value, RemoteError>
//! ```

mod definition;
mod dispatch;
mod registry;

pub use definition::{
    AnyAddressable, RemoteInterfaceDefinition, RemoteInterfaceDefinitionBuilder,
    RemoteMethodDefinition,
};
pub use dispatch::{AddressableResolver, InMemoryAddressables, InvocationDispatcher};
pub use registry::InterfaceRegistry;
