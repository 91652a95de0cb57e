//! # moonpool-stage
//!
//! Message pipeline and request/response correlation for a cluster of
//! location-transparent addressables.
//!
//! Every message a node sends or receives goes through one ordered chain of
//! [`PipelineStep`]s. A step may inspect, transform, halt, or emit new
//! messages; forwarding is explicit. Requests sent by this node are tracked
//! by [`ResponseTracking`] until their response arrives, the caller cancels,
//! or the response timeout fires.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Stage (composition root)                                     │
//! │   invoke() ─▶ outbound ─▶ TracingStep ─▶ IdentityStep ─▶     │
//! │              ResponseTrackingStep ─▶ extra steps ─▶ Sender   │
//! │                                                              │
//! │   receive() ─▶ inbound ─▶ same steps, same order ─▶          │
//! │              Dispatcher (InvocationDispatcher)               │
//! ├──────────────────────────────────────────────────────────────┤
//! │ ResponseTracking: MessageId → Completion, swept every tick   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ LocalNetwork: in-process MessageSender joining stages        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use moonpool_stage::*;
//!
//! let network = Arc::new(LocalNetwork::new(ClusterName::default()));
//!
//! let config = Arc::new(StageConfig::default());
//! let registry = InterfaceRegistry::new(config.clone()).with(
//!     RemoteInterfaceDefinition::builder::<Greeter>(InterfaceId::new("greeter.Greeter"))
//!         .method("greet", |g: Arc<Greeter>, (name,): (String,)| async move {
//!             Ok::<_, RemoteError>(g.greet(&name))
//!         })
//!         .build(),
//! )?;
//! let addressables = Arc::new(InMemoryAddressables::new());
//! let server = Stage::builder((*config).clone())
//!     .sender(network.clone())
//!     .dispatcher(Arc::new(InvocationDispatcher::new(Arc::new(registry), addressables)))
//!     .build()?;
//! network.attach(&server)?;
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod completion;
pub mod error;
mod local;
pub mod net;
pub mod pipeline;
pub mod remoting;
pub mod stage;
mod tracking;

pub use completion::{Completion, Outcome};
pub use error::{ConfigError, PipelineError, RegistryError, RemoteError};
pub use local::LocalNetwork;
pub use net::{
    AddressableReference, ClusterName, InterfaceId, Invocation, Message, MessageContent, MessageId,
    MessageIdGenerator, MethodDescriptor, NetTarget, NodeIdentity, NodeMode,
};
pub use pipeline::steps::{IdentityStep, ResponseTrackingStep, TracingStep};
pub use pipeline::{
    Direction, Dispatcher, MessageSender, OutboundEmitter, Pipeline, PipelineBuilder,
    PipelineContext, PipelineStep, StepResult,
};
pub use remoting::{
    AddressableResolver, AnyAddressable, InMemoryAddressables, InterfaceRegistry,
    InvocationDispatcher, RemoteInterfaceDefinition, RemoteInterfaceDefinitionBuilder,
    RemoteMethodDefinition,
};
pub use stage::{ExecutionPool, Stage, StageBuilder, StageConfig, StageConfigBuilder};
pub use tracking::ResponseTracking;
