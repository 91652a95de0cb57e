//! Error types for the stage runtime.
//!
//! Two families live here. [`RemoteError`] is data: it is what a caller's
//! completion resolves to when an invocation fails, and it travels inside
//! [`ResponseError`](crate::MessageContent::ResponseError) messages.
//! [`PipelineError`] is a local fault raised while moving a message through
//! the step chain; it never crosses the network.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::{ClusterName, MessageId, NodeIdentity};

/// Failure outcome of a remote invocation.
///
/// Business errors raised by an addressable are converted into this type and
/// shipped back to the caller as a response, never thrown across nodes.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RemoteError {
    /// No interface definition is registered for the target.
    #[error("unknown interface: {0}")]
    UnknownInterface(String),

    /// The interface exists but does not declare the method.
    #[error("unknown method {method} on interface {interface}")]
    UnknownMethod {
        /// Interface that was searched.
        interface: String,
        /// Method that was requested.
        method: String,
    },

    /// Arguments could not be decoded into the method's parameter types.
    #[error("invalid arguments for {method}: {reason}")]
    InvalidArguments {
        /// Method being invoked.
        method: String,
        /// Decoder message (arity or type mismatch).
        reason: String,
    },

    /// No addressable instance exists for the reference.
    #[error("addressable not found: {0}")]
    AddressableNotFound(String),

    /// The addressable ran and returned an error.
    #[error("invocation failed: {0}")]
    Invocation(String),

    /// This node does not host addressables.
    #[error("node {0} does not host addressables")]
    NotHosting(NodeIdentity),

    /// No response arrived before the response timeout.
    #[error("request timed out")]
    Timeout,

    /// The completion was cancelled before a response arrived.
    #[error("request cancelled")]
    Cancelled,

    /// The remote side dropped the request without answering it.
    #[error("request dropped without a response")]
    BrokenPromise,

    /// The outbound or inbound traversal failed locally.
    #[error("pipeline failure: {0}")]
    Pipeline(String),
}

impl RemoteError {
    /// Wrap an arbitrary error raised by an addressable.
    pub fn invocation(err: impl std::fmt::Display) -> Self {
        RemoteError::Invocation(err.to_string())
    }
}

impl From<PipelineError> for RemoteError {
    fn from(err: PipelineError) -> Self {
        RemoteError::Pipeline(err.to_string())
    }
}

/// Local faults raised while a message traverses the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A request is already pending under this id.
    #[error("message {0} is already tracked")]
    DuplicateMessageId(MessageId),

    /// Only request messages can be tracked for a response.
    #[error("message {0} is not a request")]
    NotARequest(MessageId),

    /// A request arrived without a source, so no reply can be addressed.
    #[error("message {0} has no source to reply to")]
    MissingSource(MessageId),

    /// A continue hook was called for the other direction.
    #[error("cannot continue {requested} traversal from a {actual} context")]
    WrongDirection {
        /// Direction of the traversal the context belongs to.
        actual: &'static str,
        /// Direction the step tried to continue.
        requested: &'static str,
    },

    /// The destination node is not reachable through this transport.
    #[error("node {0} is unreachable")]
    Unreachable(NodeIdentity),

    /// A stage from another cluster tried to join.
    #[error("cluster mismatch: expected {expected}, got {actual}")]
    ClusterMismatch {
        /// Cluster of the network.
        expected: ClusterName,
        /// Cluster of the joining stage.
        actual: ClusterName,
    },

    /// A step failed for a reason of its own.
    #[error("step {step} failed: {reason}")]
    Step {
        /// Name of the failing step.
        step: &'static str,
        /// Failure details.
        reason: String,
    },
}

/// Errors from validating a [`StageConfig`](crate::StageConfig).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Cluster name must not be empty.
    #[error("cluster name cannot be empty")]
    EmptyClusterName,

    /// Node identity must not be empty.
    #[error("node identity cannot be empty")]
    EmptyNodeIdentity,

    /// The maintenance tick must be positive.
    #[error("tick rate must be greater than zero")]
    ZeroTickRate,

    /// The response timeout must be positive.
    #[error("response timeout must be greater than zero")]
    ZeroResponseTimeout,

    /// A stage needs a transport to send through.
    #[error("stage has no message sender")]
    MissingSender,

    /// A pool could not be bound because no tokio runtime is running.
    #[error("pool {pool} has no runtime to bind to")]
    NoRuntime {
        /// Name of the unbound pool.
        pool: String,
    },
}

/// Errors from registering interface definitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The interface is outside the configured scan scope.
    #[error("interface {0} is outside the configured packages")]
    OutOfScope(String),

    /// The interface was already registered.
    #[error("interface {0} is already registered")]
    AlreadyRegistered(String),
}
