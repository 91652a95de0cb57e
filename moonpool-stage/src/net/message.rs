//! The message envelope moved through the pipeline.
//!
//! A [`Message`] is an immutable value. Steps that need to change something
//! (stamp a source, build a reply) construct a new message instead of editing
//! the one they were given.
//!
//! # Request / Response
//!
//! ```text
//! node A                                   node B
//!   Message { id: 7, source: A,            ──▶  RequestInvocation
//!             target: Unicast(B), .. }
//!   ResponseNormal / ResponseError        ◀──  Message { id: 7, target: Unicast(A) }
//! ```
//!
//! The reply reuses the request's id verbatim; that id is the only link the
//! origin has to correlate the two.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::address::{NetTarget, NodeIdentity};
use crate::error::{PipelineError, RemoteError};

/// Identifier of a message, unique among those created by one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(u64);

impl MessageId {
    /// Wrap a raw id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id.
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Issues monotonically increasing message ids for one node.
#[derive(Debug)]
pub struct MessageIdGenerator {
    next_id: AtomicU64,
}

impl MessageIdGenerator {
    /// Create a generator starting from 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Next id. Safe to call from many tasks at once.
    pub fn next_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of an addressable interface, e.g. `"greeter.Greeter"`.
///
/// The dotted prefix is the package that scan scopes filter on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceId(String);

impl InterfaceId {
    /// Create an interface id.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this interface lives in `package` or one of its children.
    pub fn is_in_package(&self, package: &str) -> bool {
        match self.0.strip_prefix(package) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical identity of an addressable: interface + key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressableReference {
    /// Interface the addressable implements.
    pub interface: InterfaceId,
    /// Instance key within the interface (e.g. `"player-42"`).
    pub key: String,
}

impl AddressableReference {
    /// Create a reference.
    pub fn new(interface: InterfaceId, key: impl Into<String>) -> Self {
        Self {
            interface,
            key: key.into(),
        }
    }
}

impl fmt::Display for AddressableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.interface, self.key)
    }
}

/// Identifies one method of an interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Declaring interface.
    pub interface: InterfaceId,
    /// Method name.
    pub name: String,
}

impl MethodDescriptor {
    /// Create a method descriptor.
    pub fn new(interface: InterfaceId, name: impl Into<String>) -> Self {
        Self {
            interface,
            name: name.into(),
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.interface, self.name)
    }
}

/// A call to one method of one addressable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Addressable to invoke.
    pub target: AddressableReference,
    /// Method to call.
    pub method: MethodDescriptor,
    /// Positional arguments, already deserialized.
    pub arguments: Vec<Value>,
}

impl Invocation {
    /// Create an invocation of `method` on `target`.
    pub fn new(
        target: AddressableReference,
        method: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        let method = MethodDescriptor::new(target.interface.clone(), method);
        Self {
            target,
            method,
            arguments,
        }
    }
}

/// Payload of a message. Exactly one variant per message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageContent {
    /// Ask a remote node to invoke an addressable.
    RequestInvocation(Invocation),
    /// Successful result of a previous request.
    ResponseNormal(Value),
    /// Failed result of a previous request.
    ResponseError(RemoteError),
}

impl MessageContent {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MessageContent::RequestInvocation(_) => "request",
            MessageContent::ResponseNormal(_) => "response",
            MessageContent::ResponseError(_) => "error",
        }
    }

    /// True for the request variant.
    pub fn is_request(&self) -> bool {
        matches!(self, MessageContent::RequestInvocation(_))
    }

    /// True for either response variant.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            MessageContent::ResponseNormal(_) | MessageContent::ResponseError(_)
        )
    }

    /// Response content for the outcome of a local invocation.
    pub fn from_outcome(outcome: &Result<Value, RemoteError>) -> Self {
        match outcome {
            Ok(value) => MessageContent::ResponseNormal(value.clone()),
            Err(err) => MessageContent::ResponseError(err.clone()),
        }
    }
}

/// Unit of communication between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique per origin node; reused by the reply.
    pub message_id: MessageId,
    /// Node that sent the message, if stamped.
    pub source: Option<NodeIdentity>,
    /// Where the message is going.
    pub target: NetTarget,
    /// Request or response payload.
    pub content: MessageContent,
}

impl Message {
    /// Create a message with no source yet.
    pub fn new(message_id: MessageId, target: NetTarget, content: MessageContent) -> Self {
        Self {
            message_id,
            source: None,
            target,
            content,
        }
    }

    /// Create an invocation request.
    pub fn request(message_id: MessageId, target: NetTarget, invocation: Invocation) -> Self {
        Self::new(message_id, target, MessageContent::RequestInvocation(invocation))
    }

    /// A copy of this message stamped with `source`.
    pub fn with_source(&self, source: NodeIdentity) -> Self {
        Self {
            source: Some(source),
            ..self.clone()
        }
    }

    /// Build the reply to `request`.
    ///
    /// Same id, unicast back to the request's source. Fails when the request
    /// carries no source: such a request is malformed and there is nobody to
    /// answer.
    pub fn response_to(request: &Message, content: MessageContent) -> Result<Self, PipelineError> {
        let source = request
            .source
            .clone()
            .ok_or(PipelineError::MissingSource(request.message_id))?;
        Ok(Self::new(
            request.message_id,
            NetTarget::Unicast(source),
            content,
        ))
    }
}
