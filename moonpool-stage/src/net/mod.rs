//! Addressing and the message envelope.

mod address;
mod message;

pub use address::{ClusterName, NetTarget, NodeIdentity, NodeMode};
pub use message::{
    AddressableReference, InterfaceId, Invocation, Message, MessageContent, MessageId,
    MessageIdGenerator, MethodDescriptor,
};
