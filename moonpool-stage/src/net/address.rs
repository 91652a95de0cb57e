//! Cluster and node addressing.
//!
//! These are plain value types: the pipeline copies them around to build
//! replies but never makes routing decisions from their contents. Resolving a
//! [`NetTarget`] to a socket is the transport's job.

use std::fmt;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

/// Length of generated node identities.
const NODE_IDENTITY_LEN: usize = 32;

/// Administrative boundary of a cluster.
///
/// Nodes configured with different cluster names never exchange messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterName(String);

impl ClusterName {
    /// Create a cluster name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClusterName {
    fn default() -> Self {
        Self::new("moonpool-cluster")
    }
}

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identity of one running node.
///
/// Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdentity(String);

impl NodeIdentity {
    /// Create a node identity from a known value.
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Generate a random alphanumeric identity.
    pub fn random() -> Self {
        let identity: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(NODE_IDENTITY_LEN)
            .map(char::from)
            .collect();
        Self(identity)
    }

    /// The raw identity.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a node hosts addressables or only calls them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeMode {
    /// Calls addressables; refuses inbound invocation requests.
    Client,
    /// Hosts addressables and accepts invocation requests.
    #[default]
    Server,
}

impl NodeMode {
    /// True when inbound invocation requests are accepted.
    pub fn accepts_requests(self) -> bool {
        matches!(self, NodeMode::Server)
    }
}

/// Delivery target of a message.
///
/// Closed set: every variant is handled exhaustively wherever the pipeline
/// looks at a target. New delivery modes are added as variants here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetTarget {
    /// Deliver to exactly one node.
    Unicast(NodeIdentity),
}

impl fmt::Display for NetTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetTarget::Unicast(node) => write!(f, "unicast:{node}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_random_identities_are_distinct() {
        let ids: HashSet<NodeIdentity> = (0..64).map(|_| NodeIdentity::random()).collect();
        assert_eq!(ids.len(), 64);
        assert!(ids.iter().all(|id| id.as_str().len() == NODE_IDENTITY_LEN));
    }

    #[test]
    fn test_default_cluster_name() {
        assert_eq!(ClusterName::default().as_str(), "moonpool-cluster");
    }

    #[test]
    fn test_node_mode() {
        assert_eq!(NodeMode::default(), NodeMode::Server);
        assert!(NodeMode::Server.accepts_requests());
        assert!(!NodeMode::Client.accepts_requests());
    }

    #[test]
    fn test_net_target_display() {
        let target = NetTarget::Unicast(NodeIdentity::new("node-a"));
        assert_eq!(target.to_string(), "unicast:node-a");
    }
}
