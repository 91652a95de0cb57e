//! In-process transport.
//!
//! [`LocalNetwork`] joins the stages of one cluster living in the same
//! process. It is the outbound end of every attached stage's pipeline and
//! hands each message to the destination stage's inbound chain.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::PipelineError;
use crate::net::{ClusterName, Message, NetTarget, NodeIdentity};
use crate::pipeline::MessageSender;
use crate::stage::Stage;

/// Routes messages between stages of one cluster by node identity.
///
/// Stages are held weakly; a dropped stage becomes unreachable.
#[derive(Debug)]
pub struct LocalNetwork {
    cluster_name: ClusterName,
    nodes: RwLock<HashMap<NodeIdentity, Weak<Stage>>>,
}

impl LocalNetwork {
    /// Create an empty network for `cluster_name`.
    pub fn new(cluster_name: ClusterName) -> Self {
        Self {
            cluster_name,
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Cluster this network serves.
    pub fn cluster_name(&self) -> &ClusterName {
        &self.cluster_name
    }

    /// Make `stage` reachable under its node identity.
    pub fn attach(&self, stage: &Arc<Stage>) -> Result<(), PipelineError> {
        let cluster = stage.config().cluster_name();
        if cluster != &self.cluster_name {
            return Err(PipelineError::ClusterMismatch {
                expected: self.cluster_name.clone(),
                actual: cluster.clone(),
            });
        }

        let node = stage.node_identity().clone();
        if self
            .nodes
            .write()
            .insert(node.clone(), Arc::downgrade(stage))
            .is_some()
        {
            tracing::warn!(node = %node, "replacing stage attached under the same identity");
        }
        tracing::debug!(node = %node, cluster = %self.cluster_name, "stage attached");
        Ok(())
    }

    /// Make `node` unreachable. Returns whether it was attached.
    pub fn detach(&self, node: &NodeIdentity) -> bool {
        self.nodes.write().remove(node).is_some()
    }

    /// Identities of attached stages that are still alive.
    pub fn nodes(&self) -> Vec<NodeIdentity> {
        self.nodes
            .read()
            .iter()
            .filter(|(_, stage)| stage.strong_count() > 0)
            .map(|(node, _)| node.clone())
            .collect()
    }

    fn lookup(&self, node: &NodeIdentity) -> Option<Arc<Stage>> {
        self.nodes.read().get(node).and_then(Weak::upgrade)
    }
}

#[async_trait]
impl MessageSender for LocalNetwork {
    async fn send(&self, message: Message) -> Result<(), PipelineError> {
        match &message.target {
            NetTarget::Unicast(node) => {
                let stage = self
                    .lookup(node)
                    .ok_or_else(|| PipelineError::Unreachable(node.clone()))?;
                tracing::trace!(
                    message_id = %message.message_id,
                    kind = message.content.kind(),
                    to = %node,
                    "local delivery"
                );
                stage.receive(message);
                Ok(())
            }
        }
    }
}
