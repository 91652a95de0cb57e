//! The stage: one node's composition root.
//!
//! A [`Stage`] owns the pipeline, the response tracking table, and the
//! maintenance sweeper. Callers use [`Stage::invoke`] to reach addressables
//! on other nodes; transports hand arriving messages to [`Stage::receive`].
//!
//! # Example
//!
//! ```rust,ignore
//! let network = Arc::new(LocalNetwork::new(ClusterName::default()));
//! let stage = Stage::builder(StageConfig::default())
//!     .sender(network.clone())
//!     .dispatcher(Arc::new(dispatcher))
//!     .build()?;
//! network.attach(&stage)?;
//! stage.start();
//!
//! let reply = stage.invoke(NetTarget::Unicast(other), invocation).await?;
//! ```

mod config;

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;

pub use config::{
    DEFAULT_RESPONSE_TIMEOUT, DEFAULT_TICK_RATE, ExecutionPool, StageConfig, StageConfigBuilder,
};

use crate::completion::{Completion, FailOnDrop};
use crate::error::{ConfigError, RemoteError};
use crate::net::{Invocation, Message, MessageIdGenerator, NetTarget, NodeIdentity};
use crate::pipeline::steps::{IdentityStep, ResponseTrackingStep, TracingStep};
use crate::pipeline::{Dispatcher, MessageSender, Pipeline, PipelineStep};
use crate::tracking::ResponseTracking;

/// A running node.
pub struct Stage {
    config: Arc<StageConfig>,
    pipeline: Arc<Pipeline>,
    tracking: Arc<ResponseTracking>,
    message_ids: MessageIdGenerator,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Stage {
    /// Start building a stage.
    pub fn builder(config: StageConfig) -> StageBuilder {
        StageBuilder {
            config,
            sender: None,
            dispatcher: None,
            steps: Vec::new(),
        }
    }

    /// Settings of this stage, with pools bound.
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// This node's identity.
    pub fn node_identity(&self) -> &NodeIdentity {
        self.config.node_identity()
    }

    /// The step chain.
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// The pending-response table.
    pub fn tracking(&self) -> &Arc<ResponseTracking> {
        &self.tracking
    }

    /// Invoke a method on a remote addressable and wait for the result.
    ///
    /// Fails with [`RemoteError::Pipeline`] when the request cannot leave
    /// this node, [`RemoteError::Timeout`] when no response arrives in time,
    /// and with whatever error the remote side reported otherwise. Dropping
    /// the returned future cancels the request.
    pub async fn invoke(
        &self,
        target: NetTarget,
        invocation: Invocation,
    ) -> Result<Value, RemoteError> {
        let id = self.message_ids.next_id();
        let message = Message::request(id, target, invocation);
        let completion = Completion::new();
        let _cancel = FailOnDrop::cancel(completion.clone());

        if let Err(err) = self.pipeline.send_outbound(message, completion.clone()).await {
            tracing::warn!(
                message_id = %id,
                error = %err,
                "request failed before leaving the node"
            );
            completion.fail(err.into());
        }
        completion.wait().await
    }

    /// Run an arriving message through the inbound chain on the CPU pool.
    pub fn receive(&self, message: Message) -> JoinHandle<()> {
        let pipeline = Arc::clone(&self.pipeline);
        self.config.cpu_pool().spawn(async move {
            let id = message.message_id;
            let completion = Completion::new();
            if let Err(err) = pipeline.deliver_inbound(message, completion.clone()).await {
                tracing::warn!(message_id = %id, error = %err, "inbound traversal failed");
                completion.fail(err.into());
            }
        })
    }

    /// Start maintenance work. Calling it again while running does nothing.
    pub fn start(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }
        *sweeper = Some(
            self.tracking
                .spawn_sweeper(self.config.tick_rate(), self.config.io_pool()),
        );
        tracing::info!(
            node = %self.node_identity(),
            cluster = %self.config.cluster_name(),
            mode = ?self.config.node_mode(),
            response_timeout_ms = self.tracking.response_timeout().as_millis() as u64,
            "stage started"
        );
    }

    /// Stop maintenance work and cancel every pending request.
    pub fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
        let cancelled = self.tracking.cancel_all();
        tracing::info!(node = %self.node_identity(), cancelled, "stage shut down");
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("node", self.node_identity())
            .field("pipeline", &self.pipeline)
            .field("pending", &self.tracking.pending_count())
            .finish()
    }
}

/// Builder for [`Stage`].
pub struct StageBuilder {
    config: StageConfig,
    sender: Option<Arc<dyn MessageSender>>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    steps: Vec<Arc<dyn PipelineStep>>,
}

impl StageBuilder {
    /// Set the transport. Required.
    pub fn sender(mut self, sender: Arc<dyn MessageSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Set the dispatcher that answers inbound requests.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Append a step after the built-in ones.
    pub fn step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Build the stage.
    ///
    /// Must be called inside a tokio runtime; unbound pools are pinned to it.
    pub fn build(self) -> Result<Arc<Stage>, ConfigError> {
        let sender = self.sender.ok_or(ConfigError::MissingSender)?;
        let config = Arc::new(self.config.bind_pools()?);
        let tracking = Arc::new(ResponseTracking::new(config.response_timeout()));

        let builtin: [Arc<dyn PipelineStep>; 3] = [
            Arc::new(TracingStep),
            Arc::new(IdentityStep),
            Arc::new(ResponseTrackingStep::new(Arc::clone(&tracking))),
        ];
        let mut pipeline = Pipeline::builder(Arc::clone(&config), sender)
            .steps(builtin)
            .steps(self.steps);
        if let Some(dispatcher) = self.dispatcher {
            pipeline = pipeline.dispatcher(dispatcher);
        }

        Ok(Arc::new(Stage {
            config,
            pipeline: pipeline.build(),
            tracking,
            message_ids: MessageIdGenerator::new(),
            sweeper: Mutex::new(None),
        }))
    }
}
