//! The ordered, bidirectional step chain.
//!
//! Every message leaving or arriving at a node goes through the same list of
//! steps, in declared order for both directions, so ordering alone encodes
//! precedence.
//!
//! ```text
//!              outbound                                inbound
//! caller ──▶ step 1 ─▶ step 2 ─▶ … ─▶ MessageSender     transport
//!                                                           │
//! Dispatcher ◀─ … ◀─ step 2 ◀─ step 1 ◀─────────────────────┘
//!  (settles the traversal completion)
//! ```
//!
//! The ends of the chain are not steps. The outbound end is the
//! [`MessageSender`] (transport boundary), the inbound end runs the
//! [`Dispatcher`] for requests. A step that wants a message to go anywhere
//! must forward it; the only way to reach the wire or an addressable is
//! through the last step's continue hook.

mod context;
mod step;
pub mod steps;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;

pub use context::{Direction, OutboundEmitter, PipelineContext, StepFuture};
pub use step::{PipelineStep, StepResult};

use crate::completion::{Completion, FailOnDrop};
use crate::error::{PipelineError, RemoteError};
use crate::net::{Invocation, Message, MessageContent};
use crate::stage::StageConfig;

/// Transport boundary: receives fully-formed outbound messages.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Deliver `message` towards its target.
    async fn send(&self, message: Message) -> Result<(), PipelineError>;
}

/// Dispatch boundary: turns an invocation into a value or an error.
///
/// Implementations must report every failure (unknown method, bad
/// arguments, addressable errors) as a [`RemoteError`] so that exactly one
/// response goes back to the caller.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Invoke the addressable named by `invocation`.
    async fn dispatch(&self, invocation: &Invocation) -> Result<Value, RemoteError>;
}

/// A fixed chain of steps between the local node and the transport.
pub struct Pipeline {
    config: Arc<StageConfig>,
    steps: Vec<Arc<dyn PipelineStep>>,
    sender: Arc<dyn MessageSender>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
}

impl Pipeline {
    /// Start building a pipeline that ends in `sender`.
    pub fn builder(config: Arc<StageConfig>, sender: Arc<dyn MessageSender>) -> PipelineBuilder {
        PipelineBuilder {
            config,
            steps: Vec::new(),
            sender,
            dispatcher: None,
        }
    }

    /// Settings this pipeline was built with.
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Names of the steps, in order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub(crate) fn steps(&self) -> &[Arc<dyn PipelineStep>] {
        &self.steps
    }

    pub(crate) fn sender(&self) -> &Arc<dyn MessageSender> {
        &self.sender
    }

    /// Run `message` through the outbound chain.
    ///
    /// `completion` is the outcome of the operation the message represents
    /// (for a request, the caller's pending result). Errors from a step abort
    /// the traversal and are returned here; associating them with the
    /// completion is the caller's decision.
    pub async fn send_outbound(
        self: &Arc<Self>,
        message: Message,
        completion: Completion,
    ) -> Result<(), PipelineError> {
        let mut ctx = PipelineContext::new(Arc::clone(self), completion, Direction::Outbound);
        ctx.next_outbound(message).await
    }

    /// Run `message` through the inbound chain.
    ///
    /// A request always leaves the traversal with `completion` settled. A
    /// step error fails it with [`RemoteError::Pipeline`]; a traversal that
    /// halts without settling, or unwinds, fails it with
    /// [`RemoteError::BrokenPromise`].
    pub async fn deliver_inbound(
        self: &Arc<Self>,
        message: Message,
        completion: Completion,
    ) -> Result<(), PipelineError> {
        let is_request = message.content.is_request();
        let _unanswered = is_request.then(|| FailOnDrop::broken_promise(completion.clone()));

        let mut ctx =
            PipelineContext::new(Arc::clone(self), completion.clone(), Direction::Inbound);
        let result = ctx.next_inbound(message).await;
        if let Err(err) = &result {
            if is_request {
                completion.fail(RemoteError::Pipeline(err.to_string()));
            }
        }
        result
    }

    /// Spawn an independent outbound traversal on the IO pool.
    ///
    /// A failure fails the traversal's own completion and is logged; it does
    /// not reach whoever emitted the message.
    pub fn emit_outbound(self: &Arc<Self>, message: Message) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        self.config.io_pool().spawn(async move {
            let id = message.message_id;
            let completion = Completion::new();
            if let Err(err) = pipeline.send_outbound(message, completion.clone()).await {
                tracing::warn!(
                    message_id = %id,
                    error = %err,
                    "emitted message failed outbound traversal"
                );
                completion.fail(err.into());
            }
        })
    }

    /// End of the inbound chain.
    async fn finish_inbound(&self, completion: &Completion, message: Message) {
        let id = message.message_id;
        match message.content {
            MessageContent::RequestInvocation(invocation) => {
                let outcome = match (&self.dispatcher, self.config.node_mode().accepts_requests()) {
                    (Some(dispatcher), true) => dispatcher.dispatch(&invocation).await,
                    _ => {
                        tracing::debug!(
                            message_id = %id,
                            method = %invocation.method,
                            "refusing request on non-hosting node"
                        );
                        Err(RemoteError::NotHosting(self.config.node_identity().clone()))
                    }
                };
                completion.settle(outcome);
            }
            MessageContent::ResponseNormal(_) | MessageContent::ResponseError(_) => {
                tracing::debug!(
                    message_id = %id,
                    "response reached end of inbound chain unclaimed"
                );
                completion.succeed(Value::Null);
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("node", self.config.node_identity())
            .field("steps", &self.step_names())
            .field("dispatcher", &self.dispatcher.is_some())
            .finish()
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    config: Arc<StageConfig>,
    steps: Vec<Arc<dyn PipelineStep>>,
    sender: Arc<dyn MessageSender>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
}

impl PipelineBuilder {
    /// Append a step. Steps run in the order they are added.
    pub fn step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Append several steps.
    pub fn steps<I>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn PipelineStep>>,
    {
        self.steps.extend(steps);
        self
    }

    /// Set the dispatcher that answers inbound requests.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Build the pipeline.
    pub fn build(self) -> Arc<Pipeline> {
        tracing::debug!(
            node = %self.config.node_identity(),
            steps = self.steps.len(),
            "pipeline built"
        );
        Arc::new(Pipeline {
            config: self.config,
            steps: self.steps,
            sender: self.sender,
            dispatcher: self.dispatcher,
        })
    }
}
