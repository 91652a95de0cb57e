//! Per-traversal state.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use super::Pipeline;
use super::step::StepResult;
use crate::completion::Completion;
use crate::error::PipelineError;
use crate::net::{Message, NodeIdentity};
use crate::stage::StageConfig;

/// Future returned by the continue hooks.
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = StepResult> + Send + 'a>>;

/// Which way a traversal moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Arriving from the transport.
    Inbound,
    /// Leaving towards the transport.
    Outbound,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// State threaded through one traversal of the step chain.
///
/// Holds the traversal's [`Completion`] and the position in the chain. The
/// continue hooks advance the position, so steps always run in declared
/// order and each runs at most once per traversal.
pub struct PipelineContext {
    pipeline: Arc<Pipeline>,
    completion: Completion,
    direction: Direction,
    position: usize,
}

impl PipelineContext {
    pub(super) fn new(
        pipeline: Arc<Pipeline>,
        completion: Completion,
        direction: Direction,
    ) -> Self {
        Self {
            pipeline,
            completion,
            direction,
            position: 0,
        }
    }

    /// Outcome of the local operation this message represents.
    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    /// Direction of this traversal.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Settings of the stage running this pipeline.
    pub fn config(&self) -> &StageConfig {
        self.pipeline.config()
    }

    /// Identity of the node running this pipeline.
    pub fn node_identity(&self) -> &NodeIdentity {
        self.pipeline.config().node_identity()
    }

    /// Hand `msg` to the next outbound step, or to the transport after the
    /// last one.
    pub fn next_outbound(&mut self, msg: Message) -> StepFuture<'_> {
        Box::pin(async move {
            self.expect_direction(Direction::Outbound)?;
            let pipeline = Arc::clone(&self.pipeline);
            match pipeline.steps().get(self.position) {
                Some(step) => {
                    self.position += 1;
                    step.on_outbound(self, msg).await
                }
                None => pipeline.sender().send(msg).await,
            }
        })
    }

    /// Hand `msg` to the next inbound step, or to dispatch after the last one.
    pub fn next_inbound(&mut self, msg: Message) -> StepFuture<'_> {
        Box::pin(async move {
            self.expect_direction(Direction::Inbound)?;
            let pipeline = Arc::clone(&self.pipeline);
            match pipeline.steps().get(self.position) {
                Some(step) => {
                    self.position += 1;
                    step.on_inbound(self, msg).await
                }
                None => {
                    pipeline.finish_inbound(&self.completion, msg).await;
                    Ok(())
                }
            }
        })
    }

    /// Start a fresh outbound traversal for `msg`.
    ///
    /// Runs independently from step 1 with its own completion; this call
    /// returns immediately.
    pub fn new_outbound(&self, msg: Message) {
        self.pipeline.emit_outbound(msg);
    }

    /// Handle that can emit outbound messages after this traversal is gone.
    pub fn emitter(&self) -> OutboundEmitter {
        OutboundEmitter {
            pipeline: Arc::downgrade(&self.pipeline),
        }
    }

    fn expect_direction(&self, requested: Direction) -> Result<(), PipelineError> {
        if self.direction == requested {
            Ok(())
        } else {
            Err(PipelineError::WrongDirection {
                actual: self.direction.label(),
                requested: requested.label(),
            })
        }
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("direction", &self.direction)
            .field("position", &self.position)
            .field("completion", &self.completion)
            .finish()
    }
}

/// Emits new outbound messages into a pipeline.
///
/// Holds the pipeline weakly; emitting after the pipeline is gone is logged
/// and dropped.
#[derive(Clone)]
pub struct OutboundEmitter {
    pipeline: Weak<Pipeline>,
}

impl OutboundEmitter {
    /// Start a fresh outbound traversal for `msg`. Returns `false` when the
    /// pipeline no longer exists.
    pub fn emit(&self, msg: Message) -> bool {
        match self.pipeline.upgrade() {
            Some(pipeline) => {
                pipeline.emit_outbound(msg);
                true
            }
            None => {
                tracing::debug!(
                    message_id = %msg.message_id,
                    "pipeline gone, dropping emitted message"
                );
                false
            }
        }
    }
}
