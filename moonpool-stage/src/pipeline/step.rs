//! The step interface.

use async_trait::async_trait;

use super::context::PipelineContext;
use crate::error::PipelineError;
use crate::net::Message;

/// Result of running a step (and, through the continue hook, everything
/// after it).
pub type StepResult = Result<(), PipelineError>;

/// One unit of bidirectional message processing.
///
/// A step sees every message once per direction. To let the message go on it
/// calls [`PipelineContext::next_outbound`] or
/// [`PipelineContext::next_inbound`]; returning without doing so stops the
/// traversal there. The defaults forward unchanged.
///
/// An inbound request halted without settling [`PipelineContext::completion`]
/// is answered with [`RemoteError::BrokenPromise`](crate::RemoteError::BrokenPromise).
///
/// # Example
///
/// ```rust,ignore
/// struct DropPings;
///
/// #[async_trait]
/// impl PipelineStep for DropPings {
///     fn name(&self) -> &'static str {
///         "drop-pings"
///     }
///
///     async fn on_inbound(&self, ctx: &mut PipelineContext, msg: Message) -> StepResult {
///         if is_ping(&msg) {
///             return Ok(());
///         }
///         ctx.next_inbound(msg).await
///     }
/// }
/// ```
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Process a message leaving this node.
    async fn on_outbound(&self, ctx: &mut PipelineContext, msg: Message) -> StepResult {
        ctx.next_outbound(msg).await
    }

    /// Process a message arriving at this node.
    async fn on_inbound(&self, ctx: &mut PipelineContext, msg: Message) -> StepResult {
        ctx.next_inbound(msg).await
    }
}
