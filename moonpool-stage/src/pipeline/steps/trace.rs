//! Span per traversal.

use async_trait::async_trait;
use tracing::Instrument;

use crate::net::Message;
use crate::pipeline::{PipelineContext, PipelineStep, StepResult};

/// Wraps the rest of each traversal in a `debug` span carrying the message
/// id and content kind, and logs traversals that fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStep;

#[async_trait]
impl PipelineStep for TracingStep {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn on_outbound(&self, ctx: &mut PipelineContext, msg: Message) -> StepResult {
        let span = tracing::debug_span!(
            "outbound",
            message_id = %msg.message_id,
            kind = msg.content.kind(),
            target = %msg.target,
        );
        async move {
            tracing::trace!("entering outbound chain");
            let result = ctx.next_outbound(msg).await;
            if let Err(err) = &result {
                tracing::debug!(error = %err, "outbound traversal failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn on_inbound(&self, ctx: &mut PipelineContext, msg: Message) -> StepResult {
        let span = tracing::debug_span!(
            "inbound",
            message_id = %msg.message_id,
            kind = msg.content.kind(),
            source = ?msg.source.as_ref().map(|node| node.as_str()),
        );
        async move {
            tracing::trace!("entering inbound chain");
            let result = ctx.next_inbound(msg).await;
            if let Err(err) = &result {
                tracing::debug!(error = %err, "inbound traversal failed");
            }
            result
        }
        .instrument(span)
        .await
    }
}
