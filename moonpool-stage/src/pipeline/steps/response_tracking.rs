//! Request/response correlation step.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::net::{Message, MessageContent};
use crate::pipeline::{PipelineContext, PipelineStep, StepResult};
use crate::tracking::ResponseTracking;

/// Connects the pipeline to a [`ResponseTracking`] table.
///
/// | direction | content  | action                                           |
/// |-----------|----------|--------------------------------------------------|
/// | outbound  | request  | track the traversal completion, forward          |
/// | outbound  | response | forward                                          |
/// | inbound   | response | resolve the waiter, halt                         |
/// | inbound   | request  | reply when the local completion settles, forward |
///
/// The reply is emitted as a new outbound traversal, so it goes through the
/// whole chain like any other message.
#[derive(Debug, Clone)]
pub struct ResponseTrackingStep {
    tracking: Arc<ResponseTracking>,
}

impl ResponseTrackingStep {
    /// Create the step over `tracking`.
    pub fn new(tracking: Arc<ResponseTracking>) -> Self {
        Self { tracking }
    }
}

#[async_trait]
impl PipelineStep for ResponseTrackingStep {
    fn name(&self) -> &'static str {
        "response-tracking"
    }

    async fn on_outbound(&self, ctx: &mut PipelineContext, msg: Message) -> StepResult {
        if msg.content.is_request() {
            self.tracking.track(&msg, ctx.completion())?;
        }
        ctx.next_outbound(msg).await
    }

    async fn on_inbound(&self, ctx: &mut PipelineContext, msg: Message) -> StepResult {
        if msg.content.is_response() {
            self.tracking.handle_response(&msg);
            return Ok(());
        }

        let reply = Message::response_to(&msg, MessageContent::ResponseNormal(Value::Null))?;
        let emitter = ctx.emitter();
        ctx.completion().on_complete(move |outcome| {
            let response = Message {
                content: MessageContent::from_outcome(outcome),
                ..reply
            };
            emitter.emit(response);
        });
        ctx.next_inbound(msg).await
    }
}
