//! Source stamping.

use async_trait::async_trait;

use crate::net::Message;
use crate::pipeline::{PipelineContext, PipelineStep, StepResult};

/// Stamps outbound messages that have no source with this node's identity.
///
/// Messages that already carry a source pass through untouched. Inbound
/// messages are never modified.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityStep;

#[async_trait]
impl PipelineStep for IdentityStep {
    fn name(&self) -> &'static str {
        "identity"
    }

    async fn on_outbound(&self, ctx: &mut PipelineContext, msg: Message) -> StepResult {
        let msg = match msg.source {
            Some(_) => msg,
            None => msg.with_source(ctx.node_identity().clone()),
        };
        ctx.next_outbound(msg).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::completion::Completion;
    use crate::net::NodeIdentity;
    use crate::pipeline::Pipeline;
    use crate::pipeline::test_support::{RecordingSender, config_for, request};

    #[tokio::test]
    async fn test_stamps_missing_source() {
        let sender = Arc::new(RecordingSender::default());
        let pipeline = Pipeline::builder(config_for("node-a"), sender.clone())
            .step(Arc::new(IdentityStep))
            .build();

        pipeline
            .send_outbound(request(1, "node-b"), Completion::new())
            .await
            .expect("outbound");

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].source, Some(NodeIdentity::new("node-a")));
    }

    #[tokio::test]
    async fn test_keeps_existing_source() {
        let sender = Arc::new(RecordingSender::default());
        let pipeline = Pipeline::builder(config_for("node-a"), sender.clone())
            .step(Arc::new(IdentityStep))
            .build();

        let msg = request(1, "node-b").with_source(NodeIdentity::new("relay"));
        pipeline
            .send_outbound(msg, Completion::new())
            .await
            .expect("outbound");

        assert_eq!(sender.sent()[0].source, Some(NodeIdentity::new("relay")));
    }
}
