//! Request/response correlation.
//!
//! `ResponseTracking` owns the pending-response table: one entry per
//! locally-initiated request still waiting for its answer.
//!
//! # Entry lifecycle
//!
//! ```text
//! track(request, completion)          insert id → completion
//!        │
//!        ├── response arrives         remove id, settle with result/error
//!        ├── caller cancels           completion settles → observer removes id
//!        └── sweep finds it expired   remove id, settle with Timeout
//! ```
//!
//! Removal happens exactly once: whoever removes the entry is the only one
//! that settles through it. A response for an id that is no longer present
//! (late, duplicate, never tracked) is dropped without error.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::completion::Completion;
use crate::error::{PipelineError, RemoteError};
use crate::net::{Message, MessageContent, MessageId};
use crate::stage::ExecutionPool;

/// A request waiting for its response.
#[derive(Debug)]
struct PendingResponse {
    completion: Completion,
    started: Instant,
}

/// Correlates outbound requests with inbound responses.
///
/// The table is sharded, so inserts and removals for unrelated ids do not
/// contend.
#[derive(Debug)]
pub struct ResponseTracking {
    pending: Arc<DashMap<MessageId, PendingResponse>>,
    response_timeout: Duration,
}

impl ResponseTracking {
    /// Create a tracker whose entries expire after `response_timeout`.
    pub fn new(response_timeout: Duration) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            response_timeout,
        }
    }

    /// Register `completion` as the waiter for `message`'s response.
    ///
    /// Only request messages can be tracked. A second registration under an
    /// id that is still pending is refused and the first waiter is kept.
    pub fn track(&self, message: &Message, completion: &Completion) -> Result<(), PipelineError> {
        let id = message.message_id;
        if !message.content.is_request() {
            return Err(PipelineError::NotARequest(id));
        }

        match self.pending.entry(id) {
            Entry::Occupied(_) => return Err(PipelineError::DuplicateMessageId(id)),
            Entry::Vacant(slot) => {
                slot.insert(PendingResponse {
                    completion: completion.clone(),
                    started: Instant::now(),
                });
            }
        }
        tracing::debug!(message_id = %id, "tracking response");

        // Settling by any other path (cancel, step failure) releases the entry.
        let pending: Weak<DashMap<MessageId, PendingResponse>> = Arc::downgrade(&self.pending);
        let tracked = completion.downgrade();
        completion.on_complete(move |_| {
            if let Some(pending) = pending.upgrade() {
                pending.remove_if(&id, |_, entry| tracked.is(&entry.completion));
            }
        });
        Ok(())
    }

    /// Resolve the waiter for a response message.
    ///
    /// Normal responses settle with their result, error responses with their
    /// error. Unknown ids are ignored.
    pub fn handle_response(&self, message: &Message) {
        let id = message.message_id;
        let outcome = match &message.content {
            MessageContent::ResponseNormal(value) => Ok(value.clone()),
            MessageContent::ResponseError(error) => Err(error.clone()),
            MessageContent::RequestInvocation(_) => {
                tracing::debug!(message_id = %id, "ignoring request passed to response handling");
                return;
            }
        };

        let Some((_, entry)) = self.pending.remove(&id) else {
            tracing::debug!(message_id = %id, "dropping response for unknown message id");
            return;
        };

        let elapsed = entry.started.elapsed();
        if entry.completion.settle(outcome) {
            tracing::debug!(
                message_id = %id,
                elapsed_ms = elapsed.as_millis() as u64,
                "response delivered"
            );
        } else {
            tracing::debug!(message_id = %id, "waiter settled before its response arrived");
        }
    }

    /// Fail every entry older than the response timeout.
    ///
    /// Returns how many entries timed out.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let mut expired = Vec::new();
        self.pending.retain(|id, entry| {
            if now.saturating_duration_since(entry.started) >= self.response_timeout {
                expired.push((*id, entry.completion.clone()));
                false
            } else {
                true
            }
        });

        // Settle outside the table locks; observers touch the table too.
        for (id, completion) in &expired {
            tracing::warn!(message_id = %id, "response timed out");
            completion.fail(RemoteError::Timeout);
        }
        expired.len()
    }

    /// Periodically sweep expired entries every `tick_rate`.
    ///
    /// The task stops once the tracker is dropped.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        tick_rate: Duration,
        pool: &ExecutionPool,
    ) -> JoinHandle<()> {
        let tracking = Arc::downgrade(self);
        pool.spawn(async move {
            let mut interval = tokio::time::interval(tick_rate);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(tracking) = tracking.upgrade() else {
                    break;
                };
                let expired = tracking.sweep_expired(Instant::now());
                if expired > 0 {
                    tracing::debug!(expired, "sweep released expired responses");
                }
            }
        })
    }

    /// Cancel every pending request.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<MessageId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut cancelled = 0;
        for id in ids {
            if let Some((_, entry)) = self.pending.remove(&id) {
                entry.completion.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Number of requests waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// True while `id` is waiting for a response.
    pub fn is_pending(&self, id: MessageId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Timeout applied by [`sweep_expired`](Self::sweep_expired).
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }
}
