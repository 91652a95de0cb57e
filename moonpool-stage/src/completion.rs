//! Single-assignment outcome holder shared across an async boundary.
//!
//! A [`Completion`] represents the result of the local operation a message
//! stands for: the caller's pending request on the sending node, or the
//! addressable invocation on the receiving node.
//!
//! # Lifecycle
//!
//! ```text
//! Pending { observers } ──settle(outcome)──▶ Settled(outcome)
//!                                               │
//!                        observers run once ◀───┘
//! ```
//!
//! `settle` is a compare-and-set: the first call wins, every later call
//! returns `false` and changes nothing. Observers registered after settling
//! run immediately.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::RemoteError;

/// What a completion settles to.
pub type Outcome = Result<Value, RemoteError>;

type Observer = Box<dyn FnOnce(&Outcome) + Send + 'static>;

enum State {
    Pending(Vec<Observer>),
    Settled(Outcome),
}

/// Handle to a single-assignment outcome.
///
/// Cloning is cheap; all clones observe the same state.
#[derive(Clone)]
pub struct Completion {
    state: Arc<Mutex<State>>,
}

impl Completion {
    /// Create an unsettled completion.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Pending(Vec::new()))),
        }
    }

    /// Settle with `outcome` if nobody has yet.
    ///
    /// Returns `true` when this call settled the completion. Observers run on
    /// the calling thread, after the internal lock is released.
    pub fn settle(&self, outcome: Outcome) -> bool {
        let previous = {
            let mut state = self.state.lock();
            if matches!(*state, State::Settled(_)) {
                return false;
            }
            std::mem::replace(&mut *state, State::Settled(outcome.clone()))
        };

        if let State::Pending(observers) = previous {
            for observer in observers {
                observer(&outcome);
            }
        }
        true
    }

    /// Settle with a value.
    pub fn succeed(&self, value: Value) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with an error.
    pub fn fail(&self, error: RemoteError) -> bool {
        self.settle(Err(error))
    }

    /// Settle with [`RemoteError::Cancelled`].
    pub fn cancel(&self) -> bool {
        self.fail(RemoteError::Cancelled)
    }

    /// Run `observer` exactly once when the completion settles.
    ///
    /// Fires immediately if it already has. Observers must not block.
    pub fn on_complete<F>(&self, observer: F)
    where
        F: FnOnce(&Outcome) + Send + 'static,
    {
        let settled = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Pending(observers) => {
                    observers.push(Box::new(observer));
                    return;
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };
        observer(&settled);
    }

    /// Wait for the outcome.
    pub async fn wait(&self) -> Outcome {
        let (tx, rx) = oneshot::channel();
        self.on_complete(move |outcome| {
            let _ = tx.send(outcome.clone());
        });
        rx.await.unwrap_or(Err(RemoteError::Cancelled))
    }

    /// True once settled.
    pub fn is_settled(&self) -> bool {
        matches!(*self.state.lock(), State::Settled(_))
    }

    /// The outcome, if settled.
    pub fn outcome(&self) -> Option<Outcome> {
        match &*self.state.lock() {
            State::Pending(_) => None,
            State::Settled(outcome) => Some(outcome.clone()),
        }
    }

    /// True when both handles refer to the same completion.
    pub fn ptr_eq(&self, other: &Completion) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// A handle that identifies this completion without keeping it alive.
    pub(crate) fn downgrade(&self) -> WeakCompletion {
        WeakCompletion(Arc::downgrade(&self.state))
    }
}

/// Non-owning identity of a [`Completion`].
pub(crate) struct WeakCompletion(Weak<Mutex<State>>);

impl WeakCompletion {
    /// True when `completion` is the one this handle was taken from.
    pub(crate) fn is(&self, completion: &Completion) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(&completion.state))
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.lock() {
            State::Pending(observers) => f
                .debug_struct("Completion")
                .field("state", &"pending")
                .field("observers", &observers.len())
                .finish(),
            State::Settled(outcome) => f
                .debug_struct("Completion")
                .field("state", &"settled")
                .field("outcome", outcome)
                .finish(),
        }
    }
}

/// Fails the completion when dropped, unless it has settled already.
///
/// Callers awaiting a response hold a [`cancel`](Self::cancel) guard, so
/// abandoning the wait releases whatever is tracking the completion. Inbound
/// request traversals hold a [`broken_promise`](Self::broken_promise) guard,
/// so a traversal that ends (or unwinds) without settling still answers.
pub(crate) struct FailOnDrop {
    completion: Completion,
    error: RemoteError,
}

impl FailOnDrop {
    pub(crate) fn cancel(completion: Completion) -> Self {
        Self {
            completion,
            error: RemoteError::Cancelled,
        }
    }

    pub(crate) fn broken_promise(completion: Completion) -> Self {
        Self {
            completion,
            error: RemoteError::BrokenPromise,
        }
    }
}

impl Drop for FailOnDrop {
    fn drop(&mut self) {
        if self.completion.fail(self.error.clone()) {
            tracing::debug!(error = %self.error, "completion failed by its guard");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    #[test]
    fn test_first_settle_wins() {
        let completion = Completion::new();
        assert!(!completion.is_settled());

        assert!(completion.succeed(json!(1)));
        assert!(!completion.succeed(json!(2)));
        assert!(!completion.cancel());

        assert_eq!(completion.outcome(), Some(Ok(json!(1))));
    }

    #[test]
    fn test_observer_fires_once_on_settle() {
        let completion = Completion::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        completion.on_complete(move |outcome| {
            assert_eq!(outcome, &Err(RemoteError::Timeout));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        completion.fail(RemoteError::Timeout);
        completion.fail(RemoteError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_after_settle_fires_immediately() {
        let completion = Completion::new();
        completion.succeed(json!("done"));

        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        completion.on_complete(move |outcome| {
            *slot.lock() = Some(outcome.clone());
        });

        assert_eq!(*seen.lock(), Some(Ok(json!("done"))));
    }

    #[test]
    fn test_observer_may_touch_its_own_completion() {
        let completion = Completion::new();
        let inner = completion.clone();
        completion.on_complete(move |_| {
            assert!(inner.is_settled());
            assert!(!inner.cancel());
        });
        assert!(completion.succeed(Value::Null));
    }

    #[test]
    fn test_clones_share_state() {
        let a = Completion::new();
        let b = a.clone();
        let c = Completion::new();

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));

        b.succeed(json!(true));
        assert!(a.is_settled());
    }

    #[test]
    fn test_cancel_on_drop() {
        let completion = Completion::new();
        drop(FailOnDrop::cancel(completion.clone()));
        assert_eq!(completion.outcome(), Some(Err(RemoteError::Cancelled)));

        let settled = Completion::new();
        settled.succeed(json!(3));
        drop(FailOnDrop::cancel(settled.clone()));
        assert_eq!(settled.outcome(), Some(Ok(json!(3))));
    }

    #[test]
    fn test_broken_promise_on_unwind() {
        let completion = Completion::new();
        let guarded = completion.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _unanswered = FailOnDrop::broken_promise(guarded);
            panic!("handler bug");
        }));

        assert!(result.is_err());
        assert_eq!(completion.outcome(), Some(Err(RemoteError::BrokenPromise)));
    }

    #[tokio::test]
    async fn test_wait_resolves_after_settle_from_task() {
        let completion = Completion::new();
        let settler = completion.clone();

        tokio::spawn(async move {
            tokio::task::yield_now().await;
            settler.succeed(json!(42));
        });

        assert_eq!(completion.wait().await, Ok(json!(42)));
    }

    #[tokio::test]
    async fn test_concurrent_settles_pick_one_winner() {
        let completion = Completion::new();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let completion = completion.clone();
                tokio::spawn(async move { completion.succeed(json!(i)) })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.expect("task panicked") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(completion.wait().await.is_ok());
    }
}
