//! Built-in steps.
//!
//! [`Stage`](crate::Stage) assembles them as
//! `[TracingStep, IdentityStep, ResponseTrackingStep]` followed by any extra
//! steps the caller adds.

mod identity;
mod response_tracking;
mod trace;

pub use identity::IdentityStep;
pub use response_tracking::ResponseTrackingStep;
pub use trace::TracingStep;
