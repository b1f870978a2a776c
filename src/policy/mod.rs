// src/policy/mod.rs

//! Retry and error-handling policy.
//!
//! - [`strategy`] decides, per failed attempt, between retrying, tolerating,
//!   recording, or applying the workflow's [`ErrorStrategy`](crate::types::ErrorStrategy).
//! - [`backoff`] computes when a requeued task becomes eligible again.

pub mod backoff;
pub mod strategy;

pub use backoff::BackoffPolicy;
pub use strategy::{FailureDecision, FailureFacts, StrategyAction, action_for, decide};
