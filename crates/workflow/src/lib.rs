//! Workflow dispatch for inbound chat messages.
//!
//! The [`Dispatcher`] admits a message, registers it as its chat's newest run,
//! and executes the agent workflow either inline or on a [`DurableEngine`].
//! One workflow id per chat; a newer message supersedes whatever is running.

pub mod dispatcher;
pub mod durable;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{DispatchOutcome, Dispatcher, ExecutionMode};
pub use durable::{DurableEngine, LocalDurableEngine, RetryPolicy, RetryingExecutor, StartedWorkflow};
