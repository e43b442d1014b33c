//! The per-message agent: admission, conversation state, and the workflow
//! that turns one inbound message into at most one reply.
//!
//! A run goes through these steps:
//!
//! 1. **Admit** the message (service, sender, activation, dedup)
//! 2. **Load history** and build the model input (directives, history, attachments)
//! 3. **Call the model**; while it asks for tools, execute them and call again
//! 4. **Materialize** the final output as images, a reaction, or text
//! 5. **Finalize**: commit turns and advance the dedup cursor
//!
//! Every step that touches the world is an activity (see [`activities`]), so
//! the same workflow runs inline or under a durable engine.

pub mod activities;
pub mod admission;
pub mod input;
pub mod loop_runner;
pub mod materializer;
pub mod response;
pub mod store;
pub mod tool_runner;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use activities::{
    ActivityExecutor, ActivityOutput, ActivityRequest, AgentActivities, DeliveryOutcome,
};
pub use admission::{AdmissionDecision, AdmissionGate, RejectReason};
pub use input::{InputBuilder, PromptSettings};
pub use loop_runner::{MessageWorkflow, WorkflowInput, WorkflowReport};
pub use materializer::{Deliveries, Materialization};
pub use response::{ALLOWED_REACTIONS, FunctionCallRequest, NO_RESPONSE};
pub use store::{
    AdmitOutcome, ConversationSnapshot, ConversationStore, DedupVerdict, FinalizeReport, SendGate,
    StoreConfig,
};
pub use tool_runner::{ToolOutcome, ToolRunner};
