//! # convoy core
//!
//! Domain types, collaborator traits, and error definitions for the convoy
//! chat orchestration engine. Nothing in here talks to the network: the
//! messaging platform, the LLM, and the settings store are all traits that
//! other crates implement.
//!
//! ## Layout
//!
//! - [`message`]: inbound messages, history turns, fingerprints
//! - [`model`]: model input and output items
//! - [`provider`], [`transport`], [`settings`]: collaborator traits
//! - [`conversation`]: per-chat bookkeeping types shared with tools
//! - [`tool`]: the tool contract and the name-keyed registry
//! - [`event`]: domain events on a broadcast bus

pub mod conversation;
pub mod error;
pub mod event;
pub mod message;
pub mod model;
pub mod provider;
pub mod settings;
pub mod tool;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use conversation::{AgentWorkflowContext, ConversationAccess, DedupCursor, ThreadContext};
pub use error::{
    ActivityError, Error, ProviderError, Result, ToolError, TransportError, WorkflowError,
};
pub use event::{DomainEvent, EventBus};
pub use message::{ALLOWED_REACTIONS, ConversationTurn, IncomingAttachment, IncomingMessage, Role};
pub use model::{ContentPart, InputItem, InputRole, ModelResponse, OutputContent, OutputItem};
pub use provider::{HostedTool, ModelRequest, Provider, ToolDefinition};
pub use settings::{InMemorySettingsStore, Responsiveness, SettingsStore};
pub use tool::{Delivery, Tool, ToolCall, ToolContext, ToolRegistry, ToolResult};
pub use transport::{
    AttachmentData, ChatInfo, OutboundAttachment, PlatformMessage, SendTextRequest, Transport,
};
