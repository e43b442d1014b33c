//! LLM provider implementations for convoy.
//!
//! Every provider implements `convoy_core::Provider`. The engine only ever
//! needs one: a Responses-style HTTP endpoint.

pub mod openai_responses;

pub use openai_responses::{OpenAiResponsesProvider, request_body};
