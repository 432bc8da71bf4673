//! `ad-llm`: the structured-generation facade.
//!
//! One trait, [`StructuredLlm`], turns prompt messages into JSON text plus
//! token counters; [`run_structured`] layers typed parsing on top. Prompts
//! are static assets keyed by phase, and every planner phase has its own
//! output struct so the engine never touches raw JSON.

pub mod client;
pub mod outputs;
pub mod prompts;
pub mod usage;

pub use client::{
    run_structured, ChatMessage, LlmRequest, MessageRole, OpenAiResponsesClient,
    StructuredLlm,
};
pub use outputs::*;
pub use prompts::Phase;
pub use usage::{TokenUsage, UsageLedger};
