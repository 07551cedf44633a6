//! IHOS agent crate - tool orchestration for the assistant.
//!
//! A query is dispatched either to structured extraction (booking phrases)
//! or to model routing, its tool arguments are resolved, the tool runs and
//! the result is turned into a final answer. [`Assistant`] wraps that flow
//! with validation, conversation logging and streaming.

pub mod booking;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod resolver;
pub mod service;
pub mod stage;
pub mod state;
pub mod streaming;
pub mod tools;

pub use booking::{overlaps, BookingOutcome, BookingRequest, BookingService};
pub use error::{AgentError, LlmError, ToolError};
pub use llm::{GeminiClient, LanguageModel, ModelReply, ScriptedModel, ToolCall};
pub use orchestrator::{Orchestrator, DEFAULT_BOOKING_TRIGGERS, FALLBACK_TOOL};
pub use prompt::system_prompt;
pub use resolver::resolve_args;
pub use service::{AgentRequest, AgentResponse, Assistant, ToolResult};
pub use stage::Stage;
pub use state::{RequestState, ToolArgs};
pub use streaming::{StreamEnd, StreamReconciler};
pub use tools::{builtin_registry, Tool, ToolContext, ToolDescriptor, ToolRegistry};
