//! Error types for the assistant.

use ihos_core::error::IhosError;
use ihos_knowledge::KnowledgeError;

use crate::stage::Stage;

/// Errors from a language-model call.
///
/// None of these fail a request on their own; the orchestrator traces
/// them and takes the fallback path for the stage that made the call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("language model is not configured")]
    Unavailable,
    #[error("request failed: {0}")]
    Request(String),
    #[error("model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode model response: {0}")]
    Decode(String),
    #[error("stream failed: {0}")]
    Stream(String),
}

/// Errors raised inside a tool. Rendered to the user as `ToolError: <message>`.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
}

impl From<IhosError> for ToolError {
    fn from(err: IhosError) -> Self {
        ToolError::Storage(err.to_string())
    }
}

/// Errors returned to callers of the assistant.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("query cannot be empty")]
    EmptyQuery,
    #[error("query exceeds maximum length of {0} characters")]
    QueryTooLong(usize),
    #[error("Invalid stage transition: {0} -> {1}")]
    InvalidTransition(Stage, Stage),
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),
}

impl From<IhosError> for AgentError {
    fn from(err: IhosError) -> Self {
        AgentError::Storage(err.to_string())
    }
}
