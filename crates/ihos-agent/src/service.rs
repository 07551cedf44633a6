//! Assistant facade: request validation, conversation logging and the
//! streaming variant of a request.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use ihos_storage::{ChatMessage, ConversationLog};

use crate::error::AgentError;
use crate::orchestrator::{answer_basis, finalize_prompt, Orchestrator};
use crate::state::{RequestState, ToolArgs};
use crate::streaming::{forward_emissions, send_units, StreamEnd};

pub const DEFAULT_MAX_QUERY_CHARS: usize = 4000;
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

const STREAM_BUFFER: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AgentRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: None,
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Raw result of the tool a request ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub output: String,
    pub raw_args: ToolArgs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub output: String,
    pub selected_tool: Option<String>,
    pub intermediate: Vec<String>,
    pub trace: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AgentResponse {
    fn from_state(state: RequestState, session_id: Option<String>) -> Self {
        let tool_results = state.selected_tool.as_ref().map(|name| {
            vec![ToolResult {
                tool_name: name.clone(),
                output: state.intermediate.last().cloned().unwrap_or_default(),
                raw_args: state.args_for(name).cloned().unwrap_or_default(),
            }]
        });
        Self {
            output: state.output.clone().unwrap_or_default(),
            selected_tool: state.selected_tool.clone(),
            intermediate: state.intermediate.clone(),
            tool_results,
            session_id,
            trace: state.into_trace(),
        }
    }
}

/// Entry point used by the CLI and any other front end.
pub struct Assistant {
    orchestrator: Arc<Orchestrator>,
    conversations: Option<ConversationLog>,
    max_query_chars: usize,
    history_limit: usize,
}

impl Assistant {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            conversations: None,
            max_query_chars: DEFAULT_MAX_QUERY_CHARS,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_conversation_log(mut self, log: ConversationLog) -> Self {
        self.conversations = Some(log);
        self
    }

    pub fn with_max_query_chars(mut self, max: usize) -> Self {
        self.max_query_chars = max;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    fn validate(&self, query: &str) -> Result<String, AgentError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AgentError::EmptyQuery);
        }
        let chars = query.chars().count();
        if chars > self.max_query_chars {
            return Err(AgentError::QueryTooLong(chars));
        }
        Ok(query.to_string())
    }

    /// Answer one request.
    pub async fn invoke(&self, request: AgentRequest) -> Result<AgentResponse, AgentError> {
        let query = self.validate(&request.query)?;
        let state = self.orchestrator.run(&query).await?;
        info!(
            tool = state.selected_tool.as_deref().unwrap_or("-"),
            steps = state.trace().len(),
            "request answered"
        );

        let response = AgentResponse::from_state(state, request.session_id);
        if let Some(session) = response.session_id.as_deref() {
            remember(self.conversations.as_ref(), session, &query, &response.output);
        }
        Ok(response)
    }

    /// Answer one request incrementally, one character per item.
    ///
    /// Routing and tool execution complete before the stream is returned;
    /// only the final answer is streamed. Dropping the stream cancels it.
    pub async fn stream(&self, request: AgentRequest) -> Result<ReceiverStream<String>, AgentError> {
        let query = self.validate(&request.query)?;
        let state = self.orchestrator.prepare(&query).await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let orchestrator = Arc::clone(&self.orchestrator);
        let conversations = self.conversations.clone();
        let session_id = request.session_id;
        tokio::spawn(async move {
            if let Some(answer) = stream_answer(&orchestrator, state, &tx).await {
                if let Some(session) = session_id.as_deref() {
                    remember(conversations.as_ref(), session, &query, &answer);
                }
            }
        });
        Ok(ReceiverStream::new(rx))
    }

    /// Most recent messages of `session_id`, oldest first.
    pub fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>, AgentError> {
        match &self.conversations {
            Some(log) => Ok(log.get_history(session_id, self.history_limit)?),
            None => Ok(Vec::new()),
        }
    }
}

/// Stream the final answer for a prepared request. Returns the delivered
/// text, or `None` when the receiver went away.
async fn stream_answer(
    orchestrator: &Orchestrator,
    mut state: RequestState,
    tx: &mpsc::Sender<String>,
) -> Option<String> {
    if let Some(model) = orchestrator.model() {
        let prompt = finalize_prompt(state.query(), &answer_basis(&state));
        match model.stream(&prompt).await {
            Ok(emissions) => match forward_emissions(emissions, tx).await {
                StreamEnd::Completed(text) | StreamEnd::Interrupted(text) => return Some(text),
                StreamEnd::Cancelled => return None,
                StreamEnd::FailedEarly(reason) => {
                    warn!(reason = %reason, "stream produced nothing; sending full answer")
                }
            },
            Err(e) => warn!(error = %e, "could not open stream; sending full answer"),
        }
    }

    orchestrator.finalize(&mut state).await;
    let answer = state.output.unwrap_or_default();
    send_units(tx, &answer).await.then_some(answer)
}

/// Record a finished exchange. Logging failures never fail the request.
fn remember(log: Option<&ConversationLog>, session_id: &str, query: &str, answer: &str) {
    let Some(log) = log else {
        return;
    };
    let messages = vec![ChatMessage::user(query), ChatMessage::assistant(answer)];
    if let Err(e) = log.append_messages(session_id, messages) {
        warn!(session_id, error = %e, "Failed to record conversation");
    }
}
