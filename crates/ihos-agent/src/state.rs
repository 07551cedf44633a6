//! Per-request state threaded through the orchestration stages.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Argument map for one tool call.
pub type ToolArgs = Map<String, Value>;

/// Mutable record owned by a single request.
///
/// `query` is fixed at creation and `trace` only ever grows; everything
/// else is rewritten by the stages as the request moves along.
#[derive(Debug, Clone, Serialize)]
pub struct RequestState {
    query: String,
    pub selected_tool: Option<String>,
    pub tool_args: BTreeMap<String, ToolArgs>,
    pub intermediate: Vec<String>,
    pub output: Option<String>,
    trace: Vec<String>,
}

impl RequestState {
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        let trace = vec![format!("INIT: {}", query)];
        Self {
            query,
            selected_tool: None,
            tool_args: BTreeMap::new(),
            intermediate: Vec::new(),
            output: None,
            trace,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub fn push_trace(&mut self, entry: impl Into<String>) {
        self.trace.push(entry.into());
    }

    /// Select `tool`, recording `args` for it when given.
    pub fn select(&mut self, tool: &str, args: Option<ToolArgs>) {
        self.selected_tool = Some(tool.to_string());
        if let Some(args) = args {
            self.tool_args.insert(tool.to_string(), args);
        }
    }

    /// Recorded arguments for `tool`, if any.
    pub fn args_for(&self, tool: &str) -> Option<&ToolArgs> {
        self.tool_args.get(tool)
    }

    /// Record a tool result as the current answer.
    pub fn record_result(&mut self, result: String) {
        self.intermediate.push(result.clone());
        self.output = Some(result);
    }

    pub fn into_trace(self) -> Vec<String> {
        self.trace
    }
}

/// Compact rendering of an argument map for trace entries.
pub fn format_args(args: &ToolArgs) -> String {
    Value::Object(args.clone()).to_string()
}
