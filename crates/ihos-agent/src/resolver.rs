//! Argument resolution for a selected tool.

use serde_json::Value;
use tracing::debug;

use crate::state::ToolArgs;
use crate::tools::ToolDescriptor;

/// Well-known tools and the parameter that takes the raw query.
const QUERY_PARAMS: [(&str, &str); 4] = [
    ("echo", "text"),
    ("internet_search", "query"),
    ("doc_search", "query"),
    ("ihos_doc_search", "query"),
];

/// Parameter that should receive the raw query for `tool_name`, if known.
pub fn query_param_for(tool_name: &str) -> Option<&'static str> {
    QUERY_PARAMS
        .iter()
        .find(|(name, _)| *name == tool_name)
        .map(|(_, param)| *param)
}

/// Complete argument set for `descriptor`.
///
/// Non-empty `existing` arguments are returned as they are. Otherwise a
/// tool with exactly one declared parameter gets the query bound to it,
/// then the well-known table is consulted. An empty map means "call with
/// no arguments".
pub fn resolve_args(descriptor: &ToolDescriptor, existing: Option<&ToolArgs>, query: &str) -> ToolArgs {
    if let Some(args) = existing.filter(|a| !a.is_empty()) {
        return args.clone();
    }

    let mut args = ToolArgs::new();
    if let [only] = descriptor.params.as_slice() {
        debug!(tool = %descriptor.name, param = %only.name, "bound query to sole parameter");
        args.insert(only.name.clone(), Value::String(query.to_string()));
    } else if let Some(param) = query_param_for(&descriptor.name) {
        debug!(tool = %descriptor.name, param, "bound query by tool name");
        args.insert(param.to_string(), Value::String(query.to_string()));
    }
    args
}
