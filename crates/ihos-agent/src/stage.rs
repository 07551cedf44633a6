//! Orchestration stages with validated transitions.
//!
//! Dispatch -> StructuredExtract | Route
//! StructuredExtract -> Execute (arguments complete) | Route (fallback)
//! Route -> ResolveArgs -> Execute -> Finalize -> Done

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// One step of the per-request state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Dispatch,
    StructuredExtract,
    Route,
    ResolveArgs,
    Execute,
    Finalize,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Dispatch => "dispatch",
            Stage::StructuredExtract => "structured_extract",
            Stage::Route => "route",
            Stage::ResolveArgs => "resolve_args",
            Stage::Execute => "execute",
            Stage::Finalize => "finalize",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Validate that a stage transition is allowed.
pub fn validate_transition(from: Stage, to: Stage) -> Result<(), AgentError> {
    let valid = matches!(
        (from, to),
        (Stage::Dispatch, Stage::StructuredExtract)
            | (Stage::Dispatch, Stage::Route)
            | (Stage::StructuredExtract, Stage::Execute)
            | (Stage::StructuredExtract, Stage::Route)
            | (Stage::Route, Stage::ResolveArgs)
            | (Stage::ResolveArgs, Stage::Execute)
            | (Stage::Execute, Stage::Finalize)
            | (Stage::Finalize, Stage::Done)
    );

    if valid {
        Ok(())
    } else {
        Err(AgentError::InvalidTransition(from, to))
    }
}
