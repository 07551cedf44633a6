//! Tool registry and built-in tools.
//!
//! A tool is a named capability with declared parameters. The registry
//! maps names to implementations and hands descriptors to the language
//! model for function calling.

pub mod booking;
pub mod calculator;
pub mod doc_search;
pub mod echo;
pub mod employees;
pub mod hospitals;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use ihos_knowledge::KnowledgePipeline;
use ihos_storage::BusinessRepository;

use crate::booking::BookingService;
use crate::error::ToolError;
use crate::state::ToolArgs;

pub use booking::{BookMeetingRoomTool, CheckRoomAvailabilityTool};
pub use calculator::CalculatorTool;
pub use doc_search::DocSearchTool;
pub use echo::EchoTool;
pub use employees::{AllEmployeesTool, EmployeesByDepartmentTool};
pub use hospitals::HospitalListTool;

/// JSON type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
}

impl ParamType {
    fn schema_name(self) -> &'static str {
        match self {
            ParamType::String => "STRING",
            ParamType::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    pub kind: ParamType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ToolParam {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind: ParamType::String,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &str, description: &str, default: Option<Value>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind: ParamType::String,
            required: false,
            default,
        }
    }

    pub fn kind(mut self, kind: ParamType) -> Self {
        self.kind = kind;
        self
    }
}

/// Name, description and parameter list of a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, param: ToolParam) -> Self {
        self.params.push(param);
        self
    }

    /// Function declaration in the Gemini `functionDeclarations` shape.
    pub fn function_declaration(&self) -> Value {
        let mut decl = json!({
            "name": self.name,
            "description": self.description,
        });
        if !self.params.is_empty() {
            let properties: serde_json::Map<String, Value> = self
                .params
                .iter()
                .map(|p| {
                    (
                        p.name.clone(),
                        json!({"type": p.kind.schema_name(), "description": p.description}),
                    )
                })
                .collect();
            let required: Vec<&str> = self
                .params
                .iter()
                .filter(|p| p.required)
                .map(|p| p.name.as_str())
                .collect();
            decl["parameters"] = json!({
                "type": "OBJECT",
                "properties": properties,
                "required": required,
            });
        }
        decl
    }
}

/// A callable capability.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    async fn invoke(&self, args: &ToolArgs) -> Result<String, ToolError>;
}

/// What a tool call produced, success or failure, as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    Failure(String),
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    /// Text shown to the user; failures read `ToolError: <description>`.
    pub fn render(&self) -> String {
        match self {
            ToolOutcome::Success(text) => text.clone(),
            ToolOutcome::Failure(description) => format!("ToolError: {}", description),
        }
    }
}

impl From<Result<String, ToolError>> for ToolOutcome {
    fn from(result: Result<String, ToolError>) -> Self {
        match result {
            Ok(text) => ToolOutcome::Success(text),
            Err(e) => ToolOutcome::Failure(e.to_string()),
        }
    }
}

/// Name-indexed tool table. Registration order is kept for descriptors.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool of the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.descriptor().name.clone();
        match self.by_name.get(&name) {
            Some(&i) => self.tools[i] = tool,
            None => {
                self.by_name.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor().clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|t| t.descriptor().name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Everything the built-in tools may need. Missing pieces leave their
/// tools out of the registry.
#[derive(Default, Clone)]
pub struct ToolContext {
    pub repository: Option<BusinessRepository>,
    pub knowledge: Option<Arc<KnowledgePipeline>>,
    pub default_k: Option<usize>,
}

/// Registry holding every built-in tool the context can support.
pub fn builtin_registry(ctx: ToolContext) -> ToolRegistry {
    let mut registry = ToolRegistry::new()
        .with(Arc::new(EchoTool::new()))
        .with(Arc::new(CalculatorTool::new()));

    if let Some(pipeline) = ctx.knowledge {
        let tool = DocSearchTool::new(pipeline)
            .with_default_k(ctx.default_k.unwrap_or(ihos_knowledge::pipeline::DEFAULT_TOP_K));
        registry.register(Arc::new(tool));
    }

    if let Some(repo) = ctx.repository {
        let bookings = Arc::new(BookingService::new(repo.clone()));
        registry.register(Arc::new(CheckRoomAvailabilityTool::new(Arc::clone(&bookings))));
        registry.register(Arc::new(BookMeetingRoomTool::new(bookings)));
        registry.register(Arc::new(AllEmployeesTool::new(repo.clone())));
        registry.register(Arc::new(EmployeesByDepartmentTool::new(repo.clone())));
        registry.register(Arc::new(HospitalListTool::new(repo)));
    }

    registry
}

// ---- Argument helpers ----

/// String value of `key`; numbers and booleans are rendered as text.
pub fn arg_str(args: &ToolArgs, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Non-blank string value of `key`, or an argument error.
pub fn require_str(args: &ToolArgs, key: &str) -> Result<String, ToolError> {
    arg_str(args, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{}'", key)))
}

/// Non-negative integer value of `key`; numeric strings are accepted.
pub fn arg_usize(args: &ToolArgs, key: &str) -> Result<Option<usize>, ToolError> {
    let Some(value) = args.get(key) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        Value::Null => return Ok(None),
        _ => None,
    };
    parsed
        .map(|n| Some(n as usize))
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{}' must be a non-negative integer", key)))
}
