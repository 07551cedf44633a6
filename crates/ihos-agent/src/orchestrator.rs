//! Request orchestrator: central coordinator for one query.
//!
//! Drives a [`RequestState`] through the stages in [`crate::stage`]. Every
//! model call has a local fallback, so a request always ends with an
//! answer even when no model is configured: routing falls back to `echo`
//! and finalisation passes the tool result through unchanged.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::llm::{LanguageModel, ModelReply};
use crate::resolver::resolve_args;
use crate::stage::{validate_transition, Stage};
use crate::state::{format_args, RequestState, ToolArgs};
use crate::tools::{ToolOutcome, ToolRegistry};

/// Tool used whenever routing cannot pick one.
pub const FALLBACK_TOOL: &str = "echo";

/// Phrases that mark a booking request.
pub const DEFAULT_BOOKING_TRIGGERS: [&str; 6] = [
    "đặt phòng",
    "đặt cho tôi",
    "đặt phòng giúp",
    "đặt hộ phòng",
    "đặt cuộc họp",
    "đoặt",
];

const NO_OUTPUT: &str = "(no output)";

fn structured_prompt(query: &str) -> String {
    format!(
        "Người dùng muốn ĐẶT PHÒNG. Hãy phân tích câu hỏi dưới đây và trả về \
         một JSON duy nhất có 2 trường: 'tool_name' (ví dụ: book_meeting_room) \
         và 'args' (object với các tham số). Trả chỉ JSON, không giải thích thêm.\n\n\
         Câu hỏi: {}",
        query
    )
}

fn route_prompt(query: &str) -> String {
    format!("Câu hỏi: {}", query)
}

/// Prompt asking the model to turn a tool result into the final answer.
pub fn finalize_prompt(query: &str, output: &str) -> String {
    format!(
        "Người dùng hỏi: {}\nKết quả trung gian/tool: {}\n\
         Hãy tổng hợp và trả lời ngắn gọn bằng tiếng Việt, giữ nguyên thuật ngữ chuyên môn khi cần.",
        query, output
    )
}

/// Tool result the final answer is built from.
pub fn answer_basis(state: &RequestState) -> String {
    state
        .output
        .clone()
        .filter(|o| !o.is_empty())
        .unwrap_or_else(|| NO_OUTPUT.to_string())
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// `{tool_name, args}` from a structured reply.
///
/// The native structured field wins; a string there is decoded as JSON.
/// Without one, the text content is decoded instead.
pub fn extract_tool_call(reply: &ModelReply) -> Option<(String, ToolArgs)> {
    let value = match &reply.structured {
        Some(Value::String(s)) => serde_json::from_str::<Value>(strip_code_fence(s)).ok()?,
        Some(v) => v.clone(),
        None => serde_json::from_str::<Value>(strip_code_fence(&reply.content)).ok()?,
    };
    let obj = value.as_object()?;
    let name = obj.get("tool_name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let args = obj
        .get("args")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Some((name.to_string(), args))
}

/// Routes a query to a tool, runs it and composes the answer.
pub struct Orchestrator {
    model: Option<Arc<dyn LanguageModel>>,
    tools: ToolRegistry,
    booking_triggers: Vec<String>,
}

impl Orchestrator {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, tools: ToolRegistry) -> Self {
        Self {
            model,
            tools,
            booking_triggers: DEFAULT_BOOKING_TRIGGERS
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }

    pub fn with_booking_triggers(mut self, triggers: Vec<String>) -> Self {
        self.booking_triggers = triggers
            .into_iter()
            .map(|t| t.to_lowercase())
            .filter(|t| !t.trim().is_empty())
            .collect();
        self
    }

    pub fn model(&self) -> Option<&Arc<dyn LanguageModel>> {
        self.model.as_ref()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn is_booking_intent(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.booking_triggers
            .iter()
            .any(|t| query.contains(t.as_str()))
    }

    /// Run every stage for `query`.
    pub async fn run(&self, query: &str) -> Result<RequestState, AgentError> {
        let mut state = RequestState::new(query);
        self.drive(&mut state, Stage::Done).await?;
        Ok(state)
    }

    /// Run up to, but not including, finalisation. The caller finishes the
    /// request with [`Orchestrator::finalize`] or its own streaming variant.
    pub async fn prepare(&self, query: &str) -> Result<RequestState, AgentError> {
        let mut state = RequestState::new(query);
        self.drive(&mut state, Stage::Finalize).await?;
        Ok(state)
    }

    async fn drive(&self, state: &mut RequestState, stop_at: Stage) -> Result<(), AgentError> {
        let mut stage = Stage::Dispatch;
        while stage != stop_at {
            let next = match stage {
                Stage::Dispatch => self.dispatch(state),
                Stage::StructuredExtract => self.structured_extract(state).await,
                Stage::Route => self.route(state).await,
                Stage::ResolveArgs => self.resolve(state),
                Stage::Execute => self.execute(state).await,
                Stage::Finalize => {
                    self.finalize(state).await;
                    Stage::Done
                }
                Stage::Done => break,
            };
            validate_transition(stage, next)?;
            debug!(from = %stage, to = %next, "stage transition");
            stage = next;
        }
        Ok(())
    }

    fn dispatch(&self, state: &mut RequestState) -> Stage {
        let next = if self.is_booking_intent(state.query()) {
            Stage::StructuredExtract
        } else {
            Stage::Route
        };
        state.push_trace(format!("DISPATCH -> {}", next));
        next
    }

    async fn structured_extract(&self, state: &mut RequestState) -> Stage {
        let Some(model) = &self.model else {
            state.push_trace("LLM_STRUCTURED_NOT_AVAILABLE -> fallback router");
            return Stage::Route;
        };

        match model.invoke_structured(&structured_prompt(state.query())).await {
            Ok(reply) => {
                if let Some((tool, args)) = extract_tool_call(&reply) {
                    state.push_trace(format!("LLM_STRUCTURED -> {} {}", tool, format_args(&args)));
                    state.select(&tool, Some(args));
                    return Stage::Execute;
                }
            }
            Err(e) => {
                warn!(error = %e, "Structured extraction failed");
                state.push_trace(format!("LLM_STRUCTURED_ERROR: {}", e));
            }
        }
        state.push_trace("LLM_STRUCTURED_NO_RESULT -> fallback router");
        Stage::Route
    }

    async fn route(&self, state: &mut RequestState) -> Stage {
        if let Some(model) = &self.model {
            let descriptors = self.tools.descriptors();
            match model
                .invoke_with_tools(&route_prompt(state.query()), &descriptors)
                .await
            {
                Ok(reply) => {
                    match reply.tool_calls.into_iter().next() {
                        Some(call) => {
                            state.push_trace(format!(
                                "LLM_TOOL_SELECT -> {} {}",
                                call.name,
                                format_args(&call.args)
                            ));
                            let name = call.name;
                            state.select(&name, Some(call.args));
                        }
                        None => {
                            state.select(FALLBACK_TOOL, None);
                            state.push_trace("LLM_TOOL_SELECT_NONE -> echo");
                        }
                    }
                    return Stage::ResolveArgs;
                }
                Err(e) => {
                    warn!(error = %e, "Tool routing failed");
                    state.push_trace(format!("LLM_TOOL_ROUTE_ERROR: {}", e));
                }
            }
        }
        state.select(FALLBACK_TOOL, None);
        state.push_trace("ROUTER_DEFAULT -> echo");
        Stage::ResolveArgs
    }

    fn resolve(&self, state: &mut RequestState) -> Stage {
        let name = state
            .selected_tool
            .clone()
            .unwrap_or_else(|| FALLBACK_TOOL.to_string());
        let Some(tool) = self.tools.get(&name) else {
            state.push_trace(format!("RESOLVE_ARGS {}: not registered", name));
            return Stage::Execute;
        };

        let args = resolve_args(tool.descriptor(), state.args_for(&name), state.query());
        state.push_trace(format!("RESOLVE_ARGS {} {}", name, format_args(&args)));
        if !args.is_empty() {
            state.tool_args.insert(name, args);
        }
        Stage::Execute
    }

    async fn execute(&self, state: &mut RequestState) -> Stage {
        let name = state
            .selected_tool
            .clone()
            .unwrap_or_else(|| FALLBACK_TOOL.to_string());

        let result = match self.tools.get(&name) {
            Some(tool) => {
                let args = state.args_for(&name).cloned().unwrap_or_default();
                let outcome = ToolOutcome::from(tool.invoke(&args).await);
                if let ToolOutcome::Failure(description) = &outcome {
                    warn!(tool = %name, error = %description, "Tool failed");
                } else {
                    info!(tool = %name, "Tool executed");
                }
                outcome.render()
            }
            None if name == FALLBACK_TOOL => format!("ECHO: {}", state.query()),
            None => format!("Unknown tool: {}", name),
        };

        state.push_trace(format!("TOOL {}: {}", name, result));
        state.record_result(result);
        Stage::Finalize
    }

    /// Replace the tool result with a model-written answer. Never fails;
    /// without a usable model the tool result stands.
    pub async fn finalize(&self, state: &mut RequestState) {
        let base = answer_basis(state);
        let mut answer = base.clone();
        if let Some(model) = &self.model {
            match model.invoke(&finalize_prompt(state.query(), &base)).await {
                Ok(text) if !text.trim().is_empty() => answer = text,
                Ok(_) => state.push_trace("GEMINI_FALLBACK: empty response"),
                Err(e) => {
                    warn!(error = %e, "Finalize fell back to tool output");
                    state.push_trace(format!("GEMINI_FALLBACK: {}", e));
                }
            }
        }
        state.push_trace("FINALIZE");
        state.output = Some(answer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use crate::tools::{builtin_registry, ToolContext};
    use serde_json::json;

    fn offline() -> Orchestrator {
        Orchestrator::new(None, builtin_registry(ToolContext::default()))
    }

    fn with_model(model: ScriptedModel) -> (Orchestrator, Arc<ScriptedModel>) {
        let model = Arc::new(model);
        let dyn_model: Arc<dyn LanguageModel> = model.clone();
        (
            Orchestrator::new(Some(dyn_model), builtin_registry(ToolContext::default())),
            model,
        )
    }

    // =====================================================================
    // Dispatch
    // =====================================================================

    #[test]
    fn test_booking_intent_detection() {
        let orch = offline();
        assert!(orch.is_booking_intent("Đặt phòng họp A lúc 9h"));
        assert!(orch.is_booking_intent("làm ơn ĐẶT CUỘC HỌP chiều nay"));
        assert!(!orch.is_booking_intent("danh sách nhân viên phòng kế toán"));

        let custom = offline().with_booking_triggers(vec!["Book Room".into()]);
        assert!(custom.is_booking_intent("please book room A"));
        assert!(!custom.is_booking_intent("đặt phòng"));
    }

    #[tokio::test]
    async fn test_non_booking_query_routes() {
        let state = offline().run("tính 1 + 1").await.unwrap();
        assert_eq!(state.trace()[1], "DISPATCH -> route");
        assert!(state
            .trace()
            .iter()
            .all(|t| !t.starts_with("LLM_STRUCTURED")));
    }

    // =====================================================================
    // Degraded mode
    // =====================================================================

    #[tokio::test]
    async fn test_without_model_everything_echoes() {
        let state = offline().run("xin chào").await.unwrap();
        assert_eq!(state.selected_tool.as_deref(), Some("echo"));
        assert_eq!(state.output.as_deref(), Some("ECHO: xin chào"));
        assert_eq!(
            state.trace(),
            [
                "INIT: xin chào",
                "DISPATCH -> route",
                "ROUTER_DEFAULT -> echo",
                r#"RESOLVE_ARGS echo {"text":"xin chào"}"#,
                "TOOL echo: ECHO: xin chào",
                "FINALIZE",
            ]
        );
    }

    #[tokio::test]
    async fn test_booking_without_model_falls_back_to_router() {
        let state = offline().run("đặt phòng họp A").await.unwrap();
        assert_eq!(state.trace()[1], "DISPATCH -> structured_extract");
        assert_eq!(
            state.trace()[2],
            "LLM_STRUCTURED_NOT_AVAILABLE -> fallback router"
        );
        assert_eq!(state.output.as_deref(), Some("ECHO: đặt phòng họp A"));
    }

    #[tokio::test]
    async fn test_echo_missing_from_registry_still_answers() {
        let orch = Orchestrator::new(None, ToolRegistry::new());
        let state = orch.run("alo").await.unwrap();
        assert_eq!(state.output.as_deref(), Some("ECHO: alo"));
    }

    // =====================================================================
    // Routing
    // =====================================================================

    #[tokio::test]
    async fn test_route_takes_first_call_and_finalizes() {
        let reply = ModelReply {
            tool_calls: vec![
                crate::llm::ToolCall {
                    name: "calculator".into(),
                    args: json!({"expression": "6*7"}).as_object().cloned().unwrap(),
                },
                crate::llm::ToolCall {
                    name: "echo".into(),
                    args: ToolArgs::new(),
                },
            ],
            ..ModelReply::default()
        };
        let (orch, model) = with_model(
            ScriptedModel::new()
                .with_tool_reply(reply)
                .with_answer("Kết quả là 42."),
        );

        let state = orch.run("6 nhân 7 bằng mấy?").await.unwrap();
        assert_eq!(state.selected_tool.as_deref(), Some("calculator"));
        assert_eq!(state.intermediate, vec!["42"]);
        assert_eq!(state.output.as_deref(), Some("Kết quả là 42."));
        assert!(state
            .trace()
            .contains(&r#"LLM_TOOL_SELECT -> calculator {"expression":"6*7"}"#.to_string()));

        let prompts = model.prompts();
        assert_eq!(prompts[0], "Câu hỏi: 6 nhân 7 bằng mấy?");
        assert!(prompts[1].starts_with("Người dùng hỏi: 6 nhân 7 bằng mấy?"));
        assert!(prompts[1].contains("Kết quả trung gian/tool: 42"));
    }

    #[tokio::test]
    async fn test_route_with_no_call_uses_echo() {
        let (orch, _) = with_model(ScriptedModel::new().with_answer("chào bạn"));
        let state = orch.run("chào").await.unwrap();
        assert_eq!(state.selected_tool.as_deref(), Some("echo"));
        assert!(state
            .trace()
            .contains(&"LLM_TOOL_SELECT_NONE -> echo".to_string()));
        assert_eq!(state.intermediate, vec!["ECHO: chào"]);
    }

    #[tokio::test]
    async fn test_route_error_is_traced_and_echoes() {
        let (orch, _) = with_model(ScriptedModel::new().with_tool_error("quota"));
        let state = orch.run("chào").await.unwrap();
        assert!(state
            .trace()
            .contains(&"LLM_TOOL_ROUTE_ERROR: request failed: quota".to_string()));
        assert!(state.trace().contains(&"ROUTER_DEFAULT -> echo".to_string()));
        assert_eq!(state.selected_tool.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported() {
        let (orch, _) = with_model(
            ScriptedModel::new()
                .with_tool_call("internet_search", json!({}))
                .with_invoke_error("down"),
        );
        let state = orch.run("thời tiết hôm nay").await.unwrap();
        assert_eq!(state.output.as_deref(), Some("Unknown tool: internet_search"));
        assert!(state
            .trace()
            .contains(&"GEMINI_FALLBACK: request failed: down".to_string()));
    }

    #[tokio::test]
    async fn test_tool_failure_becomes_answer() {
        let (orch, _) = with_model(
            ScriptedModel::new()
                .with_tool_call("calculator", json!({"expression": "1/0"}))
                .with_invoke_error("down"),
        );
        let state = orch.run("1 chia 0").await.unwrap();
        assert_eq!(state.output.as_deref(), Some("ToolError: division by zero"));
    }

    // =====================================================================
    // Structured extraction
    // =====================================================================

    #[test]
    fn test_extract_tool_call_priority() {
        let native = ModelReply {
            content: "ignored".into(),
            structured: Some(json!({"tool_name": "book_meeting_room", "args": {"room_name": "A"}})),
            ..ModelReply::default()
        };
        let (name, args) = extract_tool_call(&native).unwrap();
        assert_eq!(name, "book_meeting_room");
        assert_eq!(args["room_name"], "A");

        let string_field = ModelReply {
            structured: Some(json!(r#"{"tool_name": "echo", "args": {}}"#)),
            ..ModelReply::default()
        };
        assert_eq!(extract_tool_call(&string_field).unwrap().0, "echo");

        let fenced = ModelReply::text("```json\n{\"tool_name\": \"echo\"}\n```");
        let (name, args) = extract_tool_call(&fenced).unwrap();
        assert_eq!(name, "echo");
        assert!(args.is_empty());

        assert!(extract_tool_call(&ModelReply::text("không phải JSON")).is_none());
        assert!(extract_tool_call(&ModelReply::text(r#"{"args": {}}"#)).is_none());
        assert!(extract_tool_call(&ModelReply::text("[1, 2]")).is_none());
    }

    #[tokio::test]
    async fn test_structured_success_skips_resolution() {
        let (orch, _) = with_model(
            ScriptedModel::new()
                .with_structured(ModelReply::text(r#"{"tool_name": "echo", "args": {"text": "đặt xong"}}"#))
                .with_invoke_error("down"),
        );
        let state = orch.run("đặt phòng họp B").await.unwrap();
        assert_eq!(state.output.as_deref(), Some("ECHO: đặt xong"));
        assert!(state.trace().iter().all(|t| !t.starts_with("RESOLVE_ARGS")));
        assert!(state
            .trace()
            .contains(&r#"LLM_STRUCTURED -> echo {"text":"đặt xong"}"#.to_string()));
    }

    #[tokio::test]
    async fn test_structured_garbage_falls_back() {
        let (orch, _) = with_model(
            ScriptedModel::new()
                .with_structured(ModelReply::text("xin lỗi"))
                .with_tool_call("echo", json!({"text": "fallback"})),
        );
        let state = orch.run("đặt phòng").await.unwrap();
        assert!(state
            .trace()
            .contains(&"LLM_STRUCTURED_NO_RESULT -> fallback router".to_string()));
        assert_eq!(state.intermediate, vec!["ECHO: fallback"]);
    }

    #[tokio::test]
    async fn test_structured_error_is_traced() {
        let (orch, _) = with_model(ScriptedModel::new().with_structured_error("timeout"));
        let state = orch.run("đặt phòng").await.unwrap();
        assert!(state
            .trace()
            .contains(&"LLM_STRUCTURED_ERROR: request failed: timeout".to_string()));
    }

    // =====================================================================
    // Finalize
    // =====================================================================

    #[tokio::test]
    async fn test_prepare_stops_before_finalize() {
        let orch = offline();
        let mut state = orch.prepare("hi").await.unwrap();
        assert_eq!(state.trace().last().unwrap(), "TOOL echo: ECHO: hi");
        orch.finalize(&mut state).await;
        assert_eq!(state.trace().last().unwrap(), "FINALIZE");
    }

    #[tokio::test]
    async fn test_finalize_without_output_uses_placeholder() {
        let orch = offline();
        let mut state = RequestState::new("q");
        orch.finalize(&mut state).await;
        assert_eq!(state.output.as_deref(), Some("(no output)"));
    }

    #[tokio::test]
    async fn test_trace_grows_every_stage() {
        let state = offline().run("x").await.unwrap();
        // INIT plus one entry for each of the five stages visited.
        assert_eq!(state.trace().len(), 6);
    }
}
