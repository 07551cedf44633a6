//! Language-model client.
//!
//! - `GeminiClient` talks to the Generative Language REST API
//!   (`generateContent`, `streamGenerateContent?alt=sse`).
//! - `ScriptedModel` replays canned replies for tests and demos.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use ihos_core::config::LlmConfig;

use crate::error::LlmError;
use crate::state::ToolArgs;
use crate::tools::ToolDescriptor;

/// Stream of cumulative emissions: every item is the full text so far.
pub type EmissionStream = BoxStream<'static, Result<String, LlmError>>;

/// A function call proposed by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub args: ToolArgs,
}

/// Everything a single model response carried.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// Native structured output, when the backend produced one. May be a
    /// JSON string that still needs decoding.
    pub structured: Option<Value>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Language model used by the orchestrator.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Plain completion.
    async fn invoke(&self, prompt: &str) -> Result<String, LlmError>;

    /// Completion constrained to a single JSON object.
    async fn invoke_structured(&self, prompt: &str) -> Result<ModelReply, LlmError>;

    /// Completion with the given tools offered as callable functions.
    async fn invoke_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolDescriptor],
    ) -> Result<ModelReply, LlmError>;

    /// Streaming completion yielding cumulative content.
    async fn stream(&self, prompt: &str) -> Result<EmissionStream, LlmError>;
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

/// Client for Gemini chat models.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    system_prompt: Option<String>,
}

impl GeminiClient {
    /// Build a client from config. Fails with [`LlmError::Unavailable`] when
    /// no API key is configured.
    pub fn from_config(config: &LlmConfig, system_prompt: Option<String>) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(LlmError::Unavailable)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Request(format!("Failed to build HTTP client: {}", e)))?;
        info!(model = %config.model, "Gemini client ready");
        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            system_prompt,
        })
    }

    fn url(&self, method: &str) -> String {
        let model = self.model.trim_start_matches("models/");
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    fn body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"temperature": self.temperature},
        });
        if let Some(system) = &self.system_prompt {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        body
    }

    async fn send(&self, url: &str, body: &Value) -> Result<reqwest::Response, LlmError> {
        let res = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(res)
    }

    async fn generate(&self, body: Value) -> Result<ModelReply, LlmError> {
        let res = self.send(&self.url("generateContent"), &body).await?;
        let value: Value = res
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        let reply = parse_reply(&value);
        debug!(
            model = %self.model,
            chars = reply.content.len(),
            tool_calls = reply.tool_calls.len(),
            "generateContent"
        );
        Ok(reply)
    }
}

/// Text parts and function calls of the first candidate.
pub fn parse_reply(value: &Value) -> ModelReply {
    let mut reply = ModelReply::default();
    let parts = value["candidates"][0]["content"]["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    for part in parts {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            reply.content.push_str(text);
        }
        if let Some(call) = part.get("functionCall") {
            let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            let args = call
                .get("args")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            reply.tool_calls.push(ToolCall {
                name: name.to_string(),
                args,
            });
        }
    }
    reply
}

/// Take complete lines off the front of `buffer`, returning SSE `data:` payloads.
fn drain_sse_data(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line);
        let line = line.trim();
        if let Some(data) = line.strip_prefix("data:") {
            out.push(data.trim().to_string());
        }
    }
    out
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<String, LlmError> {
        Ok(self.generate(self.body(prompt)).await?.content)
    }

    async fn invoke_structured(&self, prompt: &str) -> Result<ModelReply, LlmError> {
        let mut body = self.body(prompt);
        body["generationConfig"]["responseMimeType"] = json!("application/json");
        let mut reply = self.generate(body).await?;
        reply.structured = serde_json::from_str::<Value>(reply.content.trim()).ok();
        Ok(reply)
    }

    async fn invoke_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolDescriptor],
    ) -> Result<ModelReply, LlmError> {
        let mut body = self.body(prompt);
        if !tools.is_empty() {
            let declarations: Vec<Value> =
                tools.iter().map(ToolDescriptor::function_declaration).collect();
            body["tools"] = json!([{"functionDeclarations": declarations}]);
        }
        self.generate(body).await
    }

    async fn stream(&self, prompt: &str) -> Result<EmissionStream, LlmError> {
        let url = format!("{}?alt=sse", self.url("streamGenerateContent"));
        let res = self.send(&url, &self.body(prompt)).await?;
        let mut bytes = res.bytes_stream();
        let (tx, rx) = mpsc::channel::<Result<String, LlmError>>(32);

        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();
            let mut full = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(LlmError::Stream(e.to_string()))).await;
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                for data in drain_sse_data(&mut buffer) {
                    let Ok(value) = serde_json::from_str::<Value>(&data) else {
                        warn!("Skipping undecodable stream event");
                        continue;
                    };
                    let fragment = parse_reply(&value).content;
                    if fragment.is_empty() {
                        continue;
                    }
                    full.push_str(&fragment);
                    // Receiver gone means the client stopped listening.
                    if tx.send(Ok(full.clone())).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

// ---------------------------------------------------------------------------
// ScriptedModel - canned replies for tests and offline demos
// ---------------------------------------------------------------------------

/// One scripted response. `Fail` makes the call return an error.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(ModelReply),
    Fail(String),
}

/// Deterministic model double.
///
/// Each call kind pops its own queue. When a queue is empty, `invoke`
/// echoes the prompt, structured and tool calls return an empty reply,
/// and `stream` emits the default reply cumulatively word by word.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    invoke: Mutex<VecDeque<Scripted>>,
    structured: Mutex<VecDeque<Scripted>>,
    tools: Mutex<VecDeque<Scripted>>,
    emissions: Mutex<Option<Result<Vec<String>, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(queue: &Mutex<VecDeque<Scripted>>, item: Scripted) {
        if let Ok(mut q) = queue.lock() {
            q.push_back(item);
        }
    }

    fn pop(queue: &Mutex<VecDeque<Scripted>>) -> Option<Scripted> {
        queue.lock().ok().and_then(|mut q| q.pop_front())
    }

    fn record(&self, prompt: &str) {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }
    }

    pub fn with_answer(self, text: &str) -> Self {
        Self::push(&self.invoke, Scripted::Reply(ModelReply::text(text)));
        self
    }

    pub fn with_invoke_error(self, message: &str) -> Self {
        Self::push(&self.invoke, Scripted::Fail(message.to_string()));
        self
    }

    pub fn with_structured(self, reply: ModelReply) -> Self {
        Self::push(&self.structured, Scripted::Reply(reply));
        self
    }

    pub fn with_structured_error(self, message: &str) -> Self {
        Self::push(&self.structured, Scripted::Fail(message.to_string()));
        self
    }

    pub fn with_tool_call(self, name: &str, args: Value) -> Self {
        let reply = ModelReply {
            tool_calls: vec![ToolCall {
                name: name.to_string(),
                args: args.as_object().cloned().unwrap_or_default(),
            }],
            ..ModelReply::default()
        };
        Self::push(&self.tools, Scripted::Reply(reply));
        self
    }

    pub fn with_tool_reply(self, reply: ModelReply) -> Self {
        Self::push(&self.tools, Scripted::Reply(reply));
        self
    }

    pub fn with_tool_error(self, message: &str) -> Self {
        Self::push(&self.tools, Scripted::Fail(message.to_string()));
        self
    }

    /// Emissions returned verbatim by `stream`.
    pub fn with_emissions(self, emissions: &[&str]) -> Self {
        if let Ok(mut e) = self.emissions.lock() {
            *e = Some(Ok(emissions.iter().map(|s| s.to_string()).collect()));
        }
        self
    }

    /// Make `stream` fail before emitting anything.
    pub fn with_stream_error(self, message: &str) -> Self {
        if let Ok(mut e) = self.emissions.lock() {
            *e = Some(Err(message.to_string()));
        }
        self
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, prompt: &str) -> Result<String, LlmError> {
        self.record(prompt);
        match Self::pop(&self.invoke) {
            Some(Scripted::Reply(reply)) => Ok(reply.content),
            Some(Scripted::Fail(message)) => Err(LlmError::Request(message)),
            None => Ok(prompt.to_string()),
        }
    }

    async fn invoke_structured(&self, prompt: &str) -> Result<ModelReply, LlmError> {
        self.record(prompt);
        match Self::pop(&self.structured) {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fail(message)) => Err(LlmError::Request(message)),
            None => Ok(ModelReply::default()),
        }
    }

    async fn invoke_with_tools(
        &self,
        prompt: &str,
        _tools: &[ToolDescriptor],
    ) -> Result<ModelReply, LlmError> {
        self.record(prompt);
        match Self::pop(&self.tools) {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fail(message)) => Err(LlmError::Request(message)),
            None => Ok(ModelReply::default()),
        }
    }

    async fn stream(&self, prompt: &str) -> Result<EmissionStream, LlmError> {
        self.record(prompt);
        let scripted = self.emissions.lock().ok().and_then(|e| e.clone());
        let emissions = match scripted {
            Some(Ok(emissions)) => emissions,
            Some(Err(message)) => return Err(LlmError::Stream(message)),
            None => {
                let mut full = String::new();
                prompt
                    .split_inclusive(' ')
                    .map(|word| {
                        full.push_str(word);
                        full.clone()
                    })
                    .collect()
            }
        };
        Ok(futures::stream::iter(emissions.into_iter().map(Ok::<String, LlmError>)).boxed())
    }
}
