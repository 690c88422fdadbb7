//! Scripted providers and tools shared by the agent tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use steward_core::collaborator::SessionStore;
use steward_core::descriptor::ToolDescriptor;
use steward_core::error::{ProviderError, StoreError, ToolError};
use steward_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use steward_core::session::{Session, SessionId};
use steward_core::tool::{Tool, ToolOutput};

// ── Providers ─────────────────────────────────────────────────────────────

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue. Calls
/// past the end of the script fail with `InvalidResponse`.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    call_count: Mutex<usize>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn from_texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| make_text_response(t)).collect())
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let Some(response) = responses.get(*count).cloned() else {
            return Err(ProviderError::InvalidResponse(format!(
                "no more scripted responses (call #{}, have {})",
                *count,
                responses.len()
            )));
        };
        *count += 1;
        Ok(response)
    }
}

/// Returns the same reply forever.
pub struct RepeatingProvider {
    reply: String,
    pub calls: AtomicUsize,
}

impl RepeatingProvider {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Provider for RepeatingProvider {
    fn name(&self) -> &str {
        "repeating_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(make_text_response(&self.reply))
    }
}

/// Every call fails.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// Never answers.
pub struct HangingProvider;

#[async_trait]
impl Provider for HangingProvider {
    fn name(&self) -> &str {
        "hanging_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(ProviderError::Timeout("unreachable".into()))
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.to_string(),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// A `tool_call` action reply.
pub fn tool_call_reply(tool: &str, arguments: serde_json::Value) -> String {
    serde_json::json!({
        "action": "tool_call",
        "thought": format!("I should use {tool}"),
        "tool": tool,
        "arguments": arguments,
    })
    .to_string()
}

/// A `final_answer` action reply.
pub fn final_answer_reply(answer: &str) -> String {
    serde_json::json!({"action": "final_answer", "answer": answer}).to_string()
}

// ── Tools ─────────────────────────────────────────────────────────────────

fn descriptor(name: &str, description: &str, requires: &[String], fallbacks: &[String]) -> ToolDescriptor {
    ToolDescriptor::infer(name, description, serde_json::json!({"type": "object"}))
        .with_requires(requires.iter().cloned())
        .with_fallbacks(fallbacks.iter().cloned())
}

/// Echoes its arguments back.
pub struct EchoTool {
    name: String,
    description: String,
    requires: Vec<String>,
}

impl EchoTool {
    pub fn named(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            requires: Vec::new(),
        }
    }

    pub fn requires(mut self, tools: &[&str]) -> Self {
        self.requires = tools.iter().map(|t| t.to_string()).collect();
        self
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn describe(&self) -> ToolDescriptor {
        descriptor(&self.name, &self.description, &self.requires, &[])
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::ok(format!("{} ran with {}", self.name, arguments)))
    }
}

/// Sleeps before answering.
pub struct SlowTool {
    name: String,
    delay: Duration,
    fallbacks: Vec<String>,
    timeout: Option<Duration>,
}

impl SlowTool {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
            fallbacks: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_fallbacks(mut self, tools: &[&str]) -> Self {
        self.fallbacks = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Slow test tool"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn describe(&self) -> ToolDescriptor {
        let d = descriptor(&self.name, self.description(), &[], &self.fallbacks);
        match self.timeout {
            Some(t) => d.with_timeout(t),
            None => d,
        }
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(ToolOutput::ok("finally done"))
    }
}

/// Panics when executed.
pub struct PanicTool;

#[async_trait]
impl Tool for PanicTool {
    fn name(&self) -> &str {
        "panic_tool"
    }

    fn description(&self) -> &str {
        "Always panics"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        panic!("boom");
    }
}

/// Always fails with a retriable execution error.
pub struct FailingTool {
    name: String,
    pub calls: AtomicUsize,
}

impl FailingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason: "disk on fire".into(),
        })
    }
}

/// Succeeds and counts invocations.
pub struct CountingTool {
    name: String,
    requires: Vec<String>,
    pub calls: AtomicUsize,
}

impl CountingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            requires: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn requires(mut self, tools: &[&str]) -> Self {
        self.requires = tools.iter().map(|t| t.to_string()).collect();
        self
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Counts its calls"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn describe(&self) -> ToolDescriptor {
        descriptor(&self.name, self.description(), &self.requires, &[])
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ToolOutput::ok(format!("{} call #{n} with {}", self.name, arguments)))
    }
}

// ── Stores ────────────────────────────────────────────────────────────────

/// Keeps sessions in a map.
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<std::collections::HashMap<SessionId, Session>>,
}

#[async_trait]
impl SessionStore for MemoryStore {
    fn name(&self) -> &str {
        "memory_mock"
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.lock().unwrap().get(id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        self.sessions.lock().unwrap().insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.sessions.lock().unwrap().remove(id).is_some())
    }
}

/// Every load fails.
pub struct BrokenStore;

#[async_trait]
impl SessionStore for BrokenStore {
    fn name(&self) -> &str {
        "broken_mock"
    }

    async fn load(&self, _id: &SessionId) -> Result<Option<Session>, StoreError> {
        Err(StoreError::Storage("disk unplugged".into()))
    }

    async fn save(&self, _session: &Session) -> Result<(), StoreError> {
        Err(StoreError::Storage("disk unplugged".into()))
    }
}
