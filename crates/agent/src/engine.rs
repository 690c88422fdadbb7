//! Session-level entry point.
//!
//! The engine owns the session store and a lock per session. Each turn runs
//! in its own task while holding that session's lock, so turns of one
//! session never interleave while different sessions proceed in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use steward_core::collaborator::SessionStore;
use steward_core::error::StoreError;
use steward_core::intent::Intent;
use steward_core::session::{Session, SessionId};
use tokio::sync::{OwnedMutexGuard, Semaphore, mpsc};
use tracing::{error, info, warn};

use crate::compactor::CompactionResult;
use crate::react::{ReactLoop, TurnRequest};
use crate::stream_event::{TerminalState, TurnEvent};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("session {0} is busy with another turn")]
    SessionBusy(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Non-streaming view of a finished turn.
#[derive(Debug, Clone)]
pub struct TurnSummary {
    pub session_id: SessionId,
    pub state: TerminalState,
    pub text: String,
    pub error: Option<String>,
    pub used_tools: Vec<String>,
    pub tool_results: usize,
    pub intent: Option<Intent>,
    pub iterations: u32,
    pub duration_ms: u64,
    pub partial: bool,
    pub compacted: bool,
}

impl TurnSummary {
    fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            state: TerminalState::Failed,
            text: String::new(),
            error: None,
            used_tools: Vec::new(),
            tool_results: 0,
            intent: None,
            iterations: 0,
            duration_ms: 0,
            partial: false,
            compacted: false,
        }
    }

    fn absorb(&mut self, event: TurnEvent) {
        match event {
            TurnEvent::Text { content } => self.text = content,
            TurnEvent::ToolResult { .. } => self.tool_results += 1,
            TurnEvent::Complete {
                state,
                iterations,
                duration_ms,
                used_tools,
                intent,
                partial,
                compacted,
            } => {
                self.state = state;
                self.iterations = iterations;
                self.duration_ms = duration_ms;
                self.used_tools = used_tools;
                self.intent = intent.map(|i| *i);
                self.partial = partial;
                self.compacted = compacted;
            }
            TurnEvent::Error { message } => {
                self.state = TerminalState::Failed;
                self.error = Some(message);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStats {
    /// Sessions with a turn in flight
    pub active_sessions: usize,
    pub tool_count: usize,
    pub success_rate: f64,
    pub turns_processed: u64,
    pub tool_calls: u64,
    pub session_locks: usize,
}

type SessionLock = Arc<tokio::sync::Mutex<()>>;

/// Per-session mutexes. An entry lives only while a turn or a maintenance
/// call holds or waits on it.
#[derive(Clone, Default)]
struct SessionLocks {
    inner: Arc<Mutex<HashMap<SessionId, SessionLock>>>,
}

impl SessionLocks {
    fn get(&self, id: &SessionId) -> SessionLock {
        let mut locks = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id.clone()).or_default().clone()
    }

    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Wait for `lock`, which must have come from [`SessionLocks::get`].
    async fn acquire(&self, id: SessionId, lock: SessionLock) -> SessionPermit {
        let guard = lock.clone().lock_owned().await;
        SessionPermit {
            locks: self.clone(),
            id,
            lock,
            guard: Some(guard),
        }
    }

    fn try_acquire(&self, id: SessionId, lock: SessionLock) -> Option<SessionPermit> {
        let guard = lock.clone().try_lock_owned().ok()?;
        Some(SessionPermit {
            locks: self.clone(),
            id,
            lock,
            guard: Some(guard),
        })
    }

    /// Evict the entry when `lock` is the last reference outside the map.
    /// Holding the map mutex keeps anyone from cloning it meanwhile.
    fn release(&self, id: &SessionId, lock: &SessionLock) {
        let mut locks = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let idle = locks
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, lock) && Arc::strong_count(lock) == 2);
        if idle {
            locks.remove(id);
        }
    }
}

/// Exclusive hold on one session. Dropping it unlocks the session and
/// evicts its lock entry when nobody else is queued.
struct SessionPermit {
    locks: SessionLocks,
    id: SessionId,
    lock: SessionLock,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        // the guard holds its own clone of the lock
        self.guard.take();
        self.locks.release(&self.id, &self.lock);
    }
}

pub struct Engine {
    agent: Arc<ReactLoop>,
    store: Arc<dyn SessionStore>,
    locks: SessionLocks,
    active: Arc<AtomicUsize>,
    turns_processed: Arc<AtomicU64>,
}

impl Engine {
    pub fn new(agent: ReactLoop, store: Arc<dyn SessionStore>) -> Self {
        Self {
            agent: Arc::new(agent),
            store,
            locks: SessionLocks::default(),
            active: Arc::new(AtomicUsize::new(0)),
            turns_processed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn agent(&self) -> &ReactLoop {
        &self.agent
    }

    /// Start a turn and return its event stream.
    ///
    /// A request for a session that is already running a turn waits for it,
    /// or fails with [`EngineError::SessionBusy`] when busy sessions are
    /// configured to be rejected.
    pub async fn run_turn(
        &self,
        session_id: &SessionId,
        request: TurnRequest,
    ) -> Result<mpsc::Receiver<TurnEvent>, EngineError> {
        let lock = self.locks.get(session_id);
        let held = if self.agent.config().reject_busy_sessions {
            let permit = self
                .locks
                .try_acquire(session_id.clone(), lock.clone())
                .ok_or_else(|| EngineError::SessionBusy(session_id.to_string()))?;
            Some(permit)
        } else {
            None
        };

        let (tx, rx) = mpsc::channel(self.agent.config().event_buffer.max(1));
        let agent = self.agent.clone();
        let store = self.store.clone();
        let active = self.active.clone();
        let turns_processed = self.turns_processed.clone();
        let locks = self.locks.clone();
        let id = session_id.clone();

        tokio::spawn(async move {
            let permit = match held {
                Some(permit) => {
                    // the permit carries its own reference
                    drop(lock);
                    permit
                }
                None => locks.acquire(id.clone(), lock).await,
            };
            active.fetch_add(1, Ordering::SeqCst);

            let mut session = match store.load(&id).await {
                Ok(Some(session)) => session,
                Ok(None) => Session::new(id.clone()),
                Err(e) => {
                    error!(session_id = %id, store = store.name(), error = %e, "Failed to load session");
                    let _ = tx
                        .send(TurnEvent::Error {
                            message: format!("failed to load session: {e}"),
                        })
                        .await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    drop(permit);
                    return;
                }
            };

            agent.run(&mut session, &request, &tx).await;

            if let Err(e) = store.save(&session).await {
                error!(session_id = %id, store = store.name(), error = %e, "Failed to save session");
            }
            turns_processed.fetch_add(1, Ordering::SeqCst);
            active.fetch_sub(1, Ordering::SeqCst);
            // release before the event channel closes
            drop(permit);
        });

        Ok(rx)
    }

    /// Run a turn to completion and collect its events.
    pub async fn chat(&self, session_id: &SessionId, request: TurnRequest) -> Result<TurnSummary, EngineError> {
        let mut rx = self.run_turn(session_id, request).await?;
        let mut summary = TurnSummary::new(session_id.clone());
        // drain to the end so the session is saved before returning
        while let Some(event) = rx.recv().await {
            summary.absorb(event);
        }
        Ok(summary)
    }

    /// Run many turns with at most `batch_concurrency` in flight.
    /// Results come back in input order.
    pub async fn chat_batch(
        &self,
        requests: Vec<(SessionId, TurnRequest)>,
    ) -> Vec<Result<TurnSummary, EngineError>> {
        let limiter = Arc::new(Semaphore::new(self.agent.config().batch_concurrency.max(1)));
        info!(requests = requests.len(), "Batch chat starting");

        let jobs = requests.into_iter().map(|(id, request)| {
            let limiter = limiter.clone();
            async move {
                let _permit = limiter.acquire_owned().await.ok();
                self.chat(&id, request).await
            }
        });
        futures::future::join_all(jobs).await
    }

    /// Drop a session's transcript and cache.
    pub async fn clear_session(&self, session_id: &SessionId) -> Result<bool, EngineError> {
        let lock = self.locks.get(session_id);
        let _permit = self.locks.acquire(session_id.clone(), lock).await;
        let removed = self.store.delete(session_id).await?;
        info!(session_id = %session_id, removed, "Session cleared");
        Ok(removed)
    }

    /// Compact a stored session outside of a turn.
    pub async fn compact_session(
        &self,
        session_id: &SessionId,
        force: bool,
    ) -> Result<Option<CompactionResult>, EngineError> {
        let lock = self.locks.get(session_id);
        let _permit = self.locks.acquire(session_id.clone(), lock).await;
        let Some(mut session) = self.store.load(session_id).await? else {
            warn!(session_id = %session_id, "Nothing to compact, session not found");
            return Ok(None);
        };
        let result = self.agent.compactor().compact_session(&mut session, force).await;
        if result.is_some() {
            self.store.save(&session).await?;
        }
        Ok(result)
    }

    pub fn tool_catalog(&self) -> String {
        self.agent.orchestrator().catalog_summary()
    }

    pub fn stats(&self) -> EngineStats {
        let orchestrator = self.agent.orchestrator();
        EngineStats {
            active_sessions: self.active.load(Ordering::SeqCst),
            tool_count: orchestrator.tool_count(),
            success_rate: orchestrator.success_rate(),
            turns_processed: self.turns_processed.load(Ordering::SeqCst),
            tool_calls: orchestrator.total_calls(),
            session_locks: self.locks.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::ToolOrchestrator;
    use crate::test_helpers::*;
    use serde_json::json;
    use steward_config::{AgentConfig, ToolsConfig};
    use std::time::Duration;
    use steward_core::error::ProviderError;
    use steward_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use steward_core::tool::ToolRegistry;

    /// Answers after a pause and remembers the most calls it saw at once.
    #[derive(Default)]
    struct OverlapTracker {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Provider for OverlapTracker {
        fn name(&self) -> &str {
            "overlap_tracker"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(make_text_response(&final_answer_reply("done")))
        }
    }

    fn engine_with(provider: Arc<dyn Provider>, store: Arc<dyn SessionStore>, config: AgentConfig) -> Engine {
        let mut orchestrator = ToolOrchestrator::new(ToolRegistry::new(), ToolsConfig::default());
        orchestrator.register(Arc::new(EchoTool::named("file_read", "Read a file from disk")));
        let agent = ReactLoop::new(provider, "mock-model", Arc::new(orchestrator)).with_config(config);
        Engine::new(agent, store)
    }

    #[tokio::test]
    async fn chat_persists_the_session() {
        let store = Arc::new(MemoryStore::default());
        let provider = Arc::new(SequentialMockProvider::from_texts(&[
            &tool_call_reply("file_read", json!({"path": "a.txt"})),
            &final_answer_reply("It says hi."),
        ]));
        let engine = engine_with(provider, store.clone(), AgentConfig::default());
        let id = SessionId::from("s1");

        let summary = engine.chat(&id, TurnRequest::new("read a.txt")).await.unwrap();

        assert_eq!(summary.state, TerminalState::Answered);
        assert_eq!(summary.text, "It says hi.");
        assert_eq!(summary.used_tools, vec!["file_read"]);
        assert_eq!(summary.tool_results, 1);
        assert!(summary.intent.is_some());

        let saved = store.load(&id).await.unwrap().unwrap();
        assert_eq!(saved.tool_cache.len(), 1);
        assert_eq!(saved.usage.tool_calls, 1);

        let stats = engine.stats();
        assert_eq!(stats.turns_processed, 1);
        assert_eq!(stats.tool_count, 1);
        assert_eq!(stats.tool_calls, 1);
        assert_eq!(stats.active_sessions, 0);
        assert_eq!(stats.session_locks, 0);
        assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn turns_of_one_session_queue() {
        let store = Arc::new(MemoryStore::default());
        let provider = Arc::new(SequentialMockProvider::from_texts(&[
            &final_answer_reply("first"),
            &final_answer_reply("second"),
        ]));
        let engine = engine_with(provider, store.clone(), AgentConfig::default());
        let id = SessionId::from("s1");

        let mut a = engine.run_turn(&id, TurnRequest::new("one")).await.unwrap();
        let mut b = engine.run_turn(&id, TurnRequest::new("two")).await.unwrap();
        while a.recv().await.is_some() {}
        while b.recv().await.is_some() {}

        let saved = store.load(&id).await.unwrap().unwrap();
        let contents: Vec<&str> = saved.transcript().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "first", "two", "second"]);
    }

    #[tokio::test]
    async fn busy_session_can_be_rejected() {
        let config = AgentConfig {
            reject_busy_sessions: true,
            ..AgentConfig::default()
        };
        let engine = engine_with(Arc::new(HangingProvider), Arc::new(MemoryStore::default()), config);
        let id = SessionId::from("s1");

        let _first = engine.run_turn(&id, TurnRequest::new("one")).await.unwrap();
        let second = engine.run_turn(&id, TurnRequest::new("two")).await;
        assert!(matches!(second, Err(EngineError::SessionBusy(_))));

        // other sessions are unaffected
        assert!(engine.run_turn(&SessionId::from("s2"), TurnRequest::new("hi")).await.is_ok());
    }

    #[tokio::test]
    async fn load_failure_is_a_terminal_error() {
        let provider = Arc::new(SequentialMockProvider::from_texts(&[]));
        let engine = engine_with(provider, Arc::new(BrokenStore), AgentConfig::default());

        let summary = engine.chat(&SessionId::from("s1"), TurnRequest::new("hi")).await.unwrap();

        assert_eq!(summary.state, TerminalState::Failed);
        assert!(summary.error.unwrap().contains("disk unplugged"));
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let provider = Arc::new(RepeatingProvider::new(&final_answer_reply("ok")));
        let config = AgentConfig {
            batch_concurrency: 2,
            ..AgentConfig::default()
        };
        let engine = engine_with(provider.clone(), Arc::new(MemoryStore::default()), config);

        let requests = (0..5)
            .map(|i| (SessionId::from(format!("s{i}").as_str()), TurnRequest::new(format!("hello {i}"))))
            .collect();
        let results = engine.chat_batch(requests).await;

        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            let summary = result.as_ref().unwrap();
            assert_eq!(summary.session_id, SessionId::from(format!("s{i}").as_str()));
            assert_eq!(summary.state, TerminalState::Answered);
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
        assert_eq!(engine.stats().session_locks, 0);
    }

    #[tokio::test]
    async fn clear_session_removes_state() {
        let store = Arc::new(MemoryStore::default());
        let provider = Arc::new(SequentialMockProvider::from_texts(&[&final_answer_reply("hi")]));
        let engine = engine_with(provider, store.clone(), AgentConfig::default());
        let id = SessionId::from("s1");

        engine.chat(&id, TurnRequest::new("hello")).await.unwrap();
        assert!(engine.clear_session(&id).await.unwrap());
        assert!(store.load(&id).await.unwrap().is_none());
        assert_eq!(engine.stats().session_locks, 0);
        assert!(!engine.clear_session(&id).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_keeps_queued_turns_exclusive() {
        let provider = Arc::new(OverlapTracker::default());
        let engine = Arc::new(engine_with(
            provider.clone(),
            Arc::new(MemoryStore::default()),
            AgentConfig::default(),
        ));
        let id = SessionId::from("s1");

        let mut first = engine.run_turn(&id, TurnRequest::new("one")).await.unwrap();
        tokio::task::yield_now().await;
        let clearing = tokio::spawn({
            let engine = engine.clone();
            let id = id.clone();
            async move { engine.clear_session(&id).await }
        });
        tokio::task::yield_now().await;
        let mut second = engine.run_turn(&id, TurnRequest::new("two")).await.unwrap();
        tokio::task::yield_now().await;
        clearing.await.unwrap().unwrap();
        // issued after the clear while the second turn is still queued or running
        let mut third = engine.run_turn(&id, TurnRequest::new("three")).await.unwrap();

        for rx in [&mut first, &mut second, &mut third] {
            while rx.recv().await.is_some() {}
        }

        assert_eq!(provider.peak.load(Ordering::SeqCst), 1);
        let stats = engine.stats();
        assert_eq!(stats.turns_processed, 3);
        assert_eq!(stats.session_locks, 0);
    }

    #[tokio::test]
    async fn reject_mode_turns_release_their_lock() {
        let config = AgentConfig {
            reject_busy_sessions: true,
            ..AgentConfig::default()
        };
        let provider = Arc::new(RepeatingProvider::new(&final_answer_reply("ok")));
        let engine = engine_with(provider, Arc::new(MemoryStore::default()), config);

        for i in 0..3 {
            let id = SessionId::from(format!("s{i}").as_str());
            engine.chat(&id, TurnRequest::new("hi")).await.unwrap();
        }
        assert_eq!(engine.stats().session_locks, 0);
    }

    #[tokio::test]
    async fn forced_compaction_of_stored_session() {
        let store = Arc::new(MemoryStore::default());
        let id = SessionId::from("s1");
        let mut session = Session::new(id.clone());
        for i in 0..10 {
            session.push(steward_core::session::Turn::user(format!("request {i}")));
            session.push(steward_core::session::Turn::assistant(format!("answer {i}")));
        }
        store.save(&session).await.unwrap();
        let engine = engine_with(Arc::new(FailingProvider), store.clone(), AgentConfig::default());

        let result = engine.compact_session(&id, true).await.unwrap().unwrap();

        assert_eq!(result.original_turns, 20);
        let saved = store.load(&id).await.unwrap().unwrap();
        assert_eq!(saved.len(), result.compacted_turns);
        assert_eq!(saved.compaction_watermark, 1);
        assert!(engine.compact_session(&SessionId::from("missing"), true).await.unwrap().is_none());
        assert_eq!(engine.stats().session_locks, 0);
    }

    #[test]
    fn catalog_lists_registered_tools() {
        let engine = engine_with(Arc::new(FailingProvider), Arc::new(MemoryStore::default()), AgentConfig::default());
        assert!(engine.tool_catalog().contains("file_read"));
    }
}
