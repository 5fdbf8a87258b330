//! Session layer: out-of-process access to checkpointed runs
//!
//! A session wraps one engine run spawned as a background task. Callers
//! start a run, then repeatedly submit decisions against the session id;
//! every call returns a serialized snapshot of where the run stands.

mod handler;

pub use handler::CheckpointHandler;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::export::{self, ExportFormat};
use crate::models::PaperCollection;
use crate::workflow::{
    Checkpoint, CheckpointKind, CheckpointPayload, CheckpointSignature, Decider, Decision,
    DecisionAction, EngineOptions, PhaseUpdate, PipelineStages, WorkflowEngine, WorkflowPhase,
};

/// Result payloads larger than this are truncated on the wire
pub const RESULT_PAYLOAD_MAX_PAPERS: usize = 30;

#[derive(Debug, Error, Clone)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session has no pending checkpoint")]
    NoPendingCheckpoint,

    #[error("a decision is already being processed")]
    DecisionPending,

    #[error("session is already complete")]
    AlreadyComplete,

    #[error("session is not complete yet")]
    NotComplete,

    #[error("session ended without a result: {0}")]
    NoResult(String),

    #[error("unknown action: {0}")]
    InvalidAction(String),

    #[error("unknown export format: {0}")]
    InvalidFormat(String),

    #[error("export failed: {0}")]
    Export(String),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long `start`/`decide` wait for the run to reach a new state
    pub decide_timeout: Duration,
    /// Fallback re-check interval while waiting
    pub poll_interval: Duration,
    pub result_payload_max_papers: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            decide_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(500),
            result_payload_max_papers: RESULT_PAYLOAD_MAX_PAPERS,
        }
    }
}

/// Serialized view of a session handed to tool callers
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub session_id: String,
    pub query: String,
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub has_pending_checkpoint: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_kind: Option<CheckpointKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<WorkflowPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_count: Option<usize>,
}

/// Mutable session state, owned by the background task and the progress
/// emitter; snapshots read it under the lock
struct SessionState {
    phase: Option<WorkflowPhase>,
    phase_details: Option<String>,
    phase_updated_at: Option<DateTime<Utc>>,
    result: Option<PaperCollection>,
    error: Option<String>,
    is_complete: bool,
}

struct SessionShared {
    session_id: String,
    query: String,
    started_at: tokio::time::Instant,
    handler: Arc<CheckpointHandler>,
    state: StdMutex<SessionState>,
    completion: watch::Sender<bool>,
}

impl SessionShared {
    fn new(session_id: String, query: String, handler: Arc<CheckpointHandler>) -> Self {
        let (completion, _) = watch::channel(false);
        SessionShared {
            session_id,
            query,
            started_at: tokio::time::Instant::now(),
            handler,
            state: StdMutex::new(SessionState {
                phase: None,
                phase_details: None,
                phase_updated_at: None,
                result: None,
                error: None,
                is_complete: false,
            }),
            completion,
        }
    }

    fn set_phase(&self, update: PhaseUpdate) {
        let mut state = self.state.lock().expect("session state lock");
        state.phase = Some(update.phase);
        state.phase_details = Some(update.details);
        state.phase_updated_at = Some(Utc::now());
    }

    fn finish(&self, outcome: Result<PaperCollection, String>) {
        {
            let mut state = self.state.lock().expect("session state lock");
            match outcome {
                Ok(collection) => state.result = Some(collection),
                Err(message) => state.error = Some(message),
            }
            state.is_complete = true;
        }
        self.completion.send_replace(true);
    }

    fn is_complete(&self) -> bool {
        self.state.lock().expect("session state lock").is_complete
    }
}

struct SessionEntry {
    shared: Arc<SessionShared>,
    task: JoinHandle<()>,
}

/// Owns the sessions map and exposes the tool surface:
/// `start`, `decide`, `get`, `export`, `cleanup`
pub struct SessionManager {
    stages: PipelineStages,
    options: EngineOptions,
    config: SessionConfig,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionManager {
    pub fn new(stages: PipelineStages, options: EngineOptions, config: SessionConfig) -> Self {
        SessionManager {
            stages,
            options,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a run and wait (bounded) for its first checkpoint or completion
    pub async fn start(&self, query: &str) -> Snapshot {
        let session_id = Uuid::new_v4().to_string();
        let handler = Arc::new(CheckpointHandler::new());
        let shared = Arc::new(SessionShared::new(
            session_id.clone(),
            query.to_string(),
            Arc::clone(&handler),
        ));

        let progress_shared = Arc::clone(&shared);
        let engine = WorkflowEngine::new(self.stages.clone(), self.options.clone())
            .with_decider(handler as Arc<dyn Decider>)
            .with_progress(Arc::new(move |update| progress_shared.set_phase(update)));

        let task_shared = Arc::clone(&shared);
        let task_query = query.to_string();
        let task = tokio::spawn(async move {
            match engine.run(&task_query).await {
                Ok(outcome) => task_shared.finish(Ok(outcome.collection)),
                Err(err) => task_shared.finish(Err(err.to_string())),
            }
        });

        self.sessions.write().await.insert(
            session_id.clone(),
            SessionEntry {
                shared: Arc::clone(&shared),
                task,
            },
        );

        info!(session_id = %session_id, query, "session started");
        self.wait_for_change(&shared, None).await
    }

    /// Answer the pending checkpoint, then wait (bounded) for a *new*
    /// checkpoint or completion; a still-running pipeline yields a
    /// "processing" snapshot rather than the stale checkpoint
    pub async fn decide(
        &self,
        session_id: &str,
        action: &str,
        revised_data: Option<serde_json::Value>,
        note: Option<String>,
    ) -> Result<Snapshot, SessionError> {
        let shared = self.shared(session_id).await?;
        if shared.is_complete() {
            return Err(SessionError::AlreadyComplete);
        }
        let pending = shared
            .handler
            .pending()
            .ok_or(SessionError::NoPendingCheckpoint)?;
        let action = DecisionAction::parse(action)
            .ok_or_else(|| SessionError::InvalidAction(action.to_string()))?;

        shared.handler.submit_decision(Decision {
            action,
            revised_data,
            note,
        })?;

        Ok(self
            .wait_for_change(&shared, Some(pending.signature()))
            .await)
    }

    pub async fn get(&self, session_id: &str) -> Result<Snapshot, SessionError> {
        let shared = self.shared(session_id).await?;
        Ok(self.snapshot(&shared))
    }

    /// Render the finished collection; only valid once the session is
    /// complete with a result
    pub async fn export(&self, session_id: &str, format: &str) -> Result<String, SessionError> {
        let shared = self.shared(session_id).await?;
        let format = ExportFormat::parse(format)
            .ok_or_else(|| SessionError::InvalidFormat(format.to_string()))?;

        let state = shared.state.lock().expect("session state lock");
        if !state.is_complete {
            return Err(SessionError::NotComplete);
        }
        let collection = state.result.as_ref().ok_or_else(|| {
            SessionError::NoResult(state.error.clone().unwrap_or_default())
        })?;
        export::render(collection, format).map_err(|err| SessionError::Export(err.to_string()))
    }

    /// Cancel the background task (if still running) and drop the session
    pub async fn cleanup(&self, session_id: &str) -> Result<(), SessionError> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        entry.task.abort();
        info!(session_id, "session cleaned up");
        Ok(())
    }

    async fn shared(&self, session_id: &str) -> Result<Arc<SessionShared>, SessionError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| Arc::clone(&entry.shared))
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Wait until the session is complete or shows a pending checkpoint
    /// whose signature differs from `decided`, up to the decide timeout
    async fn wait_for_change(
        &self,
        shared: &Arc<SessionShared>,
        decided: Option<CheckpointSignature>,
    ) -> Snapshot {
        let deadline = tokio::time::Instant::now() + self.config.decide_timeout;
        let mut pending_rx = shared.handler.subscribe();
        let mut completion_rx = shared.completion.subscribe();

        loop {
            if shared.is_complete() {
                return self.snapshot(shared);
            }
            if let Some(checkpoint) = shared.handler.pending() {
                let is_new = decided
                    .as_ref()
                    .map_or(true, |signature| checkpoint.signature() != *signature);
                if is_new {
                    return self.snapshot(shared);
                }
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return self.processing_snapshot(shared);
            }
            let sleep_for = self.config.poll_interval.min(deadline - now);

            tokio::select! {
                changed = pending_rx.changed() => {
                    if changed.is_err() {
                        return self.snapshot(shared);
                    }
                }
                changed = completion_rx.changed() => {
                    if changed.is_err() {
                        return self.snapshot(shared);
                    }
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }

    /// Current view: complete beats pending checkpoint beats processing
    fn snapshot(&self, shared: &SessionShared) -> Snapshot {
        if shared.is_complete() {
            return self.complete_snapshot(shared);
        }
        match shared.handler.pending() {
            Some(checkpoint) => self.checkpoint_snapshot(shared, &checkpoint),
            None => self.processing_snapshot(shared),
        }
    }

    fn base_snapshot(&self, shared: &SessionShared) -> Snapshot {
        Snapshot {
            session_id: shared.session_id.clone(),
            query: shared.query.clone(),
            is_complete: false,
            error: None,
            has_pending_checkpoint: false,
            checkpoint_kind: None,
            checkpoint_id: None,
            checkpoint_payload: None,
            phase: None,
            phase_details: None,
            phase_updated_at: None,
            elapsed_s: None,
            paper_count: None,
        }
    }

    fn complete_snapshot(&self, shared: &SessionShared) -> Snapshot {
        let state = shared.state.lock().expect("session state lock");
        let mut snapshot = self.base_snapshot(shared);
        snapshot.is_complete = true;
        snapshot.error = state.error.clone();
        snapshot.paper_count = state.result.as_ref().map(|c| c.papers.len());
        snapshot
    }

    fn checkpoint_snapshot(&self, shared: &SessionShared, checkpoint: &Checkpoint) -> Snapshot {
        let mut snapshot = self.base_snapshot(shared);
        snapshot.has_pending_checkpoint = true;
        snapshot.checkpoint_kind = Some(checkpoint.kind());
        snapshot.checkpoint_id = Some(checkpoint.checkpoint_id());
        snapshot.checkpoint_payload = Some(serialize_payload(
            checkpoint,
            self.config.result_payload_max_papers,
        ));
        snapshot
    }

    fn processing_snapshot(&self, shared: &SessionShared) -> Snapshot {
        let state = shared.state.lock().expect("session state lock");
        let mut snapshot = self.base_snapshot(shared);
        snapshot.phase = state.phase;
        snapshot.phase_details = state.phase_details.clone();
        snapshot.phase_updated_at = state.phase_updated_at;
        snapshot.elapsed_s = Some(shared.started_at.elapsed().as_secs_f64());
        snapshot
    }
}

/// JSON-mode payload serialization: enums become string values, timestamps
/// RFC-3339; oversized result payloads are truncated with a marker
fn serialize_payload(checkpoint: &Checkpoint, max_papers: usize) -> serde_json::Value {
    match &checkpoint.payload {
        CheckpointPayload::Strategy(payload) => serde_json::json!({
            "intent": payload.intent,
            "strategy": payload.strategy,
        }),
        CheckpointPayload::Result(payload) => {
            let total_papers = payload.collection.papers.len();
            let truncated = total_papers > max_papers;
            let papers: Vec<serde_json::Value> = payload
                .collection
                .papers
                .iter()
                .take(max_papers)
                .map(|paper| {
                    serde_json::json!({
                        "id": paper.id,
                        "doi": paper.doi,
                        "title": paper.title,
                        "authors": paper.authors,
                        "year": paper.year,
                        "venue": paper.venue,
                        "relevance_score": paper.relevance_score,
                        "tags": paper.tags,
                    })
                })
                .collect();
            serde_json::json!({
                "papers": papers,
                "total_papers": total_papers,
                "truncated": truncated,
                "facets": payload.collection.facets,
                "accumulated_count": payload.accumulated_count,
            })
        }
    }
}
