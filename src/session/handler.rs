//! The bridge between the engine's blocking decider contract and the
//! session layer's request/response tool calls
//!
//! Two coordinating signals: the pending checkpoint is published on a
//! watch channel (set by `handle`, cleared once the decision is consumed),
//! and decisions travel over a single-slot channel that `handle` blocks on.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};

use super::SessionError;
use crate::workflow::{Checkpoint, Decider, Decision, WorkflowError};

pub struct CheckpointHandler {
    pending_tx: watch::Sender<Option<Checkpoint>>,
    decision_tx: mpsc::Sender<Decision>,
    decision_rx: Mutex<mpsc::Receiver<Decision>>,
}

impl CheckpointHandler {
    pub fn new() -> Self {
        let (pending_tx, _) = watch::channel(None);
        let (decision_tx, decision_rx) = mpsc::channel(1);
        CheckpointHandler {
            pending_tx,
            decision_tx,
            decision_rx: Mutex::new(decision_rx),
        }
    }

    /// The checkpoint currently waiting for a decision, if any
    pub fn pending(&self) -> Option<Checkpoint> {
        self.pending_tx.borrow().clone()
    }

    /// Subscribe to pending-checkpoint transitions
    pub fn subscribe(&self) -> watch::Receiver<Option<Checkpoint>> {
        self.pending_tx.subscribe()
    }

    /// Hand a decision to the blocked engine; rejects a second decision
    /// while the first is still being consumed
    pub fn submit_decision(&self, decision: Decision) -> Result<(), SessionError> {
        self.decision_tx.try_send(decision).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SessionError::DecisionPending,
            mpsc::error::TrySendError::Closed(_) => SessionError::NoPendingCheckpoint,
        })
    }
}

impl Default for CheckpointHandler {
    fn default() -> Self {
        CheckpointHandler::new()
    }
}

#[async_trait]
impl Decider for CheckpointHandler {
    /// Publish the checkpoint, block until a decision arrives, clear the
    /// pending slot, return the decision to the engine
    async fn handle(&self, checkpoint: Checkpoint) -> Result<Decision, WorkflowError> {
        self.pending_tx.send_replace(Some(checkpoint));

        let decision = {
            let mut receiver = self.decision_rx.lock().await;
            receiver.recv().await
        };

        self.pending_tx.send_replace(None);
        decision.ok_or_else(|| WorkflowError::Decider("decision channel closed".to_string()))
    }
}
