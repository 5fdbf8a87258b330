//! Checkpoint protocol, run state, and the workflow engine

pub mod checkpoint;
pub mod engine;
pub mod state;

pub use checkpoint::{
    Checkpoint, CheckpointKind, CheckpointPayload, CheckpointSignature, Decider, Decision,
    DecisionAction, ResultPayload, StrategyPayload,
};
pub use engine::{
    EngineOptions, PhaseUpdate, PipelineStages, ProgressEmitter, WorkflowEngine, WorkflowOutcome,
    WorkflowPhase, DEFAULT_MAX_ITERATIONS,
};
pub use state::{merge_accumulated, IterationRecord, WorkflowState};

use thiserror::Error;

use crate::llm::ModelError;

/// Errors that abort a run
#[derive(Debug, Error, Clone)]
pub enum WorkflowError {
    /// A run cannot proceed without a parsed intent
    #[error("intent parsing failed: {0}")]
    IntentParse(#[source] ModelError),

    /// The decider itself failed; its errors always propagate
    #[error("decider failed: {0}")]
    Decider(String),
}
