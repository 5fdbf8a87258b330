//! The workflow engine: drives the six stages, fires checkpoints, and
//! folds decider feedback back into the next iteration

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use serde::Serialize;

use super::checkpoint::{Checkpoint, Decider, Decision, DecisionAction};
use super::state::{merge_accumulated, WorkflowState};
use super::WorkflowError;
use crate::models::{
    PaperCollection, QueryBuilderInput, SearchStrategy, UserFeedback,
};
use crate::pipeline::{
    Deduplicator, IntentParser, QueryBuilder, RelevanceScorer, ResultOrganizer, Searcher,
};

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// The pipeline phase currently executing, for pulled progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    QueryBuilding,
    Searching,
    Deduplicating,
    Scoring,
    Organizing,
    WaitingCheckpoint,
}

#[derive(Debug, Clone)]
pub struct PhaseUpdate {
    pub phase: WorkflowPhase,
    pub details: String,
}

/// Callback the engine reports phase transitions through
pub type ProgressEmitter = Arc<dyn Fn(PhaseUpdate) + Send + Sync>;

/// The six stages, injected so tests can swap any of them out
#[derive(Clone)]
pub struct PipelineStages {
    pub intent_parser: Arc<IntentParser>,
    pub query_builder: Arc<QueryBuilder>,
    pub searcher: Arc<Searcher>,
    pub deduplicator: Arc<Deduplicator>,
    pub scorer: Arc<RelevanceScorer>,
    pub organizer: Arc<ResultOrganizer>,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub max_iterations: u32,
    /// Whether the strategy confirmation checkpoint fires (the result
    /// review checkpoint always fires when a decider is attached)
    pub strategy_checkpoint_enabled: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            strategy_checkpoint_enabled: true,
        }
    }
}

/// What a finished run hands back
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub collection: PaperCollection,
    pub state: WorkflowState,
}

pub struct WorkflowEngine {
    stages: PipelineStages,
    options: EngineOptions,
    decider: Option<Arc<dyn Decider>>,
    progress: Option<ProgressEmitter>,
}

impl WorkflowEngine {
    pub fn new(stages: PipelineStages, options: EngineOptions) -> Self {
        WorkflowEngine {
            stages,
            options,
            decider: None,
            progress: None,
        }
    }

    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn with_progress(mut self, progress: ProgressEmitter) -> Self {
        self.progress = Some(progress);
        self
    }

    fn report(&self, phase: WorkflowPhase, details: String) {
        if let Some(emitter) = &self.progress {
            emitter(PhaseUpdate { phase, details });
        }
    }

    /// Drive one run from user text to a final collection
    ///
    /// Intent parsing is fatal; decider errors propagate; each stage
    /// degrades per its own contract. Hitting the iteration ceiling
    /// returns the latest collection.
    pub async fn run(&self, user_text: &str) -> Result<WorkflowOutcome, WorkflowError> {
        let run_id = Uuid::new_v4();
        let mut state = WorkflowState::new();

        let intent = self
            .stages
            .intent_parser
            .parse(user_text)
            .await
            .map_err(WorkflowError::IntentParse)?;

        info!(%run_id, topic = %intent.topic, "run started");
        let mut last_collection = PaperCollection::empty(user_text);

        while state.current_iteration < self.options.max_iterations {
            let iteration = state.current_iteration;
            self.report(
                WorkflowPhase::QueryBuilding,
                format!("iteration {}", iteration + 1),
            );

            let input = QueryBuilderInput {
                intent: intent.clone(),
                previous_strategies: state.previous_strategies(),
                user_feedback: state.latest_feedback(),
            };
            let mut strategy = self.stages.query_builder.build(&input).await;

            if self.options.strategy_checkpoint_enabled {
                if let Some(decider) = &self.decider {
                    self.report(
                        WorkflowPhase::WaitingCheckpoint,
                        "strategy confirmation".to_string(),
                    );
                    let checkpoint =
                        Checkpoint::strategy(run_id, iteration, intent.clone(), strategy.clone());
                    let decision = decider.handle(checkpoint).await?;
                    match decision.action {
                        DecisionAction::Edit => {
                            strategy = self.apply_strategy_edit(strategy, &decision, &input);
                        }
                        DecisionAction::Reject => {
                            let mut feedback = coerce_feedback(&decision);
                            feedback.resolve_conflicts();
                            state.record(strategy, 0, Some(feedback));
                            continue;
                        }
                        DecisionAction::Approve => {}
                    }
                }
            }

            self.report(
                WorkflowPhase::Searching,
                format!("{} queries", strategy.queries.len()),
            );
            let raw = self.stages.searcher.search(&strategy).await;

            self.report(WorkflowPhase::Deduplicating, format!("{} papers", raw.len()));
            let deduped = self.stages.deduplicator.deduplicate(raw).await;

            self.report(WorkflowPhase::Scoring, format!("{} papers", deduped.len()));
            let scored = self.stages.scorer.score(deduped, &intent).await;

            self.report(WorkflowPhase::Organizing, format!("{} papers", scored.len()));
            let collection = self
                .stages
                .organizer
                .organize(scored, strategy.clone(), user_text);
            last_collection = collection.clone();

            let decision = match &self.decider {
                Some(decider) => {
                    self.report(WorkflowPhase::WaitingCheckpoint, "result review".to_string());
                    let checkpoint = Checkpoint::result(
                        run_id,
                        iteration,
                        collection.clone(),
                        state.accumulated_papers.len(),
                    );
                    decider.handle(checkpoint).await?
                }
                None => Decision::approve(),
            };

            if decision.action == DecisionAction::Approve {
                state.record(strategy, collection.papers.len(), None);
                state.is_complete = true;
                info!(%run_id, iteration, papers = collection.papers.len(), "run approved");
                return Ok(WorkflowOutcome {
                    collection: merge_accumulated(collection, &state.accumulated_papers),
                    state,
                });
            }

            let mut feedback = coerce_feedback(&decision);
            feedback.resolve_conflicts();
            state.accumulate_relevant(&collection, &feedback);
            state.record(strategy, collection.papers.len(), Some(feedback));
        }

        state.is_complete = true;
        info!(%run_id, iterations = state.current_iteration, "iteration ceiling reached");
        Ok(WorkflowOutcome {
            collection: last_collection,
            state,
        })
    }

    /// A strategy edit must deserialize as a `SearchStrategy`; anything
    /// else keeps the built strategy so the run can proceed
    fn apply_strategy_edit(
        &self,
        built: SearchStrategy,
        decision: &Decision,
        input: &QueryBuilderInput,
    ) -> SearchStrategy {
        let revised = decision
            .revised_data
            .as_ref()
            .and_then(|data| serde_json::from_value::<SearchStrategy>(data.clone()).ok());
        match revised {
            Some(strategy) => self.stages.query_builder.sanitize(strategy, &input.intent),
            None => {
                warn!("strategy edit did not contain a valid strategy, keeping built strategy");
                built
            }
        }
    }
}

/// Turn an edit/reject decision into feedback for the next iteration
fn coerce_feedback(decision: &Decision) -> UserFeedback {
    if let Some(data) = &decision.revised_data {
        if let Ok(feedback) = serde_json::from_value::<UserFeedback>(data.clone()) {
            return feedback;
        }
    }
    UserFeedback::from_note(decision.note.as_deref().unwrap_or(""))
}
