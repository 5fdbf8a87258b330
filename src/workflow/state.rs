//! Per-run workflow state: iteration history and the relevance accumulator

use serde::{Deserialize, Serialize};

use crate::models::{Paper, PaperCollection, SearchStrategy, UserFeedback};

/// What one iteration produced and what the decider said about it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub strategy: SearchStrategy,
    pub result_count: usize,
    pub feedback: Option<UserFeedback>,
}

/// State threaded through a run; discarded when the run ends except via
/// the returned collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    pub current_iteration: u32,
    pub history: Vec<IterationRecord>,
    /// Papers the decider marked relevant, deduplicated by id, first
    /// occurrence wins
    pub accumulated_papers: Vec<Paper>,
    pub is_complete: bool,
}

impl WorkflowState {
    pub fn new() -> Self {
        WorkflowState::default()
    }

    /// Close out an iteration
    pub fn record(
        &mut self,
        strategy: SearchStrategy,
        result_count: usize,
        feedback: Option<UserFeedback>,
    ) {
        self.history.push(IterationRecord {
            strategy,
            result_count,
            feedback,
        });
        self.current_iteration += 1;
    }

    pub fn previous_strategies(&self) -> Vec<SearchStrategy> {
        self.history
            .iter()
            .map(|record| record.strategy.clone())
            .collect()
    }

    pub fn latest_feedback(&self) -> Option<UserFeedback> {
        self.history
            .iter()
            .rev()
            .find_map(|record| record.feedback.clone())
    }

    /// Pull the papers the decider marked relevant out of the collection,
    /// skipping ids already accumulated
    pub fn accumulate_relevant(&mut self, collection: &PaperCollection, feedback: &UserFeedback) {
        for paper in &collection.papers {
            if feedback.marked_relevant.contains(&paper.id)
                && !self.accumulated_papers.iter().any(|kept| kept.id == paper.id)
            {
                self.accumulated_papers.push(paper.clone());
            }
        }
    }
}

/// Append accumulated papers the collection does not already contain
pub fn merge_accumulated(mut collection: PaperCollection, accumulated: &[Paper]) -> PaperCollection {
    for paper in accumulated {
        if !collection.papers.iter().any(|kept| kept.id == paper.id) {
            collection.papers.push(paper.clone());
        }
    }
    collection
}
