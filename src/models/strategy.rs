use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::intent::{ParsedIntent, SearchConstraints};

/// A single keyword query against a scholar search provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Ordered keywords the query was built from
    #[serde(default)]
    pub keywords: Vec<String>,
    /// The boolean expression actually sent to the provider, never empty
    pub boolean_query: String,
}

impl SearchQuery {
    /// Deterministic query built by AND-joining the intent concepts
    pub fn from_concepts(concepts: &[String]) -> Self {
        SearchQuery {
            keywords: concepts.to_vec(),
            boolean_query: concepts.join(" AND "),
        }
    }
}

/// A full search plan for one iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStrategy {
    /// Queries to fan out, never empty after sanitization
    pub queries: Vec<SearchQuery>,
    /// Source names to dispatch to; subset of the configured sources
    #[serde(default)]
    pub sources: BTreeSet<String>,
    #[serde(default)]
    pub filters: SearchConstraints,
}

/// Feedback the decider attached to a rejected or edited result
///
/// Unknown fields are rejected so that arbitrary revised-data shapes fall
/// through to free-text coercion instead of silently parsing as empty
/// feedback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserFeedback {
    #[serde(default)]
    pub free_text_feedback: String,
    /// Paper ids the decider marked as keepers
    #[serde(default)]
    pub marked_relevant: BTreeSet<String>,
    /// Paper ids the decider explicitly discarded
    #[serde(default)]
    pub marked_irrelevant: BTreeSet<String>,
    #[serde(default)]
    pub revised_constraints: Option<SearchConstraints>,
}

impl UserFeedback {
    pub fn from_note(note: &str) -> Self {
        UserFeedback {
            free_text_feedback: note.to_string(),
            ..Default::default()
        }
    }

    /// A paper cannot be both relevant and irrelevant; drop contested ids
    /// from the irrelevant set
    pub fn resolve_conflicts(&mut self) {
        let contested: Vec<String> = self
            .marked_irrelevant
            .intersection(&self.marked_relevant)
            .cloned()
            .collect();
        for id in contested {
            self.marked_irrelevant.remove(&id);
        }
    }
}

/// Everything the query builder sees at the start of an iteration
#[derive(Debug, Clone)]
pub struct QueryBuilderInput {
    pub intent: ParsedIntent,
    /// Strategies from earlier iterations of this run, oldest first
    pub previous_strategies: Vec<SearchStrategy>,
    pub user_feedback: Option<UserFeedback>,
}
