//! Query building stage
//!
//! Model-driven strategy construction with a deterministic fallback: the
//! pipeline keeps moving even when the model misbehaves.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

use crate::llm::{ModelClient, ModelError};
use crate::models::{
    ParsedIntent, QueryBuilderInput, SearchQuery, SearchStrategy, UserFeedback,
};
use crate::prompts::{with_domain, Domain, QUERY_BUILD_SYSTEM};

const MAX_RESULTS_CEILING: usize = 200;

pub struct QueryBuilder {
    model: Arc<dyn ModelClient>,
    domain: Option<Domain>,
    available_sources: BTreeSet<String>,
}

impl QueryBuilder {
    pub fn new(
        model: Arc<dyn ModelClient>,
        domain: Option<Domain>,
        available_sources: BTreeSet<String>,
    ) -> Self {
        QueryBuilder {
            model,
            domain,
            available_sources,
        }
    }

    /// Build a sanitized strategy; never fails
    pub async fn build(&self, input: &QueryBuilderInput) -> SearchStrategy {
        match self.build_with_model(input).await {
            Ok(strategy) => strategy,
            Err(err) => {
                warn!(error = %err, "query build failed, using deterministic fallback");
                self.fallback_strategy(&input.intent)
            }
        }
    }

    async fn build_with_model(
        &self,
        input: &QueryBuilderInput,
    ) -> Result<SearchStrategy, ModelError> {
        let system = with_domain(QUERY_BUILD_SYSTEM, self.domain);
        let message = self.render_input(input)?;
        let value = self.model.complete_json(&system, &message, None).await?;

        let strategy: SearchStrategy = serde_json::from_value(value)
            .map_err(|e| ModelError::Response(format!("strategy did not match schema: {}", e)))?;
        Ok(self.sanitize(strategy, &input.intent))
    }

    fn render_input(&self, input: &QueryBuilderInput) -> Result<String, ModelError> {
        let intent = serde_json::to_string_pretty(&input.intent)
            .map_err(|e| ModelError::Response(e.to_string()))?;

        let mut message = format!("Research intent:\n{}\n", intent);

        if !input.previous_strategies.is_empty() {
            message.push_str("\nStrategies already tried:\n");
            for (index, strategy) in input.previous_strategies.iter().enumerate() {
                let queries: Vec<&str> = strategy
                    .queries
                    .iter()
                    .map(|query| query.boolean_query.as_str())
                    .collect();
                message.push_str(&format!("{}. {}\n", index + 1, queries.join(" | ")));
            }
        }

        if let Some(feedback) = &input.user_feedback {
            message.push_str(&format!("\nUser feedback:\n{}\n", render_feedback(feedback)));
        }

        let sources: Vec<&str> = self
            .available_sources
            .iter()
            .map(String::as_str)
            .collect();
        message.push_str(&format!("\nAvailable sources: {}\n", sources.join(", ")));

        Ok(message)
    }

    /// Enforce the strategy invariants regardless of where the strategy
    /// came from (model output or a decider's replacement)
    pub fn sanitize(&self, mut strategy: SearchStrategy, intent: &ParsedIntent) -> SearchStrategy {
        strategy.sources = strategy
            .sources
            .intersection(&self.available_sources)
            .cloned()
            .collect();
        if strategy.sources.is_empty() {
            strategy.sources = self.available_sources.clone();
        }

        strategy.filters.normalize_years();

        strategy
            .queries
            .retain(|query| !query.boolean_query.trim().is_empty());
        if strategy.queries.is_empty() {
            strategy.queries.push(SearchQuery::from_concepts(&intent.concepts));
        }

        if let Some(max_results) = strategy.filters.max_results {
            strategy.filters.max_results = Some(max_results.clamp(1, MAX_RESULTS_CEILING));
        }

        strategy
    }

    /// One AND-joined query over the intent concepts, all sources, intent
    /// constraints as filters
    pub fn fallback_strategy(&self, intent: &ParsedIntent) -> SearchStrategy {
        let mut filters = intent.constraints.clone();
        filters.normalize_years();
        if let Some(max_results) = filters.max_results {
            filters.max_results = Some(max_results.clamp(1, MAX_RESULTS_CEILING));
        }

        SearchStrategy {
            queries: vec![SearchQuery::from_concepts(&intent.concepts)],
            sources: self.available_sources.clone(),
            filters,
        }
    }
}

fn render_feedback(feedback: &UserFeedback) -> String {
    let mut parts = Vec::new();
    if !feedback.free_text_feedback.is_empty() {
        parts.push(format!("Comment: {}", feedback.free_text_feedback));
    }
    if !feedback.marked_relevant.is_empty() {
        let ids: Vec<&str> = feedback.marked_relevant.iter().map(String::as_str).collect();
        parts.push(format!("Marked relevant: {}", ids.join(", ")));
    }
    if !feedback.marked_irrelevant.is_empty() {
        let ids: Vec<&str> = feedback
            .marked_irrelevant
            .iter()
            .map(String::as_str)
            .collect();
        parts.push(format!("Marked irrelevant: {}", ids.join(", ")));
    }
    if let Some(constraints) = &feedback.revised_constraints {
        parts.push(format!("Revised constraints: {:?}", constraints));
    }
    if parts.is_empty() {
        parts.push("(no specifics given)".to_string());
    }
    parts.join("\n")
}
