//! PaperScout: checkpoint-driven research paper discovery
//!
//! A natural-language research query runs through a six-stage async
//! pipeline (intent parse, query build, search, dedup, score, organize)
//! driven by a workflow engine with two optional decider checkpoints. The
//! session layer exposes runs to out-of-process callers as
//! `start`/`decide`/`get`/`export` tool calls.

pub mod config;
pub mod export;
pub mod llm;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod search;
pub mod session;
pub mod workflow;

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

pub use config::Config;
pub use export::{render, ExportFormat};
pub use models::{Paper, PaperCollection, ParsedIntent, RawPaper, ScoredPaper, SearchStrategy};
pub use session::{SessionConfig, SessionError, SessionManager, Snapshot};
pub use workflow::{
    Checkpoint, Decider, Decision, DecisionAction, EngineOptions, PipelineStages, WorkflowEngine,
    WorkflowError, WorkflowOutcome,
};

use llm::ModelError;
use pipeline::{
    Deduplicator, IntentParser, QueryBuilder, RelevanceScorer, ResultOrganizer, Searcher,
};
use search::{ScholarSource, SearchError, SerperScholarClient};

/// Errors while wiring the pipeline from configuration
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("model client setup failed: {0}")]
    Model(#[from] ModelError),

    #[error("search client setup failed: {0}")]
    Search(#[from] SearchError),
}

/// Wire the six stages from configuration against the real model and
/// search backends
pub fn build_stages(config: &Config) -> Result<PipelineStages, SetupError> {
    let model = llm::build_client(&config.model)?;

    let search_client = Arc::new(SerperScholarClient::new(config.search.clone())?);
    let mut sources: BTreeMap<String, Arc<dyn ScholarSource>> = BTreeMap::new();
    sources.insert(search_client.name().to_string(), search_client);
    let available: std::collections::BTreeSet<String> = sources.keys().cloned().collect();

    Ok(PipelineStages {
        intent_parser: Arc::new(IntentParser::new(Arc::clone(&model), config.domain)),
        query_builder: Arc::new(QueryBuilder::new(
            Arc::clone(&model),
            config.domain,
            available,
        )),
        searcher: Arc::new(Searcher::new(sources)),
        deduplicator: Arc::new(Deduplicator::new(
            Some(Arc::clone(&model)),
            config.dedup.clone(),
        )),
        scorer: Arc::new(RelevanceScorer::new(
            model,
            config.domain,
            config.scorer.clone(),
        )),
        organizer: Arc::new(ResultOrganizer::new(config.min_relevance)),
    })
}

/// Build a session manager over the configured pipeline
pub fn build_session_manager(config: &Config) -> Result<SessionManager, SetupError> {
    let stages = build_stages(config)?;
    Ok(SessionManager::new(
        stages,
        config.engine.clone(),
        config.session.clone(),
    ))
}
