//! Shared mocks for the integration scenarios: a scripted model client, a
//! scripted search source, and a scripted decider.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use paperscout::llm::{ModelClient, ModelError};
use paperscout::models::{RawPaper, SearchStrategy};
use paperscout::pipeline::{
    DedupConfig, Deduplicator, IntentParser, QueryBuilder, RelevanceScorer, ResultOrganizer,
    ScorerConfig, Searcher,
};
use paperscout::search::{ScholarSource, SearchError};
use paperscout::workflow::{
    Checkpoint, CheckpointKind, Decider, Decision, PipelineStages, WorkflowError,
};

/// Model client that answers each stage's prompt with canned JSON.
///
/// Stage dispatch keys off distinctive phrases in the system prompts;
/// scoring responses are generated from the per-paper score table.
pub struct MockModel {
    pub intent: Value,
    pub strategy: Value,
    /// relevance score per paper id; unknown ids score 0.5
    pub scores: HashMap<String, f64>,
    /// (stage, user message) per complete_json call, in call order
    pub calls: Mutex<Vec<(String, String)>>,
}

impl MockModel {
    pub fn new() -> Self {
        MockModel {
            intent: json!({
                "topic": "perovskite solar cells",
                "concepts": ["perovskite", "solar cell"],
                "intent_type": "survey"
            }),
            strategy: json!({
                "queries": [
                    {"keywords": ["perovskite"], "boolean_query": "perovskite AND solar cell"}
                ],
                "sources": ["stub"],
                "filters": {}
            }),
            scores: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_score(mut self, paper_id: &str, score: f64) -> Self {
        self.scores.insert(paper_id.to_string(), score);
        self
    }

    pub fn calls_for(&self, stage: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _)| kind == stage)
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn score_response(&self, user_message: &str) -> Value {
        let request: Value = serde_json::from_str(user_message).expect("scoring request is JSON");
        let results: Vec<Value> = request["papers"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|paper| {
                let id = paper["id"].as_str().unwrap_or_default();
                let score = self.scores.get(id).copied().unwrap_or(0.5);
                json!({
                    "paper_id": id,
                    "relevance_score": score,
                    "relevance_reason": "scripted",
                    "tags": ["method"]
                })
            })
            .collect();
        json!({ "results": results })
    }
}

#[async_trait]
impl ModelClient for MockModel {
    async fn complete(&self, _: &str, _: &str) -> Result<String, ModelError> {
        Ok(String::new())
    }

    async fn complete_json(
        &self,
        system_prompt: &str,
        user_message: &str,
        _: Option<&Value>,
    ) -> Result<Value, ModelError> {
        let (stage, response) = if system_prompt.contains("query analyst") {
            ("intent", self.intent.clone())
        } else if system_prompt.contains("search strategist") {
            ("strategy", self.strategy.clone())
        } else if system_prompt.contains("relevance judge") {
            ("score", self.score_response(user_message))
        } else if system_prompt.contains("duplicate academic papers") {
            ("dedup", json!({"groups": []}))
        } else {
            return Err(ModelError::Response(format!(
                "unexpected prompt: {}",
                &system_prompt[..system_prompt.len().min(60)]
            )));
        };

        self.calls
            .lock()
            .unwrap()
            .push((stage.to_string(), user_message.to_string()));
        Ok(response)
    }
}

/// Search source that replays a scripted sequence of result sets and
/// records every strategy it was handed.
pub struct StubSource {
    name: String,
    script: Mutex<VecDeque<Vec<RawPaper>>>,
    pub received: Mutex<Vec<SearchStrategy>>,
    delay: Option<Duration>,
}

impl StubSource {
    pub fn new(name: &str, script: Vec<Vec<RawPaper>>) -> Self {
        StubSource {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            received: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn received_queries(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .flat_map(|strategy| {
                strategy
                    .queries
                    .iter()
                    .map(|query| query.boolean_query.clone())
            })
            .collect()
    }
}

#[async_trait]
impl ScholarSource for StubSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search_advanced(
        &self,
        strategy: &SearchStrategy,
    ) -> Result<Vec<RawPaper>, SearchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.received.lock().unwrap().push(strategy.clone());
        Ok(self.script.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Decider that replays a scripted decision sequence and records every
/// checkpoint it saw. Runs out of script -> approves.
pub struct ScriptedDecider {
    script: Mutex<VecDeque<Decision>>,
    pub seen: Mutex<Vec<(CheckpointKind, u32)>>,
}

impl ScriptedDecider {
    pub fn new(script: Vec<Decision>) -> Self {
        ScriptedDecider {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen_checkpoints(&self) -> Vec<(CheckpointKind, u32)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Decider for ScriptedDecider {
    async fn handle(&self, checkpoint: Checkpoint) -> Result<Decision, WorkflowError> {
        self.seen
            .lock()
            .unwrap()
            .push((checkpoint.kind(), checkpoint.iteration));
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Decision::approve))
    }
}

pub fn paper(id: &str, title: &str) -> RawPaper {
    RawPaper {
        id: id.to_string(),
        title: title.to_string(),
        authors: vec!["A. Author".to_string()],
        year: Some(2022),
        venue: Some("Test Venue".to_string()),
        doi: None,
        snippet: Some("An abstract.".to_string()),
        full_text_url: None,
        citation_count: 5,
        source: "stub".to_string(),
        raw_data: Value::Null,
    }
}

/// Wire the six stages over the mocks
pub fn stages_with(model: Arc<MockModel>, sources: Vec<Arc<StubSource>>) -> PipelineStages {
    let source_map: BTreeMap<String, Arc<dyn ScholarSource>> = sources
        .into_iter()
        .map(|source| {
            (
                source.name().to_string(),
                source as Arc<dyn ScholarSource>,
            )
        })
        .collect();
    let available: std::collections::BTreeSet<String> = source_map.keys().cloned().collect();

    let model_client: Arc<dyn ModelClient> = model;
    PipelineStages {
        intent_parser: Arc::new(IntentParser::new(Arc::clone(&model_client), None)),
        query_builder: Arc::new(QueryBuilder::new(
            Arc::clone(&model_client),
            None,
            available,
        )),
        searcher: Arc::new(Searcher::new(source_map)),
        deduplicator: Arc::new(Deduplicator::new(
            Some(Arc::clone(&model_client)),
            DedupConfig::default(),
        )),
        scorer: Arc::new(RelevanceScorer::new(
            model_client,
            None,
            ScorerConfig::default(),
        )),
        organizer: Arc::new(ResultOrganizer::new(0.3)),
    }
}
