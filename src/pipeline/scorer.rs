//! Relevance scoring stage
//!
//! Papers are scored in contiguous batches, with a semaphore bounding how
//! many batches are in flight. A failed batch degrades to default scores
//! for its papers; the rest of the input is unaffected.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

use futures::future::join_all;

use crate::llm::{ModelClient, ModelError};
use crate::models::{ParsedIntent, PaperTag, RawPaper, ScoredPaper};
use crate::prompts::{with_domain, Domain, SCORING_SYSTEM};

const TITLE_LIMIT: usize = 200;
const SNIPPET_LIMIT: usize = 500;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

const UNSCORED_REASON: &str = "Scoring unavailable";

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub batch_size: usize,
    pub max_concurrency: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        ScorerConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

pub struct RelevanceScorer {
    model: Arc<dyn ModelClient>,
    domain: Option<Domain>,
    config: ScorerConfig,
}

#[derive(Debug, serde::Deserialize)]
struct ScoreResponse {
    #[serde(default)]
    results: Vec<ScoreEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct ScoreEntry {
    paper_id: String,
    #[serde(default)]
    relevance_score: f64,
    #[serde(default)]
    relevance_reason: String,
    #[serde(default)]
    tags: Vec<String>,
}

impl RelevanceScorer {
    pub fn new(
        model: Arc<dyn ModelClient>,
        domain: Option<Domain>,
        config: ScorerConfig,
    ) -> Self {
        let config = ScorerConfig {
            batch_size: config.batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
        };
        RelevanceScorer {
            model,
            domain,
            config,
        }
    }

    /// Score every paper against the intent; `|output| = |input|` and
    /// output order equals input order regardless of batch completion order
    pub async fn score(&self, papers: Vec<RawPaper>, intent: &ParsedIntent) -> Vec<ScoredPaper> {
        if papers.is_empty() {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let batches: Vec<Vec<RawPaper>> = papers
            .chunks(self.config.batch_size)
            .map(<[RawPaper]>::to_vec)
            .collect();

        let scoring = batches.into_iter().enumerate().map(|(index, batch)| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    // The semaphore is never closed; degrade instead of panicking
                    Err(_) => return batch.into_iter().map(unscored).collect(),
                };
                self.score_batch(index, batch, intent).await
            }
        });

        // join_all keeps submission order, so no reindexing is needed even
        // when batches complete out of order
        join_all(scoring).await.into_iter().flatten().collect()
    }

    async fn score_batch(
        &self,
        index: usize,
        batch: Vec<RawPaper>,
        intent: &ParsedIntent,
    ) -> Vec<ScoredPaper> {
        match self.request_scores(&batch, intent).await {
            Ok(entries) => apply_scores(batch, entries),
            Err(err) => {
                warn!(batch = index, error = %err, "batch scoring failed, using defaults");
                batch.into_iter().map(unscored).collect()
            }
        }
    }

    async fn request_scores(
        &self,
        batch: &[RawPaper],
        intent: &ParsedIntent,
    ) -> Result<Vec<ScoreEntry>, ModelError> {
        let rendered: Vec<serde_json::Value> = batch
            .iter()
            .map(|paper| {
                serde_json::json!({
                    "id": paper.id,
                    "title": clip(&paper.title, TITLE_LIMIT),
                    "snippet": paper.snippet.as_deref().map(|s| clip(s, SNIPPET_LIMIT)),
                    "year": paper.year,
                    "venue": paper.venue,
                })
            })
            .collect();

        let message = serde_json::to_string_pretty(&serde_json::json!({
            "topic": intent.topic,
            "concepts": intent.concepts,
            "papers": rendered,
        }))
        .map_err(|e| ModelError::Response(e.to_string()))?;

        let system = with_domain(SCORING_SYSTEM, self.domain);
        let value = self.model.complete_json(&system, &message, None).await?;
        let parsed: ScoreResponse = serde_json::from_value(value)
            .map_err(|e| ModelError::Response(format!("score entries did not match: {}", e)))?;
        Ok(parsed.results)
    }
}

fn apply_scores(batch: Vec<RawPaper>, entries: Vec<ScoreEntry>) -> Vec<ScoredPaper> {
    let mut by_id: std::collections::HashMap<String, ScoreEntry> = entries
        .into_iter()
        .map(|entry| (entry.paper_id.clone(), entry))
        .collect();

    batch
        .into_iter()
        .map(|paper| match by_id.remove(&paper.id) {
            Some(entry) => ScoredPaper {
                paper,
                relevance_score: entry.relevance_score.clamp(0.0, 1.0),
                relevance_reason: entry.relevance_reason,
                tags: entry
                    .tags
                    .iter()
                    .filter_map(|tag| PaperTag::parse(tag))
                    .collect(),
            },
            None => unscored(paper),
        })
        .collect()
}

fn unscored(paper: RawPaper) -> ScoredPaper {
    ScoredPaper {
        paper,
        relevance_score: 0.0,
        relevance_reason: UNSCORED_REASON.to_string(),
        tags: Vec::new(),
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn paper(id: &str) -> RawPaper {
        RawPaper {
            id: id.to_string(),
            title: format!("Paper {}", id),
            authors: vec![],
            year: Some(2021),
            venue: None,
            doi: None,
            snippet: Some("snippet".to_string()),
            full_text_url: None,
            citation_count: 0,
            source: "test".to_string(),
            raw_data: Value::Null,
        }
    }

    fn intent() -> ParsedIntent {
        serde_json::from_value(json!({
            "topic": "solar cells",
            "concepts": ["perovskite"]
        }))
        .unwrap()
    }

    /// Scores every paper it sees at 0.5 and counts calls + peak concurrency
    struct CountingModel {
        calls: AtomicUsize,
        inflight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingModel {
        fn new() -> Self {
            CountingModel {
                calls: AtomicUsize::new(0),
                inflight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelClient for CountingModel {
        async fn complete(&self, _: &str, _: &str) -> Result<String, ModelError> {
            Ok(String::new())
        }
        async fn complete_json(
            &self,
            _: &str,
            user_message: &str,
            _: Option<&Value>,
        ) -> Result<Value, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let inflight = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(inflight, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.inflight.fetch_sub(1, Ordering::SeqCst);

            let request: Value = serde_json::from_str(user_message).unwrap();
            let results: Vec<Value> = request["papers"]
                .as_array()
                .unwrap()
                .iter()
                .map(|p| {
                    json!({
                        "paper_id": p["id"],
                        "relevance_score": 0.5,
                        "relevance_reason": "ok",
                        "tags": ["method"]
                    })
                })
                .collect();
            Ok(json!({ "results": results }))
        }
    }

    #[tokio::test]
    async fn test_batch_count_and_bounded_concurrency() {
        let model = Arc::new(CountingModel::new());
        let scorer = RelevanceScorer::new(
            model.clone(),
            None,
            ScorerConfig {
                batch_size: 3,
                max_concurrency: 2,
            },
        );
        let papers: Vec<RawPaper> = (0..10).map(|i| paper(&format!("p{i}"))).collect();
        let scored = scorer.score(papers, &intent()).await;

        assert_eq!(scored.len(), 10);
        assert_eq!(model.calls.load(Ordering::SeqCst), 4); // ceil(10/3)
        assert!(model.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let model = Arc::new(CountingModel::new());
        let scorer = RelevanceScorer::new(model.clone(), None, ScorerConfig::default());
        let scored = scorer.score(Vec::new(), &intent()).await;
        assert!(scored.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_output_order_equals_input_order() {
        let model = Arc::new(CountingModel::new());
        let scorer = RelevanceScorer::new(
            model,
            None,
            ScorerConfig {
                batch_size: 2,
                max_concurrency: 3,
            },
        );
        let papers: Vec<RawPaper> = (0..7).map(|i| paper(&format!("p{i}"))).collect();
        let scored = scorer.score(papers, &intent()).await;
        let ids: Vec<&str> = scored.iter().map(|s| s.paper.id.as_str()).collect();
        assert_eq!(ids, vec!["p0", "p1", "p2", "p3", "p4", "p5", "p6"]);
    }

    struct ScriptedModel(Value);

    #[async_trait]
    impl ModelClient for ScriptedModel {
        async fn complete(&self, _: &str, _: &str) -> Result<String, ModelError> {
            Ok(String::new())
        }
        async fn complete_json(
            &self,
            _: &str,
            _: &str,
            _: Option<&Value>,
        ) -> Result<Value, ModelError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_scores_clamped_and_tags_filtered() {
        let scorer = RelevanceScorer::new(
            Arc::new(ScriptedModel(json!({
                "results": [
                    {"paper_id": "p0", "relevance_score": 1.7, "relevance_reason": "hot", "tags": ["method", "bogus"]},
                    {"paper_id": "p1", "relevance_score": -0.2, "relevance_reason": "cold", "tags": []}
                ]
            }))),
            None,
            ScorerConfig::default(),
        );
        let scored = scorer.score(vec![paper("p0"), paper("p1")], &intent()).await;
        assert_eq!(scored[0].relevance_score, 1.0);
        assert_eq!(scored[0].tags, vec![PaperTag::Method]);
        assert_eq!(scored[1].relevance_score, 0.0);
    }

    #[tokio::test]
    async fn test_missing_papers_get_defaults() {
        let scorer = RelevanceScorer::new(
            Arc::new(ScriptedModel(json!({
                "results": [
                    {"paper_id": "p0", "relevance_score": 0.9, "relevance_reason": "good", "tags": []}
                ]
            }))),
            None,
            ScorerConfig::default(),
        );
        let scored = scorer.score(vec![paper("p0"), paper("p1")], &intent()).await;
        assert_eq!(scored.len(), 2);
        assert_eq!(scored[1].relevance_score, 0.0);
        assert_eq!(scored[1].relevance_reason, UNSCORED_REASON);
    }

    #[tokio::test]
    async fn test_failed_batch_defaults_do_not_spread() {
        struct FlakyModel(AtomicUsize);

        #[async_trait]
        impl ModelClient for FlakyModel {
            async fn complete(&self, _: &str, _: &str) -> Result<String, ModelError> {
                Ok(String::new())
            }
            async fn complete_json(
                &self,
                _: &str,
                user_message: &str,
                _: Option<&Value>,
            ) -> Result<Value, ModelError> {
                // Fail only the first batch submitted
                if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(ModelError::Other("boom".to_string()));
                }
                let request: Value = serde_json::from_str(user_message).unwrap();
                let results: Vec<Value> = request["papers"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|p| {
                        json!({"paper_id": p["id"], "relevance_score": 0.8,
                               "relevance_reason": "ok", "tags": []})
                    })
                    .collect();
                Ok(json!({ "results": results }))
            }
        }

        let scorer = RelevanceScorer::new(
            Arc::new(FlakyModel(AtomicUsize::new(0))),
            None,
            ScorerConfig {
                batch_size: 2,
                max_concurrency: 1,
            },
        );
        let papers: Vec<RawPaper> = (0..4).map(|i| paper(&format!("p{i}"))).collect();
        let scored = scorer.score(papers, &intent()).await;

        assert_eq!(scored.len(), 4);
        assert_eq!(scored[0].relevance_score, 0.0); // failed batch
        assert_eq!(scored[1].relevance_score, 0.0);
        assert_eq!(scored[2].relevance_score, 0.8); // healthy batch
        assert_eq!(scored[3].relevance_score, 0.8);
    }
}
