//! Search stage: concurrent fan-out across the configured sources
//!
//! Result order is the concatenation of per-source results in source-name
//! order, regardless of which source finished first.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use futures::future::join_all;

use crate::models::{RawPaper, SearchStrategy};
use crate::search::ScholarSource;

pub struct Searcher {
    sources: BTreeMap<String, Arc<dyn ScholarSource>>,
}

impl Searcher {
    pub fn new(sources: BTreeMap<String, Arc<dyn ScholarSource>>) -> Self {
        Searcher { sources }
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Dispatch the strategy to every resolved source concurrently and
    /// flatten the results. Per-source failures are dropped; partial
    /// success is still success. Empty input yields an empty list.
    pub async fn search(&self, strategy: &SearchStrategy) -> Vec<RawPaper> {
        if strategy.queries.is_empty() || self.sources.is_empty() {
            return Vec::new();
        }

        // Unknown source names fall back to the full configured set
        let mut resolved: Vec<&Arc<dyn ScholarSource>> = self
            .sources
            .iter()
            .filter(|(name, _)| strategy.sources.contains(*name))
            .map(|(_, source)| source)
            .collect();
        if resolved.is_empty() {
            resolved = self.sources.values().collect();
        }

        let searches = resolved.iter().map(|source| {
            let source = Arc::clone(source);
            let strategy = strategy.clone();
            async move {
                let name = source.name().to_string();
                (name, source.search_advanced(&strategy).await)
            }
        });

        let mut papers = Vec::new();
        for (name, result) in join_all(searches).await {
            match result {
                Ok(found) => papers.extend(found),
                Err(err) => {
                    warn!(source = %name, error = %err, "source failed, dropping its results");
                }
            }
        }
        papers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SearchConstraints, SearchQuery};
    use crate::search::SearchError;
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    struct StubSource {
        name: String,
        result: Result<Vec<RawPaper>, SearchError>,
        delay_ms: u64,
    }

    #[async_trait]
    impl ScholarSource for StubSource {
        fn name(&self) -> &str {
            &self.name
        }
        async fn search_advanced(
            &self,
            _: &SearchStrategy,
        ) -> Result<Vec<RawPaper>, SearchError> {
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            self.result.clone()
        }
    }

    fn paper(id: &str, source: &str) -> RawPaper {
        RawPaper {
            id: id.to_string(),
            title: format!("Paper {}", id),
            authors: vec![],
            year: None,
            venue: None,
            doi: None,
            snippet: None,
            full_text_url: None,
            citation_count: 0,
            source: source.to_string(),
            raw_data: serde_json::Value::Null,
        }
    }

    fn strategy(sources: &[&str]) -> SearchStrategy {
        SearchStrategy {
            queries: vec![SearchQuery {
                keywords: vec![],
                boolean_query: "q".to_string(),
            }],
            sources: sources.iter().map(|s| s.to_string()).collect(),
            filters: SearchConstraints::default(),
        }
    }

    fn searcher_with(stubs: Vec<StubSource>) -> Searcher {
        let sources: BTreeMap<String, Arc<dyn ScholarSource>> = stubs
            .into_iter()
            .map(|stub| (stub.name.clone(), Arc::new(stub) as Arc<dyn ScholarSource>))
            .collect();
        Searcher::new(sources)
    }

    #[tokio::test]
    async fn test_results_concatenate_in_source_name_order() {
        // The alphabetically-later source answers first; order must not change
        let searcher = searcher_with(vec![
            StubSource {
                name: "alpha".to_string(),
                result: Ok(vec![paper("a1", "alpha")]),
                delay_ms: 50,
            },
            StubSource {
                name: "beta".to_string(),
                result: Ok(vec![paper("b1", "beta")]),
                delay_ms: 0,
            },
        ]);
        let papers = searcher.search(&strategy(&["alpha", "beta"])).await;
        let ids: Vec<&str> = papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b1"]);
    }

    #[tokio::test]
    async fn test_failed_source_dropped_partial_success_returned() {
        let searcher = searcher_with(vec![
            StubSource {
                name: "alpha".to_string(),
                result: Err(SearchError::Provider("down".to_string())),
                delay_ms: 0,
            },
            StubSource {
                name: "beta".to_string(),
                result: Ok(vec![paper("b1", "beta")]),
                delay_ms: 0,
            },
        ]);
        let papers = searcher.search(&strategy(&["alpha", "beta"])).await;
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].id, "b1");
    }

    #[tokio::test]
    async fn test_unknown_sources_fall_back_to_all() {
        let searcher = searcher_with(vec![StubSource {
            name: "alpha".to_string(),
            result: Ok(vec![paper("a1", "alpha")]),
            delay_ms: 0,
        }]);
        let papers = searcher.search(&strategy(&["nonexistent"])).await;
        assert_eq!(papers.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_queries_return_empty() {
        let searcher = searcher_with(vec![StubSource {
            name: "alpha".to_string(),
            result: Ok(vec![paper("a1", "alpha")]),
            delay_ms: 0,
        }]);
        let mut empty = strategy(&["alpha"]);
        empty.queries.clear();
        assert!(searcher.search(&empty).await.is_empty());
    }

    #[tokio::test]
    async fn test_no_sources_configured_returns_empty() {
        let searcher = Searcher::new(BTreeMap::new());
        assert!(searcher.search(&strategy(&["alpha"])).await.is_empty());
    }
}
