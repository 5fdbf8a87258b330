//! Scholar search client for a serper-shaped Google Scholar API
//!
//! One POST per result page, paced by the shared rate limiter, with
//! jittered exponential backoff on the transient error class. Mid-stream
//! pagination failures degrade to the results already collected.

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::{RateLimiter, ScholarSource, SearchError};
use crate::models::{RawPaper, SearchStrategy};
use crate::search::parse::{extract_doi, normalize_title, parse_publication_info};

const API_URL: &str = "https://google.serper.dev/scholar";

/// The provider serves at most this many records per page
pub const PROVIDER_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone)]
pub struct SearchClientConfig {
    pub api_key: String,
    /// Outbound requests per second
    pub requests_per_second: f64,
    /// Retries after the first attempt, per page
    pub max_retries: u32,
    /// Per-run request ceiling; `None` means unlimited
    pub max_calls: Option<u32>,
    pub request_timeout_secs: u64,
    /// Budget applied when a strategy carries no max_results filter
    pub default_max_results: usize,
}

impl Default for SearchClientConfig {
    fn default() -> Self {
        SearchClientConfig {
            api_key: String::new(),
            requests_per_second: 1.0,
            max_retries: 3,
            max_calls: None,
            request_timeout_secs: 30,
            default_max_results: 50,
        }
    }
}

#[derive(Debug, Serialize)]
struct PageRequest<'a> {
    q: &'a str,
    page: usize,
    num: usize,
    #[serde(skip_serializing_if = "Option::is_none", rename = "as_ylo")]
    year_from: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "as_yhi")]
    year_to: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "hl")]
    language: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default)]
    organic: Vec<ProviderRecord>,
    #[serde(default)]
    error: Option<String>,
}

/// One organic scholar result as the provider returns it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    publication_info: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    cited_by: Option<u32>,
    #[serde(default)]
    pdf_url: Option<String>,
}

/// Rate-limited, retrying client for the scholar search provider
pub struct SerperScholarClient {
    client: Client,
    config: SearchClientConfig,
    rate_limiter: RateLimiter,
    calls_made: AtomicU32,
}

impl SerperScholarClient {
    pub fn new(config: SearchClientConfig) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let rate_limiter = RateLimiter::new(config.requests_per_second);
        Ok(SerperScholarClient {
            client,
            config,
            rate_limiter,
            calls_made: AtomicU32::new(0),
        })
    }

    /// Whether another outbound request fits under the per-run ceiling
    fn consume_call_budget(&self) -> bool {
        match self.config.max_calls {
            None => {
                self.calls_made.fetch_add(1, Ordering::SeqCst);
                true
            }
            Some(limit) => {
                let mut current = self.calls_made.load(Ordering::SeqCst);
                loop {
                    if current >= limit {
                        return false;
                    }
                    match self.calls_made.compare_exchange(
                        current,
                        current + 1,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    ) {
                        Ok(_) => return true,
                        Err(observed) => current = observed,
                    }
                }
            }
        }
    }

    /// Fetch one result page, retrying the transient error class
    async fn fetch_page(
        &self,
        query: &str,
        page: usize,
        num: usize,
        year_from: Option<i32>,
        year_to: Option<i32>,
        language: Option<&str>,
    ) -> Result<Vec<ProviderRecord>, SearchError> {
        let mut last_message = String::new();

        for attempt in 0..=self.config.max_retries {
            if !self.consume_call_budget() {
                debug!(query, page, "search call ceiling reached, treating page as empty");
                return Ok(Vec::new());
            }

            self.rate_limiter.acquire().await;

            let request = PageRequest {
                q: query,
                page: page + 1, // provider pages are 1-based
                num,
                year_from,
                year_to,
                language,
            };

            let result = self
                .client
                .post(API_URL)
                .header("X-API-KEY", &self.config.api_key)
                .json(&request)
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(err) if err.is_timeout() || err.is_connect() => {
                    last_message = err.to_string();
                    warn!(query, page, attempt, error = %err, "transport error, will retry");
                    if attempt < self.config.max_retries {
                        self.backoff(attempt).await;
                    }
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let status = response.status();
            match status {
                StatusCode::OK => {
                    let body: PageResponse = response
                        .json()
                        .await
                        .map_err(SearchError::from)?;
                    if let Some(message) = body.error {
                        return Err(SearchError::Provider(message));
                    }
                    return Ok(body.organic);
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    let message = response.text().await.unwrap_or_default();
                    return Err(SearchError::Auth {
                        status: status.as_u16(),
                        message,
                    });
                }
                StatusCode::TOO_MANY_REQUESTS
                | StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::SERVICE_UNAVAILABLE => {
                    last_message = format!("HTTP {}", status.as_u16());
                    warn!(query, page, attempt, %status, "transient status, will retry");
                    if attempt < self.config.max_retries {
                        self.backoff(attempt).await;
                    }
                }
                _ => {
                    let message = response.text().await.unwrap_or_default();
                    return Err(SearchError::Provider(format!(
                        "unexpected status {}: {}",
                        status, message
                    )));
                }
            }
        }

        Err(SearchError::TransientExhausted {
            attempts: self.config.max_retries + 1,
            message: last_message,
        })
    }

    /// `min(16, 2^attempt) + uniform(0,1)` seconds
    async fn backoff(&self, attempt: u32) {
        let base = 2f64.powi(attempt as i32).min(16.0);
        let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
        tokio::time::sleep(Duration::from_secs_f64(base + jitter)).await;
    }

    /// Paginated keyword search
    ///
    /// Stops when the requested count is reached, a page comes back empty,
    /// or pagination fails mid-stream (collected results are returned).
    /// Only permanent auth errors raise.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        year_from: Option<i32>,
        year_to: Option<i32>,
        language: Option<&str>,
    ) -> Result<Vec<RawPaper>, SearchError> {
        let mut collected: Vec<RawPaper> = Vec::new();
        let mut page = 0;

        while collected.len() < max_results {
            let remaining = max_results - collected.len();
            let num = remaining.min(PROVIDER_PAGE_SIZE);

            let records = match self
                .fetch_page(query, page, num, year_from, year_to, language)
                .await
            {
                Ok(records) => records,
                Err(err) if err.is_permanent_auth() => return Err(err),
                Err(err) => {
                    warn!(query, page, error = %err, "pagination failed, returning collected results");
                    break;
                }
            };

            if records.is_empty() {
                break;
            }

            let page_len = records.len();
            for record in records {
                if let Some(paper) = self.parse_record(record) {
                    collected.push(paper);
                }
                if collected.len() >= max_results {
                    break;
                }
            }

            // A short page means the provider ran out of results
            if page_len < num {
                break;
            }
            page += 1;
        }

        collected.truncate(max_results);
        Ok(collected)
    }

    /// Normalize one provider record; records without a usable title are
    /// dropped
    fn parse_record(&self, record: ProviderRecord) -> Option<RawPaper> {
        let title = record.title.as_deref().map(str::trim).unwrap_or_default();
        if title.is_empty() {
            return None;
        }

        let raw_data = serde_json::json!({
            "id": record.id,
            "title": record.title,
            "link": record.link,
            "publicationInfo": record.publication_info,
            "snippet": record.snippet,
            "year": record.year,
            "citedBy": record.cited_by,
            "pdfUrl": record.pdf_url,
        });

        let (authors, venue, parsed_year) = record
            .publication_info
            .as_deref()
            .map(parse_publication_info)
            .unwrap_or_default();

        let doi = extract_doi(
            [
                record.link.as_deref().unwrap_or_default(),
                record.snippet.as_deref().unwrap_or_default(),
            ]
            .into_iter()
            .filter(|field| !field.is_empty()),
        );

        let id = record
            .id
            .clone()
            .or_else(|| doi.clone())
            .or_else(|| record.link.clone())
            .unwrap_or_else(|| normalize_title(title));

        Some(RawPaper {
            id,
            title: title.to_string(),
            authors,
            year: record.year.or(parsed_year),
            venue,
            doi,
            snippet: record.snippet,
            full_text_url: record.pdf_url.or(record.link),
            citation_count: record.cited_by.unwrap_or(0),
            source: self.name().to_string(),
            raw_data,
        })
    }
}

#[async_trait]
impl ScholarSource for SerperScholarClient {
    fn name(&self) -> &str {
        "google_scholar"
    }

    /// Fan the result budget across the strategy's queries, then
    /// deduplicate by provider id, URL, and normalized title + year.
    /// Per-query failures are logged and dropped.
    async fn search_advanced(
        &self,
        strategy: &SearchStrategy,
    ) -> Result<Vec<RawPaper>, SearchError> {
        if strategy.queries.is_empty() {
            return Ok(Vec::new());
        }

        let total_budget = strategy
            .filters
            .max_results
            .unwrap_or(self.config.default_max_results)
            .max(1);
        let per_query = (total_budget + strategy.queries.len() - 1) / strategy.queries.len();

        let mut merged: Vec<RawPaper> = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut seen_titles: HashSet<String> = HashSet::new();

        for query in &strategy.queries {
            let result = self
                .search(
                    &query.boolean_query,
                    per_query,
                    strategy.filters.year_from,
                    strategy.filters.year_to,
                    strategy.filters.language.as_deref(),
                )
                .await;

            let papers = match result {
                Ok(papers) => papers,
                Err(err) if err.is_permanent_auth() => return Err(err),
                Err(err) => {
                    warn!(query = %query.boolean_query, error = %err, "query failed, dropping");
                    continue;
                }
            };

            for paper in papers {
                if !seen_ids.insert(paper.id.clone()) {
                    continue;
                }
                if let Some(url) = &paper.full_text_url {
                    if !seen_urls.insert(url.clone()) {
                        continue;
                    }
                }
                let title_key = format!(
                    "{}|{}",
                    normalize_title(&paper.title),
                    paper.year.map(|y| y.to_string()).unwrap_or_default()
                );
                if !seen_titles.insert(title_key) {
                    continue;
                }
                merged.push(paper);
            }
        }

        merged.truncate(total_budget);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str) -> ProviderRecord {
        ProviderRecord {
            id: Some(id.to_string()),
            title: Some(title.to_string()),
            link: Some(format!("https://example.org/{id}")),
            publication_info: Some("J Smith, A Doe - Nature, 2021 - nature.com".to_string()),
            snippet: Some("A snippet mentioning 10.1038/s41586-021-03819-2 here".to_string()),
            year: Some(2021),
            cited_by: Some(12),
            pdf_url: None,
        }
    }

    fn client() -> SerperScholarClient {
        SerperScholarClient::new(SearchClientConfig {
            api_key: "test-key".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_parse_record_extracts_fields() {
        let paper = client().parse_record(record("r1", "Perovskite stability")).unwrap();
        assert_eq!(paper.id, "r1");
        assert_eq!(paper.authors, vec!["J Smith", "A Doe"]);
        assert_eq!(paper.venue.as_deref(), Some("Nature"));
        assert_eq!(paper.year, Some(2021));
        assert_eq!(paper.doi.as_deref(), Some("10.1038/s41586-021-03819-2"));
        assert_eq!(paper.citation_count, 12);
        assert_eq!(paper.source, "google_scholar");
    }

    #[test]
    fn test_parse_record_drops_untitled() {
        let mut untitled = record("r2", "");
        untitled.title = Some("   ".to_string());
        assert!(client().parse_record(untitled).is_none());
    }

    #[test]
    fn test_parse_record_missing_citation_defaults_zero() {
        let mut no_citations = record("r3", "Quiet paper");
        no_citations.cited_by = None;
        no_citations.snippet = None;
        let paper = client().parse_record(no_citations).unwrap();
        assert_eq!(paper.citation_count, 0);
    }

    #[test]
    fn test_call_budget_consumed_to_the_limit() {
        let limited = SerperScholarClient::new(SearchClientConfig {
            api_key: "k".to_string(),
            max_calls: Some(2),
            ..Default::default()
        })
        .unwrap();
        assert!(limited.consume_call_budget());
        assert!(limited.consume_call_budget());
        assert!(!limited.consume_call_budget());
        assert!(!limited.consume_call_budget());
    }

    #[test]
    fn test_page_request_year_filters_serialize() {
        let request = PageRequest {
            q: "solar",
            page: 1,
            num: 20,
            year_from: Some(2019),
            year_to: None,
            language: Some("en"),
        };
        let body = serde_json::to_string(&request).unwrap();
        assert!(body.contains(r#""as_ylo":2019"#));
        assert!(!body.contains("as_yhi"));
        assert!(body.contains(r#""hl":"en""#));
    }

    #[test]
    fn test_parse_provider_error_field() {
        let json = r#"{"organic": [], "error": "insufficient credits"}"#;
        let parsed: PageResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("insufficient credits"));
    }
}
