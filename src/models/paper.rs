use serde::{Deserialize, Serialize};

use super::strategy::SearchStrategy;

/// A paper as returned by a search source, before scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPaper {
    /// Stable identifier, unique within one result set
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub full_text_url: Option<String>,
    #[serde(default)]
    pub citation_count: u32,
    /// Name of the source that produced this record
    #[serde(default)]
    pub source: String,
    /// Provider record kept verbatim for diagnostics
    #[serde(default)]
    pub raw_data: serde_json::Value,
}

impl RawPaper {
    /// Count of populated primary fields, used to pick the merge survivor
    /// during deduplication
    pub fn completeness(&self) -> usize {
        [
            self.doi.is_some(),
            self.snippet.is_some(),
            self.year.is_some(),
            self.venue.is_some(),
            self.full_text_url.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// Category tags the scorer may assign to a paper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperTag {
    Method,
    Review,
    Empirical,
    Theoretical,
    Dataset,
}

impl PaperTag {
    /// Parse a tag emitted by the model, dropping anything outside the enum
    pub fn parse(raw: &str) -> Option<PaperTag> {
        match raw.trim().to_lowercase().as_str() {
            "method" => Some(PaperTag::Method),
            "review" => Some(PaperTag::Review),
            "empirical" => Some(PaperTag::Empirical),
            "theoretical" => Some(PaperTag::Theoretical),
            "dataset" => Some(PaperTag::Dataset),
            _ => None,
        }
    }
}

/// A raw paper with its model-assigned relevance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPaper {
    pub paper: RawPaper,
    /// Clamped into [0.0, 1.0]
    pub relevance_score: f64,
    pub relevance_reason: String,
    #[serde(default)]
    pub tags: Vec<PaperTag>,
}

/// Output projection of a scored paper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub doi: Option<String>,
    pub snippet: Option<String>,
    pub full_text_url: Option<String>,
    pub citation_count: u32,
    pub source: String,
    pub relevance_score: f64,
    pub relevance_reason: String,
    pub tags: Vec<PaperTag>,
}

impl Paper {
    pub fn from_scored(scored: ScoredPaper) -> Self {
        let ScoredPaper {
            paper,
            relevance_score,
            relevance_reason,
            tags,
        } = scored;
        Paper {
            id: paper.id,
            title: paper.title,
            authors: paper.authors,
            year: paper.year,
            venue: paper.venue,
            doi: paper.doi,
            snippet: paper.snippet,
            full_text_url: paper.full_text_url,
            citation_count: paper.citation_count,
            source: paper.source,
            relevance_score,
            relevance_reason,
            tags,
        }
    }
}

/// Aggregate views over an organized collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Facets {
    /// Paper count per publication year
    pub by_year: std::collections::BTreeMap<i32, usize>,
    /// Paper count per (title-cased) venue
    pub by_venue: std::collections::BTreeMap<String, usize>,
    /// At most 10 author names, most frequent first
    pub top_authors: Vec<String>,
    /// At most 8 recurring title terms from high-scoring papers
    pub key_themes: Vec<String>,
}

/// Provenance carried alongside the organized papers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMetadata {
    /// The user's original query text
    pub query: String,
    /// The strategy that produced this collection
    pub search_strategy: SearchStrategy,
    /// Scored papers handed to the organizer, before relevance filtering
    pub total_found: usize,
}

/// Final output of one pipeline iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperCollection {
    pub metadata: CollectionMetadata,
    pub papers: Vec<Paper>,
    pub facets: Facets,
}

impl PaperCollection {
    /// An empty collection for runs that never produce results
    pub fn empty(query: &str) -> Self {
        PaperCollection {
            metadata: CollectionMetadata {
                query: query.to_string(),
                search_strategy: SearchStrategy {
                    queries: Vec::new(),
                    sources: Default::default(),
                    filters: Default::default(),
                },
                total_found: 0,
            },
            papers: Vec::new(),
            facets: Facets::default(),
        }
    }
}
