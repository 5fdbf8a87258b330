//! Result organizing stage: relevance filter, total-order sort, facets

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use crate::models::{
    CollectionMetadata, Facets, Paper, PaperCollection, ScoredPaper, SearchStrategy,
};

pub const DEFAULT_MIN_RELEVANCE: f64 = 0.3;

/// Score floor for titles that contribute to the key-theme facet
const THEME_SCORE_FLOOR: f64 = 0.5;
const THEME_MIN_TOKEN_LEN: usize = 3;
const MAX_TOP_AUTHORS: usize = 10;
const MAX_KEY_THEMES: usize = 8;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "using", "via", "based", "toward", "towards",
    "their", "this", "that", "are", "can", "has", "have", "its", "new", "our", "between", "under",
    "over", "through", "about", "study", "analysis", "approach", "review",
];

pub struct ResultOrganizer {
    min_relevance: f64,
}

impl ResultOrganizer {
    pub fn new(min_relevance: f64) -> Self {
        ResultOrganizer { min_relevance }
    }

    /// Filter, sort, project, and summarize one iteration's scored papers
    pub fn organize(
        &self,
        scored: Vec<ScoredPaper>,
        strategy: SearchStrategy,
        original_query: &str,
    ) -> PaperCollection {
        let total_found = scored.len();

        let mut kept: Vec<ScoredPaper> = scored
            .into_iter()
            .filter(|paper| paper.relevance_score >= self.min_relevance)
            .collect();

        // Total order: ties after year fall back to the case-folded title
        kept.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then_with(|| b.paper.citation_count.cmp(&a.paper.citation_count))
                .then_with(|| b.paper.year.cmp(&a.paper.year))
                .then_with(|| {
                    a.paper
                        .title
                        .to_lowercase()
                        .cmp(&b.paper.title.to_lowercase())
                })
        });

        let facets = build_facets(&kept);
        let papers: Vec<Paper> = kept.into_iter().map(Paper::from_scored).collect();

        PaperCollection {
            metadata: CollectionMetadata {
                query: original_query.to_string(),
                search_strategy: strategy,
                total_found,
            },
            papers,
            facets,
        }
    }
}

fn build_facets(papers: &[ScoredPaper]) -> Facets {
    let mut by_year: BTreeMap<i32, usize> = BTreeMap::new();
    let mut by_venue: BTreeMap<String, usize> = BTreeMap::new();
    let mut author_counts: HashMap<String, usize> = HashMap::new();

    for scored in papers {
        if let Some(year) = scored.paper.year {
            *by_year.entry(year).or_insert(0) += 1;
        }
        if let Some(venue) = &scored.paper.venue {
            *by_venue.entry(title_case(venue)).or_insert(0) += 1;
        }
        for author in &scored.paper.authors {
            *author_counts.entry(author.clone()).or_insert(0) += 1;
        }
    }

    let mut authors: Vec<(String, usize)> = author_counts.into_iter().collect();
    authors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let top_authors: Vec<String> = authors
        .into_iter()
        .take(MAX_TOP_AUTHORS)
        .map(|(name, _)| name)
        .collect();

    Facets {
        by_year,
        by_venue,
        top_authors,
        key_themes: key_themes(papers),
    }
}

/// Recurring title terms among the clearly-relevant papers
fn key_themes(papers: &[ScoredPaper]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for scored in papers {
        if scored.relevance_score < THEME_SCORE_FLOOR {
            continue;
        }
        for token in scored
            .paper
            .title
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
        {
            if token.len() < THEME_MIN_TOKEN_LEN || STOP_WORDS.contains(&token) {
                continue;
            }
            *counts.entry(token.to_string()).or_insert(0) += 1;
        }
    }

    let mut themes: Vec<(String, usize)> = counts.into_iter().collect();
    themes.sort_by_key(|(token, count)| (Reverse(*count), token.clone()));
    themes
        .into_iter()
        .take(MAX_KEY_THEMES)
        .map(|(token, _)| token)
        .collect()
}

/// Case-normalize a venue name so casing variants count as one venue
fn title_case(venue: &str) -> String {
    venue
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
