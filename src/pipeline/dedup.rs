//! Deduplication stage
//!
//! Pass 1 groups exact matches on DOI, provider result id, full-text URL,
//! and normalized title. Pass 2 optionally asks the model to group the
//! leftovers that share no exact key. Groups are merged into the most
//! complete member.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::{ModelClient, ModelError};
use crate::models::RawPaper;
use crate::prompts::DEDUP_SYSTEM;
use crate::search::normalize_title;

#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Whether the semantic second pass runs at all
    pub llm_enabled: bool,
    /// Ceiling on how many ungrouped papers are worth a model call
    pub llm_max_candidates: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            llm_enabled: false,
            llm_max_candidates: 40,
        }
    }
}

pub struct Deduplicator {
    model: Option<Arc<dyn ModelClient>>,
    config: DedupConfig,
}

/// Union-find over paper indices; keys discovered later merge groups
/// created by earlier keys
struct Grouping {
    parent: Vec<usize>,
}

impl Grouping {
    fn new(len: usize) -> Self {
        Grouping {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, index: usize) -> usize {
        let mut root = index;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = index;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (root_a, root_b) = (self.find(a), self.find(b));
        if root_a != root_b {
            // Smaller root wins so group identity follows first occurrence
            let (keep, fold) = if root_a < root_b {
                (root_a, root_b)
            } else {
                (root_b, root_a)
            };
            self.parent[fold] = keep;
        }
    }

    /// Groups of member indices, ordered by first occurrence
    fn groups(&mut self, len: usize) -> Vec<Vec<usize>> {
        let mut by_root: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut order: Vec<usize> = Vec::new();
        for index in 0..len {
            let root = self.find(index);
            let members = by_root.entry(root).or_insert_with(|| {
                order.push(root);
                Vec::new()
            });
            members.push(index);
        }
        order
            .into_iter()
            .map(|root| by_root.remove(&root).unwrap_or_default())
            .collect()
    }
}

impl Deduplicator {
    pub fn new(model: Option<Arc<dyn ModelClient>>, config: DedupConfig) -> Self {
        Deduplicator { model, config }
    }

    /// Collapse duplicates; `|output| <= |input|`, deterministic for the
    /// algorithmic pass
    pub async fn deduplicate(&self, papers: Vec<RawPaper>) -> Vec<RawPaper> {
        if papers.len() < 2 {
            return papers;
        }

        let mut grouping = self.exact_pass(&papers);
        let mut groups = grouping.groups(papers.len());

        if self.config.llm_enabled {
            groups = self.semantic_pass(&papers, groups).await;
        }

        let total_groups = groups.len();
        debug!(input = papers.len(), groups = total_groups, "deduplicated");

        let mut merged: Vec<Option<RawPaper>> = papers.into_iter().map(Some).collect();
        groups
            .into_iter()
            .map(|members| {
                let group: Vec<RawPaper> = members
                    .into_iter()
                    .filter_map(|index| merged[index].take())
                    .collect();
                merge_group(group)
            })
            .collect()
    }

    fn exact_pass(&self, papers: &[RawPaper]) -> Grouping {
        let mut grouping = Grouping::new(papers.len());

        let keys: [fn(&RawPaper) -> Option<String>; 4] = [
            |paper| paper.doi.as_ref().map(|doi| doi.to_lowercase()),
            |paper| Some(paper.id.clone()).filter(|id| !id.is_empty()),
            |paper| paper.full_text_url.clone(),
            |paper| Some(normalize_title(&paper.title)).filter(|title| !title.is_empty()),
        ];

        for key_of in keys {
            let mut first_seen: HashMap<String, usize> = HashMap::new();
            for (index, paper) in papers.iter().enumerate() {
                if let Some(key) = key_of(paper) {
                    match first_seen.get(&key) {
                        Some(&earlier) => grouping.union(earlier, index),
                        None => {
                            first_seen.insert(key, index);
                        }
                    }
                }
            }
        }

        grouping
    }

    /// Ask the model to group singleton leftovers; any failure falls back
    /// to the pass-1 grouping
    async fn semantic_pass(
        &self,
        papers: &[RawPaper],
        groups: Vec<Vec<usize>>,
    ) -> Vec<Vec<usize>> {
        let model = match &self.model {
            Some(model) => model,
            None => return groups,
        };

        let singles: Vec<usize> = groups
            .iter()
            .filter(|members| members.len() == 1)
            .map(|members| members[0])
            .collect();
        if singles.len() <= 1 || singles.len() > self.config.llm_max_candidates {
            return groups;
        }

        match self.request_groups(model.as_ref(), papers, &singles).await {
            Ok(merged_singles) => apply_semantic_groups(papers, groups, &singles, merged_singles),
            Err(err) => {
                warn!(error = %err, "semantic dedup failed, keeping exact grouping");
                groups
            }
        }
    }

    async fn request_groups(
        &self,
        model: &dyn ModelClient,
        papers: &[RawPaper],
        singles: &[usize],
    ) -> Result<Vec<Vec<String>>, ModelError> {
        let candidates: Vec<serde_json::Value> = singles
            .iter()
            .map(|&index| {
                let paper = &papers[index];
                serde_json::json!({
                    "id": paper.id,
                    "title": paper.title,
                    "year": paper.year,
                })
            })
            .collect();

        let message = serde_json::to_string_pretty(&serde_json::json!({
            "papers": candidates
        }))
        .map_err(|e| ModelError::Response(e.to_string()))?;

        let value = model.complete_json(DEDUP_SYSTEM, &message, None).await?;
        let parsed: SemanticGroups = serde_json::from_value(value)
            .map_err(|e| ModelError::Response(format!("dedup groups did not match: {}", e)))?;
        Ok(parsed.groups)
    }
}

#[derive(Debug, serde::Deserialize)]
struct SemanticGroups {
    #[serde(default)]
    groups: Vec<Vec<String>>,
}

fn apply_semantic_groups(
    papers: &[RawPaper],
    groups: Vec<Vec<usize>>,
    singles: &[usize],
    semantic: Vec<Vec<String>>,
) -> Vec<Vec<usize>> {
    let single_by_id: HashMap<&str, usize> = singles
        .iter()
        .map(|&index| (papers[index].id.as_str(), index))
        .collect();

    // Indices absorbed into a multi-member semantic group
    let mut absorbed: HashMap<usize, usize> = HashMap::new(); // member -> leader
    for group in &semantic {
        let members: Vec<usize> = group
            .iter()
            .filter_map(|id| single_by_id.get(id.as_str()).copied())
            .collect();
        if members.len() < 2 {
            continue;
        }
        let leader = *members.iter().min().expect("non-empty members");
        for &member in &members {
            absorbed.insert(member, leader);
        }
    }

    let mut rebuilt: Vec<Vec<usize>> = Vec::new();
    let mut leader_position: HashMap<usize, usize> = HashMap::new();
    for members in groups {
        if members.len() == 1 {
            let index = members[0];
            if let Some(&leader) = absorbed.get(&index) {
                match leader_position.get(&leader) {
                    Some(&position) => {
                        rebuilt[position].push(index);
                        continue;
                    }
                    None => {
                        leader_position.insert(leader, rebuilt.len());
                    }
                }
            }
        }
        rebuilt.push(members);
    }
    rebuilt
}

/// Collapse one duplicate group into a single record
///
/// Survivor: most populated primary fields, citation count breaking ties.
/// Remaining holes are filled from the other members; the citation count
/// becomes the group maximum.
fn merge_group(group: Vec<RawPaper>) -> RawPaper {
    let max_citations = group
        .iter()
        .map(|paper| paper.citation_count)
        .max()
        .unwrap_or(0);

    let survivor_index = group
        .iter()
        .enumerate()
        .max_by_key(|(index, paper)| {
            // Later positions lose ties, so earlier occurrences win
            (paper.completeness(), paper.citation_count, usize::MAX - index)
        })
        .map(|(index, _)| index)
        .unwrap_or(0);

    let mut members = group;
    let mut merged = members.swap_remove(survivor_index);

    for other in &members {
        if merged.doi.is_none() {
            merged.doi = other.doi.clone();
        }
        if merged.snippet.is_none() {
            merged.snippet = other.snippet.clone();
        }
        if merged.year.is_none() {
            merged.year = other.year;
        }
        if merged.venue.is_none() {
            merged.venue = other.venue.clone();
        }
        if merged.full_text_url.is_none() {
            merged.full_text_url = other.full_text_url.clone();
        }
    }

    merged.citation_count = max_citations;
    merged
}
