//! Prompt templates and domain glossary suffixes
//!
//! Prompt text is data; composition is concatenation after a stable marker.

use serde::{Deserialize, Serialize};

/// Research domains with a dedicated glossary suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    MaterialsScience,
    ComputerScience,
    Biomedicine,
}

impl Domain {
    pub fn parse(raw: &str) -> Option<Domain> {
        match raw.trim().to_lowercase().as_str() {
            "materials" | "materials_science" => Some(Domain::MaterialsScience),
            "cs" | "computer_science" => Some(Domain::ComputerScience),
            "bio" | "biomedicine" | "biomedical" => Some(Domain::Biomedicine),
            _ => None,
        }
    }

    fn glossary(&self) -> &'static str {
        match self {
            Domain::MaterialsScience => {
                "Domain glossary: treat PCE as power conversion efficiency, \
                 DFT as density functional theory, XRD as X-ray diffraction. \
                 Prefer materials, synthesis, and characterization terminology."
            }
            Domain::ComputerScience => {
                "Domain glossary: treat SOTA as state of the art, LLM as large \
                 language model, GNN as graph neural network. Prefer venues such \
                 as NeurIPS, ICML, ACL, and arXiv preprints."
            }
            Domain::Biomedicine => {
                "Domain glossary: treat RCT as randomized controlled trial, \
                 EHR as electronic health record, GWAS as genome-wide association \
                 study. Prefer clinical and life-science terminology."
            }
        }
    }
}

const DOMAIN_MARKER: &str = "\n\n--- Domain context ---\n";

/// Append the domain glossary, if any, after the stable marker
pub fn with_domain(base: &str, domain: Option<Domain>) -> String {
    match domain {
        Some(domain) => format!("{}{}{}", base, DOMAIN_MARKER, domain.glossary()),
        None => base.to_string(),
    }
}

pub const INTENT_PARSE_SYSTEM: &str = "\
You are a research query analyst. Read the user's research request and \
extract a structured intent.\n\n\
Respond with a JSON object in this exact format:\n\
{\n\
  \"topic\": \"concise restatement of the research topic\",\n\
  \"concepts\": [\"key concept 1\", \"key concept 2\"],\n\
  \"intent_type\": \"survey|method|dataset|baseline\",\n\
  \"constraints\": {\"year_from\": null, \"year_to\": null, \"language\": null, \"max_results\": null}\n\
}\n\n\
Rules:\n\
1. concepts must be non-empty and ordered by importance.\n\
2. Only set constraints the user actually expressed.\n\
3. intent_type: survey = broad overview, method = specific technique, \
dataset = data resources, baseline = comparison targets.";

pub const QUERY_BUILD_SYSTEM: &str = "\
You are a scholarly search strategist. Build a search strategy for the \
given research intent.\n\n\
Respond with a JSON object in this exact format:\n\
{\n\
  \"queries\": [\n\
    {\"keywords\": [\"kw1\", \"kw2\"], \"boolean_query\": \"kw1 AND kw2\"}\n\
  ],\n\
  \"sources\": [\"source_name\"],\n\
  \"filters\": {\"year_from\": null, \"year_to\": null, \"language\": null, \"max_results\": null}\n\
}\n\n\
Rules:\n\
1. Produce 2 to 4 complementary queries: one precise, one broadened, and \
variants covering synonyms or adjacent terminology.\n\
2. Only use source names from the available list given in the message.\n\
3. If previous strategies and feedback are provided, build on them: avoid \
repeating failed queries and honor what the user marked relevant.";

pub const SCORING_SYSTEM: &str = "\
You are a research paper relevance judge. Score each paper against the \
research topic and concepts.\n\n\
Respond with a JSON object in this exact format:\n\
{\n\
  \"results\": [\n\
    {\n\
      \"paper_id\": \"id\",\n\
      \"relevance_score\": 0.0,\n\
      \"relevance_reason\": \"one-line justification\",\n\
      \"tags\": [\"method\"]\n\
    }\n\
  ]\n\
}\n\n\
Rules:\n\
1. relevance_score is a float in [0.0, 1.0].\n\
2. tags only from: method, review, empirical, theoretical, dataset.\n\
3. Return one entry per input paper, matched by paper_id.";

pub const DEDUP_SYSTEM: &str = "\
You identify duplicate academic papers. Group entries that refer to the \
same work (preprint vs published version, translated titles, venue \
variants).\n\n\
Respond with a JSON object in this exact format:\n\
{\"groups\": [[\"id1\", \"id2\"], [\"id3\"]]}\n\n\
Rules:\n\
1. Every input id appears in exactly one group.\n\
2. Only group entries you are confident describe the same work.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_parse() {
        assert_eq!(Domain::parse("materials"), Some(Domain::MaterialsScience));
        assert_eq!(Domain::parse("CS"), Some(Domain::ComputerScience));
        assert_eq!(Domain::parse("astrology"), None);
    }

    #[test]
    fn test_with_domain_appends_after_marker() {
        let composed = with_domain(INTENT_PARSE_SYSTEM, Some(Domain::ComputerScience));
        assert!(composed.starts_with(INTENT_PARSE_SYSTEM));
        assert!(composed.contains("--- Domain context ---"));
        assert!(composed.contains("large language model"));
    }

    #[test]
    fn test_without_domain_is_identity() {
        assert_eq!(with_domain(SCORING_SYSTEM, None), SCORING_SYSTEM);
    }
}
