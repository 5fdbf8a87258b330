use serde::{Deserialize, Serialize};

/// What kind of literature need the user expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Survey,
    Method,
    Dataset,
    Baseline,
}

impl Default for IntentType {
    fn default() -> Self {
        IntentType::Survey
    }
}

/// Hard constraints attached to a research query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchConstraints {
    #[serde(default)]
    pub year_from: Option<i32>,
    #[serde(default)]
    pub year_to: Option<i32>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

impl SearchConstraints {
    /// Swap the year bounds if the model returned them inverted
    pub fn normalize_years(&mut self) {
        if let (Some(from), Some(to)) = (self.year_from, self.year_to) {
            if from > to {
                self.year_from = Some(to);
                self.year_to = Some(from);
            }
        }
    }
}

/// Structured understanding of the user's research query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedIntent {
    /// Main research topic, never empty after parsing
    pub topic: String,
    /// Ordered key concepts extracted from the query, never empty after parsing
    pub concepts: Vec<String>,
    #[serde(default)]
    pub intent_type: IntentType,
    #[serde(default)]
    pub constraints: SearchConstraints,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_years_swaps_inverted_bounds() {
        let mut constraints = SearchConstraints {
            year_from: Some(2024),
            year_to: Some(2019),
            ..Default::default()
        };
        constraints.normalize_years();
        assert_eq!(constraints.year_from, Some(2019));
        assert_eq!(constraints.year_to, Some(2024));
    }

    #[test]
    fn test_normalize_years_keeps_ordered_bounds() {
        let mut constraints = SearchConstraints {
            year_from: Some(2019),
            year_to: Some(2024),
            ..Default::default()
        };
        constraints.normalize_years();
        assert_eq!(constraints.year_from, Some(2019));
        assert_eq!(constraints.year_to, Some(2024));
    }

    #[test]
    fn test_parse_intent_from_json() {
        let json = r#"{
            "topic": "perovskite solar cells",
            "concepts": ["perovskite", "solar cell", "efficiency"],
            "intent_type": "survey",
            "constraints": {"year_from": 2020, "year_to": 2024}
        }"#;

        let intent: ParsedIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.topic, "perovskite solar cells");
        assert_eq!(intent.concepts.len(), 3);
        assert_eq!(intent.intent_type, IntentType::Survey);
        assert_eq!(intent.constraints.year_from, Some(2020));
    }

    #[test]
    fn test_parse_intent_defaults_optional_fields() {
        let json = r#"{"topic": "graph neural networks", "concepts": ["GNN"]}"#;
        let intent: ParsedIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.intent_type, IntentType::Survey);
        assert!(intent.constraints.year_from.is_none());
    }
}
