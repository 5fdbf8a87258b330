//! Intent parsing stage
//!
//! The only stage whose failure is fatal to a run: without a parsed intent
//! there is nothing to search for.

use std::sync::Arc;
use tracing::debug;

use crate::llm::{ModelClient, ModelError};
use crate::models::ParsedIntent;
use crate::prompts::{with_domain, Domain, INTENT_PARSE_SYSTEM};

pub struct IntentParser {
    model: Arc<dyn ModelClient>,
    domain: Option<Domain>,
}

impl IntentParser {
    pub fn new(model: Arc<dyn ModelClient>, domain: Option<Domain>) -> Self {
        IntentParser { model, domain }
    }

    /// Turn the user's free-text request into a validated `ParsedIntent`
    pub async fn parse(&self, user_text: &str) -> Result<ParsedIntent, ModelError> {
        let system = with_domain(INTENT_PARSE_SYSTEM, self.domain);
        let value = self.model.complete_json(&system, user_text, None).await?;

        let mut intent: ParsedIntent = serde_json::from_value(value)
            .map_err(|e| ModelError::Response(format!("intent did not match schema: {}", e)))?;

        intent.concepts.retain(|concept| !concept.trim().is_empty());
        if intent.concepts.is_empty() {
            return Err(ModelError::Response(
                "intent parse produced no concepts".to_string(),
            ));
        }
        if intent.topic.trim().is_empty() {
            intent.topic = user_text.trim().to_string();
        }
        intent.constraints.normalize_years();

        debug!(
            topic = %intent.topic,
            concepts = intent.concepts.len(),
            intent_type = ?intent.intent_type,
            "parsed research intent"
        );
        Ok(intent)
    }
}
