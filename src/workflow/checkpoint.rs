//! Checkpoint envelopes and decider decisions
//!
//! A checkpoint is a typed pause point: the engine hands an envelope to the
//! decider and blocks until a decision comes back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::WorkflowError;
use crate::models::{PaperCollection, ParsedIntent, SearchStrategy};

/// The two defined pause points of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckpointKind {
    StrategyConfirmation,
    ResultReview,
}

/// Payload shown at the strategy confirmation pause
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPayload {
    pub intent: ParsedIntent,
    pub strategy: SearchStrategy,
}

/// Payload shown at the result review pause
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPayload {
    pub collection: PaperCollection,
    /// How many papers the decider has accumulated across iterations so far
    pub accumulated_count: usize,
}

/// Kind and payload are one: the enum is total and exclusive over the kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum CheckpointPayload {
    #[serde(rename = "STRATEGY_CONFIRMATION")]
    Strategy(StrategyPayload),
    #[serde(rename = "RESULT_REVIEW")]
    Result(ResultPayload),
}

impl CheckpointPayload {
    pub fn kind(&self) -> CheckpointKind {
        match self {
            CheckpointPayload::Strategy(_) => CheckpointKind::StrategyConfirmation,
            CheckpointPayload::Result(_) => CheckpointKind::ResultReview,
        }
    }
}

/// Identity of one checkpoint within a run; `decide` waits for this to
/// change before returning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSignature {
    pub run_id: Uuid,
    pub iteration: u32,
    pub kind: CheckpointKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub payload: CheckpointPayload,
    pub run_id: Uuid,
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn strategy(
        run_id: Uuid,
        iteration: u32,
        intent: ParsedIntent,
        strategy: SearchStrategy,
    ) -> Self {
        Checkpoint {
            payload: CheckpointPayload::Strategy(StrategyPayload { intent, strategy }),
            run_id,
            iteration,
            timestamp: Utc::now(),
        }
    }

    pub fn result(
        run_id: Uuid,
        iteration: u32,
        collection: PaperCollection,
        accumulated_count: usize,
    ) -> Self {
        Checkpoint {
            payload: CheckpointPayload::Result(ResultPayload {
                collection,
                accumulated_count,
            }),
            run_id,
            iteration,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> CheckpointKind {
        self.payload.kind()
    }

    pub fn signature(&self) -> CheckpointSignature {
        CheckpointSignature {
            run_id: self.run_id,
            iteration: self.iteration,
            kind: self.kind(),
        }
    }

    /// Stable external identifier: `run_id:iteration`
    pub fn checkpoint_id(&self) -> String {
        format!("{}:{}", self.run_id, self.iteration)
    }
}

/// What the decider chose to do with a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Approve,
    Edit,
    Reject,
}

impl DecisionAction {
    pub fn parse(raw: &str) -> Option<DecisionAction> {
        match raw.trim().to_lowercase().as_str() {
            "approve" => Some(DecisionAction::Approve),
            "edit" => Some(DecisionAction::Edit),
            "reject" => Some(DecisionAction::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    #[serde(default)]
    pub revised_data: Option<serde_json::Value>,
    #[serde(default)]
    pub note: Option<String>,
}

impl Decision {
    pub fn approve() -> Self {
        Decision {
            action: DecisionAction::Approve,
            revised_data: None,
            note: None,
        }
    }

    pub fn edit(revised_data: serde_json::Value) -> Self {
        Decision {
            action: DecisionAction::Edit,
            revised_data: Some(revised_data),
            note: None,
        }
    }

    pub fn reject(note: &str) -> Self {
        Decision {
            action: DecisionAction::Reject,
            revised_data: None,
            note: Some(note.to_string()),
        }
    }
}

/// The external decider: human, agent, or test harness
#[async_trait]
pub trait Decider: Send + Sync {
    async fn handle(&self, checkpoint: Checkpoint) -> Result<Decision, WorkflowError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchQuery;

    fn intent() -> ParsedIntent {
        serde_json::from_value(serde_json::json!({
            "topic": "t", "concepts": ["c"]
        }))
        .unwrap()
    }

    fn strategy() -> SearchStrategy {
        SearchStrategy {
            queries: vec![SearchQuery {
                keywords: vec![],
                boolean_query: "q".to_string(),
            }],
            sources: Default::default(),
            filters: Default::default(),
        }
    }

    #[test]
    fn test_kind_follows_payload() {
        let run_id = Uuid::new_v4();
        let strategy_ckpt = Checkpoint::strategy(run_id, 0, intent(), strategy());
        assert_eq!(strategy_ckpt.kind(), CheckpointKind::StrategyConfirmation);

        let result_ckpt = Checkpoint::result(run_id, 0, PaperCollection::empty("q"), 0);
        assert_eq!(result_ckpt.kind(), CheckpointKind::ResultReview);
    }

    #[test]
    fn test_signatures_distinguish_iteration_and_kind() {
        let run_id = Uuid::new_v4();
        let first = Checkpoint::result(run_id, 0, PaperCollection::empty("q"), 0);
        let second = Checkpoint::result(run_id, 1, PaperCollection::empty("q"), 0);
        let other_kind = Checkpoint::strategy(run_id, 0, intent(), strategy());

        assert_ne!(first.signature(), second.signature());
        assert_ne!(first.signature(), other_kind.signature());
        assert_eq!(first.checkpoint_id(), format!("{}:0", run_id));
    }

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let kind = serde_json::to_string(&CheckpointKind::StrategyConfirmation).unwrap();
        assert_eq!(kind, r#""STRATEGY_CONFIRMATION""#);
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(DecisionAction::parse("Approve"), Some(DecisionAction::Approve));
        assert_eq!(DecisionAction::parse("EDIT"), Some(DecisionAction::Edit));
        assert_eq!(DecisionAction::parse("reject"), Some(DecisionAction::Reject));
        assert_eq!(DecisionAction::parse("maybe"), None);
    }
}
