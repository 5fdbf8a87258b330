pub mod intent;
pub mod paper;
pub mod strategy;

pub use intent::{IntentType, ParsedIntent, SearchConstraints};
pub use paper::{
    CollectionMetadata, Facets, Paper, PaperCollection, PaperTag, RawPaper, ScoredPaper,
};
pub use strategy::{QueryBuilderInput, SearchQuery, SearchStrategy, UserFeedback};
