//! Environment-driven configuration
//!
//! Every knob has a default; unparseable values fall back to the default
//! with a warning rather than aborting startup.

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::llm::{ModelConfig, ModelProvider};
use crate::pipeline::{DedupConfig, ScorerConfig, DEFAULT_MIN_RELEVANCE};
use crate::prompts::Domain;
use crate::search::SearchClientConfig;
use crate::session::SessionConfig;
use crate::workflow::{EngineOptions, DEFAULT_MAX_ITERATIONS};

#[derive(Debug, Clone)]
pub struct Config {
    pub search: SearchClientConfig,
    pub model: ModelConfig,
    pub domain: Option<Domain>,
    pub scorer: ScorerConfig,
    pub dedup: DedupConfig,
    pub min_relevance: f64,
    pub engine: EngineOptions,
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            search: SearchClientConfig::default(),
            model: ModelConfig::default(),
            domain: None,
            scorer: ScorerConfig::default(),
            dedup: DedupConfig::default(),
            min_relevance: DEFAULT_MIN_RELEVANCE,
            engine: EngineOptions::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Some(key) = read("SERPER_API_KEY") {
            config.search.api_key = key;
        }
        config.search.requests_per_second = parse("SEARCH_RPS", config.search.requests_per_second);
        config.search.max_calls = read("SEARCH_MAX_CALLS").and_then(|raw| match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(value = %raw, "SEARCH_MAX_CALLS is not a number, leaving unlimited");
                None
            }
        });
        config.search.default_max_results =
            parse("DEFAULT_MAX_RESULTS", config.search.default_max_results);

        if let Some(raw) = read("LLM_PROVIDER") {
            match ModelProvider::parse(&raw) {
                Some(provider) => config.model.provider = provider,
                None => warn!(value = %raw, "unknown LLM_PROVIDER, keeping default"),
            }
        }
        if let Some(key) = read("LLM_API_KEY") {
            config.model.api_key = key;
        }
        config.model.base_url = read("LLM_BASE_URL");
        if let Some(model) = read("LLM_MODEL") {
            config.model.model = model;
        }
        config.model.temperature = parse("LLM_TEMPERATURE", config.model.temperature);
        config.model.max_tokens = parse("LLM_MAX_TOKENS", config.model.max_tokens);

        if let Some(raw) = read("RESEARCH_DOMAIN") {
            match Domain::parse(&raw) {
                Some(domain) => config.domain = Some(domain),
                None => warn!(value = %raw, "unknown RESEARCH_DOMAIN, running without one"),
            }
        }

        config.scorer.batch_size = parse("SCORER_BATCH_SIZE", config.scorer.batch_size).max(1);
        config.scorer.max_concurrency =
            parse("SCORER_MAX_CONCURRENCY", config.scorer.max_concurrency).max(1);

        config.dedup.llm_enabled = parse("DEDUP_LLM_ENABLED", config.dedup.llm_enabled);
        config.dedup.llm_max_candidates =
            parse("DEDUP_LLM_MAX_CANDIDATES", config.dedup.llm_max_candidates);

        config.min_relevance = parse("MIN_RELEVANCE", config.min_relevance).clamp(0.0, 1.0);

        config.engine.max_iterations = parse("MAX_ITERATIONS", DEFAULT_MAX_ITERATIONS).max(1);
        config.engine.strategy_checkpoint_enabled = parse(
            "STRATEGY_CHECKPOINT_ENABLED",
            config.engine.strategy_checkpoint_enabled,
        );

        config.session.decide_timeout = Duration::from_secs(parse(
            "SESSION_DECIDE_TIMEOUT_SECS",
            config.session.decide_timeout.as_secs(),
        ));
        config.session.poll_interval = Duration::from_secs_f64(
            parse(
                "SESSION_POLL_INTERVAL_SECS",
                config.session.poll_interval.as_secs_f64(),
            )
            .max(0.01),
        );

        config
    }
}

fn read(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    match read(name) {
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(option = name, value = %raw, "unparseable option, using default");
                default
            }
        },
        None => default,
    }
}
