//! Fusion configuration.
//!
//! Every field has a default; a JSON file only needs the keys it overrides:
//!
//! ```json
//! { "linker": { "acceptable_context_score": 0.9 }, "retriever": { "pool_size": 16 } }
//! ```

use crate::artifact::read_json;
use crate::error::{FusionError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Linker
// ============================================================================

/// Thresholds of the tiered linking policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Best-by-context candidate is accepted above this.
    pub acceptable_context_score: f32,
    /// Best-by-topic candidate is accepted above this.
    pub acceptable_topic_score: f32,
    /// Fallback scan: context must exceed this...
    pub filter_context_score: f32,
    /// ...and topic must exceed this.
    pub filter_topic_score: f32,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            acceptable_context_score: 0.85,
            acceptable_topic_score: 0.95,
            filter_context_score: 0.8,
            filter_topic_score: 0.9,
        }
    }
}

// ============================================================================
// Retriever
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub api_url: String,
    /// Title hits requested per lemma.
    pub search_limit: usize,
    /// Maximum lookups in flight.
    pub pool_size: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Item ids per fetch request.
    pub fetch_batch: usize,
    pub proxy: Option<String>,
    pub user_agent: String,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            api_url: "https://www.wikidata.org/w/api.php".to_string(),
            search_limit: 5,
            pool_size: 63,
            timeout_secs: 10,
            fetch_batch: 50,
            proxy: None,
            user_agent: concat!("kgfuse/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl RetrieverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============================================================================
// Merge
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Suffix for an incoming scalar that conflicts with the node's own value.
    pub conflict_suffix: String,
    /// Insert cached neighbours of accepted items as external-fact nodes.
    pub neighbour_nodes: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            conflict_suffix: "_wiki".to_string(),
            neighbour_nodes: true,
        }
    }
}

// ============================================================================
// Top level
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub linker: LinkerConfig,
    pub retriever: RetrieverConfig,
    pub merge: MergeConfig,
}

impl FusionConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: FusionConfig = match path {
            Some(path) => read_json(path)?,
            None => FusionConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let l = &self.linker;
        for (name, v) in [
            ("acceptable_context_score", l.acceptable_context_score),
            ("acceptable_topic_score", l.acceptable_topic_score),
            ("filter_context_score", l.filter_context_score),
            ("filter_topic_score", l.filter_topic_score),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(FusionError::Config(format!("{name} must be within [0, 1], got {v}")));
            }
        }
        if self.retriever.pool_size == 0 {
            return Err(FusionError::Config("retriever.pool_size must be positive".into()));
        }
        if self.retriever.fetch_batch == 0 {
            return Err(FusionError::Config("retriever.fetch_batch must be positive".into()));
        }
        if self.merge.conflict_suffix.is_empty() {
            return Err(FusionError::Config("merge.conflict_suffix must not be empty".into()));
        }
        Ok(())
    }
}
