use kgfuse_graph::GraphError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    #[error("invalid term {0:?}")]
    InvalidTerm(String),

    #[error("no node assigned for {entity}: {source}")]
    Unassigned {
        entity: String,
        #[source]
        source: GraphError,
    },

    #[error("no reconciliation rule matches node {0}")]
    NoMatchingRule(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("lookup failed for {key}: {message}")]
    Lookup { key: String, message: String },

    #[error("lookup timed out for {0}")]
    Timeout(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FusionError {
    pub(crate) fn unassigned(entity: impl Into<String>, source: GraphError) -> Self {
        FusionError::Unassigned {
            entity: entity.into(),
            source,
        }
    }

    /// Lookup-level failures are recovered as "zero candidates".
    pub fn is_lookup(&self) -> bool {
        matches!(self, FusionError::Lookup { .. } | FusionError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, FusionError>;
