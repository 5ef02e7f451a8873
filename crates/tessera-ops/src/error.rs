//! Error types for graph descriptions and operation parameters.

use thiserror::Error;

use tessera_graph::GraphError;

/// Error type for building graphs from descriptions.
#[derive(Error, Debug)]
pub enum OpsError {
    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A link or output refers to a node name that was never declared.
    #[error("unknown node '{0}' in graph description")]
    UnknownNode(String),

    /// Two nodes share a name.
    #[error("duplicate node name '{0}'")]
    DuplicateNode(String),

    /// Wiring or registry failure.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Malformed YAML.
    #[error("invalid graph description: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File could not be read or written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OpsError {
    /// Creates an [`OpsError::InvalidParameter`] error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

/// Result type for graph descriptions.
pub type OpsResult<T> = Result<T, OpsError>;
