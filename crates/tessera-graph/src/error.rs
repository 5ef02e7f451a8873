//! Error types for graph construction and evaluation.
//!
//! Structural mistakes (unknown pads, cycles, direction mismatches) are
//! refused when an edge is created and reported as [`GraphError`]. Failures
//! inside an operation are reported as [`OperationError`]; the engine logs
//! them and substitutes an empty buffer instead of surfacing them to callers
//! of `apply`/`blit`.

use thiserror::Error;

use crate::node::NodeId;

/// Error type for graph operations.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Node id does not refer to a live node.
    #[error("no such node: {0}")]
    NoSuchNode(NodeId),

    /// Pad name does not exist on the node.
    #[error("node {node} has no pad named '{pad}'")]
    NoSuchPad {
        /// Node that was queried.
        node: NodeId,
        /// Requested pad name.
        pad: String,
    },

    /// Tried to connect two outputs or two inputs.
    #[error("pad '{pad}' on {node} is not an {expected} pad")]
    DirectionMismatch {
        /// Offending node.
        node: NodeId,
        /// Offending pad.
        pad: String,
        /// Direction that was required.
        expected: &'static str,
    },

    /// Connecting would close a cycle.
    #[error("connecting {source_node} to {sink} would create a cycle")]
    WouldCycle {
        /// Producing node.
        source_node: NodeId,
        /// Consuming node.
        sink: NodeId,
    },

    /// Node's operation is not of the requested concrete type.
    #[error("operation of {node} is not a {expected}")]
    OperationType {
        /// Queried node.
        node: NodeId,
        /// Requested Rust type name.
        expected: &'static str,
    },

    /// Name not found in the operation registry.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// An operation reported a failure.
    #[error("computation failed in {node}: {source}")]
    Computation {
        /// Node whose operation failed.
        node: NodeId,
        /// Underlying failure.
        #[source]
        source: OperationError,
    },

    /// A sink has nothing connected to its input.
    #[error("sink {0} has no connected input")]
    MissingInput(NodeId),

    /// Invalid engine configuration (file, env var or value).
    #[error("configuration error: {0}")]
    Config(String),

    /// Buffer or format failure from the core.
    #[error(transparent)]
    Core(#[from] tessera_core::Error),
}

impl GraphError {
    /// Creates a [`GraphError::NoSuchPad`].
    pub fn no_such_pad(node: NodeId, pad: impl Into<String>) -> Self {
        Self::NoSuchPad {
            node,
            pad: pad.into(),
        }
    }

    /// Creates a [`GraphError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns `true` for errors raised while wiring the graph.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::NoSuchNode(_)
                | Self::NoSuchPad { .. }
                | Self::DirectionMismatch { .. }
                | Self::WouldCycle { .. }
                | Self::OperationType { .. }
                | Self::UnknownOperation(_)
        )
    }
}

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Failure reported by [`Operation::process`](crate::Operation::process).
#[derive(Error, Debug)]
pub enum OperationError {
    /// Operation-specific failure.
    #[error("{0}")]
    Failed(String),

    /// Buffer access failed.
    #[error(transparent)]
    Core(#[from] tessera_core::Error),
}

impl OperationError {
    /// Creates an [`OperationError::Failed`].
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        let id = NodeId::from_raw_parts(3, 0);
        assert!(GraphError::no_such_pad(id, "aux").is_configuration_error());
        assert!(!GraphError::MissingInput(id).is_configuration_error());
        assert!(!GraphError::config("bad").is_configuration_error());
    }

    #[test]
    fn test_messages() {
        let id = NodeId::from_raw_parts(1, 2);
        let err = GraphError::no_such_pad(id, "aux");
        assert_eq!(err.to_string(), "node #1.2 has no pad named 'aux'");
        let err = OperationError::failed("boom");
        assert_eq!(err.to_string(), "boom");
    }
}
