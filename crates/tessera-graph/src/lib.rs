//! # tessera-graph
//!
//! Demand-driven evaluation engine for image graphs.
//!
//! Nodes wrap [`Operation`]s and are wired pad to pad inside a [`Graph`].
//! A request for a rectangle at one node is answered by computing only the
//! pixels that request depends on, reusing whatever the per-node caches
//! already hold.
//!
//! # Modules
//!
//! - [`graph`] - node arena, wiring, invalidation
//! - [`operation`] - the [`Operation`] trait and its per-kind defaults
//! - [`cache`] - per-node cache with valid regions per mip level
//! - [`traversal`] - prepare / need propagation / process passes
//! - [`eval`] - reusable traversal of one node
//! - [`blit`] - `apply`, `blit`, `blit_buffer`
//! - [`processor`] - chunked incremental rendering
//! - [`registry`] - named operation factories keyed by quality
//! - [`config`] - engine settings from defaults, YAML and environment
//!
//! # Example
//!
//! ```rust
//! use tessera_core::Rect;
//! use tessera_graph::{Graph, Nop};
//!
//! let mut graph = Graph::new();
//! let a = graph.add_node(Nop);
//! let b = graph.add_node(Nop);
//! graph.link(a, b).unwrap();
//! assert_eq!(graph.producer(b, "input").map(|e| e.node), Some(a));
//! assert!(graph.apply(b, &Rect::new(0, 0, 4, 4), 0).is_some());
//! ```
//!
//! # Evaluation
//!
//! ```text
//! apply(node, roi, level)
//!   -> EvalManager            rebuilt when anything upstream changed
//!   -> prepare                formats + bounding boxes, sources first
//!   -> prepare_request        need rectangles, terminal first
//!   -> process                operations, sources first, into caches
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod blit;
pub mod cache;
pub mod config;
pub mod context;
mod error;
pub mod eval;
pub mod graph;
pub mod node;
pub mod operation;
pub mod pad;
mod parallel;
pub mod processor;
pub mod registry;
pub mod traversal;
pub mod visitor;

pub use blit::BlitFlags;
pub use cache::{Cache, CacheEvent, INVALIDATE_ALIGN, VALID_MIPMAPS};
pub use config::{CachePolicy, EngineConfig, EngineConfigBuilder};
pub use context::{OperationContext, ProcessContext};
pub use error::{GraphError, GraphResult, OperationError};
pub use eval::EvalManager;
pub use graph::Graph;
pub use node::{Node, NodeId, NodeKind, Subgraph};
pub use operation::{NodeView, Nop, Operation, OperationKind, PrepareContext};
pub use pad::{Endpoint, PadDirection, PadSpec};
pub use processor::{Processor, ProcessorMode};
pub use registry::{OperationFactory, OperationRegistry, Quality};
pub use traversal::{EvalStats, GraphTraversal, NodeStats};

/// Prelude for operation authors and graph builders.
///
/// # Usage
///
/// ```
/// use tessera_graph::prelude::*;
///
/// let graph = Graph::new();
/// assert!(graph.is_empty());
/// ```
pub mod prelude {
    pub use crate::blit::BlitFlags;
    pub use crate::context::ProcessContext;
    pub use crate::error::{GraphError, GraphResult, OperationError};
    pub use crate::graph::Graph;
    pub use crate::node::NodeId;
    pub use crate::operation::{NodeView, Operation, OperationKind, PrepareContext};
    pub use crate::pad::PadSpec;
    pub use crate::processor::Processor;
    pub use tessera_core::{Buffer, Format, Rect, Region};
}
