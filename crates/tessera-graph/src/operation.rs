//! The operation contract.
//!
//! Every pixel-producing unit implements [`Operation`]. The engine asks an
//! operation four geometric questions and one computational one:
//!
//! | Method | Question |
//! |--------|----------|
//! | [`bounding_box`](Operation::bounding_box) | where can I produce defined output? |
//! | [`required_for_output`](Operation::required_for_output) | what input do I need for this output? |
//! | [`invalidated_by_change`](Operation::invalidated_by_change) | what output does this input change dirty? |
//! | [`cached_region`](Operation::cached_region) | what must I compute in one pass? |
//! | [`process`](Operation::process) | compute `result` into the context |
//!
//! Defaults follow the operation's [`OperationKind`]: filters take their
//! input's bounding box, composers the union of input and aux, sources
//! nothing. Point operations need no overrides; area operations override
//! `required_for_output` and `invalidated_by_change` symmetrically.
//!
//! # Usage
//!
//! ```
//! use std::any::Any;
//! use tessera_core::Rect;
//! use tessera_graph::{Operation, OperationError, OperationKind, ProcessContext};
//!
//! #[derive(Debug)]
//! struct Forward;
//!
//! impl Operation for Forward {
//!     fn name(&self) -> &str { "forward" }
//!     fn kind(&self) -> OperationKind { OperationKind::PointFilter }
//!     fn process(
//!         &self,
//!         ctx: &mut ProcessContext<'_>,
//!         _pad: &str,
//!         _result: &Rect,
//!         _level: u32,
//!     ) -> Result<(), OperationError> {
//!         let input = ctx.input("input");
//!         ctx.set_output("output", input);
//!         Ok(())
//!     }
//!     fn as_any(&self) -> &dyn Any { self }
//!     fn as_any_mut(&mut self) -> &mut dyn Any { self }
//! }
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use tessera_core::{Format, Rect};

use crate::context::ProcessContext;
use crate::error::OperationError;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::pad::PadSpec;

/// Structural variant of an operation; selects default pads and geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// No inputs, one output.
    Source,
    /// One input, one output.
    Filter,
    /// Filter whose output pixel depends only on the same input pixel.
    PointFilter,
    /// `input` and `aux`.
    Composer,
    /// `input`, `aux` and `aux2`.
    Composer3,
    /// One input, no output.
    Sink,
}

impl OperationKind {
    /// Pads declared by operations of this kind unless overridden.
    pub fn default_pads(&self) -> Vec<PadSpec> {
        match self {
            Self::Source => vec![PadSpec::output("output")],
            Self::Filter | Self::PointFilter => {
                vec![PadSpec::input("input"), PadSpec::output("output")]
            }
            Self::Composer => vec![
                PadSpec::input("input"),
                PadSpec::input("aux"),
                PadSpec::output("output"),
            ],
            Self::Composer3 => vec![
                PadSpec::input("input"),
                PadSpec::input("aux"),
                PadSpec::input("aux2"),
                PadSpec::output("output"),
            ],
            Self::Sink => vec![PadSpec::input("input")],
        }
    }

    /// Lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Filter => "filter",
            Self::PointFilter => "point-filter",
            Self::Composer => "composer",
            Self::Composer3 => "composer3",
            Self::Sink => "sink",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pixel-producing unit bound to a node.
///
/// All methods take `&self`: operations are shared between worker bands and
/// must keep their parameters immutable during evaluation. Parameters change
/// through [`Graph::configure`], which invalidates the node.
pub trait Operation: Send + Sync + fmt::Debug + 'static {
    /// Operation type name, e.g. `"tessera:box-blur"`.
    fn name(&self) -> &str;

    /// Structural variant.
    fn kind(&self) -> OperationKind;

    /// Pads created when the operation is attached to a node.
    fn pads(&self) -> Vec<PadSpec> {
        self.kind().default_pads()
    }

    /// Negotiates output formats. Runs once per prepare pass, sources first.
    fn prepare(&self, ctx: &mut PrepareContext<'_>) {
        let format = ctx.input_format("input").unwrap_or_default();
        ctx.set_format("output", format);
    }

    /// Region with defined output for the current inputs and parameters.
    fn bounding_box(&self, node: &NodeView<'_>) -> Rect {
        let input = || node.source_bbox("input");
        match self.kind() {
            OperationKind::Source => Rect::EMPTY,
            OperationKind::Filter | OperationKind::PointFilter | OperationKind::Sink => {
                input().unwrap_or(Rect::EMPTY)
            }
            OperationKind::Composer => match (input(), node.source_bbox("aux")) {
                (None, Some(aux)) => aux,
                (None, None) => Rect::EMPTY,
                (Some(input), Some(aux)) => input.bounding_box(&aux),
                (Some(input), None) => input,
            },
            OperationKind::Composer3 => ["input", "aux", "aux2"]
                .iter()
                .filter_map(|p| node.source_bbox(p))
                .fold(Rect::EMPTY, |acc, r| acc.bounding_box(&r)),
        }
    }

    /// Rectangle of `input_pad` needed to compute `roi`.
    fn required_for_output(&self, _node: &NodeView<'_>, _input_pad: &str, roi: &Rect) -> Rect {
        *roi
    }

    /// Output rectangle made stale by a change of `roi` on `input_pad`.
    fn invalidated_by_change(&self, _input_pad: &str, roi: &Rect) -> Rect {
        *roi
    }

    /// Expands `roi` to the area that must be computed in one pass.
    fn cached_region(&self, _node: &NodeView<'_>, roi: &Rect) -> Rect {
        *roi
    }

    /// Computes `result` for `output_pad` at mip `level`.
    ///
    /// Inputs are read from and the output stored into `ctx`. A failure
    /// turns this node's output into an empty buffer for the request.
    fn process(
        &self,
        ctx: &mut ProcessContext<'_>,
        output_pad: &str,
        result: &Rect,
        level: u32,
    ) -> Result<(), OperationError>;

    /// Node responsible for the pixel at `(x, y)`.
    fn detect(&self, node: &NodeView<'_>, x: i32, y: i32) -> Option<NodeId> {
        let own = || node.have_rect().contains_point(x, y).then(|| node.id());
        match self.kind() {
            OperationKind::Source => own(),
            OperationKind::Filter | OperationKind::PointFilter | OperationKind::Sink => {
                match node.source("input") {
                    Some(_) => node.detect_source("input", x, y),
                    None => Some(node.id()),
                }
            }
            OperationKind::Composer => node
                .detect_source("aux", x, y)
                .or_else(|| node.detect_source("input", x, y)),
            OperationKind::Composer3 => node
                .detect_source("aux2", x, y)
                .or_else(|| node.detect_source("aux", x, y))
                .or_else(|| node.detect_source("input", x, y)),
        }
    }

    /// Sinks returning `true` receive the whole rectangle in one final
    /// `process` call instead of one call per chunk.
    fn needs_full(&self) -> bool {
        false
    }

    /// Caching preference consulted under [`CachePolicy::Auto`](crate::CachePolicy::Auto).
    fn cache_hint(&self) -> bool {
        !matches!(self.kind(), OperationKind::PointFilter | OperationKind::Sink)
    }

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ============================================================================
// Views handed to operations
// ============================================================================

/// Read-only view of a node and its inputs.
#[derive(Clone, Copy)]
pub struct NodeView<'a> {
    graph: &'a Graph,
    id: NodeId,
}

impl<'a> NodeView<'a> {
    pub(crate) fn new(graph: &'a Graph, id: NodeId) -> Self {
        Self { graph, id }
    }

    /// Node id.
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Owning graph.
    #[inline]
    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    /// Node name.
    pub fn name(&self) -> &'a str {
        self.graph.name(self.id).unwrap_or("")
    }

    /// Last computed bounding box.
    pub fn have_rect(&self) -> Rect {
        self.graph.have_rect(self.id)
    }

    /// Node connected to `pad`.
    pub fn source(&self, pad: &str) -> Option<NodeId> {
        self.graph.source_of(self.id, pad).map(|e| e.node)
    }

    /// Bounding box of the node connected to `pad`.
    pub fn source_bbox(&self, pad: &str) -> Option<Rect> {
        self.source(pad).map(|s| self.graph.bounding_box(s))
    }

    /// Hit-tests the node connected to `pad`.
    pub fn detect_source(&self, pad: &str, x: i32, y: i32) -> Option<NodeId> {
        self.source(pad).and_then(|s| self.graph.detect(s, x, y))
    }

    /// Format produced by the source of `pad`.
    pub fn input_format(&self, pad: &str) -> Option<Format> {
        let src = self.graph.source_of(self.id, pad)?;
        self.graph.format(src.node, &src.pad)
    }
}

impl fmt::Debug for NodeView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeView").field("id", &self.id).finish()
    }
}

/// Format negotiation handle passed to [`Operation::prepare`].
pub struct PrepareContext<'a> {
    node: NodeView<'a>,
    formats: HashMap<String, Format>,
}

impl<'a> PrepareContext<'a> {
    pub(crate) fn new(node: NodeView<'a>) -> Self {
        Self {
            node,
            formats: HashMap::new(),
        }
    }

    /// The node being prepared.
    pub fn node(&self) -> &NodeView<'a> {
        &self.node
    }

    /// Format delivered to `pad` by its source.
    pub fn input_format(&self, pad: &str) -> Option<Format> {
        self.node.input_format(pad)
    }

    /// Declares the format of `pad`.
    pub fn set_format(&mut self, pad: &str, format: Format) {
        self.formats.insert(pad.to_string(), format);
    }

    pub(crate) fn into_formats(self) -> HashMap<String, Format> {
        self.formats
    }
}

// ============================================================================
// Nop
// ============================================================================

/// Forwards its input untouched. Used for subgraph proxies.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nop;

impl Operation for Nop {
    fn name(&self) -> &str {
        "tessera:nop"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Filter
    }

    fn process(
        &self,
        ctx: &mut ProcessContext<'_>,
        _output_pad: &str,
        _result: &Rect,
        _level: u32,
    ) -> Result<(), OperationError> {
        let input = ctx.input("input");
        ctx.set_output("output", input);
        Ok(())
    }

    fn cache_hint(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pad::PadDirection;

    #[test]
    fn test_default_pads() {
        let pads = OperationKind::Composer3.default_pads();
        let inputs: Vec<_> = pads
            .iter()
            .filter(|p| p.direction == PadDirection::Input)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(inputs, ["input", "aux", "aux2"]);
        assert_eq!(OperationKind::Sink.default_pads().len(), 1);
        assert!(OperationKind::Source.default_pads()[0].is_output());
    }

    #[test]
    fn test_nop_defaults() {
        assert_eq!(Nop.kind(), OperationKind::Filter);
        assert!(!Nop.cache_hint());
        assert!(!Nop.needs_full());
        assert_eq!(Nop.invalidated_by_change("input", &Rect::new(1, 2, 3, 4)), Rect::new(1, 2, 3, 4));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(OperationKind::PointFilter.to_string(), "point-filter");
    }
}
