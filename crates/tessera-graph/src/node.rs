//! Graph vertices.
//!
//! A [`Node`] is either a leaf wrapping one [`Operation`] or a subgraph
//! whose boundary is formed by explicit input and output proxy nodes.
//! Traversals never visit a subgraph vertex itself: edges into a subgraph
//! land on an input proxy and edges out of it leave from the output proxy.
//!
//! Per-node evaluation state (bounding box, negotiated formats, cache) sits
//! behind a per-node mutex that is held only for short reads and stores,
//! never while an operation runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tessera_core::{Format, Rect};

use crate::cache::Cache;
use crate::eval::EvalManager;
use crate::operation::Operation;
use crate::pad::{Pad, PadDirection};

/// Generational handle of a node inside a [`Graph`](crate::Graph).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Builds an id from its parts. Mostly useful in tests.
    pub const fn from_raw_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index.
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation.
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Invalidation observer; dropped once it returns `false`.
pub type InvalidationListener = Box<dyn FnMut(&Rect) -> bool + Send>;

/// What a node computes.
pub enum NodeKind {
    /// A single operation.
    Leaf(Box<dyn Operation>),
    /// A nested graph.
    Subgraph(Subgraph),
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(op) => f.debug_tuple("Leaf").field(op).finish(),
            Self::Subgraph(sg) => f.debug_tuple("Subgraph").field(sg).finish(),
        }
    }
}

/// Boundary and members of a nested graph.
#[derive(Debug, Clone)]
pub struct Subgraph {
    /// Input pad name to its input proxy.
    pub inputs: Vec<(String, NodeId)>,
    /// Output proxy.
    pub output: NodeId,
    /// Member nodes, proxies excluded.
    pub children: Vec<NodeId>,
}

impl Subgraph {
    /// Proxy standing in for input pad `pad`.
    pub fn input_proxy(&self, pad: &str) -> Option<NodeId> {
        self.inputs
            .iter()
            .find(|(name, _)| name == pad)
            .map(|(_, id)| *id)
    }
}

/// Which side of a subgraph a proxy sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyRole {
    /// Receives data from outside.
    Input,
    /// Exposes the subgraph's result.
    Output,
}

#[derive(Debug, Clone)]
pub(crate) struct Proxy {
    pub(crate) graph: NodeId,
    pub(crate) pad: String,
    pub(crate) role: ProxyRole,
}

/// Mutable evaluation state of a node.
#[derive(Debug, Default)]
pub(crate) struct NodeState {
    pub(crate) have_rect: Rect,
    pub(crate) valid_have_rect: bool,
    pub(crate) have_rect_epoch: u64,
    pub(crate) formats: HashMap<String, Format>,
    pub(crate) cache: Option<Arc<Cache>>,
}

impl NodeState {
    /// Forces the next bounding-box query to recompute. Bumps the epoch so a
    /// computation already in flight does not store its stale result.
    pub(crate) fn mark_have_rect_stale(&mut self) {
        self.valid_have_rect = false;
        self.have_rect_epoch = self.have_rect_epoch.wrapping_add(1);
    }
}

/// A vertex of the graph.
pub struct Node {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) pads: Vec<Pad>,
    pub(crate) state: Mutex<NodeState>,
    pub(crate) dont_cache: bool,
    pub(crate) passthrough: bool,
    pub(crate) parent: Option<NodeId>,
    pub(crate) proxy: Option<Proxy>,
    pub(crate) listeners: Mutex<Vec<InvalidationListener>>,
    pub(crate) eval: Mutex<Option<EvalManager>>,
    pub(crate) bands: Mutex<Vec<EvalManager>>,
}

impl Node {
    pub(crate) fn new(name: String, kind: NodeKind, pads: Vec<Pad>) -> Self {
        Self {
            name,
            kind,
            pads,
            state: Mutex::new(NodeState::default()),
            dont_cache: false,
            passthrough: false,
            parent: None,
            proxy: None,
            listeners: Mutex::new(Vec::new()),
            eval: Mutex::new(None),
            bands: Mutex::new(Vec::new()),
        }
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Leaf or subgraph.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Operation of a leaf node.
    pub fn operation(&self) -> Option<&dyn Operation> {
        match &self.kind {
            NodeKind::Leaf(op) => Some(op.as_ref()),
            NodeKind::Subgraph(_) => None,
        }
    }

    /// Subgraph description of a subgraph node.
    pub fn subgraph(&self) -> Option<&Subgraph> {
        match &self.kind {
            NodeKind::Subgraph(sg) => Some(sg),
            NodeKind::Leaf(_) => None,
        }
    }

    /// Returns `true` when caching is disabled for this node.
    pub fn dont_cache(&self) -> bool {
        self.dont_cache
    }

    /// Returns `true` while the node forwards its input unchanged.
    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    /// Enclosing subgraph.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Returns `true` for subgraph boundary proxies.
    pub fn is_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// Names of all pads with the given direction.
    pub fn pad_names(&self, direction: PadDirection) -> impl Iterator<Item = &str> {
        self.pads
            .iter()
            .filter(move |p| p.spec.direction == direction)
            .map(Pad::name)
    }

    pub(crate) fn pad(&self, name: &str) -> Option<&Pad> {
        self.pads.iter().find(|p| p.name() == name)
    }

    pub(crate) fn pad_mut(&mut self, name: &str) -> Option<&mut Pad> {
        self.pads.iter_mut().find(|p| p.name() == name)
    }

    pub(crate) fn has_pad(&self, name: &str) -> bool {
        self.pad(name).is_some()
    }

    pub(crate) fn output_proxy_of(&self) -> Option<NodeId> {
        match &self.proxy {
            Some(p) if p.role == ProxyRole::Output => Some(p.graph),
            _ => None,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("pads", &self.pads.len())
            .field("dont_cache", &self.dont_cache)
            .field("passthrough", &self.passthrough)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::from_raw_parts(7, 2);
        assert_eq!(id.to_string(), "#7.2");
        assert_eq!(format!("{id:?}"), "#7.2");
        assert_eq!(id.index(), 7);
        assert_eq!(id.generation(), 2);
    }

    #[test]
    fn test_subgraph_proxy_lookup() {
        let sg = Subgraph {
            inputs: vec![
                ("input".into(), NodeId::from_raw_parts(1, 0)),
                ("aux".into(), NodeId::from_raw_parts(2, 0)),
            ],
            output: NodeId::from_raw_parts(3, 0),
            children: Vec::new(),
        };
        assert_eq!(sg.input_proxy("aux"), Some(NodeId::from_raw_parts(2, 0)));
        assert_eq!(sg.input_proxy("aux2"), None);
    }
}
