//! The node arena and its topology API.
//!
//! A [`Graph`] owns every node, addressed by generational [`NodeId`]s. Edges
//! are stored on pads: an input pad records its single source, an output pad
//! the list of consumers. Wiring methods take `&mut self`; evaluation,
//! invalidation and bounding-box queries take `&self` and synchronize through
//! per-node locks, so one graph can serve several worker bands at once.
//!
//! # Usage
//!
//! ```ignore
//! let mut graph = Graph::new();
//! let src = graph.add_node(Color::new([1.0, 0.0, 0.0, 1.0], Rect::new(0, 0, 64, 64)));
//! let inv = graph.add_node(Invert::default());
//! graph.link(src, inv)?;
//! let out = graph.apply(inv, &Rect::new(0, 0, 16, 16), 0);
//! ```
//!
//! # Subgraphs
//!
//! [`Graph::add_subgraph`] creates a vertex with explicit boundary proxies.
//! Connecting to a subgraph input lands on its input proxy; connecting from
//! a subgraph leaves from its output proxy. Members are added with
//! [`Graph::add_child`] and wired to the proxies returned by
//! [`Graph::input_proxy`] and [`Graph::output_proxy`].

use std::collections::HashSet;
use std::sync::Arc;

use tessera_core::sync;
use tessera_core::{Buffer, Format, Rect};
use tracing::{debug, trace, warn};

use crate::cache::Cache;
use crate::config::{CachePolicy, EngineConfig};
use crate::context::{OperationContext, ProcessContext};
use crate::error::{GraphError, GraphResult};
use crate::node::{Node, NodeId, NodeKind, Proxy, ProxyRole, Subgraph};
use crate::operation::{Nop, NodeView, Operation, OperationKind, PrepareContext};
use crate::pad::{Endpoint, Pad, PadDirection, PadSpec};
use crate::registry::OperationRegistry;
use crate::visitor::Visitable;

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena of nodes plus engine configuration.
pub struct Graph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    config: EngineConfig,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Creates an empty graph with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an empty graph.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            config: config.normalized(),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replaces the engine configuration.
    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config.normalized();
    }

    // ========================================================================
    // Arena
    // ========================================================================

    /// Node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.node.as_mut())
    }

    fn require(&self, id: NodeId) -> GraphResult<&Node> {
        self.node(id).ok_or(GraphError::NoSuchNode(id))
    }

    fn require_mut(&mut self, id: NodeId) -> GraphResult<&mut Node> {
        self.node_mut(id).ok_or(GraphError::NoSuchNode(id))
    }

    /// Returns `true` if `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Number of live nodes, proxies included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all live nodes.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.node
                .as_ref()
                .map(|_| NodeId::from_raw_parts(i as u32, s.generation))
        })
    }

    fn insert(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId::from_raw_parts(index, slot.generation)
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId::from_raw_parts(self.slots.len() as u32 - 1, 0)
        }
    }

    fn release(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.index() as usize) {
            if slot.generation == id.generation() && slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index());
            }
        }
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Adds a node running `op`, named after the operation.
    pub fn add_node<O: Operation>(&mut self, op: O) -> NodeId {
        self.add_boxed(Box::new(op))
    }

    /// Adds a node running a boxed operation.
    pub fn add_boxed(&mut self, op: Box<dyn Operation>) -> NodeId {
        let name = op.name().to_string();
        self.insert_leaf(name, op)
    }

    /// Adds a named node.
    pub fn add_named<O: Operation>(&mut self, name: impl Into<String>, op: O) -> NodeId {
        self.insert_leaf(name.into(), Box::new(op))
    }

    /// Adds a node whose operation is resolved by name through `registry`.
    pub fn add_from_registry(
        &mut self,
        registry: &OperationRegistry,
        name: &str,
    ) -> GraphResult<NodeId> {
        let op = registry.create(name)?;
        Ok(self.add_boxed(op))
    }

    fn insert_leaf(&mut self, name: String, op: Box<dyn Operation>) -> NodeId {
        let pads = op.pads().into_iter().map(Pad::new).collect();
        let id = self.insert(Node::new(name, NodeKind::Leaf(op), pads));
        trace!(%id, "node added");
        id
    }

    /// Adds a subgraph with the given input pads and one `output` pad.
    pub fn add_subgraph(&mut self, name: impl Into<String>, inputs: &[&str]) -> NodeId {
        let mut pads: Vec<Pad> = inputs.iter().map(|p| Pad::new(PadSpec::input(*p))).collect();
        pads.push(Pad::new(PadSpec::output("output")));
        let placeholder = Subgraph {
            inputs: Vec::new(),
            output: NodeId::from_raw_parts(u32::MAX, u32::MAX),
            children: Vec::new(),
        };
        let graph = self.insert(Node::new(name.into(), NodeKind::Subgraph(placeholder), pads));

        let mut proxy_inputs = Vec::with_capacity(inputs.len());
        for pad in inputs {
            let proxy = self.insert_proxy(graph, pad, ProxyRole::Input);
            proxy_inputs.push((pad.to_string(), proxy));
        }
        let output = self.insert_proxy(graph, "output", ProxyRole::Output);

        if let Some(NodeKind::Subgraph(sg)) = self.node_mut(graph).map(|n| &mut n.kind) {
            sg.inputs = proxy_inputs;
            sg.output = output;
        }
        graph
    }

    fn insert_proxy(&mut self, graph: NodeId, pad: &str, role: ProxyRole) -> NodeId {
        let id = self.insert_leaf(format!("proxynop-{pad}"), Box::new(Nop));
        if let Some(node) = self.node_mut(id) {
            node.parent = Some(graph);
            node.proxy = Some(Proxy {
                graph,
                pad: pad.to_string(),
                role,
            });
        }
        id
    }

    /// Adds a member node to a subgraph. It inherits the subgraph's
    /// `dont_cache` flag.
    pub fn add_child<O: Operation>(&mut self, parent: NodeId, op: O) -> GraphResult<NodeId> {
        let dont_cache = match self.require(parent)? {
            n if n.subgraph().is_some() => n.dont_cache,
            _ => {
                return Err(GraphError::OperationType {
                    node: parent,
                    expected: "subgraph",
                });
            }
        };
        let id = self.add_node(op);
        if let Some(node) = self.node_mut(id) {
            node.parent = Some(parent);
            node.dont_cache = dont_cache;
        }
        if let Some(NodeKind::Subgraph(sg)) = self.node_mut(parent).map(|n| &mut n.kind) {
            sg.children.push(id);
        }
        Ok(id)
    }

    /// Proxy behind input pad `pad` of a subgraph.
    pub fn input_proxy(&self, graph: NodeId, pad: &str) -> GraphResult<NodeId> {
        let node = self.require(graph)?;
        let sg = node.subgraph().ok_or(GraphError::OperationType {
            node: graph,
            expected: "subgraph",
        })?;
        sg.input_proxy(pad)
            .ok_or_else(|| GraphError::no_such_pad(graph, pad))
    }

    /// Output proxy of a subgraph.
    pub fn output_proxy(&self, graph: NodeId) -> GraphResult<NodeId> {
        let node = self.require(graph)?;
        node.subgraph()
            .map(|sg| sg.output)
            .ok_or(GraphError::OperationType {
                node: graph,
                expected: "subgraph",
            })
    }

    /// Leaf that actually produces the output of `id`.
    pub(crate) fn resolve_output(&self, id: NodeId) -> NodeId {
        match self.node(id).and_then(Node::subgraph) {
            Some(sg) => self.resolve_output(sg.output),
            None => id,
        }
    }

    // ========================================================================
    // Wiring
    // ========================================================================

    fn resolve_sink(&self, id: NodeId, pad: &str) -> GraphResult<Endpoint> {
        let node = self.require(id)?;
        let spec = &node
            .pad(pad)
            .ok_or_else(|| GraphError::no_such_pad(id, pad))?
            .spec;
        if spec.direction != PadDirection::Input {
            return Err(GraphError::DirectionMismatch {
                node: id,
                pad: pad.to_string(),
                expected: "input",
            });
        }
        match node.subgraph() {
            Some(sg) => {
                let proxy = sg
                    .input_proxy(pad)
                    .ok_or_else(|| GraphError::no_such_pad(id, pad))?;
                Ok(Endpoint::new(proxy, "input"))
            }
            None => Ok(Endpoint::new(id, pad)),
        }
    }

    fn resolve_source(&self, id: NodeId, pad: &str) -> GraphResult<Endpoint> {
        let node = self.require(id)?;
        let spec = &node
            .pad(pad)
            .ok_or_else(|| GraphError::no_such_pad(id, pad))?
            .spec;
        if spec.direction != PadDirection::Output {
            return Err(GraphError::DirectionMismatch {
                node: id,
                pad: pad.to_string(),
                expected: "output",
            });
        }
        match node.subgraph() {
            Some(sg) => Ok(Endpoint::new(self.resolve_output(sg.output), "output")),
            None => Ok(Endpoint::new(id, pad)),
        }
    }

    /// Connects `source:source_pad` to `sink:sink_pad`.
    ///
    /// Replaces an existing connection on the sink pad. The sink is
    /// invalidated over the area the new source can produce. On error the
    /// graph is left unchanged.
    pub fn connect(
        &mut self,
        source: NodeId,
        source_pad: &str,
        sink: NodeId,
        sink_pad: &str,
    ) -> GraphResult<()> {
        let to = self.resolve_sink(sink, sink_pad)?;
        let from = self.resolve_source(source, source_pad)?;

        if from.node == to.node || self.depends_on(from.node, to.node) {
            return Err(GraphError::WouldCycle {
                source_node: source,
                sink,
            });
        }

        let current = self
            .node(to.node)
            .and_then(|n| n.pad(&to.pad))
            .and_then(|p| p.connection.clone());
        if current.as_ref() == Some(&from) {
            return Ok(());
        }
        if current.is_some() {
            self.disconnect_endpoint(&to);
        }

        if let Some(pad) = self.node_mut(to.node).and_then(|n| n.pad_mut(&to.pad)) {
            pad.connection = Some(from.clone());
        }
        if let Some(pad) = self.node_mut(from.node).and_then(|n| n.pad_mut(&from.pad)) {
            pad.targets.push(to.clone());
        }
        debug!(source = %from, sink = %to, "connected");

        let src_rect = self.bounding_box(from.node);
        let dirty = self.invalidated_by_change(to.node, &to.pad, &src_rect);
        self.invalidate(to.node, Some(&dirty), false);
        Ok(())
    }

    /// [`connect`](Self::connect) with the sink named first.
    pub fn connect_from(
        &mut self,
        sink: NodeId,
        sink_pad: &str,
        source: NodeId,
        source_pad: &str,
    ) -> GraphResult<()> {
        self.connect(source, source_pad, sink, sink_pad)
    }

    /// Connects `source:output` to `sink:input`.
    pub fn link(&mut self, source: NodeId, sink: NodeId) -> GraphResult<()> {
        self.connect(source, "output", sink, "input")
    }

    /// Links a chain of nodes, each into the next.
    pub fn link_many(&mut self, chain: &[NodeId]) -> GraphResult<()> {
        for pair in chain.windows(2) {
            self.link(pair[0], pair[1])?;
        }
        Ok(())
    }

    /// Removes the connection on `sink:sink_pad`.
    ///
    /// Returns `false` if the pad was not connected.
    pub fn disconnect(&mut self, sink: NodeId, sink_pad: &str) -> GraphResult<bool> {
        let to = self.resolve_sink(sink, sink_pad)?;
        Ok(self.disconnect_endpoint(&to))
    }

    fn disconnect_endpoint(&mut self, to: &Endpoint) -> bool {
        let Some(from) = self
            .node(to.node)
            .and_then(|n| n.pad(&to.pad))
            .and_then(|p| p.connection.clone())
        else {
            return false;
        };

        let src_rect = self.bounding_box(from.node);
        let dirty = self.invalidated_by_change(to.node, &to.pad, &src_rect);
        self.invalidate(to.node, Some(&dirty), false);

        if let Some(pad) = self.node_mut(to.node).and_then(|n| n.pad_mut(&to.pad)) {
            pad.connection = None;
        }
        if let Some(pad) = self.node_mut(from.node).and_then(|n| n.pad_mut(&from.pad)) {
            pad.targets.retain(|t| t != to);
        }
        debug!(source = %from, sink = %to, "disconnected");
        true
    }

    /// Removes a node, disconnecting it and invalidating its consumers.
    ///
    /// Removing a subgraph removes its members and proxies. Proxies can only
    /// be removed together with their subgraph.
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<()> {
        let node = self.require(id)?;
        if node.is_proxy() {
            return Err(GraphError::OperationType {
                node: id,
                expected: "non-proxy node",
            });
        }
        self.remove_recursive(id);
        Ok(())
    }

    fn remove_recursive(&mut self, id: NodeId) {
        let Some(node) = self.node(id) else {
            return;
        };
        if let Some(sg) = node.subgraph() {
            let mut members = sg.children.clone();
            members.extend(sg.inputs.iter().map(|(_, p)| *p));
            members.push(sg.output);
            let parent = node.parent;
            for member in members {
                self.remove_recursive(member);
            }
            self.detach_from_parent(id, parent);
            self.release(id);
            return;
        }

        self.invalidate(id, None, false);

        let consumers: Vec<Endpoint> = node
            .pads
            .iter()
            .filter(|p| p.spec.is_output())
            .flat_map(|p| p.targets.iter().cloned())
            .collect();
        let inputs: Vec<Endpoint> = node
            .pads
            .iter()
            .filter(|p| p.spec.is_input() && p.connection.is_some())
            .map(|p| Endpoint::new(id, p.name()))
            .collect();
        let parent = node.parent;

        for sink in &consumers {
            self.disconnect_endpoint(sink);
        }
        for sink in &inputs {
            self.disconnect_endpoint(sink);
        }
        self.detach_from_parent(id, parent);
        self.release(id);
        debug!(%id, "node removed");
    }

    fn detach_from_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(NodeKind::Subgraph(sg)) = parent.and_then(|p| self.node_mut(p)).map(|n| &mut n.kind) {
            sg.children.retain(|c| *c != id);
        }
    }

    /// Source endpoint feeding `pad` of `id`, as stored on the pad.
    pub(crate) fn source_of(&self, id: NodeId, pad: &str) -> Option<Endpoint> {
        let node = self.node(id)?;
        match node.subgraph() {
            Some(sg) => self.source_of(sg.input_proxy(pad)?, "input"),
            None => node.pad(pad)?.connection.clone(),
        }
    }

    /// Node feeding `pad` of `id`. Subgraph output proxies are reported as
    /// their subgraph.
    pub fn producer(&self, id: NodeId, pad: &str) -> Option<Endpoint> {
        let src = self.source_of(id, pad)?;
        match self.node(src.node).and_then(Node::output_proxy_of) {
            Some(graph) => Some(Endpoint::new(graph, "output")),
            None => Some(src),
        }
    }

    /// Consumers of `pad` of `id`. Subgraph input proxies are reported as
    /// their subgraph pad.
    pub fn consumers(&self, id: NodeId, pad: &str) -> Vec<Endpoint> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        let (id, pad) = match node.subgraph() {
            Some(_) => (self.resolve_output(id), "output"),
            None => (id, pad),
        };
        self.node(id)
            .and_then(|n| n.pad(pad))
            .map(|p| {
                p.targets
                    .iter()
                    .map(|t| match self.node(t.node).and_then(|n| n.proxy.as_ref()) {
                        Some(proxy) if proxy.role == ProxyRole::Input => {
                            Endpoint::new(proxy.graph, proxy.pad.clone())
                        }
                        _ => t.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns `true` if `node` transitively depends on `upstream`.
    pub fn depends_on(&self, node: NodeId, upstream: NodeId) -> bool {
        let target = self.resolve_output(upstream);
        let mut stack = vec![self.resolve_output(node)];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            for dep in self.dependencies(id) {
                if dep == target {
                    return true;
                }
                stack.push(dep);
            }
        }
        false
    }

    /// Direct upstream nodes of `id`, in pad order.
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        if let Some(sg) = node.subgraph() {
            return vec![sg.output];
        }
        let mut deps: Vec<NodeId> = Vec::new();
        for pad in node.pads.iter().filter(|p| p.spec.is_input()) {
            if let Some(src) = &pad.connection {
                if !deps.contains(&src.node) {
                    deps.push(src.node);
                }
            }
        }
        deps
    }

    pub(crate) fn targets(&self, id: NodeId) -> Vec<Endpoint> {
        self.node(id)
            .map(|n| {
                n.pads
                    .iter()
                    .filter(|p| p.spec.is_output())
                    .flat_map(|p| p.targets.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Node name.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(Node::name)
    }

    /// Renames a node.
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> GraphResult<()> {
        self.require_mut(id)?.name = name.into();
        Ok(())
    }

    /// Name and id, for diagnostics.
    pub fn debug_name(&self, id: NodeId) -> String {
        match self.node(id) {
            Some(n) => format!("{} {}", n.name, id),
            None => format!("<removed> {id}"),
        }
    }

    /// Operation kind of a leaf node.
    pub fn operation_kind(&self, id: NodeId) -> Option<OperationKind> {
        self.node(id)?.operation().map(|op| op.kind())
    }

    /// Returns `true` if `id` has a pad named `pad`.
    pub fn has_pad(&self, id: NodeId, pad: &str) -> bool {
        self.node(id).is_some_and(|n| n.has_pad(pad))
    }

    /// Disables or enables caching for a node.
    pub fn set_dont_cache(&mut self, id: NodeId, dont_cache: bool) -> GraphResult<()> {
        self.require_mut(id)?.dont_cache = dont_cache;
        Ok(())
    }

    /// Makes a node forward its `input` unchanged.
    pub fn set_passthrough(&mut self, id: NodeId, passthrough: bool) -> GraphResult<()> {
        let node = self.require_mut(id)?;
        if node.passthrough == passthrough {
            return Ok(());
        }
        node.passthrough = passthrough;
        self.invalidate(id, None, true);
        Ok(())
    }

    /// Typed access to a node's operation.
    pub fn operation<T: Operation>(&self, id: NodeId) -> GraphResult<&T> {
        self.require(id)?
            .operation()
            .and_then(|op| op.as_any().downcast_ref::<T>())
            .ok_or(GraphError::OperationType {
                node: id,
                expected: std::any::type_name::<T>(),
            })
    }

    /// Changes parameters of a node's operation and invalidates the node
    /// over its old and new bounding boxes.
    pub fn configure<T, F>(&mut self, id: NodeId, f: F) -> GraphResult<()>
    where
        T: Operation,
        F: FnOnce(&mut T),
    {
        let old = self.have_rect(id);
        let node = self.require_mut(id)?;
        let op = match &mut node.kind {
            NodeKind::Leaf(op) => op.as_any_mut().downcast_mut::<T>(),
            NodeKind::Subgraph(_) => None,
        }
        .ok_or(GraphError::OperationType {
            node: id,
            expected: std::any::type_name::<T>(),
        })?;
        f(op);

        sync::lock(&node.state).mark_have_rect_stale();
        let new = self.bounding_box(id);
        self.invalidate(id, Some(&old.bounding_box(&new)), true);
        Ok(())
    }

    // ========================================================================
    // Geometry and formats
    // ========================================================================

    /// Bounding box of `id`, recomputed if stale.
    pub fn bounding_box(&self, id: NodeId) -> Rect {
        let Some(node) = self.node(id) else {
            warn!(%id, "bounding box of missing node");
            return Rect::EMPTY;
        };
        let epoch = {
            let state = sync::lock(&node.state);
            if state.valid_have_rect {
                return state.have_rect;
            }
            state.have_rect_epoch
        };
        let rect = self.compute_bounding_box(id, node);
        let mut state = sync::lock(&node.state);
        if state.have_rect_epoch == epoch {
            state.have_rect = rect;
            state.valid_have_rect = true;
        } else {
            trace!(%id, %rect, "bounding box invalidated while computing");
        }
        rect
    }

    fn compute_bounding_box(&self, id: NodeId, node: &Node) -> Rect {
        match &node.kind {
            NodeKind::Subgraph(sg) => self.bounding_box(sg.output),
            NodeKind::Leaf(_) if node.passthrough => self
                .source_of(id, "input")
                .map(|s| self.bounding_box(s.node))
                .unwrap_or(Rect::EMPTY),
            NodeKind::Leaf(op) => op.bounding_box(&NodeView::new(self, id)),
        }
    }

    /// Last stored bounding box, without recomputation.
    pub fn have_rect(&self, id: NodeId) -> Rect {
        match self.node(id) {
            Some(node) if node.subgraph().is_some() => self.have_rect(self.resolve_output(id)),
            Some(node) => sync::lock(&node.state).have_rect,
            None => Rect::EMPTY,
        }
    }

    /// Negotiated format of `pad`, once prepared.
    pub fn format(&self, id: NodeId, pad: &str) -> Option<Format> {
        let node = self.node(id)?;
        if node.subgraph().is_some() {
            return self.format(self.resolve_output(id), "output");
        }
        sync::lock(&node.state).formats.get(pad).copied()
    }

    fn invalidated_by_change(&self, id: NodeId, pad: &str, rect: &Rect) -> Rect {
        match self.node(id) {
            Some(node) if !node.passthrough => node
                .operation()
                .map(|op| op.invalidated_by_change(pad, rect))
                .unwrap_or(*rect),
            _ => *rect,
        }
    }

    /// Runs format negotiation and refreshes the bounding box of a leaf.
    pub(crate) fn prepare_node(&self, id: NodeId) {
        let Some(node) = self.node(id) else {
            warn!(%id, "prepare of missing node");
            return;
        };
        let NodeKind::Leaf(op) = &node.kind else {
            return;
        };
        let formats = if node.passthrough {
            let mut f = std::collections::HashMap::new();
            let input = NodeView::new(self, id).input_format("input").unwrap_or_default();
            f.insert("output".to_string(), input);
            f
        } else {
            let mut ctx = PrepareContext::new(NodeView::new(self, id));
            op.prepare(&mut ctx);
            ctx.into_formats()
        };
        {
            let mut state = sync::lock(&node.state);
            state.formats.extend(formats);
            state.mark_have_rect_stale();
        }
        let rect = self.bounding_box(id);

        let mut state = sync::lock(&node.state);
        let output = state.formats.get("output").copied().unwrap_or_default();
        let stale = state.cache.as_ref().is_some_and(|c| c.format() != output);
        if stale {
            debug!(%id, "dropping cache after format change");
            state.cache = None;
        } else if let Some(cache) = &state.cache {
            cache.set_extent(rect);
        }
    }

    /// Hit-tests the graph below `id` at `(x, y)`.
    pub fn detect(&self, id: NodeId, x: i32, y: i32) -> Option<NodeId> {
        let node = self.node(id)?;
        match &node.kind {
            NodeKind::Subgraph(sg) => self.detect(sg.output, x, y),
            NodeKind::Leaf(_) if node.passthrough => {
                let view = NodeView::new(self, id);
                match view.source("input") {
                    Some(_) => view.detect_source("input", x, y),
                    None => Some(id),
                }
            }
            NodeKind::Leaf(op) => {
                self.bounding_box(id);
                op.detect(&NodeView::new(self, id), x, y)
            }
        }
    }

    // ========================================================================
    // Caches
    // ========================================================================

    /// Existing cache of the node producing `id`'s output.
    pub fn cache(&self, id: NodeId) -> Option<Arc<Cache>> {
        let id = self.resolve_output(id);
        sync::lock(&self.node(id)?.state).cache.clone()
    }

    /// Cache of the node producing `id`'s output, created on demand with the
    /// negotiated output format and the current bounding box.
    pub fn ensure_cache(&self, id: NodeId) -> Option<Arc<Cache>> {
        let id = self.resolve_output(id);
        let node = self.node(id)?;
        if !node.has_pad("output") {
            return None;
        }
        let extent = self.bounding_box(id);
        let format = self.format(id, "output").unwrap_or_default();
        let mut state = sync::lock(&node.state);
        if let Some(cache) = &state.cache {
            if cache.format() == format {
                return Some(Arc::clone(cache));
            }
        }
        trace!(%id, %extent, %format, "creating cache");
        let cache = Arc::new(Cache::new(extent, format, self.config.tile_size));
        state.cache = Some(Arc::clone(&cache));
        Some(cache)
    }

    /// Returns `true` if the output of `id` should be written into its cache.
    pub fn wants_cache(&self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        if node.dont_cache || !node.has_pad("output") {
            return false;
        }
        match self.config.cache_policy {
            CachePolicy::Always => true,
            CachePolicy::Never => false,
            CachePolicy::Auto => node.operation().is_some_and(|op| op.cache_hint()),
        }
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Subscribes to invalidations of `id`. The listener is dropped once it
    /// returns `false`; it must not call back into invalidation of the same
    /// node.
    pub fn add_invalidation_listener<F>(&self, id: NodeId, listener: F) -> GraphResult<()>
    where
        F: FnMut(&Rect) -> bool + Send + 'static,
    {
        let node = self.require(id)?;
        sync::lock(&node.listeners).push(Box::new(listener));
        Ok(())
    }

    /// Marks `rect` of `id` stale and propagates downstream.
    ///
    /// `None` covers the old and the fresh bounding box. With `clear_cache`
    /// the cached pixels are zeroed as well. Upstream nodes are never
    /// touched.
    pub fn invalidate(&self, id: NodeId, rect: Option<&Rect>, clear_cache: bool) {
        let Some(node) = self.node(id) else {
            warn!(%id, "invalidation of missing node");
            return;
        };
        if let Some(sg) = node.subgraph() {
            self.invalidate(sg.output, rect, clear_cache);
            return;
        }

        let rect = match rect {
            Some(r) => *r,
            None => {
                let old = {
                    let mut state = sync::lock(&node.state);
                    state.mark_have_rect_stale();
                    state.have_rect
                };
                old.bounding_box(&self.bounding_box(id))
            }
        };
        trace!(%id, %rect, "invalidated");

        let cache = sync::lock(&node.state).cache.clone();
        if let Some(cache) = cache {
            if clear_cache {
                cache.buffer().clear(Some(&rect));
            }
            cache.invalidate(Some(&rect));
        }
        sync::lock(&node.state).mark_have_rect_stale();
        Self::emit_invalidated(node, &rect);

        if let Some(graph) = node.output_proxy_of().and_then(|g| self.node(g)) {
            sync::lock(&graph.state).mark_have_rect_stale();
            Self::emit_invalidated(graph, &rect);
        }

        for target in self.targets(id) {
            let dirty = self.invalidated_by_change(target.node, &target.pad, &rect);
            self.invalidate(target.node, Some(&dirty), false);
        }
    }

    fn emit_invalidated(node: &Node, rect: &Rect) {
        sync::lock(&node.listeners).retain_mut(|l| l(rect));
    }

    // ========================================================================
    // Operation dispatch
    // ========================================================================

    /// Runs the operation of `id` for `result` and returns its output.
    ///
    /// A failing operation yields `empty`.
    pub(crate) fn process_operation(
        &self,
        id: NodeId,
        ctx: &mut OperationContext,
        output_pad: &str,
        result: &Rect,
        level: u32,
        empty: &Buffer,
    ) -> Option<Buffer> {
        let node = self.node(id)?;
        let NodeKind::Leaf(op) = &node.kind else {
            warn!(%id, "processing a subgraph vertex");
            return None;
        };
        let has_output = node.has_pad(output_pad);
        if result.is_empty() {
            if !has_output {
                return None;
            }
            let out = Buffer::empty();
            ctx.set(output_pad, out.clone());
            return Some(out);
        }
        if node.passthrough {
            let input = ctx.get("input").cloned().unwrap_or_else(|| empty.clone());
            ctx.set(output_pad, input.clone());
            return Some(input);
        }

        let outcome = {
            let mut pc = ProcessContext::new(self, id, ctx, empty);
            op.process(&mut pc, output_pad, result, level)
        };
        match outcome {
            Ok(()) => ctx.get(output_pad).cloned(),
            Err(source) => {
                let err = GraphError::Computation { node: id, source };
                warn!(node = %self.debug_name(id), %result, %err, "operation failed");
                if !has_output {
                    return None;
                }
                ctx.set(output_pad, empty.clone());
                Some(empty.clone())
            }
        }
    }
}

impl Visitable for Graph {
    type Vertex = NodeId;

    fn depends_on(&self, vertex: NodeId) -> Vec<NodeId> {
        self.dependencies(vertex)
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationError;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Solid {
        extent: Rect,
    }

    impl Operation for Solid {
        fn name(&self) -> &str {
            "test:solid"
        }
        fn kind(&self) -> OperationKind {
            OperationKind::Source
        }
        fn bounding_box(&self, _node: &NodeView<'_>) -> Rect {
            self.extent
        }
        fn process(
            &self,
            ctx: &mut ProcessContext<'_>,
            pad: &str,
            result: &Rect,
            _level: u32,
        ) -> Result<(), OperationError> {
            let out = ctx.output_target(result);
            ctx.set_output(pad, out);
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct Grow(i32);

    impl Operation for Grow {
        fn name(&self) -> &str {
            "test:grow"
        }
        fn kind(&self) -> OperationKind {
            OperationKind::Filter
        }
        fn bounding_box(&self, node: &NodeView<'_>) -> Rect {
            node.source_bbox("input")
                .map(|r| r.expand(self.0, self.0))
                .unwrap_or(Rect::EMPTY)
        }
        fn invalidated_by_change(&self, _pad: &str, roi: &Rect) -> Rect {
            roi.expand(self.0, self.0)
        }
        fn process(
            &self,
            ctx: &mut ProcessContext<'_>,
            pad: &str,
            _result: &Rect,
            _level: u32,
        ) -> Result<(), OperationError> {
            let input = ctx.input("input");
            ctx.set_output(pad, input);
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn solid(graph: &mut Graph, w: i32, h: i32) -> NodeId {
        graph.add_node(Solid {
            extent: Rect::new(0, 0, w, h),
        })
    }

    #[test]
    fn test_add_and_remove_reuses_slot() {
        let mut g = Graph::new();
        let a = solid(&mut g, 4, 4);
        g.remove_node(a).unwrap();
        assert!(!g.contains(a));
        let b = solid(&mut g, 4, 4);
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(g.name(a).is_none());
    }

    #[test]
    fn test_connect_errors_leave_graph_unchanged() {
        let mut g = Graph::new();
        let a = solid(&mut g, 4, 4);
        let b = g.add_node(Nop);
        let err = g.connect(a, "output", b, "aux").unwrap_err();
        assert!(matches!(err, GraphError::NoSuchPad { .. }));
        let err = g.connect(b, "input", a, "output").unwrap_err();
        assert!(matches!(err, GraphError::DirectionMismatch { .. }));
        assert!(g.producer(b, "input").is_none());
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_connect_refuses_cycles() {
        let mut g = Graph::new();
        let a = g.add_node(Nop);
        let b = g.add_node(Nop);
        g.link(a, b).unwrap();
        assert!(matches!(g.link(b, a), Err(GraphError::WouldCycle { .. })));
        assert!(matches!(g.link(a, a), Err(GraphError::WouldCycle { .. })));
        assert!(g.depends_on(b, a));
        assert!(!g.depends_on(a, b));
    }

    #[test]
    fn test_reconnect_replaces_source() {
        let mut g = Graph::new();
        let a = solid(&mut g, 4, 4);
        let b = solid(&mut g, 8, 8);
        let n = g.add_node(Nop);
        g.link(a, n).unwrap();
        g.link(b, n).unwrap();
        assert_eq!(g.producer(n, "input").map(|e| e.node), Some(b));
        assert!(g.consumers(a, "output").is_empty());
        assert_eq!(g.consumers(b, "output").len(), 1);
        assert_eq!(g.bounding_box(n), Rect::new(0, 0, 8, 8));
    }

    #[test]
    fn test_disconnect() {
        let mut g = Graph::new();
        let a = solid(&mut g, 4, 4);
        let n = g.add_node(Nop);
        g.link(a, n).unwrap();
        assert!(g.disconnect(n, "input").unwrap());
        assert!(!g.disconnect(n, "input").unwrap());
        assert_eq!(g.bounding_box(n), Rect::EMPTY);
    }

    #[test]
    fn test_remove_node_disconnects_consumers() {
        let mut g = Graph::new();
        let a = solid(&mut g, 4, 4);
        let n = g.add_node(Nop);
        g.link(a, n).unwrap();
        assert_eq!(g.bounding_box(n), Rect::new(0, 0, 4, 4));
        g.remove_node(a).unwrap();
        assert!(g.producer(n, "input").is_none());
        assert_eq!(g.bounding_box(n), Rect::EMPTY);
    }

    #[test]
    fn test_invalidation_flows_downstream_only() {
        let mut g = Graph::new();
        let a = solid(&mut g, 32, 32);
        let b = g.add_node(Grow(2));
        let c = g.add_node(Nop);
        g.link_many(&[a, b, c]).unwrap();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        for id in [a, b, c] {
            let seen = Arc::clone(&seen);
            g.add_invalidation_listener(id, move |r| {
                seen.lock().unwrap().push((id, *r));
                true
            })
            .unwrap();
        }
        g.invalidate(b, Some(&Rect::new(4, 4, 2, 2)), false);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (b, Rect::new(4, 4, 2, 2)));
        assert_eq!(seen[1], (c, Rect::new(4, 4, 2, 2)));
        drop(seen);

        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        g.add_invalidation_listener(c, move |r| {
            assert_eq!(*r, Rect::new(-2, -2, 8, 8));
            h.fetch_add(1, Ordering::SeqCst);
            false
        })
        .unwrap();
        g.invalidate(a, Some(&Rect::new(0, 0, 4, 4)), false);
        g.invalidate(a, Some(&Rect::new(0, 0, 4, 4)), false);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_configure_updates_bbox() {
        let mut g = Graph::new();
        let a = solid(&mut g, 4, 4);
        let n = g.add_node(Nop);
        g.link(a, n).unwrap();
        assert_eq!(g.bounding_box(n), Rect::new(0, 0, 4, 4));
        g.configure::<Solid, _>(a, |s| s.extent = Rect::new(0, 0, 10, 2))
            .unwrap();
        assert_eq!(g.bounding_box(n), Rect::new(0, 0, 10, 2));
        assert!(g.configure::<Grow, _>(a, |_| {}).is_err());
        assert_eq!(g.operation::<Solid>(a).unwrap().extent.width, 10);
    }

    #[test]
    fn test_subgraph_boundary() {
        let mut g = Graph::new();
        let src = solid(&mut g, 16, 16);
        let sg = g.add_subgraph("group", &["input"]);
        let grow = g.add_child(sg, Grow(1)).unwrap();
        let pin = g.input_proxy(sg, "input").unwrap();
        let pout = g.output_proxy(sg).unwrap();
        g.link(pin, grow).unwrap();
        g.link(grow, pout).unwrap();
        g.link(src, sg).unwrap();
        let sink = g.add_node(Nop);
        g.link(sg, sink).unwrap();

        assert_eq!(g.bounding_box(sg), Rect::new(-1, -1, 18, 18));
        assert_eq!(g.bounding_box(sink), Rect::new(-1, -1, 18, 18));
        assert_eq!(g.producer(sink, "input").map(|e| e.node), Some(sg));
        assert_eq!(g.producer(sg, "input").map(|e| e.node), Some(src));
        let consumers = g.consumers(src, "output");
        assert_eq!(consumers, vec![Endpoint::new(sg, "input")]);
        assert!(g.depends_on(sink, src));
        assert!(g.remove_node(pin).is_err());

        g.remove_node(sg).unwrap();
        assert!(!g.contains(grow));
        assert!(!g.contains(pout));
        assert!(g.producer(sink, "input").is_none());
    }

    #[test]
    fn test_child_inherits_dont_cache() {
        let mut g = Graph::new();
        let sg = g.add_subgraph("group", &[]);
        g.set_dont_cache(sg, true).unwrap();
        let child = g.add_child(sg, Nop).unwrap();
        assert!(g.node(child).unwrap().dont_cache());
        assert!(!g.wants_cache(child));
        let leaf = solid(&mut g, 2, 2);
        assert!(g.add_child(leaf, Nop).is_err());
    }

    #[test]
    fn test_cache_policy() {
        let mut g = Graph::with_config(EngineConfig::builder().cache_policy(CachePolicy::Auto).build());
        let a = solid(&mut g, 2, 2);
        let n = g.add_node(Nop);
        assert!(g.wants_cache(a));
        assert!(!g.wants_cache(n));
        g.set_config(EngineConfig::builder().cache_policy(CachePolicy::Never).build());
        assert!(!g.wants_cache(a));
    }

    #[test]
    fn test_detect_through_filter() {
        let mut g = Graph::new();
        let a = solid(&mut g, 8, 8);
        let n = g.add_node(Nop);
        g.link(a, n).unwrap();
        assert_eq!(g.detect(n, 3, 3), Some(a));
        assert_eq!(g.detect(n, 30, 3), None);
        let lonely = g.add_node(Nop);
        assert_eq!(g.detect(lonely, 0, 0), Some(lonely));
    }

    #[test]
    fn test_passthrough_forwards_bbox() {
        let mut g = Graph::new();
        let a = solid(&mut g, 8, 8);
        let grow = g.add_node(Grow(4));
        g.link(a, grow).unwrap();
        assert_eq!(g.bounding_box(grow), Rect::new(-4, -4, 16, 16));
        g.set_passthrough(grow, true).unwrap();
        assert_eq!(g.bounding_box(grow), Rect::new(0, 0, 8, 8));
    }

    #[test]
    fn test_debug_name() {
        let mut g = Graph::new();
        let a = g.add_named("background", Nop);
        assert_eq!(g.debug_name(a), format!("background {a}"));
        g.set_name(a, "bg").unwrap();
        assert_eq!(g.name(a), Some("bg"));
    }

    /// Source whose first bounding-box call parks until released.
    #[derive(Debug)]
    struct Gated {
        calls: AtomicUsize,
        entered: std::sync::mpsc::Sender<()>,
        release: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl Operation for Gated {
        fn name(&self) -> &str {
            "test:gated"
        }
        fn kind(&self) -> OperationKind {
            OperationKind::Source
        }
        fn bounding_box(&self, _node: &NodeView<'_>) -> Rect {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.entered.send(()).unwrap();
                self.release.lock().unwrap().recv().unwrap();
                return Rect::new(0, 0, 1, 1);
            }
            Rect::new(0, 0, 50, 50)
        }
        fn process(
            &self,
            _ctx: &mut ProcessContext<'_>,
            _pad: &str,
            _result: &Rect,
            _level: u32,
        ) -> Result<(), OperationError> {
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_bounding_box_invalidated_mid_compute() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let mut g = Graph::new();
        let n = g.add_node(Gated {
            calls: AtomicUsize::new(0),
            entered: entered_tx,
            release: std::sync::Mutex::new(release_rx),
        });

        let g = &g;
        std::thread::scope(|s| {
            let worker = s.spawn(move || g.bounding_box(n));
            entered_rx.recv().unwrap();
            g.invalidate(n, Some(&Rect::new(0, 0, 1, 1)), false);
            release_tx.send(()).unwrap();
            assert_eq!(worker.join().unwrap(), Rect::new(0, 0, 1, 1));
        });

        // The stale result was not stored.
        assert_eq!(g.bounding_box(n), Rect::new(0, 0, 50, 50));
    }
}
