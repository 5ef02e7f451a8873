//! Request evaluation over a dependency path.
//!
//! A [`GraphTraversal`] turns a terminal node into two orders over the same
//! nodes and drives one request through them:
//!
//! ```text
//! build            dfs (sources first) + bfs (terminal first)
//!   -> prepare     formats and bounding boxes, dfs order
//!   -> prepare_request(roi, level)
//!                  need rectangles, bfs order, stopping at valid caches
//!   -> process(level)
//!                  operations run in dfs order, outputs handed downstream
//! ```
//!
//! Contexts are owned by the traversal; buffers live in their pad tables
//! until every consumer received them.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use tessera_core::{Buffer, Overlap, Rect};
use tracing::{debug, error, trace};

use crate::context::OperationContext;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::operation::{NodeView, Nop};
use crate::visitor::{bfs_traverse, dfs_traverse, PathCollector};

/// Per-node timing of one `process` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Operation invocations.
    pub calls: u64,
    /// Wall time spent inside the operation.
    pub time: Duration,
}

/// Instrumentation collected by [`GraphTraversal::process`].
#[derive(Debug, Clone, Default)]
pub struct EvalStats {
    /// Per-node counters.
    pub nodes: HashMap<NodeId, NodeStats>,
    /// Nodes served from their cache.
    pub cache_hits: u64,
    /// Wall time of the whole pass.
    pub total: Duration,
}

impl EvalStats {
    /// Total operation invocations.
    pub fn calls(&self) -> u64 {
        self.nodes.values().map(|s| s.calls).sum()
    }

    fn reset(&mut self) {
        self.nodes.clear();
        self.cache_hits = 0;
        self.total = Duration::ZERO;
    }
}

/// Ordered paths and per-node contexts for evaluating one terminal node.
#[derive(Debug)]
pub struct GraphTraversal {
    terminal: NodeId,
    dfs: Vec<NodeId>,
    bfs: Vec<NodeId>,
    contexts: HashMap<NodeId, OperationContext>,
    rects_dirty: bool,
    shared_empty: Buffer,
    stats: EvalStats,
}

impl GraphTraversal {
    /// Computes both paths ending at `node`. Subgraphs resolve to their
    /// output proxy.
    pub fn build(graph: &Graph, node: NodeId) -> Self {
        let shared_empty = Buffer::empty();
        shared_empty.mark_forked();
        let mut traversal = Self {
            terminal: node,
            dfs: Vec::new(),
            bfs: Vec::new(),
            contexts: HashMap::new(),
            rects_dirty: false,
            shared_empty,
            stats: EvalStats::default(),
        };
        traversal.rebuild(graph, node);
        traversal
    }

    /// Recomputes the paths for `node`, reusing allocations.
    pub fn rebuild(&mut self, graph: &Graph, node: NodeId) {
        self.terminal = graph.resolve_output(node);
        let mut collector = PathCollector {
            path: std::mem::take(&mut self.dfs),
        };
        collector.path.clear();
        dfs_traverse(graph, self.terminal, &mut collector);
        self.dfs = collector.path;

        let mut collector = PathCollector {
            path: std::mem::take(&mut self.bfs),
        };
        collector.path.clear();
        bfs_traverse(graph, self.terminal, &mut collector);
        self.bfs = collector.path;

        self.contexts.retain(|id, _| self.dfs.contains(id));
        self.rects_dirty = false;
        trace!(terminal = %self.terminal, nodes = self.dfs.len(), "traversal built");
    }

    /// Terminal node (after proxy resolution).
    pub fn terminal(&self) -> NodeId {
        self.terminal
    }

    /// Dependency-first order.
    pub fn dfs_path(&self) -> &[NodeId] {
        &self.dfs
    }

    /// Terminal-first order.
    pub fn bfs_path(&self) -> &[NodeId] {
        &self.bfs
    }

    /// Context of a node on the path.
    pub fn context(&self, id: NodeId) -> Option<&OperationContext> {
        self.contexts.get(&id)
    }

    /// Instrumentation of the last `process`.
    pub fn stats(&self) -> &EvalStats {
        &self.stats
    }

    /// Empty buffer delivered to unconnected inputs and failed nodes.
    pub fn shared_empty(&self) -> &Buffer {
        &self.shared_empty
    }

    /// Negotiates formats and refreshes bounding boxes, sources first.
    pub fn prepare(&mut self, graph: &Graph) {
        for &id in &self.dfs {
            graph.prepare_node(id);
            self.contexts.entry(id).or_default().reset_request();
        }
        self.rects_dirty = false;
    }

    /// Bounding box of the terminal node.
    pub fn bounding_box(&self, graph: &Graph) -> Rect {
        graph.have_rect(self.terminal)
    }

    /// Propagates need rectangles for `roi` from the terminal upstream.
    ///
    /// A node whose cache already covers its need is marked cached and
    /// contributes nothing to its inputs.
    pub fn prepare_request(&mut self, graph: &Graph, roi: &Rect, level: u32) {
        if self.rects_dirty {
            for ctx in self.contexts.values_mut() {
                ctx.reset_request();
            }
        }
        self.rects_dirty = true;

        let Some(&first) = self.bfs.first() else {
            return;
        };
        let initial = graph.have_rect(first).clip(roi);
        match self.contexts.get_mut(&first) {
            Some(ctx) => {
                ctx.set_need_rect(initial);
                ctx.set_result_rect(initial);
            }
            None => {
                error!(node = %first, "request on an unprepared traversal");
                return;
            }
        }

        for &id in &self.bfs {
            let Some(ctx) = self.contexts.get_mut(&id) else {
                error!(node = %id, "missing context");
                continue;
            };
            ctx.set_level(level);
            let request = ctx.need_rect();
            if request.is_empty() {
                ctx.set_result_rect(Rect::EMPTY);
                continue;
            }

            if let Some(cache) = graph.cache(id) {
                if cache.rect_in(&request, level) == Overlap::In {
                    debug!(node = %graph.debug_name(id), %request, level, "cache hit");
                    ctx.set_cached(true);
                    ctx.set_result_rect(Rect::EMPTY);
                    continue;
                }
            }

            let Some(node) = graph.node(id) else {
                continue;
            };
            let view = NodeView::new(graph, id);
            let full = match node.operation() {
                Some(op) if !node.is_passthrough() => op.cached_region(&view, &request),
                _ => request,
            };
            ctx.set_need_rect(full);
            ctx.set_result_rect(request);

            for pad in node.pad_names(crate::pad::PadDirection::Input) {
                let Some(source) = graph.source_of(id, pad) else {
                    continue;
                };
                let rect = match node.operation() {
                    Some(op) if !node.is_passthrough() => op.required_for_output(&view, pad, &full),
                    _ => full,
                };
                let have = graph.have_rect(source.node);
                let Some(src_ctx) = self.contexts.get_mut(&source.node) else {
                    error!(node = %source.node, "source outside of traversal");
                    continue;
                };
                let merged = rect.bounding_box(&src_ctx.need_rect()).clip(&have);
                src_ctx.set_need_rect(merged);
            }
        }

        self.mark_forwarders(graph);
    }

    /// Marks pass-through nodes fed by a cached or forwarding source, so
    /// a repeated request runs no operation at all. Nodes without a cache
    /// of their own (nops, proxies, passthrough) would otherwise be
    /// processed again on every request.
    fn mark_forwarders(&mut self, graph: &Graph) {
        for &id in &self.dfs {
            let Some(node) = graph.node(id) else {
                continue;
            };
            let forwarder = node.is_passthrough()
                || node.operation().is_some_and(|op| op.as_any().is::<Nop>());
            if !forwarder {
                continue;
            }
            let Some(source) = graph.source_of(id, "input") else {
                continue;
            };
            let fed = self
                .contexts
                .get(&source.node)
                .is_some_and(|c| c.is_cached() || c.forwards());
            if let Some(ctx) = self.contexts.get_mut(&id) {
                if fed && !ctx.is_cached() && !ctx.need_rect().is_empty() {
                    trace!(node = %graph.debug_name(id), "forwarding cached input");
                    ctx.set_forwards(true);
                }
            }
        }
    }

    /// Runs the operations of the path and returns the terminal's output.
    ///
    /// Returns `None` when the terminal produces no buffer (a sink).
    pub fn process(&mut self, graph: &Graph, level: u32) -> Option<Buffer> {
        let started = Instant::now();
        self.stats.reset();

        for &id in &self.dfs {
            let consumers: HashSet<NodeId> = graph
                .targets(id)
                .into_iter()
                .map(|t| t.node)
                .filter(|n| self.contexts.contains_key(n))
                .collect();
            if let Some(ctx) = self.contexts.get_mut(&id) {
                ctx.set_refs(consumers.len());
            }
        }

        let mut result: Option<Buffer> = None;
        let dfs = std::mem::take(&mut self.dfs);
        for &id in &dfs {
            let Some(ctx) = self.contexts.get_mut(&id) else {
                error!(node = %id, "missing context");
                continue;
            };
            let need = ctx.need_rect();
            let output = if need.is_empty() {
                None
            } else if ctx.is_cached() {
                self.stats.cache_hits += 1;
                graph.cache(id).map(|c| c.buffer().clone())
            } else if ctx.forwards() {
                self.stats.cache_hits += 1;
                Some(ctx.get("input").cloned().unwrap_or_else(|| self.shared_empty.clone()))
            } else {
                if graph.has_pad(id, "input") && ctx.get("input").is_none() {
                    ctx.set("input", self.shared_empty.clone());
                }
                ctx.set_level(level);
                let t = Instant::now();
                let out = graph.process_operation(id, ctx, "output", &need, level, &self.shared_empty);
                let entry = self.stats.nodes.entry(id).or_default();
                entry.calls += 1;
                entry.time += t.elapsed();
                if let (Some(buf), Some(cache)) = (&out, graph.cache(id)) {
                    if Buffer::ptr_eq(buf, cache.buffer()) {
                        cache.computed(&need, level);
                    }
                }
                out
            };
            ctx.purge();

            if let Some(buf) = &output {
                let targets: Vec<_> = graph
                    .targets(id)
                    .into_iter()
                    .filter(|t| self.contexts.contains_key(&t.node))
                    .collect();
                if targets.len() > 1 {
                    buf.mark_forked();
                }
                for t in targets {
                    if let Some(sink_ctx) = self.contexts.get_mut(&t.node) {
                        sink_ctx.set(&t.pad, buf.clone());
                    }
                }
            }

            for dep in graph.dependencies(id) {
                if let Some(src_ctx) = self.contexts.get_mut(&dep) {
                    if src_ctx.release() == 0 {
                        src_ctx.purge();
                    }
                }
            }
            result = output;
        }
        self.dfs = dfs;

        if result.is_none() && graph.has_pad(self.terminal, "output") {
            result = Some(self.shared_empty.clone());
        }
        self.stats.total = started.elapsed();
        debug!(
            terminal = %graph.debug_name(self.terminal),
            calls = self.stats.calls(),
            cache_hits = self.stats.cache_hits,
            elapsed_us = self.stats.total.as_micros() as u64,
            "processed"
        );
        result
    }

    /// Text listing of the path with bounding boxes and formats.
    pub fn dump(&self, graph: &Graph) -> String {
        let mut out = String::new();
        for (i, &id) in self.dfs.iter().enumerate() {
            let kind = graph
                .operation_kind(id)
                .map(|k| k.as_str())
                .unwrap_or("subgraph");
            let format = graph
                .format(id, "output")
                .map(|f| f.name())
                .unwrap_or("-");
            let _ = write!(
                out,
                "{i:>3}  {:<28} {kind:<12} have={} format={format}",
                graph.debug_name(id),
                graph.have_rect(id),
            );
            if let Some(ctx) = self.contexts.get(&id) {
                let _ = write!(out, " need={} result={}", ctx.need_rect(), ctx.result_rect());
                if ctx.is_cached() {
                    out.push_str(" cached");
                }
            }
            out.push('\n');
        }
        out
    }
}

impl Graph {
    /// Text listing of the evaluation path ending at `id`, after a prepare
    /// pass.
    pub fn dump(&self, id: NodeId) -> String {
        let mut traversal = GraphTraversal::build(self, id);
        traversal.prepare(self);
        traversal.dump(self)
    }
}
