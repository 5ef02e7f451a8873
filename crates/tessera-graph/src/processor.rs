//! Incremental, resumable rendering.
//!
//! A [`Processor`] renders a rectangle of a node in chunks no larger than the
//! configured chunk area. Each [`Processor::work`] call does a bounded amount
//! of work and reports progress, so a caller can interleave rendering with
//! other duties and stop at any chunk boundary.
//!
//! # Targets
//!
//! - A node with an output is rendered into its cache; progress follows the
//!   cache's valid region.
//! - A streaming sink is evaluated chunk by chunk; the processor keeps its
//!   own valid region.
//! - A sink that needs its full input gets the producer rendered into the
//!   producer's cache, then one final `process` over the whole rectangle.
//!
//! # Example
//!
//! ```ignore
//! let mut processor = Processor::new(&graph, sink, None)?;
//! let mut progress = 0.0;
//! while processor.work(&graph, Some(&mut progress))? {
//!     println!("{:.0}%", progress * 100.0);
//! }
//! ```

use tessera_core::{Axis, Format, Rect, Region};
use tracing::{debug, trace};

use crate::blit::BlitFlags;
use crate::context::OperationContext;
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::node::NodeId;
use crate::operation::OperationKind;

/// How rendered chunks are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorMode {
    /// Chunks land in the cache of the node itself.
    Buffered,
    /// Sink evaluated per chunk; validity tracked privately.
    Streaming,
    /// Producer cached per chunk, sink flushed once at the end.
    NeedsFull,
}

/// Chunked renderer of one node.
#[derive(Debug)]
pub struct Processor {
    node: NodeId,
    input: NodeId,
    mode: ProcessorMode,
    rectangle: Rect,
    chunk_size: u64,
    queued: Region,
    dirty: Vec<Rect>,
    valid: Option<Region>,
    final_context: Option<OperationContext>,
}

/// Split offset for an oversized chunk edge of `size` pixels.
fn band_size(size: i32) -> i32 {
    let half = size / 2;
    let band = if half <= 256 {
        half.min(128)
    } else if half <= 512 {
        half.min(256)
    } else {
        half
    };
    band.max(1)
}

impl Processor {
    /// Creates a processor for `node` over `rect`, or its whole bounding
    /// box when `rect` is `None`.
    ///
    /// Fails with [`tessera_core::Error::InfiniteRect`] when the clamped
    /// rectangle is unbounded.
    pub fn new(graph: &Graph, node: NodeId, rect: Option<Rect>) -> GraphResult<Self> {
        if !graph.contains(node) {
            return Err(GraphError::NoSuchNode(node));
        }
        let is_sink = graph.operation_kind(node) == Some(OperationKind::Sink);
        let (input, mode) = if is_sink {
            let input = graph
                .producer(node, "input")
                .ok_or(GraphError::MissingInput(node))?
                .node;
            let needs_full = graph
                .node(node)
                .and_then(|n| n.operation())
                .is_some_and(|op| op.needs_full());
            let mode = if needs_full {
                ProcessorMode::NeedsFull
            } else {
                ProcessorMode::Streaming
            };
            (input, mode)
        } else {
            (node, ProcessorMode::Buffered)
        };

        let mut processor = Self {
            node,
            input,
            mode,
            rectangle: Rect::EMPTY,
            chunk_size: graph.config().chunk_size,
            queued: Region::new(),
            dirty: Vec::new(),
            valid: (mode == ProcessorMode::Streaming).then(Region::new),
            final_context: None,
        };
        graph.prepare(node);
        processor.set_rectangle(graph, rect)?;
        debug!(node = %graph.debug_name(node), ?mode, rect = %processor.rectangle, "processor created");
        Ok(processor)
    }

    /// Overrides the chunk area taken from the engine configuration.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Node being rendered.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Rendering mode chosen for the node.
    pub fn mode(&self) -> ProcessorMode {
        self.mode
    }

    /// Target rectangle, clamped to the input's bounding box.
    pub fn rectangle(&self) -> Rect {
        self.rectangle
    }

    /// Changes the target rectangle. `None` selects the input's bounding
    /// box. Pending chunks are dropped when the rectangle changes.
    ///
    /// An unbounded result is refused and leaves the processor unchanged.
    pub fn set_rectangle(&mut self, graph: &Graph, rect: Option<Rect>) -> GraphResult<()> {
        let bounds = graph.prepare(self.input);
        let rect = rect.unwrap_or(bounds).clip(&bounds);
        if rect.is_infinite() {
            return Err(tessera_core::Error::InfiniteRect.into());
        }
        if rect != self.rectangle {
            self.rectangle = rect;
            self.dirty.clear();
            self.queued.clear();
        }
        self.queued.union_with_rect(&rect);

        if self.mode == ProcessorMode::NeedsFull {
            let mut ctx = OperationContext::new();
            ctx.set_need_rect(rect);
            ctx.set_result_rect(rect);
            self.final_context = Some(ctx);
        }
        Ok(())
    }

    fn valid_region(&self, graph: &Graph) -> Region {
        match &self.valid {
            Some(region) => region.clone(),
            None => graph
                .ensure_cache(self.input)
                .map(|c| c.valid_region(0))
                .unwrap_or_default(),
        }
    }

    /// Renders or splits the top pending chunk. Returns `true` while
    /// chunks remain.
    fn render_rectangle(&mut self, graph: &Graph) -> GraphResult<bool> {
        let Some(mut dr) = self.dirty.pop() else {
            return Ok(false);
        };
        if dr.area() > self.chunk_size && dr.area() > 1 {
            let axis = if dr.width > dr.height { Axis::X } else { Axis::Y };
            let size = match axis {
                Axis::X => dr.width,
                Axis::Y => dr.height,
            };
            let (head, fragment) = dr.split_at(axis, band_size(size));
            trace!(%dr, %head, %fragment, "chunk split");
            self.dirty.push(head);
            self.dirty.push(fragment);
            return Ok(true);
        }
        dr = dr.clip(&self.rectangle);
        if !dr.is_empty() {
            match self.mode {
                ProcessorMode::Buffered | ProcessorMode::NeedsFull => {
                    if let Some(cache) = graph.ensure_cache(self.input) {
                        if cache.rect_in(&dr, 0) != tessera_core::Overlap::In {
                            graph.blit_buffer(self.input, Some(cache.buffer()), Some(&dr), 0)?;
                            if let Some(cache) = graph.cache(self.input) {
                                cache.computed(&dr, 0);
                            }
                        }
                    }
                }
                ProcessorMode::Streaming => {
                    graph.blit(self.node, 1.0, &dr, Format::default(), None, 0, BlitFlags::empty())?;
                    if let Some(valid) = &mut self.valid {
                        valid.union_with_rect(&dr);
                    }
                }
            }
        }
        Ok(!self.dirty.is_empty())
    }

    /// One step of chunk rendering, without the final sink flush.
    fn render(&mut self, graph: &Graph, progress: Option<&mut f64>) -> GraphResult<bool> {
        if self.render_rectangle(graph)? {
            if let Some(p) = progress {
                *p = self.progress(graph);
            }
            return Ok(true);
        }

        let mut region = self.queued.clone();
        region.subtract(&self.valid_region(graph));
        let Some(first) = region.iter_rects().next() else {
            self.queued.clear();
            return Ok(false);
        };
        self.queued.subtract(&Region::from_rect(&first));
        self.dirty.push(first);

        if let Some(p) = progress {
            let wanted = self.rectangle.area();
            *p = if wanted == 0 {
                0.0
            } else {
                1.0 - region.area() as f64 / wanted as f64
            };
        }
        Ok(true)
    }

    /// Performs a bounded amount of work. Returns `true` while more work
    /// remains; `progress` receives the fraction rendered so far.
    pub fn work(&mut self, graph: &Graph, mut progress: Option<&mut f64>) -> GraphResult<bool> {
        if self.render(graph, progress.as_deref_mut())? {
            return Ok(true);
        }
        if let Some(p) = progress {
            *p = 1.0;
        }
        if let Some(mut ctx) = self.final_context.take() {
            let cache = graph.ensure_cache(self.input);
            if let Some(cache) = &cache {
                ctx.set("input", cache.buffer().clone());
            }
            let empty = tessera_core::Buffer::empty();
            let rect = self.rectangle;
            debug!(node = %graph.debug_name(self.node), %rect, "flushing sink");
            graph.process_operation(self.node, &mut ctx, "output", &rect, 0, &empty);
            return Ok(true);
        }
        Ok(false)
    }

    /// Fraction of the rectangle rendered, in `0.0..=1.0`. Stays below 1.0
    /// until every queued and pending chunk is done.
    pub fn progress(&self, graph: &Graph) -> f64 {
        let wanted = self.rectangle.area();
        if wanted == 0 {
            return if self.is_rendered() { 1.0 } else { 0.999 };
        }
        let mut missing = Region::from_rect(&self.rectangle);
        missing.subtract(&self.valid_region(graph));
        let ratio = (wanted - missing.area().min(wanted)) as f64 / wanted as f64;
        if ratio >= 1.0 && !self.is_rendered() {
            return 0.9999;
        }
        ratio
    }

    /// Returns `true` once no queued or pending chunk is left.
    pub fn is_rendered(&self) -> bool {
        self.dirty.is_empty() && self.queued.is_empty()
    }
}

impl Graph {
    /// Renders `id` over its whole bounding box, chunk by chunk, until
    /// done. Meant for sink-terminated graphs.
    pub fn process(&self, id: NodeId) -> GraphResult<()> {
        trace!(node = %self.debug_name(id), "process");
        let mut processor = Processor::new(self, id, None)?;
        while processor.work(self, None)? {}
        Ok(())
    }
}
