//! Per-request evaluation state.
//!
//! A traversal keeps one [`OperationContext`] per node: the rectangles
//! negotiated for the current request and a table of pad buffers. Buffers
//! are owned by the table and released when the context is purged, which
//! happens as soon as every consumer has taken its copy of the output.
//!
//! [`ProcessContext`] is the view of a context an operation sees while it
//! runs.

use std::collections::HashMap;

use tessera_core::{AbyssPolicy, Buffer, Format, Rect};

use crate::error::OperationError;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::operation::NodeView;

/// Rectangles and pad data of one node for one request.
#[derive(Debug, Default)]
pub struct OperationContext {
    need_rect: Rect,
    result_rect: Rect,
    cached: bool,
    forwards: bool,
    refs: usize,
    level: u32,
    pads: HashMap<String, Buffer>,
}

impl OperationContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Region requested of the node, grown to its cached region.
    #[inline]
    pub fn need_rect(&self) -> Rect {
        self.need_rect
    }

    /// Sets the need rectangle.
    pub fn set_need_rect(&mut self, rect: Rect) {
        self.need_rect = rect;
    }

    /// Region requested before expansion.
    #[inline]
    pub fn result_rect(&self) -> Rect {
        self.result_rect
    }

    /// Sets the result rectangle.
    pub fn set_result_rect(&mut self, rect: Rect) {
        self.result_rect = rect;
    }

    /// `true` when the node's cache already covers the need.
    #[inline]
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub(crate) fn set_cached(&mut self, cached: bool) {
        self.cached = cached;
    }

    /// `true` when the node only hands its cached input through and is
    /// skipped by `process`.
    #[inline]
    pub fn forwards(&self) -> bool {
        self.forwards
    }

    pub(crate) fn set_forwards(&mut self, forwards: bool) {
        self.forwards = forwards;
    }

    /// Consumers that have not yet received this node's output.
    #[inline]
    pub fn refs(&self) -> usize {
        self.refs
    }

    pub(crate) fn set_refs(&mut self, refs: usize) {
        self.refs = refs;
    }

    /// Drops one consumer reference, returning the remaining count.
    pub(crate) fn release(&mut self) -> usize {
        self.refs = self.refs.saturating_sub(1);
        self.refs
    }

    /// Mip level of the request.
    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Sets the mip level.
    pub fn set_level(&mut self, level: u32) {
        self.level = level;
    }

    /// Buffer stored on `pad`.
    pub fn get(&self, pad: &str) -> Option<&Buffer> {
        self.pads.get(pad)
    }

    /// Stores `buffer` on `pad`, replacing any previous one.
    pub fn set(&mut self, pad: &str, buffer: Buffer) {
        self.pads.insert(pad.to_string(), buffer);
    }

    /// Removes and returns the buffer on `pad`.
    pub fn take(&mut self, pad: &str) -> Option<Buffer> {
        self.pads.remove(pad)
    }

    /// Releases every stored buffer.
    pub fn purge(&mut self) {
        self.pads.clear();
    }

    /// Resets rectangles and flags for a new request.
    pub(crate) fn reset_request(&mut self) {
        self.need_rect = Rect::EMPTY;
        self.result_rect = Rect::EMPTY;
        self.cached = false;
        self.forwards = false;
    }
}

/// What an operation sees of its node and context during `process`.
pub struct ProcessContext<'a> {
    graph: &'a Graph,
    node: NodeId,
    ctx: &'a mut OperationContext,
    empty: &'a Buffer,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(
        graph: &'a Graph,
        node: NodeId,
        ctx: &'a mut OperationContext,
        empty: &'a Buffer,
    ) -> Self {
        Self {
            graph,
            node,
            ctx,
            empty,
        }
    }

    /// The node being processed.
    pub fn node(&self) -> NodeView<'a> {
        NodeView::new(self.graph, self.node)
    }

    /// Mip level of the request.
    #[inline]
    pub fn level(&self) -> u32 {
        self.ctx.level
    }

    /// Need rectangle of the node.
    #[inline]
    pub fn need_rect(&self) -> Rect {
        self.ctx.need_rect
    }

    /// Result rectangle of the node.
    #[inline]
    pub fn result_rect(&self) -> Rect {
        self.ctx.result_rect
    }

    /// `rect` mapped onto the pixel grid of the request's level.
    pub fn level_rect(&self, rect: &Rect) -> Rect {
        rect.to_level(self.ctx.level)
    }

    /// Returns `true` if a buffer was delivered to `pad`.
    pub fn has_input(&self, pad: &str) -> bool {
        self.ctx.get(pad).is_some()
    }

    /// Buffer delivered to `pad`, or the shared empty buffer.
    pub fn input(&self, pad: &str) -> Buffer {
        self.ctx.get(pad).unwrap_or(self.empty).clone()
    }

    /// Takes the buffer on `pad` for in-place processing of `roi`.
    ///
    /// Succeeds only for a buffer no other consumer sees (not forked, which
    /// also excludes caches), already in the node's output format and
    /// covering `roi`.
    pub fn take_input_in_place(&mut self, pad: &str, roi: &Rect) -> Option<Buffer> {
        let format = self.output_format("output");
        let buf = self.ctx.get(pad)?;
        if buf.is_forked() || buf.format() != format || !buf.extent().contains_rect(roi) {
            return None;
        }
        self.ctx.take(pad)
    }

    /// Buffer the output for `roi` should be written into: the node cache
    /// when caching is on and it covers `roi`, otherwise a fresh buffer.
    pub fn output_target(&self, roi: &Rect) -> Buffer {
        if roi.is_empty() {
            return Buffer::empty();
        }
        if self.graph.wants_cache(self.node) {
            if let Some(cache) = self.graph.ensure_cache(self.node) {
                if cache.extent().contains_rect(roi) {
                    return cache.buffer().clone();
                }
            }
        }
        Buffer::with_tile_size(
            *roi,
            self.output_format("output"),
            self.graph.config().tile_size,
        )
    }

    /// Format negotiated for `pad`.
    pub fn output_format(&self, pad: &str) -> Format {
        self.graph.format(self.node, pad).unwrap_or_default()
    }

    /// Stores the output of `pad`.
    pub fn set_output(&mut self, pad: &str, buffer: Buffer) {
        self.ctx.set(pad, buffer);
    }

    /// Reads `roi` (level-0 coordinates) of the input on `pad` at the
    /// request's level, packed as [`level_rect`](Self::level_rect)`(roi)`.
    pub fn read_input(&self, pad: &str, roi: &Rect, format: Format) -> Result<Vec<f32>, OperationError> {
        self.read_input_with(pad, roi, format, AbyssPolicy::None)
    }

    /// [`read_input`](Self::read_input) with an explicit abyss policy.
    pub fn read_input_with(
        &self,
        pad: &str,
        roi: &Rect,
        format: Format,
        abyss: AbyssPolicy,
    ) -> Result<Vec<f32>, OperationError> {
        let level = self.ctx.level;
        let r = roi.to_level(level);
        let comps = format.components();
        let mut out = vec![0.0f32; r.area() as usize * comps];
        let input = self.ctx.get(pad).unwrap_or(self.empty);
        input.get_at_level(&r, level, format, &mut out, r.width.max(0) as usize * comps, abyss)?;
        Ok(out)
    }

    /// Writes packed `data` of `format` covering [`level_rect`](Self::level_rect)`(roi)`
    /// into `buffer` at the request's level.
    pub fn write_output(
        &self,
        buffer: &Buffer,
        roi: &Rect,
        format: Format,
        data: &[f32],
    ) -> Result<(), OperationError> {
        let level = self.ctx.level;
        let r = roi.to_level(level);
        buffer.set_at_level(&r, level, format, data, r.width.max(0) as usize * format.components())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_pad_table() {
        let mut ctx = OperationContext::new();
        assert!(ctx.get("input").is_none());
        let b = Buffer::allocate(Rect::new(0, 0, 4, 4), Format::RGBA_F32);
        ctx.set("input", b.clone());
        assert!(Buffer::ptr_eq(ctx.get("input").unwrap(), &b));
        assert!(ctx.take("input").is_some());
        assert!(ctx.get("input").is_none());
        ctx.set("aux", b);
        ctx.purge();
        assert!(ctx.get("aux").is_none());
    }

    #[test]
    fn test_context_refs_and_reset() {
        let mut ctx = OperationContext::new();
        ctx.set_refs(2);
        assert_eq!(ctx.release(), 1);
        assert_eq!(ctx.release(), 0);
        assert_eq!(ctx.release(), 0);
        ctx.set_need_rect(Rect::new(0, 0, 3, 3));
        ctx.set_cached(true);
        ctx.reset_request();
        assert!(ctx.need_rect().is_empty());
        assert!(!ctx.is_cached());
    }
}
