//! Pixel delivery to callers.
//!
//! [`Graph::apply`] returns the owned result of a request, [`Graph::blit`]
//! copies a (possibly scaled) rectangle into a caller slice and
//! [`Graph::blit_buffer`] renders into a [`Buffer`].
//!
//! # Modes
//!
//! | Flags | Behavior |
//! |-------|----------|
//! | empty | evaluate now, split into worker bands when large enough |
//! | `CACHE` | evaluate into the node cache, read from it |
//! | `CACHE \| DIRTY` | read whatever the cache holds, no evaluation |
//!
//! Scaled coordinates: `roi` passed to `blit` is on the destination grid,
//! i.e. level-0 coordinates multiplied by `scale`.

use tessera_core::rect::level_from_scale;
use tessera_core::{sync, AbyssPolicy, Buffer, Format, Rect};
use tracing::{trace, warn};

use crate::error::{GraphError, GraphResult};
use crate::eval::EvalManager;
use crate::graph::Graph;
use crate::node::NodeId;

bitflags::bitflags! {
    /// Selects how [`Graph::blit`] obtains pixels.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BlitFlags: u8 {
        /// Go through the node cache.
        const CACHE = 0b0000_0001;
        /// With `CACHE`: skip evaluation and return cached pixels as they are.
        const DIRTY = 0b0000_0010;
    }
}

/// Level-0 rectangle covering the destination-grid rectangle `roi`.
pub(crate) fn unscaled_rect(roi: &Rect, scale: f64) -> Rect {
    if roi.is_infinite() || (scale - 1.0).abs() < f64::EPSILON {
        return *roi;
    }
    let x1 = (f64::from(roi.x) / scale).floor() as i32;
    let y1 = (f64::from(roi.y) / scale).floor() as i32;
    let x2 = (f64::from(roi.right()) / scale).ceil() as i32;
    let y2 = (f64::from(roi.bottom()) / scale).ceil() as i32;
    Rect::from_corners(x1, y1, x2, y2)
}

impl Graph {
    /// Evaluates `roi` (level-0 coordinates) of `id` at mip `level`.
    ///
    /// Returns `None` for nodes without an output pad. Operation failures
    /// never surface here; the failing node contributes an empty buffer.
    pub fn apply(&self, id: NodeId, roi: &Rect, level: u32) -> Option<Buffer> {
        let Some(node) = self.node(id) else {
            warn!(%id, "apply on missing node");
            return None;
        };
        trace!(node = %self.debug_name(id), %roi, level, "apply");
        let mut slot = sync::lock(&node.eval);
        let manager = slot.get_or_insert_with(|| EvalManager::new(self, id));
        manager.apply(self, roi, level)
    }

    /// Negotiates formats and bounding boxes of everything `id` depends on
    /// and returns the bounding box of `id`.
    pub fn prepare(&self, id: NodeId) -> Rect {
        let Some(node) = self.node(id) else {
            warn!(%id, "prepare of missing node");
            return Rect::EMPTY;
        };
        let mut slot = sync::lock(&node.eval);
        let manager = slot.get_or_insert_with(|| EvalManager::new(self, id));
        manager.bounding_box(self)
    }

    /// Copies `roi` of `id`, scaled by `scale`, into `dst` as `format`.
    ///
    /// `dst` holds `roi.height` rows of `rowstride` samples. With `dst` set
    /// to `None` the node is only evaluated (or, with `CACHE`, brought into
    /// its cache).
    #[allow(clippy::too_many_arguments)]
    pub fn blit(
        &self,
        id: NodeId,
        scale: f64,
        roi: &Rect,
        format: Format,
        dst: Option<&mut [f32]>,
        rowstride: usize,
        flags: BlitFlags,
    ) -> GraphResult<()> {
        if self.node(id).is_none() {
            return Err(GraphError::NoSuchNode(id));
        }
        if !(scale.is_finite() && scale > 0.0) {
            return Err(GraphError::config(format!("invalid blit scale {scale}")));
        }
        if roi.is_empty() {
            return Ok(());
        }
        let level = if self.config().mipmap_rendering {
            level_from_scale(scale)
        } else {
            0
        };
        let unscaled = unscaled_rect(roi, scale);

        if flags.contains(BlitFlags::CACHE) {
            return self.blit_cached(id, scale, roi, &unscaled, level, format, dst, rowstride, flags);
        }

        let Some(dst) = dst else {
            self.apply(id, &unscaled, level);
            return Ok(());
        };
        let threads = self.config().threads;
        if threads > 1 && roi.area() >= threads as u64 * self.config().min_band_area {
            return self.blit_bands(id, scale, roi, level, format, dst, rowstride, threads);
        }
        match self.apply(id, &unscaled, level) {
            Some(buf) => buf.get_scaled(roi, scale, level, format, dst, rowstride, AbyssPolicy::None)?,
            None => trace!(%id, "blit of a node without output"),
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn blit_cached(
        &self,
        id: NodeId,
        scale: f64,
        roi: &Rect,
        unscaled: &Rect,
        level: u32,
        format: Format,
        dst: Option<&mut [f32]>,
        rowstride: usize,
        flags: BlitFlags,
    ) -> GraphResult<()> {
        if !flags.contains(BlitFlags::DIRTY) {
            let result = self.apply(id, unscaled, level);
            let Some(cache) = self.ensure_cache(id) else {
                return Ok(());
            };
            if let Some(result) = result {
                if !Buffer::ptr_eq(&result, cache.buffer()) {
                    let rect = unscaled.clip(&self.have_rect(id));
                    Buffer::copy_at_level(&result, &rect.to_level(level), level, cache.buffer())?;
                }
            }
            cache.computed(unscaled, level);
        }
        let Some(cache) = self.ensure_cache(id) else {
            return Ok(());
        };
        if let Some(dst) = dst {
            cache
                .buffer()
                .get_scaled(roi, scale, level, format, dst, rowstride, AbyssPolicy::None)?;
        }
        Ok(())
    }

    /// Renders `roi` (level-0, `None` for the bounding box) of `id` into
    /// `target`, or just evaluates it when `target` is `None`.
    pub fn blit_buffer(
        &self,
        id: NodeId,
        target: Option<&Buffer>,
        roi: Option<&Rect>,
        level: u32,
    ) -> GraphResult<()> {
        if self.node(id).is_none() {
            return Err(GraphError::NoSuchNode(id));
        }
        let rect = match roi {
            Some(r) => *r,
            None => self.bounding_box(id),
        };
        let Some(result) = self.apply(id, &rect, level) else {
            return Ok(());
        };
        let Some(target) = target else {
            return Ok(());
        };
        if Buffer::ptr_eq(&result, target) || result.is_empty() {
            return Ok(());
        }
        let rect = rect.clip(&self.have_rect(id));
        Buffer::copy_at_level(&result, &rect.to_level(level), level, target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::context::ProcessContext;
    use crate::error::OperationError;
    use crate::operation::{NodeView, Operation, OperationKind};
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Writes `x + 100 * y` into every channel.
    #[derive(Debug)]
    struct Ramp {
        extent: Rect,
        calls: Arc<AtomicUsize>,
    }

    impl Operation for Ramp {
        fn name(&self) -> &str {
            "test:ramp"
        }
        fn kind(&self) -> OperationKind {
            OperationKind::Source
        }
        fn prepare(&self, ctx: &mut crate::operation::PrepareContext<'_>) {
            ctx.set_format("output", Format::Y_F32);
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            let out = ctx.output_target(result);
            let r = ctx.level_rect(result);
            let data: Vec<f32> = r.iter_coords().map(|(x, y)| (x + 100 * y) as f32).collect();
            ctx.write_output(&out, result, Format::Y_F32, &data)?;
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

    fn ramp(graph: &mut Graph, w: i32, h: i32) -> (NodeId, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let id = graph.add_node(Ramp {
            extent: Rect::new(0, 0, w, h),
            calls: Arc::clone(&calls),
        });
        (id, calls)
    }

    #[test]
    fn test_unscaled_rect() {
        assert_eq!(unscaled_rect(&Rect::new(1, 1, 3, 3), 0.5), Rect::new(2, 2, 6, 6));
        assert_eq!(unscaled_rect(&Rect::new(3, 0, 4, 2), 2.0), Rect::new(1, 0, 3, 1));
        assert_eq!(unscaled_rect(&Rect::new(3, 0, 4, 2), 1.0), Rect::new(3, 0, 4, 2));
    }

    #[test]
    fn test_blit_default() {
        let mut g = Graph::new();
        let (src, _) = ramp(&mut g, 32, 32);
        let roi = Rect::new(2, 3, 4, 2);
        let mut dst = vec![0.0f32; 8];
        g.blit(src, 1.0, &roi, Format::Y_F32, Some(&mut dst), 4, BlitFlags::empty())
            .unwrap();
        assert_eq!(dst, vec![302.0, 303.0, 304.0, 305.0, 402.0, 403.0, 404.0, 405.0]);
    }

    #[test]
    fn test_blit_dirty_does_not_evaluate() {
        let mut g = Graph::new();
        let (src, calls) = ramp(&mut g, 16, 16);
        let roi = Rect::new(0, 0, 2, 1);
        let mut dst = vec![-1.0f32; 2];
        g.blit(
            src,
            1.0,
            &roi,
            Format::Y_F32,
            Some(&mut dst),
            2,
            BlitFlags::CACHE | BlitFlags::DIRTY,
        )
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(dst, vec![0.0, 0.0]);

        g.blit(src, 1.0, &roi, Format::Y_F32, Some(&mut dst), 2, BlitFlags::CACHE)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dst, vec![0.0, 1.0]);
        assert_eq!(
            g.cache(src).unwrap().rect_in(&roi, 0),
            tessera_core::Overlap::In
        );
    }

    #[test]
    fn test_blit_scaled_with_mipmaps() {
        let config = EngineConfig::builder().mipmap_rendering(true).build();
        let mut g = Graph::with_config(config);
        let (src, _) = ramp(&mut g, 32, 32);
        let roi = Rect::new(0, 0, 4, 4);
        let mut dst = vec![0.0f32; 16];
        g.blit(src, 0.5, &roi, Format::Y_F32, Some(&mut dst), 4, BlitFlags::empty())
            .unwrap();
        assert_eq!(dst.len(), 16);
        assert!(dst.iter().all(|v| v.is_finite()));
        assert_eq!(
            g.cache(src).unwrap().rect_in(&Rect::new(0, 0, 8, 8), 1),
            tessera_core::Overlap::In
        );
    }

    #[test]
    fn test_blit_bands_match_single_thread() {
        let roi = Rect::new(0, 0, 64, 40);
        let mut single = vec![0.0f32; 64 * 40];
        let mut banded = vec![0.0f32; 64 * 40];

        let mut g = Graph::new();
        let (src, _) = ramp(&mut g, 64, 64);
        g.blit(src, 1.0, &roi, Format::Y_F32, Some(&mut single), 64, BlitFlags::empty())
            .unwrap();

        let config = EngineConfig::builder().threads(4).min_band_area(16).build();
        let mut g = Graph::with_config(config);
        let (src, calls) = ramp(&mut g, 64, 64);
        g.blit(src, 1.0, &roi, Format::Y_F32, Some(&mut banded), 64, BlitFlags::empty())
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(single, banded);
        assert_eq!(sync::lock(&g.node(src).unwrap().bands).len(), 4);
    }

    #[test]
    fn test_blit_buffer_copies_into_target() {
        let mut g = Graph::new();
        let (src, _) = ramp(&mut g, 8, 8);
        let target = Buffer::allocate(Rect::new(0, 0, 8, 8), Format::Y_F32);
        g.blit_buffer(src, Some(&target), Some(&Rect::new(0, 1, 2, 1)), 0)
            .unwrap();
        assert_eq!(target.read(&Rect::new(0, 1, 2, 1), 0).unwrap(), vec![100.0, 101.0]);
    }

    #[test]
    fn test_blit_rejects_bad_scale() {
        let mut g = Graph::new();
        let (src, _) = ramp(&mut g, 8, 8);
        let err = g
            .blit(src, 0.0, &Rect::new(0, 0, 1, 1), Format::Y_F32, None, 1, BlitFlags::empty())
            .unwrap_err();
        assert!(matches!(err, GraphError::Config(_)));
    }
}
