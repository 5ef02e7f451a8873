//! Whole-image statistics.

use std::any::Any;

use tessera_graph::prelude::*;
use tracing::debug;

use crate::pixel::map_pixels;

/// Scales color so the brightest channel of the whole input becomes 1.
///
/// Every output pixel depends on the full input, so the node requests and
/// caches its whole bounding box whatever the region of interest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Normalize;

impl Operation for Normalize {
    fn name(&self) -> &str {
        "tessera:normalize"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Filter
    }

    fn prepare(&self, ctx: &mut PrepareContext<'_>) {
        ctx.set_format("output", Format::RGBA_F32);
    }

    fn required_for_output(&self, node: &NodeView<'_>, input_pad: &str, roi: &Rect) -> Rect {
        match node.source_bbox(input_pad) {
            Some(r) if !r.is_infinite() => r,
            _ => *roi,
        }
    }

    fn invalidated_by_change(&self, _input_pad: &str, _roi: &Rect) -> Rect {
        Rect::INFINITE
    }

    fn cached_region(&self, node: &NodeView<'_>, roi: &Rect) -> Rect {
        let have = node.have_rect();
        if have.is_infinite() { *roi } else { have }
    }

    fn process(
        &self,
        ctx: &mut ProcessContext<'_>,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), OperationError> {
        let need = ctx.need_rect();
        let whole = ctx.read_input("input", &need, Format::RGBA_F32)?;
        let max = whole
            .chunks_exact(4)
            .flat_map(|px| px[..3].iter().copied())
            .fold(0.0f32, f32::max);
        let gain = if max > 0.0 { 1.0 / max } else { 1.0 };
        debug!(%need, max, "normalize");

        let mut data = ctx.read_input("input", result, Format::RGBA_F32)?;
        map_pixels(&mut data, |px| {
            px[0] *= gain;
            px[1] *= gain;
            px[2] *= gain;
        });
        let out = ctx.output_target(result);
        ctx.write_output(&out, result, Format::RGBA_F32, &data)?;
        ctx.set_output(output_pad, out);
        Ok(())
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
    use crate::area::BoxBlur;
    use crate::source::Checkerboard;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize_uses_whole_input() {
        let mut g = Graph::new();
        let src = g.add_node(Checkerboard {
            extent: Rect::new(0, 0, 8, 8),
            color1: [0.2, 0.2, 0.2, 1.0],
            color2: [0.5, 0.5, 0.5, 1.0],
            ..Checkerboard::new(4)
        });
        let norm = g.add_node(Normalize);
        g.link(src, norm).unwrap();

        // Top-left cell holds color1 only; max comes from elsewhere.
        let roi = Rect::new(0, 0, 2, 2);
        let buf = g.apply(norm, &roi, 0).unwrap();
        let px = buf.read(&Rect::new(0, 0, 1, 1), 0).unwrap();
        assert_relative_eq!(px[0], 0.4, epsilon = 1e-6);
        assert_relative_eq!(px[3], 1.0);
    }

    #[test]
    fn test_normalize_request_expands() {
        let mut g = Graph::new();
        let src = g.add_node(Checkerboard {
            extent: Rect::new(0, 0, 16, 16),
            ..Checkerboard::new(2)
        });
        let blur = g.add_node(BoxBlur::new(1));
        let norm = g.add_node(Normalize);
        g.link_many(&[src, blur, norm]).unwrap();
        g.apply(norm, &Rect::new(4, 4, 1, 1), 0).unwrap();
        let cache = g.cache(norm).unwrap();
        let have = g.bounding_box(norm);
        assert_eq!(have, Rect::new(-1, -1, 18, 18));
        assert_eq!(cache.rect_in(&have, 0), tessera_core::Overlap::In);
    }
}
