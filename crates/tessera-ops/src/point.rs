//! Point filters: each output pixel depends on the same input pixel only.
//!
//! Both filters reuse their input buffer when nobody else sees it.

use std::any::Any;

use tessera_core::AbyssPolicy;
use tessera_graph::prelude::*;

use crate::pixel::{map_pixels, RGBA};

/// Reads `result` from the input, either in place or into a fresh target.
fn point_io(ctx: &mut ProcessContext<'_>, result: &Rect) -> Result<(Buffer, Vec<f32>), OperationError> {
    match ctx.take_input_in_place("input", result) {
        Some(buf) => {
            let r = ctx.level_rect(result);
            let mut data = vec![0.0f32; r.area() as usize * RGBA];
            buf.get_at_level(
                &r,
                ctx.level(),
                Format::RGBA_F32,
                &mut data,
                r.width as usize * RGBA,
                AbyssPolicy::None,
            )?;
            Ok((buf, data))
        }
        None => {
            let data = ctx.read_input("input", result, Format::RGBA_F32)?;
            Ok((ctx.output_target(result), data))
        }
    }
}

fn rgba_prepare(ctx: &mut PrepareContext<'_>) {
    ctx.set_format("output", Format::RGBA_F32);
}

/// Inverts color channels, keeping alpha.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Invert;

impl Operation for Invert {
    fn name(&self) -> &str {
        "tessera:invert"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::PointFilter
    }

    fn prepare(&self, ctx: &mut PrepareContext<'_>) {
        rgba_prepare(ctx);
    }

    fn process(
        &self,
        ctx: &mut ProcessContext<'_>,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), OperationError> {
        let (out, mut data) = point_io(ctx, result)?;
        map_pixels(&mut data, |px| {
            px[0] = 1.0 - px[0];
            px[1] = 1.0 - px[1];
            px[2] = 1.0 - px[2];
        });
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

/// Multiplies color channels by a constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Multiply {
    /// Gain applied to R, G and B.
    pub value: f32,
}

impl Multiply {
    /// Creates a gain of `value`.
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl Default for Multiply {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Operation for Multiply {
    fn name(&self) -> &str {
        "tessera:multiply"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::PointFilter
    }

    fn prepare(&self, ctx: &mut PrepareContext<'_>) {
        rgba_prepare(ctx);
    }

    fn process(
        &self,
        ctx: &mut ProcessContext<'_>,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), OperationError> {
        let (out, mut data) = point_io(ctx, result)?;
        let value = self.value;
        map_pixels(&mut data, |px| {
            px[0] *= value;
            px[1] *= value;
            px[2] *= value;
        });
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
    use crate::source::Color;
    use approx::assert_relative_eq;
    use tessera_graph::{CachePolicy, EngineConfig};

    fn pixel(graph: &Graph, id: NodeId) -> Vec<f32> {
        graph
            .apply(id, &Rect::new(0, 0, 1, 1), 0)
            .unwrap()
            .read(&Rect::new(0, 0, 1, 1), 0)
            .unwrap()
    }

    #[test]
    fn test_invert_keeps_alpha() {
        let mut g = Graph::new();
        let src = g.add_node(Color::new([0.25, 0.5, 1.0, 0.5]));
        let inv = g.add_node(Invert);
        g.link(src, inv).unwrap();
        let px = pixel(&g, inv);
        assert_relative_eq!(px[0], 0.75);
        assert_relative_eq!(px[1], 0.5);
        assert_relative_eq!(px[2], 0.0);
        assert_relative_eq!(px[3], 0.5);
    }

    #[test]
    fn test_in_place_chain_without_caches() {
        let config = EngineConfig::builder().cache_policy(CachePolicy::Never).build();
        let mut g = Graph::with_config(config);
        let src = g.add_node(Color::new([0.5, 0.5, 0.5, 1.0]));
        let mul = g.add_node(Multiply::new(0.5));
        let inv = g.add_node(Invert);
        g.link_many(&[src, mul, inv]).unwrap();
        let px = pixel(&g, inv);
        assert_relative_eq!(px[0], 0.75);
        assert_relative_eq!(px[3], 1.0);
        assert!(g.cache(mul).is_none());
    }

    #[test]
    fn test_unconnected_input_reads_empty() {
        let mut g = Graph::new();
        let inv = g.add_node(Invert);
        assert!(g.bounding_box(inv).is_empty());
        let out = g.apply(inv, &Rect::new(0, 0, 2, 2), 0).unwrap();
        assert!(out.is_empty());
    }
}
