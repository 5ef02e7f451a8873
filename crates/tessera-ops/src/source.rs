//! Source operations: pixels from parameters alone.
//!
//! Both sources cover the infinite plane unless given an extent.

use std::any::Any;

use tessera_graph::prelude::*;
#[allow(unused_imports)]
use tracing::{debug, trace};

/// Constant color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    /// Straight-alpha RGBA.
    pub color: [f32; 4],
    /// Defined area.
    pub extent: Rect,
}

impl Color {
    /// Color covering the infinite plane.
    pub fn new(color: [f32; 4]) -> Self {
        Self {
            color,
            extent: Rect::INFINITE,
        }
    }

    /// Limits the color to `extent`.
    pub fn with_extent(mut self, extent: Rect) -> Self {
        self.extent = extent;
        self
    }
}

impl Operation for Color {
    fn name(&self) -> &str {
        "tessera:color"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Source
    }

    fn prepare(&self, ctx: &mut PrepareContext<'_>) {
        ctx.set_format("output", Format::RGBA_F32);
    }

    fn bounding_box(&self, _node: &NodeView<'_>) -> Rect {
        self.extent
    }

    fn process(
        &self,
        ctx: &mut ProcessContext<'_>,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), OperationError> {
        let out = ctx.output_target(result);
        let n = ctx.level_rect(result).area() as usize;
        let data: Vec<f32> = self.color.iter().copied().cycle().take(n * 4).collect();
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

/// Two-color checkerboard with square cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkerboard {
    /// Cell edge in level-0 pixels.
    pub size: i32,
    /// Color of the cell at the origin.
    pub color1: [f32; 4],
    /// Color of the other cells.
    pub color2: [f32; 4],
    /// Defined area.
    pub extent: Rect,
}

impl Default for Checkerboard {
    fn default() -> Self {
        Self {
            size: 16,
            color1: [0.4, 0.4, 0.4, 1.0],
            color2: [0.6, 0.6, 0.6, 1.0],
            extent: Rect::INFINITE,
        }
    }
}

impl Checkerboard {
    /// Checkerboard with `size`-pixel cells and default colors.
    pub fn new(size: i32) -> Self {
        Self {
            size: size.max(1),
            ..Self::default()
        }
    }

    /// Color of the level-0 pixel `(x, y)`.
    pub fn color_at(&self, x: i32, y: i32) -> [f32; 4] {
        let size = self.size.max(1);
        if (x.div_euclid(size) + y.div_euclid(size)).rem_euclid(2) == 0 {
            self.color1
        } else {
            self.color2
        }
    }
}

impl Operation for Checkerboard {
    fn name(&self) -> &str {
        "tessera:checkerboard"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Source
    }

    fn prepare(&self, ctx: &mut PrepareContext<'_>) {
        ctx.set_format("output", Format::RGBA_F32);
    }

    fn bounding_box(&self, _node: &NodeView<'_>) -> Rect {
        self.extent
    }

    fn process(
        &self,
        ctx: &mut ProcessContext<'_>,
        output_pad: &str,
        result: &Rect,
        level: u32,
    ) -> Result<(), OperationError> {
        let out = ctx.output_target(result);
        let r = ctx.level_rect(result);
        trace!(%r, level, "checkerboard");
        let mut data = Vec::with_capacity(r.area() as usize * 4);
        for (x, y) in r.iter_coords() {
            data.extend_from_slice(&self.color_at(x << level, y << level));
        }
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
