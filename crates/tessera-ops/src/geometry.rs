//! Geometric operations.

use std::any::Any;

use tessera_graph::prelude::*;

/// Restricts its input to `rect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crop {
    /// Kept area in level-0 coordinates.
    pub rect: Rect,
}

impl Crop {
    /// Crop to `rect`.
    pub fn new(rect: Rect) -> Self {
        Self { rect }
    }
}

impl Operation for Crop {
    fn name(&self) -> &str {
        "tessera:crop"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Filter
    }

    fn prepare(&self, ctx: &mut PrepareContext<'_>) {
        let format = ctx.input_format("input").unwrap_or_default();
        ctx.set_format("output", format);
    }

    fn bounding_box(&self, node: &NodeView<'_>) -> Rect {
        node.source_bbox("input")
            .map(|r| r.clip(&self.rect))
            .unwrap_or(Rect::EMPTY)
    }

    fn required_for_output(&self, _node: &NodeView<'_>, _input_pad: &str, roi: &Rect) -> Rect {
        roi.clip(&self.rect)
    }

    fn invalidated_by_change(&self, _input_pad: &str, roi: &Rect) -> Rect {
        roi.clip(&self.rect)
    }

    fn detect(&self, node: &NodeView<'_>, x: i32, y: i32) -> Option<NodeId> {
        if !self.rect.contains_point(x, y) {
            return None;
        }
        node.detect_source("input", x, y)
    }

    fn process(
        &self,
        ctx: &mut ProcessContext<'_>,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), OperationError> {
        let format = ctx.output_format("output");
        let kept = result.clip(&self.rect);
        let out = ctx.output_target(result);
        if !kept.is_empty() {
            let data = ctx.read_input("input", &kept, format)?;
            ctx.write_output(&out, &kept, format, &data)?;
        }
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
