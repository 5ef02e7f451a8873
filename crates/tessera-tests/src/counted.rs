//! Instrumented operation for scenario tests.
//!
//! A [`Counted`] counts its `process` calls and records every result
//! rectangle it computes. Clones share the same log, so a test keeps one
//! handle while the graph owns another.

use std::any::Any;
use std::sync::{Arc, Mutex};

use tessera_graph::prelude::*;

/// Shared call log of a [`Counted`].
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Rect>>>);

impl CallLog {
    /// Number of `process` calls so far.
    pub fn calls(&self) -> usize {
        self.rects().len()
    }

    /// Result rectangles in call order.
    pub fn rects(&self) -> Vec<Rect> {
        tessera_core::sync::lock(&self.0).clone()
    }

    /// Forgets recorded calls.
    pub fn clear(&self) {
        tessera_core::sync::lock(&self.0).clear();
    }

    fn push(&self, rect: Rect) {
        tessera_core::sync::lock(&self.0).push(rect);
    }
}

/// Gray-level operation with configurable kind, extent and area expansion.
///
/// Sources emit `1.0`; every other kind adds `1.0` to its `input`, so the
/// value of a pixel counts the nodes on its path.
#[derive(Debug, Clone)]
pub struct Counted {
    kind: OperationKind,
    extent: Rect,
    expand: i32,
    fail: bool,
    log: CallLog,
}

impl Counted {
    fn with_kind(kind: OperationKind) -> Self {
        Self {
            kind,
            extent: Rect::EMPTY,
            expand: 0,
            fail: false,
            log: CallLog::default(),
        }
    }

    /// Source defined over `extent`.
    pub fn source(extent: Rect) -> Self {
        Self {
            extent,
            ..Self::with_kind(OperationKind::Source)
        }
    }

    /// Point filter.
    pub fn point() -> Self {
        Self::with_kind(OperationKind::PointFilter)
    }

    /// Area filter needing `radius` extra pixels on every side.
    pub fn area(radius: i32) -> Self {
        Self {
            expand: radius,
            ..Self::with_kind(OperationKind::Filter)
        }
    }

    /// Two-input composer.
    pub fn composer() -> Self {
        Self::with_kind(OperationKind::Composer)
    }

    /// Makes every `process` call fail.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Handle on the call log.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl Operation for Counted {
    fn name(&self) -> &str {
        "test:counted"
    }

    fn kind(&self) -> OperationKind {
        self.kind
    }

    fn prepare(&self, ctx: &mut PrepareContext<'_>) {
        ctx.set_format("output", Format::Y_F32);
    }

    fn bounding_box(&self, node: &NodeView<'_>) -> Rect {
        match self.kind {
            OperationKind::Source => self.extent,
            _ => node
                .source_bbox("input")
                .map(|r| r.expand(self.expand, self.expand))
                .unwrap_or(Rect::EMPTY),
        }
    }

    fn required_for_output(&self, _node: &NodeView<'_>, _input_pad: &str, roi: &Rect) -> Rect {
        roi.expand(self.expand, self.expand)
    }

    fn invalidated_by_change(&self, _input_pad: &str, roi: &Rect) -> Rect {
        roi.expand(self.expand, self.expand)
    }

    fn process(
        &self,
        ctx: &mut ProcessContext<'_>,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), OperationError> {
        self.log.push(*result);
        if self.fail {
            return Err(OperationError::failed("told to fail"));
        }
        let data = match self.kind {
            OperationKind::Source => vec![1.0f32; ctx.level_rect(result).area() as usize],
            _ => {
                let mut v = ctx.read_input("input", result, Format::Y_F32)?;
                v.iter_mut().for_each(|p| *p += 1.0);
                v
            }
        };
        let out = ctx.output_target(result);
        ctx.write_output(&out, result, Format::Y_F32, &data)?;
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

/// Adds `op` to `graph`, returning the node and its log.
pub fn add_counted(graph: &mut Graph, op: Counted) -> (NodeId, CallLog) {
    let log = op.log();
    (graph.add_node(op), log)
}

/// Small deterministic generator for property-style tests.
#[derive(Debug, Clone)]
pub struct Lcg(u64);

impl Lcg {
    /// Seeded generator.
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(6364136223846793005).wrapping_add(1))
    }

    /// Next value in `0..n`.
    pub fn below(&mut self, n: u32) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 33) % n.max(1) as u64) as u32
    }

    /// Random rectangle inside `0..span` on both axes.
    pub fn rect(&mut self, span: i32) -> Rect {
        let x = self.below(span as u32) as i32;
        let y = self.below(span as u32) as i32;
        let w = 1 + self.below((span - x) as u32) as i32;
        let h = 1 + self.below((span - y) as u32) as i32;
        Rect::new(x, y, w, h)
    }
}
