//! Area filters: output pixels depend on a neighborhood of input pixels.

use std::any::Any;

use tessera_graph::prelude::*;
use tracing::trace;

use crate::pixel::RGBA;

/// How [`BoxBlur`] evaluates its kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlurMethod {
    /// Two 1-D passes.
    #[default]
    Separable,
    /// Direct 2-D window average.
    Direct,
}

/// Square-window average of radius `radius` (level-0 pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxBlur {
    /// Window half-size; the window is `2 * radius + 1` pixels wide.
    pub radius: i32,
    /// Kernel evaluation strategy.
    pub method: BlurMethod,
}

impl Default for BoxBlur {
    fn default() -> Self {
        Self::new(4)
    }
}

impl BoxBlur {
    /// Separable blur of `radius`.
    pub fn new(radius: i32) -> Self {
        Self {
            radius: radius.max(0),
            method: BlurMethod::Separable,
        }
    }

    /// Same blur evaluated directly.
    pub fn direct(radius: i32) -> Self {
        Self {
            method: BlurMethod::Direct,
            ..Self::new(radius)
        }
    }
}

/// Averages `src` (covering `src_rect`) into `dst_rect` with a window of
/// `radius` pixels, clamped to `src_rect`.
fn blur_separable(src: &[f32], src_rect: &Rect, dst_rect: &Rect, radius: i32) -> Vec<f32> {
    let sw = src_rect.width as usize;
    let (dw, dh) = (dst_rect.width as usize, dst_rect.height as usize);
    let norm = 1.0 / (2 * radius + 1) as f32;

    // Horizontal pass over every source row, output columns only.
    let rows = src_rect.height as usize;
    let mut tmp = vec![0.0f32; rows * dw * RGBA];
    for row in 0..rows {
        for dx in 0..dw {
            let cx = dst_rect.x + dx as i32 - src_rect.x;
            let mut acc = [0.0f32; RGBA];
            for k in -radius..=radius {
                let sx = (cx + k).clamp(0, sw as i32 - 1) as usize;
                let i = (row * sw + sx) * RGBA;
                for c in 0..RGBA {
                    acc[c] += src[i + c];
                }
            }
            let o = (row * dw + dx) * RGBA;
            for c in 0..RGBA {
                tmp[o + c] = acc[c] * norm;
            }
        }
    }

    let mut out = vec![0.0f32; dw * dh * RGBA];
    for dy in 0..dh {
        let cy = dst_rect.y + dy as i32 - src_rect.y;
        for dx in 0..dw {
            let mut acc = [0.0f32; RGBA];
            for k in -radius..=radius {
                let sy = (cy + k).clamp(0, rows as i32 - 1) as usize;
                let i = (sy * dw + dx) * RGBA;
                for c in 0..RGBA {
                    acc[c] += tmp[i + c];
                }
            }
            let o = (dy * dw + dx) * RGBA;
            for c in 0..RGBA {
                out[o + c] = acc[c] * norm;
            }
        }
    }
    out
}

fn blur_direct(src: &[f32], src_rect: &Rect, dst_rect: &Rect, radius: i32) -> Vec<f32> {
    let (sw, sh) = (src_rect.width, src_rect.height);
    let norm = 1.0 / ((2 * radius + 1) * (2 * radius + 1)) as f32;
    let mut out = Vec::with_capacity(dst_rect.area() as usize * RGBA);
    for (x, y) in dst_rect.iter_coords() {
        let mut acc = [0.0f32; RGBA];
        for ky in -radius..=radius {
            let sy = (y - src_rect.y + ky).clamp(0, sh - 1);
            for kx in -radius..=radius {
                let sx = (x - src_rect.x + kx).clamp(0, sw - 1);
                let i = (sy * sw + sx) as usize * RGBA;
                for c in 0..RGBA {
                    acc[c] += src[i + c];
                }
            }
        }
        out.extend(acc.iter().map(|v| v * norm));
    }
    out
}

impl Operation for BoxBlur {
    fn name(&self) -> &str {
        "tessera:box-blur"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Filter
    }

    fn prepare(&self, ctx: &mut PrepareContext<'_>) {
        ctx.set_format("output", Format::RGBA_F32);
    }

    fn bounding_box(&self, node: &NodeView<'_>) -> Rect {
        node.source_bbox("input")
            .map(|r| r.expand(self.radius, self.radius))
            .unwrap_or(Rect::EMPTY)
    }

    fn required_for_output(&self, _node: &NodeView<'_>, _input_pad: &str, roi: &Rect) -> Rect {
        roi.expand(self.radius, self.radius)
    }

    fn invalidated_by_change(&self, _input_pad: &str, roi: &Rect) -> Rect {
        roi.expand(self.radius, self.radius)
    }

    fn process(
        &self,
        ctx: &mut ProcessContext<'_>,
        output_pad: &str,
        result: &Rect,
        level: u32,
    ) -> Result<(), OperationError> {
        let src_roi = result.expand(self.radius, self.radius);
        let src_rect = ctx.level_rect(&src_roi);
        let dst_rect = ctx.level_rect(result);
        let radius = self.radius >> level.min(31);
        trace!(%dst_rect, radius, level, method = ?self.method, "box blur");

        let src = ctx.read_input("input", &src_roi, Format::RGBA_F32)?;
        let data = match self.method {
            BlurMethod::Separable => blur_separable(&src, &src_rect, &dst_rect, radius),
            BlurMethod::Direct => blur_direct(&src, &src_rect, &dst_rect, radius),
        };
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
    use crate::source::Checkerboard;
    use approx::assert_relative_eq;

    #[test]
    fn test_separable_matches_direct() {
        let src_rect = Rect::new(0, 0, 9, 7);
        let src: Vec<f32> = (0..src_rect.area() as usize * RGBA).map(|i| (i % 13) as f32).collect();
        let dst_rect = Rect::new(2, 2, 5, 3);
        let a = blur_separable(&src, &src_rect, &dst_rect, 2);
        let b = blur_direct(&src, &src_rect, &dst_rect, 2);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_relative_eq!(x, y, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_blur_of_checker_is_gray() {
        let mut g = Graph::new();
        let src = g.add_node(Checkerboard::new(1));
        let blur = g.add_node(BoxBlur::new(1));
        g.link(src, blur).unwrap();
        let roi = Rect::new(10, 10, 2, 2);
        let buf = g.apply(blur, &roi, 0).unwrap();
        let px = buf.read(&roi, 0).unwrap();
        // 3x3 window over a 1px checker: 5 of one color, 4 of the other.
        let expect_even = (5.0 * 0.4 + 4.0 * 0.6) / 9.0;
        assert_relative_eq!(px[0], expect_even, epsilon = 1e-5);
        assert_relative_eq!(px[3], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_bbox_grows() {
        let mut g = Graph::new();
        let src = g.add_node(crate::source::Color::new([1.0; 4]).with_extent(Rect::new(0, 0, 10, 10)));
        let blur = g.add_node(BoxBlur::new(3));
        g.link(src, blur).unwrap();
        assert_eq!(g.bounding_box(blur), Rect::new(-3, -3, 16, 16));
    }
}
