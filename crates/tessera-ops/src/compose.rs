//! Compositing operations.
//!
//! [`Blend`] layers `aux` (foreground) over `input` (background) with a
//! [`BlendMode`]. [`MaskBlend`] mixes `input` and `aux` through the
//! luminance of `aux2`.
//!
//! # Example
//!
//! ```
//! use tessera_graph::prelude::*;
//! use tessera_ops::compose::{Blend, BlendMode};
//! use tessera_ops::source::Color;
//!
//! let mut g = Graph::new();
//! let bg = g.add_node(Color::new([0.2, 0.2, 0.2, 1.0]));
//! let fg = g.add_node(Color::new([0.5, 0.5, 0.5, 1.0]));
//! let screen = g.add_node(Blend::new(BlendMode::Screen));
//! g.link(bg, screen).unwrap();
//! g.connect(fg, "output", screen, "aux").unwrap();
//!
//! let roi = Rect::new(0, 0, 1, 1);
//! let px = g.apply(screen, &roi, 0).unwrap().read(&roi, 0).unwrap();
//! assert!((px[0] - 0.6).abs() < 1e-6);
//! ```

use std::any::Any;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tessera_graph::prelude::*;
#[allow(unused_imports)]
use tracing::{debug, trace};

use crate::error::OpsError;
use crate::pixel::{over_pixel, rgba, zip_pixels};

/// Per-channel blend applied before alpha compositing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Plain over.
    #[default]
    Normal,
    /// Multiply (darken).
    Multiply,
    /// Screen (lighten).
    Screen,
    /// Add (linear dodge).
    Add,
    /// Subtract foreground from background.
    Subtract,
    /// Overlay (contrast).
    Overlay,
    /// Difference.
    Difference,
}

impl BlendMode {
    /// All modes.
    pub const ALL: [BlendMode; 7] = [
        Self::Normal,
        Self::Multiply,
        Self::Screen,
        Self::Add,
        Self::Subtract,
        Self::Overlay,
        Self::Difference,
    ];

    /// Lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Multiply => "multiply",
            Self::Screen => "screen",
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Overlay => "overlay",
            Self::Difference => "difference",
        }
    }

    /// Blends one channel of foreground `f` onto background `b`.
    #[inline]
    pub fn channel(self, f: f32, b: f32) -> f32 {
        match self {
            Self::Normal => f,
            Self::Multiply => f * b,
            Self::Screen => 1.0 - (1.0 - f) * (1.0 - b),
            Self::Add => (f + b).min(1.0),
            Self::Subtract => (b - f).max(0.0),
            Self::Overlay => {
                if b < 0.5 {
                    2.0 * f * b
                } else {
                    1.0 - 2.0 * (1.0 - f) * (1.0 - b)
                }
            }
            Self::Difference => (f - b).abs(),
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlendMode {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| OpsError::invalid(format!("unknown blend mode '{s}'")))
    }
}

/// Blends foreground `fg` onto background `bg`.
///
/// Color is blended per channel, then composited over `bg` with the
/// foreground alpha.
#[inline]
pub fn blend_pixel(fg: [f32; 4], bg: [f32; 4], mode: BlendMode) -> [f32; 4] {
    if mode == BlendMode::Normal {
        return over_pixel(fg, bg);
    }
    let mixed = [
        mode.channel(fg[0], bg[0]),
        mode.channel(fg[1], bg[1]),
        mode.channel(fg[2], bg[2]),
        fg[3],
    ];
    over_pixel(mixed, bg)
}

// ============================================================================
// Blend
// ============================================================================

/// Two-input compositor: `aux` over `input`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Blend {
    /// Blend mode.
    pub mode: BlendMode,
}

impl Blend {
    /// Compositor with `mode`.
    pub fn new(mode: BlendMode) -> Self {
        Self { mode }
    }
}

impl Operation for Blend {
    fn name(&self) -> &str {
        "tessera:blend"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Composer
    }

    fn prepare(&self, ctx: &mut PrepareContext<'_>) {
        ctx.set_format("output", Format::RGBA_F32);
    }

    fn process(
        &self,
        ctx: &mut ProcessContext<'_>,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), OperationError> {
        trace!(%result, mode = %self.mode, "blend");
        let mut data = ctx.read_input("input", result, Format::RGBA_F32)?;
        if ctx.has_input("aux") {
            let fg = ctx.read_input("aux", result, Format::RGBA_F32)?;
            let mode = self.mode;
            zip_pixels(&mut data, &fg, |bg, fg| {
                bg.copy_from_slice(&blend_pixel(rgba(fg), rgba(bg), mode));
            });
        }
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

// ============================================================================
// MaskBlend
// ============================================================================

/// Mixes `input` towards `aux` by the luminance of `aux2`.
///
/// A missing mask reads as black and leaves `input` unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaskBlend;

impl Operation for MaskBlend {
    fn name(&self) -> &str {
        "tessera:mask-blend"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Composer3
    }

    fn prepare(&self, ctx: &mut PrepareContext<'_>) {
        ctx.set_format("output", Format::RGBA_F32);
    }

    fn process(
        &self,
        ctx: &mut ProcessContext<'_>,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), OperationError> {
        let mut data = ctx.read_input("input", result, Format::RGBA_F32)?;
        let aux = ctx.read_input("aux", result, Format::RGBA_F32)?;
        let mask = ctx.read_input("aux2", result, Format::Y_F32)?;
        for ((px, other), m) in data.chunks_exact_mut(4).zip(aux.chunks_exact(4)).zip(&mask) {
            let m = m.clamp(0.0, 1.0);
            for c in 0..4 {
                px[c] += (other[c] - px[c]) * m;
            }
        }
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
