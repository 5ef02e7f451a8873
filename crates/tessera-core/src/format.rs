//! Pixel formats.
//!
//! The engine treats formats as opaque negotiated handles: operations pick
//! one during `prepare`, buffers are allocated with one, and pixels are
//! converted between them at `get`/`set` boundaries. All sample storage is
//! `f32`; a format only fixes the component layout.
//!
//! # Formats
//!
//! | Handle | Components | Bytes/pixel |
//! |--------|------------|-------------|
//! | [`Format::Y_F32`] | Y | 4 |
//! | [`Format::YA_F32`] | Y, A | 8 |
//! | [`Format::RGB_F32`] | R, G, B | 12 |
//! | [`Format::RGBA_F32`] | R, G, B, A | 16 |
//!
//! # Usage
//!
//! ```rust
//! use tessera_core::Format;
//!
//! let gray = [0.5f32, 0.25];
//! let mut rgba = [0.0f32; 8];
//! Format::Y_F32.convert(Format::RGBA_F32, &gray, &mut rgba, 2).unwrap();
//! assert_eq!(rgba, [0.5, 0.5, 0.5, 1.0, 0.25, 0.25, 0.25, 1.0]);
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// Rec.709 luma weights used when collapsing color to gray.
pub const REC709_LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Component layout of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Single gray channel
    Y,
    /// Gray with alpha
    Ya,
    /// Three color channels
    Rgb,
    /// Three color channels with alpha
    Rgba,
}

/// Opaque pixel format handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format {
    layout: Layout,
}

impl Format {
    /// Single-channel gray, `f32`.
    pub const Y_F32: Format = Format { layout: Layout::Y };
    /// Gray with alpha, `f32`.
    pub const YA_F32: Format = Format { layout: Layout::Ya };
    /// RGB, `f32`.
    pub const RGB_F32: Format = Format { layout: Layout::Rgb };
    /// RGB with alpha, `f32`. Default working format of the engine.
    pub const RGBA_F32: Format = Format { layout: Layout::Rgba };

    /// Component layout.
    #[inline]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Samples per pixel.
    #[inline]
    pub const fn components(&self) -> usize {
        match self.layout {
            Layout::Y => 1,
            Layout::Ya => 2,
            Layout::Rgb => 3,
            Layout::Rgba => 4,
        }
    }

    /// Storage size of one pixel in bytes.
    #[inline]
    pub const fn bytes_per_pixel(&self) -> usize {
        self.components() * std::mem::size_of::<f32>()
    }

    /// Returns `true` if the format carries an alpha channel.
    #[inline]
    pub const fn has_alpha(&self) -> bool {
        matches!(self.layout, Layout::Ya | Layout::Rgba)
    }

    /// Human-readable name, e.g. `"RGBA float"`.
    pub const fn name(&self) -> &'static str {
        match self.layout {
            Layout::Y => "Y float",
            Layout::Ya => "YA float",
            Layout::Rgb => "RGB float",
            Layout::Rgba => "RGBA float",
        }
    }

    /// Parses a format name as produced by [`Format::name`] (case-insensitive,
    /// also accepting the short forms `y`, `ya`, `rgb`, `rgba`).
    pub fn from_name(name: &str) -> Option<Format> {
        let lower = name.trim().to_ascii_lowercase();
        let short = lower.strip_suffix(" float").unwrap_or(&lower);
        match short {
            "y" => Some(Self::Y_F32),
            "ya" => Some(Self::YA_F32),
            "rgb" => Some(Self::RGB_F32),
            "rgba" => Some(Self::RGBA_F32),
            _ => None,
        }
    }

    /// Converts `count` pixels from this format into `dst`.
    ///
    /// Color is replicated when expanding gray, collapsed with
    /// [`REC709_LUMA`] when reducing to gray; missing alpha becomes `1.0`.
    ///
    /// # Errors
    ///
    /// [`Error::BufferSize`] if either slice is too short for `count` pixels.
    pub fn convert(&self, dst: Format, src: &[f32], out: &mut [f32], count: usize) -> Result<()> {
        let sc = self.components();
        let dc = dst.components();
        if src.len() < count * sc {
            return Err(Error::buffer_size(count * sc, src.len()));
        }
        if out.len() < count * dc {
            return Err(Error::buffer_size(count * dc, out.len()));
        }
        if *self == dst {
            out[..count * dc].copy_from_slice(&src[..count * sc]);
            return Ok(());
        }
        for (s, d) in src
            .chunks_exact(sc)
            .zip(out.chunks_exact_mut(dc))
            .take(count)
        {
            let (rgb, alpha) = self.unpack(s);
            let gray = self.is_gray().then_some(s[0]);
            dst.pack(rgb, gray, alpha, d);
        }
        Ok(())
    }

    /// Returns `true` for the single-channel gray layouts.
    #[inline]
    pub fn is_gray(&self) -> bool {
        matches!(self.layout, Layout::Y | Layout::Ya)
    }

    #[inline]
    fn unpack(&self, s: &[f32]) -> ([f32; 3], f32) {
        match self.layout {
            Layout::Y => ([s[0]; 3], 1.0),
            Layout::Ya => ([s[0]; 3], s[1]),
            Layout::Rgb => ([s[0], s[1], s[2]], 1.0),
            Layout::Rgba => ([s[0], s[1], s[2]], s[3]),
        }
    }

    #[inline]
    fn pack(&self, rgb: [f32; 3], gray: Option<f32>, alpha: f32, d: &mut [f32]) {
        // Gray to gray copies the channel; only color is mixed down.
        let luma = || {
            gray.unwrap_or(rgb[0] * REC709_LUMA[0] + rgb[1] * REC709_LUMA[1] + rgb[2] * REC709_LUMA[2])
        };
        match self.layout {
            Layout::Y => d[0] = luma(),
            Layout::Ya => {
                d[0] = luma();
                d[1] = alpha;
            }
            Layout::Rgb => d[..3].copy_from_slice(&rgb),
            Layout::Rgba => {
                d[..3].copy_from_slice(&rgb);
                d[3] = alpha;
            }
        }
    }
}

impl Default for Format {
    fn default() -> Self {
        Self::RGBA_F32
    }
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Format({})", self.name())
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
