//! Per-pixel loops over packed RGBA rows.
//!
//! Runs on rayon with the `parallel` feature, sequentially otherwise.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// RGBA samples per pixel.
pub const RGBA: usize = 4;

/// Applies `f` to every RGBA pixel of `data`.
pub fn map_pixels<F>(data: &mut [f32], f: F)
where
    F: Fn(&mut [f32]) + Send + Sync,
{
    #[cfg(feature = "parallel")]
    data.par_chunks_exact_mut(RGBA).for_each(|px| f(px));
    #[cfg(not(feature = "parallel"))]
    data.chunks_exact_mut(RGBA).for_each(|px| f(px));
}

/// Combines `other` into `data` pixel by pixel.
pub fn zip_pixels<F>(data: &mut [f32], other: &[f32], f: F)
where
    F: Fn(&mut [f32], &[f32]) + Send + Sync,
{
    #[cfg(feature = "parallel")]
    data.par_chunks_exact_mut(RGBA)
        .zip(other.par_chunks_exact(RGBA))
        .for_each(|(d, s)| f(d, s));
    #[cfg(not(feature = "parallel"))]
    data.chunks_exact_mut(RGBA)
        .zip(other.chunks_exact(RGBA))
        .for_each(|(d, s)| f(d, s));
}

/// Porter-Duff over of straight-alpha pixels.
#[inline]
pub fn over_pixel(fg: [f32; 4], bg: [f32; 4]) -> [f32; 4] {
    let fg_a = fg[3];
    let bg_a = bg[3];
    let out_a = fg_a + bg_a * (1.0 - fg_a);
    if out_a < 1e-8 {
        return [0.0; 4];
    }
    let inv = 1.0 / out_a;
    [
        (fg[0] * fg_a + bg[0] * bg_a * (1.0 - fg_a)) * inv,
        (fg[1] * fg_a + bg[1] * bg_a * (1.0 - fg_a)) * inv,
        (fg[2] * fg_a + bg[2] * bg_a * (1.0 - fg_a)) * inv,
        out_a,
    ]
}

#[inline]
pub(crate) fn rgba(px: &[f32]) -> [f32; 4] {
    [px[0], px[1], px[2], px[3]]
}
