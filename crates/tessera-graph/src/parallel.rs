//! Worker bands for default-mode blits.
//!
//! A large blit is cut along its longer axis into one band per worker. Each
//! band evaluates through its own [`EvalManager`], so traversals and
//! contexts are never shared; only the graph is read concurrently. Band
//! managers are pooled on the node and reused by the next banded blit.
//!
//! Without the `parallel` feature the bands run one after another.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tessera_core::{sync, AbyssPolicy, Axis, Format, Rect};
use tracing::debug;

use crate::blit::unscaled_rect;
use crate::error::{GraphError, GraphResult};
use crate::eval::EvalManager;
use crate::graph::Graph;
use crate::node::NodeId;

/// Cuts `roi` into at most `count` bands along its longer axis.
pub(crate) fn split_bands(roi: &Rect, count: usize) -> Vec<Rect> {
    let axis = roi.longer_axis();
    let span = match axis {
        Axis::X => roi.width,
        Axis::Y => roi.height,
    };
    let count = count.clamp(1, span.max(1) as usize);
    let mut bands = Vec::with_capacity(count);
    let mut rest = *roi;
    for i in 0..count {
        let remaining = (count - i) as i32;
        let len = match axis {
            Axis::X => rest.width,
            Axis::Y => rest.height,
        };
        let (band, tail) = rest.split_at(axis, len / remaining);
        bands.push(band);
        rest = tail;
    }
    bands
}

impl Graph {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn blit_bands(
        &self,
        id: NodeId,
        scale: f64,
        roi: &Rect,
        level: u32,
        format: Format,
        dst: &mut [f32],
        rowstride: usize,
        threads: usize,
    ) -> GraphResult<()> {
        let node = self.node(id).ok_or(GraphError::NoSuchNode(id))?;
        let comps = format.components();
        let row_len = roi.width as usize * comps;
        if rowstride < row_len {
            return Err(tessera_core::Error::InvalidRowstride { rowstride, row_len }.into());
        }
        let needed = (roi.height as usize - 1) * rowstride + row_len;
        if dst.len() < needed {
            return Err(tessera_core::Error::buffer_size(needed, dst.len()).into());
        }

        let bands = split_bands(roi, threads);
        let mut managers: Vec<EvalManager> = {
            let mut pool = sync::lock(&node.bands);
            let keep = pool.len().saturating_sub(bands.len());
            pool.drain(keep..).collect()
        };
        while managers.len() < bands.len() {
            managers.push(EvalManager::new(self, id));
        }
        debug!(node = %self.debug_name(id), %roi, bands = bands.len(), "banded blit");

        let render = |(band, mut manager): (Rect, EvalManager)| {
            let stride = band.width as usize * comps;
            let mut pixels = vec![0.0f32; stride * band.height as usize];
            let outcome = match manager.apply(self, &unscaled_rect(&band, scale), level) {
                Some(buf) => buf
                    .get_scaled(&band, scale, level, format, &mut pixels, stride, AbyssPolicy::None)
                    .map(|()| pixels),
                None => Ok(pixels),
            };
            (band, manager, outcome)
        };
        let jobs: Vec<(Rect, EvalManager)> = bands.into_iter().zip(managers).collect();
        #[cfg(feature = "parallel")]
        let results: Vec<_> = jobs.into_par_iter().map(render).collect();
        #[cfg(not(feature = "parallel"))]
        let results: Vec<_> = jobs.into_iter().map(render).collect();

        let mut first_error = None;
        let mut returned = Vec::with_capacity(results.len());
        for (band, manager, outcome) in results {
            returned.push(manager);
            let pixels = match outcome {
                Ok(p) => p,
                Err(err) => {
                    first_error.get_or_insert(err);
                    continue;
                }
            };
            let stride = band.width as usize * comps;
            let dx = (band.x - roi.x) as usize * comps;
            for (row, src) in pixels.chunks_exact(stride.max(1)).enumerate() {
                let start = (band.y - roi.y) as usize * rowstride + row * rowstride + dx;
                dst[start..start + src.len()].copy_from_slice(src);
            }
        }
        sync::lock(&node.bands).extend(returned);

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}
