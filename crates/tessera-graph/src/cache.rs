//! Per-node output cache.
//!
//! A [`Cache`] pairs a pixel [`Buffer`] covering the node's bounding box with
//! one valid [`Region`] per mip level. A rectangle is valid at level `L` only
//! if the buffer holds correct level-`L` pixels for it.
//!
//! All regions are kept in level-0 coordinates, so a need rectangle can be
//! tested against any level directly.
//!
//! # Usage
//!
//! ```
//! use tessera_core::{Format, Overlap, Rect};
//! use tessera_graph::Cache;
//!
//! let cache = Cache::new(Rect::new(0, 0, 64, 64), Format::RGBA_F32, 64);
//! let r = Rect::new(8, 8, 16, 16);
//! cache.computed(&r, 0);
//! assert_eq!(cache.rect_in(&r, 0), Overlap::In);
//! cache.invalidate(Some(&r));
//! assert_eq!(cache.rect_in(&r, 0), Overlap::Out);
//! ```

use std::fmt;
use std::sync::Mutex;

use tessera_core::sync;
use tessera_core::{Buffer, Format, Overlap, Rect, Region};
use tracing::trace;

/// Number of mip levels tracked per cache.
pub const VALID_MIPMAPS: usize = 8;

/// Invalidated rectangles are widened to this grid.
pub const INVALIDATE_ALIGN: i32 = 8;

/// Notification published by a [`Cache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// `rect` became valid at `level`.
    Computed {
        /// Level-0 rectangle.
        rect: Rect,
        /// Mip level.
        level: u32,
    },
    /// `rect` is no longer valid on any level.
    Invalidated {
        /// Aligned level-0 rectangle, [`Rect::INFINITE`] for a full reset.
        rect: Rect,
    },
}

type CacheListener = Box<dyn FnMut(&CacheEvent) -> bool + Send>;

/// Valid-region bookkeeping over a node's output buffer.
pub struct Cache {
    buffer: Buffer,
    valid: Mutex<[Region; VALID_MIPMAPS]>,
    listeners: Mutex<Vec<CacheListener>>,
}

impl Cache {
    /// Creates an empty cache with a fresh buffer.
    ///
    /// The buffer is marked forked: consumers must never process it in place.
    pub fn new(extent: Rect, format: Format, tile_size: i32) -> Self {
        let buffer = Buffer::with_tile_size(extent, format, tile_size);
        buffer.mark_forked();
        Self {
            buffer,
            valid: Mutex::new(Default::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Backing buffer.
    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Pixel format of the backing buffer.
    #[inline]
    pub fn format(&self) -> Format {
        self.buffer.format()
    }

    /// Current buffer extent.
    pub fn extent(&self) -> Rect {
        self.buffer.extent()
    }

    /// Resizes the backing buffer.
    pub fn set_extent(&self, extent: Rect) {
        self.buffer.set_extent(extent);
    }

    /// Records `rect` as valid at `level`.
    ///
    /// Writing a level voids overlapping tiles of coarser levels in the
    /// buffer, so those areas are dropped from the coarser valid regions.
    pub fn computed(&self, rect: &Rect, level: u32) {
        let lvl = level as usize;
        if lvl >= VALID_MIPMAPS || rect.is_empty() {
            return;
        }
        {
            let mut valid = sync::lock(&self.valid);
            valid[lvl].union_with_rect(rect);
            if !rect.is_infinite() {
                let ts = self.buffer.tile_size();
                for (l, region) in valid.iter_mut().enumerate().skip(lvl + 1) {
                    let l = l as u32;
                    let voided = rect.to_level(l).align_outward(ts).from_level(l);
                    region.subtract(&Region::from_rect(&voided));
                }
            }
        }
        trace!(%rect, level, "cache computed");
        self.emit(&CacheEvent::Computed { rect: *rect, level });
    }

    /// Drops `rect` (widened to an 8-pixel grid) from every level, or all
    /// valid data for `None`.
    pub fn invalidate(&self, rect: Option<&Rect>) {
        let aligned = match rect {
            None => Rect::INFINITE,
            Some(r) if r.is_empty() => return,
            Some(r) if r.is_infinite() => Rect::INFINITE,
            Some(r) => r.align_outward(INVALIDATE_ALIGN),
        };
        {
            let mut valid = sync::lock(&self.valid);
            if aligned.is_infinite() {
                valid.iter_mut().for_each(Region::clear);
            } else {
                let dirty = Region::from_rect(&aligned);
                valid.iter_mut().for_each(|r| r.subtract(&dirty));
            }
        }
        trace!(rect = %aligned, "cache invalidated");
        self.emit(&CacheEvent::Invalidated { rect: aligned });
    }

    /// Coverage of `rect` by the valid region at `level`.
    pub fn rect_in(&self, rect: &Rect, level: u32) -> Overlap {
        let lvl = level as usize;
        if lvl >= VALID_MIPMAPS {
            return Overlap::Out;
        }
        sync::lock(&self.valid)[lvl].rect_in(rect)
    }

    /// Snapshot of the valid region at `level`.
    pub fn valid_region(&self, level: u32) -> Region {
        let lvl = level as usize;
        if lvl >= VALID_MIPMAPS {
            return Region::new();
        }
        sync::lock(&self.valid)[lvl].clone()
    }

    /// Subscribes to cache events. The listener is dropped once it returns
    /// `false`.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: FnMut(&CacheEvent) -> bool + Send + 'static,
    {
        sync::lock(&self.listeners).push(Box::new(listener));
    }

    fn emit(&self, event: &CacheEvent) {
        sync::lock(&self.listeners).retain_mut(|l| l(event));
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("buffer", &self.buffer)
            .field("valid_rects", &self.valid_region(0).rectangles().len())
            .finish()
    }
}
