//! Tile-backed pixel buffers.
//!
//! A [`Buffer`] is a cheaply clonable handle to sparse tile storage. Tiles
//! are allocated on first write and keyed by `(level, tile_x, tile_y)`, so a
//! buffer with an infinite extent costs nothing until pixels are stored.
//!
//! # Levels
//!
//! Level 0 is full resolution; level `L` holds pixels downsampled by `2^L`
//! in level-local coordinates (see [`Rect::to_level`]). Levels are written
//! independently by the evaluation engine. Writing pixels at level `L`
//! voids overlapping tiles of every coarser level, since those no longer
//! match their source.
//!
//! # Sharing
//!
//! Clones share storage. A buffer handed to more than one consumer is
//! marked *forked* ([`Buffer::mark_forked`]); consumers must not mutate a
//! forked buffer in place.
//!
//! # Usage
//!
//! ```rust
//! use tessera_core::{AbyssPolicy, Buffer, Format, Rect};
//!
//! let buf = Buffer::allocate(Rect::new(0, 0, 8, 8), Format::Y_F32);
//! buf.set(&Rect::new(2, 2, 2, 1), Format::Y_F32, &[0.25, 0.75], 2).unwrap();
//!
//! let mut out = [0.0f32; 4];
//! buf.get(&Rect::new(1, 2, 4, 1), 1.0, Format::Y_F32, &mut out, 4, AbyssPolicy::None)
//!     .unwrap();
//! assert_eq!(out, [0.0, 0.25, 0.75, 0.0]);
//! ```
//!
//! # Used By
//!
//! - `tessera-graph::cache` - node caches
//! - `tessera-graph::context` - per-pad data exchanged between operations

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::trace;

use crate::error::{Error, Result};
use crate::format::Format;
use crate::rect::Rect;
use crate::sync;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: i32 = 64;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Out-of-bounds sampling rule for [`Buffer::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbyssPolicy {
    /// Pixels outside the extent read as zero.
    #[default]
    None,
    /// Pixels outside the extent repeat the nearest edge pixel.
    Clamp,
}

type TileKey = (u32, i32, i32);

struct Storage {
    extent: Rect,
    tiles: HashMap<TileKey, Box<[f32]>>,
}

struct BufferInner {
    id: u64,
    format: Format,
    tile_size: i32,
    storage: RwLock<Storage>,
    forked: AtomicBool,
}

/// Shared handle to tile-backed pixel storage.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

impl Buffer {
    /// Allocates a buffer covering `extent` with the default tile size.
    pub fn allocate(extent: Rect, format: Format) -> Self {
        Self::with_tile_size(extent, format, DEFAULT_TILE_SIZE)
    }

    /// Allocates a buffer with an explicit tile edge length.
    pub fn with_tile_size(extent: Rect, format: Format, tile_size: i32) -> Self {
        let id = NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed);
        trace!(id, %extent, %format, tile_size, "buffer allocate");
        Self {
            inner: Arc::new(BufferInner {
                id,
                format,
                tile_size: tile_size.max(1),
                storage: RwLock::new(Storage {
                    extent,
                    tiles: HashMap::new(),
                }),
                forked: AtomicBool::new(false),
            }),
        }
    }

    /// A 0×0 buffer: reads yield zeros, writes are dropped.
    pub fn empty() -> Self {
        Self::allocate(Rect::EMPTY, Format::RGBA_F32)
    }

    /// Unique id of the underlying storage.
    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Storage format.
    #[inline]
    pub fn format(&self) -> Format {
        self.inner.format
    }

    /// Tile edge length.
    #[inline]
    pub fn tile_size(&self) -> i32 {
        self.inner.tile_size
    }

    /// Level-0 extent.
    pub fn extent(&self) -> Rect {
        sync::read(&self.inner.storage).extent
    }

    /// Returns `true` if the extent covers no pixel.
    pub fn is_empty(&self) -> bool {
        self.extent().is_empty()
    }

    /// Changes the extent. Stored tiles are kept.
    pub fn set_extent(&self, extent: Rect) {
        sync::write(&self.inner.storage).extent = extent;
    }

    /// Returns `true` if both handles share storage.
    #[inline]
    pub fn ptr_eq(a: &Buffer, b: &Buffer) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Marks the buffer as shared between several consumers.
    #[inline]
    pub fn mark_forked(&self) {
        self.inner.forked.store(true, Ordering::Release);
    }

    /// Returns `true` if the buffer was handed to several consumers.
    #[inline]
    pub fn is_forked(&self) -> bool {
        self.inner.forked.load(Ordering::Acquire)
    }

    /// Number of allocated tiles across all levels.
    pub fn tile_count(&self) -> usize {
        sync::read(&self.inner.storage).tiles.len()
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Reads `rect` at `scale` relative to level 0.
    ///
    /// `rect` is expressed in scaled coordinates; with `scale == 1.0` it is a
    /// plain level-0 rectangle. `rowstride` is measured in samples of
    /// `format`.
    pub fn get(
        &self,
        rect: &Rect,
        scale: f64,
        format: Format,
        dst: &mut [f32],
        rowstride: usize,
        abyss: AbyssPolicy,
    ) -> Result<()> {
        self.get_scaled(rect, scale, 0, format, dst, rowstride, abyss)
    }

    /// Reads `rect` from `level` with a residual `scale` applied on top of
    /// the level's own `2^-level` factor.
    ///
    /// Scaled reads use nearest-neighbour sampling of the level's pixels.
    #[allow(clippy::too_many_arguments)]
    pub fn get_scaled(
        &self,
        rect: &Rect,
        scale: f64,
        level: u32,
        format: Format,
        dst: &mut [f32],
        rowstride: usize,
        abyss: AbyssPolicy,
    ) -> Result<()> {
        let residual = scale * f64::from(1u32 << level.min(31));
        if (residual - 1.0).abs() < 1e-9 {
            return self.get_at_level(rect, level, format, dst, rowstride, abyss);
        }
        check_rect(rect)?;
        let (w, h) = (rect.width as usize, rect.height as usize);
        let dc = format.components();
        check_dst(dst.len(), w, h, dc, rowstride)?;
        if w == 0 || h == 0 {
            return Ok(());
        }

        let map = |v: i32| ((f64::from(v) + 0.5) / residual).floor() as i32;
        let sx1 = map(rect.x);
        let sy1 = map(rect.y);
        let sx2 = map(rect.right() - 1) + 1;
        let sy2 = map(rect.bottom() - 1) + 1;
        let src_rect = Rect::from_corners(sx1, sy1, sx2, sy2);

        let sc = self.format().components();
        let src = self.read_native(&src_rect, level, abyss);
        let src_w = src_rect.width as usize;

        let mut row = vec![0.0f32; w * sc];
        for dy in 0..h {
            let sy = (map(rect.y + dy as i32) - sy1) as usize;
            for dx in 0..w {
                let sx = (map(rect.x + dx as i32) - sx1) as usize;
                let s = (sy * src_w + sx) * sc;
                row[dx * sc..(dx + 1) * sc].copy_from_slice(&src[s..s + sc]);
            }
            let out = &mut dst[dy * rowstride..dy * rowstride + w * dc];
            self.format().convert(format, &row, out, w)?;
        }
        Ok(())
    }

    /// Reads `rect` (in level-local coordinates) from `level`.
    pub fn get_at_level(
        &self,
        rect: &Rect,
        level: u32,
        format: Format,
        dst: &mut [f32],
        rowstride: usize,
        abyss: AbyssPolicy,
    ) -> Result<()> {
        check_rect(rect)?;
        let (w, h) = (rect.width as usize, rect.height as usize);
        let dc = format.components();
        check_dst(dst.len(), w, h, dc, rowstride)?;
        if w == 0 || h == 0 {
            return Ok(());
        }
        let src = self.read_native(rect, level, abyss);
        let sc = self.format().components();
        for dy in 0..h {
            let row = &src[dy * w * sc..(dy + 1) * w * sc];
            let out = &mut dst[dy * rowstride..dy * rowstride + w * dc];
            self.format().convert(format, row, out, w)?;
        }
        Ok(())
    }

    /// Reads `rect` at `level` into a packed vector in the buffer's own format.
    pub fn read(&self, rect: &Rect, level: u32) -> Result<Vec<f32>> {
        check_rect(rect)?;
        Ok(self.read_native(rect, level, AbyssPolicy::None))
    }

    /// Reads a packed block in storage format. `rect` must be finite.
    fn read_native(&self, rect: &Rect, level: u32, abyss: AbyssPolicy) -> Vec<f32> {
        let sc = self.format().components();
        let (w, h) = (rect.width.max(0) as usize, rect.height.max(0) as usize);
        let mut out = vec![0.0f32; w * h * sc];
        if w == 0 || h == 0 {
            return out;
        }

        let storage = sync::read(&self.inner.storage);
        let ext = storage.extent.to_level(level);
        if ext.is_empty() {
            return out;
        }
        let ts = self.inner.tile_size;

        match abyss {
            AbyssPolicy::None => {
                let Some(area) = rect.intersect(&ext) else {
                    return out;
                };
                for (key, tile_rect) in tiles_in(&area, level, ts) {
                    let Some(tile) = storage.tiles.get(&key) else {
                        continue;
                    };
                    let Some(part) = tile_rect.intersect(&area) else {
                        continue;
                    };
                    let n = part.width as usize * sc;
                    for y in part.y..part.bottom() {
                        let t = (((y - tile_rect.y) * ts + (part.x - tile_rect.x)) as usize) * sc;
                        let o = (((y - rect.y) as usize) * w + (part.x - rect.x) as usize) * sc;
                        out[o..o + n].copy_from_slice(&tile[t..t + n]);
                    }
                }
            }
            AbyssPolicy::Clamp => {
                let mut cached: Option<(TileKey, Option<&[f32]>)> = None;
                for (i, (x, y)) in rect.iter_coords().enumerate() {
                    let cx = x.clamp(ext.x, ext.right() - 1);
                    let cy = y.clamp(ext.y, ext.bottom() - 1);
                    let key = (level, cx.div_euclid(ts), cy.div_euclid(ts));
                    let tile = match cached {
                        Some((k, t)) if k == key => t,
                        _ => {
                            let t = storage.tiles.get(&key).map(|b| &b[..]);
                            cached = Some((key, t));
                            t
                        }
                    };
                    if let Some(tile) = tile {
                        let lx = cx.rem_euclid(ts);
                        let ly = cy.rem_euclid(ts);
                        let t = ((ly * ts + lx) as usize) * sc;
                        out[i * sc..(i + 1) * sc].copy_from_slice(&tile[t..t + sc]);
                    }
                }
            }
        }
        out
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Writes level-0 pixels of `format` into `rect`.
    pub fn set(&self, rect: &Rect, format: Format, src: &[f32], rowstride: usize) -> Result<()> {
        self.set_at_level(rect, 0, format, src, rowstride)
    }

    /// Writes pixels into `rect` (level-local coordinates) at `level`.
    ///
    /// Pixels outside the extent are dropped. Overlapping tiles of coarser
    /// levels are voided.
    pub fn set_at_level(
        &self,
        rect: &Rect,
        level: u32,
        format: Format,
        src: &[f32],
        rowstride: usize,
    ) -> Result<()> {
        check_rect(rect)?;
        let (w, h) = (rect.width as usize, rect.height as usize);
        let sc = format.components();
        check_dst(src.len(), w, h, sc, rowstride)?;
        if w == 0 || h == 0 {
            return Ok(());
        }

        let native = self.format();
        let nc = native.components();
        let mut packed = vec![0.0f32; w * h * nc];
        for dy in 0..h {
            let row = &src[dy * rowstride..dy * rowstride + w * sc];
            format.convert(native, row, &mut packed[dy * w * nc..(dy + 1) * w * nc], w)?;
        }
        self.write_native(rect, level, &packed);
        Ok(())
    }

    /// Writes a packed block in the buffer's own format.
    pub fn write(&self, rect: &Rect, level: u32, data: &[f32]) -> Result<()> {
        let nc = self.format().components();
        self.set_at_level(rect, level, self.format(), data, rect.width.max(0) as usize * nc)
    }

    fn write_native(&self, rect: &Rect, level: u32, packed: &[f32]) {
        let sc = self.format().components();
        let w = rect.width as usize;
        let ts = self.inner.tile_size;
        let tile_len = (ts * ts) as usize * sc;

        let mut storage = sync::write(&self.inner.storage);
        let ext = storage.extent.to_level(level);
        let Some(area) = rect.intersect(&ext) else {
            return;
        };
        for (key, tile_rect) in tiles_in(&area, level, ts) {
            let Some(part) = tile_rect.intersect(&area) else {
                continue;
            };
            let tile = storage
                .tiles
                .entry(key)
                .or_insert_with(|| vec![0.0f32; tile_len].into_boxed_slice());
            let n = part.width as usize * sc;
            for y in part.y..part.bottom() {
                let t = (((y - tile_rect.y) * ts + (part.x - tile_rect.x)) as usize) * sc;
                let s = (((y - rect.y) as usize) * w + (part.x - rect.x) as usize) * sc;
                tile[t..t + n].copy_from_slice(&packed[s..s + n]);
            }
        }
        void_coarser(&mut storage, &area, level, ts);
    }

    /// Zeroes `rect` (level 0) on every level, or drops all tiles for `None`.
    pub fn clear(&self, rect: Option<&Rect>) {
        let mut storage = sync::write(&self.inner.storage);
        let Some(rect) = rect else {
            storage.tiles.clear();
            return;
        };
        if rect.is_infinite() {
            storage.tiles.clear();
            return;
        }
        let ts = self.inner.tile_size;
        let sc = self.format().components();
        let levels: Vec<u32> = {
            let mut l: Vec<u32> = storage.tiles.keys().map(|k| k.0).collect();
            l.sort_unstable();
            l.dedup();
            l
        };
        for level in levels {
            let area = rect.to_level(level);
            for (key, tile_rect) in tiles_in(&area, level, ts) {
                let Some(part) = tile_rect.intersect(&area) else {
                    continue;
                };
                if part == tile_rect {
                    storage.tiles.remove(&key);
                    continue;
                }
                let Some(tile) = storage.tiles.get_mut(&key) else {
                    continue;
                };
                let n = part.width as usize * sc;
                for y in part.y..part.bottom() {
                    let t = (((y - tile_rect.y) * ts + (part.x - tile_rect.x)) as usize) * sc;
                    tile[t..t + n].fill(0.0);
                }
            }
        }
    }

    /// Copies level-0 pixels of `src_rect` in `src` to `dst` at the origin
    /// of `dst_rect`.
    pub fn copy(src: &Buffer, src_rect: &Rect, dst: &Buffer, dst_rect: &Rect) -> Result<()> {
        check_rect(src_rect)?;
        let data = src.read_native(src_rect, 0, AbyssPolicy::None);
        let target = Rect::new(dst_rect.x, dst_rect.y, src_rect.width, src_rect.height);
        let stride = src_rect.width.max(0) as usize * src.format().components();
        dst.set(&target, src.format(), &data, stride)
    }

    /// Copies `rect` (level-local coordinates) of `level` from `src` into the
    /// same place of `dst`.
    pub fn copy_at_level(src: &Buffer, rect: &Rect, level: u32, dst: &Buffer) -> Result<()> {
        check_rect(rect)?;
        let data = src.read_native(rect, level, AbyssPolicy::None);
        let stride = rect.width.max(0) as usize * src.format().components();
        dst.set_at_level(rect, level, src.format(), &data, stride)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.inner.id)
            .field("format", &self.inner.format)
            .field("extent", &self.extent())
            .field("forked", &self.is_forked())
            .finish()
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::empty()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn check_rect(rect: &Rect) -> Result<()> {
    if rect.is_infinite() {
        return Err(Error::InfiniteRect);
    }
    if rect.width < 0 || rect.height < 0 {
        return Err(Error::InvalidRect {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        });
    }
    Ok(())
}

fn check_dst(len: usize, w: usize, h: usize, comps: usize, rowstride: usize) -> Result<()> {
    if w == 0 || h == 0 {
        return Ok(());
    }
    let row_len = w * comps;
    if rowstride < row_len {
        return Err(Error::InvalidRowstride { rowstride, row_len });
    }
    let needed = (h - 1) * rowstride + row_len;
    if len < needed {
        return Err(Error::buffer_size(needed, len));
    }
    Ok(())
}

/// Tiles of `level` intersecting `area`, with their level-local rects.
fn tiles_in(area: &Rect, level: u32, ts: i32) -> Vec<(TileKey, Rect)> {
    if area.is_empty() {
        return Vec::new();
    }
    let tx1 = area.x.div_euclid(ts);
    let ty1 = area.y.div_euclid(ts);
    let tx2 = (area.right() - 1).div_euclid(ts);
    let ty2 = (area.bottom() - 1).div_euclid(ts);
    let mut out = Vec::with_capacity(((tx2 - tx1 + 1) * (ty2 - ty1 + 1)).max(0) as usize);
    for ty in ty1..=ty2 {
        for tx in tx1..=tx2 {
            out.push(((level, tx, ty), Rect::new(tx * ts, ty * ts, ts, ts)));
        }
    }
    out
}

/// Drops tiles of levels above `level` that overlap `area`.
fn void_coarser(storage: &mut Storage, area: &Rect, level: u32, ts: i32) {
    let base = area.from_level(level);
    storage.tiles.retain(|&(l, tx, ty), _| {
        if l <= level {
            return true;
        }
        let covered = base.to_level(l);
        !Rect::new(tx * ts, ty * ts, ts, ts).overlaps(&covered)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(buf: &Buffer, rect: &Rect) {
        let data: Vec<f32> = rect
            .iter_coords()
            .map(|(x, y)| (y * 1000 + x) as f32)
            .collect();
        buf.set(rect, Format::Y_F32, &data, rect.width as usize).unwrap();
    }

    #[test]
    fn test_set_get_across_tiles() {
        let buf = Buffer::with_tile_size(Rect::new(0, 0, 100, 100), Format::Y_F32, 16);
        let rect = Rect::new(10, 10, 40, 30);
        ramp(&buf, &rect);

        let mut out = vec![0.0f32; 40 * 30];
        buf.get(&rect, 1.0, Format::Y_F32, &mut out, 40, AbyssPolicy::None)
            .unwrap();
        assert_eq!(out[0], 10010.0);
        assert_eq!(out[40 * 29 + 39], 39049.0);
        assert!(buf.tile_count() > 1);
    }

    #[test]
    fn test_negative_coordinates() {
        let buf = Buffer::with_tile_size(Rect::INFINITE, Format::Y_F32, 8);
        let rect = Rect::new(-12, -3, 5, 5);
        ramp(&buf, &rect);
        let back = buf.read(&rect, 0).unwrap();
        assert_eq!(back[0], (-3 * 1000 - 12) as f32);
    }

    #[test]
    fn test_writes_outside_extent_dropped() {
        let buf = Buffer::allocate(Rect::new(0, 0, 4, 4), Format::Y_F32);
        buf.set(&Rect::new(2, 0, 4, 1), Format::Y_F32, &[1.0, 2.0, 3.0, 4.0], 4)
            .unwrap();
        let row = buf.read(&Rect::new(0, 0, 6, 1), 0).unwrap();
        assert_eq!(row, vec![0.0, 0.0, 1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_abyss_clamp() {
        let buf = Buffer::allocate(Rect::new(0, 0, 2, 1), Format::Y_F32);
        buf.set(&Rect::new(0, 0, 2, 1), Format::Y_F32, &[5.0, 7.0], 2).unwrap();
        let mut out = [0.0f32; 4];
        buf.get(&Rect::new(-1, 0, 4, 1), 1.0, Format::Y_F32, &mut out, 4, AbyssPolicy::Clamp)
            .unwrap();
        assert_eq!(out, [5.0, 5.0, 7.0, 7.0]);
    }

    #[test]
    fn test_format_conversion_and_rowstride() {
        let buf = Buffer::allocate(Rect::new(0, 0, 2, 2), Format::Y_F32);
        buf.set(&Rect::new(0, 0, 2, 2), Format::Y_F32, &[0.1, 0.2, 0.3, 0.4], 2)
            .unwrap();
        // Two RGBA pixels per row plus one pixel of padding.
        let mut out = vec![-1.0f32; 12 + 8];
        buf.get(&Rect::new(0, 0, 2, 2), 1.0, Format::RGBA_F32, &mut out, 12, AbyssPolicy::None)
            .unwrap();
        assert_eq!(&out[..8], &[0.1, 0.1, 0.1, 1.0, 0.2, 0.2, 0.2, 1.0]);
        assert_eq!(&out[8..12], &[-1.0; 4]);
        assert_eq!(&out[12..16], &[0.3, 0.3, 0.3, 1.0]);
    }

    #[test]
    fn test_short_destination_rejected() {
        let buf = Buffer::allocate(Rect::new(0, 0, 4, 4), Format::RGBA_F32);
        let mut out = [0.0f32; 15];
        let err = buf
            .get(&Rect::new(0, 0, 2, 2), 1.0, Format::RGBA_F32, &mut out, 8, AbyssPolicy::None)
            .unwrap_err();
        assert!(err.is_storage_error());
        assert!(matches!(
            buf.read(&Rect::INFINITE, 0),
            Err(Error::InfiniteRect)
        ));
    }

    #[test]
    fn test_scaled_get_nearest() {
        let buf = Buffer::allocate(Rect::new(0, 0, 4, 4), Format::Y_F32);
        ramp(&buf, &Rect::new(0, 0, 4, 4));
        let mut out = [0.0f32; 4];
        buf.get(&Rect::new(0, 0, 2, 2), 0.5, Format::Y_F32, &mut out, 2, AbyssPolicy::None)
            .unwrap();
        // (dx + 0.5) / 0.5 -> 1, 3
        assert_eq!(out, [1001.0, 1003.0, 3001.0, 3003.0]);
    }

    #[test]
    fn test_level_write_voids_coarser() {
        let buf = Buffer::with_tile_size(Rect::new(0, 0, 32, 32), Format::Y_F32, 8);
        buf.write(&Rect::new(0, 0, 4, 4), 1, &[1.0; 16]).unwrap();
        buf.write(&Rect::new(0, 0, 2, 2), 2, &[2.0; 4]).unwrap();
        assert_eq!(buf.read(&Rect::new(0, 0, 1, 1), 2).unwrap(), vec![2.0]);

        // Writing level 0 underneath both voids them.
        buf.write(&Rect::new(0, 0, 1, 1), 0, &[9.0]).unwrap();
        assert_eq!(buf.read(&Rect::new(0, 0, 1, 1), 1).unwrap(), vec![0.0]);
        assert_eq!(buf.read(&Rect::new(0, 0, 1, 1), 2).unwrap(), vec![0.0]);
        assert_eq!(buf.read(&Rect::new(0, 0, 1, 1), 0).unwrap(), vec![9.0]);
    }

    #[test]
    fn test_copy_and_clear() {
        let src = Buffer::allocate(Rect::new(0, 0, 8, 8), Format::Y_F32);
        ramp(&src, &Rect::new(0, 0, 8, 8));
        let dst = Buffer::allocate(Rect::new(0, 0, 8, 8), Format::RGB_F32);
        Buffer::copy(&src, &Rect::new(1, 1, 2, 1), &dst, &Rect::new(5, 5, 0, 0)).unwrap();
        assert_eq!(
            dst.read(&Rect::new(5, 5, 2, 1), 0).unwrap(),
            vec![1001.0, 1001.0, 1001.0, 1002.0, 1002.0, 1002.0]
        );

        src.clear(Some(&Rect::new(0, 0, 1, 8)));
        let row = src.read(&Rect::new(0, 3, 2, 1), 0).unwrap();
        assert_eq!(row, vec![0.0, 3001.0]);
        src.clear(None);
        assert_eq!(src.tile_count(), 0);
    }

    #[test]
    fn test_sharing_and_fork_flag() {
        let a = Buffer::empty();
        let b = a.clone();
        assert!(Buffer::ptr_eq(&a, &b));
        assert!(!Buffer::ptr_eq(&a, &Buffer::empty()));
        assert!(!b.is_forked());
        a.mark_forked();
        assert!(b.is_forked());
        assert!(a.is_empty());
    }
}
