//! Axis-aligned integer rectangles.
//!
//! [`Rect`] is the currency of the whole engine: bounding boxes ("have
//! rects"), requests ("need rects"), dirty areas and tile extents are all
//! rectangles in level-0 pixel coordinates.
//!
//! # Coordinate System
//!
//! ```text
//! (0,0) ────────► X
//!   │
//!   │   ┌──────────┐
//!   │   │   Rect   │
//!   │   └──────────┘
//!   ▼
//!   Y
//! ```
//!
//! Left/top edges are inclusive, right/bottom edges exclusive. Coordinates
//! are signed: operations such as translation or blur legitimately produce
//! rectangles left of or above the origin.
//!
//! # The infinite plane
//!
//! Sources like a solid color fill have no natural extent. Their bounding
//! box is [`Rect::INFINITE`], a sentinel recognized by
//! [`Rect::is_infinite`]. Arithmetic that would overflow on the sentinel
//! (expansion, level scaling, alignment) returns the sentinel unchanged.
//!
//! # Usage
//!
//! ```rust
//! use tessera_core::Rect;
//!
//! let roi = Rect::new(50, 50, 10, 10);
//! let needed = roi.expand(5, 5);
//! assert_eq!(needed, Rect::new(45, 45, 20, 20));
//!
//! let clipped = needed.clip(&Rect::new(0, 0, 48, 48));
//! assert_eq!(clipped, Rect::new(45, 45, 3, 3));
//! ```
//!
//! # Used By
//!
//! - [`crate::region::Region`] - construction and decomposition
//! - [`crate::buffer::Buffer`] - extents and tile addressing
//! - `tessera-graph` - every rectangle negotiation between nodes

use std::fmt;

/// An axis-aligned rectangle `{x, y, width, height}`.
///
/// # Invariants
///
/// - `width` and `height` are never meaningfully negative; a rectangle with
///   a zero (or negative) dimension is empty.
/// - [`Rect::INFINITE`] is the only rectangle for which
///   [`is_infinite`](Rect::is_infinite) is `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(C)]
pub struct Rect {
    /// X coordinate of the left edge (inclusive)
    pub x: i32,
    /// Y coordinate of the top edge (inclusive)
    pub y: i32,
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
}

impl Rect {
    /// The empty rectangle at the origin.
    pub const EMPTY: Rect = Rect::new(0, 0, 0, 0);

    /// Sentinel for an unbounded plane.
    ///
    /// The right/bottom edges of this value still fit in an `i32`, so edge
    /// queries on it never overflow.
    pub const INFINITE: Rect = Rect::new(i32::MIN / 2, i32::MIN / 2, i32::MAX, i32::MAX);

    /// Creates a new rectangle with the given origin and dimensions.
    #[inline]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a rectangle at the origin with the given dimensions.
    #[inline]
    pub const fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Creates a rectangle from two corners, `(x1, y1)` inclusive and
    /// `(x2, y2)` exclusive. Swapped corners are normalized.
    ///
    /// ```rust
    /// use tessera_core::Rect;
    ///
    /// assert_eq!(Rect::from_corners(10, 20, 110, 70), Rect::new(10, 20, 100, 50));
    /// assert_eq!(Rect::from_corners(110, 70, 10, 20), Rect::new(10, 20, 100, 50));
    /// ```
    #[inline]
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        let (min_x, max_x) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let (min_y, max_y) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        Self::from_edges(min_x as i64, min_y as i64, max_x as i64, max_y as i64)
    }

    /// Builds a rectangle from 64-bit edges, clamping into `i32` range.
    fn from_edges(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        let clamp = |v: i64| v.clamp(i32::MIN as i64, i32::MAX as i64);
        let x1 = clamp(x1);
        let y1 = clamp(y1);
        let w = clamp((x2 - x1).max(0));
        let h = clamp((y2 - y1).max(0));
        Self::new(x1 as i32, y1 as i32, w as i32, h as i32)
    }

    /// Returns `true` for the [`Rect::INFINITE`] sentinel.
    #[inline]
    pub const fn is_infinite(&self) -> bool {
        self.x == Self::INFINITE.x
            && self.y == Self::INFINITE.y
            && self.width == Self::INFINITE.width
            && self.height == Self::INFINITE.height
    }

    /// X coordinate of the right edge (exclusive).
    #[inline]
    pub const fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Y coordinate of the bottom edge (exclusive).
    #[inline]
    pub const fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Area in pixels; zero for empty rectangles.
    #[inline]
    pub const fn area(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.width as u64 * self.height as u64
        }
    }

    /// Returns `true` if either dimension is zero or negative.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Returns `true` if the point `(px, py)` lies inside.
    #[inline]
    pub const fn contains_point(&self, px: i32, py: i32) -> bool {
        px >= self.x && py >= self.y && px < self.right() && py < self.bottom()
    }

    /// Returns `true` if `other` lies entirely inside this rectangle.
    ///
    /// An empty `other` is contained in anything.
    #[inline]
    pub fn contains_rect(&self, other: &Rect) -> bool {
        if other.is_empty() {
            return true;
        }
        if self.is_infinite() {
            return true;
        }
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Returns `true` if the two rectangles share at least one pixel.
    #[inline]
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.intersect(other).is_some()
    }

    /// Intersection of two rectangles, or `None` if they are disjoint.
    ///
    /// Intersecting with [`Rect::INFINITE`] returns the other rectangle.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        if self.is_empty() || other.is_empty() {
            return None;
        }
        if self.is_infinite() {
            return Some(*other);
        }
        if other.is_infinite() {
            return Some(*self);
        }
        let x1 = self.x.max(other.x) as i64;
        let y1 = self.y.max(other.y) as i64;
        let x2 = (self.x as i64 + self.width as i64).min(other.x as i64 + other.width as i64);
        let y2 = (self.y as i64 + self.height as i64).min(other.y as i64 + other.height as i64);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self::from_edges(x1, y1, x2, y2))
    }

    /// Intersection, collapsing to [`Rect::EMPTY`] when disjoint.
    #[inline]
    pub fn clip(&self, other: &Rect) -> Rect {
        self.intersect(other).unwrap_or_default()
    }

    /// Smallest rectangle containing both.
    ///
    /// Empty inputs are ignored; an infinite input yields the infinite plane.
    pub fn bounding_box(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        if self.is_infinite() || other.is_infinite() {
            return Self::INFINITE;
        }
        let x1 = self.x.min(other.x) as i64;
        let y1 = self.y.min(other.y) as i64;
        let x2 = (self.x as i64 + self.width as i64).max(other.x as i64 + other.width as i64);
        let y2 = (self.y as i64 + self.height as i64).max(other.y as i64 + other.height as i64);
        Self::from_edges(x1, y1, x2, y2)
    }

    /// Grows the rectangle by `dx` on the left and right and `dy` on the top
    /// and bottom. Negative amounts shrink it.
    pub fn expand(&self, dx: i32, dy: i32) -> Rect {
        if self.is_infinite() {
            return *self;
        }
        let x1 = self.x as i64 - dx as i64;
        let y1 = self.y as i64 - dy as i64;
        let x2 = self.x as i64 + self.width as i64 + dx as i64;
        let y2 = self.y as i64 + self.height as i64 + dy as i64;
        Self::from_edges(x1, y1, x2, y2)
    }

    /// Moves the rectangle by `(dx, dy)`.
    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        if self.is_infinite() {
            return *self;
        }
        Rect::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// Expands the rectangle so that all four edges sit on multiples of
    /// `grid`.
    ///
    /// ```rust
    /// use tessera_core::Rect;
    ///
    /// assert_eq!(Rect::new(3, 9, 10, 2).align_outward(8), Rect::new(0, 8, 16, 8));
    /// ```
    pub fn align_outward(&self, grid: i32) -> Rect {
        if self.is_infinite() || self.is_empty() || grid <= 1 {
            return *self;
        }
        let g = grid as i64;
        let x1 = (self.x as i64).div_euclid(g) * g;
        let y1 = (self.y as i64).div_euclid(g) * g;
        let x2 = -((-(self.x as i64 + self.width as i64)).div_euclid(g)) * g;
        let y2 = -((-(self.y as i64 + self.height as i64)).div_euclid(g)) * g;
        Self::from_edges(x1, y1, x2, y2)
    }

    /// Maps a level-0 rectangle onto the pixel grid of mip `level`,
    /// rounding outward so every touched level-0 pixel is covered.
    ///
    /// ```rust
    /// use tessera_core::Rect;
    ///
    /// assert_eq!(Rect::new(1, 1, 4, 4).to_level(1), Rect::new(0, 0, 3, 3));
    /// assert_eq!(Rect::new(-3, 0, 6, 8).to_level(2), Rect::new(-1, 0, 2, 2));
    /// ```
    pub fn to_level(&self, level: u32) -> Rect {
        if level == 0 || self.is_infinite() || self.is_empty() {
            return *self;
        }
        let level = level.min(31);
        let x1 = (self.x as i64) >> level;
        let y1 = (self.y as i64) >> level;
        let x2 = -((-(self.x as i64 + self.width as i64)) >> level);
        let y2 = -((-(self.y as i64 + self.height as i64)) >> level);
        Self::from_edges(x1, y1, x2, y2)
    }

    /// Maps a rectangle on the grid of mip `level` back to level-0
    /// coordinates.
    pub fn from_level(&self, level: u32) -> Rect {
        if level == 0 || self.is_infinite() || self.is_empty() {
            return *self;
        }
        let level = level.min(31);
        let x1 = (self.x as i64) << level;
        let y1 = (self.y as i64) << level;
        let x2 = (self.x as i64 + self.width as i64) << level;
        let y2 = (self.y as i64 + self.height as i64) << level;
        Self::from_edges(x1, y1, x2, y2)
    }

    /// Splits the rectangle at `offset` pixels from its origin along `axis`.
    ///
    /// The first half spans `offset` pixels (clamped to the rectangle), the
    /// second half holds the remainder and may be empty.
    ///
    /// ```rust
    /// use tessera_core::{Axis, Rect};
    ///
    /// let (a, b) = Rect::new(0, 0, 30, 10).split_at(Axis::X, 12);
    /// assert_eq!(a, Rect::new(0, 0, 12, 10));
    /// assert_eq!(b, Rect::new(12, 0, 18, 10));
    /// ```
    pub fn split_at(&self, axis: Axis, offset: i32) -> (Rect, Rect) {
        match axis {
            Axis::X => {
                let off = offset.clamp(0, self.width.max(0));
                (
                    Rect::new(self.x, self.y, off, self.height),
                    Rect::new(self.x + off, self.y, self.width - off, self.height),
                )
            }
            Axis::Y => {
                let off = offset.clamp(0, self.height.max(0));
                (
                    Rect::new(self.x, self.y, self.width, off),
                    Rect::new(self.x, self.y + off, self.width, self.height - off),
                )
            }
        }
    }

    /// The axis along which the rectangle is longer (`X` on ties).
    #[inline]
    pub const fn longer_axis(&self) -> Axis {
        if self.height > self.width { Axis::Y } else { Axis::X }
    }

    /// Iterates `(x, y)` over all pixels, row-major.
    ///
    /// The iterator is bounded by the rectangle's area; do not call this on
    /// the infinite plane.
    pub fn iter_coords(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        let (x, y, w, h) = (self.x, self.y, self.width.max(0), self.height.max(0));
        (0..h).flat_map(move |dy| (0..w).map(move |dx| (x + dx, y + dy)))
    }
}

/// Axis selector for [`Rect::split_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Horizontal (split by columns)
    X,
    /// Vertical (split by rows)
    Y,
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "(infinite)")
        } else {
            write!(f, "({}, {} {}x{})", self.x, self.y, self.width, self.height)
        }
    }
}

/// Computes the mip level whose resolution best serves `scale`.
///
/// `scale >= 1.0` maps to level 0; every halving adds a level.
///
/// ```rust
/// use tessera_core::rect::level_from_scale;
///
/// assert_eq!(level_from_scale(1.0), 0);
/// assert_eq!(level_from_scale(0.5), 1);
/// assert_eq!(level_from_scale(0.3), 1);
/// assert_eq!(level_from_scale(0.25), 2);
/// ```
pub fn level_from_scale(scale: f64) -> u32 {
    let mut level = 0;
    let mut s = scale;
    while s <= 0.5 + f64::EPSILON && level < 8 {
        s *= 2.0;
        level += 1;
    }
    level
}
