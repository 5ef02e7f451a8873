//! Scanline region algebra.
//!
//! A [`Region`] is an arbitrary set of pixels stored as a sorted list of
//! horizontal bands, each band holding sorted, non-touching x-spans:
//!
//! ```text
//!   y1 ─┬─────────────────────────────────────┐
//!       │  [x1 ── x2)      [x1 ─────── x2)    │  band 0
//!   y2 ─┼─────────────────────────────────────┤
//!       │         [x1 ───────────── x2)       │  band 1
//!   y3 ─┴─────────────────────────────────────┘
//! ```
//!
//! Every mutating operation renormalizes:
//!
//! - spans that touch or overlap within a band are merged,
//! - vertically adjacent bands with identical span lists are merged,
//! - an empty region has no bands.
//!
//! The normalized form is canonical, so structural equality is set
//! equality. Cost is proportional to the number of bands and spans of the
//! operands and never to the pixel area.
//!
//! # Usage
//!
//! ```rust
//! use tessera_core::{Overlap, Rect, Region};
//!
//! let mut valid = Region::new();
//! valid.union_with_rect(&Rect::new(0, 0, 64, 32));
//! valid.union_with_rect(&Rect::new(0, 32, 64, 32));
//! assert_eq!(valid.band_count(), 1);
//!
//! assert_eq!(valid.rect_in(&Rect::new(8, 8, 8, 8)), Overlap::In);
//! assert_eq!(valid.rect_in(&Rect::new(60, 60, 8, 8)), Overlap::Part);
//! assert_eq!(valid.rect_in(&Rect::new(100, 0, 8, 8)), Overlap::Out);
//! ```
//!
//! # Used By
//!
//! - `tessera-graph::cache` - valid region per mip level
//! - `tessera-graph::processor` - queued and valid regions

use crate::rect::Rect;

/// Result of testing a rectangle against a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    /// The rectangle lies entirely inside the region.
    In,
    /// The rectangle shares no pixel with the region.
    Out,
    /// The rectangle is partially covered.
    Part,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    x1: i32,
    x2: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Band {
    y1: i32,
    y2: i32,
    spans: Vec<Span>,
}

#[derive(Debug, Clone, Copy)]
enum SetOp {
    Union,
    Intersect,
    Subtract,
    Xor,
}

impl SetOp {
    #[inline]
    fn apply(self, a: bool, b: bool) -> bool {
        match self {
            SetOp::Union => a || b,
            SetOp::Intersect => a && b,
            SetOp::Subtract => a && !b,
            SetOp::Xor => a != b,
        }
    }
}

/// A set of pixels stored as normalized y-bands of x-spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    bands: Vec<Band>,
}

impl Region {
    /// Creates an empty region.
    #[inline]
    pub fn new() -> Self {
        Self { bands: Vec::new() }
    }

    /// Creates a region covering exactly `rect`.
    pub fn from_rect(rect: &Rect) -> Self {
        if rect.is_empty() {
            return Self::new();
        }
        Self {
            bands: vec![Band {
                y1: rect.y,
                y2: rect.bottom(),
                spans: vec![Span {
                    x1: rect.x,
                    x2: rect.right(),
                }],
            }],
        }
    }

    /// Returns `true` if the region contains no pixel.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Number of y-bands in the normalized representation.
    #[inline]
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Total pixel count.
    pub fn area(&self) -> u64 {
        self.iter_rects().map(|r| r.area()).sum()
    }

    /// Removes every pixel.
    #[inline]
    pub fn clear(&mut self) {
        self.bands.clear();
    }

    /// In-place union with `other`.
    pub fn union(&mut self, other: &Region) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            self.bands = other.bands.clone();
            return;
        }
        *self = combine(&self.bands, &other.bands, SetOp::Union);
    }

    /// In-place union with a single rectangle.
    pub fn union_with_rect(&mut self, rect: &Rect) {
        if rect.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = Self::from_rect(rect);
            return;
        }
        let band = [Band {
            y1: rect.y,
            y2: rect.bottom(),
            spans: vec![Span {
                x1: rect.x,
                x2: rect.right(),
            }],
        }];
        *self = combine(&self.bands, &band, SetOp::Union);
    }

    /// In-place intersection with `other`.
    pub fn intersect(&mut self, other: &Region) {
        if self.is_empty() || other.is_empty() {
            self.clear();
            return;
        }
        *self = combine(&self.bands, &other.bands, SetOp::Intersect);
    }

    /// In-place subtraction of `other`.
    pub fn subtract(&mut self, other: &Region) {
        if self.is_empty() || other.is_empty() {
            return;
        }
        *self = combine(&self.bands, &other.bands, SetOp::Subtract);
    }

    /// In-place symmetric difference with `other`.
    pub fn xor(&mut self, other: &Region) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            self.bands = other.bands.clone();
            return;
        }
        *self = combine(&self.bands, &other.bands, SetOp::Xor);
    }

    /// Tests how `rect` is covered by the region.
    ///
    /// An empty rectangle is reported as [`Overlap::Out`].
    pub fn rect_in(&self, rect: &Rect) -> Overlap {
        if rect.is_empty() || self.is_empty() {
            return Overlap::Out;
        }
        let (rx1, ry1, rx2, ry2) = (rect.x, rect.y, rect.right(), rect.bottom());

        let mut part_in = false;
        let mut part_out = false;
        let mut covered_to = ry1;

        let start = self.bands.partition_point(|b| b.y2 <= ry1);
        for band in &self.bands[start..] {
            if band.y1 >= ry2 {
                break;
            }
            if band.y1 > covered_to {
                part_out = true;
            }
            covered_to = band.y2;

            let first = band.spans.partition_point(|s| s.x2 <= rx1);
            match band.spans.get(first) {
                Some(span) if span.x1 < rx2 => {
                    part_in = true;
                    if span.x1 > rx1 || span.x2 < rx2 {
                        part_out = true;
                    }
                }
                _ => part_out = true,
            }
            if part_in && part_out {
                return Overlap::Part;
            }
        }
        if covered_to < ry2 {
            part_out = true;
        }
        match (part_in, part_out) {
            (false, _) => Overlap::Out,
            (true, false) => Overlap::In,
            (true, true) => Overlap::Part,
        }
    }

    /// Returns `true` if the pixel `(x, y)` is in the region.
    pub fn point_in(&self, x: i32, y: i32) -> bool {
        let idx = self.bands.partition_point(|b| b.y2 <= y);
        let Some(band) = self.bands.get(idx) else {
            return false;
        };
        if band.y1 > y {
            return false;
        }
        let s = band.spans.partition_point(|s| s.x2 <= x);
        band.spans.get(s).is_some_and(|span| span.x1 <= x)
    }

    /// Bounding box of all pixels, [`Rect::EMPTY`] for an empty region.
    pub fn clipbox(&self) -> Rect {
        let (Some(first), Some(last)) = (self.bands.first(), self.bands.last()) else {
            return Rect::EMPTY;
        };
        let mut x1 = i32::MAX;
        let mut x2 = i32::MIN;
        for band in &self.bands {
            if let (Some(a), Some(b)) = (band.spans.first(), band.spans.last()) {
                x1 = x1.min(a.x1);
                x2 = x2.max(b.x2);
            }
        }
        Rect::from_corners(x1, first.y1, x2, last.y2)
    }

    /// Iterates the rectangle decomposition, ordered by band then by x.
    pub fn iter_rects(&self) -> impl Iterator<Item = Rect> + '_ {
        self.bands.iter().flat_map(|band| {
            band.spans
                .iter()
                .map(move |s| Rect::new(s.x1, band.y1, s.x2 - s.x1, band.y2 - band.y1))
        })
    }

    /// Collects the rectangle decomposition.
    pub fn rectangles(&self) -> Vec<Rect> {
        self.iter_rects().collect()
    }

    /// Translates the whole region by `(dx, dy)`.
    pub fn offset(&mut self, dx: i32, dy: i32) {
        for band in &mut self.bands {
            band.y1 = band.y1.saturating_add(dy);
            band.y2 = band.y2.saturating_add(dy);
            for span in &mut band.spans {
                span.x1 = span.x1.saturating_add(dx);
                span.x2 = span.x2.saturating_add(dx);
            }
        }
    }

    /// Erodes the region by `dx` columns on the left and right and `dy`
    /// rows on the top and bottom. Negative amounts dilate instead.
    ///
    /// ```rust
    /// use tessera_core::{Rect, Region};
    ///
    /// let mut r = Region::from_rect(&Rect::new(0, 0, 10, 10));
    /// r.shrink(2, 1);
    /// assert_eq!(r.rectangles(), vec![Rect::new(2, 1, 6, 8)]);
    /// r.shrink(-2, -1);
    /// assert_eq!(r.rectangles(), vec![Rect::new(0, 0, 10, 10)]);
    /// ```
    pub fn shrink(&mut self, dx: i32, dy: i32) {
        if self.is_empty() {
            return;
        }
        if dx != 0 {
            morph_axis(self, dx, true);
        }
        if dy != 0 {
            morph_axis(self, dy, false);
        }
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::from_rect(&rect)
    }
}

impl FromIterator<Rect> for Region {
    fn from_iter<I: IntoIterator<Item = Rect>>(iter: I) -> Self {
        let mut region = Region::new();
        for rect in iter {
            region.union_with_rect(&rect);
        }
        region
    }
}

// ============================================================================
// Sweep
// ============================================================================

/// Combines two band lists over every y-interval between band edges.
fn combine(a: &[Band], b: &[Band], op: SetOp) -> Region {
    let mut ys: Vec<i32> = a
        .iter()
        .chain(b.iter())
        .flat_map(|band| [band.y1, band.y2])
        .collect();
    ys.sort_unstable();
    ys.dedup();

    let mut out = Region::new();
    let (mut ia, mut ib) = (0usize, 0usize);
    for w in ys.windows(2) {
        let (y1, y2) = (w[0], w[1]);
        while ia < a.len() && a[ia].y2 <= y1 {
            ia += 1;
        }
        while ib < b.len() && b[ib].y2 <= y1 {
            ib += 1;
        }
        let sa: &[Span] = match a.get(ia) {
            Some(band) if band.y1 <= y1 => &band.spans,
            _ => &[],
        };
        let sb: &[Span] = match b.get(ib) {
            Some(band) if band.y1 <= y1 => &band.spans,
            _ => &[],
        };
        let spans = combine_spans(sa, sb, op);
        push_band(&mut out.bands, y1, y2, spans);
    }
    out
}

/// Combines the span lists of one y-interval.
fn combine_spans(a: &[Span], b: &[Span], op: SetOp) -> Vec<Span> {
    let mut xs: Vec<i32> = a
        .iter()
        .chain(b.iter())
        .flat_map(|s| [s.x1, s.x2])
        .collect();
    xs.sort_unstable();
    xs.dedup();

    let mut out: Vec<Span> = Vec::new();
    let (mut ia, mut ib) = (0usize, 0usize);
    for w in xs.windows(2) {
        let (x1, x2) = (w[0], w[1]);
        while ia < a.len() && a[ia].x2 <= x1 {
            ia += 1;
        }
        while ib < b.len() && b[ib].x2 <= x1 {
            ib += 1;
        }
        let in_a = a.get(ia).is_some_and(|s| s.x1 <= x1);
        let in_b = b.get(ib).is_some_and(|s| s.x1 <= x1);
        if !op.apply(in_a, in_b) {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.x2 == x1 => last.x2 = x2,
            _ => out.push(Span { x1, x2 }),
        }
    }
    out
}

/// Appends a band, merging it into the previous one when they touch and
/// carry identical spans.
fn push_band(bands: &mut Vec<Band>, y1: i32, y2: i32, spans: Vec<Span>) {
    if spans.is_empty() || y2 <= y1 {
        return;
    }
    if let Some(last) = bands.last_mut() {
        if last.y2 == y1 && last.spans == spans {
            last.y2 = y2;
            return;
        }
    }
    bands.push(Band { y1, y2, spans });
}

// ============================================================================
// Morphology
// ============================================================================

fn shifted(region: &Region, by: i32, horizontal: bool) -> Region {
    let mut r = region.clone();
    if horizontal {
        r.offset(by, 0);
    } else {
        r.offset(0, by);
    }
    r
}

/// Erodes (`amount > 0`) or dilates (`amount < 0`) along one axis.
///
/// The structuring element spans `2 * |amount| + 1` pixels, built up by
/// doubling so the number of region operations is logarithmic in `amount`.
fn morph_axis(region: &mut Region, amount: i32, horizontal: bool) {
    let erode = amount > 0;
    let d = amount.unsigned_abs() as i64;
    let target = 2 * d + 1;

    let mut acc = region.clone();
    let mut len: i64 = 1;
    while len < target {
        let step = len.min(target - len) as i32;
        if erode {
            let other = shifted(&acc, -step, horizontal);
            acc.intersect(&other);
        } else {
            let other = shifted(&acc, step, horizontal);
            acc.union(&other);
        }
        len += step as i64;
        if acc.is_empty() {
            break;
        }
    }
    let d = d as i32;
    if erode {
        *region = shifted(&acc, d, horizontal);
    } else {
        *region = shifted(&acc, -d, horizontal);
    }
}
