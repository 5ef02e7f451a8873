//! # tessera-core
//!
//! Core value types of the tessera image-graph engine.
//!
//! - [`Rect`] - integer rectangles with an infinite-plane sentinel
//! - [`Region`] - scanline region algebra used for valid/dirty tracking
//! - [`Format`] - opaque pixel format handles
//! - [`Buffer`] - sparse, tile-backed, multi-level pixel storage
//!
//! ## Crate Structure
//!
//! This crate has no internal dependencies. The evaluation engine and the
//! reference operations build on it:
//!
//! ```text
//! tessera-core (this crate)
//!    ^
//!    |
//!    +-- tessera-graph (nodes, caches, traversal, processor)
//!    +-- tessera-ops (reference operations)
//!    +-- tessera-cli
//! ```
//!
//! Rectangle and region computations are pure and never fail; only the
//! buffer and format collaborators return [`Result`].

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod buffer;
pub mod error;
pub mod format;
pub mod rect;
pub mod region;
pub mod sync;

pub use buffer::{AbyssPolicy, Buffer, DEFAULT_TILE_SIZE};
pub use error::{Error, Result};
pub use format::{Format, Layout};
pub use rect::{Axis, Rect};
pub use region::{Overlap, Region};

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```
/// use tessera_core::prelude::*;
///
/// let r = Region::from_rect(&Rect::new(0, 0, 4, 4));
/// assert_eq!(r.rect_in(&Rect::new(1, 1, 2, 2)), Overlap::In);
/// ```
pub mod prelude {
    pub use crate::buffer::{AbyssPolicy, Buffer};
    pub use crate::error::{Error, Result};
    pub use crate::format::Format;
    pub use crate::rect::Rect;
    pub use crate::region::{Overlap, Region};
}
