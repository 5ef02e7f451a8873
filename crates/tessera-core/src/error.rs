//! Error types for tessera-core operations.
//!
//! Rectangle and region computations are pure and cannot fail; the errors
//! here come from the buffer and format collaborators, where a caller can
//! hand in a destination slice that is too small or a rowstride that does
//! not fit the requested rectangle.
//!
//! # Dependencies
//!
//! - [`thiserror`] - For derive macro error implementation
//!
//! # Used By
//!
//! - [`crate::buffer::Buffer`] - `get`/`set` argument checks
//! - [`crate::format::Format`] - sample conversion
//! - `tessera-graph` - wrapped into `GraphError`

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the buffer and format collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// A rectangle with negative dimensions was handed in.
    #[error("invalid rectangle ({x}, {y}, {width}x{height})")]
    InvalidRect {
        /// Left edge
        x: i32,
        /// Top edge
        y: i32,
        /// Width
        width: i32,
        /// Height
        height: i32,
    },

    /// A caller-provided slice cannot hold the requested pixels.
    #[error("buffer too small: need {needed} samples, got {got}")]
    BufferSize {
        /// Samples required
        needed: usize,
        /// Samples provided
        got: usize,
    },

    /// Rowstride is smaller than one row of the requested rectangle.
    #[error("rowstride {rowstride} is less than row length {row_len}")]
    InvalidRowstride {
        /// Provided rowstride, in samples
        rowstride: usize,
        /// Samples in one row
        row_len: usize,
    },

    /// An infinite rectangle was used where a finite one is required.
    #[error("operation requires a finite rectangle")]
    InfiniteRect,

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates an [`Error::BufferSize`] error.
    #[inline]
    pub fn buffer_size(needed: usize, got: usize) -> Self {
        Self::BufferSize { needed, got }
    }

    /// Creates an [`Error::Other`] error.
    #[inline]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Returns `true` if the error is caused by caller-provided storage.
    #[inline]
    pub fn is_storage_error(&self) -> bool {
        matches!(self, Self::BufferSize { .. } | Self::InvalidRowstride { .. })
    }
}
