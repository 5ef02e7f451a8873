//! Named operation factories.
//!
//! Several implementations may be registered under one name, keyed by
//! [`Quality`]. [`OperationRegistry::create`] picks the entry matching the
//! registry's active quality, falling back to the nearest registered one.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tessera_graph::{Nop, Operation, OperationRegistry, Quality};
//!
//! let mut registry = OperationRegistry::new();
//! registry.register("nop", Quality::Good, Arc::new(|| Box::new(Nop) as Box<dyn Operation>));
//! assert!(registry.create("nop").is_ok());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{GraphError, GraphResult};
use crate::operation::Operation;

/// Speed/accuracy trade-off used to choose between implementations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Fastest, approximate.
    Fast,
    /// Balanced default.
    #[default]
    Good,
    /// Slow, exact.
    Reference,
}

impl Quality {
    /// All levels, lowest first.
    pub const ALL: [Quality; 3] = [Quality::Fast, Quality::Good, Quality::Reference];

    /// Lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Good => "good",
            Self::Reference => "reference",
        }
    }

    fn rank(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "good" => Ok(Self::Good),
            "reference" | "ref" => Ok(Self::Reference),
            other => Err(GraphError::config(format!("unknown quality '{other}'"))),
        }
    }
}

/// Creates a fresh operation instance.
pub type OperationFactory = Arc<dyn Fn() -> Box<dyn Operation> + Send + Sync>;

/// Map from operation names to factories.
#[derive(Clone, Default)]
pub struct OperationRegistry {
    entries: BTreeMap<String, BTreeMap<Quality, OperationFactory>>,
    quality: Quality,
}

impl OperationRegistry {
    /// Creates an empty registry at [`Quality::Good`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry preferring `quality`.
    pub fn with_quality(quality: Quality) -> Self {
        Self {
            entries: BTreeMap::new(),
            quality,
        }
    }

    /// Active quality.
    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Changes the active quality.
    pub fn set_quality(&mut self, quality: Quality) {
        self.quality = quality;
    }

    /// Registers `factory` under `name` at `quality`, replacing any previous
    /// factory for the same pair.
    pub fn register(&mut self, name: impl Into<String>, quality: Quality, factory: OperationFactory) {
        let name = name.into();
        trace!(%name, %quality, "registering operation");
        self.entries.entry(name).or_default().insert(quality, factory);
    }

    /// Instantiates `name` at the active quality.
    pub fn create(&self, name: &str) -> GraphResult<Box<dyn Operation>> {
        self.create_with_quality(name, self.quality)
    }

    /// Instantiates `name`, preferring `quality`.
    pub fn create_with_quality(&self, name: &str, quality: Quality) -> GraphResult<Box<dyn Operation>> {
        let variants = self
            .entries
            .get(name)
            .ok_or_else(|| GraphError::UnknownOperation(name.to_string()))?;
        let chosen = Self::resolve_quality(variants, quality)
            .ok_or_else(|| GraphError::UnknownOperation(name.to_string()))?;
        Ok((variants[&chosen])())
    }

    /// Exact match, else the nearest registered level; ties go to the
    /// higher quality.
    fn resolve_quality(variants: &BTreeMap<Quality, OperationFactory>, wanted: Quality) -> Option<Quality> {
        if variants.contains_key(&wanted) {
            return Some(wanted);
        }
        variants
            .keys()
            .copied()
            .min_by_key(|q| ((q.rank() - wanted.rank()).abs(), -q.rank()))
    }

    /// Returns `true` if `name` is registered at any quality.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Qualities registered for `name`, lowest first.
    pub fn qualities(&self, name: &str) -> Vec<Quality> {
        self.entries
            .get(name)
            .map(|v| v.keys().copied().collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .field("quality", &self.quality)
            .finish()
    }
}
