//! # tessera-ops
//!
//! Reference operations for the tessera graph engine.
//!
//! One or more operations exist for every operation kind, so the engine's
//! contracts can be exercised end to end.
//!
//! # Modules
//!
//! - [`source`] - Constant color and checkerboard
//! - [`point`] - Invert and multiply, processed in place when possible
//! - [`area`] - Box blur with an expanding region of interest
//! - [`stats`] - Normalization over the whole input
//! - [`geometry`] - Crop
//! - [`compose`] - Blend modes and masked mixing
//! - [`sink`] - Buffer and PFM file sinks
//! - [`meta`] - Subgraphs built from the above
//! - [`description`] - YAML graph descriptions
//!
//! # Example
//!
//! ```rust
//! use tessera_graph::prelude::*;
//! use tessera_ops::prelude::*;
//!
//! let mut graph = Graph::new();
//! let src = graph.add_node(Checkerboard::new(8));
//! let blur = graph.add_node(BoxBlur::new(2));
//! graph.link(src, blur).unwrap();
//!
//! let roi = Rect::new(0, 0, 16, 16);
//! let out = graph.apply(blur, &roi, 0).unwrap();
//! assert_eq!(out.read(&roi, 0).unwrap().len(), 16 * 16 * 4);
//! ```
//!
//! ## Registry
//!
//! ```rust
//! use tessera_graph::{Operation, OperationRegistry, Quality};
//!
//! let mut registry = OperationRegistry::with_quality(Quality::Reference);
//! tessera_ops::register_builtins(&mut registry);
//! let op = registry.create("tessera:box-blur").unwrap();
//! assert_eq!(op.name(), "tessera:box-blur");
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod error;
mod pixel;

pub mod area;
pub mod compose;
pub mod description;
pub mod geometry;
pub mod meta;
pub mod point;
pub mod sink;
pub mod source;
pub mod stats;

use std::sync::Arc;

use tessera_graph::{Operation, OperationRegistry, Quality};

pub use area::{BlurMethod, BoxBlur};
pub use compose::{Blend, BlendMode, MaskBlend};
pub use description::{BuiltGraph, GraphSpec, LinkSpec, NodeSpec, OpSpec};
pub use error::{OpsError, OpsResult};
pub use geometry::Crop;
pub use pixel::{map_pixels, over_pixel, zip_pixels};
pub use point::{Invert, Multiply};
pub use sink::{BufferSink, PfmSink};
pub use source::{Checkerboard, Color};
pub use stats::Normalize;
pub use tessera_graph::Nop;

/// Registers every parameterless-constructible operation under its
/// operation name.
///
/// The box blur is registered twice: separable for [`Quality::Good`],
/// direct for [`Quality::Reference`].
pub fn register_builtins(registry: &mut OperationRegistry) {
    fn factory<O, F>(f: F) -> tessera_graph::OperationFactory
    where
        O: Operation,
        F: Fn() -> O + Send + Sync + 'static,
    {
        Arc::new(move || Box::new(f()) as Box<dyn Operation>)
    }

    registry.register("tessera:color", Quality::Good, factory(|| Color::new([0.0, 0.0, 0.0, 1.0])));
    registry.register("tessera:checkerboard", Quality::Good, factory(Checkerboard::default));
    registry.register("tessera:invert", Quality::Good, factory(|| Invert));
    registry.register("tessera:multiply", Quality::Good, factory(Multiply::default));
    registry.register("tessera:box-blur", Quality::Good, factory(BoxBlur::default));
    registry.register("tessera:box-blur", Quality::Reference, factory(|| BoxBlur::direct(4)));
    registry.register("tessera:normalize", Quality::Good, factory(|| Normalize));
    registry.register("tessera:crop", Quality::Good, factory(|| Crop::new(tessera_core::Rect::INFINITE)));
    registry.register("tessera:blend", Quality::Good, factory(Blend::default));
    registry.register("tessera:mask-blend", Quality::Good, factory(|| MaskBlend));
    registry.register("tessera:nop", Quality::Good, factory(|| Nop));
}

/// Prelude for common imports.
pub mod prelude {
    pub use crate::area::BoxBlur;
    pub use crate::compose::{Blend, BlendMode, MaskBlend};
    pub use crate::description::GraphSpec;
    pub use crate::error::{OpsError, OpsResult};
    pub use crate::geometry::Crop;
    pub use crate::meta::soft_glow;
    pub use crate::point::{Invert, Multiply};
    pub use crate::sink::{BufferSink, PfmSink};
    pub use crate::source::{Checkerboard, Color};
    pub use crate::stats::Normalize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_graph::Graph;

    #[test]
    fn test_builtins_resolve_quality() {
        let mut registry = OperationRegistry::new();
        register_builtins(&mut registry);
        assert!(registry.contains("tessera:normalize"));

        let mut g = Graph::new();
        let good = g.add_from_registry(&registry, "tessera:box-blur").unwrap();
        assert_eq!(g.operation::<BoxBlur>(good).unwrap().method, BlurMethod::Separable);

        registry.set_quality(Quality::Reference);
        let reference = g.add_from_registry(&registry, "tessera:box-blur").unwrap();
        assert_eq!(g.operation::<BoxBlur>(reference).unwrap().method, BlurMethod::Direct);

        // Only Good is registered for invert; Fast falls back to it.
        registry.set_quality(Quality::Fast);
        assert!(registry.create("tessera:invert").is_ok());
        assert!(registry.create("tessera:warp").is_err());
    }
}
