//! Meta operations: subgraphs assembled from built-in operations.

use tessera_graph::prelude::*;
use tracing::debug;

use crate::area::BoxBlur;
use crate::compose::{Blend, BlendMode};
use crate::point::Multiply;

/// Adds a soft-glow subgraph with one `input` pad.
///
/// The input is blurred by `radius`, scaled by `strength` and screened back
/// onto itself. The returned node wires like any leaf.
pub fn soft_glow(graph: &mut Graph, radius: i32, strength: f32) -> GraphResult<NodeId> {
    let glow = graph.add_subgraph("tessera:soft-glow", &["input"]);
    let input = graph.input_proxy(glow, "input")?;
    let output = graph.output_proxy(glow)?;

    let blur = graph.add_child(glow, BoxBlur::new(radius))?;
    let gain = graph.add_child(glow, Multiply::new(strength))?;
    let screen = graph.add_child(glow, Blend::new(BlendMode::Screen))?;

    graph.link_many(&[input, blur, gain])?;
    graph.link(input, screen)?;
    graph.connect(gain, "output", screen, "aux")?;
    graph.link(screen, output)?;
    debug!(%glow, radius, strength, "soft glow assembled");
    Ok(glow)
}
