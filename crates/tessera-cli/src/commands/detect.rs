//! Pixel hit-test command.

use crate::DetectArgs;
use anyhow::Result;
use tessera_graph::EngineConfig;

/// Runs the detect command, printing the name of the node owning the pixel.
pub fn run(args: DetectArgs, config: EngineConfig) -> Result<()> {
    let (graph, built) = super::load_graph(&args.graph, config)?;
    let node = super::pick_node(&built, args.node.as_deref())?;
    graph.prepare(node);
    match graph.detect(node, args.x, args.y) {
        Some(hit) => println!("{}", graph.name(hit).unwrap_or("?")),
        None => println!("(none)"),
    }
    Ok(())
}
