//! Graph info command.
//!
//! Prints the evaluation path of a node with bounding boxes and formats.

use crate::InfoArgs;
use anyhow::Result;
use tessera_graph::EngineConfig;

/// Runs the info command.
pub fn run(args: InfoArgs, config: EngineConfig, verbose: bool) -> Result<()> {
    let (graph, built) = super::load_graph(&args.graph, config)?;
    let node = super::pick_node(&built, args.node.as_deref())?;
    let bbox = graph.prepare(node);

    println!("{}", args.graph.display());
    println!("  Nodes:      {}", built.nodes.len());
    println!("  Node:       {}", graph.debug_name(node));
    if bbox.is_infinite() {
        println!("  Bounds:     infinite");
    } else {
        println!("  Bounds:     {bbox}");
        println!("  Pixels:     {}", bbox.area());
    }
    if let Some(format) = graph.format(node, "output") {
        println!("  Format:     {format}");
    }
    if verbose {
        println!("  Config:     {:?}", graph.config());
    }
    println!();
    print!("{}", graph.dump(node));
    Ok(())
}
