//! Render command.
//!
//! Sinks are driven directly. Any other node gets a PFM writer attached to
//! its output first.

use crate::RenderArgs;
use anyhow::{Context, Result, bail};
use std::path::Path;
use std::time::Instant;
use tessera_graph::{EngineConfig, OperationKind, Processor};
use tessera_ops::PfmSink;
use tracing::info;

/// Deletes a previous output so the existence check after rendering only
/// passes for a file written by this run.
fn remove_stale(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed previous output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Cannot replace {}", path.display())),
    }
}

/// Runs the render command.
pub fn run(args: RenderArgs, config: EngineConfig, verbose: bool) -> Result<()> {
    let (mut graph, built) = super::load_graph(&args.graph, config)?;
    let node = super::pick_node(&built, args.node.as_deref())?;

    let target = if graph.operation_kind(node) == Some(OperationKind::Sink) {
        if args.output.is_some() {
            bail!("{} is a sink; drop --output", graph.debug_name(node));
        }
        node
    } else {
        let Some(path) = &args.output else {
            bail!("--output is required to render {}", graph.debug_name(node));
        };
        remove_stale(path)?;
        let sink = graph.add_named("tessera:pfm-save", PfmSink::new(path.clone()));
        graph.link(node, sink)?;
        sink
    };

    let bbox = graph.prepare(node);
    if args.rect.is_none() && bbox.is_infinite() {
        bail!("{} is unbounded; pass --rect", graph.debug_name(node));
    }

    let started = Instant::now();
    let mut processor = Processor::new(&graph, target, args.rect)
        .with_context(|| format!("Cannot render {}", graph.debug_name(node)))?;
    let rect = processor.rectangle();
    let mut progress = 0.0;
    let mut steps = 0usize;
    while processor.work(&graph, Some(&mut progress))? {
        steps += 1;
        if verbose {
            eprint!("\r  {:>5.1}%", progress * 100.0);
        }
    }
    if verbose {
        eprintln!("\r  100.0%");
    }
    info!(%rect, steps, elapsed = ?started.elapsed(), "render finished");

    if let Some(path) = &args.output {
        if !path.exists() {
            bail!("Failed to save: {} (see log)", path.display());
        }
        println!("{} -> {} ({}x{})", args.graph.display(), path.display(), rect.width, rect.height);
    } else {
        println!("{} rendered ({}x{})", graph.debug_name(node), rect.width, rect.height);
    }
    Ok(())
}
