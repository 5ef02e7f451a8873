//! CLI command implementations

pub mod detect;
pub mod info;
pub mod render;

use anyhow::{Context, Result, bail};
use std::path::Path;
use tessera_graph::{EngineConfig, Graph, NodeId};
use tessera_ops::{BuiltGraph, GraphSpec};

/// Loads a graph description and builds it into a fresh graph.
pub fn load_graph(path: &Path, config: EngineConfig) -> Result<(Graph, BuiltGraph)> {
    let spec = GraphSpec::from_file(path)
        .with_context(|| format!("Failed to load: {}", path.display()))?;
    let quality = config.quality;
    let mut graph = Graph::with_config(config);
    let built = spec
        .build(&mut graph, quality)
        .with_context(|| format!("Failed to build: {}", path.display()))?;
    Ok((graph, built))
}

/// Node named `name`, or the description's output node.
pub fn pick_node(built: &BuiltGraph, name: Option<&str>) -> Result<NodeId> {
    match name {
        Some(n) => Ok(built.node(n)?),
        None => match built.output {
            Some(id) => Ok(id),
            None => bail!("graph declares no output; pass --node"),
        },
    }
}
