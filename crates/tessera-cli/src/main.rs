//! tessera - render and inspect YAML image-processing graphs

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tessera_core::Rect;
use tessera_graph::{CachePolicy, EngineConfig, Quality};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about = "Demand-driven image graph renderer")]
#[command(long_about = "
Builds a node graph from a YAML description and renders it on demand,
only computing the pixels the requested region depends on.

Examples:
  tessera info glow.yaml                     # List nodes in evaluation order
  tessera render glow.yaml -o glow.pfm       # Render the output node to PFM
  tessera render glow.yaml -o crop.pfm --rect 0,0,64,64 -n blur
  tessera detect glow.yaml 12 40             # Which node owns pixel (12, 40)
  TESSERA_CHUNK_SIZE=4096 tessera -v render save.yaml
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Worker bands and rayon threads (0 = from config)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,

    /// Engine configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Operation quality: fast, good, reference
    #[arg(short, long, global = true)]
    quality: Option<String>,

    /// Cache policy: always, never, auto
    #[arg(long, global = true)]
    cache: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the nodes of a graph and their bounding boxes
    #[command(visible_alias = "i")]
    Info(InfoArgs),

    /// Render a node of a graph
    #[command(visible_alias = "r")]
    Render(RenderArgs),

    /// Find the node responsible for a pixel
    #[command(visible_alias = "d")]
    Detect(DetectArgs),
}

#[derive(Args)]
struct InfoArgs {
    /// Graph description
    graph: PathBuf,

    /// Node to describe (defaults to the graph's output)
    #[arg(short, long)]
    node: Option<String>,
}

#[derive(Args)]
struct RenderArgs {
    /// Graph description
    graph: PathBuf,

    /// Output PFM file; required unless the rendered node is a sink
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Node to render (defaults to the graph's output)
    #[arg(short, long)]
    node: Option<String>,

    /// Region as x,y,width,height (defaults to the bounding box)
    #[arg(long, value_parser = parse_rect)]
    rect: Option<Rect>,

    /// Max pixels per processing step (overrides config)
    #[arg(long)]
    chunk: Option<u64>,
}

#[derive(Args)]
struct DetectArgs {
    /// Graph description
    graph: PathBuf,

    /// Pixel x
    #[arg(allow_negative_numbers = true)]
    x: i32,

    /// Pixel y
    #[arg(allow_negative_numbers = true)]
    y: i32,

    /// Node to start from (defaults to the graph's output)
    #[arg(short, long)]
    node: Option<String>,
}

/// Parses `x,y,width,height`.
fn parse_rect(s: &str) -> Result<Rect, String> {
    let parts: Vec<i32> = s
        .split(',')
        .map(|p| p.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid rect '{s}': {e}"))?;
    match parts.as_slice() {
        [x, y, w, h] if *w >= 0 && *h >= 0 => Ok(Rect::new(*x, *y, *w, *h)),
        [_, _, _, _] => Err(format!("negative size in rect '{s}'")),
        _ => Err(format!("expected x,y,width,height, got '{s}'")),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves the engine configuration: defaults, file, environment, flags.
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config = config
        .with_env_overrides()
        .context("Invalid TESSERA_* environment")?;
    if cli.threads > 0 {
        config.threads = cli.threads;
    }
    if let Some(q) = &cli.quality {
        config.quality = q.parse::<Quality>()?;
    }
    if let Some(c) = &cli.cache {
        config.cache_policy = c.parse::<CachePolicy>()?;
    }
    if let Commands::Render(args) = &cli.command {
        if let Some(chunk) = args.chunk {
            if chunk == 0 {
                bail!("--chunk must be positive");
            }
            config.chunk_size = chunk;
        }
    }
    Ok(config.normalized())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;

    // Configure thread pool
    if config.threads > 1 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let verbose = cli.verbose > 0;
    match cli.command {
        Commands::Info(args) => commands::info::run(args, config, verbose),
        Commands::Render(args) => commands::render::run(args, config, verbose),
        Commands::Detect(args) => commands::detect::run(args, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rect() {
        assert_eq!(parse_rect("1,2,3,4").unwrap(), Rect::new(1, 2, 3, 4));
        assert_eq!(parse_rect(" -5, 0, 10, 10").unwrap(), Rect::new(-5, 0, 10, 10));
        assert!(parse_rect("1,2,3").is_err());
        assert!(parse_rect("0,0,-1,4").is_err());
        assert!(parse_rect("a,b,c,d").is_err());
    }

    #[test]
    fn test_cli_flags_override_config() {
        let cli = Cli::parse_from([
            "tessera", "-j", "3", "--quality", "reference", "--cache", "never", "render", "g.yaml",
            "--chunk", "1000",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.threads, 3);
        assert_eq!(config.quality, Quality::Reference);
        assert_eq!(config.cache_policy, CachePolicy::Never);
        assert_eq!(config.chunk_size, 1000);
    }

    #[test]
    fn test_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "tile_size: 32\nmipmap_rendering: true\n").unwrap();
        let cli = Cli::parse_from(["tessera", "--config", path.to_str().unwrap(), "info", "g.yaml"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.tile_size, 32);
        assert!(config.mipmap_rendering);
    }

    #[test]
    fn test_render_replaces_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let graph = dir.path().join("flat.yaml");
        std::fs::write(
            &graph,
            "nodes:\n  - name: flat\n    op: { type: color, color: [1, 0, 0, 1], extent: [0, 0, 4, 4] }\noutput: flat\n",
        )
        .unwrap();
        let out = dir.path().join("flat.pfm");
        std::fs::write(&out, b"stale").unwrap();

        let cli = Cli::parse_from([
            "tessera",
            "render",
            graph.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ]);
        let config = load_config(&cli).unwrap();
        let Commands::Render(args) = cli.command else {
            panic!("expected render");
        };
        commands::render::run(args, config, false).unwrap();
        assert!(std::fs::read(&out).unwrap().starts_with(b"PF\n4 4\n"));
    }
}
