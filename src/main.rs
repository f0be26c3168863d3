use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use env_logger::Builder;
use log::{LevelFilter, info};

use distfeed::Engine;
use distfeed::FeedConfig;
use distfeed::mobility::{FixedDistances, Point, PositionSource, SnapshotFile, WithFixedNode};

/// Feed per-pair node distances from a recorded trace into named pipes.
#[derive(Parser, Debug)]
#[command(name = "distfeed", version)]
struct Args {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON-lines trace, one snapshot of `[x, y]` positions per line.
    #[arg(long)]
    snapshots: PathBuf,

    /// Prepend a fixed node 0 at `x,y`; trace nodes become 1..=N.
    #[arg(long, value_parser = parse_point)]
    fixed_node: Option<Point>,

    /// Constant distances of auxiliary fixed devices, appended after all other nodes.
    #[arg(long, value_delimiter = ',')]
    fixed_distance: Vec<f64>,
}

fn parse_point(value: &str) -> Result<Point, String> {
    let (x, y) = value.split_once(',').ok_or_else(|| format!("expected x,y but got {:?}", value))?;
    let x = x.trim().parse::<f64>().map_err(|e| format!("invalid x: {}", e))?;
    let y = y.trim().parse::<f64>().map_err(|e| format!("invalid y: {}", e))?;
    Ok(Point::new(x, y))
}

fn main() -> anyhow::Result<()> {
    Builder::new().filter_level(LevelFilter::Info).parse_default_env().init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => FeedConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => FeedConfig::default(),
    };

    let trace = SnapshotFile::open(&args.snapshots).context("Failed to open position trace")?;
    let source: Box<dyn PositionSource> = match args.fixed_node {
        Some(position) => Box::new(WithFixedNode::new(trace, position)),
        None => Box::new(trace),
    };
    let fixed = FixedDistances::new(args.fixed_distance);
    if source.node_count() + fixed.len() < 2 {
        bail!("At least two nodes are needed to form a pair");
    }

    let engine = Engine::new(config).context("Failed to prepare pipe directory")?;
    // The consumer is pointed at this path by whoever orchestrates the run.
    println!("{}", engine.control_path().display());
    info!("Control channel: {}", engine.control_path().display());

    let report = engine.run(source, fixed).context("Distance feed startup failed")?;
    info!("Delivered {} samples over {} channels", report.delivered(), report.pairs.len());
    Ok(())
}
