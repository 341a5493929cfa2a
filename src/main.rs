use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use forcegraph::{
    ExecutorPreference, ExecutorStatus, PositionEntry, SimulationController, SimulationParameters,
    TopologyPayload,
};

/// 3D force-directed layout for graph payloads.
#[derive(Parser)]
#[command(name = "forcegraph")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Settle a topology and write node positions as JSON
    Layout {
        /// Topology payload (.json) with `nodes` and `edges`
        #[arg(short, long)]
        input: PathBuf,

        /// Parameter overrides (.json), flat or nested
        #[arg(short, long)]
        params: Option<PathBuf>,

        /// Extra ticks to run after the settle iterations
        #[arg(short, long, default_value = "0")]
        ticks: u32,

        /// Executor strategy
        #[arg(short, long, value_enum, default_value = "auto")]
        executor: ExecutorArg,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the lowest-weight path between two nodes
    Path {
        /// Topology payload (.json) with `nodes` and `edges`
        #[arg(short, long)]
        input: PathBuf,

        /// Start node id
        #[arg(long)]
        from: String,

        /// End node id
        #[arg(long)]
        to: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExecutorArg {
    Auto,
    Sequential,
    Parallel,
}

impl From<ExecutorArg> for ExecutorPreference {
    fn from(arg: ExecutorArg) -> Self {
        match arg {
            ExecutorArg::Auto => ExecutorPreference::Auto,
            ExecutorArg::Sequential => ExecutorPreference::Sequential,
            ExecutorArg::Parallel => ExecutorPreference::Parallel,
        }
    }
}

/// Layout result written by `layout`
#[derive(Serialize)]
struct LayoutOutput<'a> {
    executor: &'a ExecutorStatus,
    ticks: u64,
    positions: Vec<PositionEntry>,
}

fn read_payload(path: &Path) -> anyhow::Result<TopologyPayload> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read topology {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid topology payload in {}", path.display()))
}

fn read_params(path: Option<&Path>) -> anyhow::Result<SimulationParameters> {
    let mut params = SimulationParameters::default();
    if let Some(path) = path {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read parameters {}", path.display()))?;
        let update: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("invalid parameter file {}", path.display()))?;
        params.merge(&update);
    }
    Ok(params)
}

fn layout(
    input: &Path,
    params: Option<&Path>,
    ticks: u32,
    executor: ExecutorArg,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let payload = read_payload(input)?;
    let params = read_params(params)?;

    let mut controller = SimulationController::new(params, executor.into());
    let (nodes, edges) = payload.into_specs(|size| size);
    controller.load_topology(nodes, edges)?;
    for _ in 0..ticks {
        controller.step();
    }

    let result = LayoutOutput {
        executor: controller.status(),
        ticks: controller.ticks(),
        positions: controller.positions(),
    };
    let json = serde_json::to_string_pretty(&result)?;

    match output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "Wrote {} positions to {}",
                result.positions.len(),
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

fn path(input: &Path, from: &str, to: &str) -> anyhow::Result<()> {
    let payload = read_payload(input)?;
    let (nodes, edges) = payload.into_specs(|size| size);
    let topology = forcegraph::GraphTopology::load(nodes, edges)?;
    let route = topology.shortest_path(from, to)?;
    println!("{}", route.join(" -> "));
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Layout {
            input,
            params,
            ticks,
            executor,
            output,
        } => layout(
            &input,
            params.as_deref(),
            ticks,
            executor,
            output.as_deref(),
        )?,
        Commands::Path { input, from, to } => path(&input, &from, &to)?,
    }

    Ok(())
}
