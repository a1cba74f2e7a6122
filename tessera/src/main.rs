//! Distributed validator middleware node.

mod create_cluster;
mod node;

use clap::{Args, Parser, Subcommand};
use slog::Logger;
use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(
    name = "tessera",
    about = "Distributed validator middleware: runs one operator of a threshold-BLS validator cluster",
    version
)]
struct Tessera {
    /// Log verbosity: trace, debug, info, warn, error.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the operator node.
    Run(RunArgs),
    /// Creates a local simnet cluster: manifest, insecure key shares and
    /// deposit data.
    CreateCluster(CreateClusterArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Node data directory holding the cluster manifest and key shares.
    #[arg(long, default_value = "./tessera-data")]
    pub data_dir: PathBuf,

    /// This operator's 0-indexed position in the cluster.
    #[arg(long, default_value_t = 0)]
    pub node_index: usize,

    /// Beacon node HTTP endpoint.
    #[arg(long, default_value = "http://127.0.0.1:5052/")]
    pub beacon_node_url: String,

    /// Listen address of the validator-client-facing API.
    #[arg(long, default_value = "127.0.0.1:3600")]
    pub validator_api_addr: SocketAddr,

    /// Block graffiti (up to 32 bytes of UTF-8).
    #[arg(long)]
    pub graffiti: Option<String>,

    /// Slots after the duty slot before per-duty state is dropped.
    #[arg(long, default_value_t = 2)]
    pub duty_deadline_slots: u64,

    /// Enables builder-API (blinded) block production.
    #[arg(long)]
    pub builder_api: bool,

    /// Slot duration in seconds.
    #[arg(long, default_value_t = 12)]
    pub slot_duration_secs: u64,

    /// Disables BLS signature verification. Simnet testing only.
    #[arg(long)]
    pub insecure_keys: bool,
}

#[derive(Args)]
pub struct CreateClusterArgs {
    /// Output directory for the generated cluster.
    #[arg(long, default_value = "./tessera-data")]
    pub output_dir: PathBuf,

    /// Number of operator nodes.
    #[arg(long, default_value_t = 4)]
    pub nodes: usize,

    /// Signature threshold; defaults to the BFT quorum for the node count.
    #[arg(long)]
    pub threshold: Option<usize>,

    /// Number of distributed validators to create.
    #[arg(long, default_value_t = 1)]
    pub validators: usize,

    /// Fee recipient address for all validators (0x-hex, 20 bytes).
    #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
    pub fee_recipient: String,

    /// Withdrawal address for the deposit data (0x-hex, 20 bytes).
    #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
    pub withdrawal_address: String,

    /// Keygen seed, so simnets are reproducible.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

fn build_logger(level: &str) -> Result<Logger, String> {
    let severity = match level {
        "trace" => Severity::Trace,
        "debug" => Severity::Debug,
        "info" => Severity::Info,
        "warn" => Severity::Warning,
        "error" => Severity::Error,
        other => return Err(format!("unknown log level: {}", other)),
    };
    TerminalLoggerBuilder::new()
        .level(severity)
        .destination(Destination::Stderr)
        .build()
        .map_err(|e| format!("failed to build logger: {}", e))
}

fn main() {
    let cli = Tessera::parse();
    let log = match build_logger(&cli.log_level) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Run(args) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| format!("failed to start runtime: {}", e));
            match runtime {
                Ok(runtime) => runtime.block_on(node::run(args, log.clone())),
                Err(e) => Err(e),
            }
        }
        Command::CreateCluster(args) => create_cluster::run(args, log.clone()),
    };

    if let Err(e) = result {
        slog::crit!(log, "Exiting on error"; "error" => %e);
        drop(log);
        process::exit(1);
    }
}
