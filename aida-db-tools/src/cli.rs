//! Subcommand definitions. Deliberately minimal: one struct per operation,
//! each owning its own `run()` method. Grounded on
//! `tools/state-viewer/src/cli.rs`'s per-variant doc-comment style and
//! dispatch-by-match pattern, scaled down to the handful of operations this
//! crate exposes over the `aida-db` library.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Parser)]
#[command(name = "aida-db-tools", about = "Inspect and operate on aida-db stores")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
#[clap(subcommand_required = true, arg_required_else_help = true)]
pub enum Command {
    /// Print the metadata fields and hash-index extremes of a store.
    Info(InfoArgs),
    /// Roll up update-sets and tail substates into a world state at `--target`.
    Rollup(RollupArgs),
    /// Resolve a `{first,last}` block-range argument pair for a chain.
    #[clap(alias = "range")]
    ResolveRange(ResolveRangeArgs),
    /// Apply a patch store onto a target store.
    ApplyPatch(ApplyPatchArgs),
    /// Scrape block/state-root hashes from an RPC endpoint into a store.
    Scrape(ScrapeArgs),
}

impl Command {
    pub fn run(self) -> anyhow::Result<()> {
        match self {
            Command::Info(args) => commands::info(args),
            Command::Rollup(args) => commands::rollup(args),
            Command::ResolveRange(args) => commands::resolve_range(args),
            Command::ApplyPatch(args) => commands::apply_patch(args),
            Command::Scrape(args) => commands::scrape(args),
        }
    }
}

#[derive(clap::Args)]
pub struct InfoArgs {
    /// Path to the aida-db store.
    pub db_path: PathBuf,
}

#[derive(clap::Args)]
pub struct RollupArgs {
    /// Path to the aida-db store.
    pub db_path: PathBuf,
    /// Target block to roll up to (inclusive).
    #[arg(long)]
    pub target: u64,
}

#[derive(clap::Args)]
pub struct ResolveRangeArgs {
    /// Path to the aida-db store whose metadata bounds the range (optional).
    #[arg(long)]
    pub db_path: Option<PathBuf>,
    /// Chain id to resolve keywords against.
    #[arg(long)]
    pub chain_id: u64,
    /// First-block argument: decimal, keyword, or keyword+/-offset.
    pub first: String,
    /// Last-block argument: decimal, keyword, or keyword+/-offset.
    pub last: String,
}

#[derive(clap::Args)]
pub struct ApplyPatchArgs {
    /// Target store receiving the patch.
    pub target_path: PathBuf,
    /// Source patch store to copy from.
    pub source_path: PathBuf,
    /// Allow a source FirstBlock that isn't exactly target.LastBlock+1.
    #[arg(long)]
    pub allow_disjoint_start: bool,
}

#[derive(clap::Args)]
pub struct ScrapeArgs {
    /// Path to the aida-db store to populate.
    pub db_path: PathBuf,
    /// JSON-RPC HTTPS endpoint to scrape from. When omitted, resolved from
    /// `db_path` via the sonic.ipc/geth.ipc/HTTPS connection-preference
    /// order, falling back to `--https-fallback`.
    #[arg(long)]
    pub rpc_url: Option<String>,
    /// HTTPS URL to fall back to when no IPC socket is found next to `db_path`.
    #[arg(long, default_value = "https://rpc.soniclabs.com")]
    pub https_fallback: String,
    /// First block to scrape (inclusive).
    #[arg(long)]
    pub first_block: u64,
    /// Last block to scrape (inclusive).
    #[arg(long)]
    pub last_block: u64,
}
