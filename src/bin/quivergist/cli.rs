use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI для QuiverGist: создание индекса, vacuum cleanup, статус, checkpoint.
#[derive(Parser, Debug)]
#[command(name = "quivergist", version, about = "QuiverGist index maintenance CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Initialize a new index (meta + FSM + WAL + empty root leaf)
    Init {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = 8192)]
        page_size: u32,
        /// Do not write WAL (no crash recovery)
        #[arg(long, default_value_t = false)]
        unlogged: bool,
    },
    /// Stats-only vacuum pass: counts live tuples, reports invalid inner tuples,
    /// recycles deleted pages and unlinks empty leaves.
    ///
    /// Env: QG_VACUUM_COST_DELAY_MS / QG_VACUUM_COST_LIMIT - троттлинг прохода.
    Cleanup {
        #[arg(long)]
        path: PathBuf,
        /// Exact heap row count; clamps the live-tuple estimate
        #[arg(long)]
        heap_tuples: Option<u64>,
        /// JSON output (single object)
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show meta and a census of page kinds (shared lock, read-only)
    Status {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Flush dirty pages, write meta, truncate WAL to its header
    Checkpoint {
        #[arg(long)]
        path: PathBuf,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Cli as Parser>::parse()
    }
}
