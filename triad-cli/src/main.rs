//! Triad CLI - build, inspect and prove against triad Merkle trees

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use triad_merkle::{Compression, FieldElement, HasherKind};

mod commands;
mod config;

use config::{Config, Overrides};

#[derive(Parser)]
#[command(name = "triad", version, about = "Triad Merkle commitment tree tool", long_about = None)]
struct Cli {
    /// TOML config file (defaults to <config dir>/triad/config.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Tree depth
    #[arg(long, global = true)]
    depth: Option<usize>,

    /// Leaf value of empty positions (decimal or 0x-hex)
    #[arg(long, global = true)]
    zero_value: Option<FieldElement>,

    /// Hash function: poseidon or sum23
    #[arg(long, global = true)]
    hasher: Option<HasherKind>,

    /// Snapshot compression when the file name does not say: none, gzip or zstd
    #[arg(long, global = true)]
    compression: Option<Compression>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Tree(TreeAction),

    #[command(flatten)]
    Proof(ProofAction),

    #[command(flatten)]
    Codec(CodecAction),
}

#[derive(Subcommand)]
enum TreeAction {
    /// Write an empty tree snapshot
    Init {
        snapshot: PathBuf,
        /// Overwrite an existing snapshot
        #[arg(long)]
        force: bool,
    },

    /// Append one triad of leaves
    Append {
        snapshot: PathBuf,
        a: FieldElement,
        b: FieldElement,
        c: FieldElement,
    },

    /// Build a tree from a JSON array of leaves
    Build {
        snapshot: PathBuf,
        #[arg(long)]
        leaves: PathBuf,
    },

    /// Print the root of a snapshot
    Root { snapshot: PathBuf },

    /// Feed commitment events (one JSON object per line) into a sharded forest
    Ingest {
        /// Directory holding the forest's shard snapshots
        dir: PathBuf,
        #[arg(long)]
        events: PathBuf,
    },
}

#[derive(Subcommand)]
enum ProofAction {
    /// Print the Merkle path of a leaf as JSON
    Prove {
        snapshot: PathBuf,
        index: usize,
        /// Emit circuit input signals instead of the raw path
        #[arg(long)]
        circuit: bool,
    },

    /// Verify a proof file against its root
    Verify { proof: PathBuf },

    /// Map a global leaf id to (tree id, triad id, position)
    Locate { leaf_id: u64 },
}

#[derive(Subcommand)]
enum CodecAction {
    /// Compress stdin to base64 text
    Compress,

    /// Decompress base64 text from stdin
    Decompress,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let overrides = Overrides {
        depth: cli.depth,
        zero_value: cli.zero_value,
        hasher: cli.hasher,
        compression: cli.compression,
    };
    let config = Config::load(cli.config.as_deref(), &overrides)?;

    match cli.command {
        Commands::Tree(action) => commands::tree::handle(action, &config).await,
        Commands::Proof(action) => commands::proof::handle(action, &config).await,
        Commands::Codec(action) => commands::codec::handle(action, &config).await,
    }
}
