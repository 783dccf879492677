//! siteseal - seal, verify, and deploy static sites as signed artifacts.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// siteseal - content-integrity trust chain for static sites
#[derive(Parser, Debug)]
#[command(name = "siteseal")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an Ed25519 signing key and print its public half
    Keygen {
        /// Where to write the signing key file (mode 0600)
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Build and sign the integrity manifest for a site tree
    Seal {
        /// The build output tree to seal (defaults to the config file's
        /// `site_dir`)
        dir: Option<PathBuf>,

        /// Path to the signing key file (defaults to the config file's
        /// `key_file`)
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// Seal configuration file, consulted when `dir` or `--key` is
        /// omitted
        #[arg(short, long, default_value = "seal.toml")]
        config: PathBuf,
    },

    /// Verify a tree against its sealed manifest
    Verify {
        /// The tree to verify
        dir: PathBuf,

        /// Hex-encoded verifying key; when given, the manifest signature is
        /// checked too
        #[arg(long)]
        pubkey: Option<String>,
    },

    /// Build the transit package for a sealed tree
    Package {
        /// The sealed tree to package
        dir: PathBuf,

        /// Archive output path (checksum file written beside it)
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Deploy a package (or sealed tree) into the live slot
    Deploy {
        /// Transit archive, or a sealed tree to package first
        source: PathBuf,

        /// Live serving directory
        #[arg(long)]
        live: PathBuf,

        /// Backup slot directory
        #[arg(long)]
        backup: PathBuf,

        /// Deployment state file
        #[arg(long)]
        state: PathBuf,

        /// Hex-encoded verifying key for the staged manifest
        #[arg(long)]
        pubkey: String,
    },

    /// Reverse the most recent deployment swap
    Rollback {
        /// Live serving directory
        #[arg(long)]
        live: PathBuf,

        /// Backup slot directory
        #[arg(long)]
        backup: PathBuf,

        /// Deployment state file
        #[arg(long)]
        state: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Keygen { out } => commands::keygen::run(&out),
        Commands::Seal { dir, key, config } => {
            commands::seal::run(dir.as_deref(), key.as_deref(), &config)
        },
        Commands::Verify { dir, pubkey } => {
            // Verification uses specific exit codes: 0=clean, 1=violations
            // or broken trust chain, 2=I/O or usage error. std::process::exit
            // bypasses anyhow Result handling so the codes stay precise.
            let exit_code = commands::verify::run(&dir, pubkey.as_deref());
            std::process::exit(i32::from(exit_code));
        },
        Commands::Package { dir, out } => commands::package::run(&dir, &out),
        Commands::Deploy {
            source,
            live,
            backup,
            state,
            pubkey,
        } => commands::deploy::run(&source, &live, &backup, &state, &pubkey),
        Commands::Rollback {
            live,
            backup,
            state,
        } => commands::rollback::run(&live, &backup, &state),
    }
}
