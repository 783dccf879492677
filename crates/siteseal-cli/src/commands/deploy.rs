//! `siteseal deploy` - orchestrated deployment into the live slot.

use std::path::Path;

use anyhow::{Context, Result, bail};
use siteseal_core::deploy::package::package_tree;
use siteseal_core::deploy::{DeployError, DeploySlots, DeploymentOrchestrator};
use siteseal_core::signing::parse_verifying_key;
use tracing::info;

/// Deploy `source` (a transit archive, or a sealed tree to package first)
/// into the live slot, retaining the previous tree as the backup.
pub fn run(
    source: &Path,
    live: &Path,
    backup: &Path,
    state: &Path,
    pubkey: &str,
) -> Result<()> {
    let verifying_key = parse_verifying_key(pubkey).context("invalid verifying key")?;

    let archive = if source.is_dir() {
        let archive = source.with_extension("pkg");
        let checksum = package_tree(source, &archive)
            .with_context(|| format!("failed to package {}", source.display()))?;
        info!(archive = %archive.display(), %checksum, "packaged tree for transit");
        archive
    } else {
        source.to_path_buf()
    };

    let slots = DeploySlots {
        live: live.to_path_buf(),
        backup: backup.to_path_buf(),
        state_file: state.to_path_buf(),
    };
    let orchestrator = DeploymentOrchestrator::new(slots, verifying_key);

    match orchestrator.deploy_archive(&archive) {
        Ok(deployed) => {
            println!("deployed: {} is live", deployed.active_path.display());
            if let Some(backup_path) = deployed.backup_path {
                println!("previous tree retained at {}", backup_path.display());
            }
            Ok(())
        },
        Err(DeployError::Verification { violations }) => {
            for violation in &violations {
                eprintln!("{violation}");
            }
            bail!("deployment refused: {} violation(s)", violations.len());
        },
        Err(e) => Err(e).context("deployment failed"),
    }
}
