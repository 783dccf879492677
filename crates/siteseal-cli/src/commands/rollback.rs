//! `siteseal rollback` - reverse the most recent deployment swap.

use std::path::Path;

use anyhow::{Context, Result};
use siteseal_core::deploy::{DeploySlots, rollback};

/// Restore the backup tree to the live slot.
pub fn run(live: &Path, backup: &Path, state: &Path) -> Result<()> {
    let slots = DeploySlots {
        live: live.to_path_buf(),
        backup: backup.to_path_buf(),
        state_file: state.to_path_buf(),
    };

    let deployed = rollback(&slots).context("rollback failed")?;
    println!("rolled back: {} is live", deployed.active_path.display());
    Ok(())
}
