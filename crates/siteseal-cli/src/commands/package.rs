//! `siteseal package` - build the transit archive for a sealed tree.

use std::path::Path;

use anyhow::{Context, Result};
use siteseal_core::deploy::package::{checksum_path, package_tree};

/// Package `dir` into `out`, writing the companion checksum file.
pub fn run(dir: &Path, out: &Path) -> Result<()> {
    let checksum = package_tree(dir, out)
        .with_context(|| format!("failed to package {}", dir.display()))?;
    println!("packaged {} -> {}", dir.display(), out.display());
    println!("checksum {checksum} ({})", checksum_path(out).display());
    Ok(())
}
