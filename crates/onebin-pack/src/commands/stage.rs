//! `onebin-pack stage` — Turn a bundle manifest into numbered payload files.

use std::path::{Path, PathBuf};

use anyhow::Context;
use onebin_core::{BundleManifest, ResourceLayout};

use crate::output::StyledOutput;

/// Stage `manifest_path` into `out_dir`; returns the written paths in slot order.
pub fn run(manifest_path: &Path, out_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut manifest = BundleManifest::from_file(manifest_path)
        .with_context(|| format!("Failed to load {}", manifest_path.display()))?;
    if let Some(dir) = manifest_path.parent() {
        manifest.resolve_paths(dir);
    }

    let staged = onebin_core::stage(&manifest, &ResourceLayout::standard(), out_dir)?;
    Ok(staged.into_iter().map(|file| file.path).collect())
}

pub fn execute(manifest_path: &Path, out_dir: &Path, out: &mut StyledOutput) -> anyhow::Result<()> {
    let staged = run(manifest_path, out_dir)?;
    for path in &staged {
        out.plain(&path.display().to_string());
        out.newline();
    }
    Ok(())
}
