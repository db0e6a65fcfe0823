//! `onebin-pack pack` — Embed an icon and payload files into a launcher.

use std::path::{Path, PathBuf};

use anyhow::Context;
use onebin_core::{resource, IconChoice, PackReport, ResourceSource};
use tracing::debug;

use crate::icons;
use crate::output::StyledOutput;

/// Pack `files` into `target`, taking the icon from `icon_source`.
///
/// Without an `icon_source` the packer's built-in icon groups are used.
pub fn run(
    icon: IconChoice,
    target: &Path,
    files: &[PathBuf],
    icon_source: Option<&Path>,
) -> anyhow::Result<PackReport> {
    let icon_set: Box<dyn ResourceSource> = match icon_source {
        Some(path) => {
            debug!(icon_source = %path.display(), "using external icon source");
            resource::open_file(path)
                .with_context(|| format!("Failed to open icon source {}", path.display()))?
        }
        None => Box::new(icons::builtin()),
    };

    debug!(target = %target.display(), %icon, "packing");
    let txn = resource::begin_update(target)
        .with_context(|| format!("Failed to open {} for update", target.display()))?;

    let report = onebin_core::pack(txn, &*icon_set, icon, files)?;
    Ok(report)
}

pub fn execute(
    icon: IconChoice,
    target: &Path,
    files: &[PathBuf],
    icon_source: Option<&Path>,
    out: &mut StyledOutput,
) -> anyhow::Result<()> {
    let report = run(icon, target, files, icon_source)?;

    for file in &report.files {
        out.info(&format!("{:>5}", file.id));
        out.plain(&format!("  {} ({} bytes)", file.path.display(), file.size));
        out.newline();
    }
    out.success("Packed");
    out.plain(&format!(
        " {} files and the {} icon ({} images) into {}",
        report.files.len(),
        report.icon,
        report.icon_images.len(),
        target.display()
    ));
    out.newline();
    Ok(())
}
