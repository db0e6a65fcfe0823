//! `onebin-pack inspect` — List the slots embedded in an executable.

use std::path::{Path, PathBuf};

use anyhow::Context;
use onebin_core::install::read_text_slot;
use onebin_core::{resource, NamedSlot, ResourceKind, ResourceLayout, ResourceSource};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::output::StyledOutput;

/// Contents of every slot the layout defines.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InspectReport {
    pub path: PathBuf,
    pub short_version: Option<String>,
    pub long_version: Option<String>,
    /// Application-level files, refreshed every launch.
    pub files: Vec<EmbeddedFile>,
    pub runtime_file_count: Option<usize>,
    pub runtime_files: Vec<EmbeddedFile>,
}

/// One name/data slot pair. `None` fields are missing from the container.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmbeddedFile {
    pub label: String,
    pub name_id: u16,
    pub data_id: u16,
    pub name: Option<String>,
    pub size: Option<usize>,
    pub sha256: Option<String>,
}

fn describe<S>(source: &S, label: String, slot: NamedSlot) -> EmbeddedFile
where
    S: ResourceSource + ?Sized,
{
    let data = source.read(ResourceKind::RawData, slot.data).ok();
    EmbeddedFile {
        label,
        name_id: slot.name,
        data_id: slot.data,
        name: read_text_slot(source, slot.name, "file name").ok(),
        size: data.as_ref().map(|d| d.len()),
        sha256: data.map(|d| hex::encode(Sha256::digest(&d))),
    }
}

/// Inspect `source` under `layout`. Missing slots are recorded, not errors.
pub fn inspect<S>(path: &Path, source: &S, layout: &ResourceLayout) -> InspectReport
where
    S: ResourceSource + ?Sized,
{
    let files = layout
        .application_slots()
        .into_iter()
        .map(|(label, slot)| describe(source, label.to_string(), slot))
        .collect();

    let runtime_file_count = source
        .read(ResourceKind::RawData, layout.runtime_file_count)
        .ok()
        .and_then(|bytes| bytes.first().copied())
        .map(usize::from);

    // a count above capacity is listed up to what the layout can address
    let listed = runtime_file_count.unwrap_or(0).min(layout.runtime_capacity());
    let runtime_files = (0..listed)
        .filter_map(|index| layout.runtime_file_slot(index).ok().map(|slot| (index, slot)))
        .map(|(index, slot)| describe(source, format!("runtime file {}", index), slot))
        .collect();

    InspectReport {
        path: path.to_path_buf(),
        short_version: read_text_slot(source, layout.short_version, "short version").ok(),
        long_version: read_text_slot(source, layout.long_version, "long version").ok(),
        files,
        runtime_file_count,
        runtime_files,
    }
}

pub fn execute(exe: &Path, json: bool, out: &mut StyledOutput) -> anyhow::Result<()> {
    let source = resource::open_file(exe)
        .with_context(|| format!("Failed to open {}", exe.display()))?;
    let report = inspect(exe, &*source, &ResourceLayout::standard());

    if json {
        out.plain(&serde_json::to_string_pretty(&report)?);
        out.newline();
        return Ok(());
    }

    out.bold(&report.path.display().to_string());
    out.newline();
    version_line(out, "short version", &report.short_version);
    version_line(out, "long version", &report.long_version);

    out.newline();
    out.bold("Application files");
    out.newline();
    for file in &report.files {
        file_line(out, file);
    }

    out.newline();
    out.bold("Runtime files");
    match report.runtime_file_count {
        Some(count) => out.plain(&format!(" ({} declared)", count)),
        None => out.warning(" (count missing)"),
    }
    out.newline();
    for file in &report.runtime_files {
        file_line(out, file);
    }
    Ok(())
}

fn version_line(out: &mut StyledOutput, label: &str, value: &Option<String>) {
    out.plain(&format!("  {:<14}", label));
    match value {
        Some(v) => out.info(v),
        None => out.warning("missing"),
    }
    out.newline();
}

fn file_line(out: &mut StyledOutput, file: &EmbeddedFile) {
    out.plain(&format!("  {:>3}/{:<3} {:<18}", file.name_id, file.data_id, file.label));
    match &file.name {
        Some(name) => out.info(name),
        None => out.warning("<no name>"),
    }
    match (file.size, &file.sha256) {
        (Some(size), Some(digest)) => out.plain(&format!("  {} bytes  sha256:{}", size, digest)),
        _ => out.warning("  data missing"),
    }
    out.newline();
}
