//! Extraction of embedded files to the install tree
//!
//! ```text
//! <root>/<install_dir>/                  base path, refreshed every launch
//! ├── launch.py, lib.zip, <app>.zip, <runtime>.zip, <runtime>hash.json
//! └── <long-version>/                    runtime home, installed once
//!     ├── <short-version>.dll
//!     └── ...
//! ```
//!
//! The runtime home is a cache shared by every launch of every bundle built
//! against the same runtime. A fresh install is written into a private staging
//! directory and renamed into place, so concurrent first launches never see a
//! half-written runtime; the loser of the rename reuses the winner's install.
//! Files added to an existing runtime home are likewise written under a
//! temporary name and linked into place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::LaunchError;
use crate::layout::{NamedSlot, ResourceLayout};
use crate::resource::{ResourceKind, ResourceSource};

/// Staging directories untouched for this long belong to a crashed launch.
pub const STALE_STAGING_AGE: Duration = Duration::from_secs(60 * 60);

/// What to do when the destination file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Leave the existing file alone.
    KeepExisting,
    /// Delete the existing file, then write.
    Replace,
}

/// Result of extracting one named slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub path: PathBuf,
    pub size: usize,
    /// The destination already existed and was left untouched.
    pub kept: bool,
}

/// How the runtime home was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeInstall {
    /// Fresh install of `files` runtime files.
    Installed { files: usize },
    /// Existing install reused; `filled` missing files were added to it.
    Reused { filled: usize },
}

/// Directories of one install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    /// `<root>/<install_dir>`
    pub base: PathBuf,
    /// `<base>/<long-version>`
    pub runtime_home: PathBuf,
}

impl InstallPaths {
    pub fn new(root: &Path, install_dir: &str, long_version: &str) -> Self {
        let base = root.join(install_dir);
        let runtime_home = base.join(long_version);
        Self { base, runtime_home }
    }

    /// Create the base directory. An existing directory is fine.
    pub fn create_base(&self) -> Result<(), LaunchError> {
        match fs::create_dir_all(&self.base) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && self.base.is_dir() => Ok(()),
            Err(e) => Err(LaunchError::fs("create directory", &self.base, e)),
        }
    }

    /// `.<long-version>.`, shared by every staging directory of this runtime.
    fn staging_prefix(&self) -> String {
        let name = self
            .runtime_home
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!(".{}.", name)
    }

    /// A staging directory private to this call.
    fn staging_dir(&self) -> PathBuf {
        self.base.join(format!(
            "{}{}.partial",
            self.staging_prefix(),
            crate::unique_suffix()
        ))
    }

    /// Remove staging directories of this runtime left behind by earlier
    /// launches that did not finish. Returns how many were removed.
    ///
    /// Directories modified within `max_age` may still be in use by a
    /// concurrent launch and are left alone.
    pub fn sweep_stale_staging(&self, max_age: Duration) -> usize {
        let entries = match fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(base = %self.base.display(), error = %e, "cannot list install base");
                return 0;
            }
        };

        let prefix = self.staging_prefix();
        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(&prefix) || !name.ends_with(".partial") {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_dir() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|t| t.elapsed().ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            let path = entry.path();
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "removed stale staging directory");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove stale staging directory"),
            }
        }
        removed
    }
}

/// Read a text slot: UTF-8, trailing NULs trimmed, non-empty.
pub fn read_text_slot<S>(source: &S, id: u16, what: &str) -> Result<String, LaunchError>
where
    S: ResourceSource + ?Sized,
{
    let bytes = source.read(ResourceKind::RawData, id).map_err(|e| {
        LaunchError::Configuration(format!("{} (resource #{}) unavailable: {}", what, id, e))
    })?;
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    let text = std::str::from_utf8(&bytes[..end]).map_err(|_| {
        LaunchError::Configuration(format!("{} (resource #{}) is not valid UTF-8", what, id))
    })?;
    if text.is_empty() {
        return Err(LaunchError::Configuration(format!(
            "{} (resource #{}) is empty",
            what, id
        )));
    }
    Ok(text.to_string())
}

/// Read the one-byte runtime file count.
pub fn read_runtime_count<S>(source: &S, layout: &ResourceLayout) -> Result<usize, LaunchError>
where
    S: ResourceSource + ?Sized,
{
    let id = layout.runtime_file_count;
    let bytes = source.read(ResourceKind::RawData, id).map_err(|e| {
        LaunchError::Configuration(format!("runtime file count (resource #{}) unavailable: {}", id, e))
    })?;
    let count = *bytes.first().ok_or_else(|| {
        LaunchError::Configuration(format!("runtime file count (resource #{}) is empty", id))
    })? as usize;

    let capacity = layout.runtime_capacity();
    if count > capacity {
        return Err(LaunchError::Configuration(format!(
            "runtime file count {} exceeds the layout capacity of {}",
            count, capacity
        )));
    }
    Ok(count)
}

/// Reject names that would escape the destination directory.
pub fn check_file_name(name: &str) -> Result<(), LaunchError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.contains(':')
        || Path::new(name).is_absolute();
    if bad {
        return Err(LaunchError::Configuration(format!(
            "embedded file name {:?} is not a plain file name",
            name
        )));
    }
    Ok(())
}

/// Write the file held by `slot` into `dir`.
///
/// Writes exactly the number of bytes the container reports for the data slot.
pub fn extract_named<S>(
    source: &S,
    slot: NamedSlot,
    dir: &Path,
    policy: OverwritePolicy,
) -> Result<ExtractedFile, LaunchError>
where
    S: ResourceSource + ?Sized,
{
    let name = read_text_slot(source, slot.name, "file name")?;
    check_file_name(&name)?;
    let data = source.read(ResourceKind::RawData, slot.data).map_err(|e| {
        LaunchError::Configuration(format!("contents of {} (resource #{}) unavailable: {}", name, slot.data, e))
    })?;
    let path = dir.join(&name);

    let written = match policy {
        OverwritePolicy::KeepExisting => {
            fs::symlink_metadata(&path).is_err() && write_new(dir, &name, &data)?
        }
        OverwritePolicy::Replace => {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed previous file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(LaunchError::fs("delete", &path, e)),
            }
            fs::write(&path, &data).map_err(|e| LaunchError::fs("write", &path, e))?;
            true
        }
    };

    if written {
        debug!(path = %path.display(), size = data.len(), "extracted file");
    } else {
        debug!(path = %path.display(), "kept existing file");
    }
    Ok(ExtractedFile {
        path,
        size: data.len(),
        kept: !written,
    })
}

/// Create `dir/name` holding `data`, never exposing a partly written file
/// and never replacing one that already exists.
///
/// Returns `false` when another writer created the file first.
fn write_new(dir: &Path, name: &str, data: &[u8]) -> Result<bool, LaunchError> {
    let path = dir.join(name);
    let tmp = dir.join(format!(".{}.{}.tmp", name, crate::unique_suffix()));
    if let Err(e) = fs::write(&tmp, data) {
        let _ = fs::remove_file(&tmp);
        return Err(LaunchError::fs("write", &tmp, e));
    }

    let result = match fs::hard_link(&tmp, &path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        // no hard links on this filesystem
        Err(_) => match fs::rename(&tmp, &path) {
            Ok(()) => Ok(true),
            Err(_) if fs::symlink_metadata(&path).is_ok() => Ok(false),
            Err(e) => Err(LaunchError::fs("write", &path, e)),
        },
    };
    let _ = fs::remove_file(&tmp);
    result
}

/// Install the runtime file set unless it is already installed.
///
/// Existing runtime files are never overwritten: the first install wins and
/// is reused by every later launch.
pub fn extract_runtime<S>(
    source: &S,
    layout: &ResourceLayout,
    paths: &InstallPaths,
) -> Result<RuntimeInstall, LaunchError>
where
    S: ResourceSource + ?Sized,
{
    let count = read_runtime_count(source, layout)?;

    let install = if paths.runtime_home.is_dir() {
        let filled = extract_runtime_files(source, layout, count, &paths.runtime_home)?;
        info!(home = %paths.runtime_home.display(), filled, "reusing installed runtime");
        RuntimeInstall::Reused { filled }
    } else {
        let staging = paths.staging_dir();
        fs::create_dir_all(&staging).map_err(|e| LaunchError::fs("create directory", &staging, e))?;

        if let Err(e) = extract_runtime_files(source, layout, count, &staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
        promote_staging(&staging, paths, count)?
    };

    paths.sweep_stale_staging(STALE_STAGING_AGE);
    Ok(install)
}

/// Move a fully written staging directory onto the runtime home.
///
/// If another launch installed the runtime first, the staging copy is
/// discarded and the existing install is reused.
fn promote_staging(
    staging: &Path,
    paths: &InstallPaths,
    count: usize,
) -> Result<RuntimeInstall, LaunchError> {
    match fs::rename(staging, &paths.runtime_home) {
        Ok(()) => {
            info!(home = %paths.runtime_home.display(), files = count, "installed runtime");
            Ok(RuntimeInstall::Installed { files: count })
        }
        Err(_) if paths.runtime_home.is_dir() => {
            warn!(
                home = %paths.runtime_home.display(),
                "runtime was installed concurrently, discarding this copy"
            );
            let _ = fs::remove_dir_all(staging);
            Ok(RuntimeInstall::Reused { filled: 0 })
        }
        Err(e) => {
            let _ = fs::remove_dir_all(staging);
            Err(LaunchError::fs("move runtime into", &paths.runtime_home, e))
        }
    }
}

fn extract_runtime_files<S>(
    source: &S,
    layout: &ResourceLayout,
    count: usize,
    dir: &Path,
) -> Result<usize, LaunchError>
where
    S: ResourceSource + ?Sized,
{
    let mut written = 0;
    for index in 0..count {
        let slot = layout.runtime_file_slot(index)?;
        let file = extract_named(source, slot, dir, OverwritePolicy::KeepExisting)?;
        if !file.kept {
            written += 1;
        }
    }
    Ok(written)
}

/// Rewrite every application-level file in the base directory.
pub fn extract_payload<S>(
    source: &S,
    layout: &ResourceLayout,
    paths: &InstallPaths,
) -> Result<Vec<ExtractedFile>, LaunchError>
where
    S: ResourceSource + ?Sized,
{
    layout
        .application_slots()
        .into_iter()
        .map(|(label, slot)| {
            debug!(file = label, "refreshing application file");
            extract_named(source, slot, &paths.base, OverwritePolicy::Replace)
        })
        .collect()
}
