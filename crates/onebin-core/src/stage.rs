//! Staging of a bundle manifest into numbered payload files
//!
//! Each resource slot becomes `<out>/<id>.bin`, ready for [`crate::pack::pack`],
//! which derives the resource ID from the file stem.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::layout::{LayoutError, NamedSlot, ResourceLayout};
use crate::manifest::{BundleManifest, FileSpec, ManifestError};

/// Errors that can occur while staging
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Invalid resource layout: {0}")]
    Layout(#[from] LayoutError),

    #[error("{count} runtime files listed but the layout holds at most {capacity}")]
    TooManyRuntimeFiles { count: usize, capacity: usize },

    #[error("Failed to stage {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// File written by [`stage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub id: u16,
    pub path: PathBuf,
}

/// Write every slot of `manifest` into `out_dir`.
///
/// Paths in the manifest are used as given; call
/// [`BundleManifest::resolve_paths`] first for manifest-relative paths.
pub fn stage(
    manifest: &BundleManifest,
    layout: &ResourceLayout,
    out_dir: &Path,
) -> Result<Vec<StagedFile>, StageError> {
    layout.validate()?;
    manifest.validate()?;

    let count = manifest.runtime.files.len();
    let capacity = layout.runtime_capacity();
    if count > capacity {
        return Err(StageError::TooManyRuntimeFiles { count, capacity });
    }

    fs::create_dir_all(out_dir).map_err(|source| StageError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let mut staged = Vec::new();
    let mut write = |id: u16, data: &[u8]| -> Result<(), StageError> {
        let path = out_dir.join(format!("{}.bin", id));
        fs::write(&path, data).map_err(|source| StageError::Io {
            path: path.clone(),
            source,
        })?;
        staged.push(StagedFile { id, path });
        Ok(())
    };

    write(layout.short_version, manifest.runtime.short_version.as_bytes())?;
    write(layout.long_version, manifest.runtime.long_version.as_bytes())?;
    // count fits: capacity is capped at u8::MAX
    write(layout.runtime_file_count, &[count as u8])?;

    let app = &manifest.application;
    let named = [
        (layout.entry_script, &app.entry_script),
        (layout.support_library, &app.support_library),
        (layout.application, &app.archive),
        (layout.runtime_archive, &manifest.runtime.archive),
        (layout.runtime_hash, &manifest.runtime.hash),
    ];
    for (slot, spec) in named {
        stage_named(slot, spec, &mut write)?;
    }
    for (index, spec) in manifest.runtime.files.iter().enumerate() {
        stage_named(layout.runtime_file_slot(index)?, spec, &mut write)?;
    }

    debug!(out = %out_dir.display(), files = staged.len(), "staged bundle");
    Ok(staged)
}

fn stage_named<F>(slot: NamedSlot, spec: &FileSpec, write: &mut F) -> Result<(), StageError>
where
    F: FnMut(u16, &[u8]) -> Result<(), StageError>,
{
    let name = spec.name().ok_or_else(|| {
        ManifestError::ValidationError(format!(
            "{} does not have a usable file name",
            spec.path().display()
        ))
    })?;
    let data = fs::read(spec.path()).map_err(|source| StageError::Io {
        path: spec.path().to_path_buf(),
        source,
    })?;
    write(slot.name, name.as_bytes())?;
    write(slot.data, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest_in(dir: &Path, runtime_files: &[&str]) -> BundleManifest {
        let mut files = Vec::new();
        for name in ["shim.py", "lib.zip", "src.zip", "python36x.zip", "hash.json"] {
            fs::write(dir.join(name), name.as_bytes()).unwrap();
        }
        for name in runtime_files {
            fs::write(dir.join(name), b"runtime").unwrap();
            files.push(format!("\"{}\"", name));
        }
        let text = format!(
            r#"
[runtime]
short-version = "python36"
long-version = "python363_64"
files = [{}]
archive = "python36x.zip"
hash = "hash.json"

[application]
entry-script = {{ path = "shim.py", name = "launch.py" }}
support-library = "lib.zip"
archive = "src.zip"
"#,
            files.join(", ")
        );
        let mut manifest = BundleManifest::from_str(&text).unwrap();
        manifest.resolve_paths(dir);
        manifest
    }

    #[test]
    fn test_stage_writes_numbered_files() {
        let tmp = TempDir::new().unwrap();
        let manifest = manifest_in(tmp.path(), &["python36.dll", "python36.zip", "_ctypes.pyd"]);
        let out = tmp.path().join("staged");

        let staged = stage(&manifest, &ResourceLayout::standard(), &out).unwrap();
        // 2 versions + count + 5 named pairs + 3 runtime pairs
        assert_eq!(staged.len(), 3 + 10 + 6);

        assert_eq!(fs::read(out.join("34.bin")).unwrap(), b"python36");
        assert_eq!(fs::read(out.join("50.bin")).unwrap(), vec![3u8]);
        assert_eq!(fs::read(out.join("36.bin")).unwrap(), b"launch.py");
        assert_eq!(fs::read(out.join("37.bin")).unwrap(), b"shim.py");
        assert_eq!(fs::read(out.join("42.bin")).unwrap(), b"src.zip");
        assert_eq!(fs::read(out.join("151.bin")).unwrap(), b"python36.dll");
        assert_eq!(fs::read(out.join("53.bin")).unwrap(), b"runtime");
    }

    #[test]
    fn test_stage_missing_input_reports_path() {
        let tmp = TempDir::new().unwrap();
        let manifest = manifest_in(tmp.path(), &[]);
        fs::remove_file(tmp.path().join("lib.zip")).unwrap();

        let err = stage(&manifest, &ResourceLayout::standard(), &tmp.path().join("out")).unwrap_err();
        match err {
            StageError::Io { path, .. } => assert!(path.ends_with("lib.zip")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stage_respects_layout_capacity() {
        let tmp = TempDir::new().unwrap();
        let manifest = manifest_in(tmp.path(), &["a.dll", "b.dll", "c.dll"]);
        let layout = ResourceLayout {
            runtime_names_base: ResourceLayout::standard().runtime_files_base + 2,
            ..ResourceLayout::standard()
        };

        let err = stage(&manifest, &layout, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(
            err,
            StageError::TooManyRuntimeFiles {
                count: 3,
                capacity: 2
            }
        ));
    }
}
