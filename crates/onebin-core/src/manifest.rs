//! Bundle manifest parsing (onebin.toml)
//!
//! Describes the files that go into each resource slot:
//!
//! ```toml
//! [runtime]
//! short-version = "python36"
//! long-version = "python363_64"
//! files = ["python/python36.dll", "python/python36.zip", "python/_ctypes.pyd"]
//! archive = "build/python363_64.zip"
//! hash = "build/python363_64hash.json"
//!
//! [application]
//! entry-script = { path = "shim.py", name = "launch.py" }
//! support-library = "build/lib.zip"
//! archive = "build/src.zip"
//! ```
//!
//! Relative paths resolve against the manifest's directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::layout::MAX_RUNTIME_FILES;

/// Errors that can occur during manifest parsing
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to read manifest file
    #[error("Failed to read manifest file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid manifest: {0}")]
    ValidationError(String),
}

/// A file to embed, with an optional name override.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FileSpec {
    /// Path only; embedded under its own file name.
    Path(PathBuf),
    /// Path plus the name it is extracted as.
    Named { path: PathBuf, name: String },
}

impl FileSpec {
    pub fn path(&self) -> &Path {
        match self {
            FileSpec::Path(path) | FileSpec::Named { path, .. } => path,
        }
    }

    /// Name the file is extracted as.
    pub fn name(&self) -> Option<String> {
        match self {
            FileSpec::Named { name, .. } => Some(name.clone()),
            FileSpec::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
        }
    }
}

/// Runtime section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeSection {
    pub short_version: String,
    pub long_version: String,
    /// Files installed once into the runtime home.
    #[serde(default)]
    pub files: Vec<FileSpec>,
    /// Remaining runtime modules, refreshed every launch.
    pub archive: FileSpec,
    /// Integrity hash list shipped next to the archive.
    pub hash: FileSpec,
}

/// Application section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ApplicationSection {
    pub entry_script: FileSpec,
    pub support_library: FileSpec,
    pub archive: FileSpec,
}

/// Bundle manifest (onebin.toml)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleManifest {
    pub runtime: RuntimeSection,
    pub application: ApplicationSection,
}

impl BundleManifest {
    /// Parse a manifest from a file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a manifest from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ManifestError> {
        let manifest: BundleManifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check everything that can be checked without touching the files.
    pub fn validate(&self) -> Result<(), ManifestError> {
        for (what, value) in [
            ("runtime.short-version", &self.runtime.short_version),
            ("runtime.long-version", &self.runtime.long_version),
        ] {
            if value.is_empty() {
                return Err(ManifestError::ValidationError(format!("{} is empty", what)));
            }
            if value.contains(['/', '\\']) {
                return Err(ManifestError::ValidationError(format!(
                    "{} must not contain path separators",
                    what
                )));
            }
        }

        if self.runtime.files.len() > MAX_RUNTIME_FILES {
            return Err(ManifestError::ValidationError(format!(
                "runtime.files lists {} files, at most {} fit the count slot",
                self.runtime.files.len(),
                MAX_RUNTIME_FILES
            )));
        }

        for spec in self.all_files() {
            match spec.name() {
                Some(name) if !name.is_empty() && !name.contains(['/', '\\']) => {}
                _ => {
                    return Err(ManifestError::ValidationError(format!(
                        "{} does not have a usable file name",
                        spec.path().display()
                    )))
                }
            }
        }

        Ok(())
    }

    /// Resolve relative paths against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |spec: &mut FileSpec| {
            let path = match spec {
                FileSpec::Path(path) | FileSpec::Named { path, .. } => path,
            };
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        for spec in &mut self.runtime.files {
            resolve(spec);
        }
        resolve(&mut self.runtime.archive);
        resolve(&mut self.runtime.hash);
        resolve(&mut self.application.entry_script);
        resolve(&mut self.application.support_library);
        resolve(&mut self.application.archive);
    }

    fn all_files(&self) -> impl Iterator<Item = &FileSpec> {
        self.runtime.files.iter().chain([
            &self.runtime.archive,
            &self.runtime.hash,
            &self.application.entry_script,
            &self.application.support_library,
            &self.application.archive,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[runtime]
short-version = "python36"
long-version = "python363_64"
files = ["python/python36.dll", "python/python36.zip"]
archive = "build/python363_64.zip"
hash = "build/python363_64hash.json"

[application]
entry-script = { path = "shim.py", name = "launch.py" }
support-library = "build/lib.zip"
archive = "build/src.zip"
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = BundleManifest::from_str(MANIFEST).unwrap();
        assert_eq!(manifest.runtime.short_version, "python36");
        assert_eq!(manifest.runtime.files.len(), 2);
        assert_eq!(
            manifest.application.entry_script.name().as_deref(),
            Some("launch.py")
        );
        assert_eq!(manifest.application.archive.name().as_deref(), Some("src.zip"));
    }

    #[test]
    fn test_resolve_relative_paths() {
        let mut manifest = BundleManifest::from_str(MANIFEST).unwrap();
        manifest.resolve_paths(Path::new("/project"));
        assert_eq!(
            manifest.runtime.files[0].path(),
            Path::new("/project/python/python36.dll")
        );
        assert_eq!(
            manifest.application.entry_script.path(),
            Path::new("/project/shim.py")
        );
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        let err = BundleManifest::from_str("[runtime]\nshort-version = \"x\"\n").unwrap_err();
        assert!(matches!(err, ManifestError::ParseError(_)));
    }

    #[test]
    fn test_version_with_separator_rejected() {
        let bad = MANIFEST.replace("python363_64\"", "../escape\"");
        let err = BundleManifest::from_str(&bad).unwrap_err();
        assert!(matches!(err, ManifestError::ValidationError(_)));
    }
}
