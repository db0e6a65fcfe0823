//! OneBin core library
//!
//! Single-file distribution of an interpreted application together with its
//! runtime. This crate provides:
//! - The resource-ID layout shared by the packer and the launcher
//! - Resource containers (native PE resources, portable trailer, in-memory)
//! - Icon group copying and payload packing
//! - Bundle manifests (onebin.toml) and staging into numbered payload files
//! - Runtime installation, dynamic loading, and the launch bootstrap

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod icon;
pub mod install;
pub mod layout;
pub mod manifest;
pub mod pack;
pub mod resource;
pub mod runtime;
pub mod stage;
pub mod wide;

pub use bootstrap::{Bootstrap, Identity, LaunchOutcome, Prepared};
pub use config::{EntryPoints, LaunchSettings, INSTALL_ROOT_ENV};
pub use error::{BootstrapError, LaunchError, Stage};
pub use icon::{GroupIconDir, IconChoice};
pub use install::{ExtractedFile, InstallPaths, OverwritePolicy, RuntimeInstall};
pub use layout::{LayoutError, NamedSlot, ResourceLayout};
pub use manifest::{BundleManifest, FileSpec, ManifestError};
pub use pack::{pack, PackError, PackReport, PackedFile};
pub use resource::{
    MemoryResources, ResourceError, ResourceKind, ResourceSource, ResourceUpdate,
    TrailerResources, TrailerUpdate,
};
pub use runtime::{DynamicLoader, LoadError, RuntimeLibrary, RuntimeLoader};
pub use stage::{stage, StageError, StagedFile};
pub use wide::{EncodingError, WideString};

use std::sync::atomic::{AtomicU64, Ordering};

/// Suffix for temporary paths, distinct per process and per call.
pub(crate) fn unique_suffix() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    format!("{}-{}", std::process::id(), NEXT.fetch_add(1, Ordering::Relaxed))
}
