//! Resource containers
//!
//! Numbered binary resources stored inside an executable:
//! - **memory**: in-process map, used for fakes and staging
//! - **trailer**: portable section appended to the end of an executable
//! - **win32**: the native PE resource section (Windows only)
//!
//! Readers implement [`ResourceSource`]; writers hand out a [`ResourceUpdate`]
//! transaction that only becomes visible on [`ResourceUpdate::commit`].

pub mod memory;
pub mod trailer;
#[cfg(windows)]
pub mod win32;

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use memory::MemoryResources;
pub use trailer::{TrailerResources, TrailerUpdate};
#[cfg(windows)]
pub use win32::{Win32Resources, Win32Update};

/// Type of a resource entry, mirroring the native resource type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// Raw application-defined data (`RT_RCDATA`).
    RawData,
    /// A single icon image (`RT_ICON`).
    Icon,
    /// An icon group directory (`RT_GROUP_ICON`).
    GroupIcon,
}

impl ResourceKind {
    /// Native resource type ID.
    pub const fn type_id(self) -> u16 {
        match self {
            ResourceKind::Icon => 3,
            ResourceKind::RawData => 10,
            ResourceKind::GroupIcon => 14,
        }
    }

    /// Inverse of [`ResourceKind::type_id`].
    pub fn from_type_id(id: u16) -> Option<Self> {
        match id {
            3 => Some(ResourceKind::Icon),
            10 => Some(ResourceKind::RawData),
            14 => Some(ResourceKind::GroupIcon),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::RawData => write!(f, "RCDATA"),
            ResourceKind::Icon => write!(f, "ICON"),
            ResourceKind::GroupIcon => write!(f, "GROUP_ICON"),
        }
    }
}

/// Errors that can occur while reading or updating a resource container
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Requested resource does not exist
    #[error("Resource {kind} #{id} not found")]
    NotFound { kind: ResourceKind, id: u16 },

    /// Container structure is damaged
    #[error("Corrupt resource container {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Resource data exceeds what the container can store
    #[error("Resource {kind} #{id} is too large ({size} bytes)")]
    TooLarge {
        kind: ResourceKind,
        id: u16,
        size: usize,
    },

    /// OS-level failure opening, reading, or writing the container
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ResourceError {
    pub(crate) fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        ResourceError::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this error only reports an absent resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResourceError::NotFound { .. })
    }
}

/// Read access to numbered resources.
pub trait ResourceSource {
    /// Read the full contents of one resource.
    ///
    /// The returned slice has exactly the length the container records.
    fn read(&self, kind: ResourceKind, id: u16) -> Result<Cow<'_, [u8]>, ResourceError>;

    /// Whether a resource exists.
    fn contains(&self, kind: ResourceKind, id: u16) -> bool {
        self.read(kind, id).is_ok()
    }
}

/// An open update transaction against a resource container.
///
/// Staged changes are invisible until [`commit`](ResourceUpdate::commit).
/// Dropping the transaction discards them and leaves the target untouched.
pub trait ResourceUpdate {
    /// Stage `data` under `(kind, id)`, replacing any existing entry.
    fn put(&mut self, kind: ResourceKind, id: u16, data: &[u8]) -> Result<(), ResourceError>;

    /// Apply every staged change.
    fn commit(self) -> Result<(), ResourceError>;
}

impl<T: ResourceSource + ?Sized> ResourceSource for &T {
    fn read(&self, kind: ResourceKind, id: u16) -> Result<Cow<'_, [u8]>, ResourceError> {
        (**self).read(kind, id)
    }
}

impl<T: ResourceSource + ?Sized> ResourceSource for Box<T> {
    fn read(&self, kind: ResourceKind, id: u16) -> Result<Cow<'_, [u8]>, ResourceError> {
        (**self).read(kind, id)
    }
}

/// Open the resources embedded in the running executable.
#[cfg(windows)]
pub fn open_current() -> Result<Box<dyn ResourceSource>, ResourceError> {
    Ok(Box::new(Win32Resources::current()))
}

/// Open the resources embedded in the running executable.
#[cfg(not(windows))]
pub fn open_current() -> Result<Box<dyn ResourceSource>, ResourceError> {
    let exe = std::env::current_exe()
        .map_err(|e| ResourceError::io("Failed to locate", Path::new("current executable"), e))?;
    Ok(Box::new(TrailerResources::open(&exe)?))
}

/// Open the resources of another executable file, read-only.
#[cfg(windows)]
pub fn open_file(path: &Path) -> Result<Box<dyn ResourceSource>, ResourceError> {
    Ok(Box::new(Win32Resources::open(path)?))
}

/// Open the resources of another executable file, read-only.
#[cfg(not(windows))]
pub fn open_file(path: &Path) -> Result<Box<dyn ResourceSource>, ResourceError> {
    Ok(Box::new(TrailerResources::open(path)?))
}

/// Native update transaction type for this platform.
#[cfg(windows)]
pub type NativeUpdate = Win32Update;

/// Native update transaction type for this platform.
#[cfg(not(windows))]
pub type NativeUpdate = TrailerUpdate;

/// Begin an update transaction against an executable file.
#[cfg(windows)]
pub fn begin_update(path: &Path) -> Result<NativeUpdate, ResourceError> {
    Win32Update::begin(path)
}

/// Begin an update transaction against an executable file.
#[cfg(not(windows))]
pub fn begin_update(path: &Path) -> Result<NativeUpdate, ResourceError> {
    TrailerUpdate::begin(path)
}
