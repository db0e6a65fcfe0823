//! Bootstrap error types.

use std::fmt;
use std::path::PathBuf;

use crate::layout::LayoutError;
use crate::resource::ResourceError;
use crate::runtime::LoadError;
use crate::wide::EncodingError;

/// Steps of the bootstrap, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    ResolvePaths,
    ExtractRuntime,
    ExtractPayload,
    LoadRuntimeLibrary,
    ConfigureHomeAndPath,
    BuildArgs,
    InvokeEntry,
    ReleaseLibrary,
    Exit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "reading embedded identity",
            Stage::ResolvePaths => "resolving install paths",
            Stage::ExtractRuntime => "extracting runtime",
            Stage::ExtractPayload => "extracting application files",
            Stage::LoadRuntimeLibrary => "loading runtime library",
            Stage::ConfigureHomeAndPath => "configuring runtime paths",
            Stage::BuildArgs => "building runtime arguments",
            Stage::InvokeEntry => "running application",
            Stage::ReleaseLibrary => "releasing runtime library",
            Stage::Exit => "exiting",
        };
        f.write_str(name)
    }
}

/// Errors that abort a launch
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// Required embedded resource missing or malformed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Embedded resource could not be read
    #[error("Configuration error: {0}")]
    Resource(#[from] ResourceError),

    /// Invalid resource layout
    #[error("Configuration error: {0}")]
    Layout(#[from] LayoutError),

    /// Directory or file operation failed
    #[error("Failed to {action} {}: {source}", path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Shared library or entry point could not be loaded
    #[error("Dynamic load error: {0}")]
    DynamicLoad(#[from] LoadError),

    /// More arguments than the runtime argument vector allows
    #[error("Too many arguments: {given} exceeds the limit of {limit}")]
    ArgumentOverflow { given: usize, limit: usize },

    /// Argument or path not representable as a wide string
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

impl LaunchError {
    pub(crate) fn fs(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LaunchError::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }

    /// The OS error code behind this failure, if any.
    pub fn os_error(&self) -> Option<i32> {
        match self {
            LaunchError::Filesystem { source, .. } => source.raw_os_error(),
            LaunchError::Resource(ResourceError::Io { source, .. }) => source.raw_os_error(),
            _ => None,
        }
    }
}

/// A launch failure tagged with the step it happened in.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct BootstrapError {
    pub stage: Stage,
    #[source]
    pub source: LaunchError,
}

impl BootstrapError {
    pub fn new(stage: Stage, source: impl Into<LaunchError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}
