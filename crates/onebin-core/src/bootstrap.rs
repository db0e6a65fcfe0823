//! Bootstrap state machine
//!
//! Runs once per launch, strictly in order:
//!
//! ```text
//! Init → ResolvePaths → ExtractRuntime (skip if installed) → ExtractPayload (always)
//!      → LoadRuntimeLibrary → ConfigureHomeAndPath → BuildArgs → InvokeEntry
//!      → ReleaseLibrary → Exit
//! ```
//!
//! Every failure is terminal and reported with the stage it happened in.
//! Nothing is retried, and the runtime is never invoked after a failure.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::LaunchSettings;
use crate::error::{BootstrapError, LaunchError, Stage};
use crate::install::{self, ExtractedFile, InstallPaths, RuntimeInstall};
use crate::layout::ResourceLayout;
use crate::resource::ResourceSource;
use crate::runtime::{library_file_name, RuntimeLibrary, RuntimeLoader};
use crate::wide::WideString;

/// Runtime version strings embedded in the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// e.g. `python36`: names the library and the stdlib archive.
    pub short_version: String,
    /// e.g. `python363_64`: names the runtime install directory.
    pub long_version: String,
}

/// State after extraction, ready to hand off to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub identity: Identity,
    pub paths: InstallPaths,
    pub runtime: RuntimeInstall,
    pub payload: Vec<ExtractedFile>,
}

/// Result of a completed launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub prepared: Prepared,
    /// Return value of the runtime's main entry point.
    pub exit_code: i32,
}

/// Ordered search-path segments: base, runtime home, stdlib archive, support library.
pub fn search_path(paths: &InstallPaths, identity: &Identity, settings: &LaunchSettings) -> Vec<PathBuf> {
    vec![
        paths.base.clone(),
        paths.runtime_home.clone(),
        paths
            .runtime_home
            .join(format!("{}.zip", identity.short_version)),
        paths.base.join(&settings.support_library),
    ]
}

/// Join search-path segments with `separator`.
pub fn render_search_path(segments: &[PathBuf], separator: char) -> OsString {
    let mut out = OsString::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push(separator.to_string());
        }
        out.push(segment.as_os_str());
    }
    out
}

/// Build the runtime's argument vector.
///
/// `["", <isolation flag>, <base>/<entry script>, forwarded...]`, each argument
/// converted independently.
pub fn runtime_args<A: AsRef<OsStr>>(
    base: &Path,
    settings: &LaunchSettings,
    forwarded: &[A],
) -> Result<Vec<WideString>, LaunchError> {
    let given = 3 + forwarded.len();
    if let Some(limit) = settings.max_args {
        if given > limit {
            return Err(LaunchError::ArgumentOverflow { given, limit });
        }
    }

    let mut args = Vec::with_capacity(given);
    args.push(WideString::from_str("")?);
    args.push(WideString::from_str(&settings.isolation_flag)?);
    args.push(WideString::from_path(&base.join(&settings.entry_script))?);
    for arg in forwarded {
        args.push(WideString::from_os_str(arg.as_ref())?);
    }
    Ok(args)
}

/// One launch of an embedded runtime.
pub struct Bootstrap<'a, S: ?Sized, L> {
    source: &'a S,
    loader: L,
    layout: ResourceLayout,
    settings: LaunchSettings,
}

impl<'a, S, L> Bootstrap<'a, S, L>
where
    S: ResourceSource + ?Sized,
    L: RuntimeLoader,
{
    /// Bootstrap with the standard layout and environment settings.
    pub fn new(source: &'a S, loader: L) -> Self {
        Self {
            source,
            loader,
            layout: ResourceLayout::standard(),
            settings: LaunchSettings::from_env(),
        }
    }

    pub fn with_layout(mut self, layout: ResourceLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_settings(mut self, settings: LaunchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &LaunchSettings {
        &self.settings
    }

    /// Read the two version strings.
    pub fn read_identity(&self) -> Result<Identity, BootstrapError> {
        let at = |e: LaunchError| BootstrapError::new(Stage::Init, e);
        self.layout.validate().map_err(|e| at(e.into()))?;

        let short_version =
            install::read_text_slot(self.source, self.layout.short_version, "short runtime version")
                .map_err(at)?;
        let long_version =
            install::read_text_slot(self.source, self.layout.long_version, "long runtime version")
                .map_err(at)?;
        for version in [&short_version, &long_version] {
            install::check_file_name(version).map_err(at)?;
        }

        debug!(%short_version, %long_version, "read runtime identity");
        Ok(Identity {
            short_version,
            long_version,
        })
    }

    /// Locate the install tree and create its base directory.
    pub fn resolve_paths(&self, identity: &Identity) -> Result<InstallPaths, BootstrapError> {
        let at = |e: LaunchError| BootstrapError::new(Stage::ResolvePaths, e);
        let root = self.settings.resolve_install_root().ok_or_else(|| {
            at(LaunchError::Configuration(
                "could not determine the local application data directory".to_string(),
            ))
        })?;

        let paths = InstallPaths::new(&root, &self.settings.install_dir, &identity.long_version);
        paths.create_base().map_err(at)?;
        debug!(base = %paths.base.display(), home = %paths.runtime_home.display(), "resolved install paths");
        Ok(paths)
    }

    /// Steps up to and including payload extraction.
    pub fn prepare(&self) -> Result<Prepared, BootstrapError> {
        let identity = self.read_identity()?;
        let paths = self.resolve_paths(&identity)?;

        let runtime = install::extract_runtime(self.source, &self.layout, &paths)
            .map_err(|e| BootstrapError::new(Stage::ExtractRuntime, e))?;
        let payload = install::extract_payload(self.source, &self.layout, &paths)
            .map_err(|e| BootstrapError::new(Stage::ExtractPayload, e))?;

        Ok(Prepared {
            identity,
            paths,
            runtime,
            payload,
        })
    }

    /// Load the runtime from a prepared install and run it.
    pub fn launch<A: AsRef<OsStr>>(
        &self,
        prepared: Prepared,
        forwarded: &[A],
    ) -> Result<LaunchOutcome, BootstrapError> {
        let Prepared {
            identity, paths, ..
        } = &prepared;

        let library_path = paths
            .runtime_home
            .join(library_file_name(&identity.short_version));
        let mut runtime = self
            .loader
            .load(&library_path, &self.settings.entry_points)
            .map_err(|e| BootstrapError::new(Stage::LoadRuntimeLibrary, e))?;
        info!(library = %library_path.display(), "loaded runtime library");

        let configure = |e: LaunchError| BootstrapError::new(Stage::ConfigureHomeAndPath, e);
        let home = WideString::from_path(&paths.runtime_home).map_err(|e| configure(e.into()))?;
        runtime.set_home(home);

        let segments = search_path(paths, identity, &self.settings);
        let rendered = render_search_path(&segments, self.settings.path_separator);
        debug!(path = %rendered.to_string_lossy(), "runtime search path");
        let search = WideString::from_os_str(&rendered).map_err(|e| configure(e.into()))?;
        runtime.set_path(search);

        let args = runtime_args(&paths.base, &self.settings, forwarded)
            .map_err(|e| BootstrapError::new(Stage::BuildArgs, e))?;

        debug!(argc = args.len(), "invoking runtime entry point");
        let exit_code = runtime.run_main(args);

        drop(runtime);
        debug!(exit_code, "released runtime library");

        Ok(LaunchOutcome {
            prepared,
            exit_code,
        })
    }

    /// Run every step with `forwarded` as the application's arguments.
    pub fn run<A: AsRef<OsStr>>(&self, forwarded: &[A]) -> Result<LaunchOutcome, BootstrapError> {
        let prepared = self.prepare()?;
        self.launch(prepared, forwarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> (InstallPaths, Identity) {
        let paths = InstallPaths::new(Path::new("/data"), "app", "python363_64");
        let identity = Identity {
            short_version: "python36".to_string(),
            long_version: "python363_64".to_string(),
        };
        (paths, identity)
    }

    #[test]
    fn test_search_path_has_four_ordered_segments() {
        let (paths, identity) = paths();
        let settings = LaunchSettings::default();
        let rendered = render_search_path(&search_path(&paths, &identity, &settings), ';');
        let rendered = rendered.to_string_lossy().into_owned();
        let segments: Vec<&str> = rendered.split(';').collect();

        assert_eq!(segments.len(), 4);
        assert_eq!(Path::new(segments[0]), Path::new("/data/app"));
        assert_eq!(Path::new(segments[1]), Path::new("/data/app/python363_64"));
        assert_eq!(
            Path::new(segments[2]),
            Path::new("/data/app/python363_64/python36.zip")
        );
        assert_eq!(Path::new(segments[3]), Path::new("/data/app/lib.zip"));
    }

    #[test]
    fn test_runtime_args_layout() {
        let settings = LaunchSettings::default();
        let args = runtime_args(Path::new("/data/app"), &settings, &["--port", "8080"]).unwrap();

        assert_eq!(args.len(), 5);
        assert_eq!(args[0].to_string_lossy(), "");
        assert_eq!(args[1].to_string_lossy(), "-I");
        assert_eq!(
            PathBuf::from(args[2].to_string_lossy()),
            Path::new("/data/app").join("launch.py")
        );
        assert_eq!(args[3].to_string_lossy(), "--port");
        assert_eq!(args[4].to_string_lossy(), "8080");
    }

    #[test]
    fn test_runtime_args_without_forwarded() {
        let settings = LaunchSettings::default();
        let args = runtime_args::<&str>(Path::new("/data/app"), &settings, &[]).unwrap();
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_runtime_args_limit() {
        let settings = LaunchSettings::default();
        let at_limit: Vec<String> = (0..29).map(|i| i.to_string()).collect();
        assert_eq!(
            runtime_args(Path::new("/b"), &settings, &at_limit).unwrap().len(),
            32
        );

        let over: Vec<String> = (0..30).map(|i| i.to_string()).collect();
        let err = runtime_args(Path::new("/b"), &settings, &over).unwrap_err();
        assert!(matches!(
            err,
            LaunchError::ArgumentOverflow {
                given: 33,
                limit: 32
            }
        ));

        let unbounded = LaunchSettings {
            max_args: None,
            ..LaunchSettings::default()
        };
        assert_eq!(
            runtime_args(Path::new("/b"), &unbounded, &over).unwrap().len(),
            33
        );
    }

    #[test]
    fn test_runtime_args_reject_interior_nul() {
        let settings = LaunchSettings::default();
        let err = runtime_args(Path::new("/b"), &settings, &["bad\0arg"]).unwrap_err();
        assert!(matches!(err, LaunchError::Encoding(_)));
    }
}
