//! Launcher settings
//!
//! Everything the bootstrap needs besides the embedded resources. Defaults
//! match what packed executables expect; `ONEBIN_INSTALL_ROOT` relocates the
//! install tree (useful in tests and locked-down machines).

use std::path::PathBuf;

/// Environment variable overriding the per-user local data directory.
pub const INSTALL_ROOT_ENV: &str = "ONEBIN_INSTALL_ROOT";

/// Names of the runtime's three entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoints {
    /// `void set_home(const wchar_t*)`
    pub set_home: String,
    /// `void set_path(const wchar_t*)`
    pub set_path: String,
    /// `int main(int argc, wchar_t** argv)`
    pub main: String,
}

impl Default for EntryPoints {
    fn default() -> Self {
        Self {
            set_home: "Py_SetPythonHome".to_string(),
            set_path: "Py_SetPath".to_string(),
            main: "Py_Main".to_string(),
        }
    }
}

/// Bootstrap settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Directory created under the install root (`<root>/<install_dir>`).
    pub install_dir: String,
    /// Overrides the per-user local data directory when set.
    pub install_root: Option<PathBuf>,
    /// Entry script name under the base path, passed as the script argument.
    pub entry_script: String,
    /// Flag placed before the entry script (isolated mode).
    pub isolation_flag: String,
    /// Support library archive placed last on the search path.
    pub support_library: String,
    /// Separator between search-path segments.
    pub path_separator: char,
    /// Upper bound on the runtime's argument vector, including the three injected slots.
    pub max_args: Option<usize>,
    pub entry_points: EntryPoints,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            install_dir: "app".to_string(),
            install_root: None,
            entry_script: "launch.py".to_string(),
            isolation_flag: "-I".to_string(),
            support_library: "lib.zip".to_string(),
            path_separator: ';',
            max_args: Some(32),
            entry_points: EntryPoints::default(),
        }
    }
}

impl LaunchSettings {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(root) = std::env::var_os(INSTALL_ROOT_ENV).filter(|v| !v.is_empty()) {
            settings.install_root = Some(PathBuf::from(root));
        }
        settings
    }

    pub fn with_install_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.install_root = Some(root.into());
        self
    }

    /// Root directory the install tree lives under.
    pub fn resolve_install_root(&self) -> Option<PathBuf> {
        self.install_root.clone().or_else(dirs::data_local_dir)
    }
}
