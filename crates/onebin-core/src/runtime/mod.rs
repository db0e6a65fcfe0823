//! Runtime library binding
//!
//! The runtime is an opaque shared library exposing three entry points: a
//! home setter, a search-path setter, and `main`. [`RuntimeLoader`] and
//! [`RuntimeLibrary`] hide the dynamic loader so the bootstrap can run against
//! a fake in tests.

pub mod library;

use std::ffi::c_int;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub use library::Library;

use crate::config::EntryPoints;
use crate::wide::{WideChar, WideString};

/// Errors that can occur during library loading
#[derive(Debug, Error)]
pub enum LoadError {
    /// Library file not found or could not be loaded
    #[error("Failed to load library {path}: {reason}")]
    NotFound {
        /// Path that was attempted
        path: String,
        /// Loader diagnostic
        reason: String,
    },

    /// Symbol not found in library
    #[error("Symbol {symbol} not found in {library}: {reason}")]
    SymbolNotFound {
        /// Symbol name that was not found
        symbol: String,
        /// Library path
        library: String,
        /// Loader diagnostic
        reason: String,
    },
}

/// File name of the runtime library for a short version, e.g. `python36.dll`.
pub fn library_file_name(short_version: &str) -> String {
    format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        short_version,
        std::env::consts::DLL_SUFFIX
    )
}

/// A loaded runtime with its entry points resolved.
pub trait RuntimeLibrary {
    /// Set the runtime home directory.
    fn set_home(&mut self, home: WideString);

    /// Set the module search path.
    fn set_path(&mut self, path: WideString);

    /// Run the runtime's main entry point to completion.
    fn run_main(&mut self, args: Vec<WideString>) -> i32;
}

/// Loads a runtime library and resolves its entry points.
pub trait RuntimeLoader {
    type Library: RuntimeLibrary;

    fn load(&self, path: &Path, entry_points: &EntryPoints) -> Result<Self::Library, LoadError>;
}

type SetStringFn = unsafe extern "C" fn(*const WideChar);
type MainFn = unsafe extern "C" fn(c_int, *mut *mut WideChar) -> c_int;

/// Loader backed by the OS dynamic linker.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicLoader;

impl RuntimeLoader for DynamicLoader {
    type Library = DynamicRuntime;

    fn load(&self, path: &Path, entry_points: &EntryPoints) -> Result<DynamicRuntime, LoadError> {
        let library = Library::open(path)?;

        // Safety: the signatures match the runtime's exported C API.
        let (set_home, set_path, main) = unsafe {
            (
                library.get::<SetStringFn>(&entry_points.set_home)?,
                library.get::<SetStringFn>(&entry_points.set_path)?,
                library.get::<MainFn>(&entry_points.main)?,
            )
        };
        debug!(library = library.path(), "resolved runtime entry points");

        Ok(DynamicRuntime {
            library,
            set_home,
            set_path,
            main,
            retained: Vec::new(),
        })
    }
}

/// Runtime loaded through [`DynamicLoader`].
///
/// Strings passed to the setters are kept alive until the library is
/// released, since the runtime may keep the pointers rather than copy.
pub struct DynamicRuntime {
    // Field order: retained strings drop before the library unloads.
    set_home: SetStringFn,
    set_path: SetStringFn,
    main: MainFn,
    retained: Vec<WideString>,
    library: Library,
}

impl DynamicRuntime {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(self.library.path())
    }
}

impl RuntimeLibrary for DynamicRuntime {
    fn set_home(&mut self, home: WideString) {
        unsafe { (self.set_home)(home.as_ptr()) };
        self.retained.push(home);
    }

    fn set_path(&mut self, path: WideString) {
        unsafe { (self.set_path)(path.as_ptr()) };
        self.retained.push(path);
    }

    fn run_main(&mut self, args: Vec<WideString>) -> i32 {
        let mut argv: Vec<*mut WideChar> = args
            .iter()
            .map(|arg| arg.as_ptr() as *mut WideChar)
            .collect();
        let argc = argv.len() as c_int;
        let code = unsafe { (self.main)(argc, argv.as_mut_ptr()) };
        drop(args);
        code
    }
}
