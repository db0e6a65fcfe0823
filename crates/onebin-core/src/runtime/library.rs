//! Dynamic library loading
//!
//! Cross-platform support for loading shared libraries (.so, .dylib, .dll)

use std::ffi::CString;
#[cfg(unix)]
use std::ffi::CStr;
use std::path::Path;

use super::LoadError;

/// Cross-platform dynamic library handle
///
/// The library is unloaded when the handle is dropped.
pub struct Library {
    handle: LibraryHandle,
    path: String,
}

impl Library {
    /// Load a dynamic library from the given path.
    ///
    /// # Platform-specific behavior
    ///
    /// - **Linux/macOS**: `dlopen(RTLD_NOW | RTLD_LOCAL)`
    /// - **Windows**: `LoadLibraryW`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path_ref = path.as_ref();
        let handle = LibraryHandle::load(path_ref)?;

        Ok(Library {
            handle,
            path: path_ref.display().to_string(),
        })
    }

    /// Get a function pointer by name.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - The function signature matches the type T
    /// - The library remains loaded while using the function
    pub unsafe fn get<T: Copy>(&self, symbol: &str) -> Result<T, LoadError> {
        self.handle.symbol(symbol, &self.path)
    }

    /// Get the path this library was loaded from
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(unix)]
type LibraryHandle = UnixLibrary;

#[cfg(windows)]
type LibraryHandle = WindowsLibrary;

// ============================================================================
// Unix Implementation (Linux, macOS, BSD)
// ============================================================================

#[cfg(unix)]
struct UnixLibrary {
    handle: *mut std::ffi::c_void,
}

#[cfg(unix)]
impl UnixLibrary {
    fn load(path: &Path) -> Result<Self, LoadError> {
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|e| LoadError::NotFound {
            path: path.display().to_string(),
            reason: format!("invalid path: {}", e),
        })?;

        let handle = unsafe {
            // RTLD_NOW: Resolve all symbols immediately
            // RTLD_LOCAL: Symbols not available for subsequently loaded libraries
            libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL)
        };

        if handle.is_null() {
            return Err(LoadError::NotFound {
                path: path.display().to_string(),
                reason: last_dl_error(),
            });
        }

        Ok(UnixLibrary { handle })
    }

    unsafe fn symbol<T: Copy>(&self, name: &str, lib_path: &str) -> Result<T, LoadError> {
        let c_name = CString::new(name).map_err(|e| LoadError::SymbolNotFound {
            symbol: name.to_string(),
            library: lib_path.to_string(),
            reason: format!("invalid symbol name: {}", e),
        })?;

        // Clear any previous errors
        libc::dlerror();

        let symbol = libc::dlsym(self.handle, c_name.as_ptr());

        let err_ptr = libc::dlerror();
        if !err_ptr.is_null() || symbol.is_null() {
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: lib_path.to_string(),
                reason: if err_ptr.is_null() {
                    "symbol resolved to null".to_string()
                } else {
                    CStr::from_ptr(err_ptr).to_string_lossy().into_owned()
                },
            });
        }

        Ok(std::mem::transmute_copy(&symbol))
    }
}

#[cfg(unix)]
fn last_dl_error() -> String {
    unsafe {
        let err_ptr = libc::dlerror();
        if err_ptr.is_null() {
            "Unknown error".to_string()
        } else {
            CStr::from_ptr(err_ptr).to_string_lossy().into_owned()
        }
    }
}

#[cfg(unix)]
impl Drop for UnixLibrary {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
struct WindowsLibrary {
    handle: *mut std::ffi::c_void,
}

#[cfg(windows)]
impl WindowsLibrary {
    fn load(path: &Path) -> Result<Self, LoadError> {
        use std::os::windows::ffi::OsStrExt;

        // Convert to wide string
        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };

        if handle.is_null() {
            return Err(LoadError::NotFound {
                path: path.display().to_string(),
                reason: std::io::Error::last_os_error().to_string(),
            });
        }

        Ok(WindowsLibrary { handle })
    }

    unsafe fn symbol<T: Copy>(&self, name: &str, lib_path: &str) -> Result<T, LoadError> {
        let c_name = CString::new(name).map_err(|e| LoadError::SymbolNotFound {
            symbol: name.to_string(),
            library: lib_path.to_string(),
            reason: format!("invalid symbol name: {}", e),
        })?;

        let symbol = GetProcAddress(self.handle, c_name.as_ptr());

        if symbol.is_null() {
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: lib_path.to_string(),
                reason: std::io::Error::last_os_error().to_string(),
            });
        }

        Ok(std::mem::transmute_copy(&symbol))
    }
}

#[cfg(windows)]
impl Drop for WindowsLibrary {
    fn drop(&mut self) {
        unsafe {
            FreeLibrary(self.handle);
        }
    }
}

// Windows FFI declarations
#[cfg(windows)]
extern "system" {
    fn LoadLibraryW(filename: *const u16) -> *mut std::ffi::c_void;
    fn GetProcAddress(
        module: *mut std::ffi::c_void,
        procname: *const std::ffi::c_char,
    ) -> *mut std::ffi::c_void;
    fn FreeLibrary(module: *mut std::ffi::c_void) -> i32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_not_found() {
        let result = Library::open("/nonexistent/library.so");
        match result {
            Err(LoadError::NotFound { path, reason }) => {
                assert!(path.contains("nonexistent"));
                assert!(!reason.is_empty());
            }
            _ => panic!("Expected NotFound error"),
        }
    }
}
