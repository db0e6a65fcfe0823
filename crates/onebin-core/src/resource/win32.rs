//! Native PE resource section (Windows)
//!
//! Reads go through `FindResourceW`/`LoadResource`/`LockResource` against a
//! loaded module; updates through `BeginUpdateResourceW`/`UpdateResourceW`/
//! `EndUpdateResourceW`, discarded on drop unless committed.

use std::borrow::Cow;
use std::ffi::{c_void, OsStr};
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{ResourceError, ResourceKind, ResourceSource, ResourceUpdate};

const LOAD_LIBRARY_AS_DATAFILE: u32 = 0x0000_0002;
const LOAD_LIBRARY_AS_IMAGE_RESOURCE: u32 = 0x0000_0020;
/// `MAKELANGID(LANG_NEUTRAL, SUBLANG_NEUTRAL)`
const LANG_NEUTRAL: u16 = 0;

fn to_wide(path: &Path) -> Vec<u16> {
    OsStr::new(path)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// `MAKEINTRESOURCE`
fn int_resource(id: u16) -> *const u16 {
    id as usize as *const u16
}

/// Resources of a loaded module.
pub struct Win32Resources {
    module: *mut c_void,
    owned: bool,
    path: PathBuf,
}

impl Win32Resources {
    /// Resources of the running executable.
    pub fn current() -> Self {
        let module = unsafe { GetModuleHandleW(std::ptr::null()) };
        Self {
            module,
            owned: false,
            path: PathBuf::from("<current executable>"),
        }
    }

    /// Map another executable as a resource-only image.
    pub fn open(path: &Path) -> Result<Self, ResourceError> {
        let wide = to_wide(path);
        let module = unsafe {
            LoadLibraryExW(
                wide.as_ptr(),
                std::ptr::null_mut(),
                LOAD_LIBRARY_AS_DATAFILE | LOAD_LIBRARY_AS_IMAGE_RESOURCE,
            )
        };
        if module.is_null() {
            return Err(ResourceError::io(
                "Failed to open",
                path,
                io::Error::last_os_error(),
            ));
        }
        Ok(Self {
            module,
            owned: true,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResourceSource for Win32Resources {
    fn read(&self, kind: ResourceKind, id: u16) -> Result<Cow<'_, [u8]>, ResourceError> {
        unsafe {
            let info = FindResourceW(self.module, int_resource(id), int_resource(kind.type_id()));
            if info.is_null() {
                return Err(ResourceError::NotFound { kind, id });
            }
            let size = SizeofResource(self.module, info) as usize;
            let handle = LoadResource(self.module, info);
            if handle.is_null() {
                return Err(ResourceError::io(
                    "Failed to load resource from",
                    &self.path,
                    io::Error::last_os_error(),
                ));
            }
            let ptr = LockResource(handle) as *const u8;
            if ptr.is_null() {
                return Err(ResourceError::io(
                    "Failed to lock resource in",
                    &self.path,
                    io::Error::last_os_error(),
                ));
            }
            // Locked resource memory stays mapped while the module is loaded.
            Ok(Cow::Borrowed(std::slice::from_raw_parts(ptr, size)))
        }
    }
}

impl Drop for Win32Resources {
    fn drop(&mut self) {
        if self.owned && !self.module.is_null() {
            unsafe {
                FreeLibrary(self.module);
            }
        }
    }
}

/// Pending `BeginUpdateResourceW` transaction.
pub struct Win32Update {
    handle: Option<*mut c_void>,
    path: PathBuf,
}

impl Win32Update {
    /// Open an update transaction, keeping existing resources.
    pub fn begin(path: &Path) -> Result<Self, ResourceError> {
        let wide = to_wide(path);
        let handle = unsafe { BeginUpdateResourceW(wide.as_ptr(), 0) };
        if handle.is_null() {
            return Err(ResourceError::io(
                "Failed to begin resource update on",
                path,
                io::Error::last_os_error(),
            ));
        }
        Ok(Self {
            handle: Some(handle),
            path: path.to_path_buf(),
        })
    }
}

impl ResourceUpdate for Win32Update {
    fn put(&mut self, kind: ResourceKind, id: u16, data: &[u8]) -> Result<(), ResourceError> {
        let Some(handle) = self.handle else {
            return Err(ResourceError::io(
                "Transaction already closed for",
                &self.path,
                io::Error::from(io::ErrorKind::Other),
            ));
        };
        let size = u32::try_from(data.len()).map_err(|_| ResourceError::TooLarge {
            kind,
            id,
            size: data.len(),
        })?;
        let ok = unsafe {
            UpdateResourceW(
                handle,
                int_resource(kind.type_id()),
                int_resource(id),
                LANG_NEUTRAL,
                data.as_ptr() as *const c_void,
                size,
            )
        };
        if ok == 0 {
            return Err(ResourceError::io(
                "Failed to update resource in",
                &self.path,
                io::Error::last_os_error(),
            ));
        }
        debug!(%kind, id, size, "staged resource");
        Ok(())
    }

    fn commit(mut self) -> Result<(), ResourceError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let ok = unsafe { EndUpdateResourceW(handle, 0) };
        if ok == 0 {
            return Err(ResourceError::io(
                "Failed to commit resources to",
                &self.path,
                io::Error::last_os_error(),
            ));
        }
        Ok(())
    }
}

impl Drop for Win32Update {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            unsafe {
                EndUpdateResourceW(handle, 1);
            }
        }
    }
}

// Windows FFI declarations
extern "system" {
    fn GetModuleHandleW(name: *const u16) -> *mut c_void;
    fn LoadLibraryExW(name: *const u16, file: *mut c_void, flags: u32) -> *mut c_void;
    fn FreeLibrary(module: *mut c_void) -> i32;
    fn FindResourceW(module: *mut c_void, name: *const u16, kind: *const u16) -> *mut c_void;
    fn SizeofResource(module: *mut c_void, info: *mut c_void) -> u32;
    fn LoadResource(module: *mut c_void, info: *mut c_void) -> *mut c_void;
    fn LockResource(data: *mut c_void) -> *mut c_void;
    fn BeginUpdateResourceW(file: *const u16, delete_existing: i32) -> *mut c_void;
    fn UpdateResourceW(
        update: *mut c_void,
        kind: *const u16,
        name: *const u16,
        language: u16,
        data: *const c_void,
        size: u32,
    ) -> i32;
    fn EndUpdateResourceW(update: *mut c_void, discard: i32) -> i32;
}
