//! Wide-character strings for the runtime's entry points
//!
//! The runtime takes `wchar_t*` arguments: UTF-16 code units on Windows, one
//! Unicode scalar value per unit elsewhere. Conversion never truncates or
//! substitutes; input the target encoding cannot carry is an error.

use std::ffi::OsStr;
use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Platform `wchar_t`.
#[cfg(windows)]
pub type WideChar = u16;

/// Platform `wchar_t`.
#[cfg(not(windows))]
pub type WideChar = u32;

/// Errors converting a host string into a wide string
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    /// NUL would terminate the string early
    #[error("String contains an interior NUL at position {position}: {lossy:?}")]
    InteriorNul { position: usize, lossy: String },

    /// Bytes are not valid Unicode on this host
    #[error("String is not valid Unicode: {lossy:?}")]
    InvalidUnicode { lossy: String },
}

/// NUL-terminated buffer of [`WideChar`] units.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct WideString {
    units: Vec<WideChar>,
}

impl WideString {
    /// Convert a host string.
    #[cfg(windows)]
    pub fn from_os_str(s: &OsStr) -> Result<Self, EncodingError> {
        use std::os::windows::ffi::OsStrExt;
        Self::from_units(s.encode_wide().collect(), || s.to_string_lossy().into_owned())
    }

    /// Convert a host string.
    #[cfg(not(windows))]
    pub fn from_os_str(s: &OsStr) -> Result<Self, EncodingError> {
        let text = s.to_str().ok_or_else(|| EncodingError::InvalidUnicode {
            lossy: s.to_string_lossy().into_owned(),
        })?;
        Self::from_str(text)
    }

    /// Convert a Rust string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, EncodingError> {
        #[cfg(windows)]
        let units: Vec<WideChar> = s.encode_utf16().collect();
        #[cfg(not(windows))]
        let units: Vec<WideChar> = s.chars().map(|c| c as u32).collect();
        Self::from_units(units, || s.to_string())
    }

    /// Convert a path.
    pub fn from_path(path: &Path) -> Result<Self, EncodingError> {
        Self::from_os_str(path.as_os_str())
    }

    fn from_units(
        mut units: Vec<WideChar>,
        lossy: impl FnOnce() -> String,
    ) -> Result<Self, EncodingError> {
        if let Some(position) = units.iter().position(|&u| u == 0) {
            return Err(EncodingError::InteriorNul {
                position,
                lossy: lossy(),
            });
        }
        units.push(0);
        Ok(Self { units })
    }

    /// Pointer to the NUL-terminated buffer.
    pub fn as_ptr(&self) -> *const WideChar {
        self.units.as_ptr()
    }

    /// Units without the terminator.
    pub fn as_units(&self) -> &[WideChar] {
        &self.units[..self.units.len() - 1]
    }

    /// Number of units, excluding the terminator.
    pub fn len(&self) -> usize {
        self.units.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode back to a Rust string, replacing anything undecodable.
    pub fn to_string_lossy(&self) -> String {
        #[cfg(windows)]
        {
            String::from_utf16_lossy(self.as_units())
        }
        #[cfg(not(windows))]
        {
            self.as_units()
                .iter()
                .map(|&u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
    }
}

impl fmt::Debug for WideString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WideString({:?})", self.to_string_lossy())
    }
}

impl fmt::Display for WideString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}
