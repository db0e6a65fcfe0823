//! Appended resource section
//!
//! Portable resource container for hosts without a native resource section.
//! Resources live in a section appended to the executable:
//!
//! ```text
//! ┌─────────────────────────┐
//! │  host executable        │  ← unchanged launcher image
//! ├─────────────────────────┤
//! │  Entry                  │  ← EntryHeader + data
//! │  Entry                  │
//! │  ...                    │
//! ├─────────────────────────┤
//! │  Trailer                │  ← fixed-size, at very end of file
//! └─────────────────────────┘
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{ResourceError, ResourceKind, ResourceSource, ResourceUpdate};

/// Magic bytes identifying a resource trailer.
pub const TRAILER_MAGIC: [u8; 8] = *b"ONEBIN\0\0";

/// Size of the trailer in bytes.
pub const TRAILER_SIZE: usize = std::mem::size_of::<ResourceTrailer>();

/// Size of a single entry header in bytes.
pub const ENTRY_HEADER_SIZE: usize = std::mem::size_of::<EntryHeader>();

/// Fixed-size trailer at the very end of a packed executable.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct ResourceTrailer {
    /// Magic bytes: b"ONEBIN\0\0"
    pub magic: [u8; 8],

    /// Number of entries in the section.
    pub entry_count: u32,

    /// CRC32 checksum of the entry section.
    pub checksum: u32,

    /// Size of the entry section in bytes.
    pub section_size: u64,

    /// Offset from the start of the file to the first entry.
    /// This equals the size of the host executable.
    pub section_offset: u64,

    /// Size of this trailer struct (for forward compatibility).
    pub trailer_size: u32,
}

/// Header preceding each entry's data.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct EntryHeader {
    /// Native resource type ID.
    pub type_id: u16,

    /// Resource ID.
    pub id: u16,

    /// Size of the data in bytes.
    pub data_size: u64,
}

impl ResourceTrailer {
    pub fn is_valid(&self) -> bool {
        self.magic == TRAILER_MAGIC
    }

    /// Read a trailer from raw bytes (must be at least TRAILER_SIZE bytes).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < TRAILER_SIZE {
            return None;
        }

        // Safety: ResourceTrailer is repr(C, packed) with no padding
        let trailer = unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const ResourceTrailer) };

        if trailer.is_valid() {
            Some(trailer)
        } else {
            None
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; TRAILER_SIZE];
        unsafe {
            std::ptr::write_unaligned(bytes.as_mut_ptr() as *mut ResourceTrailer, *self);
        }
        bytes
    }
}

impl EntryHeader {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < ENTRY_HEADER_SIZE {
            return None;
        }
        Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const EntryHeader) })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; ENTRY_HEADER_SIZE];
        unsafe {
            std::ptr::write_unaligned(bytes.as_mut_ptr() as *mut EntryHeader, *self);
        }
        bytes
    }
}

/// Read-only view of an executable's appended resources.
#[derive(Debug)]
pub struct TrailerResources {
    path: PathBuf,
    data: Vec<u8>,
    host_len: usize,
    index: BTreeMap<(ResourceKind, u16), Range<usize>>,
}

impl TrailerResources {
    /// Open an executable. A file without a trailer is an empty container.
    pub fn open(path: &Path) -> Result<Self, ResourceError> {
        let data = fs::read(path).map_err(|e| ResourceError::io("Failed to read", path, e))?;
        Self::from_bytes(path, data)
    }

    /// Parse an in-memory image; `path` is used for diagnostics only.
    pub fn from_bytes(path: &Path, data: Vec<u8>) -> Result<Self, ResourceError> {
        let corrupt = |reason: String| ResourceError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };

        let trailer = if data.len() >= TRAILER_SIZE {
            ResourceTrailer::from_bytes(&data[data.len() - TRAILER_SIZE..])
        } else {
            None
        };

        let Some(trailer) = trailer else {
            let host_len = data.len();
            return Ok(Self {
                path: path.to_path_buf(),
                data,
                host_len,
                index: BTreeMap::new(),
            });
        };

        // Copy packed fields to locals to avoid unaligned references
        let section_offset = trailer.section_offset as usize;
        let section_size = trailer.section_size as usize;
        let entry_count = trailer.entry_count as usize;
        let checksum = trailer.checksum;

        let section_end = data.len() - TRAILER_SIZE;
        if section_offset.checked_add(section_size) != Some(section_end) {
            return Err(corrupt(format!(
                "section {}+{} does not end at trailer offset {}",
                section_offset, section_size, section_end
            )));
        }

        let section = &data[section_offset..section_end];
        let computed = crc32fast::hash(section);
        if computed != checksum {
            return Err(corrupt(format!(
                "checksum mismatch: expected {:08x}, got {:08x}",
                checksum, computed
            )));
        }

        let mut index = BTreeMap::new();
        let mut offset = section_offset;
        for n in 0..entry_count {
            let header = EntryHeader::from_bytes(&data[offset..section_end])
                .ok_or_else(|| corrupt(format!("entry {} header is truncated", n)))?;
            offset += ENTRY_HEADER_SIZE;

            let type_id = header.type_id;
            let id = header.id;
            let size = header.data_size as usize;
            let kind = ResourceKind::from_type_id(type_id)
                .ok_or_else(|| corrupt(format!("entry {} has unknown type {}", n, type_id)))?;

            let end = offset
                .checked_add(size)
                .filter(|&end| end <= section_end)
                .ok_or_else(|| corrupt(format!("entry {} data is truncated", n)))?;
            index.insert((kind, id), offset..end);
            offset = end;
        }

        if offset != section_end {
            return Err(corrupt(format!(
                "{} trailing bytes after the last entry",
                section_end - offset
            )));
        }

        debug!(path = %path.display(), entries = index.len(), "opened resource trailer");

        Ok(Self {
            path: path.to_path_buf(),
            data,
            host_len: section_offset,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The host executable image, without the appended section.
    pub fn host_image(&self) -> &[u8] {
        &self.data[..self.host_len]
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Keys of every entry, in `(kind, id)` order.
    pub fn keys(&self) -> impl Iterator<Item = (ResourceKind, u16)> + '_ {
        self.index.keys().copied()
    }
}

impl ResourceSource for TrailerResources {
    fn read(&self, kind: ResourceKind, id: u16) -> Result<Cow<'_, [u8]>, ResourceError> {
        self.index
            .get(&(kind, id))
            .map(|range| Cow::Borrowed(&self.data[range.clone()]))
            .ok_or(ResourceError::NotFound { kind, id })
    }
}

/// Update transaction against an executable's appended section.
///
/// Commit writes the whole image to a sibling temporary file and renames it
/// over the target, so readers see either the old or the new image.
pub struct TrailerUpdate {
    target: PathBuf,
    host: Vec<u8>,
    entries: BTreeMap<(ResourceKind, u16), Vec<u8>>,
    /// Keeps concurrent commits against one target on separate temp files.
    temp_suffix: String,
}

impl TrailerUpdate {
    pub fn begin(target: &Path) -> Result<Self, ResourceError> {
        let existing = TrailerResources::open(target)?;
        let entries = existing
            .index
            .iter()
            .map(|(&key, range)| (key, existing.data[range.clone()].to_vec()))
            .collect();
        let mut host = existing.data;
        host.truncate(existing.host_len);

        Ok(Self {
            target: target.to_path_buf(),
            host,
            entries,
            temp_suffix: crate::unique_suffix(),
        })
    }

    /// Serialize host image, entries, and trailer.
    fn encode(&self) -> Vec<u8> {
        let section_size: usize = self
            .entries
            .values()
            .map(|data| ENTRY_HEADER_SIZE + data.len())
            .sum();
        let mut image = Vec::with_capacity(self.host.len() + section_size + TRAILER_SIZE);
        image.extend_from_slice(&self.host);

        for (&(kind, id), data) in &self.entries {
            let header = EntryHeader {
                type_id: kind.type_id(),
                id,
                data_size: data.len() as u64,
            };
            image.extend_from_slice(&header.to_bytes());
            image.extend_from_slice(data);
        }

        let trailer = ResourceTrailer {
            magic: TRAILER_MAGIC,
            entry_count: self.entries.len() as u32,
            checksum: crc32fast::hash(&image[self.host.len()..]),
            section_size: section_size as u64,
            section_offset: self.host.len() as u64,
            trailer_size: TRAILER_SIZE as u32,
        };
        image.extend_from_slice(&trailer.to_bytes());
        image
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.onebin-tmp", self.temp_suffix));
        self.target.with_file_name(name)
    }
}

impl ResourceUpdate for TrailerUpdate {
    fn put(&mut self, kind: ResourceKind, id: u16, data: &[u8]) -> Result<(), ResourceError> {
        if self.entries.len() >= u32::MAX as usize {
            return Err(ResourceError::TooLarge {
                kind,
                id,
                size: data.len(),
            });
        }
        self.entries.insert((kind, id), data.to_vec());
        Ok(())
    }

    fn commit(self) -> Result<(), ResourceError> {
        let image = self.encode();
        let tmp_path = self.temp_path();

        let write = || -> std::io::Result<()> {
            let mut tmp_file = fs::File::create(&tmp_path)?;
            tmp_file.write_all(&image)?;
            tmp_file.sync_all()?;
            if let Ok(meta) = fs::metadata(&self.target) {
                fs::set_permissions(&tmp_path, meta.permissions())?;
            }
            fs::rename(&tmp_path, &self.target)
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp_path);
            return Err(ResourceError::io("Failed to update", &self.target, e));
        }

        debug!(
            path = %self.target.display(),
            entries = self.entries.len(),
            bytes = image.len(),
            "committed resource trailer"
        );
        Ok(())
    }
}
