//! Icon group resources
//!
//! An icon group (`RT_GROUP_ICON`) is a small directory listing the individual
//! icon images (`RT_ICON`) that make it up:
//!
//! ```text
//! GRPICONDIR        6 bytes   reserved:u16, type:u16, count:u16
//! GRPICONDIRENTRY  14 bytes   width:u8, height:u8, colors:u8, reserved:u8,
//!                             planes:u16, bit_count:u16, bytes_in_res:u32, id:u16
//! ```
//!
//! All fields are little-endian.

use std::fmt;
use std::str::FromStr;

/// Icon group ID of the standard icon in the packer's own resources.
pub const STANDARD_ICON_GROUP: u16 = 101;

/// Icon group ID of the debug icon in the packer's own resources.
pub const DEBUG_ICON_GROUP: u16 = 102;

/// Icon group ID written into packed executables.
pub const TARGET_ICON_GROUP: u16 = 101;

const DIR_HEADER_SIZE: usize = 6;
const DIR_ENTRY_SIZE: usize = 14;

/// Which icon to brand the packed executable with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IconChoice {
    #[default]
    Standard,
    Debug,
}

impl IconChoice {
    /// Icon group ID to copy from the icon source.
    pub fn group_id(self) -> u16 {
        match self {
            IconChoice::Standard => STANDARD_ICON_GROUP,
            IconChoice::Debug => DEBUG_ICON_GROUP,
        }
    }
}

impl FromStr for IconChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" | "default" => Ok(IconChoice::Standard),
            "debug" => Ok(IconChoice::Debug),
            other => Err(format!(
                "unknown icon choice '{}' (expected 'standard' or 'debug')",
                other
            )),
        }
    }
}

impl fmt::Display for IconChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IconChoice::Standard => write!(f, "standard"),
            IconChoice::Debug => write!(f, "debug"),
        }
    }
}

/// One image referenced by an icon group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupIconEntry {
    pub width: u8,
    pub height: u8,
    pub bit_count: u16,
    pub bytes_in_res: u32,
    /// `RT_ICON` resource ID of the image.
    pub id: u16,
}

/// Decoded icon group directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupIconDir {
    pub entries: Vec<GroupIconEntry>,
}

impl GroupIconDir {
    /// Decode a group directory, checking that every declared entry is present.
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < DIR_HEADER_SIZE {
            return Err(format!(
                "icon group is {} bytes, shorter than its {}-byte header",
                bytes.len(),
                DIR_HEADER_SIZE
            ));
        }
        let kind = u16::from_le_bytes([bytes[2], bytes[3]]);
        if kind != 1 {
            return Err(format!("icon group has type {}, expected 1", kind));
        }
        let count = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
        let needed = DIR_HEADER_SIZE + count * DIR_ENTRY_SIZE;
        if bytes.len() < needed {
            return Err(format!(
                "icon group declares {} images but holds {} bytes (needs {})",
                count,
                bytes.len(),
                needed
            ));
        }

        let entries = bytes[DIR_HEADER_SIZE..needed]
            .chunks_exact(DIR_ENTRY_SIZE)
            .map(|e| GroupIconEntry {
                width: e[0],
                height: e[1],
                bit_count: u16::from_le_bytes([e[6], e[7]]),
                bytes_in_res: u32::from_le_bytes([e[8], e[9], e[10], e[11]]),
                id: u16::from_le_bytes([e[12], e[13]]),
            })
            .collect();

        Ok(Self { entries })
    }

    /// Image resource IDs in directory order.
    pub fn image_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    /// Encode back into the on-disk directory layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DIR_HEADER_SIZE + self.entries.len() * DIR_ENTRY_SIZE);
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        for e in &self.entries {
            out.extend_from_slice(&[e.width, e.height, 0, 0]);
            out.extend_from_slice(&1u16.to_le_bytes());
            out.extend_from_slice(&e.bit_count.to_le_bytes());
            out.extend_from_slice(&e.bytes_in_res.to_le_bytes());
            out.extend_from_slice(&e.id.to_le_bytes());
        }
        out
    }
}
