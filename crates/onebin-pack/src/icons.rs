//! Icon groups built into the packer
//!
//! Both launcher icons ship inside the packer binary, so `pack` works without
//! an external icon source. Images are PNG-compressed icon entries.

use onebin_core::icon::{GroupIconEntry, DEBUG_ICON_GROUP, STANDARD_ICON_GROUP};
use onebin_core::{GroupIconDir, MemoryResources, ResourceKind};

macro_rules! icon_asset {
    ($name:literal) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/icons/", $name))
    };
}

/// `(group, [(image id, edge in pixels, image bytes)])`
const GROUPS: [(u16, [(u16, u8, &[u8]); 3]); 2] = [
    (
        STANDARD_ICON_GROUP,
        [
            (1, 16, icon_asset!("standard-16.png")),
            (2, 32, icon_asset!("standard-32.png")),
            (3, 48, icon_asset!("standard-48.png")),
        ],
    ),
    (
        DEBUG_ICON_GROUP,
        [
            (4, 16, icon_asset!("debug-16.png")),
            (5, 32, icon_asset!("debug-32.png")),
            (6, 48, icon_asset!("debug-48.png")),
        ],
    ),
];

/// The standard and debug icon groups with their images.
pub fn builtin() -> MemoryResources {
    let mut res = MemoryResources::new();
    for (group, images) in GROUPS {
        let mut dir = GroupIconDir {
            entries: Vec::with_capacity(images.len()),
        };
        for (id, edge, data) in images {
            dir.entries.push(GroupIconEntry {
                width: edge,
                height: edge,
                bit_count: 32,
                bytes_in_res: data.len() as u32,
                id,
            });
            res.insert(ResourceKind::Icon, id, data);
        }
        res.insert(ResourceKind::GroupIcon, group, dir.to_bytes());
    }
    res
}
