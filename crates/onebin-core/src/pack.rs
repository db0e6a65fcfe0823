//! Resource packing
//!
//! Copies an icon group into a target executable and stores each payload file
//! as raw data under the resource ID spelled by its file name (`42.bin` → #42).
//! Everything goes through one update transaction; an error before commit
//! drops it and the target is left as it was.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::icon::{GroupIconDir, IconChoice, TARGET_ICON_GROUP};
use crate::resource::{ResourceError, ResourceKind, ResourceSource, ResourceUpdate};

/// Errors that can occur while packing
#[derive(Debug, Error)]
pub enum PackError {
    /// File base name is not a decimal resource ID
    #[error("File name '{}' is not a decimal resource ID", .0.display())]
    InvalidResourceName(PathBuf),

    /// Icon group or image missing from the icon source
    #[error("Icon resource {kind} #{id} is missing from the icon source")]
    MissingIcon { kind: ResourceKind, id: u16 },

    /// Icon group data could not be decoded
    #[error("Icon group #{id} is malformed: {reason}")]
    MalformedIcon { id: u16, reason: String },

    /// Payload file could not be read
    #[error("Failed to read payload file {}: {source}", path.display())]
    ReadPayload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Container failure
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// One payload file stored by [`pack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFile {
    pub id: u16,
    pub path: PathBuf,
    pub size: usize,
}

/// Summary of a committed pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackReport {
    pub icon: IconChoice,
    /// Image IDs copied along with the group.
    pub icon_images: Vec<u16>,
    pub files: Vec<PackedFile>,
}

/// Parse the resource ID from a payload file's base name, without extension.
pub fn resource_id_from_path(path: &Path) -> Result<u16, PackError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|stem| stem.parse::<u16>().ok())
        .filter(|&id| id != 0)
        .ok_or_else(|| PackError::InvalidResourceName(path.to_path_buf()))
}

/// Copy the chosen icon group, and every image it references, into `txn`.
pub fn copy_icon_group<S, U>(
    icon_source: &S,
    choice: IconChoice,
    txn: &mut U,
) -> Result<Vec<u16>, PackError>
where
    S: ResourceSource + ?Sized,
    U: ResourceUpdate,
{
    let group_id = choice.group_id();
    let group = icon_source
        .read(ResourceKind::GroupIcon, group_id)
        .map_err(|e| missing_icon(e, ResourceKind::GroupIcon, group_id))?;
    let dir = GroupIconDir::parse(&group).map_err(|reason| PackError::MalformedIcon {
        id: group_id,
        reason,
    })?;

    txn.put(ResourceKind::GroupIcon, TARGET_ICON_GROUP, &group)?;

    let mut images = Vec::with_capacity(dir.entries.len());
    for image_id in dir.image_ids() {
        let image = icon_source
            .read(ResourceKind::Icon, image_id)
            .map_err(|e| missing_icon(e, ResourceKind::Icon, image_id))?;
        txn.put(ResourceKind::Icon, image_id, &image)?;
        images.push(image_id);
    }

    debug!(group = group_id, images = images.len(), "copied icon group");
    Ok(images)
}

fn missing_icon(err: ResourceError, kind: ResourceKind, id: u16) -> PackError {
    if err.is_not_found() {
        PackError::MissingIcon { kind, id }
    } else {
        PackError::Resource(err)
    }
}

/// Pack `files` and the chosen icon into `txn`, then commit.
pub fn pack<S, U, P>(
    mut txn: U,
    icon_source: &S,
    icon: IconChoice,
    files: &[P],
) -> Result<PackReport, PackError>
where
    S: ResourceSource + ?Sized,
    U: ResourceUpdate,
    P: AsRef<Path>,
{
    let icon_images = copy_icon_group(icon_source, icon, &mut txn)?;

    let mut packed = Vec::with_capacity(files.len());
    for path in files {
        let path = path.as_ref();
        let id = resource_id_from_path(path)?;
        let data = fs::read(path).map_err(|source| PackError::ReadPayload {
            path: path.to_path_buf(),
            source,
        })?;
        txn.put(ResourceKind::RawData, id, &data)?;
        debug!(id, size = data.len(), path = %path.display(), "staged payload");
        packed.push(PackedFile {
            id,
            path: path.to_path_buf(),
            size: data.len(),
        });
    }

    txn.commit()?;
    info!(files = packed.len(), %icon, "resources committed");

    Ok(PackReport {
        icon,
        icon_images,
        files: packed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icon::{GroupIconEntry, STANDARD_ICON_GROUP};
    use crate::resource::MemoryResources;
    use tempfile::TempDir;

    fn icon_source() -> MemoryResources {
        let dir = GroupIconDir {
            entries: vec![GroupIconEntry {
                width: 32,
                height: 32,
                bit_count: 32,
                bytes_in_res: 4,
                id: 7,
            }],
        };
        let mut res = MemoryResources::new();
        res.insert(ResourceKind::GroupIcon, STANDARD_ICON_GROUP, dir.to_bytes());
        res.insert(ResourceKind::Icon, 7, vec![1, 2, 3, 4]);
        res
    }

    #[test]
    fn test_resource_id_from_path() {
        assert_eq!(resource_id_from_path(Path::new("dir/42.bin")).unwrap(), 42);
        assert_eq!(resource_id_from_path(Path::new("151")).unwrap(), 151);
        assert!(matches!(
            resource_id_from_path(Path::new("abc.bin")),
            Err(PackError::InvalidResourceName(_))
        ));
        assert!(resource_id_from_path(Path::new("-3.bin")).is_err());
        assert!(resource_id_from_path(Path::new("70000.bin")).is_err());
        assert!(resource_id_from_path(Path::new("0.bin")).is_err());
    }

    #[test]
    fn test_pack_into_memory() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("42.bin");
        fs::write(&file, b"hello resource").unwrap();

        let mut target = MemoryResources::new();
        let report = pack(target.begin_update(), &icon_source(), IconChoice::Standard, &[&file]).unwrap();

        assert_eq!(report.icon_images, vec![7]);
        assert_eq!(report.files[0].id, 42);
        assert_eq!(
            target.read(ResourceKind::RawData, 42).unwrap().as_ref(),
            b"hello resource"
        );
        assert!(target.contains(ResourceKind::GroupIcon, TARGET_ICON_GROUP));
        assert_eq!(target.read(ResourceKind::Icon, 7).unwrap().as_ref(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_missing_icon_is_fatal_and_commits_nothing() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("40.bin");
        fs::write(&file, b"x").unwrap();

        let mut target = MemoryResources::new();
        let err = pack(target.begin_update(), &icon_source(), IconChoice::Debug, &[&file]).unwrap_err();
        assert!(matches!(err, PackError::MissingIcon { kind: ResourceKind::GroupIcon, .. }));
        assert!(target.is_empty());
    }

    #[test]
    fn test_missing_payload_aborts_before_commit() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("36.bin");
        fs::write(&good, b"launch.py").unwrap();
        let missing = tmp.path().join("37.bin");

        let mut target = MemoryResources::new();
        let err = pack(
            target.begin_update(),
            &icon_source(),
            IconChoice::Standard,
            &[&good, &missing],
        )
        .unwrap_err();
        assert!(matches!(err, PackError::ReadPayload { .. }));
        assert!(target.is_empty());
    }

    #[test]
    fn test_bad_file_name_aborts_before_commit() {
        let tmp = TempDir::new().unwrap();
        let bad = tmp.path().join("launch.py");
        fs::write(&bad, b"print()").unwrap();

        let mut target = MemoryResources::new();
        let err = pack(target.begin_update(), &icon_source(), IconChoice::Standard, &[&bad]).unwrap_err();
        assert!(matches!(err, PackError::InvalidResourceName(_)));
        assert!(target.is_empty());
    }
}
