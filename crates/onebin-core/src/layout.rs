//! Resource layout schema
//!
//! The numeric resource IDs shared by the packer and the launcher. This table is
//! the wire format between build time and run time:
//!
//! ```text
//!  34  short runtime version      ("python36")
//!  35  long runtime version       ("python363_64")
//!  36/37   entry script name/data
//!  38/39   support library name/data
//!  42/43   application name/data
//!  46/47   runtime hash name/data
//!  48/49   runtime archive name/data
//!  50  runtime file count (1 byte)
//!  51..    runtime file data   (one per runtime file)
//!  151..   runtime file names  (data base + 100)
//! ```

use thiserror::Error;

/// Largest runtime file count expressible by the one-byte count slot.
pub const MAX_RUNTIME_FILES: usize = u8::MAX as usize;

/// Errors raised while validating a [`ResourceLayout`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    /// Resource ID 0 cannot be addressed as an integer resource.
    #[error("Resource slot '{0}' uses reserved ID 0")]
    ZeroId(&'static str),

    /// Two fixed slots share one ID.
    #[error("Resource slots '{first}' and '{second}' share ID {id}")]
    DuplicateId {
        id: u16,
        first: &'static str,
        second: &'static str,
    },

    /// A fixed slot falls inside a runtime-file range.
    #[error("Resource slot '{slot}' (ID {id}) overlaps the runtime file range {start}..{end}")]
    OverlapsRuntimeRange {
        slot: &'static str,
        id: u16,
        start: u32,
        end: u32,
    },

    /// The name and data bases coincide.
    #[error("Runtime name base and data base are both {0}")]
    RangesOverlap(u16),

    /// A runtime range runs past the largest resource ID.
    #[error("Runtime range starting at {0} does not fit in 16-bit resource IDs")]
    RangeOverflow(u16),

    /// Runtime file index outside the count slot's capacity.
    #[error("Runtime file index {index} exceeds the layout capacity of {capacity}")]
    IndexOutOfRange { index: usize, capacity: usize },
}

/// A pair of adjacent slots holding a file name and the file's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamedSlot {
    /// Slot holding the file name.
    pub name: u16,
    /// Slot holding the file contents.
    pub data: u16,
}

impl NamedSlot {
    pub const fn new(name: u16, data: u16) -> Self {
        Self { name, data }
    }
}

/// Numeric resource IDs of every slot in a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLayout {
    /// Short runtime version string, used for the library and stdlib zip names.
    pub short_version: u16,
    /// Long runtime version string, used for the install directory name.
    pub long_version: u16,
    pub entry_script: NamedSlot,
    pub support_library: NamedSlot,
    pub application: NamedSlot,
    pub runtime_hash: NamedSlot,
    pub runtime_archive: NamedSlot,
    /// One-byte count of runtime files.
    pub runtime_file_count: u16,
    /// First data slot of the runtime file run.
    pub runtime_files_base: u16,
    /// First name slot of the runtime file run.
    pub runtime_names_base: u16,
}

impl Default for ResourceLayout {
    fn default() -> Self {
        Self::standard()
    }
}

impl ResourceLayout {
    /// The layout every packed launcher uses.
    pub const fn standard() -> Self {
        Self {
            short_version: 34,
            long_version: 35,
            entry_script: NamedSlot::new(36, 37),
            support_library: NamedSlot::new(38, 39),
            application: NamedSlot::new(42, 43),
            runtime_hash: NamedSlot::new(46, 47),
            runtime_archive: NamedSlot::new(48, 49),
            runtime_file_count: 50,
            runtime_files_base: 51,
            runtime_names_base: 151,
        }
    }

    /// Check the layout for collisions, once, before anything reads or writes slots.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let fixed = self.fixed_ids();

        for (i, &(label, id)) in fixed.iter().enumerate() {
            if id == 0 {
                return Err(LayoutError::ZeroId(label));
            }
            if let Some(&(first, _)) = fixed[..i].iter().find(|(_, other)| *other == id) {
                return Err(LayoutError::DuplicateId {
                    id,
                    first,
                    second: label,
                });
            }
        }

        for base in [self.runtime_files_base, self.runtime_names_base] {
            if base == 0 {
                return Err(LayoutError::ZeroId("runtime base"));
            }
        }
        if self.runtime_files_base == self.runtime_names_base {
            return Err(LayoutError::RangesOverlap(self.runtime_files_base));
        }

        let capacity = self.runtime_capacity();
        for base in [self.runtime_files_base, self.runtime_names_base] {
            if base as usize + capacity > u16::MAX as usize + 1 {
                return Err(LayoutError::RangeOverflow(base));
            }
        }

        for &(slot, id) in &fixed {
            for base in [self.runtime_files_base, self.runtime_names_base] {
                let start = base as u32;
                let end = start + capacity as u32;
                if (start..end).contains(&(id as u32)) {
                    return Err(LayoutError::OverlapsRuntimeRange {
                        slot,
                        id,
                        start,
                        end,
                    });
                }
            }
        }

        Ok(())
    }

    /// Number of runtime files the layout can address.
    ///
    /// Bounded by the one-byte count and by the gap between the two bases,
    /// so that name and data runs never interleave.
    pub fn runtime_capacity(&self) -> usize {
        let gap = self.runtime_files_base.abs_diff(self.runtime_names_base) as usize;
        gap.min(MAX_RUNTIME_FILES)
    }

    /// Slot pair for the `index`-th runtime file.
    pub fn runtime_file_slot(&self, index: usize) -> Result<NamedSlot, LayoutError> {
        let capacity = self.runtime_capacity();
        if index >= capacity {
            return Err(LayoutError::IndexOutOfRange { index, capacity });
        }
        let offset = index as u16;
        Ok(NamedSlot::new(
            self.runtime_names_base + offset,
            self.runtime_files_base + offset,
        ))
    }

    /// Slots refreshed on every launch, in extraction order.
    pub fn application_slots(&self) -> [(&'static str, NamedSlot); 5] {
        [
            ("entry script", self.entry_script),
            ("support library", self.support_library),
            ("application", self.application),
            ("runtime archive", self.runtime_archive),
            ("runtime hash", self.runtime_hash),
        ]
    }

    /// Every fixed slot ID, labeled.
    pub fn fixed_ids(&self) -> Vec<(&'static str, u16)> {
        let mut ids = vec![
            ("short version", self.short_version),
            ("long version", self.long_version),
        ];
        for (label, slot) in self.application_slots() {
            ids.push((label, slot.name));
            ids.push((label, slot.data));
        }
        ids.push(("runtime file count", self.runtime_file_count));
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_layout_is_valid() {
        assert_eq!(ResourceLayout::standard().validate(), Ok(()));
    }

    #[test]
    fn test_standard_ids_match_wire_table() {
        let layout = ResourceLayout::standard();
        assert_eq!(layout.short_version, 34);
        assert_eq!(layout.long_version, 35);
        assert_eq!(layout.entry_script, NamedSlot::new(36, 37));
        assert_eq!(layout.support_library, NamedSlot::new(38, 39));
        assert_eq!(layout.application, NamedSlot::new(42, 43));
        assert_eq!(layout.runtime_hash, NamedSlot::new(46, 47));
        assert_eq!(layout.runtime_archive, NamedSlot::new(48, 49));
        assert_eq!(layout.runtime_file_count, 50);
        assert_eq!(layout.runtime_names_base - layout.runtime_files_base, 100);
    }

    #[test]
    fn test_runtime_file_slot_offsets() {
        let layout = ResourceLayout::standard();
        assert_eq!(layout.runtime_file_slot(0).unwrap(), NamedSlot::new(151, 51));
        assert_eq!(layout.runtime_file_slot(2).unwrap(), NamedSlot::new(153, 53));
        assert_eq!(layout.runtime_capacity(), 100);
        assert_eq!(layout.runtime_file_slot(99).unwrap(), NamedSlot::new(250, 150));
        assert_eq!(
            layout.runtime_file_slot(100),
            Err(LayoutError::IndexOutOfRange {
                index: 100,
                capacity: 100
            })
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut layout = ResourceLayout::standard();
        layout.long_version = layout.short_version;
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::DuplicateId { id: 34, .. })
        ));
    }

    #[test]
    fn test_zero_id_rejected() {
        let mut layout = ResourceLayout::standard();
        layout.runtime_file_count = 0;
        assert_eq!(
            layout.validate(),
            Err(LayoutError::ZeroId("runtime file count"))
        );
    }

    #[test]
    fn test_fixed_slot_inside_runtime_range_rejected() {
        let mut layout = ResourceLayout::standard();
        layout.runtime_files_base = 1000;
        layout.runtime_names_base = 1100;
        layout.application = NamedSlot::new(1005, 1006);
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::OverlapsRuntimeRange { id: 1005, .. })
        ));
    }

    #[test]
    fn test_overlapping_runtime_ranges_rejected() {
        let mut layout = ResourceLayout::standard();
        layout.runtime_names_base = layout.runtime_files_base;
        assert_eq!(layout.validate(), Err(LayoutError::RangesOverlap(51)));
    }
}
