//! In-memory resource container

use std::borrow::Cow;
use std::collections::BTreeMap;

use super::{ResourceError, ResourceKind, ResourceSource, ResourceUpdate};

/// Resource map held in memory.
///
/// Serves as a source, and `&mut MemoryResources` as an update transaction that
/// buffers puts until commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryResources {
    entries: BTreeMap<(ResourceKind, u16), Vec<u8>>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry directly, bypassing any transaction.
    pub fn insert(&mut self, kind: ResourceKind, id: u16, data: impl Into<Vec<u8>>) {
        self.entries.insert((kind, id), data.into());
    }

    /// Builder-style [`insert`](Self::insert) for raw data.
    pub fn with_raw(mut self, id: u16, data: impl Into<Vec<u8>>) -> Self {
        self.insert(ResourceKind::RawData, id, data);
        self
    }

    pub fn remove(&mut self, kind: ResourceKind, id: u16) -> Option<Vec<u8>> {
        self.entries.remove(&(kind, id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in `(kind, id)` order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, u16, &[u8])> {
        self.entries
            .iter()
            .map(|(&(kind, id), data)| (kind, id, data.as_slice()))
    }

    /// Start a buffered transaction against this map.
    pub fn begin_update(&mut self) -> MemoryUpdate<'_> {
        MemoryUpdate {
            target: self,
            staged: BTreeMap::new(),
        }
    }
}

impl ResourceSource for MemoryResources {
    fn read(&self, kind: ResourceKind, id: u16) -> Result<Cow<'_, [u8]>, ResourceError> {
        self.entries
            .get(&(kind, id))
            .map(|data| Cow::Borrowed(data.as_slice()))
            .ok_or(ResourceError::NotFound { kind, id })
    }
}

/// Buffered transaction against a [`MemoryResources`].
pub struct MemoryUpdate<'a> {
    target: &'a mut MemoryResources,
    staged: BTreeMap<(ResourceKind, u16), Vec<u8>>,
}

impl ResourceUpdate for MemoryUpdate<'_> {
    fn put(&mut self, kind: ResourceKind, id: u16, data: &[u8]) -> Result<(), ResourceError> {
        self.staged.insert((kind, id), data.to_vec());
        Ok(())
    }

    fn commit(self) -> Result<(), ResourceError> {
        self.target.entries.extend(self.staged);
        Ok(())
    }
}
