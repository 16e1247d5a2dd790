//! This file contains the mutation table engine: a fixed list of byte
//! overrides that gets stamped onto an outbound packet buffer when a module
//! decides the packet is the one it wants to malform.
//!
//! Tables are built at compile time out of `MutationEntry` constants, the
//! engine never resizes the buffer it is handed and never writes past it.

/// A single override, `buf[offset] = value`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MutationEntry {
    pub offset: usize,
    pub value: u8,
}

impl MutationEntry {
    pub const fn new(offset: usize, value: u8) -> Self {
        MutationEntry { offset, value }
    }

    /// Build an entry from an offset observed in a capture whose first `base`
    /// bytes are not part of the buffer the module receives
    pub const fn rebased(field_offset: usize, base: usize, value: u8) -> Self {
        MutationEntry {
            offset: field_offset - base,
            value,
        }
    }
}

/// How much of a table actually landed in a buffer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AppliedCount {
    pub applied: usize,
    pub total: usize,
}

impl AppliedCount {
    /// Every entry in the table was written
    pub fn is_complete(&self) -> bool {
        self.applied == self.total
    }

    /// Nothing was written
    pub fn is_none(&self) -> bool {
        self.applied == 0
    }
}

/// Ordered sequence of overrides, applied in declaration order
#[derive(Clone, Copy, Debug)]
pub struct MutationTable<'a> {
    entries: &'a [MutationEntry],
}

impl<'a> MutationTable<'a> {
    pub const fn new(entries: &'a [MutationEntry]) -> Self {
        MutationTable { entries }
    }

    pub fn entries(&self) -> &'a [MutationEntry] {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Smallest offset the table touches, `None` for an empty table
    pub fn min_offset(&self) -> Option<usize> {
        self.entries.iter().map(|e| e.offset).min()
    }

    /// Buffer length needed for every entry to land
    pub fn required_len(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.offset + 1)
            .max()
            .unwrap_or(0)
    }

    /// Whether a buffer of `len` bytes can take the whole table
    pub fn fits(&self, len: usize) -> bool {
        self.required_len() <= len
    }

    /// Write every in-bounds entry into `buf`, out of range entries are
    /// skipped and show up as the gap between `applied` and `total`
    pub fn apply(&self, buf: &mut [u8]) -> AppliedCount {
        let mut applied = 0;

        for entry in self.entries {
            let Some(byte) = buf.get_mut(entry.offset) else {
                continue;
            };

            *byte = entry.value;
            applied += 1;
        }

        AppliedCount {
            applied,
            total: self.entries.len(),
        }
    }
}
