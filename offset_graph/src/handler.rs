//! Origin stack and patch slot registry shared by the object reader
//! and writer.

use std::collections::BTreeSet;

use crate::OffsetError;

/// On-disk width of an offset field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OffsetFormat {
    #[default]
    U32,
    U64,
}

impl OffsetFormat {
    /// Encoded size in bytes.
    #[inline]
    pub const fn size(self) -> u64 {
        match self {
            OffsetFormat::U32 => 4,
            OffsetFormat::U64 => 8,
        }
    }
}

/// How a raw offset of zero resolves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ZeroHandling {
    /// Zero marks a null reference and resolves to `None`.
    #[default]
    Null,
    /// Zero is an ordinary offset relative to the current origin.
    Valid,
}

/// Tracks offset origins and the stream positions holding offset fields.
///
/// Origins form a stack rooted at 0. Raw offsets on the wire are relative
/// to the origin current at the time the field is read or patched, so a
/// nested structure can keep its own base without rewriting child offsets.
/// Every offset field position is registered as a slot; the slot set is
/// what a relocation table would enumerate.
#[derive(Clone, Debug)]
pub struct OffsetHandler {
    origins: Vec<u64>,
    slots: BTreeSet<u64>,
    zero: ZeroHandling,
}

impl Default for OffsetHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl OffsetHandler {
    pub fn new() -> Self {
        Self::with_zero_handling(ZeroHandling::Null)
    }

    pub fn with_zero_handling(zero: ZeroHandling) -> Self {
        OffsetHandler {
            origins: vec![0],
            slots: BTreeSet::new(),
            zero,
        }
    }

    /// The origin offsets currently resolve against.
    #[inline]
    pub fn origin(&self) -> u64 {
        self.origins.last().copied().unwrap_or(0)
    }

    pub fn push_origin(&mut self, origin: u64) {
        self.origins.push(origin);
    }

    /// Pops the innermost origin. The root origin cannot be popped.
    pub fn pop_origin(&mut self) -> Result<u64, OffsetError> {
        if self.origins.len() > 1 {
            if let Some(origin) = self.origins.pop() {
                return Ok(origin);
            }
        }
        Err(OffsetError::OriginStackEmpty)
    }

    /// Records `position` as holding an offset field.
    pub fn register_slot(&mut self, position: u64) {
        self.slots.insert(position);
    }

    pub fn register_slots(&mut self, positions: impl IntoIterator<Item = u64>) {
        self.slots.extend(positions);
    }

    pub fn is_registered(&self, position: u64) -> bool {
        self.slots.contains(&position)
    }

    /// Registered slot positions in ascending order.
    pub fn slots(&self) -> impl Iterator<Item = u64> + '_ {
        self.slots.iter().copied()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The wire encoding of a null reference.
    #[inline]
    pub const fn null_offset() -> u64 {
        0
    }

    /// The raw offset that resolves to `position` under the current origin.
    pub fn calculate_offset(&self, position: u64) -> u64 {
        position.wrapping_sub(self.origin())
    }

    /// Resolves a raw on-disk offset to an absolute position. `None` when
    /// the offset is null, overflows, or points past `stream_len`.
    pub fn resolve(&self, raw: u64, stream_len: u64) -> Option<u64> {
        if raw == 0 && self.zero == ZeroHandling::Null {
            return None;
        }
        let target = self.origin().checked_add(raw)?;
        if target > stream_len {
            return None;
        }
        Some(target)
    }

    /// [`resolve`](Self::resolve) for an offset read out of `slot`.
    /// When any slots are registered, unregistered positions resolve to
    /// `None`.
    pub fn resolve_at(&self, slot: u64, raw: u64, stream_len: u64) -> Option<u64> {
        if !self.slots.is_empty() && !self.is_registered(slot) {
            return None;
        }
        self.resolve(raw, stream_len)
    }

    /// Drops all slots and non-root origins.
    pub fn clear(&mut self) {
        self.origins.truncate(1);
        self.slots.clear();
    }
}
