//! Hardware policy tables.
//!
//! A policy table holds the four retry steps the transmit path walks. Each
//! station owns a double buffer: the writer fills the inactive half and a
//! single selector flip publishes it, so a transmission in progress never
//! reads a half-written table.

use core::fmt;

use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::descriptor::{DecodeError, LegacyRate, Preamble, RateDescriptor};
use crate::tuning::{BROADCAST_RETRY_LIMIT, RETRY_STEPS};

const RETRY_LIMIT_OFT: u32 = 16;
const DESCRIPTOR_MASK: u32 = 0xFFFF;
const BUFFERS: usize = 2;

/// One retry step as consumed by hardware.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PolicyEntry {
    pub retry_limit: u8,
    /// Packed [`RateDescriptor`] word.
    pub descriptor: u16,
}

impl PolicyEntry {
    #[must_use]
    pub const fn new(descriptor: RateDescriptor, retry_limit: u8) -> Self {
        Self {
            retry_limit,
            descriptor: descriptor.to_raw(),
        }
    }

    /// Decodes the packed descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the word is not a valid descriptor.
    pub fn decode(&self) -> Result<RateDescriptor, DecodeError> {
        RateDescriptor::from_raw(self.descriptor)
    }

    const fn to_word(self) -> u32 {
        ((self.retry_limit as u32) << RETRY_LIMIT_OFT) | self.descriptor as u32
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn from_word(word: u32) -> Self {
        Self {
            retry_limit: (word >> RETRY_LIMIT_OFT) as u8,
            descriptor: (word & DESCRIPTOR_MASK) as u16,
        }
    }
}

/// A complete retry chain in hardware form.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PolicySet {
    pub entries: [PolicyEntry; RETRY_STEPS],
}

impl PolicySet {
    #[must_use]
    pub const fn new(entries: [PolicyEntry; RETRY_STEPS]) -> Self {
        Self { entries }
    }

    /// Policy for broadcast and multicast frames: every step at the basic
    /// rate with a single retry. Only DSSS/CCK rates carry a preamble choice.
    #[must_use]
    pub const fn broadcast(basic_rate: LegacyRate, long_preamble_only: bool) -> Self {
        let preamble = if basic_rate.is_cck() && !long_preamble_only {
            Preamble::Short
        } else {
            Preamble::Long
        };
        let entry = PolicyEntry::new(RateDescriptor::legacy(basic_rate, preamble), BROADCAST_RETRY_LIMIT);
        Self {
            entries: [entry; RETRY_STEPS],
        }
    }
}

/// Errors raised while publishing a policy table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PolicyError {
    /// Another writer holds the inactive buffer.
    WriterBusy,
    /// Entry index outside the table.
    EntryOutOfRange(usize),
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::WriterBusy => f.write_str("policy table is being written"),
            PolicyError::EntryOutOfRange(index) => {
                write!(f, "policy entry {index} out of range")
            }
        }
    }
}

/// Double-buffered policy table shared with the transmit path.
pub struct PolicyTable {
    buffers: [[AtomicU32; RETRY_STEPS]; BUFFERS],
    active: AtomicU8,
    generation: AtomicU32,
    writing: AtomicBool,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffers: [
                [const { AtomicU32::new(0) }; RETRY_STEPS],
                [const { AtomicU32::new(0) }; RETRY_STEPS],
            ],
            active: AtomicU8::new(0),
            generation: AtomicU32::new(0),
            writing: AtomicBool::new(false),
        }
    }

    /// Number of committed updates. Wraps.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// Index of the buffer currently read by the transmit path.
    #[must_use]
    pub fn active_index(&self) -> usize {
        usize::from(self.active.load(Ordering::Acquire)) % BUFFERS
    }

    /// Snapshot of the active table. Retries if a commit lands mid-read.
    #[must_use]
    pub fn active(&self) -> PolicySet {
        loop {
            let before = self.generation();
            let buffer = &self.buffers[self.active_index()];
            let mut set = PolicySet::default();
            for (entry, word) in set.entries.iter_mut().zip(buffer.iter()) {
                *entry = PolicyEntry::from_word(word.load(Ordering::Acquire));
            }
            if self.generation() == before {
                return set;
            }
        }
    }

    /// Claims the inactive buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::WriterBusy`] while another writer is alive.
    pub fn writer(&self) -> Result<PolicyWriter<'_>, PolicyError> {
        if self
            .writing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PolicyError::WriterBusy);
        }

        let target = (self.active_index() + 1) % BUFFERS;
        Ok(PolicyWriter {
            table: self,
            target,
        })
    }

    /// Writes a whole set and publishes it.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::WriterBusy`] while another writer is alive.
    pub fn publish(&self, set: &PolicySet) -> Result<(), PolicyError> {
        let mut writer = self.writer()?;
        writer.fill(set);
        writer.commit();
        Ok(())
    }
}

/// Exclusive handle on the inactive half of a [`PolicyTable`].
///
/// Dropping the writer without [`commit`](Self::commit) discards the update.
pub struct PolicyWriter<'a> {
    table: &'a PolicyTable,
    target: usize,
}

impl PolicyWriter<'_> {
    /// Writes one entry of the pending table.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::EntryOutOfRange`] for an index past the table.
    pub fn set(&mut self, index: usize, entry: PolicyEntry) -> Result<(), PolicyError> {
        let slot = self.table.buffers[self.target]
            .get(index)
            .ok_or(PolicyError::EntryOutOfRange(index))?;
        slot.store(entry.to_word(), Ordering::Release);
        Ok(())
    }

    /// Writes every entry of the pending table.
    pub fn fill(&mut self, set: &PolicySet) {
        for (slot, entry) in self.table.buffers[self.target].iter().zip(set.entries.iter()) {
            slot.store(entry.to_word(), Ordering::Release);
        }
    }

    /// Makes the pending table active.
    pub fn commit(self) {
        #[allow(clippy::cast_possible_truncation)]
        self.table.active.store(self.target as u8, Ordering::Release);
        self.table.generation.fetch_add(1, Ordering::AcqRel);
    }
}

impl Drop for PolicyWriter<'_> {
    fn drop(&mut self) {
        self.table.writing.store(false, Ordering::Release);
    }
}
