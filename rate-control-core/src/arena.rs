//! Fixed-capacity arena of per-station rate-control state.
//!
//! The station-management layer owns one [`StationArena`] and refers to
//! stations through [`StationHandle`]s. Every entry point validates the
//! station's invariants on the way out, so a corrupted station degrades to
//! the lowest rate instead of feeding bad chains to hardware.

use core::fmt;

use heapless::Vec;

use crate::capability::{CapabilityProfile, FixedRateError};
use crate::completion::Completion;
use crate::descriptor::{Bandwidth, RateDescriptor};
use crate::station::{Evaluation, StationRateState};
use crate::telemetry::{RateInstant, StationEvents};

const SLOT_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Stable reference to an associated station.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StationHandle(usize);

impl StationHandle {
    /// Slot index inside the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }

    /// Rebuilds a handle from a slot index, e.g. one typed at the console.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for StationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sta{}", self.0)
    }
}

/// Errors raised by arena operations.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ArenaError {
    /// Every slot is occupied.
    Full,
    /// The handle does not refer to an associated station.
    UnknownStation(StationHandle),
    /// The station refused a fixed-rate request.
    FixedRate(FixedRateError),
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArenaError::Full => f.write_str("no free station slot"),
            ArenaError::UnknownStation(handle) => write!(f, "{handle} is not associated"),
            ArenaError::FixedRate(err) => write!(f, "fixed rate refused: {err}"),
        }
    }
}

impl From<FixedRateError> for ArenaError {
    fn from(err: FixedRateError) -> Self {
        ArenaError::FixedRate(err)
    }
}

/// Up to `N` stations, each in its own slot.
pub struct StationArena<I, const N: usize> {
    slots: [Option<StationRateState<I>>; N],
    seed: u64,
}

impl<I, const N: usize> StationArena<I, N>
where
    I: RateInstant,
{
    /// Creates an empty arena. Station generators are derived from `seed`
    /// and the slot index.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            seed,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Places a new station in the first free slot.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Full`] when no slot is free.
    pub fn associate(
        &mut self,
        profile: CapabilityProfile,
        now: I,
    ) -> Result<StationHandle, ArenaError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(ArenaError::Full)?;
        let seed = self.seed ^ (index as u64 + 1).wrapping_mul(SLOT_SEED_MIX);
        self.slots[index] = Some(StationRateState::new(profile, seed, now));
        Ok(StationHandle(index))
    }

    /// Frees the station's slot.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::UnknownStation`] for a free or foreign slot.
    pub fn disassociate(&mut self, handle: StationHandle) -> Result<(), ArenaError> {
        self.slots
            .get_mut(handle.0)
            .and_then(Option::take)
            .map(|_| ())
            .ok_or(ArenaError::UnknownStation(handle))
    }

    /// # Errors
    ///
    /// Returns [`ArenaError::UnknownStation`] for a free or foreign slot.
    pub fn get(&self, handle: StationHandle) -> Result<&StationRateState<I>, ArenaError> {
        self.slots
            .get(handle.0)
            .and_then(Option::as_ref)
            .ok_or(ArenaError::UnknownStation(handle))
    }

    /// # Errors
    ///
    /// Returns [`ArenaError::UnknownStation`] for a free or foreign slot.
    pub fn get_mut(
        &mut self,
        handle: StationHandle,
    ) -> Result<&mut StationRateState<I>, ArenaError> {
        self.slots
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(ArenaError::UnknownStation(handle))
    }

    /// Associated stations in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (StationHandle, &StationRateState<I>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|state| (StationHandle(index), state)))
    }

    /// Handles of every associated station.
    #[must_use]
    pub fn handles(&self) -> Vec<StationHandle, N> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    /// Runs [`StationRateState::evaluate`] and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::UnknownStation`] for a free or foreign slot.
    pub fn evaluate(
        &mut self,
        handle: StationHandle,
        now: I,
        tx_aggregate: bool,
    ) -> Result<Evaluation, ArenaError> {
        let station = self.get_mut(handle)?;
        let mut evaluation = station.evaluate(now, tx_aggregate);
        if let Some(event) = station.validate() {
            let _ = evaluation.events.push(event);
            evaluation.policy_changed = true;
            evaluation.retry_step = station.retry_step();
        }
        Ok(evaluation)
    }

    /// Feeds one completion to the station and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::UnknownStation`] for a free or foreign slot.
    pub fn on_completion(
        &mut self,
        handle: StationHandle,
        completion: &Completion,
    ) -> Result<StationEvents, ArenaError> {
        let station = self.get_mut(handle)?;
        let mut events = station.on_completion(completion);
        if let Some(event) = station.validate() {
            let _ = events.push(event);
        }
        Ok(events)
    }

    /// # Errors
    ///
    /// Returns [`ArenaError::UnknownStation`] or the station's refusal as
    /// [`ArenaError::FixedRate`].
    pub fn set_fixed_rate(
        &mut self,
        handle: StationHandle,
        descriptor: RateDescriptor,
    ) -> Result<StationEvents, ArenaError> {
        Ok(self.get_mut(handle)?.set_fixed_rate(descriptor)?)
    }

    /// # Errors
    ///
    /// Returns [`ArenaError::UnknownStation`] for a free or foreign slot.
    pub fn clear_fixed_rate(&mut self, handle: StationHandle) -> Result<StationEvents, ArenaError> {
        Ok(self.get_mut(handle)?.clear_fixed_rate())
    }

    /// # Errors
    ///
    /// Returns [`ArenaError::UnknownStation`] for a free or foreign slot.
    pub fn renegotiate(
        &mut self,
        handle: StationHandle,
        bandwidth: Bandwidth,
        nss: u8,
    ) -> Result<StationEvents, ArenaError> {
        Ok(self.get_mut(handle)?.renegotiate(bandwidth, nss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::LegacyRateSet;
    use crate::completion::TxStatus;
    use crate::descriptor::{GuardInterval, LegacyRate, Preamble};
    use crate::telemetry::RateEventKind;
    use core::time::Duration;

    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    struct MicrosInstant(u64);

    impl RateInstant for MicrosInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_micros(self.0.saturating_sub(earlier.0))
        }
    }

    fn legacy_profile() -> CapabilityProfile {
        CapabilityProfile::legacy_only(LegacyRateSet::from_rates(&[0x82, 0x84, 0x0C, 0x18]), false)
    }

    #[test]
    fn slots_are_reused_after_disassociation() {
        let mut arena: StationArena<MicrosInstant, 2> = StationArena::new(7);
        let first = arena.associate(legacy_profile(), MicrosInstant(0)).unwrap();
        let second = arena.associate(legacy_profile(), MicrosInstant(0)).unwrap();
        assert_eq!((first.index(), second.index()), (0, 1));
        assert_eq!(
            arena.associate(legacy_profile(), MicrosInstant(0)),
            Err(ArenaError::Full)
        );

        arena.disassociate(first).unwrap();
        assert_eq!(arena.len(), 1);
        assert_eq!(
            arena.disassociate(first),
            Err(ArenaError::UnknownStation(first))
        );
        assert!(arena.get(first).is_err());

        let again = arena.associate(legacy_profile(), MicrosInstant(0)).unwrap();
        assert_eq!(again, first);
        assert_eq!(arena.handles().as_slice(), &[first, second]);
    }

    #[test]
    fn unknown_handles_are_rejected() {
        let mut arena: StationArena<MicrosInstant, 1> = StationArena::new(0);
        let handle = StationHandle::from_index(5);
        assert!(arena.evaluate(handle, MicrosInstant(0), false).is_err());
        let completion = Completion::from_status(&TxStatus::default());
        assert_eq!(
            arena.on_completion(handle, &completion),
            Err(ArenaError::UnknownStation(handle))
        );
    }

    #[test]
    fn corrupted_station_fails_safe() {
        let mut arena: StationArena<MicrosInstant, 1> = StationArena::new(3);
        let handle = arena.associate(legacy_profile(), MicrosInstant(0)).unwrap();
        if let Some(sample) = arena.get_mut(handle).unwrap().sample_mut(1) {
            sample.successes = 10;
            sample.attempts = 1;
        }
        if cfg!(feature = "strict-invariants") {
            return;
        }

        let evaluation = arena.evaluate(handle, MicrosInstant(10), false).unwrap();
        assert!(evaluation.policy_changed);
        assert!(
            evaluation
                .events
                .iter()
                .any(|event| event.kind == RateEventKind::FailSafe)
        );
        assert_eq!(arena.get(handle).unwrap().check_invariants(), Ok(()));
    }

    #[test]
    fn fixed_rate_errors_carry_the_reason() {
        let mut arena: StationArena<MicrosInstant, 1> = StationArena::new(3);
        let handle = arena.associate(legacy_profile(), MicrosInstant(0)).unwrap();
        let vht = RateDescriptor::vht(0, 0, Bandwidth::Mhz20, GuardInterval::Long);
        assert_eq!(
            arena.set_fixed_rate(handle, vht),
            Err(ArenaError::FixedRate(FixedRateError::FormatTooNew))
        );

        let rate = RateDescriptor::legacy(LegacyRate::Mbps2, Preamble::Short);
        assert!(arena.set_fixed_rate(handle, rate).is_ok());
        assert_eq!(arena.get(handle).unwrap().fixed_rate(), Some(rate));
    }
}
