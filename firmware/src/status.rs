//! Lock-free status mirror for the firmware target.
//!
//! The evaluation and confirmation paths copy a few per-station flags into
//! atomics after every update, so the console can print `status` without
//! taking the arena lock.

use core::fmt;

use portable_atomic::{AtomicBool, AtomicU8, AtomicU16, AtomicU32, AtomicU64, Ordering};
use rate_control_core::arena::StationHandle;
use rate_control_core::station::StationRateState;

use crate::stations::MAX_STATIONS;
use crate::telemetry::FirmwareInstant;

/// Tracks whether the USB console is attached.
static CONSOLE_ATTACHED: AtomicBool = AtomicBool::new(false);

/// Bumped on every host attach.
static CONSOLE_ATTACH_COUNT: AtomicU32 = AtomicU32::new(0);

/// Updates the cached console attachment flag.
pub fn set_console_attached(attached: bool) {
    if attached {
        CONSOLE_ATTACH_COUNT.fetch_add(1, Ordering::Relaxed);
    }
    CONSOLE_ATTACHED.store(attached, Ordering::Relaxed);
}

/// Number of times a host has attached since boot.
pub fn console_attach_count() -> u32 {
    CONSOLE_ATTACH_COUNT.load(Ordering::Relaxed)
}

fn console_attached() -> bool {
    CONSOLE_ATTACHED.load(Ordering::Relaxed)
}

/// Per-slot flags, one bit per station.
pub struct StatusBits {
    associated: AtomicU8,
    fixed: AtomicU8,
    aggregation: AtomicU8,
    amsdu_len: [AtomicU16; MAX_STATIONS],
    /// Microseconds (+1) of the last evaluation pass, 0 before the first.
    last_evaluation: AtomicU64,
}

impl StatusBits {
    pub const fn new() -> Self {
        Self {
            associated: AtomicU8::new(0),
            fixed: AtomicU8::new(0),
            aggregation: AtomicU8::new(0),
            amsdu_len: [const { AtomicU16::new(0) }; MAX_STATIONS],
            last_evaluation: AtomicU64::new(0),
        }
    }

    /// Mirrors the flags of an associated station.
    pub fn record_station(
        &self,
        station: StationHandle,
        state: &StationRateState<FirmwareInstant>,
    ) {
        let Some(bit) = bit_for(station) else {
            return;
        };
        set_bit(&self.associated, bit, true);
        set_bit(&self.fixed, bit, state.fixed_rate().is_some());
        set_bit(&self.aggregation, bit, state.aggregation_allowed());
        self.amsdu_len[station.index()].store(state.max_amsdu_len(), Ordering::Relaxed);
    }

    /// Clears every flag of a freed slot.
    pub fn clear_station(&self, station: StationHandle) {
        let Some(bit) = bit_for(station) else {
            return;
        };
        for mask in [&self.associated, &self.fixed, &self.aggregation] {
            set_bit(mask, bit, false);
        }
        self.amsdu_len[station.index()].store(0, Ordering::Relaxed);
    }

    pub fn record_evaluation(&self, now: FirmwareInstant) {
        self.last_evaluation
            .store(now.as_micros().wrapping_add(1), Ordering::Relaxed);
    }

    /// Builds a [`StatusSnapshot`] from the stored flags.
    pub fn snapshot(&self) -> StatusSnapshot {
        let mut amsdu_len = [0; MAX_STATIONS];
        for (slot, len) in amsdu_len.iter_mut().zip(&self.amsdu_len) {
            *slot = len.load(Ordering::Relaxed);
        }
        StatusSnapshot {
            associated: self.associated.load(Ordering::Relaxed),
            fixed: self.fixed.load(Ordering::Relaxed),
            aggregation: self.aggregation.load(Ordering::Relaxed),
            amsdu_len,
            last_evaluation_us: match self.last_evaluation.load(Ordering::Relaxed) {
                0 => None,
                raw => Some(raw.wrapping_sub(1)),
            },
            console_attached: console_attached(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusSnapshot {
    pub associated: u8,
    pub fixed: u8,
    pub aggregation: u8,
    pub amsdu_len: [u16; MAX_STATIONS],
    pub last_evaluation_us: Option<u64>,
    pub console_attached: bool,
}

impl StatusSnapshot {
    /// Writes the `status` report, one line per associated station after the header.
    pub fn write_lines<W: fmt::Write>(&self, out: &mut W, line_end: &str) -> fmt::Result {
        write!(
            out,
            "status stations={} console={}",
            self.associated.count_ones(),
            if self.console_attached { "attached" } else { "detached" }
        )?;
        match self.last_evaluation_us {
            Some(micros) => write!(out, " eval=+{micros}us")?,
            None => out.write_str(" eval=never")?,
        }
        out.write_str(line_end)?;

        for slot in 0..MAX_STATIONS {
            let bit = 1u8 << slot;
            if self.associated & bit == 0 {
                continue;
            }
            write!(
                out,
                "{} agg={} fixed={} amsdu={}{line_end}",
                StationHandle::from_index(slot),
                on_off(self.aggregation & bit != 0),
                on_off(self.fixed & bit != 0),
                self.amsdu_len[slot]
            )?;
        }
        Ok(())
    }
}

fn bit_for(station: StationHandle) -> Option<u8> {
    (station.index() < MAX_STATIONS).then(|| 1 << station.index())
}

fn set_bit(mask: &AtomicU8, bit: u8, set: bool) {
    if set {
        mask.fetch_or(bit, Ordering::Relaxed);
    } else {
        mask.fetch_and(!bit, Ordering::Relaxed);
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::Instant;
    use heapless::String;
    use rate_control_core::capability::{CapabilityProfile, LegacyRateSet};
    use rate_control_core::descriptor::{LegacyRate, Preamble, RateDescriptor};

    fn legacy_station() -> StationRateState<FirmwareInstant> {
        let profile = CapabilityProfile::legacy_only(
            LegacyRateSet::from_rates(&[0x82, 0x84, 0x0C, 0x18]),
            false,
        );
        StationRateState::new(profile, 3, FirmwareInstant::from(Instant::from_micros(0)))
    }

    #[test]
    fn mirrors_and_clears_station_flags() {
        let bits = StatusBits::new();
        let handle = StationHandle::from_index(1);
        let mut station = legacy_station();
        station
            .set_fixed_rate(RateDescriptor::legacy(LegacyRate::Mbps6, Preamble::Long))
            .expect("rate is in the station set");

        bits.record_station(handle, &station);
        let snapshot = bits.snapshot();
        assert_eq!(snapshot.associated, 0b10);
        assert_eq!(snapshot.fixed, 0b10);
        assert_eq!(snapshot.aggregation & 0b10 != 0, station.aggregation_allowed());
        assert_eq!(snapshot.last_evaluation_us, None);

        bits.clear_station(handle);
        let snapshot = bits.snapshot();
        assert_eq!(snapshot.associated, 0);
        assert_eq!(snapshot.fixed, 0);
        assert_eq!(snapshot.amsdu_len, [0; MAX_STATIONS]);
    }

    #[test]
    fn ignores_slots_past_the_mirror() {
        let bits = StatusBits::new();
        bits.record_station(StationHandle::from_index(MAX_STATIONS), &legacy_station());
        assert_eq!(bits.snapshot().associated, 0);
    }

    #[test]
    fn renders_header_and_station_lines() {
        let bits = StatusBits::new();
        bits.record_station(StationHandle::from_index(0), &legacy_station());
        bits.record_evaluation(FirmwareInstant::from(Instant::from_micros(1_500)));

        let mut out: String<256> = String::new();
        bits.snapshot().write_lines(&mut out, "\n").unwrap();
        let mut lines = out.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("status stations=1 console="), "{header}");
        assert!(header.ends_with(" eval=+1500us"));
        assert_eq!(lines.next(), Some("sta0 agg=off fixed=off amsdu=0"));
        assert_eq!(lines.next(), None);
    }
}
