use core::ops::Add;
use core::time::Duration;

use rate_control_core::capability::{CapabilityProfile, LegacyRateSet};
use rate_control_core::completion::{Completion, TxStatus};
use rate_control_core::descriptor::{LegacyRate, Preamble, RateDescriptor};
use rate_control_core::station::StationRateState;
use rate_control_core::telemetry::RateInstant;
use rate_control_core::tuning::{MAX_RETRIES_PER_STEP, RETRY_STEPS};

const TICK: Duration = Duration::from_millis(10);
const TICKS_PER_PERIOD: u64 = 10;
const FRAMES_PER_TICK: usize = 5;
const PERIODS: u64 = 50;

#[test]
fn legacy_station_converges_on_the_second_highest_rate() {
    let mut station = legacy_station();
    let mut channel = Channel::default();
    let mut now = MockInstant::micros(0);

    for _ in 0..PERIODS * TICKS_PER_PERIOD {
        now = now + TICK;
        station.evaluate(now, false);
        let _ = station.take_policy_update();
        for _ in 0..FRAMES_PER_TICK {
            let status = channel.transmit(&station);
            station.on_completion(&Completion::from_status(&status));
        }
    }

    // The last tick closed a period, so no trial is spliced in.
    let best = descriptor_at(&station, 0);
    assert_eq!(
        best,
        RateDescriptor::legacy(LegacyRate::Mbps24, Preamble::Long),
        "step 0 should settle on 24 Mb/s, chain: {:?}",
        station.chain()
    );
    assert_eq!(station.chain().step(3).index, 0);
    assert_eq!(
        descriptor_at(&station, 3),
        RateDescriptor::legacy(LegacyRate::Mbps1, Preamble::Long)
    );
    assert_eq!(station.check_invariants(), Ok(()));
}

#[test]
fn lowest_rate_stays_pinned_while_converging() {
    let mut station = legacy_station();
    let mut channel = Channel::default();
    let mut now = MockInstant::micros(0);
    let lowest = station.profile().lowest();

    for _ in 0..10 * TICKS_PER_PERIOD {
        now = now + TICK;
        station.evaluate(now, false);
        assert_eq!(station.table().samples()[0].descriptor, lowest);
        assert_eq!(station.chain().step(3).index, 0);

        if let Some(policy) = station.take_policy_update() {
            assert_eq!(policy.entries[3].decode(), Ok(lowest));
        }
        for _ in 0..FRAMES_PER_TICK {
            let status = channel.transmit(&station);
            station.on_completion(&Completion::from_status(&status));
        }
    }
}

fn legacy_station() -> StationRateState<MockInstant> {
    // 1, 2, 5.5, 11, 6, 12, 24 and 54 Mb/s.
    let rates = LegacyRateSet::from_rates(&[0x82, 0x84, 0x8B, 0x96, 0x0C, 0x18, 0x30, 0x6C]);
    StationRateState::new(
        CapabilityProfile::legacy_only(rates, true),
        0x5EED,
        MockInstant::micros(0),
    )
}

fn descriptor_at(station: &StationRateState<MockInstant>, position: usize) -> RateDescriptor {
    let index = station.chain().step(position).index;
    station.table().samples()[index].descriptor
}

/// Deterministic channel: 54 Mb/s never gets through, 24 Mb/s loses every
/// tenth attempt and everything slower always works.
#[derive(Default)]
struct Channel {
    attempts_at_24: u32,
}

impl Channel {
    fn delivers(&mut self, descriptor: RateDescriptor) -> bool {
        let RateDescriptor::Legacy { rate, .. } = descriptor else {
            return false;
        };
        match rate {
            LegacyRate::Mbps54 | LegacyRate::Mbps48 | LegacyRate::Mbps36 => false,
            LegacyRate::Mbps24 => {
                self.attempts_at_24 += 1;
                self.attempts_at_24 % 10 != 0
            }
            _ => true,
        }
    }

    /// Walks the chain the way hardware does and reports the outcome.
    fn transmit(&mut self, station: &StationRateState<MockInstant>) -> TxStatus {
        let mut retries = 0u8;
        for position in 0..RETRY_STEPS {
            let descriptor = descriptor_at(station, position);
            for _ in 0..MAX_RETRIES_PER_STEP {
                if self.delivers(descriptor) {
                    return TxStatus {
                        retry_count: retries,
                        acknowledged: true,
                        ..TxStatus::default()
                    };
                }
                retries += 1;
            }
        }
        TxStatus {
            retry_count: retries - 1,
            retry_limit_reached: true,
            ..TxStatus::default()
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
struct MockInstant(u64);

impl MockInstant {
    fn micros(value: u64) -> Self {
        Self(value)
    }
}

impl Add<Duration> for MockInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl RateInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}
