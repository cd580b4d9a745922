use core::ops::Add;
use core::time::Duration;

use rate_control_core::capability::{
    CapabilityProfile, HtCapabilities, HtMcsSet, LegacyRateSet, LocalCapabilities,
    PeerCapabilities,
};
use rate_control_core::completion::{AggregateReport, BlockAck, Completion};
use rate_control_core::descriptor::{Bandwidth, FormatClass};
use rate_control_core::estimator::Probability;
use rate_control_core::sample::RateSample;
use rate_control_core::station::StationRateState;
use rate_control_core::telemetry::{RateEventKind, RateEventPayload, RateInstant};
use rate_control_core::tuning::MAX_SW_RETRY_STEP;

#[test]
fn total_loss_walks_the_retry_steps_then_stops_aggregation() {
    let mut station = ht_station();
    assert_eq!(station.profile().format(), FormatClass::Ht);
    assert_eq!(station.profile().max_mcs(), 7);
    assert!(
        !station.aggregation_allowed(),
        "an unmeasured rate must not aggregate"
    );

    // One period of clean traffic measures the top rate.
    for tick in 1..=20u64 {
        station.on_completion(&delivered());
        let _ = station.evaluate(MockInstant::micros(tick * 1_000), true);
        let _ = station.take_policy_update();
    }
    let evaluation = station.evaluate(MockInstant::micros(100_000), true);
    assert!(station.aggregation_allowed());
    assert!(evaluation.events.iter().any(|event| {
        event.kind == RateEventKind::AggregationChanged
            && matches!(
                event.payload,
                RateEventPayload::Aggregation { allowed: true, .. }
            )
    }));
    assert_eq!(active_sample(&station).descriptor.mcs(), 7);

    let lost = Completion::from_aggregate(&AggregateReport {
        access_category: 0,
        start_sequence: 100,
        frame_count: 16,
        block_ack: None,
    });
    assert_eq!(
        lost,
        Completion::Aggregate {
            attempts: 16,
            failures: 16,
            retry_required: true,
        }
    );

    let mut now = MockInstant::micros(100_000);
    let mut advances = 0;
    for _ in 0..20 {
        station.on_completion(&lost);
        now = now + Duration::from_millis(1);
        let evaluation = station.evaluate(now, true);
        advances += evaluation
            .events
            .iter()
            .filter(|event| event.kind == RateEventKind::RetryStepAdvanced)
            .count();
        assert!(evaluation.retry_step <= MAX_SW_RETRY_STEP);
        assert_aggregation_tracks_active_sample(&station);
        let _ = station.take_policy_update();
    }
    assert_eq!(advances, 2, "the retry cursor should advance twice");
    assert_eq!(station.retry_step(), MAX_SW_RETRY_STEP);

    // Keep losing until the flag drops; every period pulls the measured
    // probabilities further down.
    let mut period = 2u64;
    while station.aggregation_allowed() {
        assert!(period < 100, "aggregation never stopped");
        for tick in 0..20u64 {
            station.on_completion(&lost);
            let _ = station.evaluate(MockInstant::micros(period * 100_000 + tick * 1_000), true);
            assert_aggregation_tracks_active_sample(&station);
        }
        period += 1;
    }

    let active = active_sample(&station);
    assert!(
        active.probability < Probability::ONE_PERCENT
            || (active.descriptor.mcs() <= 2 && active.probability < Probability::TEN_PERCENT)
    );
}

#[test]
fn empty_block_ack_counts_as_total_loss() {
    let report = AggregateReport {
        access_category: 2,
        start_sequence: 4090,
        frame_count: 8,
        block_ack: Some(BlockAck {
            start_sequence_control: 4090 << 4,
            bitmap: [0; 4],
        }),
    };
    let completion = Completion::from_aggregate(&report);
    assert_eq!(completion.attempts(), 8);
    assert_eq!(completion.failures(), 8);

    // Frames 4090..=4095 and 0..=1 wrap the sequence space.
    let partial = AggregateReport {
        block_ack: Some(BlockAck {
            start_sequence_control: 4090 << 4,
            bitmap: [0b1100_0011, 0, 0, 0],
        }),
        ..report
    };
    assert_eq!(partial.acknowledged_frames(), 4);
    assert_eq!(
        Completion::from_aggregate(&partial),
        Completion::Aggregate {
            attempts: 8,
            failures: 4,
            retry_required: true,
        }
    );
}

#[test]
fn clean_aggregates_keep_the_first_step() {
    let mut station = ht_station();
    assert_eq!(delivered().failures(), 0);

    for tick in 1..=20u64 {
        station.on_completion(&delivered());
        let evaluation = station.evaluate(MockInstant::micros(tick * 1_000), true);
        assert_eq!(evaluation.retry_step, 0);
    }
    assert!(!station.aggregation_allowed());

    let _ = station.evaluate(MockInstant::micros(100_000), true);
    assert!(station.aggregation_allowed());
}

fn delivered() -> Completion {
    Completion::from_aggregate(&AggregateReport {
        access_category: 0,
        start_sequence: 10,
        frame_count: 4,
        block_ack: Some(BlockAck {
            start_sequence_control: 10 << 4,
            bitmap: [0x000F, 0, 0, 0],
        }),
    })
}

fn active_sample(station: &StationRateState<MockInstant>) -> RateSample {
    let step = station.chain().step(usize::from(station.retry_step()));
    station.table().samples()[step.index]
}

/// The flag may only be set while the active sample is measured above the
/// loss floor.
fn assert_aggregation_tracks_active_sample(station: &StationRateState<MockInstant>) {
    if station.aggregation_allowed() {
        let active = active_sample(station);
        assert!(active.probability >= Probability::ONE_PERCENT, "{active:?}");
    }
}

fn ht_station() -> StationRateState<MockInstant> {
    // OFDM-only legacy set, so the table holds HT rates only.
    let peer = PeerCapabilities {
        legacy_rates: LegacyRateSet::from_rates(&[0x0C, 0x18, 0x30, 0x6C]),
        ht: Some(HtCapabilities {
            mcs: HtMcsSet([0xFF, 0, 0, 0]),
            short_gi_20: false,
            short_gi_40: false,
            long_amsdu: false,
        }),
        vht: None,
        bandwidth: Bandwidth::Mhz20,
    };
    let profile = CapabilityProfile::negotiate(&peer, &LocalCapabilities::default());
    StationRateState::new(profile, 0xA66, MockInstant::micros(0))
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
