use core::time::Duration;

use rate_control_core::capability::{
    CapabilityProfile, FixedRateError, HtCapabilities, HtMcsSet, LegacyRateSet,
    LocalCapabilities, PeerCapabilities,
};
use rate_control_core::completion::{Completion, TxStatus};
use rate_control_core::descriptor::{Bandwidth, GuardInterval, RateDescriptor};
use rate_control_core::station::StationRateState;
use rate_control_core::telemetry::{RateEventKind, RateEventPayload, RateInstant};

#[test]
fn absent_descriptor_is_installed_in_the_last_slot() {
    let mut station = two_stream_station();
    let fixed = absent_descriptor(&station);
    let len = station.table().len();

    let events = station.set_fixed_rate(fixed).expect("descriptor is permitted");
    assert_eq!(
        events[0].payload,
        RateEventPayload::Descriptor(fixed.to_raw()),
        "arming should report the packed descriptor"
    );
    assert_eq!(station.table().len(), len);
    assert_eq!(station.table().position(fixed), Some(len - 1));
    assert_eq!(station.chain().active_indexes(), [len - 1; 3]);
    assert_eq!(station.chain().step(3).index, 0);
    assert!(station.policy_pending());

    let policy = station.take_policy_update().expect("fixed rate publishes a policy");
    for entry in &policy.entries[..3] {
        assert_eq!(entry.decode(), Ok(fixed));
    }
    assert_eq!(policy.entries[3].decode(), Ok(station.profile().lowest()));
}

#[test]
fn ranking_is_suppressed_until_the_override_is_cleared() {
    let mut station = two_stream_station();
    let fixed = absent_descriptor(&station);
    station.set_fixed_rate(fixed).expect("descriptor is permitted");
    let _ = station.take_policy_update();
    let pinned = *station.chain();

    let delivered = Completion::from_status(&TxStatus {
        acknowledged: true,
        ..TxStatus::default()
    });
    for period in 1..=5u64 {
        for _ in 0..20 {
            station.on_completion(&delivered);
        }
        let evaluation = station.evaluate(MockInstant(period * 100_000), false);
        assert!(!evaluation.policy_changed, "period {period} moved the chain");
        assert_eq!(station.chain().active_indexes(), pinned.active_indexes());
        assert!(
            evaluation
                .events
                .iter()
                .all(|event| event.kind != RateEventKind::TrialStarted)
        );
    }

    let sample = &station.table().samples()[pinned.step(0).index];
    assert!(sample.observed);
    assert!(sample.probability.as_percent() >= 90);

    let events = station.clear_fixed_rate();
    assert_eq!(events[0].kind, RateEventKind::FixedRateCleared);
    assert_eq!(station.fixed_rate(), None);
    assert!(station.clear_fixed_rate().is_empty(), "clearing twice is a no-op");

    // The fixed rate won every period it ran, so ranking keeps it on top.
    station.evaluate(MockInstant(600_000), false);
    assert_eq!(station.check_invariants(), Ok(()));
    let best = station.chain().step(0).index;
    assert_eq!(station.table().samples()[best].descriptor, fixed);
}

#[test]
fn refused_requests_leave_the_station_untouched() {
    let mut station = two_stream_station();
    let chain = *station.chain();

    let too_wide = RateDescriptor::ht(3, 0, Bandwidth::Mhz40, GuardInterval::Long);
    assert_eq!(
        station.set_fixed_rate(too_wide).err(),
        Some(FixedRateError::BandwidthTooWide)
    );
    let short_gi = RateDescriptor::ht(3, 0, Bandwidth::Mhz20, GuardInterval::Short);
    assert_eq!(
        station.set_fixed_rate(short_gi).err(),
        Some(FixedRateError::GuardNotPermitted)
    );
    let three_streams = RateDescriptor::ht(3, 2, Bandwidth::Mhz20, GuardInterval::Long);
    assert_eq!(
        station.set_fixed_rate(three_streams).err(),
        Some(FixedRateError::TooManyStreams)
    );
    let vht = RateDescriptor::vht(3, 0, Bandwidth::Mhz20, GuardInterval::Long);
    assert_eq!(
        station.set_fixed_rate(vht).err(),
        Some(FixedRateError::FormatTooNew)
    );

    assert_eq!(station.fixed_rate(), None);
    assert_eq!(*station.chain(), chain);
}

fn two_stream_station() -> StationRateState<MockInstant> {
    let peer = PeerCapabilities {
        legacy_rates: LegacyRateSet::from_rates(&[0x0C, 0x18, 0x30, 0x6C]),
        ht: Some(HtCapabilities {
            mcs: HtMcsSet([0xFF, 0xFF, 0, 0]),
            short_gi_20: false,
            short_gi_40: false,
            long_amsdu: true,
        }),
        vht: None,
        bandwidth: Bandwidth::Mhz20,
    };
    let profile = CapabilityProfile::negotiate(&peer, &LocalCapabilities::default());
    assert_eq!(profile.max_nss(), 1);
    StationRateState::new(profile, 77, MockInstant(0))
}

/// First two-stream-capable HT descriptor the seeded table does not hold.
fn absent_descriptor(station: &StationRateState<MockInstant>) -> RateDescriptor {
    (0..=1)
        .flat_map(|nss| {
            (0..=7).map(move |mcs| RateDescriptor::ht(mcs, nss, Bandwidth::Mhz20, GuardInterval::Long))
        })
        .find(|descriptor| !station.table().contains(*descriptor))
        .expect("sixteen HT rates cannot fit in the table")
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct MockInstant(u64);

impl RateInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}
