//! Rate-control telemetry shared by firmware and host targets.
//!
//! Stations report what changed as [`RateEvent`]s; the owner stamps them with
//! a station slot and an instant and keeps the most recent ones in a
//! fixed-size ring. Event kinds serialize to compact numeric codes for
//! transport over diagnostics channels.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered, Vec};

/// Sequential identifier assigned to every recorded event. Wraps.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 128;

/// Most events a single station call can produce.
pub const MAX_EVENTS_PER_CALL: usize = 8;

/// Events produced by one station call, oldest first.
pub type StationEvents = Vec<RateEvent, MAX_EVENTS_PER_CALL>;

/// Monotonic instant used to time evaluation periods and stamp telemetry.
pub trait RateInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Discriminated rate-control events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RateEventKind {
    Associated,
    ChainUpdated,
    TrialStarted,
    TrialReverted,
    RetryStepAdvanced,
    AggregationChanged,
    FixedRateArmed,
    FixedRateCleared,
    Renegotiated,
    FailSafe,
    Disassociated,
    Custom(u16),
}

impl RateEventKind {
    const ASSOCIATED_CODE: u16 = 0x0001;
    const CHAIN_UPDATED_CODE: u16 = 0x0002;
    const TRIAL_STARTED_CODE: u16 = 0x0003;
    const TRIAL_REVERTED_CODE: u16 = 0x0004;
    const RETRY_STEP_CODE: u16 = 0x0005;
    const AGGREGATION_CODE: u16 = 0x0006;
    const FIXED_ARMED_CODE: u16 = 0x0010;
    const FIXED_CLEARED_CODE: u16 = 0x0011;
    const RENEGOTIATED_CODE: u16 = 0x0012;
    const FAIL_SAFE_CODE: u16 = 0x0020;
    const DISASSOCIATED_CODE: u16 = 0x0021;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            RateEventKind::Associated => Self::ASSOCIATED_CODE,
            RateEventKind::ChainUpdated => Self::CHAIN_UPDATED_CODE,
            RateEventKind::TrialStarted => Self::TRIAL_STARTED_CODE,
            RateEventKind::TrialReverted => Self::TRIAL_REVERTED_CODE,
            RateEventKind::RetryStepAdvanced => Self::RETRY_STEP_CODE,
            RateEventKind::AggregationChanged => Self::AGGREGATION_CODE,
            RateEventKind::FixedRateArmed => Self::FIXED_ARMED_CODE,
            RateEventKind::FixedRateCleared => Self::FIXED_CLEARED_CODE,
            RateEventKind::Renegotiated => Self::RENEGOTIATED_CODE,
            RateEventKind::FailSafe => Self::FAIL_SAFE_CODE,
            RateEventKind::Disassociated => Self::DISASSOCIATED_CODE,
            RateEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`RateEventKind::Custom`].
    #[must_use]
    pub const fn from_raw(code: u16) -> Self {
        match code {
            Self::ASSOCIATED_CODE => RateEventKind::Associated,
            Self::CHAIN_UPDATED_CODE => RateEventKind::ChainUpdated,
            Self::TRIAL_STARTED_CODE => RateEventKind::TrialStarted,
            Self::TRIAL_REVERTED_CODE => RateEventKind::TrialReverted,
            Self::RETRY_STEP_CODE => RateEventKind::RetryStepAdvanced,
            Self::AGGREGATION_CODE => RateEventKind::AggregationChanged,
            Self::FIXED_ARMED_CODE => RateEventKind::FixedRateArmed,
            Self::FIXED_CLEARED_CODE => RateEventKind::FixedRateCleared,
            Self::RENEGOTIATED_CODE => RateEventKind::Renegotiated,
            Self::FAIL_SAFE_CODE => RateEventKind::FailSafe,
            Self::DISASSOCIATED_CODE => RateEventKind::Disassociated,
            other => RateEventKind::Custom(other),
        }
    }

    /// Returns `true` when the kind was decoded from an unknown code.
    #[must_use]
    pub const fn is_custom(self) -> bool {
        matches!(self, RateEventKind::Custom(_))
    }
}

impl fmt::Display for RateEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateEventKind::Associated => f.write_str("associated"),
            RateEventKind::ChainUpdated => f.write_str("chain-updated"),
            RateEventKind::TrialStarted => f.write_str("trial-started"),
            RateEventKind::TrialReverted => f.write_str("trial-reverted"),
            RateEventKind::RetryStepAdvanced => f.write_str("retry-step-advanced"),
            RateEventKind::AggregationChanged => f.write_str("aggregation-changed"),
            RateEventKind::FixedRateArmed => f.write_str("fixed-rate-armed"),
            RateEventKind::FixedRateCleared => f.write_str("fixed-rate-cleared"),
            RateEventKind::Renegotiated => f.write_str("renegotiated"),
            RateEventKind::FailSafe => f.write_str("fail-safe"),
            RateEventKind::Disassociated => f.write_str("disassociated"),
            RateEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

/// Payloads carried alongside rate events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RateEventPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Sample-table indexes of the four retry steps.
    Chain([u8; 4]),
    /// Trial entry and whether it took step 0.
    Trial { index: u8, direct: bool },
    /// New software retry step.
    RetryStep(u8),
    /// Aggregation flag and current A-MSDU length.
    Aggregation { allowed: bool, amsdu_len: u16 },
    /// Packed descriptor word.
    Descriptor(u16),
    /// Negotiated bandwidth in MHz and zero-based stream count.
    Capability { bandwidth_mhz: u16, nss: u8 },
}

/// One event as produced by a station.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RateEvent {
    pub kind: RateEventKind,
    pub payload: RateEventPayload,
}

impl RateEvent {
    #[must_use]
    pub const fn new(kind: RateEventKind, payload: RateEventPayload) -> Self {
        Self { kind, payload }
    }

    #[must_use]
    pub const fn bare(kind: RateEventKind) -> Self {
        Self::new(kind, RateEventPayload::None)
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RateEventRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub station: u8,
    pub event: RateEventKind,
    pub details: RateEventPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<RateEventRecord<TInstant>, CAPACITY>;

/// Records rate events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: RateInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, RateEventRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&RateEventRecord<TInstant>> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records one event for `station`.
    pub fn record(&mut self, station: usize, event: RateEvent, timestamp: TInstant) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(RateEventRecord {
            id,
            timestamp,
            station: truncate_slot(station),
            event: event.kind,
            details: event.payload,
        });

        id
    }

    /// Records a batch of events in order and returns the last id used.
    pub fn record_all(
        &mut self,
        station: usize,
        events: &[RateEvent],
        timestamp: TInstant,
    ) -> Option<EventId> {
        events
            .iter()
            .map(|event| self.record(station, *event, timestamp))
            .last()
    }

    /// Time elapsed since the most recent event of `kind` for `station`.
    pub fn since_last(
        &self,
        station: usize,
        kind: RateEventKind,
        now: TInstant,
    ) -> Option<Duration> {
        let slot = truncate_slot(station);
        self.ring
            .oldest_ordered()
            .filter(|record| record.station == slot && record.event == kind)
            .last()
            .map(|record| now.saturating_duration_since(record.timestamp))
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: RateInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_slot(slot: usize) -> u8 {
    match u8::try_from(slot) {
        Ok(value) => value,
        Err(_) => u8::MAX,
    }
}
