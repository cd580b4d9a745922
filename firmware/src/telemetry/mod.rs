//! Firmware clock adapter and rate-event logging.
//!
//! Every event a station reports is written to the core telemetry ring and
//! mirrored to defmt (or stdout on host builds) so bring-up sessions can
//! follow the control loop without attaching the console.

use core::time::Duration;

use embassy_time::Instant;
use rate_control_core::telemetry::{
    RateEvent, RateEventPayload, RateInstant, TELEMETRY_RING_CAPACITY, TelemetryRecorder,
};

/// Records kept by the firmware for post-mortem inspection.
pub type FirmwareTelemetry = TelemetryRecorder<FirmwareInstant, TELEMETRY_RING_CAPACITY>;

/// Embassy's monotonic instant, wrapped so the core engine can time
/// evaluation periods with it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[cfg(target_os = "none")]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub fn as_micros(self) -> u64 {
        self.0.as_micros()
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl RateInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        let micros = self.0.as_micros().saturating_sub(earlier.0.as_micros());
        Duration::from_micros(micros)
    }
}

/// Stores `events` for `station` and logs each one.
pub fn record_events(
    telemetry: &mut FirmwareTelemetry,
    station: usize,
    events: &[RateEvent],
    timestamp: FirmwareInstant,
) {
    for event in events {
        let id = telemetry.record(station, *event, timestamp);
        log_event(id, station, event, timestamp.as_micros());
    }
}

fn log_event(id: u32, station: usize, event: &RateEvent, timestamp_us: u64) {
    match event.payload {
        RateEventPayload::Descriptor(raw) => emit_log(id, station, event, timestamp_us, Some(raw)),
        _ => emit_log(id, station, event, timestamp_us, None),
    }
}

#[cfg(target_os = "none")]
fn emit_log(id: u32, station: usize, event: &RateEvent, timestamp_us: u64, raw: Option<u16>) {
    if let Some(raw) = raw {
        defmt::info!(
            "telemetry:rate #{} sta{} {} t={}us rate={=u16:#x}",
            id,
            station,
            defmt::Display2Format(&event.kind),
            timestamp_us,
            raw
        );
    } else {
        defmt::info!(
            "telemetry:rate #{} sta{} {} t={}us",
            id,
            station,
            defmt::Display2Format(&event.kind),
            timestamp_us
        );
    }
}

#[cfg(not(target_os = "none"))]
fn emit_log(id: u32, station: usize, event: &RateEvent, timestamp_us: u64, raw: Option<u16>) {
    if let Some(raw) = raw {
        println!(
            "telemetry:rate #{id} sta{station} {} t={timestamp_us}us rate={raw:#06x}",
            event.kind
        );
    } else {
        println!("telemetry:rate #{id} sta{station} {} t={timestamp_us}us", event.kind);
    }
}
