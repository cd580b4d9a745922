//! Station state shared by the firmware tasks.
//!
//! The arena and the telemetry ring sit behind blocking mutexes so the
//! evaluation ticker, the confirmation drain and the console never see a
//! half-applied update. Policy tables are lock-free: the transmit path reads
//! them while a task publishes the next one.

use core::cell::RefCell;
use core::fmt;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver};
use portable_atomic::{AtomicBool, Ordering};
use rate_control_core::arena::{ArenaError, StationArena, StationHandle};
use rate_control_core::capability::{CapabilityProfile, LocalCapabilities, PeerCapabilities};
use rate_control_core::completion::{AggregateReport, Completion, TxStatus};
use rate_control_core::console::commands::{CommandError, CommandExecutor};
use rate_control_core::descriptor::{Bandwidth, LegacyRate};
use rate_control_core::policy::{PolicySet, PolicyTable};
use rate_control_core::telemetry::{RateEvent, RateEventKind, StationEvents};

use crate::status::{StatusBits, StatusSnapshot};
use crate::telemetry::{self, FirmwareInstant, FirmwareTelemetry};

/// Station slots served by the firmware.
pub const MAX_STATIONS: usize = 4;

/// Depth of the MAC event queue feeding the confirmation task.
pub const MAC_EVENT_QUEUE_DEPTH: usize = 16;

#[cfg(target_os = "none")]
type StationMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type StationMutex = NoopRawMutex;

pub type FirmwareArena = StationArena<FirmwareInstant, MAX_STATIONS>;

/// Events raised by the MAC for the rate controller. Confirmations may be
/// posted from interrupt context, so the queue locks with a critical section.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MacEvent {
    Associated(PeerCapabilities),
    Disassociated(StationHandle),
    Renegotiated {
        station: StationHandle,
        bandwidth: Bandwidth,
        nss: u8,
    },
    /// BSS-wide DSSS/CCK preamble policy change.
    PreambleChanged { long_only: bool },
    TxStatus {
        station: StationHandle,
        status: TxStatus,
    },
    Aggregate {
        station: StationHandle,
        report: AggregateReport,
    },
}

pub type MacEventQueue = Channel<CriticalSectionRawMutex, MacEvent, MAC_EVENT_QUEUE_DEPTH>;
pub type MacEventReceiver<'a> =
    Receiver<'a, CriticalSectionRawMutex, MacEvent, MAC_EVENT_QUEUE_DEPTH>;

pub struct Stations {
    arena: Mutex<StationMutex, RefCell<FirmwareArena>>,
    telemetry: Mutex<StationMutex, RefCell<FirmwareTelemetry>>,
    policies: [PolicyTable; MAX_STATIONS],
    broadcast: PolicyTable,
    status: StatusBits,
    local: LocalCapabilities,
    long_preamble_only: AtomicBool,
    basic_rate: LegacyRate,
}

impl Stations {
    pub fn new(seed: u64, local: LocalCapabilities, basic_rate: LegacyRate) -> Self {
        let stations = Self {
            arena: Mutex::new(RefCell::new(StationArena::new(seed))),
            telemetry: Mutex::new(RefCell::new(FirmwareTelemetry::new())),
            policies: [const { PolicyTable::new() }; MAX_STATIONS],
            broadcast: PolicyTable::new(),
            status: StatusBits::new(),
            local,
            long_preamble_only: AtomicBool::new(local.long_preamble_only),
            basic_rate,
        };
        stations.publish_broadcast();
        stations
    }

    /// Policy table the transmit path reads for `station`.
    pub fn policy(&self, station: StationHandle) -> Option<&PolicyTable> {
        self.policies.get(station.index())
    }

    /// Policy table for broadcast and multicast frames.
    pub fn broadcast_policy(&self) -> &PolicyTable {
        &self.broadcast
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// Applies one MAC event.
    pub fn handle_mac_event(&self, event: MacEvent, now: FirmwareInstant) {
        let result = match event {
            MacEvent::Associated(peer) => self.associate(&peer, now).map(|_| ()),
            MacEvent::Disassociated(station) => self.disassociate(station, now),
            MacEvent::Renegotiated {
                station,
                bandwidth,
                nss,
            } => self.update_station(station, now, |arena| {
                arena.renegotiate(station, bandwidth, nss)
            }),
            MacEvent::PreambleChanged { long_only } => {
                self.set_long_preamble_only(long_only);
                Ok(())
            }
            MacEvent::TxStatus { station, status } => {
                self.confirm(station, &Completion::from_status(&status), now)
            }
            MacEvent::Aggregate { station, report } => {
                self.confirm(station, &Completion::from_aggregate(&report), now)
            }
        };
        if let Err(err) = result {
            log_rejected(err);
        }
    }

    pub fn associate(
        &self,
        peer: &PeerCapabilities,
        now: FirmwareInstant,
    ) -> Result<StationHandle, ArenaError> {
        let local = LocalCapabilities {
            long_preamble_only: self.long_preamble_only.load(Ordering::Relaxed),
            ..self.local
        };
        let profile = CapabilityProfile::negotiate(peer, &local);
        let station = self.arena.lock(|arena| {
            let mut arena = arena.borrow_mut();
            let station = arena.associate(profile, now)?;
            self.sync_station(&mut arena, station);
            Ok(station)
        })?;
        self.record(station, &[RateEvent::bare(RateEventKind::Associated)], now);
        Ok(station)
    }

    pub fn disassociate(&self, station: StationHandle, now: FirmwareInstant) -> Result<(), ArenaError> {
        self.arena
            .lock(|arena| arena.borrow_mut().disassociate(station))?;
        self.status.clear_station(station);
        self.record(station, &[RateEvent::bare(RateEventKind::Disassociated)], now);
        Ok(())
    }

    /// Feeds one completion to its station, in arrival order.
    pub fn confirm(
        &self,
        station: StationHandle,
        completion: &Completion,
        now: FirmwareInstant,
    ) -> Result<(), ArenaError> {
        self.update_station(station, now, |arena| arena.on_completion(station, completion))
    }

    /// Runs one evaluation pass over every associated station.
    pub fn evaluate_all(&self, now: FirmwareInstant) {
        self.arena.lock(|arena| {
            let mut arena = arena.borrow_mut();
            for station in arena.handles() {
                let tx_aggregate = arena
                    .get(station)
                    .is_ok_and(|state| state.aggregation_allowed());
                match arena.evaluate(station, now, tx_aggregate) {
                    Ok(evaluation) => {
                        self.sync_station(&mut arena, station);
                        self.record(station, &evaluation.events, now);
                    }
                    Err(err) => log_rejected(err),
                }
            }
        });
        self.status.record_evaluation(now);
    }

    /// Executes a console line against the arena.
    ///
    /// # Errors
    ///
    /// Returns the console's [`CommandError`] for malformed or refused lines.
    pub fn execute<'a, W: fmt::Write>(
        &self,
        line: &'a str,
        now: FirmwareInstant,
        out: &mut W,
    ) -> Result<(), CommandError<'a>> {
        let outcome = self.arena.lock(|arena| {
            let mut arena = arena.borrow_mut();
            let outcome = CommandExecutor::new(&mut *arena).execute(line, out)?;
            if let Some(station) = outcome.station {
                self.sync_station(&mut arena, station);
            }
            Ok::<_, CommandError<'a>>(outcome)
        })?;
        if let Some(station) = outcome.station {
            self.record(station, &outcome.events, now);
        }
        Ok(())
    }

    fn set_long_preamble_only(&self, long_only: bool) {
        self.long_preamble_only.store(long_only, Ordering::Relaxed);
        self.publish_broadcast();
        self.arena.lock(|arena| {
            let mut arena = arena.borrow_mut();
            for station in arena.handles() {
                if let Ok(state) = arena.get_mut(station) {
                    state.set_long_preamble_only(long_only);
                }
                self.sync_station(&mut arena, station);
            }
        });
    }

    fn update_station<F>(
        &self,
        station: StationHandle,
        now: FirmwareInstant,
        update: F,
    ) -> Result<(), ArenaError>
    where
        F: FnOnce(&mut FirmwareArena) -> Result<StationEvents, ArenaError>,
    {
        let events = self.arena.lock(|arena| {
            let mut arena = arena.borrow_mut();
            let events = update(&mut arena)?;
            self.sync_station(&mut arena, station);
            Ok(events)
        })?;
        self.record(station, &events, now);
        Ok(())
    }

    /// Publishes a pending policy and refreshes the status mirror.
    fn sync_station(&self, arena: &mut FirmwareArena, station: StationHandle) {
        let Ok(state) = arena.get_mut(station) else {
            return;
        };
        if let Some(update) = state.take_policy_update()
            && let Some(table) = self.policy(station)
            && let Err(err) = table.publish(&update)
        {
            log_policy_busy(station, err);
        }
        self.status.record_station(station, state);
    }

    fn publish_broadcast(&self) {
        let set = PolicySet::broadcast(
            self.basic_rate,
            self.long_preamble_only.load(Ordering::Relaxed),
        );
        if let Err(err) = self.broadcast.publish(&set) {
            log_policy_busy(StationHandle::from_index(MAX_STATIONS), err);
        }
    }

    fn record(&self, station: StationHandle, events: &[RateEvent], now: FirmwareInstant) {
        if events.is_empty() {
            return;
        }
        self.telemetry.lock(|ring| {
            telemetry::record_events(&mut ring.borrow_mut(), station.index(), events, now);
        });
    }

    /// Runs `inspect` over the telemetry ring.
    pub fn with_telemetry<R>(&self, inspect: impl FnOnce(&FirmwareTelemetry) -> R) -> R {
        self.telemetry.lock(|ring| inspect(&ring.borrow()))
    }
}

#[cfg(target_os = "none")]
fn log_rejected(err: ArenaError) {
    defmt::warn!("stations: {}", defmt::Display2Format(&err));
}

#[cfg(not(target_os = "none"))]
fn log_rejected(err: ArenaError) {
    println!("stations: {err}");
}

#[cfg(target_os = "none")]
fn log_policy_busy(station: StationHandle, err: rate_control_core::policy::PolicyError) {
    defmt::warn!(
        "stations: policy for slot {} not published: {}",
        station.index(),
        defmt::Display2Format(&err)
    );
}

#[cfg(not(target_os = "none"))]
fn log_policy_busy(station: StationHandle, err: rate_control_core::policy::PolicyError) {
    println!("stations: policy for slot {} not published: {err}", station.index());
}
