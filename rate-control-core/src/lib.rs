#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

// Adaptive 802.11 transmit-rate selection.
//
// The crate avoids the Rust standard library so the same engine runs in MCU
// firmware and in the host emulator. Stations live in a `StationArena`; the
// driver feeds completions in, calls `evaluate` once per tick and programs the
// retry chains that come back out.

pub mod arena;
pub mod capability;
pub mod chain;
pub mod completion;
pub mod console;
pub mod descriptor;
pub mod duration;
pub mod estimator;
pub mod explore;
pub mod guard;
pub mod policy;
pub mod sample;
pub mod station;
pub mod telemetry;
pub mod trial;
pub mod tuning;
