//! Diagnostics console shared between firmware and emulator targets.
//!
//! Lines are tokenized and parsed by [`grammar`], the command table lives in
//! [`catalog`], [`commands`] runs parsed commands against a
//! [`RateControlTarget`](commands::RateControlTarget) and [`status`] renders
//! station snapshots as text.

pub mod catalog;
pub mod commands;
pub mod grammar;
pub mod status;
