//! Console command dispatcher.
//!
//! Parsed commands run against a [`RateControlTarget`] and their output is
//! written as text lines. The dispatcher stays `no_std` so the firmware and
//! the emulator share it.

use core::fmt;

use crate::arena::{ArenaError, StationArena, StationHandle};
use crate::descriptor::{
    Bandwidth, GuardInterval, LegacyRate, Preamble, RateDescriptor, vht_rate_absent,
};
use crate::station::StationStats;
use crate::telemetry::{RateInstant, StationEvents};

use super::catalog::{self, FormatTag};
use super::grammar::{self, Command, FixedCommand, FixedRequest, HelpCommand};
use super::status::StatusFormatter;

/// Terminator written after every output line.
pub const LINE_END: &str = "\r\n";

/// What the console can do to the stations it serves.
pub trait RateControlTarget {
    /// # Errors
    ///
    /// Returns [`ArenaError::UnknownStation`] for a handle with no station.
    fn station_stats(&self, station: StationHandle) -> Result<StationStats, ArenaError>;

    /// Calls `visit` once per associated station, in slot order.
    fn visit_stations(&self, visit: &mut dyn FnMut(StationHandle, &StationStats));

    /// # Errors
    ///
    /// Returns the arena's refusal.
    fn set_fixed_rate(
        &mut self,
        station: StationHandle,
        descriptor: RateDescriptor,
    ) -> Result<StationEvents, ArenaError>;

    /// # Errors
    ///
    /// Returns [`ArenaError::UnknownStation`] for a handle with no station.
    fn clear_fixed_rate(&mut self, station: StationHandle) -> Result<StationEvents, ArenaError>;
}

impl<I, const N: usize> RateControlTarget for StationArena<I, N>
where
    I: RateInstant,
{
    fn station_stats(&self, station: StationHandle) -> Result<StationStats, ArenaError> {
        self.get(station).map(|state| state.stats())
    }

    fn visit_stations(&self, visit: &mut dyn FnMut(StationHandle, &StationStats)) {
        for (handle, state) in self.iter() {
            visit(handle, &state.stats());
        }
    }

    fn set_fixed_rate(
        &mut self,
        station: StationHandle,
        descriptor: RateDescriptor,
    ) -> Result<StationEvents, ArenaError> {
        StationArena::set_fixed_rate(self, station, descriptor)
    }

    fn clear_fixed_rate(&mut self, station: StationHandle) -> Result<StationEvents, ArenaError> {
        StationArena::clear_fixed_rate(self, station)
    }
}

impl<T> RateControlTarget for &mut T
where
    T: RateControlTarget + ?Sized,
{
    fn station_stats(&self, station: StationHandle) -> Result<StationStats, ArenaError> {
        (**self).station_stats(station)
    }

    fn visit_stations(&self, visit: &mut dyn FnMut(StationHandle, &StationStats)) {
        (**self).visit_stations(visit);
    }

    fn set_fixed_rate(
        &mut self,
        station: StationHandle,
        descriptor: RateDescriptor,
    ) -> Result<StationEvents, ArenaError> {
        (**self).set_fixed_rate(station, descriptor)
    }

    fn clear_fixed_rate(&mut self, station: StationHandle) -> Result<StationEvents, ArenaError> {
        (**self).clear_fixed_rate(station)
    }
}

/// Side effects of a successful command, for telemetry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub station: Option<StationHandle>,
    pub events: StationEvents,
}

/// Errors surfaced while executing a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError<'a> {
    Parse(grammar::ParseError<'a>),
    Station(ArenaError),
    /// The request names a rate that does not exist.
    InvalidRate(&'static str),
    UnknownTopic(&'a str),
    /// The output sink refused a write.
    Output,
}

impl fmt::Display for CommandError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(err) => err.fmt(f),
            CommandError::Station(err) => err.fmt(f),
            CommandError::InvalidRate(reason) => f.write_str(reason),
            CommandError::UnknownTopic(topic) => write!(f, "no help for `{topic}`"),
            CommandError::Output => f.write_str("output buffer full"),
        }
    }
}

impl<'a> From<grammar::ParseError<'a>> for CommandError<'a> {
    fn from(error: grammar::ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl From<ArenaError> for CommandError<'_> {
    fn from(error: ArenaError) -> Self {
        Self::Station(error)
    }
}

impl From<fmt::Error> for CommandError<'_> {
    fn from(_: fmt::Error) -> Self {
        Self::Output
    }
}

type CommandResult<'a> = Result<CommandOutcome, CommandError<'a>>;

/// Turns a parsed `fixed` request into a descriptor.
///
/// # Errors
///
/// Returns [`CommandError::InvalidRate`] for combinations that do not exist.
pub fn request_descriptor<'a>(request: &FixedRequest) -> Result<RateDescriptor, CommandError<'a>> {
    let guard = GuardInterval::from_short(request.short_gi);
    let bandwidth = || {
        Bandwidth::from_mhz(request.bandwidth_mhz)
            .ok_or(CommandError::InvalidRate("bandwidth must be 20, 40, 80 or 160"))
    };

    match request.format {
        FormatTag::Legacy => {
            let rate = LegacyRate::from_index(request.rate)
                .ok_or(CommandError::InvalidRate("unknown legacy rate"))?;
            Ok(RateDescriptor::legacy(
                rate,
                Preamble::from_long(request.long_preamble),
            ))
        }
        FormatTag::Ht => Ok(RateDescriptor::ht(
            request.rate,
            request.nss,
            bandwidth()?,
            guard,
        )),
        FormatTag::Vht => {
            let bandwidth = bandwidth()?;
            if vht_rate_absent(request.rate, request.nss, bandwidth) {
                return Err(CommandError::InvalidRate(
                    "VHT rate does not exist at this bandwidth",
                ));
            }
            Ok(RateDescriptor::vht(request.rate, request.nss, bandwidth, guard))
        }
    }
}

/// Executes console lines against a target.
pub struct CommandExecutor<T> {
    target: T,
}

impl<T> CommandExecutor<T> {
    pub const fn new(target: T) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn into_inner(self) -> T {
        self.target
    }
}

impl<T> CommandExecutor<T>
where
    T: RateControlTarget,
{
    /// Parses and executes one line, writing the reply to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] for malformed lines, unknown stations,
    /// refused rates and a full output sink.
    pub fn execute<'a, W: fmt::Write>(&mut self, line: &'a str, out: &mut W) -> CommandResult<'a> {
        let command = grammar::parse(line)?;
        self.dispatch(command, out)
    }

    fn dispatch<'a, W: fmt::Write>(&mut self, command: Command<'a>, out: &mut W) -> CommandResult<'a> {
        match command {
            Command::Show => {
                self.write_show(out)?;
                Ok(CommandOutcome::default())
            }
            Command::Stats(station) => {
                let stats = self.target.station_stats(station)?;
                write_stats(out, station, &stats)?;
                Ok(CommandOutcome {
                    station: Some(station),
                    events: StationEvents::new(),
                })
            }
            Command::Fixed(FixedCommand { station, request }) => {
                let descriptor = request_descriptor(&request)?;
                let events = self.target.set_fixed_rate(station, descriptor)?;
                write!(out, "{station} fixed [{descriptor}]{LINE_END}")?;
                Ok(CommandOutcome {
                    station: Some(station),
                    events,
                })
            }
            Command::Auto(station) => {
                let events = self.target.clear_fixed_rate(station)?;
                write!(out, "{station} auto{LINE_END}")?;
                Ok(CommandOutcome {
                    station: Some(station),
                    events,
                })
            }
            Command::Help(HelpCommand { topic }) => {
                write_help(out, topic)?;
                Ok(CommandOutcome::default())
            }
        }
    }

    fn write_show<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        let mut result = Ok(());
        let mut any = false;
        self.target.visit_stations(&mut |station, stats| {
            any = true;
            if result.is_ok() {
                result = StatusFormatter::new(stats)
                    .write_summary_line(out, station)
                    .and_then(|()| out.write_str(LINE_END));
            }
        });
        result?;
        if !any {
            write!(out, "no stations{LINE_END}")?;
        }
        Ok(())
    }
}

fn write_stats<W: fmt::Write>(
    out: &mut W,
    station: StationHandle,
    stats: &StationStats,
) -> fmt::Result {
    let formatter = StatusFormatter::new(stats);
    formatter.write_summary_line(out, station)?;
    out.write_str(LINE_END)?;
    formatter.write_chain_line(out)?;
    out.write_str(LINE_END)?;
    formatter.write_period_line(out)?;
    out.write_str(LINE_END)?;
    for index in 0..formatter.sample_rows() {
        formatter.write_sample_line(out, index)?;
        out.write_str(LINE_END)?;
    }
    Ok(())
}

fn write_help<'a, W: fmt::Write>(out: &mut W, topic: Option<&'a str>) -> Result<(), CommandError<'a>> {
    match topic {
        None => {
            for entry in catalog::commands() {
                write!(out, "{:<6} {}{LINE_END}", entry.name, entry.summary)?;
            }
        }
        Some(name) => {
            let entry = catalog::find(name).ok_or(CommandError::UnknownTopic(name))?;
            write!(out, "usage: {}{LINE_END}{}{LINE_END}", entry.usage, entry.summary)?;
        }
    }
    Ok(())
}
