//! USB console session.
//!
//! Bytes from the CDC interface are assembled into lines here and handed to
//! the core command executor. Replies are cut into packet-sized frames for
//! the USB task.

use core::fmt::{self, Write as _};
use core::str;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::Channel;
use heapless::{String, Vec};
use rate_control_core::console::commands::{CommandError, LINE_END};

use crate::stations::Stations;
use crate::telemetry::FirmwareInstant;

/// Maximum number of bytes accepted on a single line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;

/// Payload of one USB packet.
pub const FRAME_LEN: usize = 64;

/// Frames buffered in each direction.
pub const CONSOLE_QUEUE_DEPTH: usize = 8;

const OUTPUT_CAPACITY: usize = 1024;
const PROMPT: &str = "> ";

#[cfg(target_os = "none")]
type ConsoleMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type ConsoleMutex = NoopRawMutex;

pub type ConsoleFrame = Vec<u8, FRAME_LEN>;
pub type ConsoleQueue = Channel<ConsoleMutex, ConsoleFrame, CONSOLE_QUEUE_DEPTH>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleError {
    /// Input exceeded [`MAX_LINE_LEN`]; the rest of the line is dropped.
    LineOverflow,
    InvalidUtf8,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::LineOverflow => write!(f, "line longer than {MAX_LINE_LEN} bytes"),
            ConsoleError::InvalidUtf8 => f.write_str("line is not UTF-8"),
        }
    }
}

/// Collects bytes until a line terminator arrives.
#[derive(Default)]
pub struct LineAssembler {
    buffer: Vec<u8, MAX_LINE_LEN>,
    discarding: bool,
}

impl LineAssembler {
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            discarding: false,
        }
    }

    /// Feeds one byte; `on_line` runs for every completed, non-empty line.
    pub fn ingest<F>(&mut self, byte: u8, on_line: F) -> Result<(), ConsoleError>
    where
        F: FnOnce(&str),
    {
        match byte {
            b'\r' | b'\n' => {
                let discarded = core::mem::take(&mut self.discarding);
                if discarded || self.buffer.is_empty() {
                    self.buffer.clear();
                    return Ok(());
                }
                let result = str::from_utf8(&self.buffer)
                    .map(|line| on_line(line.trim()))
                    .map_err(|_| ConsoleError::InvalidUtf8);
                self.buffer.clear();
                result
            }
            0x08 | 0x7f => {
                self.buffer.pop();
                Ok(())
            }
            _ if self.discarding => Ok(()),
            value => self.buffer.push(value).map_err(|_| {
                self.discarding = true;
                self.buffer.clear();
                ConsoleError::LineOverflow
            }),
        }
    }
}

/// One console connection: line assembly plus the pending reply.
pub struct ConsoleSession {
    assembler: LineAssembler,
    output: String<OUTPUT_CAPACITY>,
}

impl Default for ConsoleSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleSession {
    pub const fn new() -> Self {
        Self {
            assembler: LineAssembler::new(),
            output: String::new(),
        }
    }

    /// Drops any partial line, e.g. after the host reconnects.
    pub fn reset(&mut self) {
        self.assembler = LineAssembler::new();
        self.output.clear();
    }

    /// Processes received bytes and returns the text to send back.
    pub fn feed(&mut self, stations: &Stations, bytes: &[u8], now: FirmwareInstant) -> &str {
        self.output.clear();
        for &byte in bytes {
            let output = &mut self.output;
            let result = self.assembler.ingest(byte, |line| {
                respond(stations, line, now, output);
                let _ = output.push_str(PROMPT);
            });
            if let Err(err) = result {
                let _ = write!(self.output, "ERR {err}{LINE_END}{PROMPT}");
            }
        }
        &self.output
    }
}

/// Executes one line, writing the reply or an `ERR` line into `out`.
pub fn respond<const N: usize>(
    stations: &Stations,
    line: &str,
    now: FirmwareInstant,
    out: &mut String<N>,
) {
    let checkpoint = out.len();
    let result = if line.eq_ignore_ascii_case("status") {
        write_status(stations, out, LINE_END).map_err(CommandError::from)
    } else if line.eq_ignore_ascii_case("help status") {
        write!(out, "usage: status{LINE_END}  {STATUS_SUMMARY}{LINE_END}").map_err(CommandError::from)
    } else {
        stations.execute(line, now, out).and_then(|()| {
            if line.eq_ignore_ascii_case("help") {
                write!(out, "{:<6} {STATUS_SUMMARY}{LINE_END}", "status")?;
            }
            Ok(())
        })
    };

    if let Err(err) = result {
        if matches!(err, CommandError::Output) {
            out.truncate(checkpoint);
        }
        let _ = write!(out, "ERR {err}{LINE_END}");
    }
}

fn write_status<W: fmt::Write>(stations: &Stations, out: &mut W, line_end: &str) -> fmt::Result {
    stations.status().write_lines(out, line_end)?;
    match stations.with_telemetry(|ring| ring.latest().copied()) {
        Some(record) => write!(
            out,
            "last #{} sta{} {}{line_end}",
            record.id, record.station, record.event
        ),
        None => write!(out, "last none{line_end}"),
    }
}

const STATUS_SUMMARY: &str = "per-station flags mirrored by the firmware";

/// Splits `text` into USB-sized frames.
pub fn frames(text: &str) -> impl Iterator<Item = ConsoleFrame> + '_ {
    text.as_bytes().chunks(FRAME_LEN).filter_map(|chunk| Vec::from_slice(chunk).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::Instant;
    use rate_control_core::capability::{LegacyRateSet, LocalCapabilities, PeerCapabilities};
    use rate_control_core::descriptor::LegacyRate;

    fn now() -> FirmwareInstant {
        FirmwareInstant::from(Instant::from_micros(0))
    }

    fn stations() -> Stations {
        let stations = Stations::new(5, LocalCapabilities::default(), LegacyRate::Mbps1);
        stations
            .associate(
                &PeerCapabilities::legacy(LegacyRateSet::from_rates(&[0x82, 0x84, 0x0C])),
                now(),
            )
            .unwrap();
        stations
    }

    #[test]
    fn assembles_lines_across_frames() {
        let mut assembler = LineAssembler::new();
        let mut seen: Option<std::string::String> = None;
        for &byte in b"sho" {
            assembler.ingest(byte, |_| unreachable!()).unwrap();
        }
        assembler.ingest(b'x', |_| unreachable!()).unwrap();
        assembler.ingest(0x7f, |_| unreachable!()).unwrap();
        assembler.ingest(b'w', |_| unreachable!()).unwrap();
        assembler
            .ingest(b'\r', |line| seen = Some(line.into()))
            .unwrap();
        assert_eq!(seen.as_deref(), Some("show"));

        // The LF of a CRLF pair is an empty line.
        assembler.ingest(b'\n', |_| unreachable!()).unwrap();
    }

    #[test]
    fn overflow_drops_the_rest_of_the_line() {
        let mut assembler = LineAssembler::new();
        for _ in 0..MAX_LINE_LEN {
            assembler.ingest(b'a', |_| unreachable!()).unwrap();
        }
        assert_eq!(
            assembler.ingest(b'b', |_| unreachable!()),
            Err(ConsoleError::LineOverflow)
        );
        assembler.ingest(b'c', |_| unreachable!()).unwrap();
        assembler.ingest(b'\n', |_| unreachable!()).unwrap();

        let mut seen = false;
        for &byte in b"auto 0\n" {
            assembler.ingest(byte, |_| seen = true).unwrap();
        }
        assert!(seen);
    }

    #[test]
    fn session_replies_with_prompt() {
        let stations = stations();
        let mut session = ConsoleSession::new();

        let reply = session.feed(&stations, b"show\r\n", now());
        assert!(reply.starts_with("sta0 legacy"), "{reply}");
        assert!(reply.ends_with("\r\n> "));

        let reply = session.feed(&stations, b"fixed 9 legacy rate=0\r", now());
        assert_eq!(reply, "ERR sta9 is not associated\r\n> ");
    }

    #[test]
    fn status_and_help_include_firmware_commands() {
        let stations = stations();

        let mut out: String<1024> = String::new();
        respond(&stations, "status", now(), &mut out);
        assert!(out.starts_with("status stations=1"), "{out}");
        assert!(out.contains("sta0 agg=off"));
        assert!(out.contains("last #"), "{out}");

        out.clear();
        respond(&stations, "help", now(), &mut out);
        assert!(out.contains("fixed "));
        assert!(out.ends_with(&std::format!("status {STATUS_SUMMARY}\r\n")));

        out.clear();
        respond(&stations, "help status", now(), &mut out);
        assert!(out.starts_with("usage: status"));
    }

    #[test]
    fn small_buffers_report_overflow() {
        let stations = stations();
        let mut out: String<24> = String::new();
        respond(&stations, "stats 0", now(), &mut out);
        assert_eq!(out.as_str(), "ERR output buffer full\r\n");
    }

    #[test]
    fn frames_split_long_replies() {
        let text = "x".repeat(FRAME_LEN + 5);
        let chunks: std::vec::Vec<ConsoleFrame> = frames(&text).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), FRAME_LEN);
        assert_eq!(chunks[1].len(), 5);
    }
}
