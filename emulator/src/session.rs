use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::ops::Add;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand_core::{RngCore, SeedableRng};
use rand_wyrand::WyRand;
use rate_control_core::arena::{ArenaError, StationArena, StationHandle};
use rate_control_core::capability::{
    CapabilityProfile, HtCapabilities, HtMcsSet, LegacyRateSet, LocalCapabilities,
    PeerCapabilities, VhtCapabilities, VhtMaxMpdu, VhtMcsMap,
};
use rate_control_core::completion::{
    AggregateReport, BlockAck, Completion, SEQUENCE_MODULO, TxStatus,
};
use rate_control_core::console::commands::{CommandExecutor, LINE_END};
use rate_control_core::console::status::StatusFormatter;
use rate_control_core::descriptor::{Bandwidth, RateDescriptor};
use rate_control_core::policy::PolicyTable;
use rate_control_core::telemetry::{
    RateEvent, RateEventKind, RateInstant, StationEvents, TelemetryRecorder,
};
use rate_control_core::tuning::{EVALUATION_PERIOD, MAX_RETRIES_PER_STEP, RETRY_STEPS};

/// Station slots simulated by one session.
pub const MAX_STATIONS: usize = 8;

const TICKS_PER_PERIOD: u32 = 10;
const FRAMES_PER_TICK: u32 = 4;
const AGGREGATE_FRAMES: u8 = 16;
const MAX_RUN_PERIODS: u32 = 1_000;
const DEFAULT_SEED: u64 = 1;

pub const EMULATOR_COMMANDS: &[(&str, &str, &str)] = &[
    (
        "assoc",
        "assoc <legacy|ht|vht>",
        "associate a simulated station",
    ),
    ("drop", "drop <sta>", "disassociate a station"),
    (
        "run",
        "run <periods>",
        "simulate traffic for a number of evaluation periods",
    ),
    (
        "loss",
        "loss <sta> <percent>",
        "extra frame loss on a station's link",
    ),
    ("exit", "exit | quit", "leave the emulator"),
];

/// Simulated monotonic clock in microseconds.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct SimInstant(u64);

impl SimInstant {
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl RateInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Kind of peer a simulated station advertises.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkProfile {
    Legacy,
    Ht,
    Vht,
}

impl LinkProfile {
    pub const ALL: [LinkProfile; 3] = [LinkProfile::Legacy, LinkProfile::Ht, LinkProfile::Vht];

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|profile| profile.tag().eq_ignore_ascii_case(tag))
            .ok_or_else(|| format!("Unknown link profile `{tag}`"))
    }

    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            LinkProfile::Legacy => "legacy",
            LinkProfile::Ht => "ht",
            LinkProfile::Vht => "vht",
        }
    }

    #[must_use]
    pub fn header(self) -> String {
        format!("Rate Control Emulator {} transcript", self.tag())
    }

    #[must_use]
    pub fn log_path(self) -> PathBuf {
        Path::new("transcripts").join(format!("emulator-{}.log", self.tag()))
    }

    /// Capabilities the simulated peer advertises.
    #[must_use]
    pub fn peer(self) -> PeerCapabilities {
        match self {
            LinkProfile::Legacy => PeerCapabilities::legacy(LegacyRateSet::from_rates(&[
                0x82, 0x84, 0x8B, 0x96, 0x0C, 0x12, 0x18, 0x24, 0x30, 0x48, 0x60, 0x6C,
            ])),
            LinkProfile::Ht => PeerCapabilities {
                legacy_rates: LegacyRateSet::from_rates(&[
                    0x82, 0x84, 0x8B, 0x96, 0x0C, 0x18, 0x30, 0x6C,
                ]),
                ht: Some(HtCapabilities {
                    mcs: HtMcsSet::full(2),
                    short_gi_20: true,
                    short_gi_40: true,
                    long_amsdu: false,
                }),
                vht: None,
                bandwidth: Bandwidth::Mhz40,
            },
            LinkProfile::Vht => PeerCapabilities {
                legacy_rates: LegacyRateSet::from_rates(&[0x8C, 0x12, 0x98, 0x24, 0xB0, 0x48, 0x60, 0x6C]),
                ht: Some(HtCapabilities {
                    mcs: HtMcsSet::full(2),
                    short_gi_20: true,
                    short_gi_40: true,
                    long_amsdu: true,
                }),
                vht: Some(VhtCapabilities {
                    rx_mcs_map: VhtMcsMap::uniform(2, 9),
                    short_gi_80: true,
                    short_gi_160: false,
                    max_mpdu: VhtMaxMpdu::Octets3895,
                }),
                bandwidth: Bandwidth::Mhz80,
            },
        }
    }
}

/// Start-up options of a session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Station associated before the first command.
    pub profile: Option<LinkProfile>,
    pub seed: u64,
    /// Extra loss applied to the start-up station.
    pub loss_percent: u8,
    pub transcript: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile: None,
            seed: DEFAULT_SEED,
            loss_percent: 0,
            transcript: None,
        }
    }
}

pub struct Session {
    stations: StationArena<SimInstant, MAX_STATIONS>,
    policies: [PolicyTable; MAX_STATIONS],
    channel: Channel,
    telemetry: TelemetryRecorder<SimInstant>,
    transcript: Option<TranscriptLogger>,
    clock: SimInstant,
    recorded: usize,
}

impl Session {
    pub fn new(config: SessionConfig) -> io::Result<Self> {
        let transcript = match config.transcript {
            Some(path) => {
                let header = config
                    .profile
                    .map_or_else(|| "Rate Control Emulator transcript".to_string(), LinkProfile::header);
                Some(TranscriptLogger::new(&path, &header)?)
            }
            None => None,
        };

        let mut session = Self {
            stations: StationArena::new(config.seed),
            policies: Default::default(),
            channel: Channel::new(config.seed),
            telemetry: TelemetryRecorder::new(),
            transcript,
            clock: SimInstant::default(),
            recorded: 0,
        };

        if let Some(profile) = config.profile {
            let handle = session.associate(profile).map_err(io::Error::other)?;
            session.channel.set_loss(handle, config.loss_percent);
        }
        Ok(session)
    }

    #[must_use]
    pub const fn now(&self) -> SimInstant {
        self.clock
    }

    #[must_use]
    pub fn stations(&self) -> &StationArena<SimInstant, MAX_STATIONS> {
        &self.stations
    }

    #[must_use]
    pub fn telemetry(&self) -> &TelemetryRecorder<SimInstant> {
        &self.telemetry
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        self.log(TranscriptRole::Host, trimmed)?;

        let mut words = trimmed.split_whitespace();
        let keyword = words.next().unwrap_or_default().to_ascii_lowercase();
        let arguments: Vec<&str> = words.collect();

        let lines = match (keyword.as_str(), arguments.as_slice()) {
            ("assoc", [tag]) => self.handle_assoc(tag),
            ("drop", [station]) => self.handle_drop(station),
            ("run", [periods]) => self.handle_run(periods),
            ("loss", [station, percent]) => self.handle_loss(station, percent),
            ("assoc" | "drop" | "run" | "loss", _) => vec![format!(
                "ERR usage {}",
                emulator_usage(&keyword).unwrap_or_default()
            )],
            ("help", [topic]) if emulator_usage(topic).is_some() => {
                vec![emulator_usage(topic).unwrap_or_default().to_string()]
            }
            ("help", []) => {
                let mut lines = self.execute_console(trimmed);
                for (name, _, summary) in EMULATOR_COMMANDS {
                    lines.push(format!("{name:<6} {summary}"));
                }
                lines
            }
            _ => self.execute_console(trimmed),
        };

        for response in &lines {
            self.log(TranscriptRole::Emulator, response)?;
        }
        Ok(lines)
    }

    fn execute_console(&mut self, line: &str) -> Vec<String> {
        let mut output = String::new();
        let result = CommandExecutor::new(&mut self.stations).execute(line, &mut output);
        match result {
            Ok(outcome) => {
                if let Some(station) = outcome.station {
                    self.record(station, &outcome.events);
                }
                output
                    .split(LINE_END)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            Err(err) => vec![format!("ERR {err}")],
        }
    }

    fn associate(&mut self, profile: LinkProfile) -> Result<StationHandle, ArenaError> {
        let negotiated = CapabilityProfile::negotiate(&profile.peer(), &LocalCapabilities::default());
        let handle = self.stations.associate(negotiated, self.clock)?;
        self.telemetry.record(
            handle.index(),
            RateEvent::bare(RateEventKind::Associated),
            self.clock,
        );
        self.channel.reset(handle);
        Ok(handle)
    }

    fn handle_assoc(&mut self, tag: &str) -> Vec<String> {
        let profile = match LinkProfile::from_tag(tag) {
            Ok(profile) => profile,
            Err(err) => return vec![format!("ERR {err}")],
        };
        match self.associate(profile) {
            Ok(handle) => {
                let mut lines = vec![format!("OK {handle} associated {}", profile.tag())];
                if let Ok(state) = self.stations.get(handle) {
                    lines.push(StatusFormatter::new(&state.stats()).summary_line(handle));
                }
                lines
            }
            Err(err) => vec![format!("ERR {err}")],
        }
    }

    fn handle_drop(&mut self, station: &str) -> Vec<String> {
        let Some(handle) = parse_station(station) else {
            return vec![format!("ERR unknown station `{station}`")];
        };
        match self.stations.disassociate(handle) {
            Ok(()) => {
                self.telemetry.record(
                    handle.index(),
                    RateEvent::bare(RateEventKind::Disassociated),
                    self.clock,
                );
                self.channel.reset(handle);
                vec![format!("OK {handle} dropped")]
            }
            Err(err) => vec![format!("ERR {err}")],
        }
    }

    fn handle_loss(&mut self, station: &str, percent: &str) -> Vec<String> {
        let Some(handle) = parse_station(station) else {
            return vec![format!("ERR unknown station `{station}`")];
        };
        let Some(percent) = percent.parse::<u8>().ok().filter(|value| *value <= 100) else {
            return vec![format!("ERR loss must be 0-100, got `{percent}`")];
        };
        if let Err(err) = self.stations.get(handle) {
            return vec![format!("ERR {err}")];
        }
        self.channel.set_loss(handle, percent);
        vec![format!("OK {handle} loss={percent}%")]
    }

    fn handle_run(&mut self, periods: &str) -> Vec<String> {
        let Some(periods) = periods
            .parse::<u32>()
            .ok()
            .filter(|value| (1..=MAX_RUN_PERIODS).contains(value))
        else {
            return vec![format!(
                "ERR periods must be 1-{MAX_RUN_PERIODS}, got `{periods}`"
            )];
        };

        let recorded_before = self.recorded;
        let tick = EVALUATION_PERIOD / TICKS_PER_PERIOD;
        for _ in 0..periods * TICKS_PER_PERIOD {
            self.clock = self.clock + tick;
            for handle in self.stations.handles() {
                // Handles come from the arena, so lookups cannot miss.
                let _ = self.tick_station(handle);
            }
        }

        let events = self.recorded - recorded_before;
        let mut lines = vec![format!(
            "OK ran {periods} periods now=+{}ms events={events}",
            self.clock.as_millis()
        )];
        for (handle, state) in self.stations.iter() {
            lines.push(StatusFormatter::new(&state.stats()).summary_line(handle));
        }
        lines
    }

    fn tick_station(&mut self, handle: StationHandle) -> Result<(), ArenaError> {
        let now = self.clock;
        let evaluation = self.stations.evaluate(handle, now, true)?;
        self.record(handle, &evaluation.events);

        let station = self.stations.get_mut(handle)?;
        let aggregated = station.aggregation_allowed();
        let policy = &self.policies[handle.index()];
        if let Some(update) = station.take_policy_update() {
            // The emulator is the only writer, so the buffer is always free.
            let _ = policy.publish(&update);
        }

        let lowest = station.profile().lowest();
        let chain = policy
            .active()
            .entries
            .map(|entry| entry.decode().unwrap_or(lowest));

        for _ in 0..FRAMES_PER_TICK {
            let completion = if aggregated {
                Completion::from_aggregate(&self.channel.transmit_aggregate(
                    handle,
                    chain[0],
                    AGGREGATE_FRAMES,
                ))
            } else {
                Completion::from_status(&self.channel.transmit_single(handle, &chain))
            };
            let events = self.stations.on_completion(handle, &completion)?;
            self.record(handle, &events);
        }
        Ok(())
    }

    fn record(&mut self, handle: StationHandle, events: &StationEvents) {
        self.recorded += events.len();
        self.telemetry.record_all(handle.index(), events, self.clock);
    }

    fn log(&mut self, role: TranscriptRole, line: &str) -> io::Result<()> {
        match self.transcript.as_mut() {
            Some(transcript) => transcript.append_line(self.clock, role, line),
            None => Ok(()),
        }
    }
}

fn emulator_usage(name: &str) -> Option<&'static str> {
    EMULATOR_COMMANDS
        .iter()
        .find(|(command, _, _)| command.eq_ignore_ascii_case(name))
        .map(|(_, usage, _)| *usage)
}

fn parse_station(token: &str) -> Option<StationHandle> {
    let digits = match token.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("sta") => &token[3..],
        _ => token,
    };
    digits.parse().ok().map(StationHandle::from_index)
}

/// Synthetic radio link: every rate has a fixed delivery chance, faster
/// rates lose more, and each station can carry extra loss.
struct Channel {
    rng: WyRand,
    extra_loss: [u8; MAX_STATIONS],
    next_sequence: [u16; MAX_STATIONS],
}

impl Channel {
    fn new(seed: u64) -> Self {
        Self {
            rng: WyRand::seed_from_u64(seed),
            extra_loss: [0; MAX_STATIONS],
            next_sequence: [0; MAX_STATIONS],
        }
    }

    fn reset(&mut self, handle: StationHandle) {
        self.set_loss(handle, 0);
        if let Some(sequence) = self.next_sequence.get_mut(handle.index()) {
            *sequence = 0;
        }
    }

    fn set_loss(&mut self, handle: StationHandle, percent: u8) {
        if let Some(loss) = self.extra_loss.get_mut(handle.index()) {
            *loss = percent.min(100);
        }
    }

    fn delivery_percent(&self, handle: StationHandle, descriptor: RateDescriptor) -> u32 {
        let penalty = match descriptor {
            RateDescriptor::Legacy { rate, .. } => rate.kbps() / 1_500,
            RateDescriptor::Ht {
                mcs,
                nss,
                bandwidth,
                guard,
            }
            | RateDescriptor::Vht {
                mcs,
                nss,
                bandwidth,
                guard,
            } => {
                u32::from(mcs) * 6
                    + u32::from(nss) * 8
                    + u32::from(bandwidth.index()) * 4
                    + u32::from(guard.is_short()) * 3
            }
        };
        let extra = u32::from(self.extra_loss.get(handle.index()).copied().unwrap_or(0));
        100u32.saturating_sub(penalty) * (100 - extra) / 100
    }

    fn delivers(&mut self, handle: StationHandle, descriptor: RateDescriptor) -> bool {
        self.rng.next_u32() % 100 < self.delivery_percent(handle, descriptor)
    }

    /// Walks the policy chain the way the transmit path does.
    fn transmit_single(
        &mut self,
        handle: StationHandle,
        chain: &[RateDescriptor; RETRY_STEPS],
    ) -> TxStatus {
        let mut retries = 0u8;
        for descriptor in chain {
            for _ in 0..MAX_RETRIES_PER_STEP {
                if self.delivers(handle, *descriptor) {
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
            retry_count: retries.saturating_sub(1),
            retry_limit_reached: true,
            ..TxStatus::default()
        }
    }

    fn transmit_aggregate(
        &mut self,
        handle: StationHandle,
        descriptor: RateDescriptor,
        frames: u8,
    ) -> AggregateReport {
        let slot = handle.index().min(MAX_STATIONS - 1);
        let start = self.next_sequence[slot];
        self.next_sequence[slot] = (start + u16::from(frames)) % SEQUENCE_MODULO;

        let mut bitmap = [0u16; 4];
        let mut delivered = 0;
        for offset in 0..usize::from(frames).min(64) {
            if self.delivers(handle, descriptor) {
                bitmap[offset / 16] |= 1u16 << (offset % 16);
                delivered += 1;
            }
        }

        AggregateReport {
            access_category: 0,
            start_sequence: start,
            frame_count: frames,
            // Nothing delivered means no block-ack came back.
            block_ack: (delivered > 0).then_some(BlockAck {
                start_sequence_control: start << 4,
                bitmap,
            }),
        }
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path, header: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# {header}")?;
        writeln!(
            logger.writer,
            "# Timestamps are simulated milliseconds since session start"
        )?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(&mut self, now: SimInstant, role: TranscriptRole, line: &str) -> io::Result<()> {
        let mut stamped = String::new();
        // Formatting into a `String` cannot fail.
        let _ = write!(stamped, "[+{:>6} ms] {} {line}", now.as_millis(), role.prefix());
        writeln!(self.writer, "{stamped}")?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rate_control_core::descriptor::GuardInterval;

    fn session(profile: Option<LinkProfile>) -> Session {
        Session::new(SessionConfig {
            profile,
            seed: 9,
            ..SessionConfig::default()
        })
        .expect("no transcript to open")
    }

    #[test]
    fn startup_profile_associates_a_station() {
        let mut session = session(Some(LinkProfile::Ht));
        assert_eq!(session.stations().len(), 1);

        let lines = session.handle_command("show").unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("sta0 ht"), "{lines:?}");
        assert_eq!(
            session.telemetry().latest().map(|record| record.event),
            Some(RateEventKind::Associated)
        );
    }

    #[test]
    fn assoc_and_drop_manage_slots() {
        let mut session = session(None);
        assert_eq!(
            session.handle_command("show").unwrap(),
            vec!["no stations".to_string()]
        );

        let lines = session.handle_command("assoc vht").unwrap();
        assert_eq!(lines[0], "OK sta0 associated vht");
        assert!(lines[1].starts_with("sta0 vht"));

        let lines = session.handle_command("assoc wifi7").unwrap();
        assert!(lines[0].starts_with("ERR Unknown link profile"));

        assert_eq!(
            session.handle_command("drop sta0").unwrap(),
            vec!["OK sta0 dropped".to_string()]
        );
        assert!(session.handle_command("drop 0").unwrap()[0].starts_with("ERR"));
        assert!(session.stations().is_empty());
    }

    #[test]
    fn run_advances_the_clock_and_reports_each_station() {
        let mut session = session(Some(LinkProfile::Legacy));
        session.handle_command("assoc ht").unwrap();

        let lines = session.handle_command("run 3").unwrap();
        assert!(lines[0].starts_with("OK ran 3 periods now=+300ms"), "{lines:?}");
        assert_eq!(lines.len(), 3);
        assert_eq!(session.now(), SimInstant::from_micros(300_000));

        for (_, station) in session.stations().iter() {
            assert_eq!(station.check_invariants(), Ok(()));
            assert!(station.table().samples().iter().any(|sample| sample.observed));
        }

        assert!(session.handle_command("run 0").unwrap()[0].starts_with("ERR periods"));
    }

    #[test]
    fn total_loss_drives_the_station_to_its_lowest_rate() {
        let mut session = session(Some(LinkProfile::Legacy));
        assert_eq!(
            session.handle_command("loss sta0 100").unwrap(),
            vec!["OK sta0 loss=100%".to_string()]
        );
        assert!(session.handle_command("loss sta0 101").unwrap()[0].starts_with("ERR"));
        assert!(session.handle_command("loss sta4 10").unwrap()[0].starts_with("ERR"));

        session.handle_command("run 5").unwrap();
        let station = session
            .stations()
            .get(StationHandle::from_index(0))
            .unwrap();
        let stats = station.stats();
        assert!(
            stats
                .samples
                .iter()
                .filter(|sample| sample.observed)
                .all(|sample| sample.probability.as_percent() == 0)
        );
    }

    #[test]
    fn console_commands_pass_through() {
        let mut session = session(Some(LinkProfile::Legacy));

        let lines = session.handle_command("fixed sta0 legacy rate=6").unwrap();
        assert_eq!(lines, vec!["sta0 fixed [legacy 12M]".to_string()]);

        let lines = session.handle_command("stats 0").unwrap();
        assert!(lines[0].contains("fixed=[legacy 12M]"));
        assert!(lines.iter().any(|line| line.starts_with("chain ")));

        let lines = session.handle_command("fixed 0 ht mcs=3").unwrap();
        assert!(lines[0].starts_with("ERR fixed rate refused"), "{lines:?}");

        assert_eq!(
            session.handle_command("auto 0").unwrap(),
            vec!["sta0 auto".to_string()]
        );
        assert!(session.handle_command("bogus").unwrap()[0].starts_with("ERR"));
    }

    #[test]
    fn help_covers_both_command_sets() {
        let mut session = session(None);
        let lines = session.handle_command("help").unwrap();
        assert!(lines.iter().any(|line| line.starts_with("fixed")));
        assert!(lines.iter().any(|line| line.starts_with("assoc")));

        assert_eq!(
            session.handle_command("help loss").unwrap(),
            vec!["loss <sta> <percent>".to_string()]
        );
        assert!(session.handle_command("help stats").unwrap()[0].starts_with("usage: stats"));
        assert_eq!(
            session.handle_command("run").unwrap(),
            vec!["ERR usage run <periods>".to_string()]
        );
    }

    #[test]
    fn channel_loss_scales_delivery() {
        let mut channel = Channel::new(1);
        let handle = StationHandle::from_index(2);
        let fast = RateDescriptor::ht(7, 0, Bandwidth::Mhz20, GuardInterval::Long);
        assert_eq!(channel.delivery_percent(handle, fast), 58);
        channel.set_loss(handle, 50);
        assert_eq!(channel.delivery_percent(handle, fast), 29);
        channel.set_loss(handle, 100);
        let report = channel.transmit_aggregate(handle, fast, 8);
        assert_eq!(report.block_ack, None);
        assert_eq!(Completion::from_aggregate(&report).failures(), 8);
    }

    #[test]
    fn station_tokens_accept_both_spellings() {
        assert_eq!(parse_station("sta3"), Some(StationHandle::from_index(3)));
        assert_eq!(parse_station("STA1"), Some(StationHandle::from_index(1)));
        assert_eq!(parse_station("2"), Some(StationHandle::from_index(2)));
        assert_eq!(parse_station("station"), None);
    }
}
