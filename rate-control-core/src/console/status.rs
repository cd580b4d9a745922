//! Text rendering of station snapshots.
//!
//! [`StatusFormatter`] keeps the console output identical between the
//! firmware and the emulator. Each `write_*` call emits one line without a
//! terminator.

use core::fmt;

use crate::arena::StationHandle;
use crate::descriptor::RateDescriptor;
use crate::station::StationStats;
use crate::tuning::FRACTION_SHIFT;

const FRACTION_MASK: u32 = (1 << FRACTION_SHIFT) - 1;

#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    stats: &'a StationStats,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(stats: &'a StationStats) -> Self {
        Self { stats }
    }

    fn best(&self) -> Option<&'a crate::sample::RateSample> {
        self.stats.samples.get(self.stats.chain[0].index)
    }

    /// Writes the `show` line (e.g. `sta0 ht best=ht mcs7 1ss 20MHz lgi p=93% step=0 agg=on amsdu=3839`).
    pub fn write_summary_line<W: fmt::Write>(
        &self,
        writer: &mut W,
        station: StationHandle,
    ) -> fmt::Result {
        write!(writer, "{station} {}", self.stats.format.label())?;
        match self.best() {
            Some(best) => write!(writer, " best={} p={}", best.descriptor, best.probability)?,
            None => writer.write_str(" best=none")?,
        }
        write!(
            writer,
            " step={} agg={} amsdu={}",
            self.stats.retry_step,
            on_off(self.stats.aggregation_allowed),
            self.stats.amsdu_len
        )?;
        write_fixed(writer, self.stats.fixed_rate)
    }

    /// Writes the retry chain (e.g. `chain 7:52000 6:48000 2:12000 0:1000`).
    pub fn write_chain_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("chain")?;
        for step in &self.stats.chain {
            write!(writer, " {}:{}", step.index, step.throughput)?;
        }
        Ok(())
    }

    /// Writes aggregation and trial counters.
    pub fn write_period_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let average = self.stats.average_aggregate;
        let whole = average >> FRACTION_SHIFT;
        let hundredths = ((average & FRACTION_MASK) * 100) >> FRACTION_SHIFT;
        write!(
            writer,
            "period frames={} packets={} avg={whole}.{hundredths:02} trial={} countdown={}",
            self.stats.aggregate_frames,
            self.stats.aggregate_packets,
            self.stats.trial_status.label(),
            self.stats.trial_countdown
        )
    }

    /// Writes one sample-table row, or nothing past the end of the table.
    pub fn write_sample_line<W: fmt::Write>(&self, writer: &mut W, index: usize) -> fmt::Result {
        let Some(sample) = self.stats.samples.get(index) else {
            return Ok(());
        };
        let marker = if self.stats.chain.iter().any(|step| step.index == index) {
            '*'
        } else {
            ' '
        };
        write!(
            writer,
            "{marker}[{index}] {} att={} ok={} p={} skip={} retry={}",
            sample.descriptor,
            sample.attempts,
            sample.successes,
            sample.probability,
            sample.skipped,
            sample.retry_requests & 0x0F
        )
    }

    /// Number of sample rows [`write_sample_line`](Self::write_sample_line) renders.
    #[must_use]
    pub fn sample_rows(&self) -> usize {
        self.stats.samples.len()
    }
}

#[cfg(feature = "alloc")]
impl StatusFormatter<'_> {
    /// Owned copy of the summary line.
    #[must_use]
    pub fn summary_line(&self, station: StationHandle) -> alloc::string::String {
        let mut line = alloc::string::String::new();
        // Writing into a `String` cannot fail.
        let _ = self.write_summary_line(&mut line, station);
        line
    }

    /// Owned copy of every line `stats` prints, without terminators.
    #[must_use]
    pub fn lines(&self, station: StationHandle) -> alloc::vec::Vec<alloc::string::String> {
        use alloc::string::String;

        let mut lines = alloc::vec![self.summary_line(station)];
        let mut chain = String::new();
        let _ = self.write_chain_line(&mut chain);
        lines.push(chain);
        let mut period = String::new();
        let _ = self.write_period_line(&mut period);
        lines.push(period);
        for index in 0..self.sample_rows() {
            let mut row = String::new();
            let _ = self.write_sample_line(&mut row, index);
            lines.push(row);
        }
        lines
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

fn write_fixed<W: fmt::Write>(writer: &mut W, fixed: Option<RateDescriptor>) -> fmt::Result {
    match fixed {
        Some(descriptor) => write!(writer, " fixed=[{descriptor}]"),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::RetryStep;
    use crate::descriptor::{LegacyRate, Preamble, FormatClass};
    use crate::estimator::Probability;
    use crate::sample::RateSample;
    use crate::trial::TrialStatus;
    use heapless::{String, Vec};

    fn stats() -> StationStats {
        let mut samples = Vec::new();
        let mut slow = RateSample::new(RateDescriptor::legacy(LegacyRate::Mbps1, Preamble::Long));
        slow.probability = Probability::percent(100);
        let mut fast = RateSample::new(RateDescriptor::legacy(LegacyRate::Mbps12, Preamble::Long));
        fast.probability = Probability::HALF;
        fast.attempts = 10;
        fast.successes = 9;
        let _ = samples.push(slow);
        let _ = samples.push(fast);

        StationStats {
            format: FormatClass::Legacy,
            table_len: 2,
            aggregate_frames: 3,
            aggregate_packets: 2,
            average_aggregate: 3 << (FRACTION_SHIFT - 1),
            retry_step: 0,
            trial_countdown: 4,
            trial_status: TrialStatus::Idle,
            chain: [
                RetryStep::new(1, 9000),
                RetryStep::new(1, 9000),
                RetryStep::new(1, 9000),
                RetryStep::new(0, 900),
            ],
            samples,
            aggregation_allowed: false,
            amsdu_len: 0,
            fixed_rate: None,
        }
    }

    #[test]
    fn renders_summary_line() {
        let stats = stats();
        let mut line: String<128> = String::new();
        StatusFormatter::new(&stats)
            .write_summary_line(&mut line, StationHandle::from_index(0))
            .unwrap();
        assert_eq!(
            line.as_str(),
            "sta0 legacy best=legacy 12M p=50% step=0 agg=off amsdu=0"
        );
    }

    #[test]
    fn renders_chain_and_period() {
        let stats = stats();
        let formatter = StatusFormatter::new(&stats);

        let mut chain: String<64> = String::new();
        formatter.write_chain_line(&mut chain).unwrap();
        assert_eq!(chain.as_str(), "chain 1:9000 1:9000 1:9000 0:900");

        let mut period: String<96> = String::new();
        formatter.write_period_line(&mut period).unwrap();
        assert_eq!(
            period.as_str(),
            "period frames=3 packets=2 avg=1.50 trial=idle countdown=4"
        );
    }

    #[test]
    fn marks_chain_members_in_sample_rows() {
        let stats = stats();
        let formatter = StatusFormatter::new(&stats);
        assert_eq!(formatter.sample_rows(), 2);

        let mut row: String<96> = String::new();
        formatter.write_sample_line(&mut row, 1).unwrap();
        assert_eq!(
            row.as_str(),
            "*[1] legacy 12M att=10 ok=9 p=50% skip=0 retry=0"
        );

        let mut past_end: String<8> = String::new();
        formatter.write_sample_line(&mut past_end, 5).unwrap();
        assert!(past_end.is_empty());
    }
}
