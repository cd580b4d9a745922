//! Success-probability and throughput estimation.
//!
//! Probabilities and average aggregate lengths are unsigned 16.16 fixed-point
//! values. Throughput is an integer figure of merit; it is only meaningful
//! relative to other throughputs of the same station.

use core::fmt;

use crate::descriptor::RateDescriptor;
use crate::tuning::{EWMA_DIVISOR, EWMA_WEIGHT, FRACTION_SHIFT, FRAME_OVERHEAD_NS};

const FRACTION_ONE: u32 = 1 << FRACTION_SHIFT;

/// Exponentially weighted moving average with the engine's fixed weight.
#[must_use]
pub fn ewma(old: u32, new: u32) -> u32 {
    let blended = u64::from(new) * u64::from(EWMA_DIVISOR - EWMA_WEIGHT)
        + u64::from(old) * u64::from(EWMA_WEIGHT);
    u32::try_from(blended / u64::from(EWMA_DIVISOR)).unwrap_or(u32::MAX)
}

/// Fixed-point `numerator / denominator`, 0 when the denominator is 0.
#[must_use]
pub fn fraction(numerator: u32, denominator: u32) -> u32 {
    if denominator == 0 {
        return 0;
    }
    let scaled = (u64::from(numerator) << FRACTION_SHIFT) / u64::from(denominator);
    u32::try_from(scaled).unwrap_or(u32::MAX)
}

/// Success probability in 16.16 fixed point, always within `0..=1`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct Probability(u32);

impl Probability {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(FRACTION_ONE);
    pub const ONE_PERCENT: Self = Self::percent(1);
    pub const TEN_PERCENT: Self = Self::percent(10);
    pub const HALF: Self = Self::percent(50);
    pub const NINETY_FIVE_PERCENT: Self = Self::percent(95);

    /// Builds a probability from a whole percentage, clamped to 100.
    #[must_use]
    pub const fn percent(value: u32) -> Self {
        let value = if value > 100 { 100 } else { value };
        Self((value << FRACTION_SHIFT) / 100)
    }

    /// Builds a probability from a raw fixed-point value, clamped to one.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        if raw > FRACTION_ONE {
            Self::ONE
        } else {
            Self(raw)
        }
    }

    /// Ratio of successes to attempts. Zero attempts yield zero.
    #[must_use]
    pub fn from_ratio(successes: u32, attempts: u32) -> Self {
        Self::from_raw(fraction(successes.min(attempts), attempts))
    }

    /// Raw 16.16 value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whole percentage, rounded down.
    #[must_use]
    pub const fn as_percent(self) -> u32 {
        (self.0 * 100) >> FRACTION_SHIFT
    }

    /// Seeds a first estimate from one observation, biased slightly low.
    #[must_use]
    pub const fn first_estimate(observation: Self) -> Self {
        Self(observation.0.saturating_sub(1))
    }

    /// Blends an observation into the running estimate.
    #[must_use]
    pub fn blend(self, observation: Self) -> Self {
        Self::from_raw(ewma(self.0, observation.0))
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percent())
    }
}

/// Rolling estimate of how many MPDUs each transmission carries.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AggregateLength {
    frames: u32,
    packets: u32,
    average: u32,
}

impl AggregateLength {
    /// Starts with an average of one frame per transmission.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frames: 0,
            packets: 0,
            average: FRACTION_ONE,
        }
    }

    /// Accounts one transmission carrying `frames` MPDUs.
    pub fn record(&mut self, frames: u32) {
        self.frames = self.frames.saturating_add(frames);
        self.packets = self.packets.saturating_add(1);
    }

    /// Folds the current period into the average and starts a new period.
    pub fn fold(&mut self) {
        if self.packets > 0 {
            self.average = ewma(self.average, fraction(self.frames, self.packets));
            self.frames = 0;
            self.packets = 0;
        }
    }

    /// Fixed-point average.
    #[must_use]
    pub const fn average(&self) -> u32 {
        self.average
    }

    /// Average rounded down to whole frames.
    #[must_use]
    pub const fn whole_frames(&self) -> u32 {
        self.average >> FRACTION_SHIFT
    }

    /// MPDUs accumulated during the current period.
    #[must_use]
    pub const fn frames(&self) -> u32 {
        self.frames
    }

    /// Transmissions accumulated during the current period.
    #[must_use]
    pub const fn packets(&self) -> u32 {
        self.packets
    }
}

impl Default for AggregateLength {
    fn default() -> Self {
        Self::new()
    }
}

/// Estimated throughput of a descriptor at a given success probability.
///
/// Below 10% the estimate is zero. Every descriptor except DSSS/CCK, which
/// includes OFDM, HT and VHT, pays [`FRAME_OVERHEAD_NS`] divided by the
/// average aggregate length in whole frames. DSSS/CCK pays only its airtime.
#[must_use]
pub fn throughput(
    descriptor: RateDescriptor,
    probability: Probability,
    aggregate: &AggregateLength,
) -> u32 {
    if probability < Probability::TEN_PERCENT {
        return 0;
    }

    let mut nanos = 0u64;
    if !descriptor.is_cck() {
        nanos = u64::from(FRAME_OVERHEAD_NS / aggregate.whole_frames().max(1));
    }
    nanos += u64::from(descriptor.duration_ns());
    if nanos == 0 {
        return 0;
    }

    let scaled = 1_000_000 * ((u64::from(probability.raw()) * 1000) / nanos);
    u32::try_from(scaled >> FRACTION_SHIFT).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Bandwidth, GuardInterval, LegacyRate, Preamble};

    #[test]
    fn ratio_is_clamped_and_handles_zero_attempts() {
        assert_eq!(Probability::from_ratio(0, 0), Probability::ZERO);
        assert_eq!(Probability::from_ratio(5, 5), Probability::ONE);
        assert_eq!(Probability::from_ratio(9, 3), Probability::ONE);
        assert_eq!(Probability::from_ratio(1, 2).as_percent(), 50);
    }

    #[test]
    fn first_estimate_is_biased_low() {
        assert_eq!(
            Probability::first_estimate(Probability::ONE).raw(),
            FRACTION_ONE - 1
        );
        assert_eq!(Probability::first_estimate(Probability::ZERO), Probability::ZERO);
    }

    #[test]
    fn blend_moves_a_quarter_of_the_way() {
        let blended = Probability::ZERO.blend(Probability::ONE);
        assert_eq!(blended.raw(), FRACTION_ONE / 4);
        let again = Probability::ONE.blend(Probability::ONE);
        assert_eq!(again, Probability::ONE);
    }

    #[test]
    fn aggregate_average_tracks_frames_per_packet() {
        let mut aggregate = AggregateLength::new();
        aggregate.record(16);
        aggregate.record(16);
        aggregate.fold();
        // 1 * 96/128 + 16 * 32/128
        assert_eq!(aggregate.whole_frames(), 4);
        assert_eq!(aggregate.packets(), 0);

        aggregate.fold();
        assert_eq!(aggregate.whole_frames(), 4);
    }

    #[test]
    fn unreliable_rates_have_no_throughput() {
        let rate = RateDescriptor::ht(7, 0, Bandwidth::Mhz20, GuardInterval::Long);
        let aggregate = AggregateLength::new();
        assert_eq!(throughput(rate, Probability::percent(9), &aggregate), 0);
        assert!(throughput(rate, Probability::percent(10), &aggregate) > 0);
    }

    #[test]
    fn throughput_never_decreases_with_probability() {
        let aggregate = AggregateLength::new();
        let rates = [
            RateDescriptor::legacy(LegacyRate::Mbps1, Preamble::Long),
            RateDescriptor::legacy(LegacyRate::Mbps11, Preamble::Short),
            RateDescriptor::legacy(LegacyRate::Mbps54, Preamble::Short),
            RateDescriptor::ht(3, 1, Bandwidth::Mhz40, GuardInterval::Short),
            RateDescriptor::vht(9, 2, Bandwidth::Mhz20, GuardInterval::Long),
        ];

        for rate in rates {
            let mut previous = 0;
            for step in 0..=FRACTION_ONE / 64 {
                let current = throughput(rate, Probability::from_raw(step * 64), &aggregate);
                assert!(current >= previous, "{rate} dropped at {step}");
                previous = current;
            }
        }
    }

    fn throughput_over(nanos: u32) -> u32 {
        let scaled = 1_000_000 * ((u64::from(Probability::ONE.raw()) * 1000) / u64::from(nanos));
        u32::try_from(scaled >> FRACTION_SHIFT).unwrap()
    }

    #[test]
    fn overhead_is_amortised_over_ht_aggregates() {
        let ht = RateDescriptor::ht(7, 0, Bandwidth::Mhz20, GuardInterval::Long);
        let mut aggregate = AggregateLength::new();
        assert_eq!(aggregate.whole_frames(), 1);
        assert_eq!(
            throughput(ht, Probability::ONE, &aggregate),
            throughput_over(FRAME_OVERHEAD_NS + ht.duration_ns())
        );

        aggregate.record(16);
        aggregate.fold();
        assert_eq!(aggregate.whole_frames(), 4);
        assert_eq!(
            throughput(ht, Probability::ONE, &aggregate),
            throughput_over(FRAME_OVERHEAD_NS / 4 + ht.duration_ns())
        );

        let cck = RateDescriptor::legacy(LegacyRate::Mbps11, Preamble::Long);
        assert_eq!(
            throughput(cck, Probability::ONE, &aggregate),
            throughput_over(cck.duration_ns())
        );
    }

    #[test]
    fn faster_rate_wins_at_equal_probability() {
        let aggregate = AggregateLength::new();
        let slow = RateDescriptor::legacy(LegacyRate::Mbps24, Preamble::Short);
        let fast = RateDescriptor::legacy(LegacyRate::Mbps54, Preamble::Short);
        let probability = Probability::percent(90);
        assert!(throughput(fast, probability, &aggregate) > throughput(slow, probability, &aggregate));
    }
}
