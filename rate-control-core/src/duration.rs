//! Reference transmit durations.
//!
//! Durations are in nanoseconds for a 1200-byte frame. HT and VHT share one
//! table indexed by `(mcs << 3) | (bandwidth << 1) | short_gi`; the value is
//! for a single spatial stream and is divided by the stream count.

use crate::descriptor::{DurationKey, RateDescriptor};

const MIMO_NS: [u32; 80] = [
    // MCS 0: 20 LGI, 20 SGI, 40 LGI, 40 SGI, 80 LGI, 80 SGI, 160 LGI, 160 SGI
    1_477_000, 1_329_350, 711_250, 640_175, 328_250, 295_475, 164_250, 147_875,
    // MCS 1
    738_500, 664_700, 355_750, 320_225, 164_250, 147_875, 82_250, 74_075,
    // MCS 2
    492_500, 443_300, 237_250, 213_575, 109_500, 98_600, 54_750, 49_325,
    // MCS 3
    369_250, 332_375, 178_000, 160_250, 82_250, 74_075, 40_000, 36_050,
    // MCS 4
    246_250, 221_675, 118_750, 106_925, 54_750, 49_325, 27_500, 24_800,
    // MCS 5
    184_750, 166_325, 89_000, 80_150, 41_250, 37_175, 20_750, 18_725,
    // MCS 6
    164_250, 147_875, 79_250, 71_375, 36_500, 32_900, 18_250, 16_475,
    // MCS 7
    147_750, 133_025, 71_250, 64_175, 33_000, 29_750, 16_500, 14_900,
    // MCS 8
    123_250, 110_975, 59_500, 53_600, 27_500, 24_800, 13_750, 12_425,
    // MCS 9
    111_000, 99_950, 53_500, 48_200, 24_750, 22_325, 12_500, 11_300,
];

// (rate index << 1) | long preamble
const CCK_NS: [u32; 8] = [
    10_452_000, 10_548_000, 5_380_000, 5_476_000, 2_315_000, 2_411_000, 1_439_000, 1_535_000,
];

// 6 Mbps .. 54 Mbps
const OFDM_NS: [u32; 8] = [
    1_600_000, 1_068_000, 800_000, 536_000, 400_000, 268_000, 200_000, 180_000,
];

/// Looks up the reference duration for a key. Out-of-range keys yield 0.
#[must_use]
pub fn lookup(key: DurationKey) -> u32 {
    match key {
        DurationKey::Cck { index } => CCK_NS.get(usize::from(index)).copied().unwrap_or(0),
        DurationKey::Ofdm { index } => OFDM_NS.get(usize::from(index)).copied().unwrap_or(0),
        DurationKey::Mimo { index, streams } => MIMO_NS
            .get(usize::from(index))
            .map_or(0, |ns| ns / u32::from(streams.max(1))),
    }
}

impl RateDescriptor {
    /// Reference duration of a 1200-byte frame at this rate, in ns.
    #[must_use]
    pub fn duration_ns(self) -> u32 {
        lookup(self.duration_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Bandwidth, GuardInterval, LegacyRate, Preamble};

    #[test]
    fn legacy_durations_match_tables() {
        let one = RateDescriptor::legacy(LegacyRate::Mbps1, Preamble::Long);
        assert_eq!(one.duration_ns(), 10_548_000);

        let two_short = RateDescriptor::legacy(LegacyRate::Mbps2, Preamble::Short);
        assert_eq!(two_short.duration_ns(), 5_380_000);

        let fifty_four = RateDescriptor::legacy(LegacyRate::Mbps54, Preamble::Short);
        assert_eq!(fifty_four.duration_ns(), 180_000);
    }

    #[test]
    fn mimo_durations_divide_by_streams() {
        let one_stream = RateDescriptor::ht(7, 0, Bandwidth::Mhz20, GuardInterval::Long);
        let two_streams = RateDescriptor::ht(7, 1, Bandwidth::Mhz20, GuardInterval::Long);
        assert_eq!(one_stream.duration_ns(), 147_750);
        assert_eq!(two_streams.duration_ns(), 73_875);

        let vht = RateDescriptor::vht(9, 0, Bandwidth::Mhz160, GuardInterval::Short);
        assert_eq!(vht.duration_ns(), 11_300);
    }

    #[test]
    fn faster_rates_are_shorter() {
        for mcs in 1..=7 {
            let slower = RateDescriptor::ht(mcs - 1, 0, Bandwidth::Mhz40, GuardInterval::Short);
            let faster = RateDescriptor::ht(mcs, 0, Bandwidth::Mhz40, GuardInterval::Short);
            assert!(faster.duration_ns() < slower.duration_ns());
        }
    }
}
