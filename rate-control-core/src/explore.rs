//! Exploration candidates.
//!
//! Random descriptors seed the sample table; the neighbourhood of the two best
//! descriptors supplies replacements for entries that stopped paying off.

use rand_core::RngCore;

use crate::capability::CapabilityProfile;
use crate::descriptor::{
    Bandwidth, FormatClass, GuardInterval, LegacyRate, Preamble, RateDescriptor, HT_MCS_MAX,
    VHT_MCS_MAX,
};
use crate::tuning::EXPLORATION_CANDIDATES;

// Bit fields of the random word, one per descriptor field.
const RAND_INDEX_MASK: u32 = 0x7F;
const RAND_HT_MCS_MASK: u32 = 0x07;
const RAND_VHT_MCS_MASK: u32 = 0x0F;
const RAND_HT_NSS_OFT: u32 = 3;
const RAND_VHT_NSS_OFT: u32 = 4;
const RAND_BW_OFT: u32 = 7;
const RAND_GI_OFT: u32 = 9;
const RAND_PREAMBLE_OFT: u32 = 10;
const RAND_FORMAT_OFT: u32 = 11;

fn field(word: u32, offset: u32, mask: u32) -> u8 {
    u8::try_from((word >> offset) & mask).unwrap_or(0)
}

fn pick(word: u32, offset: u32, mask: u32, min: u8, max: u8) -> u8 {
    let span = max.saturating_sub(min) + 1;
    field(word, offset, mask) % span + min
}

/// Draws a random descriptor within the station's capability.
pub fn random_descriptor<R: RngCore>(profile: &CapabilityProfile, rng: &mut R) -> RateDescriptor {
    let word = rng.next_u32();
    match profile.format() {
        FormatClass::Legacy => random_legacy(profile, word),
        FormatClass::Ht => {
            if profile.allows_cck() && field(word, RAND_FORMAT_OFT, 0x7) % 2 == 1 {
                random_legacy(profile, word)
            } else {
                random_ht(profile, word)
            }
        }
        FormatClass::Vht => random_vht(profile, word),
    }
}

fn random_legacy(profile: &CapabilityProfile, word: u32) -> RateDescriptor {
    let (min, max) = (profile.legacy_min(), profile.legacy_max());
    let mut index = pick(word, 0, RAND_INDEX_MASK, min, max);
    if !profile.legacy_rates().contains_index(index) {
        index = max;
    }
    let Some(rate) = LegacyRate::from_index(index) else {
        return profile.lowest();
    };

    let long = profile.long_preamble_only() || field(word, RAND_PREAMBLE_OFT, 0x1) == 1;
    RateDescriptor::legacy(rate, Preamble::from_long(long))
}

fn random_guard(profile: &CapabilityProfile, word: u32) -> GuardInterval {
    let short = field(word, RAND_GI_OFT, 0x1) % (u8::from(profile.short_gi()) + 1);
    GuardInterval::from_short(short == 1)
}

fn random_bandwidth(profile: &CapabilityProfile, word: u32) -> Bandwidth {
    let min = profile.min_bandwidth().index();
    let max = profile.max_bandwidth().index();
    Bandwidth::from_index(pick(word, RAND_BW_OFT, 0x3, min, max)).unwrap_or(Bandwidth::Mhz20)
}

fn random_ht(profile: &CapabilityProfile, word: u32) -> RateDescriptor {
    let nss = pick(word, RAND_HT_NSS_OFT, 0x3, 0, profile.max_nss());
    let max_mcs = profile.max_mcs().min(HT_MCS_MAX);
    let mut mcs = pick(word, 0, RAND_HT_MCS_MASK, 0, max_mcs);
    if !profile.ht_mcs().contains(nss, mcs) {
        mcs = max_mcs;
    }
    RateDescriptor::ht(
        mcs,
        nss,
        random_bandwidth(profile, word),
        random_guard(profile, word),
    )
}

fn random_vht(profile: &CapabilityProfile, word: u32) -> RateDescriptor {
    let nss = pick(word, RAND_VHT_NSS_OFT, 0x7, 0, profile.max_nss());
    let mut mcs = pick(word, 0, RAND_VHT_MCS_MASK, 0, profile.max_mcs().min(VHT_MCS_MAX));
    if let Some(stream_max) = profile.vht_mcs().stream_max_mcs(nss) {
        mcs = mcs.min(stream_max);
    }
    RateDescriptor::vht(
        mcs,
        nss,
        random_bandwidth(profile, word),
        random_guard(profile, word),
    )
}

fn neighbour_guard(profile: &CapabilityProfile, current: GuardInterval) -> GuardInterval {
    if profile.short_gi() {
        GuardInterval::Short
    } else {
        current
    }
}

/// Next faster MCS (or legacy rate) within the capability.
#[must_use]
pub fn next_rate(profile: &CapabilityProfile, descriptor: RateDescriptor) -> Option<RateDescriptor> {
    let mcs = descriptor.mcs();
    let next = match descriptor {
        RateDescriptor::Legacy { .. } => {
            let allowed =
                mcs < profile.legacy_max() && profile.legacy_rates().contains_index(mcs + 1);
            allowed.then(|| descriptor.with_mcs(mcs + 1))
        }
        RateDescriptor::Ht { nss, guard, .. } => {
            let allowed = mcs < profile.max_mcs() && profile.ht_mcs().contains(nss, mcs + 1);
            allowed.then(|| {
                descriptor
                    .with_mcs(mcs + 1)
                    .with_guard(neighbour_guard(profile, guard))
            })
        }
        RateDescriptor::Vht { nss, guard, .. } => {
            let stream_max = profile.vht_mcs().stream_max_mcs(nss).unwrap_or(0);
            let allowed = mcs < profile.max_mcs() && mcs < stream_max;
            allowed.then(|| {
                descriptor
                    .with_mcs(mcs + 1)
                    .with_guard(neighbour_guard(profile, guard))
            })
        }
    }?;
    (next != descriptor).then_some(next)
}

/// Next slower MCS (or legacy rate) within the capability.
#[must_use]
pub fn previous_rate(
    profile: &CapabilityProfile,
    descriptor: RateDescriptor,
) -> Option<RateDescriptor> {
    let mcs = descriptor.mcs();
    let previous = match descriptor {
        RateDescriptor::Legacy { .. } => {
            (mcs > profile.legacy_min()).then(|| descriptor.with_mcs(mcs - 1))
        }
        RateDescriptor::Ht { guard, .. } | RateDescriptor::Vht { guard, .. } => (mcs > 0)
            .then(|| {
                descriptor
                    .with_mcs(mcs - 1)
                    .with_guard(neighbour_guard(profile, guard))
            }),
    }?;
    (previous != descriptor).then_some(previous)
}

/// Same rate with the other guard interval, for HT/VHT stations with short
/// GI support.
#[must_use]
pub fn opposite_guard(
    profile: &CapabilityProfile,
    descriptor: RateDescriptor,
) -> Option<RateDescriptor> {
    if descriptor.format() == FormatClass::Legacy || !profile.short_gi() {
        return None;
    }
    Some(descriptor.with_guard(descriptor.guard().opposite()))
}

/// Replacement candidates drawn around the best and second-best descriptors:
/// a random rate, the best rate with the other guard interval, then one step
/// above and below each of the two.
pub fn exploration_candidates<R: RngCore>(
    profile: &CapabilityProfile,
    best: RateDescriptor,
    second: RateDescriptor,
    rng: &mut R,
) -> [Option<RateDescriptor>; EXPLORATION_CANDIDATES] {
    let keep = |candidate: Option<RateDescriptor>| candidate.filter(|d| profile.permits(*d));
    [
        Some(random_descriptor(profile, rng)),
        opposite_guard(profile, best),
        keep(next_rate(profile, best)),
        keep(previous_rate(profile, best)),
        keep(next_rate(profile, second)),
        keep(previous_rate(profile, second)),
    ]
}

/// Visits every descriptor the station could use, slowest formats first,
/// until `visit` returns `false`.
pub fn for_each_descriptor(profile: &CapabilityProfile, mut visit: impl FnMut(RateDescriptor) -> bool) {
    let legacy = profile.legacy_rates();
    let include_legacy = match profile.format() {
        FormatClass::Legacy => true,
        FormatClass::Ht => profile.allows_cck(),
        FormatClass::Vht => false,
    };
    if include_legacy {
        for rate in LegacyRate::ALL {
            if !legacy.contains(rate) {
                continue;
            }
            let long = RateDescriptor::legacy(rate, Preamble::Long);
            if !visit(long) {
                return;
            }
            let short = RateDescriptor::legacy(rate, Preamble::Short);
            if short != long && !profile.long_preamble_only() && !visit(short) {
                return;
            }
        }
    }

    let guards: &[GuardInterval] = if profile.short_gi() {
        &[GuardInterval::Long, GuardInterval::Short]
    } else {
        &[GuardInterval::Long]
    };
    let bandwidths = [
        profile.min_bandwidth(),
        profile.max_bandwidth(),
    ];
    let bandwidths = if bandwidths[0] == bandwidths[1] {
        &bandwidths[..1]
    } else {
        &bandwidths[..]
    };

    for nss in 0..=profile.max_nss() {
        for mcs in 0..=profile.max_mcs() {
            for bandwidth in bandwidths {
                for guard in guards {
                    let candidate = match profile.format() {
                        FormatClass::Legacy => return,
                        FormatClass::Ht => RateDescriptor::ht(mcs, nss, *bandwidth, *guard),
                        FormatClass::Vht => RateDescriptor::vht(mcs, nss, *bandwidth, *guard),
                    };
                    if candidate.mcs() == mcs
                        && candidate.nss() == nss
                        && profile.permits(candidate)
                        && !visit(candidate)
                    {
                        return;
                    }
                }
            }
        }
    }
}
