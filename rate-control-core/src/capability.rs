//! Station capability negotiation.
//!
//! A [`CapabilityProfile`] is computed once at association from what the peer
//! advertises and what the local radio supports. It bounds every descriptor
//! the engine may ever put into a station's sample table: the legacy rate
//! set, the HT/VHT MCS maps, stream count, bandwidth and guard interval.

#![allow(clippy::cast_possible_truncation)]

use core::fmt;

use crate::descriptor::{
    vht_rate_absent, Bandwidth, FormatClass, GuardInterval, LegacyRate, Preamble, RateDescriptor,
    HT_MCS_MAX,
};
use crate::tuning::MAX_SAMPLES;

/// Sentinel rate index meaning "no legacy rate".
pub const NO_LEGACY_RATE: u8 = LegacyRate::COUNT as u8;

const CCK_MASK: u16 = 0x000F;
const LEGACY_MASK: u16 = 0x0FFF;
const VHT_NOT_SUPPORTED: u8 = 3;
const VHT_MPDU_OVERHEAD: u16 = 60;

/// Bitmap of legacy rates, bit *n* set when hardware rate index *n* is usable.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LegacyRateSet(u16);

impl LegacyRateSet {
    pub const EMPTY: Self = Self(0);

    /// Builds a set from a raw bitmap; bits above 54 Mbps are dropped.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits & LEGACY_MASK)
    }

    /// Builds a set from 802.11 supported-rate octets. Unknown octets are
    /// ignored.
    #[must_use]
    pub fn from_rates(octets: &[u8]) -> Self {
        octets
            .iter()
            .filter_map(|octet| LegacyRate::from_supported_rate(*octet))
            .fold(Self::EMPTY, Self::with)
    }

    /// Returns the set with `rate` added.
    #[must_use]
    pub const fn with(self, rate: LegacyRate) -> Self {
        Self(self.0 | (1 << rate.index()))
    }

    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, rate: LegacyRate) -> bool {
        self.contains_index(rate.index())
    }

    /// Returns `true` when rate index `index` is in the set.
    #[must_use]
    pub const fn contains_index(self, index: u8) -> bool {
        index < NO_LEGACY_RATE && self.0 & (1 << index) != 0
    }

    /// The DSSS/CCK subset.
    #[must_use]
    pub const fn cck_only(self) -> Self {
        Self(self.0 & CCK_MASK)
    }

    /// Lowest rate index, or [`NO_LEGACY_RATE`].
    #[must_use]
    pub const fn lowest_index(self) -> u8 {
        if self.0 == 0 {
            NO_LEGACY_RATE
        } else {
            self.0.trailing_zeros() as u8
        }
    }

    /// Highest rate index, or [`NO_LEGACY_RATE`].
    #[must_use]
    pub const fn highest_index(self) -> u8 {
        if self.0 == 0 {
            NO_LEGACY_RATE
        } else {
            (15 - self.0.leading_zeros()) as u8
        }
    }
}

/// HT MCS bitmaps for spatial streams 1 to 4.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HtMcsSet(pub [u8; 4]);

impl HtMcsSet {
    /// Every MCS on the first `streams` streams.
    #[must_use]
    pub const fn full(streams: u8) -> Self {
        let mut set = [0u8; 4];
        let mut i = 0;
        while i < set.len() && i < streams as usize {
            set[i] = 0xFF;
            i += 1;
        }
        Self(set)
    }

    /// Highest zero-based stream with any MCS set.
    #[must_use]
    pub fn highest_stream(self) -> Option<u8> {
        self.0
            .iter()
            .rposition(|mask| *mask != 0)
            .and_then(|index| u8::try_from(index).ok())
    }

    /// Returns `true` when `mcs` is usable on zero-based stream `nss`.
    #[must_use]
    pub fn contains(self, nss: u8, mcs: u8) -> bool {
        mcs <= HT_MCS_MAX
            && self
                .0
                .get(usize::from(nss))
                .is_some_and(|mask| mask & (1 << mcs) != 0)
    }

    /// Highest MCS usable on zero-based stream `nss`.
    #[must_use]
    pub fn highest_mcs(self, nss: u8) -> Option<u8> {
        let mask = *self.0.get(usize::from(nss))?;
        if mask == 0 {
            None
        } else {
            u8::try_from(7 - mask.leading_zeros()).ok()
        }
    }
}

/// VHT MCS map: two bits per stream, 0 = MCS 0-7, 1 = 0-8, 2 = 0-9,
/// 3 = stream not supported.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VhtMcsMap(pub u16);

impl VhtMcsMap {
    /// A map with no supported stream.
    pub const NONE: Self = Self(0xFFFF);

    /// The first `streams` streams with MCS 0 to `max_mcs`.
    #[must_use]
    pub const fn uniform(streams: u8, max_mcs: u8) -> Self {
        let field = match max_mcs {
            0..=7 => 0,
            8 => 1,
            _ => 2,
        };
        let mut map = 0xFFFFu16;
        let mut nss = 0;
        while nss < 8 && nss < streams {
            map &= !(0x3 << (nss * 2));
            map |= field << (nss * 2);
            nss += 1;
        }
        Self(map)
    }

    const fn field(self, nss: u8) -> u8 {
        ((self.0 >> (nss * 2)) & 0x3) as u8
    }

    /// Highest MCS on zero-based stream `nss`, `None` when unsupported.
    #[must_use]
    pub const fn stream_max_mcs(self, nss: u8) -> Option<u8> {
        if nss >= 8 {
            return None;
        }
        match self.field(nss) {
            VHT_NOT_SUPPORTED => None,
            field => Some(7 + field),
        }
    }

    /// Highest zero-based supported stream.
    #[must_use]
    pub fn highest_stream(self) -> Option<u8> {
        (0..8u8).rev().find(|nss| self.field(*nss) != VHT_NOT_SUPPORTED)
    }

    /// Highest MCS of the first stream.
    #[must_use]
    pub const fn max_mcs(self) -> Option<u8> {
        self.stream_max_mcs(0)
    }

    /// Per-stream minimum of two maps. Streams after the first one either map
    /// lacks are unsupported.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        let mut map = 0xFFFFu16;
        for nss in 0..8u8 {
            let (ours, theirs) = (self.field(nss), other.field(nss));
            if ours == VHT_NOT_SUPPORTED || theirs == VHT_NOT_SUPPORTED {
                break;
            }
            map &= !(0x3 << (nss * 2));
            map |= u16::from(ours.min(theirs)) << (nss * 2);
        }
        Self(map)
    }
}

/// Maximum MPDU length advertised in VHT capabilities.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VhtMaxMpdu {
    Octets3895,
    Octets7991,
    Octets11454,
}

impl VhtMaxMpdu {
    #[must_use]
    pub const fn octets(self) -> u16 {
        match self {
            VhtMaxMpdu::Octets3895 => 3895,
            VhtMaxMpdu::Octets7991 => 7991,
            VhtMaxMpdu::Octets11454 => 11454,
        }
    }
}

/// HT capabilities advertised by a peer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HtCapabilities {
    pub mcs: HtMcsSet,
    pub short_gi_20: bool,
    pub short_gi_40: bool,
    /// Peer accepts 7935-byte A-MSDUs.
    pub long_amsdu: bool,
}

/// VHT capabilities advertised by a peer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VhtCapabilities {
    pub rx_mcs_map: VhtMcsMap,
    pub short_gi_80: bool,
    pub short_gi_160: bool,
    pub max_mpdu: VhtMaxMpdu,
}

/// What a peer advertised at association.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PeerCapabilities {
    pub legacy_rates: LegacyRateSet,
    pub ht: Option<HtCapabilities>,
    pub vht: Option<VhtCapabilities>,
    /// Operating bandwidth of the link.
    pub bandwidth: Bandwidth,
}

impl PeerCapabilities {
    /// A legacy-only peer on a 20 MHz channel.
    #[must_use]
    pub const fn legacy(legacy_rates: LegacyRateSet) -> Self {
        Self {
            legacy_rates,
            ht: None,
            vht: None,
            bandwidth: Bandwidth::Mhz20,
        }
    }
}

/// What the local radio supports.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LocalCapabilities {
    pub ht_mcs: HtMcsSet,
    pub vht_tx_mcs_map: VhtMcsMap,
    /// Only long DSSS/CCK preambles may be used.
    pub long_preamble_only: bool,
}

impl Default for LocalCapabilities {
    fn default() -> Self {
        Self {
            ht_mcs: HtMcsSet::full(2),
            vht_tx_mcs_map: VhtMcsMap::uniform(2, 9),
            long_preamble_only: false,
        }
    }
}

/// Reasons a fixed-rate request is refused.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FixedRateError {
    /// Format newer than the station supports.
    FormatTooNew,
    /// VHT stations only take VHT fixed rates.
    FormatMismatch,
    /// Station has no usable DSSS/CCK rate.
    LegacyUnavailable,
    /// Short preamble requested on a long-preamble-only station.
    PreambleNotPermitted,
    /// Short guard interval requested but unsupported.
    GuardNotPermitted,
    /// Bandwidth above the negotiated maximum.
    BandwidthTooWide,
    /// More spatial streams than negotiated.
    TooManyStreams,
    /// Rate missing from the negotiated rate maps.
    RateNotSupported,
}

impl fmt::Display for FixedRateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FixedRateError::FormatTooNew => "format not supported by station",
            FixedRateError::FormatMismatch => "station requires a VHT rate",
            FixedRateError::LegacyUnavailable => "station has no legacy rates",
            FixedRateError::PreambleNotPermitted => "short preamble not permitted",
            FixedRateError::GuardNotPermitted => "short guard interval not supported",
            FixedRateError::BandwidthTooWide => "bandwidth above negotiated maximum",
            FixedRateError::TooManyStreams => "too many spatial streams",
            FixedRateError::RateNotSupported => "rate not in station rate set",
        };
        f.write_str(text)
    }
}

/// Negotiated per-station capability profile.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CapabilityProfile {
    format: FormatClass,
    legacy: LegacyRateSet,
    ht_mcs: HtMcsSet,
    vht_mcs: VhtMcsMap,
    max_nss: u8,
    max_mcs: u8,
    max_bandwidth: Bandwidth,
    short_gi: bool,
    long_preamble_only: bool,
    max_amsdu_len: u16,
}

impl CapabilityProfile {
    /// Profile used when negotiation yields no usable rate: 1 Mbps with a long
    /// preamble.
    #[must_use]
    pub const fn fallback() -> Self {
        Self::legacy_only(LegacyRateSet::EMPTY.with(LegacyRate::Mbps1), true)
    }

    /// A legacy profile on a 20 MHz channel.
    #[must_use]
    pub const fn legacy_only(rates: LegacyRateSet, long_preamble_only: bool) -> Self {
        Self {
            format: FormatClass::Legacy,
            legacy: rates,
            ht_mcs: HtMcsSet([0; 4]),
            vht_mcs: VhtMcsMap::NONE,
            max_nss: 0,
            max_mcs: 0,
            max_bandwidth: Bandwidth::Mhz20,
            short_gi: false,
            long_preamble_only,
            max_amsdu_len: 0,
        }
    }

    /// Negotiates the profile for a newly associated peer. Never fails: when
    /// nothing usable is left the [`fallback`](Self::fallback) profile is
    /// returned.
    #[must_use]
    pub fn negotiate(peer: &PeerCapabilities, local: &LocalCapabilities) -> Self {
        if let (Some(ht), Some(vht)) = (peer.ht, peer.vht) {
            if let Some(profile) = Self::negotiate_vht(peer, &ht, &vht, local) {
                return profile;
            }
        }
        if let Some(ht) = peer.ht {
            if let Some(profile) = Self::negotiate_ht(peer, &ht, local) {
                return profile;
            }
        }
        if peer.legacy_rates.is_empty() {
            return Self::fallback();
        }
        Self::legacy_only(peer.legacy_rates, local.long_preamble_only)
    }

    fn negotiate_vht(
        peer: &PeerCapabilities,
        ht: &HtCapabilities,
        vht: &VhtCapabilities,
        local: &LocalCapabilities,
    ) -> Option<Self> {
        let max_nss = vht
            .rx_mcs_map
            .highest_stream()?
            .min(local.vht_tx_mcs_map.highest_stream()?);
        let max_mcs = vht
            .rx_mcs_map
            .max_mcs()?
            .min(local.vht_tx_mcs_map.max_mcs()?);
        let short_gi = match peer.bandwidth {
            Bandwidth::Mhz20 => ht.short_gi_20,
            Bandwidth::Mhz40 => ht.short_gi_40,
            Bandwidth::Mhz80 => vht.short_gi_80,
            Bandwidth::Mhz160 => vht.short_gi_160,
        };

        Some(Self {
            format: FormatClass::Vht,
            legacy: LegacyRateSet::EMPTY,
            ht_mcs: ht.mcs,
            vht_mcs: vht.rx_mcs_map.intersect(local.vht_tx_mcs_map),
            max_nss,
            max_mcs,
            max_bandwidth: peer.bandwidth,
            short_gi,
            long_preamble_only: false,
            max_amsdu_len: vht.max_mpdu.octets() - VHT_MPDU_OVERHEAD,
        })
    }

    fn negotiate_ht(
        peer: &PeerCapabilities,
        ht: &HtCapabilities,
        local: &LocalCapabilities,
    ) -> Option<Self> {
        let max_nss = ht.mcs.highest_stream()?.min(local.ht_mcs.highest_stream()?);
        let max_bandwidth = peer.bandwidth.min(Bandwidth::Mhz40);
        let short_gi = match max_bandwidth {
            Bandwidth::Mhz20 => ht.short_gi_20,
            _ => ht.short_gi_40,
        };

        Some(Self {
            format: FormatClass::Ht,
            legacy: peer.legacy_rates.cck_only(),
            ht_mcs: ht.mcs,
            vht_mcs: VhtMcsMap::NONE,
            max_nss,
            max_mcs: HT_MCS_MAX,
            max_bandwidth,
            short_gi,
            long_preamble_only: local.long_preamble_only,
            max_amsdu_len: if ht.long_amsdu { 4095 } else { 3839 },
        })
    }

    #[must_use]
    pub const fn format(&self) -> FormatClass {
        self.format
    }

    #[must_use]
    pub const fn legacy_rates(&self) -> LegacyRateSet {
        self.legacy
    }

    #[must_use]
    pub const fn ht_mcs(&self) -> HtMcsSet {
        self.ht_mcs
    }

    #[must_use]
    pub const fn vht_mcs(&self) -> VhtMcsMap {
        self.vht_mcs
    }

    /// Lowest legacy rate index, or [`NO_LEGACY_RATE`].
    #[must_use]
    pub const fn legacy_min(&self) -> u8 {
        self.legacy.lowest_index()
    }

    /// Highest legacy rate index, or [`NO_LEGACY_RATE`].
    #[must_use]
    pub const fn legacy_max(&self) -> u8 {
        self.legacy.highest_index()
    }

    /// Returns `true` when the capability floor includes legacy rates.
    #[must_use]
    pub const fn allows_legacy(&self) -> bool {
        self.legacy_min() <= LegacyRate::Mbps54.index()
    }

    /// Returns `true` when DSSS/CCK rates may be used.
    #[must_use]
    pub const fn allows_cck(&self) -> bool {
        self.legacy_min() <= LegacyRate::Mbps11.index()
    }

    /// Zero-based maximum spatial stream index.
    #[must_use]
    pub const fn max_nss(&self) -> u8 {
        self.max_nss
    }

    /// Maximum MCS (HT/VHT only).
    #[must_use]
    pub const fn max_mcs(&self) -> u8 {
        self.max_mcs
    }

    #[must_use]
    pub const fn max_bandwidth(&self) -> Bandwidth {
        self.max_bandwidth
    }

    /// Narrowest bandwidth explored: one class below the maximum.
    #[must_use]
    pub const fn min_bandwidth(&self) -> Bandwidth {
        self.max_bandwidth.narrower()
    }

    #[must_use]
    pub const fn short_gi(&self) -> bool {
        self.short_gi
    }

    #[must_use]
    pub const fn long_preamble_only(&self) -> bool {
        self.long_preamble_only
    }

    /// Preamble used for rates picked without a random choice.
    #[must_use]
    pub const fn default_preamble(&self) -> Preamble {
        Preamble::from_long(self.long_preamble_only)
    }

    /// Capability limit on the A-MSDU length, in bytes.
    #[must_use]
    pub const fn max_amsdu_len(&self) -> u16 {
        self.max_amsdu_len
    }

    /// Updates the operating bandwidth and stream limit.
    pub fn set_bandwidth_nss(&mut self, bandwidth: Bandwidth, nss: u8) {
        self.max_bandwidth = match self.format {
            FormatClass::Legacy => Bandwidth::Mhz20,
            FormatClass::Ht => bandwidth.min(Bandwidth::Mhz40),
            FormatClass::Vht => bandwidth,
        };
        self.max_nss = match self.format {
            FormatClass::Legacy => 0,
            FormatClass::Ht => nss.min(crate::descriptor::HT_NSS_MAX),
            FormatClass::Vht => nss.min(crate::descriptor::VHT_NSS_MAX),
        };
    }

    /// Updates the DSSS/CCK preamble policy.
    pub fn set_long_preamble_only(&mut self, long_only: bool) {
        self.long_preamble_only = long_only;
    }

    /// Returns `true` when the rate maps include `descriptor`.
    #[must_use]
    pub fn permits(&self, descriptor: RateDescriptor) -> bool {
        match descriptor {
            RateDescriptor::Legacy { rate, .. } => self.legacy.contains(rate),
            RateDescriptor::Ht { mcs, nss, .. } => self.ht_mcs.contains(nss, mcs),
            RateDescriptor::Vht {
                mcs,
                nss,
                bandwidth,
                ..
            } => {
                self.vht_mcs
                    .stream_max_mcs(nss)
                    .is_some_and(|max| mcs <= max)
                    && !vht_rate_absent(mcs, nss, bandwidth)
            }
        }
    }

    /// Checks whether `descriptor` may be forced as a fixed rate.
    ///
    /// # Errors
    ///
    /// Returns the first [`FixedRateError`] rule the descriptor breaks.
    pub fn validate_fixed(&self, descriptor: RateDescriptor) -> Result<(), FixedRateError> {
        let format = descriptor.format();
        if format > self.format {
            return Err(FixedRateError::FormatTooNew);
        }
        if self.format == FormatClass::Vht && format != FormatClass::Vht {
            return Err(FixedRateError::FormatMismatch);
        }
        if self.format == FormatClass::Ht && format == FormatClass::Legacy && !self.allows_cck() {
            return Err(FixedRateError::LegacyUnavailable);
        }

        if let RateDescriptor::Legacy { rate, preamble } = descriptor {
            if rate.is_cck() && !preamble.is_long() && self.long_preamble_only {
                return Err(FixedRateError::PreambleNotPermitted);
            }
        } else {
            if descriptor.guard().is_short() && !self.short_gi {
                return Err(FixedRateError::GuardNotPermitted);
            }
            if descriptor.bandwidth() > self.max_bandwidth {
                return Err(FixedRateError::BandwidthTooWide);
            }
            if descriptor.nss() > self.max_nss {
                return Err(FixedRateError::TooManyStreams);
            }
        }

        if !self.permits(descriptor) {
            return Err(FixedRateError::RateNotSupported);
        }
        Ok(())
    }

    /// Lowest allowed descriptor; always entry 0 of the sample table.
    ///
    /// A DSSS/CCK floor always uses the long preamble, which every station
    /// accepts, so the floor stays put when the preamble policy changes.
    #[must_use]
    pub fn lowest(&self) -> RateDescriptor {
        let cck_floor = self.legacy_min() == LegacyRate::Mbps1.index();
        match self.format {
            FormatClass::Legacy => match LegacyRate::from_index(self.legacy_min()) {
                Some(rate) => RateDescriptor::legacy(rate, Preamble::Long),
                None => RateDescriptor::legacy(LegacyRate::Mbps1, Preamble::Long),
            },
            FormatClass::Ht if cck_floor => {
                RateDescriptor::legacy(LegacyRate::Mbps1, Preamble::Long)
            }
            FormatClass::Ht => RateDescriptor::ht(0, 0, Bandwidth::Mhz20, GuardInterval::Long),
            FormatClass::Vht => RateDescriptor::vht(0, 0, Bandwidth::Mhz20, GuardInterval::Long),
        }
    }

    /// Highest descriptor the station is seeded with.
    #[must_use]
    pub fn highest(&self) -> RateDescriptor {
        let guard = GuardInterval::from_short(self.short_gi);
        match self.format {
            FormatClass::Legacy => match LegacyRate::from_index(self.legacy_max()) {
                Some(rate) => RateDescriptor::legacy(rate, self.default_preamble()),
                None => self.lowest(),
            },
            FormatClass::Ht => {
                let mcs = self
                    .ht_mcs
                    .highest_mcs(self.max_nss)
                    .unwrap_or(self.max_mcs);
                RateDescriptor::ht(mcs, self.max_nss, self.max_bandwidth, guard)
            }
            FormatClass::Vht => RateDescriptor::vht(7, self.max_nss, self.max_bandwidth, guard),
        }
    }

    /// Number of sample-table entries for this station, at most
    /// [`MAX_SAMPLES`].
    #[must_use]
    pub fn num_samples(&self) -> usize {
        let preamble_variants = if self.long_preamble_only { 1 } else { 2 };
        let cck = || {
            let bits = self.legacy.bits();
            let mut count = usize::from(bits & 1 != 0);
            for index in 1..=3 {
                if bits & (1 << index) != 0 {
                    count += preamble_variants;
                }
            }
            count
        };
        let gi_variants = if self.short_gi { 2 } else { 1 };

        let count = match self.format {
            FormatClass::Legacy => {
                let ofdm = (self.legacy.bits() >> 4).count_ones() as usize;
                cck() + ofdm
            }
            FormatClass::Ht => self.ht_mcs.0[0].count_ones() as usize * gi_variants + cck(),
            FormatClass::Vht => {
                let mcs_count = match self.vht_mcs.max_mcs() {
                    Some(8 | 9) => 9,
                    _ => 8,
                };
                mcs_count * gi_variants
            }
        };
        count.clamp(1, MAX_SAMPLES)
    }
}

impl Default for CapabilityProfile {
    fn default() -> Self {
        Self::fallback()
    }
}
