//! Rate descriptors and their packed hardware encoding.
//!
//! A [`RateDescriptor`] names one physical-layer rate: a legacy DSSS/CCK or
//! OFDM rate, an HT MCS, or a VHT MCS. Each variant only carries the fields
//! that mean something for its format class. The 16-bit packed form written
//! into transmit policy tables is produced by [`RateDescriptor::to_raw`] and
//! parsed by [`RateDescriptor::from_raw`]; nothing else in the crate touches
//! the bit layout.
//!
//! Constructors normalise their inputs: 1 Mbps is always sent with a long
//! preamble, OFDM rates have no preamble choice, HT is limited to 40 MHz, and
//! VHT combinations that do not exist in the rate tables are clamped onto the
//! nearest one that does.

#![allow(clippy::cast_possible_truncation, clippy::cast_lossless)]

use core::fmt;

const MCS_MASK: u16 = 0x007F;
const BW_OFT: u16 = 7;
const BW_MASK: u16 = 0x3 << BW_OFT;
const SHORT_GI_BIT: u16 = 1 << 9;
const PREAMBLE_BIT: u16 = 1 << 10;
const FORMAT_OFT: u16 = 11;
const FORMAT_MASK: u16 = 0x7 << FORMAT_OFT;
const RESERVED_MASK: u16 = 0xC000;

const HT_MCS_MASK: u16 = 0x07;
const HT_NSS_OFT: u16 = 3;
const HT_NSS_MASK: u16 = 0x3 << HT_NSS_OFT;
const VHT_MCS_MASK: u16 = 0x0F;
const VHT_NSS_OFT: u16 = 4;
const VHT_NSS_MASK: u16 = 0x7 << VHT_NSS_OFT;

/// Largest HT MCS index within one spatial stream.
pub const HT_MCS_MAX: u8 = 7;
/// Largest zero-based HT spatial stream index.
pub const HT_NSS_MAX: u8 = 3;
/// Largest VHT MCS index.
pub const VHT_MCS_MAX: u8 = 9;
/// Largest zero-based VHT spatial stream index.
pub const VHT_NSS_MAX: u8 = 7;

/// PHY format class, ordered from oldest to newest.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum FormatClass {
    Legacy,
    Ht,
    Vht,
}

impl FormatClass {
    const NON_HT_CODE: u8 = 0;
    const NON_HT_DUP_CODE: u8 = 1;
    const HT_MF_CODE: u8 = 2;
    const HT_GF_CODE: u8 = 3;
    const VHT_CODE: u8 = 4;

    /// Returns the packed format/modulation code.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            FormatClass::Legacy => Self::NON_HT_CODE,
            FormatClass::Ht => Self::HT_MF_CODE,
            FormatClass::Vht => Self::VHT_CODE,
        }
    }

    /// Returns a short lowercase label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            FormatClass::Legacy => "legacy",
            FormatClass::Ht => "ht",
            FormatClass::Vht => "vht",
        }
    }
}

/// Legacy 802.11b/a/g rates, in hardware rate-index order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum LegacyRate {
    Mbps1,
    Mbps2,
    Mbps5_5,
    Mbps11,
    Mbps6,
    Mbps9,
    Mbps12,
    Mbps18,
    Mbps24,
    Mbps36,
    Mbps48,
    Mbps54,
}

impl LegacyRate {
    /// Number of legacy rates known to the hardware.
    pub const COUNT: usize = 12;

    /// Every legacy rate, indexed by hardware rate index.
    pub const ALL: [LegacyRate; Self::COUNT] = [
        LegacyRate::Mbps1,
        LegacyRate::Mbps2,
        LegacyRate::Mbps5_5,
        LegacyRate::Mbps11,
        LegacyRate::Mbps6,
        LegacyRate::Mbps9,
        LegacyRate::Mbps12,
        LegacyRate::Mbps18,
        LegacyRate::Mbps24,
        LegacyRate::Mbps36,
        LegacyRate::Mbps48,
        LegacyRate::Mbps54,
    ];

    /// Returns the hardware rate index (0 = 1 Mbps, 11 = 54 Mbps).
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Looks up a rate by hardware rate index.
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        if (index as usize) < Self::COUNT {
            Some(Self::ALL[index as usize])
        } else {
            None
        }
    }

    /// Returns `true` for the DSSS/CCK rates (1, 2, 5.5 and 11 Mbps).
    #[must_use]
    pub const fn is_cck(self) -> bool {
        (self as u8) <= LegacyRate::Mbps11 as u8
    }

    /// Nominal rate in kb/s.
    #[must_use]
    pub const fn kbps(self) -> u32 {
        match self {
            LegacyRate::Mbps1 => 1_000,
            LegacyRate::Mbps2 => 2_000,
            LegacyRate::Mbps5_5 => 5_500,
            LegacyRate::Mbps11 => 11_000,
            LegacyRate::Mbps6 => 6_000,
            LegacyRate::Mbps9 => 9_000,
            LegacyRate::Mbps12 => 12_000,
            LegacyRate::Mbps18 => 18_000,
            LegacyRate::Mbps24 => 24_000,
            LegacyRate::Mbps36 => 36_000,
            LegacyRate::Mbps48 => 48_000,
            LegacyRate::Mbps54 => 54_000,
        }
    }

    /// Translates an 802.11 supported-rates octet (500 kb/s units, basic-rate
    /// bit ignored).
    #[must_use]
    pub const fn from_supported_rate(octet: u8) -> Option<Self> {
        match octet & 0x7F {
            2 => Some(LegacyRate::Mbps1),
            4 => Some(LegacyRate::Mbps2),
            11 => Some(LegacyRate::Mbps5_5),
            22 => Some(LegacyRate::Mbps11),
            12 => Some(LegacyRate::Mbps6),
            18 => Some(LegacyRate::Mbps9),
            24 => Some(LegacyRate::Mbps12),
            36 => Some(LegacyRate::Mbps18),
            48 => Some(LegacyRate::Mbps24),
            72 => Some(LegacyRate::Mbps36),
            96 => Some(LegacyRate::Mbps48),
            108 => Some(LegacyRate::Mbps54),
            _ => None,
        }
    }
}

impl fmt::Display for LegacyRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kbps = self.kbps();
        if kbps % 1_000 == 0 {
            write!(f, "{}M", kbps / 1_000)
        } else {
            write!(f, "{}.{}M", kbps / 1_000, (kbps % 1_000) / 100)
        }
    }
}

/// Channel bandwidth class.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Bandwidth {
    Mhz20,
    Mhz40,
    Mhz80,
    Mhz160,
}

impl Bandwidth {
    /// Returns the 2-bit packed bandwidth code.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Looks up a bandwidth class by packed code.
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Bandwidth::Mhz20),
            1 => Some(Bandwidth::Mhz40),
            2 => Some(Bandwidth::Mhz80),
            3 => Some(Bandwidth::Mhz160),
            _ => None,
        }
    }

    /// Looks up a bandwidth class by width in MHz.
    #[must_use]
    pub const fn from_mhz(mhz: u16) -> Option<Self> {
        match mhz {
            20 => Some(Bandwidth::Mhz20),
            40 => Some(Bandwidth::Mhz40),
            80 => Some(Bandwidth::Mhz80),
            160 => Some(Bandwidth::Mhz160),
            _ => None,
        }
    }

    /// Channel width in MHz.
    #[must_use]
    pub const fn mhz(self) -> u16 {
        match self {
            Bandwidth::Mhz20 => 20,
            Bandwidth::Mhz40 => 40,
            Bandwidth::Mhz80 => 80,
            Bandwidth::Mhz160 => 160,
        }
    }

    /// One class narrower, saturating at 20 MHz.
    #[must_use]
    pub const fn narrower(self) -> Self {
        match self {
            Bandwidth::Mhz20 | Bandwidth::Mhz40 => Bandwidth::Mhz20,
            Bandwidth::Mhz80 => Bandwidth::Mhz40,
            Bandwidth::Mhz160 => Bandwidth::Mhz80,
        }
    }

    const fn at_most(self, other: Self) -> Self {
        if (self as u8) <= (other as u8) {
            self
        } else {
            other
        }
    }
}

/// Guard interval used for HT/VHT symbols.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum GuardInterval {
    Long,
    Short,
}

impl GuardInterval {
    /// Builds a guard interval from a short-GI flag.
    #[must_use]
    pub const fn from_short(short: bool) -> Self {
        if short {
            GuardInterval::Short
        } else {
            GuardInterval::Long
        }
    }

    /// Returns `true` for the short guard interval.
    #[must_use]
    pub const fn is_short(self) -> bool {
        matches!(self, GuardInterval::Short)
    }

    /// The other guard interval.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            GuardInterval::Long => GuardInterval::Short,
            GuardInterval::Short => GuardInterval::Long,
        }
    }
}

/// DSSS/CCK preamble type.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Preamble {
    Short,
    Long,
}

impl Preamble {
    /// Builds a preamble from a long-preamble flag.
    #[must_use]
    pub const fn from_long(long: bool) -> Self {
        if long { Preamble::Long } else { Preamble::Short }
    }

    /// Returns `true` for the long preamble.
    #[must_use]
    pub const fn is_long(self) -> bool {
        matches!(self, Preamble::Long)
    }
}

/// Key used to look up a descriptor's reference transmit duration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DurationKey {
    /// `(rate index << 1) | long preamble`.
    Cck { index: u8 },
    /// Rate index minus the 6 Mbps index.
    Ofdm { index: u8 },
    /// `(mcs << 3) | (bandwidth << 1) | short GI`, divided across `streams`.
    Mimo { index: u8, streams: u8 },
}

/// Errors reported when a packed descriptor cannot be decoded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// Bits outside any field are set.
    ReservedBits,
    /// The format code is not one this engine produces.
    UnsupportedFormat(u8),
    /// Legacy rate index beyond 54 Mbps.
    LegacyIndex(u8),
    /// Bandwidth or guard-interval bits set on a legacy rate.
    LegacyFields,
    /// HT rates only exist at 20 and 40 MHz.
    HtBandwidth,
    /// VHT MCS beyond 9.
    VhtMcs(u8),
    /// MCS/bandwidth/stream combination missing from the VHT rate tables.
    VhtAbsent,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::ReservedBits => f.write_str("reserved bits set"),
            DecodeError::UnsupportedFormat(code) => write!(f, "unsupported format code {code}"),
            DecodeError::LegacyIndex(index) => write!(f, "legacy rate index {index} out of range"),
            DecodeError::LegacyFields => f.write_str("bandwidth or guard interval set on legacy rate"),
            DecodeError::HtBandwidth => f.write_str("HT bandwidth above 40 MHz"),
            DecodeError::VhtMcs(mcs) => write!(f, "VHT MCS {mcs} out of range"),
            DecodeError::VhtAbsent => f.write_str("VHT rate absent from rate tables"),
        }
    }
}

/// Returns `true` when a VHT MCS/stream/bandwidth combination does not exist.
///
/// `nss` is zero-based.
#[must_use]
pub const fn vht_rate_absent(mcs: u8, nss: u8, bandwidth: Bandwidth) -> bool {
    if mcs == 6 && matches!(bandwidth, Bandwidth::Mhz80) && (nss == 3 || nss == 6) {
        return true;
    }
    if mcs == 9 {
        return match bandwidth {
            Bandwidth::Mhz20 => nss != 2 && nss != 5,
            Bandwidth::Mhz80 => nss == 5,
            Bandwidth::Mhz160 => nss == 2,
            Bandwidth::Mhz40 => false,
        };
    }
    false
}

/// One physical-layer rate.
///
/// `nss` fields are zero-based (0 = one spatial stream). Build values through
/// [`RateDescriptor::legacy`], [`RateDescriptor::ht`] and
/// [`RateDescriptor::vht`] so they are normalised; two descriptors are
/// duplicates exactly when they compare equal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RateDescriptor {
    Legacy {
        rate: LegacyRate,
        preamble: Preamble,
    },
    Ht {
        mcs: u8,
        nss: u8,
        bandwidth: Bandwidth,
        guard: GuardInterval,
    },
    Vht {
        mcs: u8,
        nss: u8,
        bandwidth: Bandwidth,
        guard: GuardInterval,
    },
}

impl RateDescriptor {
    /// Builds a legacy descriptor. 1 Mbps forces the long preamble, OFDM
    /// rates carry none (encoded as `Short`).
    #[must_use]
    pub const fn legacy(rate: LegacyRate, preamble: Preamble) -> Self {
        let preamble = match rate {
            LegacyRate::Mbps1 => Preamble::Long,
            LegacyRate::Mbps2 | LegacyRate::Mbps5_5 | LegacyRate::Mbps11 => preamble,
            _ => Preamble::Short,
        };
        RateDescriptor::Legacy { rate, preamble }
    }

    /// Builds an HT descriptor, clamping MCS, streams and bandwidth into range.
    #[must_use]
    pub const fn ht(mcs: u8, nss: u8, bandwidth: Bandwidth, guard: GuardInterval) -> Self {
        RateDescriptor::Ht {
            mcs: if mcs > HT_MCS_MAX { HT_MCS_MAX } else { mcs },
            nss: if nss > HT_NSS_MAX { HT_NSS_MAX } else { nss },
            bandwidth: bandwidth.at_most(Bandwidth::Mhz40),
            guard,
        }
    }

    /// Builds a VHT descriptor. Combinations missing from the VHT rate tables
    /// are clamped onto an existing neighbour rather than refused.
    #[must_use]
    pub const fn vht(mcs: u8, nss: u8, bandwidth: Bandwidth, guard: GuardInterval) -> Self {
        let mut mcs = if mcs > VHT_MCS_MAX { VHT_MCS_MAX } else { mcs };
        let mut nss = if nss > VHT_NSS_MAX { VHT_NSS_MAX } else { nss };

        if mcs == 6 && matches!(bandwidth, Bandwidth::Mhz80) && (nss == 3 || nss == 6) {
            nss -= 1;
        }
        if mcs == 9 {
            match bandwidth {
                Bandwidth::Mhz20 if nss != 2 && nss != 5 => mcs = 8,
                Bandwidth::Mhz80 if nss == 5 => nss -= 1,
                Bandwidth::Mhz160 if nss == 2 => nss -= 1,
                _ => {}
            }
        }

        RateDescriptor::Vht {
            mcs,
            nss,
            bandwidth,
            guard,
        }
    }

    /// Format class of the descriptor.
    #[must_use]
    pub const fn format(self) -> FormatClass {
        match self {
            RateDescriptor::Legacy { .. } => FormatClass::Legacy,
            RateDescriptor::Ht { .. } => FormatClass::Ht,
            RateDescriptor::Vht { .. } => FormatClass::Vht,
        }
    }

    /// Returns `true` for DSSS/CCK rates, which are never aggregated.
    #[must_use]
    pub const fn is_cck(self) -> bool {
        match self {
            RateDescriptor::Legacy { rate, .. } => rate.is_cck(),
            _ => false,
        }
    }

    /// MCS index, or the hardware rate index for legacy rates.
    #[must_use]
    pub const fn mcs(self) -> u8 {
        match self {
            RateDescriptor::Legacy { rate, .. } => rate.index(),
            RateDescriptor::Ht { mcs, .. } | RateDescriptor::Vht { mcs, .. } => mcs,
        }
    }

    /// Zero-based spatial stream index (0 for legacy rates).
    #[must_use]
    pub const fn nss(self) -> u8 {
        match self {
            RateDescriptor::Legacy { .. } => 0,
            RateDescriptor::Ht { nss, .. } | RateDescriptor::Vht { nss, .. } => nss,
        }
    }

    /// Bandwidth class (20 MHz for legacy rates).
    #[must_use]
    pub const fn bandwidth(self) -> Bandwidth {
        match self {
            RateDescriptor::Legacy { .. } => Bandwidth::Mhz20,
            RateDescriptor::Ht { bandwidth, .. } | RateDescriptor::Vht { bandwidth, .. } => {
                bandwidth
            }
        }
    }

    /// Guard interval (long for legacy rates).
    #[must_use]
    pub const fn guard(self) -> GuardInterval {
        match self {
            RateDescriptor::Legacy { .. } => GuardInterval::Long,
            RateDescriptor::Ht { guard, .. } | RateDescriptor::Vht { guard, .. } => guard,
        }
    }

    /// Preamble type, for legacy rates only.
    #[must_use]
    pub const fn preamble(self) -> Option<Preamble> {
        match self {
            RateDescriptor::Legacy { preamble, .. } => Some(preamble),
            _ => None,
        }
    }

    /// Same rate with the given guard interval; legacy rates are unchanged.
    #[must_use]
    pub const fn with_guard(self, guard: GuardInterval) -> Self {
        match self {
            RateDescriptor::Legacy { .. } => self,
            RateDescriptor::Ht {
                mcs,
                nss,
                bandwidth,
                ..
            } => RateDescriptor::ht(mcs, nss, bandwidth, guard),
            RateDescriptor::Vht {
                mcs,
                nss,
                bandwidth,
                ..
            } => RateDescriptor::vht(mcs, nss, bandwidth, guard),
        }
    }

    /// Same format with another MCS (or legacy rate index), clamped.
    #[must_use]
    pub const fn with_mcs(self, new_mcs: u8) -> Self {
        match self {
            RateDescriptor::Legacy { rate, preamble } => match LegacyRate::from_index(new_mcs) {
                Some(next) => RateDescriptor::legacy(next, preamble),
                None => RateDescriptor::legacy(rate, preamble),
            },
            RateDescriptor::Ht {
                nss,
                bandwidth,
                guard,
                ..
            } => RateDescriptor::ht(new_mcs, nss, bandwidth, guard),
            RateDescriptor::Vht {
                nss,
                bandwidth,
                guard,
                ..
            } => RateDescriptor::vht(new_mcs, nss, bandwidth, guard),
        }
    }

    /// Returns `true` when the value is what the normalising constructors
    /// would have produced.
    #[must_use]
    pub fn is_well_formed(self) -> bool {
        match self {
            RateDescriptor::Legacy { rate, preamble } => {
                RateDescriptor::legacy(rate, preamble) == self
            }
            RateDescriptor::Ht {
                mcs,
                nss,
                bandwidth,
                ..
            } => mcs <= HT_MCS_MAX && nss <= HT_NSS_MAX && bandwidth <= Bandwidth::Mhz40,
            RateDescriptor::Vht {
                mcs,
                nss,
                bandwidth,
                ..
            } => mcs <= VHT_MCS_MAX && nss <= VHT_NSS_MAX && !vht_rate_absent(mcs, nss, bandwidth),
        }
    }

    /// Key into the reference duration tables.
    #[must_use]
    pub const fn duration_key(self) -> DurationKey {
        match self {
            RateDescriptor::Legacy { rate, preamble } => {
                if rate.is_cck() {
                    DurationKey::Cck {
                        index: (rate.index() << 1) | preamble.is_long() as u8,
                    }
                } else {
                    DurationKey::Ofdm {
                        index: rate.index() - LegacyRate::Mbps6.index(),
                    }
                }
            }
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
            } => DurationKey::Mimo {
                index: (mcs << 3) | (bandwidth.index() << 1) | guard.is_short() as u8,
                streams: nss + 1,
            },
        }
    }

    /// Encodes the descriptor into its packed 16-bit policy-table form.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        let format = (self.format().to_raw() as u16) << FORMAT_OFT;
        match self {
            RateDescriptor::Legacy { rate, preamble } => {
                let pre = if preamble.is_long() { PREAMBLE_BIT } else { 0 };
                format | pre | rate.index() as u16
            }
            RateDescriptor::Ht {
                mcs,
                nss,
                bandwidth,
                guard,
            } => {
                format
                    | shared_bits(bandwidth, guard)
                    | ((nss as u16) << HT_NSS_OFT)
                    | (mcs as u16 & HT_MCS_MASK)
            }
            RateDescriptor::Vht {
                mcs,
                nss,
                bandwidth,
                guard,
            } => {
                format
                    | shared_bits(bandwidth, guard)
                    | ((nss as u16) << VHT_NSS_OFT)
                    | (mcs as u16 & VHT_MCS_MASK)
            }
        }
    }

    /// Decodes a packed 16-bit descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the value uses reserved bits, a format this
    /// engine never emits, or a rate that does not exist.
    pub fn from_raw(raw: u16) -> Result<Self, DecodeError> {
        if raw & RESERVED_MASK != 0 {
            return Err(DecodeError::ReservedBits);
        }

        let format = ((raw & FORMAT_MASK) >> FORMAT_OFT) as u8;
        let bw_index = ((raw & BW_MASK) >> BW_OFT) as u8;
        let bandwidth = match Bandwidth::from_index(bw_index) {
            Some(bandwidth) => bandwidth,
            None => return Err(DecodeError::ReservedBits),
        };
        let guard = GuardInterval::from_short(raw & SHORT_GI_BIT != 0);
        let long_preamble = raw & PREAMBLE_BIT != 0;

        match format {
            FormatClass::NON_HT_CODE => {
                if bw_index != 0 || guard.is_short() {
                    return Err(DecodeError::LegacyFields);
                }
                let index = (raw & MCS_MASK) as u8;
                let rate = LegacyRate::from_index(index).ok_or(DecodeError::LegacyIndex(index))?;
                Ok(RateDescriptor::legacy(rate, Preamble::from_long(long_preamble)))
            }
            FormatClass::HT_MF_CODE => {
                if long_preamble || raw & MCS_MASK & !(HT_MCS_MASK | HT_NSS_MASK) != 0 {
                    return Err(DecodeError::ReservedBits);
                }
                if bandwidth > Bandwidth::Mhz40 {
                    return Err(DecodeError::HtBandwidth);
                }
                let mcs = (raw & HT_MCS_MASK) as u8;
                let nss = ((raw & HT_NSS_MASK) >> HT_NSS_OFT) as u8;
                Ok(RateDescriptor::ht(mcs, nss, bandwidth, guard))
            }
            FormatClass::VHT_CODE => {
                if long_preamble {
                    return Err(DecodeError::ReservedBits);
                }
                let mcs = (raw & VHT_MCS_MASK) as u8;
                if mcs > VHT_MCS_MAX {
                    return Err(DecodeError::VhtMcs(mcs));
                }
                let nss = ((raw & VHT_NSS_MASK) >> VHT_NSS_OFT) as u8;
                if vht_rate_absent(mcs, nss, bandwidth) {
                    return Err(DecodeError::VhtAbsent);
                }
                Ok(RateDescriptor::Vht {
                    mcs,
                    nss,
                    bandwidth,
                    guard,
                })
            }
            FormatClass::NON_HT_DUP_CODE | FormatClass::HT_GF_CODE => {
                Err(DecodeError::UnsupportedFormat(format))
            }
            other => Err(DecodeError::UnsupportedFormat(other)),
        }
    }
}

const fn shared_bits(bandwidth: Bandwidth, guard: GuardInterval) -> u16 {
    let gi = if guard.is_short() { SHORT_GI_BIT } else { 0 };
    ((bandwidth.index() as u16) << BW_OFT) | gi
}

impl fmt::Display for RateDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RateDescriptor::Legacy { rate, preamble } => {
                if rate.is_cck() {
                    let pre = if preamble.is_long() { "long" } else { "short" };
                    write!(f, "legacy {rate} {pre}")
                } else {
                    write!(f, "legacy {rate}")
                }
            }
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
                let gi = if guard.is_short() { "sgi" } else { "lgi" };
                write!(
                    f,
                    "{} mcs{} {}ss {}MHz {}",
                    self.format().label(),
                    mcs,
                    nss + 1,
                    bandwidth.mhz(),
                    gi
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_constructor_normalises_preamble() {
        assert_eq!(
            RateDescriptor::legacy(LegacyRate::Mbps1, Preamble::Short).preamble(),
            Some(Preamble::Long)
        );
        assert_eq!(
            RateDescriptor::legacy(LegacyRate::Mbps24, Preamble::Long).preamble(),
            Some(Preamble::Short)
        );
        assert_eq!(
            RateDescriptor::legacy(LegacyRate::Mbps11, Preamble::Short).preamble(),
            Some(Preamble::Short)
        );
    }

    #[test]
    fn packs_fields_at_expected_offsets() {
        let legacy = RateDescriptor::legacy(LegacyRate::Mbps2, Preamble::Long);
        assert_eq!(legacy.to_raw(), PREAMBLE_BIT | 1);

        let ht = RateDescriptor::ht(5, 1, Bandwidth::Mhz40, GuardInterval::Short);
        assert_eq!(ht.to_raw(), (2 << 11) | SHORT_GI_BIT | (1 << 7) | (1 << 3) | 5);

        let vht = RateDescriptor::vht(8, 2, Bandwidth::Mhz80, GuardInterval::Long);
        assert_eq!(vht.to_raw(), (4 << 11) | (2 << 7) | (2 << 4) | 8);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let samples = [
            RateDescriptor::legacy(LegacyRate::Mbps1, Preamble::Long),
            RateDescriptor::legacy(LegacyRate::Mbps5_5, Preamble::Short),
            RateDescriptor::legacy(LegacyRate::Mbps54, Preamble::Short),
            RateDescriptor::ht(0, 0, Bandwidth::Mhz20, GuardInterval::Long),
            RateDescriptor::ht(7, 3, Bandwidth::Mhz40, GuardInterval::Short),
            RateDescriptor::vht(9, 2, Bandwidth::Mhz20, GuardInterval::Short),
            RateDescriptor::vht(9, 7, Bandwidth::Mhz160, GuardInterval::Long),
        ];

        for descriptor in samples {
            assert_eq!(RateDescriptor::from_raw(descriptor.to_raw()), Ok(descriptor));
        }
    }

    #[test]
    fn every_decodable_word_round_trips() {
        let mut canonical = 0;
        for raw in 0..=u16::MAX {
            let Ok(descriptor) = RateDescriptor::from_raw(raw) else {
                continue;
            };
            assert!(descriptor.is_well_formed(), "{raw:#06x} -> {descriptor}");
            assert_eq!(
                RateDescriptor::from_raw(descriptor.to_raw()),
                Ok(descriptor),
                "{raw:#06x}"
            );
            if descriptor.to_raw() == raw {
                canonical += 1;
            }
        }

        let mut constructible = 0;
        for rate in LegacyRate::ALL {
            for preamble in [Preamble::Long, Preamble::Short] {
                let descriptor = RateDescriptor::legacy(rate, preamble);
                if descriptor.preamble() == Some(preamble) {
                    constructible += 1;
                    assert_eq!(RateDescriptor::from_raw(descriptor.to_raw()), Ok(descriptor));
                }
            }
        }
        for guard in [GuardInterval::Long, GuardInterval::Short] {
            for bandwidth in (0..4).filter_map(Bandwidth::from_index) {
                for nss in 0..=VHT_NSS_MAX {
                    for mcs in 0..=VHT_MCS_MAX {
                        if mcs <= HT_MCS_MAX && nss <= HT_NSS_MAX && bandwidth <= Bandwidth::Mhz40 {
                            let ht = RateDescriptor::ht(mcs, nss, bandwidth, guard);
                            constructible += 1;
                            assert_eq!(RateDescriptor::from_raw(ht.to_raw()), Ok(ht));
                        }
                        if vht_rate_absent(mcs, nss, bandwidth) {
                            continue;
                        }
                        let vht = RateDescriptor::Vht {
                            mcs,
                            nss,
                            bandwidth,
                            guard,
                        };
                        constructible += 1;
                        assert_eq!(RateDescriptor::from_raw(vht.to_raw()), Ok(vht));
                    }
                }
            }
        }
        assert_eq!(canonical, constructible);
    }

    #[test]
    fn rejects_malformed_words() {
        assert_eq!(RateDescriptor::from_raw(0x8000), Err(DecodeError::ReservedBits));
        assert_eq!(RateDescriptor::from_raw(12), Err(DecodeError::LegacyIndex(12)));
        assert_eq!(
            RateDescriptor::from_raw(1 << 11),
            Err(DecodeError::UnsupportedFormat(1))
        );
        assert_eq!(
            RateDescriptor::from_raw((2 << 11) | (2 << 7)),
            Err(DecodeError::HtBandwidth)
        );
        assert_eq!(RateDescriptor::from_raw((4 << 11) | 10), Err(DecodeError::VhtMcs(10)));
        assert_eq!(RateDescriptor::from_raw((4 << 11) | 9), Err(DecodeError::VhtAbsent));
        assert_eq!(
            RateDescriptor::from_raw(SHORT_GI_BIT | 4),
            Err(DecodeError::LegacyFields)
        );
    }

    #[test]
    fn vht_constructor_clamps_absent_rates() {
        assert_eq!(
            RateDescriptor::vht(9, 0, Bandwidth::Mhz20, GuardInterval::Long).mcs(),
            8
        );
        assert_eq!(
            RateDescriptor::vht(6, 3, Bandwidth::Mhz80, GuardInterval::Long).nss(),
            2
        );
        assert_eq!(
            RateDescriptor::vht(9, 5, Bandwidth::Mhz80, GuardInterval::Long).nss(),
            4
        );
        assert_eq!(
            RateDescriptor::vht(9, 2, Bandwidth::Mhz160, GuardInterval::Long).nss(),
            1
        );
        assert!(RateDescriptor::vht(9, 2, Bandwidth::Mhz20, GuardInterval::Long).is_well_formed());
    }

    #[test]
    fn duration_keys_follow_format() {
        let cck = RateDescriptor::legacy(LegacyRate::Mbps11, Preamble::Long);
        assert_eq!(cck.duration_key(), DurationKey::Cck { index: 7 });

        let ofdm = RateDescriptor::legacy(LegacyRate::Mbps54, Preamble::Short);
        assert_eq!(ofdm.duration_key(), DurationKey::Ofdm { index: 7 });

        let ht = RateDescriptor::ht(3, 1, Bandwidth::Mhz40, GuardInterval::Short);
        assert_eq!(
            ht.duration_key(),
            DurationKey::Mimo {
                index: (3 << 3) | (1 << 1) | 1,
                streams: 2,
            }
        );
    }

    #[test]
    fn supported_rate_octets_translate() {
        assert_eq!(LegacyRate::from_supported_rate(0x82), Some(LegacyRate::Mbps1));
        assert_eq!(LegacyRate::from_supported_rate(0x16), Some(LegacyRate::Mbps11));
        assert_eq!(LegacyRate::from_supported_rate(108), Some(LegacyRate::Mbps54));
        assert_eq!(LegacyRate::from_supported_rate(0x7F), None);
    }
}
