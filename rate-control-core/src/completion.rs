//! Transmit-completion inputs and their normalisation.
//!
//! The confirmation path reports either a single frame status or an
//! aggregate with its block-ack. Both are reduced to a [`Completion`] of
//! attempts and failures before they reach a station.

/// Sequence numbers are 12 bits wide.
pub const SEQUENCE_MODULO: u16 = 4096;

const SEQUENCE_MASK: u16 = SEQUENCE_MODULO - 1;
const SEQUENCE_CONTROL_OFT: u16 = 4;
const BITMAP_WORDS: usize = 4;
const BITS_PER_WORD: u16 = 16;

/// Status of one transmitted (non-aggregated) frame.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TxStatus {
    /// Retransmissions after the first attempt.
    pub retry_count: u8,
    pub retry_limit_reached: bool,
    pub lifetime_expired: bool,
    pub acknowledged: bool,
}

/// Outcome of one enclosed frame according to a block-ack.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AckStatus {
    Acknowledged,
    ReceivedNotAcknowledged,
}

impl AckStatus {
    #[must_use]
    pub const fn is_acknowledged(self) -> bool {
        matches!(self, Self::Acknowledged)
    }
}

/// Compressed block-ack payload: start sequence control and a 64-bit bitmap
/// split into four words, least significant first.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockAck {
    pub start_sequence_control: u16,
    pub bitmap: [u16; BITMAP_WORDS],
}

impl BlockAck {
    /// Starting sequence number carried in the sequence control field.
    #[must_use]
    pub const fn start_sequence(&self) -> u16 {
        (self.start_sequence_control >> SEQUENCE_CONTROL_OFT) & SEQUENCE_MASK
    }

    /// Looks up `sequence` in the bitmap. Positions outside the window are
    /// reported as received but not acknowledged.
    #[must_use]
    pub fn extract(&self, sequence: u16) -> AckStatus {
        let position = sequence.wrapping_sub(self.start_sequence()) & SEQUENCE_MASK;
        let word = usize::from(position / BITS_PER_WORD);
        let Some(bits) = self.bitmap.get(word) else {
            return AckStatus::ReceivedNotAcknowledged;
        };

        if bits & (1 << (position % BITS_PER_WORD)) == 0 {
            AckStatus::ReceivedNotAcknowledged
        } else {
            AckStatus::Acknowledged
        }
    }
}

/// Completion report of one aggregate.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AggregateReport {
    pub access_category: u8,
    /// Sequence number of the first enclosed frame.
    pub start_sequence: u16,
    pub frame_count: u8,
    /// `None` when no block-ack came back.
    pub block_ack: Option<BlockAck>,
}

impl AggregateReport {
    /// Number of enclosed frames the block-ack acknowledges.
    #[must_use]
    pub fn acknowledged_frames(&self) -> u32 {
        let Some(block_ack) = self.block_ack else {
            return 0;
        };

        (0..u16::from(self.frame_count))
            .map(|offset| (self.start_sequence.wrapping_add(offset)) & SEQUENCE_MASK)
            .filter(|sequence| block_ack.extract(*sequence).is_acknowledged())
            .fold(0, |count, _| count + 1)
    }
}

/// Attempts and failures attributed to a station's retry chain.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Completion {
    /// A single frame walked the retry chain front to back.
    Single { attempts: u32, failures: u32 },
    /// An aggregate sent entirely at the active software retry step.
    Aggregate {
        attempts: u32,
        failures: u32,
        retry_required: bool,
    },
}

impl Completion {
    /// Normalises a single-frame status.
    #[must_use]
    pub fn from_status(status: &TxStatus) -> Self {
        let retries = u32::from(status.retry_count);
        Self::Single {
            attempts: retries + 1,
            failures: retries + u32::from(!status.acknowledged),
        }
    }

    /// Normalises an aggregate report through its block-ack.
    #[must_use]
    pub fn from_aggregate(report: &AggregateReport) -> Self {
        let attempts = u32::from(report.frame_count);
        let failures = attempts - report.acknowledged_frames().min(attempts);
        Self::Aggregate {
            attempts,
            failures,
            retry_required: failures > 0,
        }
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Single { attempts, .. } | Self::Aggregate { attempts, .. } => *attempts,
        }
    }

    #[must_use]
    pub const fn failures(&self) -> u32 {
        match self {
            Self::Single { failures, .. } | Self::Aggregate { failures, .. } => *failures,
        }
    }

    #[must_use]
    pub const fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_counts_every_attempt() {
        let delivered = TxStatus {
            retry_count: 2,
            acknowledged: true,
            ..TxStatus::default()
        };
        assert_eq!(
            Completion::from_status(&delivered),
            Completion::Single {
                attempts: 3,
                failures: 2
            }
        );

        let lost = TxStatus {
            retry_count: 5,
            retry_limit_reached: true,
            ..TxStatus::default()
        };
        assert_eq!(
            Completion::from_status(&lost),
            Completion::Single {
                attempts: 6,
                failures: 6
            }
        );
    }

    #[test]
    fn extraction_reads_the_matching_bit() {
        let block_ack = BlockAck {
            start_sequence_control: 100 << 4,
            bitmap: [0b101, 0, 0, 0x8000],
        };
        assert_eq!(block_ack.start_sequence(), 100);
        assert!(block_ack.extract(100).is_acknowledged());
        assert!(!block_ack.extract(101).is_acknowledged());
        assert!(block_ack.extract(102).is_acknowledged());
        assert!(block_ack.extract(163).is_acknowledged());
    }

    #[test]
    fn extraction_outside_the_window_is_not_acknowledged() {
        let block_ack = BlockAck {
            start_sequence_control: 4090 << 4,
            bitmap: [u16::MAX; 4],
        };
        // Wraps around the sequence space.
        assert!(block_ack.extract(5).is_acknowledged());
        assert!(block_ack.extract(4090 + 63 - 4096).is_acknowledged());
        assert_eq!(block_ack.extract(4090 + 64 - 4096), AckStatus::ReceivedNotAcknowledged);
        // Behind the window.
        assert_eq!(block_ack.extract(4089), AckStatus::ReceivedNotAcknowledged);
        for sequence in 0..SEQUENCE_MODULO {
            let _ = block_ack.extract(sequence);
        }
    }

    #[test]
    fn aggregate_failures_follow_the_bitmap() {
        let report = AggregateReport {
            access_category: 1,
            start_sequence: 10,
            frame_count: 8,
            block_ack: Some(BlockAck {
                start_sequence_control: 10 << 4,
                bitmap: [0b0111_1111, 0, 0, 0],
            }),
        };
        assert_eq!(
            Completion::from_aggregate(&report),
            Completion::Aggregate {
                attempts: 8,
                failures: 1,
                retry_required: true
            }
        );

        let unanswered = AggregateReport {
            block_ack: None,
            ..report
        };
        assert_eq!(Completion::from_aggregate(&unanswered).failures(), 8);
    }
}
