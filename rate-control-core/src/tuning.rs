//! Algorithm constants.
//!
//! Probabilities are 16.16 fixed point unless noted; durations are in
//! microseconds.

use core::time::Duration;

/// Maximum number of entries in a station's sample table.
pub const MAX_SAMPLES: usize = 10;

/// Number of steps in a retry chain (and entries in a policy table).
pub const RETRY_STEPS: usize = 4;

/// Hardware attempts made at each retry-chain step before moving on.
pub const MAX_RETRIES_PER_STEP: u32 = 2;

/// Fixed-point shift used for probabilities and average aggregate lengths.
pub const FRACTION_SHIFT: u32 = 16;

/// EWMA weight given to the previous value, out of [`EWMA_DIVISOR`].
pub const EWMA_WEIGHT: u32 = 96;

/// EWMA divisor.
pub const EWMA_DIVISOR: u32 = 128;

/// Interval between two full statistics evaluations.
pub const EVALUATION_PERIOD: Duration = Duration::from_millis(100);

/// Completions to wait before the first trial after association.
pub const INITIAL_TRIAL_WAIT: u16 = 5;

/// Trial period for legacy stations; halved when the best rate's
/// probability is outside 10%..=95%.
pub const LEGACY_TRIAL_PERIOD: u16 = 10;

/// Trial period base for HT/VHT stations, extended by twice the average
/// aggregate length.
pub const AGGREGATE_TRIAL_BASE: u16 = 16;

/// Skip count under which a slower legacy candidate is sampled indirectly.
pub const LEGACY_SKIP_LIMIT: u8 = 20;

/// Skip count a slow HT/VHT candidate with known statistics must reach
/// before it may be sampled.
pub const OBSERVED_SKIP_LIMIT: u8 = 32;

/// Slow candidates accepted per evaluation period.
pub const SLOW_SAMPLE_ALLOWANCE: u8 = 2;

/// Saturation value of the slow-candidate counter.
pub const SLOW_SAMPLE_CAP: u8 = 15;

/// Retry requests under which an HT/VHT candidate is sampled indirectly.
pub const INDIRECT_RETRY_LIMIT: u8 = 10;

/// Skip count above which a table entry becomes a replacement candidate.
pub const REPLACEMENT_SKIP_THRESHOLD: u8 = 10;

/// Number of exploration candidates generated per replacement pass.
pub const EXPLORATION_CANDIDATES: usize = MAX_SAMPLES - RETRY_STEPS;

/// Highest value of the software retry step cursor.
pub const MAX_SW_RETRY_STEP: u8 = 2;

/// Per-frame overhead (ACK, IFS, backoff) added to non-CCK durations, in ns.
pub const FRAME_OVERHEAD_NS: u32 = 218_000;

/// Bytes budgeted per A-MSDU sub-frame.
pub const AMSDU_SUBFRAME_LEN: u16 = 1550;

/// Random draws attempted per slot when seeding before falling back to a
/// deterministic sweep of the capability.
pub const SEED_RANDOM_ATTEMPTS: u16 = 64;

/// Retry limit written into every policy-table entry.
pub const POLICY_RETRY_LIMIT: u8 = 2;

/// Retry limit for broadcast/multicast policy entries.
pub const BROADCAST_RETRY_LIMIT: u8 = 1;
