//! Trial (exploration) scheduling.
//!
//! Every so often a random table entry is spliced into the retry chain so its
//! statistics stay current. The entry either replaces step 0 (direct) or
//! step 1 (indirect) for one transmission and is reverted afterwards.

use rand_core::RngCore;

use crate::capability::CapabilityProfile;
use crate::chain::{RetryChain, RetryStep};
use crate::descriptor::FormatClass;
use crate::estimator::{self, AggregateLength, Probability};
use crate::sample::SampleTable;
use crate::tuning::{
    AGGREGATE_TRIAL_BASE, INDIRECT_RETRY_LIMIT, INITIAL_TRIAL_WAIT, LEGACY_SKIP_LIMIT,
    LEGACY_TRIAL_PERIOD, OBSERVED_SKIP_LIMIT, SLOW_SAMPLE_ALLOWANCE, SLOW_SAMPLE_CAP,
};

/// Trial life cycle.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum TrialStatus {
    /// Counting completions down to the next trial.
    #[default]
    Idle,
    /// Countdown exhausted; a trial is attempted at the next evaluation.
    Check,
    /// The chain carries a trial entry waiting to be published.
    UpdateChain,
    /// The trial went out; the chain must be restored.
    Revert,
}

impl TrialStatus {
    const IDLE_CODE: u8 = 0;
    const CHECK_CODE: u8 = 1;
    const UPDATE_CHAIN_CODE: u8 = 2;
    const REVERT_CODE: u8 = 3;

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            Self::Idle => Self::IDLE_CODE,
            Self::Check => Self::CHECK_CODE,
            Self::UpdateChain => Self::UPDATE_CHAIN_CODE,
            Self::Revert => Self::REVERT_CODE,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Check => "check",
            Self::UpdateChain => "update",
            Self::Revert => "revert",
        }
    }
}

/// Inputs a trial decision reads besides the chain itself.
#[derive(Copy, Clone, Debug)]
pub struct TrialContext<'a> {
    pub table: &'a SampleTable,
    pub profile: &'a CapabilityProfile,
    pub aggregate: &'a AggregateLength,
    /// The next frame may be part of an aggregate.
    pub aggregated: bool,
}

/// Per-station trial bookkeeping.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TrialState {
    status: TrialStatus,
    countdown: u16,
    saved: Option<RetryStep>,
    direct: bool,
    slow_samples: u8,
}

impl Default for TrialState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrialState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: TrialStatus::Idle,
            countdown: INITIAL_TRIAL_WAIT,
            saved: None,
            direct: false,
            slow_samples: 0,
        }
    }

    #[must_use]
    pub const fn status(&self) -> TrialStatus {
        self.status
    }

    #[must_use]
    pub const fn countdown(&self) -> u16 {
        self.countdown
    }

    /// Step 1 as it was before the trial, if one is in flight.
    #[must_use]
    pub const fn saved_step(&self) -> Option<RetryStep> {
        self.saved
    }

    /// The trial occupies step 0 rather than step 1.
    #[must_use]
    pub const fn is_direct(&self) -> bool {
        self.direct
    }

    #[must_use]
    pub const fn slow_samples(&self) -> u8 {
        self.slow_samples
    }

    /// Forgets the slow-candidate allowance at the start of a period.
    pub fn reset_slow_samples(&mut self) {
        self.slow_samples = 0;
    }

    /// Drops back to waiting without touching the countdown.
    pub fn wait(&mut self) {
        self.status = TrialStatus::Idle;
    }

    /// Advances the state machine by one transmit completion.
    ///
    /// `policy_pending` is `true` while the chain carrying the trial has not
    /// been picked up by the transmit path yet.
    pub fn on_completion(&mut self, policy_pending: bool) {
        match self.status {
            TrialStatus::Idle => {
                if self.countdown > 0 {
                    self.countdown -= 1;
                } else {
                    self.status = TrialStatus::Check;
                }
            }
            TrialStatus::UpdateChain if !policy_pending => self.status = TrialStatus::Revert,
            _ => {}
        }
    }

    fn rearm(&mut self, context: &TrialContext<'_>, chain: &RetryChain) {
        self.countdown = if context.profile.format() == FormatClass::Legacy {
            let best = context
                .table
                .get(chain.step(0).index)
                .map_or(Probability::ZERO, |sample| sample.probability);
            if best < Probability::TEN_PERCENT || best > Probability::NINETY_FIVE_PERCENT {
                LEGACY_TRIAL_PERIOD / 2
            } else {
                LEGACY_TRIAL_PERIOD
            }
        } else {
            let frames = u16::try_from(context.aggregate.whole_frames()).unwrap_or(u16::MAX);
            AGGREGATE_TRIAL_BASE.saturating_add(frames.saturating_mul(2))
        };
    }

    /// Picks a random entry and splices it into `chain`.
    ///
    /// Returns `true` when the chain now carries a trial. On rejection the
    /// state returns to [`TrialStatus::Idle`] with a fresh countdown.
    pub fn try_start<R: RngCore>(
        &mut self,
        context: &TrialContext<'_>,
        chain: &mut RetryChain,
        rng: &mut R,
    ) -> bool {
        self.rearm(context, chain);

        match self.pick(context, chain, rng) {
            Some((trial, direct)) => {
                self.saved = Some(chain.step(1));
                self.direct = direct;
                if direct {
                    chain.set_step(1, chain.step(0));
                    chain.set_step(0, trial);
                } else {
                    chain.set_step(1, trial);
                }
                self.status = TrialStatus::UpdateChain;
                true
            }
            None => {
                self.status = TrialStatus::Idle;
                false
            }
        }
    }

    fn pick<R: RngCore>(
        &mut self,
        context: &TrialContext<'_>,
        chain: &RetryChain,
        rng: &mut R,
    ) -> Option<(RetryStep, bool)> {
        let table = context.table;
        let len = u32::try_from(table.len()).ok().filter(|len| *len > 0)?;
        let index = usize::try_from(rng.next_u32() % len).ok()?;
        if chain.is_active(index) {
            return None;
        }

        let candidate = table.get(index)?;
        if candidate.probability > Probability::NINETY_FIVE_PERCENT {
            return None;
        }
        if context.aggregated && candidate.descriptor.format() == FormatClass::Legacy {
            return None;
        }

        let duration_of = |position: usize| {
            table
                .get(chain.step(position).index)
                .map_or(0, |sample| sample.descriptor.duration_ns())
        };
        let sample_duration = candidate.descriptor.duration_ns();

        if context.profile.format() == FormatClass::Legacy {
            let direct =
                !(sample_duration > duration_of(0) && candidate.skipped < LEGACY_SKIP_LIMIT);
            return Some((RetryStep::new(index, 0), direct));
        }

        // Slower candidates are only sampled once they have been starved
        // long enough, and only a couple of times per period.
        let max_skipped = if candidate.observed {
            OBSERVED_SKIP_LIMIT
        } else {
            u8::try_from(context.aggregate.whole_frames()).unwrap_or(u8::MAX)
        };
        let best_streams = table
            .get(chain.step(0).index)
            .map_or(0, |sample| sample.descriptor.nss());
        let more_streams = best_streams
            .checked_sub(1)
            .is_some_and(|fewer| fewer < candidate.descriptor.nss());
        if sample_duration >= duration_of(1) && (more_streams || sample_duration >= duration_of(2))
        {
            if candidate.skipped < max_skipped {
                return None;
            }
            self.slow_samples = self.slow_samples.saturating_add(1);
            if self.slow_samples > SLOW_SAMPLE_ALLOWANCE {
                self.slow_samples = self.slow_samples.min(SLOW_SAMPLE_CAP);
                return None;
            }
        }

        let throughput =
            estimator::throughput(candidate.descriptor, candidate.probability, context.aggregate);
        let direct = !(candidate.retry_count() < INDIRECT_RETRY_LIMIT
            && candidate.skipped < max_skipped);
        Some((RetryStep::new(index, throughput), direct))
    }

    /// Restores the chain as it was before the trial.
    pub fn revert(&mut self, chain: &mut RetryChain) {
        if let Some(saved) = self.saved.take() {
            if self.direct {
                chain.set_step(0, chain.step(1));
            }
            chain.set_step(1, saved);
        }
        self.direct = false;
        self.status = TrialStatus::Idle;
    }

    /// Forgets any trial in flight without touching the chain.
    pub fn abandon(&mut self) {
        self.saved = None;
        self.direct = false;
        self.status = TrialStatus::Idle;
    }
}
