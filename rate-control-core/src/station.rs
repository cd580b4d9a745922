//! Per-station rate-control state.
//!
//! [`StationRateState`] ties the sample table, retry chain and trial state of
//! one peer together. Two paths drive it: [`evaluate`](StationRateState::evaluate)
//! before transmit opportunities and
//! [`on_completion`](StationRateState::on_completion) from the transmit
//! confirmation handler. Updates of the chain, the trial state, the
//! aggregation flag and the software retry step happen under a
//! [`CriticalSectionGuard`].

use core::fmt;

use heapless::Vec;
use rand_core::SeedableRng;
use rand_wyrand::WyRand;

use crate::capability::{CapabilityProfile, FixedRateError};
use crate::chain::{RetryChain, RetryStep};
use crate::completion::Completion;
use crate::descriptor::{Bandwidth, FormatClass, Preamble, RateDescriptor};
use crate::estimator::{AggregateLength, Probability};
use crate::guard::CriticalSectionGuard;
use crate::policy::{PolicyEntry, PolicySet};
use crate::sample::{RETRY_REQUESTED, RateSample, SampleTable, Throughputs};
use crate::telemetry::{RateEvent, RateEventKind, RateEventPayload, RateInstant, StationEvents};
use crate::trial::{TrialContext, TrialState, TrialStatus};
use crate::tuning::{
    AMSDU_SUBFRAME_LEN, EVALUATION_PERIOD, MAX_RETRIES_PER_STEP, MAX_SAMPLES, MAX_SW_RETRY_STEP,
    POLICY_RETRY_LIMIT, RETRY_STEPS,
};

/// Broken internal invariant, detected by [`StationRateState::check_invariants`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InvariantViolation {
    EmptyTable,
    /// Entry 0 is not the station's lowest descriptor.
    LowestMoved,
    /// A retry step points outside the table or step 3 left entry 0.
    StepOutOfRange,
    RetryStepOutOfRange(u8),
    DuplicateDescriptor,
    SuccessesExceedAttempts(usize),
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::EmptyTable => f.write_str("sample table is empty"),
            InvariantViolation::LowestMoved => f.write_str("entry 0 is not the lowest rate"),
            InvariantViolation::StepOutOfRange => f.write_str("retry step outside sample table"),
            InvariantViolation::RetryStepOutOfRange(step) => {
                write!(f, "software retry step {step} out of range")
            }
            InvariantViolation::DuplicateDescriptor => f.write_str("duplicate descriptor"),
            InvariantViolation::SuccessesExceedAttempts(index) => {
                write!(f, "entry {index} has more successes than attempts")
            }
        }
    }
}

/// Result of one [`StationRateState::evaluate`] call.
#[derive(Clone, Debug, Default)]
pub struct Evaluation {
    /// Retry chain step the next aggregate starts at.
    pub retry_step: u8,
    /// A new policy table must be published.
    pub policy_changed: bool,
    pub events: StationEvents,
}

/// Snapshot of a station for diagnostics.
#[derive(Clone, Debug)]
pub struct StationStats {
    pub format: FormatClass,
    pub table_len: usize,
    pub aggregate_frames: u32,
    pub aggregate_packets: u32,
    /// 16.16 fixed-point average MPDUs per transmission.
    pub average_aggregate: u32,
    pub retry_step: u8,
    pub trial_countdown: u16,
    pub trial_status: TrialStatus,
    pub chain: [RetryStep; RETRY_STEPS],
    pub samples: Vec<RateSample, MAX_SAMPLES>,
    pub aggregation_allowed: bool,
    pub amsdu_len: u16,
    pub fixed_rate: Option<RateDescriptor>,
}

/// Rate-control state of one associated station.
pub struct StationRateState<I> {
    profile: CapabilityProfile,
    table: SampleTable,
    chain: RetryChain,
    trial: TrialState,
    aggregate: AggregateLength,
    retry_step: u8,
    retry_requested: bool,
    aggregated_tx: bool,
    aggregation_allowed: bool,
    amsdu_len: u16,
    fixed_rate: Option<RateDescriptor>,
    reseed_deferred: bool,
    policy_pending: bool,
    last_evaluation: I,
    rng: WyRand,
}

impl<I> StationRateState<I>
where
    I: RateInstant,
{
    /// Sets up a newly associated station: seeds the table, builds the first
    /// chain and marks the policy for publication.
    #[must_use]
    pub fn new(profile: CapabilityProfile, seed: u64, now: I) -> Self {
        let mut rng = WyRand::seed_from_u64(seed);
        let table = SampleTable::seed(&profile, &mut rng);
        let chain = RetryChain::initial(table.len());

        let mut state = Self {
            profile,
            table,
            chain,
            trial: TrialState::new(),
            aggregate: AggregateLength::new(),
            retry_step: 0,
            retry_requested: false,
            aggregated_tx: false,
            aggregation_allowed: false,
            amsdu_len: 0,
            fixed_rate: None,
            reseed_deferred: false,
            policy_pending: true,
            last_evaluation: now,
            rng,
        };
        state.update_statistics(true);
        state.refresh_amsdu();
        state.refresh_aggregation();
        state
    }

    #[must_use]
    pub const fn profile(&self) -> &CapabilityProfile {
        &self.profile
    }

    #[must_use]
    pub const fn table(&self) -> &SampleTable {
        &self.table
    }

    #[must_use]
    pub const fn chain(&self) -> &RetryChain {
        &self.chain
    }

    #[must_use]
    pub const fn trial(&self) -> &TrialState {
        &self.trial
    }

    #[must_use]
    pub const fn aggregate(&self) -> &AggregateLength {
        &self.aggregate
    }

    /// Active software retry step.
    #[must_use]
    pub const fn retry_step(&self) -> u8 {
        self.retry_step
    }

    #[must_use]
    pub const fn aggregation_allowed(&self) -> bool {
        self.aggregation_allowed
    }

    /// Current A-MSDU length limit in bytes; 0 disables A-MSDU.
    #[must_use]
    pub const fn max_amsdu_len(&self) -> u16 {
        self.amsdu_len
    }

    #[must_use]
    pub const fn fixed_rate(&self) -> Option<RateDescriptor> {
        self.fixed_rate
    }

    /// A chain change has not been picked up by the transmit path yet.
    #[must_use]
    pub const fn policy_pending(&self) -> bool {
        self.policy_pending
    }

    fn descriptor_at(&self, position: usize) -> Option<RateDescriptor> {
        self.table
            .get(self.chain.step(position).index)
            .map(|sample| sample.descriptor)
    }

    fn active_position(&self) -> usize {
        usize::from(self.retry_step)
    }

    /// Runs the periodic evaluation if it is due, then applies pending trial
    /// and software-retry transitions.
    ///
    /// `tx_aggregate` tells whether the next frame may be aggregated.
    pub fn evaluate(&mut self, now: I, tx_aggregate: bool) -> Evaluation {
        let mut events = StationEvents::new();
        {
            let _guard = CriticalSectionGuard::acquire();
            self.aggregated_tx = self.aggregation_allowed && tx_aggregate;
        }

        let mut update = false;
        let period_elapsed =
            now.saturating_duration_since(self.last_evaluation) >= EVALUATION_PERIOD;
        if period_elapsed {
            update |= self.update_statistics(false);
            let _guard = CriticalSectionGuard::acquire();
            self.trial.abandon();
            self.retry_requested = false;
            self.retry_step = 0;
            self.last_evaluation = now;
        }

        update |= self.advance_chain(&mut events);

        if update || period_elapsed {
            let aggregation_before = self.aggregation_allowed;
            {
                let _guard = CriticalSectionGuard::acquire();
                self.refresh_amsdu();
                self.refresh_aggregation();
            }
            if update {
                self.policy_pending = true;
                push_event(&mut events, self.chain_event());
            }
            if aggregation_before != self.aggregation_allowed {
                push_event(&mut events, self.aggregation_event());
            }
        }

        Evaluation {
            retry_step: self.retry_step,
            policy_changed: update,
            events,
        }
    }

    /// Recomputes statistics and the chain for a new period. Returns `true`
    /// when a step moved to a different entry.
    fn update_statistics(&mut self, initial: bool) -> bool {
        let previous = self.chain;
        self.aggregate.fold();
        self.trial.reset_slow_samples();
        self.table.start_period();

        if self.fixed_rate.is_some() {
            let index = self.chain.step(0).index;
            if let Some(sample) = self.table.get_mut(index) {
                sample.update_probability();
                sample.reset_counters();
            }
            if let Some(lowest) = self.table.get_mut(0) {
                lowest.reset_counters();
            }
            return false;
        }

        let throughputs = self.table.rank(&self.aggregate);
        {
            let _guard = CriticalSectionGuard::acquire();
            self.chain
                .rebuild(&mut self.table, &throughputs, self.aggregated_tx);
        }

        if !initial {
            if self.table.len() < MAX_SAMPLES {
                self.table.reset_counters();
            } else if let (Some(best), Some(second)) = (self.descriptor_at(0), self.descriptor_at(1))
            {
                self.table.replace_stale(
                    &self.profile,
                    self.chain.active_indexes(),
                    best,
                    second,
                    &mut self.rng,
                );
                if let Some(lowest) = self.table.get_mut(0) {
                    lowest.reset_counters();
                }
            }
        }

        self.chain.changed_from(&previous)
    }

    fn advance_chain(&mut self, events: &mut StationEvents) -> bool {
        let mut update = false;
        let _guard = CriticalSectionGuard::acquire();

        match self.trial.status() {
            TrialStatus::Check if self.fixed_rate.is_none() => {
                let context = TrialContext {
                    table: &self.table,
                    profile: &self.profile,
                    aggregate: &self.aggregate,
                    aggregated: self.aggregated_tx,
                };
                if self.trial.try_start(&context, &mut self.chain, &mut self.rng) {
                    update = true;
                    let position = if self.trial.is_direct() { 0 } else { 1 };
                    let index = u8::try_from(self.chain.step(position).index).unwrap_or(u8::MAX);
                    push_event(
                        events,
                        RateEvent::new(
                            RateEventKind::TrialStarted,
                            RateEventPayload::Trial {
                                index,
                                direct: self.trial.is_direct(),
                            },
                        ),
                    );
                }
            }
            TrialStatus::Check => self.trial.wait(),
            TrialStatus::Revert => {
                self.trial.revert(&mut self.chain);
                update = true;
                push_event(events, RateEvent::bare(RateEventKind::TrialReverted));
            }
            TrialStatus::Idle | TrialStatus::UpdateChain => {}
        }

        if self.aggregated_tx && self.retry_requested {
            self.retry_requested = false;
            if self.retry_step < MAX_SW_RETRY_STEP {
                self.retry_step += 1;
                update = true;
                push_event(
                    events,
                    RateEvent::new(
                        RateEventKind::RetryStepAdvanced,
                        RateEventPayload::RetryStep(self.retry_step),
                    ),
                );
            }
        }

        update
    }

    /// Attributes one transmit completion to the chain's entries.
    ///
    /// Completions must arrive in transmission order.
    pub fn on_completion(&mut self, completion: &Completion) -> StationEvents {
        let mut events = StationEvents::new();

        match *completion {
            Completion::Aggregate {
                attempts,
                failures,
                retry_required,
            } => {
                self.aggregate.record(attempts);
                let index = self.chain.step(self.active_position()).index;
                if let Some(sample) = self.table.get_mut(index) {
                    sample.record(attempts, attempts.saturating_sub(failures));
                    if retry_required {
                        sample.add_retry_request();
                    }
                }
            }
            Completion::Single { attempts, failures } => {
                self.aggregate.record(1);
                self.attribute_single(attempts, failures);
            }
        }

        let _guard = CriticalSectionGuard::acquire();
        self.trial.on_completion(self.policy_pending);

        if completion.is_aggregate() {
            let index = self.chain.step(self.active_position()).index;
            if let Some(sample) = self.table.get_mut(index)
                && sample.retry_count() > sample.descriptor.mcs()
            {
                sample.retry_requests = RETRY_REQUESTED;
                self.retry_requested = true;
            }
        }

        let aggregation_before = self.aggregation_allowed;
        self.refresh_aggregation();
        if aggregation_before != self.aggregation_allowed {
            push_event(&mut events, self.aggregation_event());
        }
        events
    }

    fn attribute_single(&mut self, mut attempts: u32, mut failures: u32) {
        for position in 0..RETRY_STEPS {
            if attempts == 0 {
                break;
            }
            let index = self.chain.step(position).index;
            let Some(sample) = self.table.get_mut(index) else {
                break;
            };

            if failures >= MAX_RETRIES_PER_STEP {
                sample.record(MAX_RETRIES_PER_STEP, 0);
                attempts = attempts.saturating_sub(MAX_RETRIES_PER_STEP);
                failures -= MAX_RETRIES_PER_STEP;
            } else {
                sample.record(attempts, attempts.saturating_sub(failures));
                attempts = 0;
                failures = 0;
            }
        }
    }

    fn refresh_amsdu(&mut self) {
        let subframes = match self.descriptor_at(self.active_position()) {
            Some(descriptor)
                if descriptor.format() != FormatClass::Legacy
                    && descriptor.mcs() == self.profile.max_mcs() =>
            {
                match self.profile.max_nss() {
                    0 => 2,
                    1 => 4,
                    _ => 6,
                }
            }
            _ => 0,
        };
        self.amsdu_len = self
            .profile
            .max_amsdu_len()
            .min(subframes * AMSDU_SUBFRAME_LEN);
    }

    fn refresh_aggregation(&mut self) {
        self.aggregation_allowed = self.compute_aggregation();
    }

    fn compute_aggregation(&self) -> bool {
        if self.profile.allows_legacy()
            && (0..3).any(|position| {
                self.descriptor_at(position)
                    .is_none_or(|descriptor| descriptor.format() == FormatClass::Legacy)
            })
        {
            return false;
        }
        if self.profile.format() == FormatClass::Legacy {
            return false;
        }
        if self.fixed_rate.is_some() {
            return true;
        }

        let Some(active) = self.table.get(self.chain.step(self.active_position()).index) else {
            return false;
        };
        let weak_low_rate = active.descriptor.mcs() <= 2
            && active.descriptor.nss() == 0
            && active.probability < Probability::TEN_PERCENT;
        !(weak_low_rate || active.probability < Probability::ONE_PERCENT)
    }

    /// Forces every rate-bearing step onto `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`FixedRateError`] when the station cannot use the descriptor;
    /// the state is left untouched.
    pub fn set_fixed_rate(
        &mut self,
        descriptor: RateDescriptor,
    ) -> Result<StationEvents, FixedRateError> {
        self.profile.validate_fixed(descriptor)?;

        let mut events = StationEvents::new();
        {
            let _guard = CriticalSectionGuard::acquire();
            let index = self.table.install(descriptor);
            let fallback = self.chain.step(RETRY_STEPS - 1);
            self.chain = RetryChain::pinned(index);
            self.chain.set_step(RETRY_STEPS - 1, RetryStep::new(0, fallback.throughput));
            self.table.reset_counters();
            self.trial.abandon();
            self.retry_requested = false;
            self.retry_step = 0;
            self.fixed_rate = Some(descriptor);
            self.refresh_amsdu();
            self.refresh_aggregation();
            self.policy_pending = true;
        }

        push_event(
            &mut events,
            RateEvent::new(
                RateEventKind::FixedRateArmed,
                RateEventPayload::Descriptor(descriptor.to_raw()),
            ),
        );
        push_event(&mut events, self.chain_event());
        Ok(events)
    }

    /// Returns to automatic selection. Ranking resumes at the next
    /// evaluation period.
    pub fn clear_fixed_rate(&mut self) -> StationEvents {
        let mut events = StationEvents::new();
        if self.fixed_rate.take().is_none() {
            return events;
        }

        push_event(&mut events, RateEvent::bare(RateEventKind::FixedRateCleared));
        if self.reseed_deferred {
            self.reseed_deferred = false;
            self.reseed(&mut events);
        }
        events
    }

    /// Applies a bandwidth or stream-count change. The table is re-seeded
    /// unless a fixed rate is armed, in which case it happens when the fixed
    /// rate is cleared.
    pub fn renegotiate(&mut self, bandwidth: Bandwidth, nss: u8) -> StationEvents {
        let mut events = StationEvents::new();
        let mut updated = self.profile;
        updated.set_bandwidth_nss(bandwidth, nss);
        if updated == self.profile {
            return events;
        }
        self.profile = updated;

        if self.fixed_rate.is_some() {
            self.reseed_deferred = true;
            return events;
        }
        self.reseed(&mut events);
        events
    }

    fn reseed(&mut self, events: &mut StationEvents) {
        self.table.reseed(&self.profile, &mut self.rng);
        let mut throughputs = Throughputs::new();
        for _ in 0..self.table.len() {
            let _ = throughputs.push(0);
        }

        {
            let _guard = CriticalSectionGuard::acquire();
            self.chain
                .rebuild(&mut self.table, &throughputs, self.aggregated_tx);
            self.trial.abandon();
            self.retry_requested = false;
            self.retry_step = 0;
            self.refresh_amsdu();
            self.refresh_aggregation();
            self.policy_pending = true;
        }

        push_event(
            events,
            RateEvent::new(
                RateEventKind::Renegotiated,
                RateEventPayload::Capability {
                    bandwidth_mhz: self.profile.max_bandwidth().mhz(),
                    nss: self.profile.max_nss(),
                },
            ),
        );
        push_event(events, self.chain_event());
    }

    /// Updates the DSSS/CCK preamble policy.
    ///
    /// Going long-only moves every short-preamble entry (and a short-preamble
    /// fixed rate) to the long preamble and rebuilds the chain; ranking
    /// resumes at the next evaluation period.
    pub fn set_long_preamble_only(&mut self, long_only: bool) {
        self.profile.set_long_preamble_only(long_only);
        if !long_only || !self.table.require_long_preamble(&self.profile, &mut self.rng) {
            return;
        }

        let _guard = CriticalSectionGuard::acquire();
        self.trial.abandon();
        if let Some(fixed) = self.fixed_rate {
            let fixed = match fixed {
                RateDescriptor::Legacy { rate, .. } => RateDescriptor::legacy(rate, Preamble::Long),
                other => other,
            };
            let index = self.table.install(fixed);
            self.chain = RetryChain::pinned(index);
            self.chain.set_step(RETRY_STEPS - 1, RetryStep::new(0, 0));
            self.fixed_rate = Some(fixed);
        } else {
            let mut throughputs = Throughputs::new();
            for _ in 0..self.table.len() {
                let _ = throughputs.push(0);
            }
            self.chain
                .rebuild(&mut self.table, &throughputs, self.aggregated_tx);
        }
        self.retry_requested = false;
        self.retry_step = 0;
        self.refresh_amsdu();
        self.refresh_aggregation();
        self.policy_pending = true;
    }

    /// Hardware policy for the current chain, starting at the active
    /// software retry step.
    #[must_use]
    pub fn policy_set(&self) -> PolicySet {
        let lowest = self.profile.lowest();
        let mut entries = [PolicyEntry::new(lowest, POLICY_RETRY_LIMIT); RETRY_STEPS];
        for (offset, entry) in entries.iter_mut().enumerate() {
            let position = (self.active_position() + offset) % RETRY_STEPS;
            if let Some(descriptor) = self.descriptor_at(position) {
                *entry = PolicyEntry::new(descriptor, POLICY_RETRY_LIMIT);
            }
        }
        PolicySet::new(entries)
    }

    /// Hands out the policy if it changed since the last call. Taking it
    /// counts as the transmit path picking up the chain.
    pub fn take_policy_update(&mut self) -> Option<PolicySet> {
        let _guard = CriticalSectionGuard::acquire();
        if !self.policy_pending {
            return None;
        }
        self.policy_pending = false;
        Some(self.policy_set())
    }

    #[must_use]
    pub fn stats(&self) -> StationStats {
        let mut chain = [RetryStep::default(); RETRY_STEPS];
        chain.copy_from_slice(self.chain.steps());
        StationStats {
            format: self.profile.format(),
            table_len: self.table.len(),
            aggregate_frames: self.aggregate.frames(),
            aggregate_packets: self.aggregate.packets(),
            average_aggregate: self.aggregate.average(),
            retry_step: self.retry_step,
            trial_countdown: self.trial.countdown(),
            trial_status: self.trial.status(),
            chain,
            samples: self.table.samples().iter().copied().collect(),
            aggregation_allowed: self.aggregation_allowed,
            amsdu_len: self.amsdu_len,
            fixed_rate: self.fixed_rate,
        }
    }

    /// Checks the structural invariants of the state.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let lowest = self
            .table
            .get(0)
            .ok_or(InvariantViolation::EmptyTable)?;
        if lowest.descriptor != self.profile.lowest() {
            return Err(InvariantViolation::LowestMoved);
        }
        if !self.chain.is_consistent(self.table.len()) {
            return Err(InvariantViolation::StepOutOfRange);
        }
        if self.retry_step > MAX_SW_RETRY_STEP {
            return Err(InvariantViolation::RetryStepOutOfRange(self.retry_step));
        }
        if !self.table.is_duplicate_free() {
            return Err(InvariantViolation::DuplicateDescriptor);
        }
        if let Some(index) = self
            .table
            .samples()
            .iter()
            .position(|sample| sample.successes > sample.attempts)
        {
            return Err(InvariantViolation::SuccessesExceedAttempts(index));
        }
        Ok(())
    }

    /// Checks the invariants and falls back to the lowest rate when one is
    /// broken.
    ///
    /// # Panics
    ///
    /// Builds with the `strict-invariants` feature panic on a violation.
    pub fn validate(&mut self) -> Option<RateEvent> {
        let violation = self.check_invariants().err()?;
        if cfg!(feature = "strict-invariants") {
            panic!("rate control invariant violated: {violation}");
        }
        self.fail_safe();
        Some(RateEvent::bare(RateEventKind::FailSafe))
    }

    /// Resets the station to its lowest descriptor with aggregation disabled.
    /// Normal ranking resumes at the next evaluation period.
    pub fn fail_safe(&mut self) {
        let table = SampleTable::seed(&self.profile, &mut self.rng);
        let _guard = CriticalSectionGuard::acquire();
        self.table = table;
        self.chain = RetryChain::pinned(0);
        self.trial = TrialState::new();
        self.aggregate = AggregateLength::new();
        self.fixed_rate = None;
        self.reseed_deferred = false;
        self.retry_requested = false;
        self.retry_step = 0;
        self.aggregated_tx = false;
        self.aggregation_allowed = false;
        self.amsdu_len = 0;
        self.policy_pending = true;
    }

    #[cfg(test)]
    pub(crate) fn sample_mut(&mut self, index: usize) -> Option<&mut RateSample> {
        self.table.get_mut(index)
    }

    fn chain_event(&self) -> RateEvent {
        let mut indexes = [0u8; RETRY_STEPS];
        for (slot, step) in indexes.iter_mut().zip(self.chain.steps()) {
            *slot = u8::try_from(step.index).unwrap_or(u8::MAX);
        }
        RateEvent::new(RateEventKind::ChainUpdated, RateEventPayload::Chain(indexes))
    }

    fn aggregation_event(&self) -> RateEvent {
        RateEvent::new(
            RateEventKind::AggregationChanged,
            RateEventPayload::Aggregation {
                allowed: self.aggregation_allowed,
                amsdu_len: self.amsdu_len,
            },
        )
    }
}

fn push_event(events: &mut StationEvents, event: RateEvent) {
    // A full buffer drops the newest event; callers drain it every call.
    let _ = events.push(event);
}
