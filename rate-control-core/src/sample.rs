//! Per-station sample table.
//!
//! Entry 0 always holds the lowest descriptor the station may use. The
//! remaining entries are ranked by throughput once per evaluation period and
//! the ones that stopped paying off are swapped for exploration candidates.

use heapless::Vec;
use rand_core::RngCore;

use crate::capability::CapabilityProfile;
use crate::descriptor::{Preamble, RateDescriptor};
use crate::estimator::{self, AggregateLength, Probability};
use crate::explore;
use crate::tuning::{
    EXPLORATION_CANDIDATES, MAX_SAMPLES, REPLACEMENT_SKIP_THRESHOLD, SEED_RANDOM_ATTEMPTS,
};

/// Throughput estimates, one per table entry, in table order.
pub type Throughputs = Vec<u32, MAX_SAMPLES>;

/// Flag set in [`RateSample::retry_requests`] once a software retry has been
/// requested for the sample during the current period.
pub const RETRY_REQUESTED: u8 = 0x10;

const RETRY_COUNT_MASK: u8 = 0x0F;

/// One candidate descriptor and its rolling statistics.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RateSample {
    pub descriptor: RateDescriptor,
    pub attempts: u32,
    pub successes: u32,
    pub probability: Probability,
    /// A probability has been computed at least once.
    pub observed: bool,
    /// Consecutive evaluation periods without any attempt.
    pub skipped: u8,
    /// Software retries requested during the period, plus [`RETRY_REQUESTED`].
    pub retry_requests: u8,
    /// Eligible for the retry chain during the current period.
    pub allowed: bool,
}

impl RateSample {
    #[must_use]
    pub const fn new(descriptor: RateDescriptor) -> Self {
        Self {
            descriptor,
            attempts: 0,
            successes: 0,
            probability: Probability::ZERO,
            observed: false,
            skipped: 0,
            retry_requests: 0,
            allowed: true,
        }
    }

    /// Folds the period's attempts into the probability estimate.
    pub fn update_probability(&mut self) {
        if self.attempts == 0 {
            self.skipped = self.skipped.saturating_add(1);
            return;
        }

        self.skipped = 0;
        let observation = Probability::from_ratio(self.successes, self.attempts);
        self.probability = if self.observed {
            self.probability.blend(observation)
        } else {
            Probability::first_estimate(observation)
        };
        self.observed = true;
    }

    /// Accounts `attempts` tries of which `successes` were delivered.
    pub fn record(&mut self, attempts: u32, successes: u32) {
        self.attempts = self.attempts.saturating_add(attempts);
        self.successes = self
            .successes
            .saturating_add(successes.min(attempts))
            .min(self.attempts);
    }

    pub fn reset_counters(&mut self) {
        self.attempts = 0;
        self.successes = 0;
    }

    /// Forgets everything learnt about the descriptor.
    pub fn reset_statistics(&mut self) {
        *self = Self::new(self.descriptor);
    }

    /// Software retries requested this period, without the request flag.
    #[must_use]
    pub const fn retry_count(&self) -> u8 {
        self.retry_requests & RETRY_COUNT_MASK
    }

    /// Counts one software retry, saturating below the request flag.
    pub fn add_retry_request(&mut self) {
        if self.retry_count() < RETRY_COUNT_MASK {
            self.retry_requests += 1;
        }
    }
}

/// Bounded, duplicate-free collection of [`RateSample`]s.
#[derive(Clone, Debug)]
pub struct SampleTable {
    samples: Vec<RateSample, MAX_SAMPLES>,
}

impl SampleTable {
    /// Seeds a table for a newly associated station.
    ///
    /// Entry 0 is the lowest descriptor and the last entry the highest. The
    /// entries in between are random capability-respecting descriptors; when
    /// random draws keep colliding the capability is swept in order instead,
    /// and the table shrinks if the station offers fewer distinct rates.
    pub fn seed<R: RngCore>(profile: &CapabilityProfile, rng: &mut R) -> Self {
        let mut table = Self {
            samples: Vec::new(),
        };
        let wanted = profile.num_samples();
        let lowest = profile.lowest();
        let highest = profile.highest();
        table.push(lowest);

        let top_distinct = highest != lowest;
        let middle = wanted.saturating_sub(1 + usize::from(top_distinct));
        for _ in 0..middle {
            let Some(descriptor) = table.fresh_descriptor(profile, rng, Some(highest)) else {
                break;
            };
            table.push(descriptor);
        }

        if top_distinct && wanted > 1 {
            table.push(highest);
        }
        table
    }

    /// Replaces every entry with a fresh descriptor after the capability
    /// changed. Entry 0 is re-pinned to the lowest descriptor.
    pub fn reseed<R: RngCore>(&mut self, profile: &CapabilityProfile, rng: &mut R) {
        let wanted = self.samples.len();
        self.samples.clear();
        self.push(profile.lowest());
        while self.samples.len() < wanted {
            let Some(descriptor) = self.fresh_descriptor(profile, rng, None) else {
                break;
            };
            self.push(descriptor);
        }
    }

    fn push(&mut self, descriptor: RateDescriptor) {
        // Capacity is checked by every caller through `num_samples`.
        let _ = self.samples.push(RateSample::new(descriptor));
    }

    fn fresh_descriptor<R: RngCore>(
        &self,
        profile: &CapabilityProfile,
        rng: &mut R,
        reserved: Option<RateDescriptor>,
    ) -> Option<RateDescriptor> {
        let usable = |descriptor: RateDescriptor| {
            !self.contains(descriptor) && Some(descriptor) != reserved && profile.permits(descriptor)
        };

        for _ in 0..SEED_RANDOM_ATTEMPTS {
            let descriptor = explore::random_descriptor(profile, rng);
            if usable(descriptor) {
                return Some(descriptor);
            }
        }

        let mut found = None;
        explore::for_each_descriptor(profile, |descriptor| {
            if usable(descriptor) {
                found = Some(descriptor);
                false
            } else {
                true
            }
        });
        found
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&RateSample> {
        self.samples.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut RateSample> {
        self.samples.get_mut(index)
    }

    #[must_use]
    pub fn samples(&self) -> &[RateSample] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [RateSample] {
        &mut self.samples
    }

    #[must_use]
    pub fn contains(&self, descriptor: RateDescriptor) -> bool {
        self.position(descriptor).is_some()
    }

    #[must_use]
    pub fn position(&self, descriptor: RateDescriptor) -> Option<usize> {
        self.samples
            .iter()
            .position(|sample| sample.descriptor == descriptor)
    }

    /// Marks every entry eligible again and clears the retry bookkeeping.
    pub fn start_period(&mut self) {
        for sample in &mut self.samples {
            sample.retry_requests = 0;
            sample.allowed = true;
        }
    }

    /// Updates every probability, computes throughputs and sorts entries
    /// `1..` ascending by throughput. Returns the throughputs in the new order.
    pub fn rank(&mut self, aggregate: &AggregateLength) -> Throughputs {
        let mut throughputs = Throughputs::new();
        for sample in &mut self.samples {
            sample.update_probability();
            let throughput = estimator::throughput(sample.descriptor, sample.probability, aggregate);
            let _ = throughputs.push(throughput);
        }
        self.sort_by_throughput(&mut throughputs);
        throughputs
    }

    /// Current throughputs without touching the statistics.
    #[must_use]
    pub fn throughputs(&self, aggregate: &AggregateLength) -> Throughputs {
        self.samples
            .iter()
            .map(|sample| estimator::throughput(sample.descriptor, sample.probability, aggregate))
            .collect()
    }

    fn sort_by_throughput(&mut self, throughputs: &mut [u32]) {
        let mut end = self.samples.len().saturating_sub(1);
        while end > 1 {
            let mut last_swap = 0;
            for i in 1..end {
                if throughputs[i] > throughputs[i + 1] {
                    self.samples.swap(i, i + 1);
                    throughputs.swap(i, i + 1);
                    last_swap = i;
                }
            }
            end = last_swap;
        }
    }

    /// Clears attempt counters of every entry.
    pub fn reset_counters(&mut self) {
        for sample in &mut self.samples {
            sample.reset_counters();
        }
    }

    /// Replaces entries that stopped paying off with exploration candidates
    /// drawn around `best` and `second`. Entries listed in `protected` and
    /// entry 0 are kept. Attempt counters of every visited entry are cleared.
    pub fn replace_stale<R: RngCore>(
        &mut self,
        profile: &CapabilityProfile,
        protected: [usize; 3],
        best: RateDescriptor,
        second: RateDescriptor,
        rng: &mut R,
    ) {
        let candidates = explore::exploration_candidates(profile, best, second, rng);
        let mut next_candidate = 0;
        let mut index = 1;

        while index < self.samples.len() {
            let sample = self.samples[index];
            let stale = sample.probability < Probability::HALF
                || sample.skipped > REPLACEMENT_SKIP_THRESHOLD;
            let replaceable =
                stale && !protected.contains(&index) && next_candidate < EXPLORATION_CANDIDATES;

            if replaceable {
                if let Some(descriptor) = candidates[next_candidate]
                    && !self.contains(descriptor)
                {
                    let entry = &mut self.samples[index];
                    entry.descriptor = descriptor;
                    entry.probability = Probability::ZERO;
                    entry.observed = false;
                    entry.reset_counters();
                    index += 1;
                } else {
                    self.samples[index].reset_counters();
                }
                next_candidate += 1;
            } else {
                self.samples[index].reset_counters();
                index += 1;
            }
        }
    }

    /// Finds `descriptor` or installs it in the last slot, returning its index.
    /// Entry 0 is never evicted; a single-entry table grows instead.
    pub fn install(&mut self, descriptor: RateDescriptor) -> usize {
        if let Some(index) = self.position(descriptor) {
            return index;
        }

        if self.samples.len() > 1 {
            let last = self.samples.len() - 1;
            self.samples[last] = RateSample::new(descriptor);
            last
        } else {
            self.push(descriptor);
            self.samples.len() - 1
        }
    }

    /// Moves short-preamble DSSS/CCK entries to the long preamble once the
    /// station is long-only. An entry whose long form is already in the table
    /// is replaced with a fresh descriptor, or dropped when the capability has
    /// none left. Returns `true` when any entry changed.
    pub fn require_long_preamble<R: RngCore>(
        &mut self,
        profile: &CapabilityProfile,
        rng: &mut R,
    ) -> bool {
        let mut changed = false;
        let mut index = 1;
        while index < self.samples.len() {
            let RateDescriptor::Legacy {
                rate,
                preamble: Preamble::Short,
            } = self.samples[index].descriptor
            else {
                index += 1;
                continue;
            };

            changed = true;
            let long = RateDescriptor::legacy(rate, Preamble::Long);
            let replacement = if self.contains(long) {
                self.fresh_descriptor(profile, rng, None)
            } else {
                Some(long)
            };
            if let Some(descriptor) = replacement {
                self.samples[index] = RateSample::new(descriptor);
                index += 1;
            } else {
                self.samples.remove(index);
            }
        }
        changed
    }

    /// True when no two entries share a descriptor.
    #[must_use]
    pub fn is_duplicate_free(&self) -> bool {
        self.samples
            .iter()
            .enumerate()
            .all(|(index, sample)| {
                self.samples[index + 1..]
                    .iter()
                    .all(|other| other.descriptor != sample.descriptor)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::LegacyRateSet;
    use crate::descriptor::{LegacyRate, Preamble};
    use rand_core::SeedableRng;
    use rand_wyrand::WyRand;

    fn legacy_profile(long_only: bool) -> CapabilityProfile {
        // 1, 2, 5.5, 11, 6, 12, 24, 54
        let rates = LegacyRateSet::from_rates(&[0x82, 0x84, 0x8B, 0x96, 0x0C, 0x18, 0x30, 0x6C]);
        CapabilityProfile::legacy_only(rates, long_only)
    }

    #[test]
    fn seeding_pins_lowest_and_highest() {
        let profile = legacy_profile(true);
        let mut rng = WyRand::seed_from_u64(1);
        let table = SampleTable::seed(&profile, &mut rng);

        assert_eq!(table.len(), profile.num_samples());
        assert_eq!(table.samples()[0].descriptor, profile.lowest());
        assert_eq!(table.samples()[table.len() - 1].descriptor, profile.highest());
        assert!(table.is_duplicate_free());
        assert!(table.samples().iter().all(|s| profile.permits(s.descriptor)));
    }

    #[test]
    fn single_rate_station_gets_one_entry() {
        let profile = CapabilityProfile::fallback();
        let mut rng = WyRand::seed_from_u64(2);
        let table = SampleTable::seed(&profile, &mut rng);
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.samples()[0].descriptor,
            RateDescriptor::legacy(LegacyRate::Mbps1, Preamble::Long)
        );
    }

    #[test]
    fn first_observation_seeds_probability() {
        let mut sample = RateSample::new(RateDescriptor::legacy(LegacyRate::Mbps6, Preamble::Long));
        sample.record(4, 4);
        sample.update_probability();
        assert!(sample.observed);
        assert_eq!(sample.probability.raw(), Probability::ONE.raw() - 1);

        sample.reset_counters();
        sample.update_probability();
        sample.update_probability();
        assert_eq!(sample.skipped, 2);
    }

    #[test]
    fn successes_never_exceed_attempts() {
        let mut sample = RateSample::new(RateDescriptor::legacy(LegacyRate::Mbps6, Preamble::Long));
        sample.record(2, 5);
        sample.record(1, 1);
        assert_eq!(sample.attempts, 3);
        assert_eq!(sample.successes, 3);
    }

    #[test]
    fn ranking_keeps_entry_zero_in_place() {
        let profile = legacy_profile(true);
        let mut rng = WyRand::seed_from_u64(3);
        let mut table = SampleTable::seed(&profile, &mut rng);
        for sample in table.samples_mut() {
            sample.record(10, 10);
        }
        let lowest = table.samples()[0].descriptor;

        let throughputs = table.rank(&AggregateLength::new());
        assert_eq!(table.samples()[0].descriptor, lowest);
        assert!(throughputs[1..].windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn stale_entries_are_replaced_without_duplicates() {
        let profile = legacy_profile(false);
        let mut rng = WyRand::seed_from_u64(4);
        let mut table = SampleTable::seed(&profile, &mut rng);
        let last = table.len() - 1;
        let best = table.samples()[last].descriptor;
        let second = table.samples()[last - 1].descriptor;

        for _ in 0..20 {
            table.replace_stale(&profile, [last, last - 1, 0], best, second, &mut rng);
            assert!(table.is_duplicate_free());
            assert_eq!(table.samples()[last].descriptor, best);
            assert_eq!(table.samples()[0].descriptor, profile.lowest());
        }
    }

    #[test]
    fn long_only_switch_converts_short_cck_entries() {
        // 2, 5.5, 11, 6, 12
        let rates = LegacyRateSet::from_rates(&[0x84, 0x8B, 0x96, 0x0C, 0x18]);
        let mut profile = CapabilityProfile::legacy_only(rates, false);
        let mut rng = WyRand::seed_from_u64(6);
        let mut table = SampleTable::seed(&profile, &mut rng);

        // Short and long forms of the floor rate side by side.
        let two_short = RateDescriptor::legacy(LegacyRate::Mbps2, Preamble::Short);
        let two_long = RateDescriptor::legacy(LegacyRate::Mbps2, Preamble::Long);
        assert_eq!(table.samples()[0].descriptor, two_long);
        if !table.contains(two_short) {
            table.samples_mut()[1] = RateSample::new(two_short);
        }
        assert!(table.contains(two_short));
        assert!(table.is_duplicate_free());

        profile.set_long_preamble_only(true);
        assert_eq!(profile.lowest(), two_long);
        assert!(table.require_long_preamble(&profile, &mut rng));

        assert_eq!(table.samples()[0].descriptor, two_long);
        assert!(table.is_duplicate_free());
        assert!(
            table
                .samples()
                .iter()
                .all(|sample| sample.descriptor.preamble() != Some(Preamble::Short))
        );
        assert!(table.samples().iter().all(|s| profile.permits(s.descriptor)));
        assert!(!table.require_long_preamble(&profile, &mut rng));
    }

    #[test]
    fn install_evicts_the_last_entry() {
        let profile = legacy_profile(true);
        let mut rng = WyRand::seed_from_u64(5);
        let mut table = SampleTable::seed(&profile, &mut rng);
        let existing = table.samples()[2].descriptor;
        assert_eq!(table.install(existing), 2);

        let absent = RateDescriptor::legacy(LegacyRate::Mbps48, Preamble::Long);
        assert!(!table.contains(absent));
        let index = table.install(absent);
        assert_eq!(index, table.len() - 1);
        assert_eq!(table.samples()[index].descriptor, absent);
    }
}
