//! Retry chain construction.

use crate::estimator::Probability;
use crate::sample::SampleTable;
use crate::tuning::RETRY_STEPS;

/// One retry-chain step: a sample-table index and its cached throughput.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RetryStep {
    pub index: usize,
    pub throughput: u32,
}

impl RetryStep {
    #[must_use]
    pub const fn new(index: usize, throughput: u32) -> Self {
        Self { index, throughput }
    }
}

/// Ordered retry chain handed to the hardware.
///
/// Step 0 carries the best throughput, step 1 the runner-up (or a trial),
/// step 2 the most reliable alternate and step 3 always the lowest rate.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RetryChain {
    steps: [RetryStep; RETRY_STEPS],
}

impl RetryChain {
    /// Chain used right after association: steps walk down from the last
    /// entry and the final step is entry 0.
    #[must_use]
    pub fn initial(len: usize) -> Self {
        let top = len.saturating_sub(1);
        let mut steps = [RetryStep::default(); RETRY_STEPS];
        for (offset, step) in steps.iter_mut().take(RETRY_STEPS - 1).enumerate() {
            step.index = top.saturating_sub(offset);
        }
        Self { steps }
    }

    /// Chain with steps 0 to 2 forced onto `index`.
    #[must_use]
    pub const fn pinned(index: usize) -> Self {
        let step = RetryStep::new(index, 0);
        Self {
            steps: [step, step, step, RetryStep::new(0, 0)],
        }
    }

    #[must_use]
    pub const fn step(&self, position: usize) -> RetryStep {
        self.steps[position % RETRY_STEPS]
    }

    pub fn set_step(&mut self, position: usize, step: RetryStep) {
        self.steps[position % RETRY_STEPS] = step;
    }

    #[must_use]
    pub const fn steps(&self) -> &[RetryStep; RETRY_STEPS] {
        &self.steps
    }

    /// Indexes of the three rate-bearing steps.
    #[must_use]
    pub const fn active_indexes(&self) -> [usize; 3] {
        [self.steps[0].index, self.steps[1].index, self.steps[2].index]
    }

    /// Returns `true` when `index` is referenced by one of steps 0 to 2.
    #[must_use]
    pub fn is_active(&self, index: usize) -> bool {
        self.active_indexes().contains(&index)
    }

    /// Returns `true` when every step indexes a table of `len` entries and
    /// the last step is entry 0.
    #[must_use]
    pub fn is_consistent(&self, len: usize) -> bool {
        self.steps.iter().all(|step| step.index < len) && self.steps[RETRY_STEPS - 1].index == 0
    }

    /// Rebuilds the chain from a ranked table.
    ///
    /// `throughputs` must be in table order, entries `1..` sorted ascending.
    /// CCK entries are marked disallowed unless the winner is itself CCK.
    /// Returns `true` when any step now points at a different entry.
    pub fn rebuild(&mut self, table: &mut SampleTable, throughputs: &[u32], aggregated: bool) -> bool {
        let previous = *self;
        let len = table.len().min(throughputs.len());
        if len == 0 {
            *self = Self::default();
            return previous != *self;
        }
        let top = len - 1;

        // Entry 0 only wins outright for non-aggregated traffic.
        let (best, first_offset) = if !aggregated && throughputs[0] > throughputs[top] {
            (0, 1)
        } else {
            (top, 2)
        };
        let best_throughput = throughputs[best];
        self.steps[0] = RetryStep::new(best, best_throughput);

        let samples = table.samples_mut();
        if !samples[best].descriptor.is_cck() {
            for sample in &mut samples[..top] {
                if sample.descriptor.is_cck() {
                    sample.allowed = false;
                }
            }
            samples[best].allowed = true;
        }

        // Runner-up: walk down from the top, skipping the winner.
        let mut second = RetryStep::new(best, best_throughput);
        let mut offset = first_offset;
        while offset < len {
            let index = len - offset;
            if samples[index].allowed {
                second = RetryStep::new(index, throughputs[index]);
                break;
            }
            offset += 1;
        }
        self.steps[1] = second;

        // Reliable alternate: start from the next allowed entry below the
        // runner-up, then prefer anything slower that is more reliable.
        let mut reliable = second.index;
        offset += 1;
        while offset < len {
            let index = len - offset;
            if samples[index].allowed {
                reliable = index;
                break;
            }
            offset += 1;
        }

        let mut max_throughput = throughputs[reliable];
        let mut max_probability = samples[reliable].probability;
        for index in 0..second.index {
            let sample = &samples[index];
            if !sample.allowed || index == best {
                continue;
            }
            let pick = if sample.probability >= Probability::NINETY_FIVE_PERCENT {
                throughputs[index] >= max_throughput
            } else {
                sample.probability >= max_probability
            };
            if pick {
                reliable = index;
                max_throughput = throughputs[index];
                max_probability = sample.probability;
            }
        }
        self.steps[2] = RetryStep::new(reliable, throughputs[reliable]);
        self.steps[3] = RetryStep::new(0, throughputs[0]);

        self.changed_from(&previous)
    }

    /// Returns `true` when any step index differs from `other`.
    #[must_use]
    pub fn changed_from(&self, other: &Self) -> bool {
        self.steps
            .iter()
            .zip(other.steps.iter())
            .any(|(mine, theirs)| mine.index != theirs.index)
    }
}
