//! Scoped critical section.

use core::marker::PhantomData;

use critical_section::RestoreState;

/// Holds a critical section for as long as it lives.
///
/// Regions that rewrite the retry chain, the trial state or the aggregation
/// flag take one of these so the completion path never sees them half
/// updated. Guards must be dropped in reverse acquisition order, which
/// lexical scoping guarantees.
pub struct CriticalSectionGuard {
    restore: RestoreState,
    // Releasing on another thread or core is not allowed.
    _not_send: PhantomData<*const ()>,
}

impl CriticalSectionGuard {
    /// Enters the critical section.
    #[must_use]
    pub fn acquire() -> Self {
        // SAFETY: the matching release happens in `Drop`, and guards cannot
        // be moved to another execution context.
        let restore = unsafe { critical_section::acquire() };
        Self {
            restore,
            _not_send: PhantomData,
        }
    }
}

impl Drop for CriticalSectionGuard {
    fn drop(&mut self) {
        // SAFETY: `restore` came from the `acquire` that created this guard.
        unsafe { critical_section::release(self.restore) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_nest_and_release() {
        let outer = CriticalSectionGuard::acquire();
        {
            let _inner = CriticalSectionGuard::acquire();
        }
        drop(outer);

        let value = critical_section::with(|_| 42);
        assert_eq!(value, 42);
    }
}
