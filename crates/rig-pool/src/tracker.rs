//! Shared worker-liveness countdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Countdown of workers that have not yet permanently exited.
///
/// Decremented exactly once per worker lifetime. The worker whose
/// decrement lands on zero observes "last one standing"; exactly one
/// worker ever does, no matter how many decrement concurrently.
#[derive(Clone)]
pub struct LivenessTracker {
    remaining: Arc<AtomicUsize>,
}

impl LivenessTracker {
    pub fn new(workers: usize) -> Self {
        Self {
            remaining: Arc::new(AtomicUsize::new(workers)),
        }
    }

    /// Workers still in the round.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }

    /// Take this worker out of the round. Returns the new count;
    /// saturates at zero so a stray extra decrement cannot wrap.
    pub fn decrement(&self) -> usize {
        let mut current = self.remaining.load(Ordering::SeqCst);
        loop {
            if current == 0 {
                return 0;
            }
            match self.remaining.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return current - 1,
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_to_zero() {
        let tracker = LivenessTracker::new(3);
        assert_eq!(tracker.remaining(), 3);
        assert_eq!(tracker.decrement(), 2);
        assert_eq!(tracker.decrement(), 1);
        assert_eq!(tracker.decrement(), 0);
        assert_eq!(tracker.remaining(), 0);
    }

    #[test]
    fn saturates_at_zero() {
        let tracker = LivenessTracker::new(1);
        assert_eq!(tracker.decrement(), 0);
        assert_eq!(tracker.decrement(), 0);
        assert_eq!(tracker.remaining(), 0);
    }

    #[test]
    fn exactly_one_concurrent_decrementer_observes_zero() {
        let workers = 16;
        let tracker = LivenessTracker::new(workers);

        let mut handles = Vec::new();
        for _ in 0..workers {
            let tracker = tracker.clone();
            handles.push(std::thread::spawn(move || tracker.decrement() == 0));
        }

        let observed_zero = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|reached_zero| *reached_zero)
            .count();
        assert_eq!(observed_zero, 1);
        assert_eq!(tracker.remaining(), 0);
    }

    #[test]
    fn never_zero_before_the_last_decrement() {
        let tracker = LivenessTracker::new(5);
        for expected in (1..5).rev() {
            assert_eq!(tracker.decrement(), expected);
            assert_ne!(tracker.remaining(), 0);
        }
        assert_eq!(tracker.decrement(), 0);
    }
}
