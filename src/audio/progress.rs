use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A `{current, total}` snapshot of a framing pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub current: usize,
    pub total: usize,
}

impl ProgressUpdate {
    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

/// Progress counters shared between the framer and whoever polls them.
///
/// Both counters only ever grow, so a reader never sees progress go backwards
/// even when batches finish out of order.
#[derive(Clone, Debug, Default)]
pub struct Progress {
    current: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_total(&self, total: usize) {
        self.total.fetch_max(total, Ordering::Release);
    }

    pub fn advance_to(&self, current: usize) {
        self.current.fetch_max(current, Ordering::Release);
    }

    pub fn snapshot(&self) -> ProgressUpdate {
        ProgressUpdate {
            current: self.current.load(Ordering::Acquire),
            total: self.total.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_never_decrease() {
        let progress = Progress::new();
        progress.set_total(10);
        progress.advance_to(4);
        progress.advance_to(2);
        assert_eq!(progress.snapshot(), ProgressUpdate { current: 4, total: 10 });
        assert!(!progress.snapshot().is_complete());

        progress.advance_to(10);
        assert!(progress.snapshot().is_complete());
    }

    #[test]
    fn clones_share_state() {
        let progress = Progress::new();
        let reader = progress.clone();
        progress.set_total(3);
        progress.advance_to(1);
        assert_eq!(reader.snapshot(), ProgressUpdate { current: 1, total: 3 });
    }
}
