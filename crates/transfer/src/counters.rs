use std::sync::atomic::{AtomicU64, Ordering};

/// Byte counters shared by every task of one queue.
///
/// Tasks only ever add to or subtract from these; none reads another
/// task's partial progress.
#[derive(Debug, Default)]
pub struct ByteCounters {
    total_queued: AtomicU64,
    uploaded: AtomicU64,
}

impl ByteCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an admitted file's size to the total.
    pub fn queue(&self, bytes: u64) {
        self.total_queued.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Credits acknowledged chunk bytes.
    pub fn credit(&self, bytes: u64) {
        self.uploaded.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Removes previously credited bytes, saturating at zero.
    pub fn debit(&self, bytes: u64) {
        let _ = self
            .uploaded
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                Some(cur.saturating_sub(bytes))
            });
    }

    pub fn total_queued(&self) -> u64 {
        self.total_queued.load(Ordering::SeqCst)
    }

    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::SeqCst)
    }

    /// Overall progress, clamped to 0-100.
    pub fn percentage(&self) -> f64 {
        let total = self.total_queued();
        if total == 0 {
            return 0.0;
        }
        (self.uploaded() as f64 * 100.0 / total as f64).min(100.0)
    }

    /// Zeroes both counters.
    pub fn reset(&self) {
        self.total_queued.store(0, Ordering::SeqCst);
        self.uploaded.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn credit_and_debit() {
        let c = ByteCounters::new();
        c.queue(100);
        c.credit(40);
        assert_eq!(c.uploaded(), 40);
        assert!((c.percentage() - 40.0).abs() < f64::EPSILON);
        c.debit(40);
        assert_eq!(c.uploaded(), 0);
    }

    #[test]
    fn debit_saturates() {
        let c = ByteCounters::new();
        c.credit(10);
        c.debit(25);
        assert_eq!(c.uploaded(), 0);
    }

    #[test]
    fn empty_total_is_zero_percent() {
        let c = ByteCounters::new();
        c.credit(10);
        assert_eq!(c.percentage(), 0.0);
    }

    #[test]
    fn reset_zeroes() {
        let c = ByteCounters::new();
        c.queue(5);
        c.credit(5);
        c.reset();
        assert_eq!(c.total_queued(), 0);
        assert_eq!(c.uploaded(), 0);
    }

    #[test]
    fn concurrent_credits() {
        use std::thread;

        let c = Arc::new(ByteCounters::new());
        let mut handles = vec![];
        for _ in 0..10 {
            let c = Arc::clone(&c);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    c.credit(2);
                    c.debit(1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.uploaded(), 1000);
    }
}
