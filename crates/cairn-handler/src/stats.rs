//! Handle statistics for monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one session's handle activity.
#[derive(Debug, Default)]
pub struct HandlerStats {
    /// Fresh opens.
    opens: AtomicU64,
    /// Transparent reopens after a close behind the client's back.
    reopens: AtomicU64,
    /// Explicit closes and bulk removals.
    closes: AtomicU64,
    /// Descriptors closed by the invalidation sweep.
    sweep_closes: AtomicU64,
    /// Open/lock sequences restarted after the table was invalidated.
    retries: AtomicU64,
    /// Rows handed to the caller.
    rows_sent: AtomicU64,
}

impl HandlerStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fresh open.
    #[inline]
    pub fn record_open(&self) {
        self.opens.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a reopen.
    #[inline]
    pub fn record_reopen(&self) {
        self.reopens.fetch_add(1, Ordering::Relaxed);
    }

    /// Records `n` closes.
    #[inline]
    pub fn record_closes(&self, n: usize) {
        self.closes.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Records `n` sweep closes.
    #[inline]
    pub fn record_sweep_closes(&self, n: usize) {
        self.sweep_closes.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Records a retry.
    #[inline]
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a row sent.
    #[inline]
    pub fn record_row_sent(&self) {
        self.rows_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns fresh opens.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    /// Returns reopens.
    pub fn reopens(&self) -> u64 {
        self.reopens.load(Ordering::Relaxed)
    }

    /// Returns closes.
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }

    /// Returns sweep closes.
    pub fn sweep_closes(&self) -> u64 {
        self.sweep_closes.load(Ordering::Relaxed)
    }

    /// Returns retries.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Returns rows sent.
    pub fn rows_sent(&self) -> u64 {
        self.rows_sent.load(Ordering::Relaxed)
    }

    /// Resets all statistics.
    pub fn reset(&self) {
        self.opens.store(0, Ordering::Relaxed);
        self.reopens.store(0, Ordering::Relaxed);
        self.closes.store(0, Ordering::Relaxed);
        self.sweep_closes.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);
        self.rows_sent.store(0, Ordering::Relaxed);
    }
}

impl std::fmt::Display for HandlerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HandlerStats {{ opens: {}, reopens: {}, closes: {}, sweep_closes: {}, retries: {}, rows_sent: {} }}",
            self.opens(),
            self.reopens(),
            self.closes(),
            self.sweep_closes(),
            self.retries(),
            self.rows_sent()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = HandlerStats::new();
        stats.record_open();
        stats.record_reopen();
        stats.record_closes(2);
        stats.record_sweep_closes(3);
        stats.record_row_sent();

        assert_eq!(stats.opens(), 1);
        assert_eq!(stats.reopens(), 1);
        assert_eq!(stats.closes(), 2);
        assert_eq!(stats.sweep_closes(), 3);
        assert_eq!(stats.rows_sent(), 1);

        stats.reset();
        assert_eq!(stats.closes(), 0);
        assert!(stats.to_string().starts_with("HandlerStats {"));
    }
}
