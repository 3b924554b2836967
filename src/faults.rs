//! Per-session evaluation fault reporting
//!
//! A formula like `t/0` faults on every sample, tens of thousands of times a
//! second. The first few faults of a session are logged individually; after
//! that they are only counted and summarized at most once per second of
//! output.

use crate::error::EvalError;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct FaultLog {
    limit: usize,
    reported: usize,
    total: u64,
    pending: u64,
    summary_interval: u64,
    last_summary: u64,
}

impl FaultLog {
    /// `summary_interval` is in physical samples, normally one second.
    pub fn new(limit: usize, summary_interval: u64) -> Self {
        Self {
            limit,
            reported: 0,
            total: 0,
            pending: 0,
            summary_interval: summary_interval.max(1),
            last_summary: 0,
        }
    }

    pub fn record(&mut self, ordinal: u64, t: u64, generation: u64, error: &EvalError) {
        self.total += 1;
        if self.reported < self.limit {
            self.reported += 1;
            warn!(ordinal, t, generation, "evaluation fault, played silence: {error}");
            if self.reported == self.limit {
                warn!(
                    limit = self.limit,
                    "further evaluation faults in this session are summarized"
                );
            }
        } else {
            self.pending += 1;
        }
    }

    /// Log the suppressed count if a summary interval has passed.
    pub fn maybe_summarize(&mut self, ordinal: u64) {
        if self.pending == 0 || ordinal < self.last_summary + self.summary_interval {
            return;
        }
        warn!(
            suppressed = self.pending,
            total = self.total,
            "evaluation faults since last summary"
        );
        self.pending = 0;
        self.last_summary = ordinal;
    }

    /// All faults this session
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Faults logged individually
    pub fn reported(&self) -> usize {
        self.reported
    }

    /// Faults counted but not yet summarized
    pub fn suppressed(&self) -> u64 {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAULT: EvalError = EvalError::NonFinite { value: f64::INFINITY };

    #[test]
    fn test_reports_up_to_limit_then_counts() {
        let mut log = FaultLog::new(3, 100);
        for n in 0..10 {
            log.record(n, n, 1, &FAULT);
        }
        assert_eq!(log.total(), 10);
        assert_eq!(log.reported(), 3);
        assert_eq!(log.suppressed(), 7);
    }

    #[test]
    fn test_summary_is_rate_limited() {
        let mut log = FaultLog::new(0, 100);
        log.record(0, 0, 1, &FAULT);
        log.maybe_summarize(50);
        assert_eq!(log.suppressed(), 1);

        log.maybe_summarize(100);
        assert_eq!(log.suppressed(), 0);

        log.record(101, 101, 1, &FAULT);
        log.maybe_summarize(150);
        assert_eq!(log.suppressed(), 1);
        log.maybe_summarize(200);
        assert_eq!(log.suppressed(), 0);
        assert_eq!(log.total(), 2);
    }
}
