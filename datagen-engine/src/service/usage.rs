//! Usage and constraint tracker
//!
//! Accumulates token usage and wall-clock time across every block and seed
//! of a job and evaluates the pipeline's constraints against it. The
//! tracker is only consulted between runs, never while a block executes.

use chrono::{DateTime, Utc};
use datagen_core::domain::usage::{ConstraintBreach, Constraints, Usage};

#[derive(Debug, Clone)]
pub struct UsageTracker {
    constraints: Constraints,
    usage: Usage,
    started_at: DateTime<Utc>,
}

impl UsageTracker {
    /// Starts tracking now
    pub fn new(constraints: Constraints) -> Self {
        Self::with_start(constraints, Utc::now())
    }

    /// Starts tracking from `started_at`
    pub fn with_start(constraints: Constraints, started_at: DateTime<Utc>) -> Self {
        Self {
            constraints,
            usage: Usage {
                start_time: Some(started_at),
                ..Usage::default()
            },
            started_at,
        }
    }

    /// Adds usage reported by a block
    pub fn record(&mut self, usage: &Usage) {
        self.usage.add(usage);
        self.usage.end_time = Some(Utc::now());
    }

    /// Cumulative usage so far
    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    /// First configured ceiling that has been reached, if any
    pub fn exceeded(&self) -> Option<ConstraintBreach> {
        self.constraints.exceeded_by(&self.usage, self.elapsed())
    }

    /// True once any configured ceiling is reached or surpassed
    pub fn is_exceeded(&self) -> bool {
        self.exceeded().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datagen_core::domain::usage::ConstraintKind;

    #[test]
    fn test_unbounded_tracker_never_exceeds() {
        let mut tracker = UsageTracker::new(Constraints::default());
        tracker.record(&Usage::tokens(1_000_000, 1_000_000, 0));
        assert!(!tracker.is_exceeded());
        assert_eq!(tracker.usage().total_tokens(), 2_000_000);
    }

    #[test]
    fn test_total_tokens_ceiling_reached() {
        let mut tracker = UsageTracker::new(Constraints {
            max_total_tokens: Some(100),
            ..Default::default()
        });

        tracker.record(&Usage::tokens(20, 20, 0));
        tracker.record(&Usage::tokens(20, 20, 0));
        assert!(!tracker.is_exceeded());

        tracker.record(&Usage::tokens(10, 10, 0));
        let breach = tracker.exceeded().unwrap();
        assert_eq!(breach.kind, ConstraintKind::TotalTokens);
        assert_eq!(breach.actual, 100);
    }

    #[test]
    fn test_cached_tokens_count_towards_total() {
        let mut tracker = UsageTracker::new(Constraints {
            max_total_tokens: Some(10),
            ..Default::default()
        });
        tracker.record(&Usage::tokens(0, 0, 10));
        assert!(tracker.is_exceeded());
    }

    #[test]
    fn test_elapsed_ceiling_uses_start_time() {
        let started_at = Utc::now() - chrono::Duration::seconds(120);
        let tracker = UsageTracker::with_start(
            Constraints {
                max_elapsed_secs: Some(60),
                ..Default::default()
            },
            started_at,
        );

        assert_eq!(tracker.exceeded().map(|b| b.kind), Some(ConstraintKind::ElapsedSecs));
        assert_eq!(tracker.usage().start_time, Some(started_at));
    }

    #[test]
    fn test_record_sets_end_time() {
        let mut tracker = UsageTracker::new(Constraints::default());
        assert!(tracker.usage().end_time.is_none());
        tracker.record(&Usage::tokens(1, 0, 0));
        assert!(tracker.usage().end_time.is_some());
    }
}
