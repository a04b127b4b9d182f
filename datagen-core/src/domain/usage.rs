//! Usage and constraint types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token and wall-clock usage
///
/// Additive across every block and every seed in a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Usage {
    /// Token-only usage, as reported by a block
    pub fn tokens(input_tokens: u64, output_tokens: u64, cached_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cached_tokens,
            start_time: None,
            end_time: None,
        }
    }

    /// Input + output + cached tokens
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cached_tokens)
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens() == 0
    }

    /// Adds `other` into `self`
    ///
    /// Token counts are summed; the time window widens to cover both.
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cached_tokens = self.cached_tokens.saturating_add(other.cached_tokens);
        self.start_time = match (self.start_time, other.start_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.end_time = match (self.end_time, other.end_time) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Optional ceilings on cumulative usage
///
/// Evaluated, never mutated, by the usage tracker. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub max_total_tokens: Option<u64>,
    #[serde(default)]
    pub max_input_tokens: Option<u64>,
    #[serde(default)]
    pub max_output_tokens: Option<u64>,
    #[serde(default)]
    pub max_cached_tokens: Option<u64>,
    #[serde(default)]
    pub max_elapsed_secs: Option<u64>,
}

impl Constraints {
    /// True when no ceiling is configured
    pub fn is_unbounded(&self) -> bool {
        self.max_total_tokens.is_none()
            && self.max_input_tokens.is_none()
            && self.max_output_tokens.is_none()
            && self.max_cached_tokens.is_none()
            && self.max_elapsed_secs.is_none()
    }

    /// First ceiling reached or surpassed by `usage` after `elapsed`
    ///
    /// Ceilings are checked in a fixed order: total, input, output, cached
    /// tokens, then elapsed time.
    pub fn exceeded_by(&self, usage: &Usage, elapsed: chrono::Duration) -> Option<ConstraintBreach> {
        let elapsed_secs = u64::try_from(elapsed.num_seconds()).unwrap_or(0);
        let checks = [
            (ConstraintKind::TotalTokens, self.max_total_tokens, usage.total_tokens()),
            (ConstraintKind::InputTokens, self.max_input_tokens, usage.input_tokens),
            (ConstraintKind::OutputTokens, self.max_output_tokens, usage.output_tokens),
            (ConstraintKind::CachedTokens, self.max_cached_tokens, usage.cached_tokens),
            (ConstraintKind::ElapsedSecs, self.max_elapsed_secs, elapsed_secs),
        ];

        checks.into_iter().find_map(|(kind, limit, actual)| {
            let limit = limit?;
            (actual >= limit).then_some(ConstraintBreach { kind, limit, actual })
        })
    }
}

/// Which ceiling a [`ConstraintBreach`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    TotalTokens,
    InputTokens,
    OutputTokens,
    CachedTokens,
    ElapsedSecs,
}

impl ConstraintKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConstraintKind::TotalTokens => "max_total_tokens",
            ConstraintKind::InputTokens => "max_input_tokens",
            ConstraintKind::OutputTokens => "max_output_tokens",
            ConstraintKind::CachedTokens => "max_cached_tokens",
            ConstraintKind::ElapsedSecs => "max_elapsed_secs",
        }
    }
}

/// A ceiling that was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintBreach {
    pub kind: ConstraintKind,
    pub limit: u64,
    pub actual: u64,
}

impl std::fmt::Display for ConstraintBreach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} reached ({} >= {})", self.kind.as_str(), self.actual, self.limit)
    }
}
