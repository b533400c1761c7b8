//! Suite aggregator: folds finished verdicts into a suite result.
//!
//! Counting rules:
//! 1. A verdict with a failure cause is ERRORED (no response was obtained)
//! 2. Else a verdict with any failed assertion is FAILED
//! 3. Else it is PASSED
//!
//! Counts are computed in one pass over the list that ends up in the result,
//! so they cannot drift from it.

use chrono::Utc;
use std::time::Instant;

use crate::types::{Outcome, SuiteCounts, SuiteResult, Verdict};

/// The aggregator turns a finished verdict list into a [`SuiteResult`].
pub struct SuiteAggregator;

impl SuiteAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Aggregate verdicts, already in declared case order.
    ///
    /// # Arguments
    ///
    /// * `verdicts` - One verdict per test case
    /// * `started` - When the run started, for the wall-clock duration
    pub fn aggregate(&self, verdicts: Vec<Verdict>, started: Instant) -> SuiteResult {
        let counts = verdicts.iter().fold(
            SuiteCounts {
                total: 0,
                passed: 0,
                failed: 0,
                errored: 0,
            },
            |mut counts, verdict| {
                counts.total += 1;
                match verdict.outcome() {
                    Outcome::Passed => counts.passed += 1,
                    Outcome::Failed => counts.failed += 1,
                    Outcome::Errored => counts.errored += 1,
                }
                counts
            },
        );

        SuiteResult {
            verdicts,
            counts,
            duration: started.elapsed(),
            finished_at: Utc::now(),
        }
    }
}

impl Default for SuiteAggregator {
    fn default() -> Self {
        Self::new()
    }
}
