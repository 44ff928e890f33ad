//! Bounded backoff polling.
//!
//! A `BoundedPoll` waits through a fixed table of increasing delays, checking a
//! predicate after each one. It stops the first time the predicate holds and
//! otherwise terminates quietly once the table is exhausted. There is no
//! external cancel signal: the table length is the bound.
//!
//! # Default schedule
//!
//! | attempt | wait before check | elapsed |
//! |---------|-------------------|---------|
//! | 1       | 500ms             | 500ms   |
//! | 2       | 1000ms            | 1500ms  |
//! | 3       | 1500ms            | 3000ms  |
//! | 4       | 2000ms            | 5000ms  |

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

/// Default delay table, each entry relative to the previous check.
pub const DEFAULT_POLL_DELAYS: [Duration; 4] = [
    Duration::from_millis(500),
    Duration::from_millis(1000),
    Duration::from_millis(1500),
    Duration::from_millis(2000),
];

/// How a poll sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The predicate held on the given (1-based) attempt.
    Satisfied { attempts: usize, elapsed: Duration },
    /// Every attempt ran and the predicate never held.
    Exhausted { attempts: usize, elapsed: Duration },
}

impl PollOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    pub fn attempts(&self) -> usize {
        match self {
            Self::Satisfied { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// A fixed, finite sequence of checks at increasing intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedPoll {
    delays: Vec<Duration>,
}

impl Default for BoundedPoll {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_DELAYS.to_vec())
    }
}

impl BoundedPoll {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn from_millis(delays_ms: &[u64]) -> Self {
        Self::new(delays_ms.iter().copied().map(Duration::from_millis).collect())
    }

    /// Number of predicate checks performed when nothing succeeds.
    pub fn max_attempts(&self) -> usize {
        self.delays.len()
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Time from start at which each check runs.
    pub fn check_offsets(&self) -> Vec<Duration> {
        self.delays
            .iter()
            .scan(Duration::ZERO, |acc, d| {
                *acc = acc.saturating_add(*d);
                Some(*acc)
            })
            .collect()
    }

    /// Run the schedule.
    ///
    /// `predicate` receives the 1-based attempt number. It is called at most
    /// [`max_attempts`](Self::max_attempts) times and never before the first
    /// delay has elapsed.
    pub async fn run<F>(&self, mut predicate: F) -> PollOutcome
    where
        F: FnMut(usize) -> bool,
    {
        let started = Instant::now();

        for (index, delay) in self.delays.iter().enumerate() {
            tokio::time::sleep(*delay).await;
            let attempt = index + 1;
            if predicate(attempt) {
                return PollOutcome::Satisfied {
                    attempts: attempt,
                    elapsed: started.elapsed(),
                };
            }
            trace!(attempt, max = self.delays.len(), "Poll check not satisfied");
        }

        PollOutcome::Exhausted {
            attempts: self.delays.len(),
            elapsed: started.elapsed(),
        }
    }
}
