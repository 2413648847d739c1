//! Retry policy and schedule
//!
//! A failed delivery is either retried after a fixed delay or the job fails
//! for good. Pending retries are plain `(due, job)` entries that the
//! dispatcher drains at the start of each tick.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::types::{JobId, PrinterKey};

/// Retries after the first attempt
pub const MAX_RETRY_COUNT: u32 = 3;

/// Fixed wait before a failed job becomes pending again
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Where a job re-enters its printer queue once its retry is due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryPlacement {
    /// Head of the queue, ahead of anything that arrived meanwhile
    #[default]
    Front,
    /// Head of its own priority band, behind higher priorities
    PriorityBand,
}

impl fmt::Display for RetryPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryPlacement::Front => f.write_str("front"),
            RetryPlacement::PriorityBand => f.write_str("priority-band"),
        }
    }
}

impl FromStr for RetryPlacement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(RetryPlacement::Front),
            "priority-band" | "priority_band" | "band" => Ok(RetryPlacement::PriorityBand),
            other => Err(format!("unknown retry placement: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub placement: RetryPlacement,
}

impl RetryPolicy {
    /// Decide what happens to a job that just failed with `retry_count`
    /// retries already spent
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count < self.max_retries {
            RetryDecision::RetryAfter(self.delay)
        } else {
            RetryDecision::Exhausted
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRY_COUNT,
            delay: RETRY_DELAY,
            placement: RetryPlacement::Front,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRetry {
    pub due: Instant,
    pub job_id: JobId,
    pub printer_key: PrinterKey,
}

/// Retries waiting for their due time, ordered by due time then scheduling order
#[derive(Debug, Default)]
pub struct RetrySchedule {
    entries: BTreeMap<(Instant, u64), (JobId, PrinterKey)>,
    seq: u64,
}

impl RetrySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, job_id: JobId, printer_key: PrinterKey, due: Instant) {
        self.seq += 1;
        self.entries.insert((due, self.seq), (job_id, printer_key));
    }

    /// Remove and return every retry due at or before `now`
    pub fn take_due(&mut self, now: Instant) -> Vec<ScheduledRetry> {
        let later = self.entries.split_off(&(now, u64::MAX));
        let due = std::mem::replace(&mut self.entries, later);
        due.into_iter()
            .map(|((due, _), (job_id, printer_key))| ScheduledRetry {
                due,
                job_id,
                printer_key,
            })
            .collect()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(due, _)| *due)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
