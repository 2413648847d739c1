use std::str::FromStr;
use std::time::Duration;

use kiosk_printer::{Codepage, DEFAULT_TIMEOUT};

use crate::retry::{MAX_RETRY_COUNT, RETRY_DELAY, RetryPlacement, RetryPolicy};

/// Shortest accepted dispatch tick
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Spooler configuration
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | SPOOLER_TICK_MS | 1000 | Dispatch tick interval, at least 1 |
/// | SPOOLER_MAX_RETRIES | 3 | Retries after the first attempt |
/// | SPOOLER_RETRY_DELAY_MS | 5000 | Wait before a failed job is pending again |
/// | SPOOLER_DELIVERY_TIMEOUT_MS | 15000 | Ceiling for one delivery attempt |
/// | SPOOLER_PAPER_COLUMNS | 48 | Characters per line |
/// | SPOOLER_CODEPAGE | wpc1254 | wpc1252, wpc1254 or gbk |
/// | SPOOLER_RETRY_PLACEMENT | front | front or priority-band |
/// | SPOOLER_MAX_QUEUE_DEPTH | unset | Per-printer cap, unbounded when unset |
/// | LOG_LEVEL | info | tracing filter |
/// | LOG_JSON | false | JSON console output |
/// | LOG_DIR | unset | Daily rolling log files when set |
#[derive(Debug, Clone)]
pub struct SpoolerConfig {
    pub tick_interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub delivery_timeout: Duration,
    pub paper_columns: usize,
    pub codepage: Codepage,
    pub retry_placement: RetryPlacement,
    pub max_queue_depth: Option<usize>,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// `tokio::time::interval` panics on a zero period
fn tick_interval(interval: Duration) -> Duration {
    interval.max(MIN_TICK_INTERVAL)
}

impl SpoolerConfig {
    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            tick_interval: tick_interval(Duration::from_millis(
                env_parse("SPOOLER_TICK_MS").unwrap_or(1000),
            )),
            max_retries: env_parse("SPOOLER_MAX_RETRIES").unwrap_or(MAX_RETRY_COUNT),
            retry_delay: env_parse("SPOOLER_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(RETRY_DELAY),
            delivery_timeout: env_parse("SPOOLER_DELIVERY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TIMEOUT),
            paper_columns: env_parse("SPOOLER_PAPER_COLUMNS").unwrap_or(48),
            codepage: env_parse("SPOOLER_CODEPAGE").unwrap_or_default(),
            retry_placement: env_parse("SPOOLER_RETRY_PLACEMENT").unwrap_or_default(),
            max_queue_depth: env_parse("SPOOLER_MAX_QUEUE_DEPTH"),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_parse("LOG_JSON").unwrap_or(false),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = tick_interval(interval);
        self
    }

    pub fn with_retries(mut self, max_retries: u32, delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = delay;
        self
    }

    pub fn with_retry_placement(mut self, placement: RetryPlacement) -> Self {
        self.retry_placement = placement;
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = Some(depth);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: self.retry_delay,
            placement: self.retry_placement,
        }
    }
}

impl Default for SpoolerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
