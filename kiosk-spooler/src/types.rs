//! Job model shared by the queue, dispatcher and callers

use std::fmt;

use chrono::{DateTime, Utc};
use kiosk_printer::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::element::ReceiptElement;
use crate::error::{SpoolerError, SpoolerResult};

pub type JobId = String;

/// Dispatch priority; declared low to high so the derived order is high > normal > low
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Retrying,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// pending → processing → {completed | retrying → pending | failed}
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Retrying)
                | (Processing, Failed)
                | (Retrying, Pending)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Retrying => "retrying",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Regular receipt or a printer test page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    #[default]
    Print,
    Test,
}

/// Network printer a job is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PrinterConfig {
    #[validate(ip(message = "printer ip must be an IPv4 or IPv6 address"))]
    pub ip: String,
    #[serde(default = "default_port")]
    #[validate(range(min = 1, message = "printer port must be between 1 and 65535"))]
    pub port: u16,
    #[serde(default, alias = "name", alias = "displayName")]
    pub display_name: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl PrinterConfig {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn key(&self) -> PrinterKey {
        PrinterKey(format!("{}:{}", self.ip, self.port))
    }

    /// Display name, falling back to the address
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.ip, self.port))
    }
}

/// `ip:port`, identifies one printer queue and its in-flight lock
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrinterKey(String);

impl PrinterKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrinterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&PrinterConfig> for PrinterKey {
    fn from(config: &PrinterConfig) -> Self {
        config.key()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub elements_processed: usize,
    pub message: String,
}

/// One submitted receipt and its progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    pub printer_key: PrinterKey,
    pub printer: PrinterConfig,
    pub elements: Vec<ReceiptElement>,
    pub priority: Priority,
    pub kind: JobKind,
    pub status: JobStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub result: Option<JobResult>,
}

impl PrintJob {
    pub fn new(
        printer: PrinterConfig,
        elements: Vec<ReceiptElement>,
        priority: Priority,
        kind: JobKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("job_{}", uuid::Uuid::new_v4().simple()),
            printer_key: printer.key(),
            printer,
            elements,
            priority,
            kind,
            status: JobStatus::Pending,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            error: None,
            result: None,
        }
    }

    /// Move to `next`, refusing anything outside the job state machine
    pub fn transition(&mut self, next: JobStatus) -> SpoolerResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(SpoolerError::InvalidTransition {
                job_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Snapshot of the whole spooler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub printers: usize,
    pub pending: usize,
    pub processing: usize,
    pub retrying: usize,
    pub completed: usize,
    pub failed: usize,
    pub scheduled_retries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_status_transitions() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Retrying));
        assert!(Retrying.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_job_transition_guard() {
        let mut job = PrintJob::new(
            PrinterConfig::new("10.0.0.5", 9100),
            vec![],
            Priority::Normal,
            JobKind::Print,
        );
        assert!(job.id.starts_with("job_"));
        assert_eq!(job.printer_key.as_str(), "10.0.0.5:9100");

        job.transition(JobStatus::Processing).unwrap();
        job.transition(JobStatus::Failed).unwrap();
        let err = job.transition(JobStatus::Pending).unwrap_err();
        assert!(matches!(err, SpoolerError::InvalidTransition { .. }));
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_printer_config_validation() {
        assert!(PrinterConfig::new("192.168.1.50", 9100).validate().is_ok());
        assert!(PrinterConfig::new("", 9100).validate().is_err());
        assert!(PrinterConfig::new("192.168.1.50", 0).validate().is_err());
        assert!(PrinterConfig::new("fe80::1", 9100).validate().is_ok());
    }

    #[test]
    fn test_hostname_fails_validation() {
        // The transport only dials address literals
        let err = PrinterConfig::new("printer.local", 9100)
            .validate()
            .unwrap_err();
        assert!(err.field_errors().contains_key("ip"));
    }

    #[test]
    fn test_printer_config_from_json() {
        let config: PrinterConfig =
            serde_json::from_str(r#"{"ip":"192.168.1.50","port":9100,"name":"Kasa"}"#).unwrap();
        assert_eq!(config.label(), "Kasa");
        assert_eq!(config.key().to_string(), "192.168.1.50:9100");
    }

    #[test]
    fn test_port_defaults_to_raw_printing_port() {
        let config: PrinterConfig = serde_json::from_str(r#"{"ip":"10.0.0.7"}"#).unwrap();
        assert_eq!(config.port, 9100);
    }
}
