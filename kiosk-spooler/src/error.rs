//! Spooler error types

use kiosk_printer::PrintError;
use thiserror::Error;

use crate::types::JobStatus;

#[derive(Debug, Error)]
pub enum SpoolerError {
    #[error("Invalid printer config: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Queue for {printer_key} is full ({depth} jobs)")]
    QueueFull { printer_key: String, depth: usize },

    #[error("Job {job_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Print failed: {0}")]
    Print(#[from] PrintError),

    #[error("Pipeline aborted: {0}")]
    Pipeline(String),
}

impl SpoolerError {
    /// Whether another delivery attempt could succeed
    ///
    /// A printer address the transport cannot use fails the same way every
    /// time, so the job fails without waiting out its retries.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SpoolerError::Print(PrintError::InvalidConfig(_)))
    }
}

pub type SpoolerResult<T> = Result<T, SpoolerError>;
