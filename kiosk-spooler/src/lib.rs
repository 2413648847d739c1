//! # kiosk-spooler
//!
//! Receipt print spooling for kiosk terminals: WHAT to print and WHEN.
//!
//! - [`ReceiptElement`]: abstract receipt content as sent by the kiosk UI
//! - [`ReceiptRenderer`]: elements → ESC/POS bytes, with per-element
//!   failure containment
//! - [`Dispatcher`]: one priority-ordered job list per printer, at most one
//!   delivery in flight per printer, fixed-delay retries
//! - [`Transport`]: delivery seam, TCP by default
//!
//! Printer commands, codepages and the network printer itself live in
//! `kiosk-printer`.
//!
//! ## Example
//!
//! ```ignore
//! use kiosk_spooler::{Dispatcher, JobKind, PrinterConfig, Priority, ReceiptElement};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = kiosk_spooler::setup_environment()?;
//! let dispatcher = Dispatcher::new(&config);
//! let shutdown = CancellationToken::new();
//! dispatcher.spawn(shutdown.clone());
//!
//! let job_id = dispatcher.submit_job(
//!     PrinterConfig::new("192.168.1.100", 9100),
//!     vec![ReceiptElement::header("FİŞ"), ReceiptElement::text("Masa 12"), ReceiptElement::Cut],
//!     Priority::Normal,
//!     JobKind::Print,
//! )?;
//! println!("{:?}", dispatcher.get_job(&job_id).map(|j| j.status));
//! ```

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod element;
pub mod error;
pub mod logger;
pub mod queue;
pub mod renderer;
pub mod retry;
pub mod transport;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SpoolerConfig;
pub use dispatcher::{Dispatcher, TickReport};
pub use element::{
    BarcodeElement, BlankElement, HeaderElement, ImageElement, QrCodeElement, ReceiptElement,
    RuleElement, TableColumn, TableElement, TextElement,
};
pub use error::{SpoolerError, SpoolerResult};
pub use renderer::{ReceiptRenderer, encode, test_page};
pub use retry::{RetryPlacement, RetryPolicy};
pub use transport::{NetworkTransport, Transport};
pub use types::{
    JobId, JobKind, JobResult, JobStatus, PrintJob, PrinterConfig, PrinterKey, Priority,
    QueueStats,
};

/// Load `.env`, read the configuration and start logging
pub fn setup_environment() -> anyhow::Result<SpoolerConfig> {
    dotenv::dotenv().ok();
    let config = SpoolerConfig::from_env();
    logger::init_logger(&config.log_level, config.log_json, config.log_dir.as_deref())?;
    tracing::info!(
        tick_ms = config.tick_interval.as_millis() as u64,
        max_retries = config.max_retries,
        codepage = %config.codepage,
        placement = %config.retry_placement,
        "Spooler environment ready"
    );
    Ok(config)
}
