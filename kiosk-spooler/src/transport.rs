//! Delivery transport
//!
//! The dispatcher talks to printers only through [`Transport`], so tests can
//! script outcomes without a network.

use std::time::Duration;

use async_trait::async_trait;
use kiosk_printer::{DEFAULT_TIMEOUT, NetworkPrinter, PrintResult, Printer};
use tracing::instrument;

use crate::types::PrinterConfig;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a rendered receipt; resolves exactly once
    async fn deliver(&self, printer: &PrinterConfig, data: &[u8]) -> PrintResult<()>;

    /// Whether the printer accepts connections right now
    async fn probe(&self, printer: &PrinterConfig) -> bool;
}

/// Raw TCP delivery (port 9100 style printers)
#[derive(Debug, Clone, Copy)]
pub struct NetworkTransport {
    timeout: Duration,
}

impl NetworkTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for NetworkTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Transport for NetworkTransport {
    #[instrument(skip(self, printer, data), fields(printer = %printer.key()))]
    async fn deliver(&self, printer: &PrinterConfig, data: &[u8]) -> PrintResult<()> {
        let target = NetworkPrinter::new(&printer.ip, printer.port)?.with_timeout(self.timeout);
        target.print(data).await
    }

    async fn probe(&self, printer: &PrinterConfig) -> bool {
        match NetworkPrinter::new(&printer.ip, printer.port) {
            Ok(target) => target.is_online().await,
            Err(_) => false,
        }
    }
}
