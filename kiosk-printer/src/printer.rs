//! Printer adapters for sending ESC/POS data
//!
//! Supports network printers (raw TCP, usually port 9100).

use crate::error::{PrintError, PrintResult};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::{Instrument, info, instrument, warn};

/// Raw printing port used by most network receipt printers
pub const DEFAULT_PORT: u16 = 9100;

/// Ceiling for one complete delivery attempt
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Trait for printer adapters
#[allow(async_fn_in_trait)]
pub trait Printer {
    /// Send raw ESC/POS data to the printer
    async fn print(&self, data: &[u8]) -> PrintResult<()>;

    /// Check if the printer is online/reachable
    async fn is_online(&self) -> bool;
}

/// Network printer (TCP port 9100)
///
/// Every print opens one connection and always closes it before returning.
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    addr: SocketAddr,
    timeout: Duration,
    probe_timeout: Duration,
}

impl NetworkPrinter {
    /// Create a new network printer from an IPv4 or IPv6 literal
    pub fn new(host: &str, port: u16) -> PrintResult<Self> {
        let ip: IpAddr = host
            .parse()
            .map_err(|_| PrintError::InvalidConfig(format!("Invalid address: {}:{}", host, port)))?;
        Ok(Self::with_addr(SocketAddr::new(ip, port)))
    }

    /// Create from a socket address string (e.g., "192.168.1.100:9100")
    pub fn from_addr(addr: &str) -> PrintResult<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| PrintError::InvalidConfig(format!("Invalid address: {}", addr)))?;
        Ok(Self::with_addr(addr))
    }

    fn with_addr(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: DEFAULT_TIMEOUT,
            probe_timeout: Duration::from_millis(500),
        }
    }

    /// Set the ceiling for a whole delivery (connect + write + close)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout used by [`Printer::is_online`]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Get the printer address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// One connection lifetime: connect, write everything, half-close and wait
/// for the kernel to flush. The stream is dropped (closed) on every return.
async fn deliver(addr: SocketAddr, data: Vec<u8>) -> PrintResult<()> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| PrintError::Connection(format!("{}: {}", addr, e)))?;

    info!("Connected, sending {} bytes", data.len());

    stream.write_all(&data).await.map_err(|e| {
        PrintError::Io(std::io::Error::new(
            e.kind(),
            format!("Write failed: {}", e),
        ))
    })?;

    stream.flush().await?;
    stream.shutdown().await?;
    Ok(())
}

impl Printer for NetworkPrinter {
    #[instrument(skip(data), fields(addr = %self.addr, data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        info!("Connecting to printer");

        // The session owns the socket and reports exactly once; aborting it
        // on timeout drops the socket.
        let (tx, rx) = oneshot::channel();
        let addr = self.addr;
        let payload = data.to_vec();
        let session = tokio::spawn(
            async move {
                let _ = tx.send(deliver(addr, payload).await);
            }
            .in_current_span(),
        );

        let outcome = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PrintError::Connection(format!(
                "{}: session ended without a result",
                self.addr
            ))),
            Err(_) => Err(PrintError::Timeout(format!(
                "{} did not accept the job within {:?}",
                self.addr, self.timeout
            ))),
        };
        session.abort();

        match &outcome {
            Ok(()) => info!("Print job sent successfully"),
            Err(e) => warn!(error = %e, "Print job failed"),
        }
        outcome
    }

    #[instrument(fields(addr = %self.addr))]
    async fn is_online(&self) -> bool {
        match tokio::time::timeout(self.probe_timeout, TcpStream::connect(self.addr)).await {
            Ok(Ok(_)) => {
                info!("Printer online");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Printer offline");
                false
            }
            Err(_) => {
                warn!("Printer check timeout");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_network_printer_new() {
        let printer = NetworkPrinter::new("192.168.1.100", 9100).unwrap();
        assert_eq!(printer.addr().port(), 9100);
        assert_eq!(printer.timeout(), DEFAULT_TIMEOUT);

        let v6 = NetworkPrinter::new("fe80::1", DEFAULT_PORT).unwrap();
        assert!(v6.addr().is_ipv6());
        assert_eq!(v6.addr().port(), DEFAULT_PORT);
    }

    #[test]
    fn test_network_printer_from_addr() {
        let printer = NetworkPrinter::from_addr("192.168.1.100:9100").unwrap();
        assert_eq!(printer.addr().port(), 9100);
    }

    #[test]
    fn test_invalid_addr() {
        assert!(matches!(
            NetworkPrinter::from_addr("invalid"),
            Err(PrintError::InvalidConfig(_))
        ));
        assert!(NetworkPrinter::new("printer.local", 9100).is_err());
    }

    #[tokio::test]
    async fn test_print_delivers_bytes_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            // read_to_end only returns once the client has closed its side
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let printer = NetworkPrinter::from_addr(&addr.to_string()).unwrap();
        printer.print(b"\x1B@hello\n").await.unwrap();

        assert_eq!(server.await.unwrap(), b"\x1B@hello\n");
    }

    #[tokio::test]
    async fn test_print_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let printer = NetworkPrinter::from_addr(&addr.to_string()).unwrap();
        let err = printer.print(b"data").await.unwrap_err();
        assert!(matches!(err, PrintError::Connection(_)), "{err}");
    }

    #[tokio::test]
    async fn test_print_times_out_when_printer_stalls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept but never read, so the socket buffers fill up
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let printer = NetworkPrinter::from_addr(&addr.to_string())
            .unwrap()
            .with_timeout(Duration::from_millis(200));
        let data = vec![0u8; 64 * 1024 * 1024];
        let err = printer.print(&data).await.unwrap_err();
        assert!(matches!(err, PrintError::Timeout(_)), "{err}");

        server.abort();
    }

    #[tokio::test]
    async fn test_is_online() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let printer = NetworkPrinter::from_addr(&addr.to_string()).unwrap();
        assert!(printer.is_online().await);

        drop(listener);
        assert!(!printer.is_online().await);
    }
}
