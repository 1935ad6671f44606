//! TCP connect check run from the caller's network stack.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::error::{Result, WaitError};

/// Socket errors that mean "nothing accepts there yet" rather than a
/// misconfiguration.
fn is_transient(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::TimedOut
    )
}

/// Checks that every liveness port accepts a TCP connection on the host.
pub struct ExternalPortListeningCheck {
    host: String,
    ports: BTreeSet<u16>,
    connect_timeout: Duration,
}

impl ExternalPortListeningCheck {
    pub fn new(host: impl Into<String>, ports: BTreeSet<u16>, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            ports,
            connect_timeout,
        }
    }

    /// Run one probe across all ports; the first unreachable port ends it.
    pub async fn call(&self) -> Result<bool> {
        for &port in &self.ports {
            if !self.probe(port).await? {
                tracing::trace!("{}:{} not accepting connections yet", self.host, port);
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn probe(&self, port: u16) -> Result<bool> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((self.host.as_str(), port))
            .await
            .map_err(|e| self.connect_error(port, e))?
            .collect();

        if addrs.is_empty() {
            return Err(self.connect_error(
                port,
                std::io::Error::new(ErrorKind::NotFound, "host resolved to no addresses"),
            ));
        }

        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addrs[..])).await {
            // The stream is dropped here, closing the socket.
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(e)) if is_transient(e.kind()) => Ok(false),
            Ok(Err(e)) => Err(self.connect_error(port, e)),
            Err(_) => Ok(false),
        }
    }

    fn connect_error(&self, port: u16, source: std::io::Error) -> WaitError {
        WaitError::Connect {
            address: self.host.clone(),
            port,
            source,
        }
    }
}
