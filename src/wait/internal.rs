//! Listening-socket check run from inside the container.

use std::collections::BTreeSet;

use crate::container::ContainerHandle;
use crate::error::Result;

/// Kernel socket tables listing TCP sockets of the container's namespace.
const SOCKET_TABLES: [&str; 3] = ["cat", "/proc/net/tcp", "/proc/net/tcp6"];

/// `st` column value for sockets in LISTEN state.
const TCP_LISTEN: &str = "0A";

/// Extract the ports of listening sockets from `/proc/net/tcp{,6}` output.
///
/// Returns `None` when the output holds no socket table at all, so callers
/// can tell "nothing listens" apart from "could not read the table".
pub(crate) fn parse_listening_ports(output: &str) -> Option<BTreeSet<u16>> {
    let mut saw_table = false;
    let mut ports = BTreeSet::new();

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first() == Some(&"sl") {
            saw_table = true;
            continue;
        }
        if fields.len() < 4 || !fields[0].ends_with(':') {
            continue;
        }
        if fields[3] != TCP_LISTEN {
            continue;
        }
        if let Some((_, port)) = fields[1].rsplit_once(':')
            && let Ok(port) = u16::from_str_radix(port, 16)
        {
            ports.insert(port);
        }
    }

    saw_table.then_some(ports)
}

/// Probe command for images without a readable socket table.
fn fallback_probe(port: u16) -> String {
    format!(
        "nc -z -w 1 127.0.0.1 {port} || /bin/bash -c '</dev/tcp/127.0.0.1/{port}'",
        port = port
    )
}

/// Checks from inside the container that every internal port is listening.
pub struct InternalPortListeningCheck<'a> {
    container: &'a dyn ContainerHandle,
    ports: BTreeSet<u16>,
}

impl<'a> InternalPortListeningCheck<'a> {
    pub fn new(container: &'a dyn ContainerHandle, ports: BTreeSet<u16>) -> Self {
        Self { container, ports }
    }

    /// Run one probe.
    ///
    /// Anything short of positive confirmation yields `Ok(false)`. Only an
    /// exec failure (container gone, daemon unreachable) is an error.
    pub async fn call(&self) -> Result<bool> {
        if self.ports.is_empty() {
            return Ok(true);
        }

        let table = self.container.exec(&SOCKET_TABLES).await?;
        if let Some(listening) = parse_listening_ports(&table.stdout) {
            let missing: Vec<u16> = self.ports.difference(&listening).copied().collect();
            if !missing.is_empty() {
                tracing::trace!(
                    "Container '{}' not yet listening on {:?}",
                    self.container.name(),
                    missing
                );
            }
            return Ok(missing.is_empty());
        }

        tracing::trace!(
            "No socket table in '{}' (exit {:?}), probing ports directly",
            self.container.name(),
            table.exit_code
        );
        for &port in &self.ports {
            let probe = fallback_probe(port);
            let result = self.container.exec(&["/bin/sh", "-c", &probe]).await?;
            if !result.success() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
