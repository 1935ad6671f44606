//! Test doubles for exercising wait strategies without a Docker daemon.
//!
//! Provides:
//! - [`StubContainer`]: a scripted [`ContainerHandle`] with exec call counting
//! - [`proc_net_tcp`]: renders a `/proc/net/tcp` table listing given ports
//!
//! # Usage
//!
//! ```rust,no_run
//! use portwait::testing::{StubContainer, proc_net_tcp};
//! use portwait::container::ExecResult;
//!
//! let container = StubContainer::new()
//!     .with_port(80, 8080)
//!     .with_exec_output(ExecResult {
//!         exit_code: Some(0),
//!         stdout: proc_net_tcp(&[80]),
//!         stderr: String::new(),
//!     });
//! ```

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::container::{ContainerHandle, ExecResult};
use crate::error::{Result, WaitError};

/// Render a minimal `/proc/net/tcp` table with one LISTEN row per port.
pub fn proc_net_tcp(listening: &[u16]) -> String {
    let mut out = String::from(
        "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n",
    );
    for (i, port) in listening.iter().enumerate() {
        out.push_str(&format!(
            "{:>4}: 00000000:{:04X} 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 {} 1\n",
            i,
            port,
            10000 + i
        ));
    }
    out
}

/// A scripted container handle.
///
/// Exec responses are served in the order they were added; the last one is
/// repeated once the script runs out. With no script every exec returns an
/// empty socket table.
pub struct StubContainer {
    id: String,
    name: String,
    host: String,
    ports: BTreeMap<u16, u16>,
    unmapped: Vec<u16>,
    liveness: Option<BTreeSet<u16>>,
    script: Mutex<VecDeque<std::result::Result<ExecResult, String>>>,
    exec_calls: AtomicU32,
}

impl StubContainer {
    /// Create a stub with no ports on `127.0.0.1`.
    pub fn new() -> Self {
        Self {
            id: "stub-id".to_string(),
            name: "stub".to_string(),
            host: "127.0.0.1".to_string(),
            ports: BTreeMap::new(),
            unmapped: Vec::new(),
            liveness: None,
            script: Mutex::new(VecDeque::new()),
            exec_calls: AtomicU32::new(0),
        }
    }

    /// Set the container name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the host address.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Expose `internal` and bind it to host port `external`.
    pub fn with_port(mut self, internal: u16, external: u16) -> Self {
        self.ports.insert(internal, external);
        self
    }

    /// Expose `internal` without any host binding.
    pub fn with_unmapped_port(mut self, internal: u16) -> Self {
        self.unmapped.push(internal);
        self
    }

    /// Override the liveness ports (defaults to every mapped port).
    pub fn with_liveness_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.liveness = Some(ports.into_iter().collect());
        self
    }

    /// Append an exec response to the script.
    pub fn with_exec_output(self, output: ExecResult) -> Self {
        self.push(Ok(output));
        self
    }

    /// Append an exec mechanism failure to the script.
    pub fn with_exec_error(self, reason: impl Into<String>) -> Self {
        self.push(Err(reason.into()));
        self
    }

    /// Append a successful socket table listing the given internal ports.
    pub fn with_listening(self, ports: &[u16]) -> Self {
        self.with_exec_output(ExecResult {
            exit_code: Some(0),
            stdout: proc_net_tcp(ports),
            stderr: String::new(),
        })
    }

    fn push(&self, entry: std::result::Result<ExecResult, String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(entry);
        }
    }

    /// Number of exec calls made so far.
    pub fn exec_calls(&self) -> u32 {
        self.exec_calls.load(Ordering::SeqCst)
    }
}

impl Default for StubContainer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerHandle for StubContainer {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn exposed_ports(&self) -> Vec<u16> {
        let mut exposed: Vec<u16> = self.ports.keys().copied().collect();
        exposed.extend(&self.unmapped);
        exposed.sort_unstable();
        exposed
    }

    fn mapped_port(&self, exposed: u16) -> Result<u16> {
        self.ports
            .get(&exposed)
            .copied()
            .ok_or_else(|| WaitError::PortMapping {
                port: exposed,
                reason: "no host binding".to_string(),
            })
    }

    fn liveness_check_ports(&self) -> BTreeSet<u16> {
        self.liveness
            .clone()
            .unwrap_or_else(|| self.ports.values().copied().collect())
    }

    async fn exec(&self, _cmd: &[&str]) -> Result<ExecResult> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);

        let next = {
            let mut script = self.script.lock().map_err(|_| WaitError::Exec {
                container: self.name.clone(),
                reason: "stub script poisoned".to_string(),
            })?;
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };

        match next {
            Some(Ok(output)) => Ok(output),
            Some(Err(reason)) => Err(WaitError::Exec {
                container: self.name.clone(),
                reason,
            }),
            None => Ok(ExecResult {
                exit_code: Some(0),
                stdout: proc_net_tcp(&[]),
                stderr: String::new(),
            }),
        }
    }
}
