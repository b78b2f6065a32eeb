//! Port arbitration
//!
//! Guarantees a TCP port is unbound before the runtime binds it, by
//! enumerating listener processes through the platform's socket inspection
//! tooling and force-terminating them. Platform differences live behind
//! [`PortInspector`], selected once when the arbiter is constructed.
//!
//! Freeing a port kills whatever process holds it, related or not; callers
//! decide when that risk is acceptable. A race window remains between the
//! free confirmation and the caller's own bind: another process can claim
//! the port in between, so a bind failure immediately after a successful
//! free should be treated as retryable.

use async_trait::async_trait;
use berth_core::config::ArbiterConfig;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Errors that can occur during port arbitration
#[derive(Error, Debug)]
pub enum ArbiterError {
    #[error("Listener enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("Processes still hold the port after termination: {pids:?}")]
    TerminationFailed { pids: Vec<u32> },
}

/// Occupancy state of an arbitrated port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LeaseState {
    Free,
    Occupied,
    JustFreed,
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseState::Free => write!(f, "free"),
            LeaseState::Occupied => write!(f, "occupied"),
            LeaseState::JustFreed => write!(f, "just freed"),
        }
    }
}

/// Point-in-time view of a port, created by a scan and mutated by
/// termination. The view is best-effort: the port can change hands the
/// instant after the check.
#[derive(Debug, Clone, Serialize)]
pub struct PortLease {
    pub port: u16,

    /// First owning process, when occupied
    pub owning_pid: Option<u32>,

    pub state: LeaseState,
}

impl PortLease {
    /// Mark the lease released after its owners were terminated
    pub fn mark_freed(&mut self) {
        self.owning_pid = None;
        self.state = LeaseState::JustFreed;
    }
}

/// Result of a successful [`PortArbiter::ensure_port_free`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FreeOutcome {
    /// No process held the port; nothing was terminated
    AlreadyFree,

    /// One or more holders were terminated and the port is now unbound
    Freed,
}

/// Platform capability for finding and terminating port holders
#[async_trait]
pub trait PortInspector: Send + Sync {
    /// Return the pids of processes listening on `port`
    async fn enumerate_listeners(&self, port: u16) -> Result<Vec<u32>, ArbiterError>;

    /// Terminate `pid`, escalating as the platform allows
    async fn terminate(&self, pid: u32) -> Result<(), ArbiterError>;
}

/// Frees TCP ports held by stale processes.
///
/// Termination of multiple owners is attempted independently; one owner's
/// failure never skips the next. The final verdict comes from re-enumerating
/// the port after a confirmation wait: a retained socket is the failure
/// condition, whatever the individual signals reported.
pub struct PortArbiter {
    config: ArbiterConfig,
    inspector: Arc<dyn PortInspector>,
}

impl PortArbiter {
    /// Create an arbiter backed by this platform's inspector
    pub fn new(config: ArbiterConfig) -> Self {
        let inspector = platform_inspector(&config);
        Self { config, inspector }
    }

    /// Create an arbiter backed by the given inspector
    pub fn with_inspector(config: ArbiterConfig, inspector: Arc<dyn PortInspector>) -> Self {
        Self { config, inspector }
    }

    /// Scan a port without touching its holders
    pub async fn scan(&self, port: u16) -> Result<PortLease, ArbiterError> {
        let owners = self.inspector.enumerate_listeners(port).await?;
        Ok(PortLease {
            port,
            owning_pid: owners.first().copied(),
            state: if owners.is_empty() {
                LeaseState::Free
            } else {
                LeaseState::Occupied
            },
        })
    }

    /// Ensure no process is listening on `port`, terminating holders if
    /// necessary.
    pub async fn ensure_port_free(&self, port: u16) -> Result<FreeOutcome, ArbiterError> {
        let owners = self.inspector.enumerate_listeners(port).await?;
        if owners.is_empty() {
            debug!("Port {} is already free", port);
            return Ok(FreeOutcome::AlreadyFree);
        }

        let mut lease = PortLease {
            port,
            owning_pid: owners.first().copied(),
            state: LeaseState::Occupied,
        };

        info!("Port {} held by pid(s) {:?}, terminating", port, owners);
        for pid in &owners {
            if let Err(err) = self.inspector.terminate(*pid).await {
                warn!("Termination of pid {} on port {} failed: {}", pid, port, err);
            }
        }

        sleep(self.config.confirm_wait).await;

        let survivors = self.inspector.enumerate_listeners(port).await?;
        if !survivors.is_empty() {
            return Err(ArbiterError::TerminationFailed { pids: survivors });
        }

        lease.mark_freed();
        info!("Port {} freed", lease.port);
        Ok(FreeOutcome::Freed)
    }

    /// Free each port in turn, collecting per-port results. One port's
    /// failure does not stop the sweep.
    pub async fn ensure_ports_free(
        &self,
        ports: &[u16],
    ) -> Vec<(u16, Result<FreeOutcome, ArbiterError>)> {
        let mut results = Vec::with_capacity(ports.len());
        for &port in ports {
            results.push((port, self.ensure_port_free(port).await));
        }
        results
    }
}

#[cfg(unix)]
fn platform_inspector(config: &ArbiterConfig) -> Arc<dyn PortInspector> {
    Arc::new(UnixInspector {
        command_timeout: config.command_timeout,
        confirm_wait: config.confirm_wait,
    })
}

#[cfg(not(unix))]
fn platform_inspector(config: &ArbiterConfig) -> Arc<dyn PortInspector> {
    Arc::new(WindowsInspector {
        command_timeout: config.command_timeout,
    })
}

/// Inspector using `lsof` for enumeration and signals for termination
#[cfg(unix)]
pub struct UnixInspector {
    command_timeout: std::time::Duration,
    confirm_wait: std::time::Duration,
}

#[cfg(unix)]
impl UnixInspector {
    /// Poll for process exit until `confirm_wait` elapses
    async fn wait_for_exit(&self, pid: nix::unistd::Pid) -> bool {
        let deadline = std::time::Instant::now() + self.confirm_wait;
        loop {
            if matches!(
                nix::sys::signal::kill(pid, None),
                Err(nix::errno::Errno::ESRCH)
            ) {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}

#[cfg(unix)]
#[async_trait]
impl PortInspector for UnixInspector {
    async fn enumerate_listeners(&self, port: u16) -> Result<Vec<u32>, ArbiterError> {
        let command = tokio::process::Command::new("lsof")
            .args(["-t", &format!("-iTCP:{}", port), "-sTCP:LISTEN"])
            .output();

        // lsof exits non-zero with empty output when nothing matches
        match tokio::time::timeout(self.command_timeout, command).await {
            Ok(Ok(output)) => Ok(parse_pid_lines(&String::from_utf8_lossy(&output.stdout))),
            Ok(Err(e)) => Err(ArbiterError::EnumerationFailed(format!(
                "lsof failed to run: {}",
                e
            ))),
            Err(_) => Err(ArbiterError::EnumerationFailed(format!(
                "lsof timed out after {:?}",
                self.command_timeout
            ))),
        }
    }

    async fn terminate(&self, pid: u32) -> Result<(), ArbiterError> {
        use nix::errno::Errno;
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let target = Pid::from_raw(pid as i32);

        debug!("Sending SIGTERM to pid {}", pid);
        match signal::kill(target, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!("SIGTERM to pid {} failed: {}", pid, e),
        }
        if self.wait_for_exit(target).await {
            return Ok(());
        }

        debug!("Pid {} survived SIGTERM, sending SIGKILL", pid);
        match signal::kill(target, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!("SIGKILL to pid {} failed: {}", pid, e),
        }
        if self.wait_for_exit(target).await {
            return Ok(());
        }

        Err(ArbiterError::TerminationFailed { pids: vec![pid] })
    }
}

/// Inspector using `netstat -ano` and `taskkill`
#[cfg(not(unix))]
pub struct WindowsInspector {
    command_timeout: std::time::Duration,
}

#[cfg(not(unix))]
#[async_trait]
impl PortInspector for WindowsInspector {
    async fn enumerate_listeners(&self, port: u16) -> Result<Vec<u32>, ArbiterError> {
        let command = tokio::process::Command::new("netstat").arg("-ano").output();

        match tokio::time::timeout(self.command_timeout, command).await {
            Ok(Ok(output)) => Ok(parse_netstat_listeners(
                &String::from_utf8_lossy(&output.stdout),
                port,
            )),
            Ok(Err(e)) => Err(ArbiterError::EnumerationFailed(format!(
                "netstat failed to run: {}",
                e
            ))),
            Err(_) => Err(ArbiterError::EnumerationFailed(format!(
                "netstat timed out after {:?}",
                self.command_timeout
            ))),
        }
    }

    async fn terminate(&self, pid: u32) -> Result<(), ArbiterError> {
        debug!("Running taskkill for pid {}", pid);
        let command = tokio::process::Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .output();

        match tokio::time::timeout(self.command_timeout, command).await {
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                // A pid that exited on its own counts as terminated
                if output.status.success() || stderr.contains("not found") {
                    Ok(())
                } else {
                    Err(ArbiterError::TerminationFailed { pids: vec![pid] })
                }
            }
            _ => Err(ArbiterError::TerminationFailed { pids: vec![pid] }),
        }
    }
}

/// Parse one pid per line, as printed by `lsof -t`
fn parse_pid_lines(output: &str) -> Vec<u32> {
    let mut pids = Vec::new();
    for line in output.lines() {
        if let Ok(pid) = line.trim().parse::<u32>() {
            if pid != 0 && !pids.contains(&pid) {
                pids.push(pid);
            }
        }
    }
    pids
}

/// Extract the pids of LISTENING sockets on `port` from `netstat -ano`
/// output. The pid is the last column; pid 0 belongs to the system idle
/// process and is never targeted.
#[cfg_attr(unix, allow(dead_code))]
fn parse_netstat_listeners(output: &str, port: u16) -> Vec<u32> {
    let needle = format!(":{}", port);
    let mut pids = Vec::new();
    for line in output.lines() {
        if !line.contains(&needle) || !line.contains("LISTENING") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }
        if let Some(pid) = parts.last().and_then(|p| p.parse::<u32>().ok()) {
            if pid != 0 && !pids.contains(&pid) {
                pids.push(pid);
            }
        }
    }
    pids
}
