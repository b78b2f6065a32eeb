//! Public tunnel management
//!
//! Exposes the local runtime through a third-party tunnel provider. The
//! provider process is spawned with piped output and watched until it
//! announces its public URL; after that its output is drained in the
//! background so the process never blocks on a full pipe.
//!
//! At most one tunnel is open per manager: opening again while the process
//! is alive returns the existing URL, and closing always releases the
//! process, whether or not the local service is still up.

use berth_core::config::TunnelConfig;
use serde::Serialize;
use std::fmt;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Errors that can occur while managing a tunnel
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("{0} is not installed")]
    NotInstalled(String),

    #[error("Failed to spawn tunnel: {0}")]
    Spawn(String),

    #[error("Tunnel did not announce a public URL within {0:?}")]
    UrlTimeout(Duration),

    #[error("Tunnel process error: {0}")]
    Process(String),
}

/// Supported tunnel providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TunnelProvider {
    Cloudflared,
    Ngrok,
    Localtunnel,
}

impl TunnelProvider {
    /// Program and arguments that start this provider for a local port
    fn command(&self, port: u16) -> (&'static str, Vec<String>) {
        match self {
            TunnelProvider::Cloudflared => (
                "cloudflared",
                vec![
                    "tunnel".to_string(),
                    "--url".to_string(),
                    format!("http://localhost:{}", port),
                ],
            ),
            TunnelProvider::Ngrok => (
                "ngrok",
                vec![
                    "http".to_string(),
                    port.to_string(),
                    "--log=stdout".to_string(),
                ],
            ),
            TunnelProvider::Localtunnel => (
                "npx",
                vec![
                    "localtunnel".to_string(),
                    "--port".to_string(),
                    port.to_string(),
                ],
            ),
        }
    }

    /// Whether this output line announces the public URL.
    ///
    /// cloudflared prints its URL on stderr inside a box drawing, ngrok logs
    /// a `started tunnel` record, localtunnel prints a bare `loca.lt` URL.
    fn announces_url(&self, line: &str) -> bool {
        match self {
            TunnelProvider::Cloudflared => line.contains("trycloudflare.com"),
            TunnelProvider::Ngrok => line.contains("started tunnel"),
            TunnelProvider::Localtunnel => line.contains("loca.lt"),
        }
    }
}

impl fmt::Display for TunnelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelProvider::Cloudflared => write!(f, "cloudflared"),
            TunnelProvider::Ngrok => write!(f, "ngrok"),
            TunnelProvider::Localtunnel => write!(f, "localtunnel"),
        }
    }
}

impl FromStr for TunnelProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cloudflared" => Ok(TunnelProvider::Cloudflared),
            "ngrok" => Ok(TunnelProvider::Ngrok),
            "localtunnel" => Ok(TunnelProvider::Localtunnel),
            _ => Err(format!("Unknown tunnel provider: {}", s)),
        }
    }
}

/// Public view of the manager's tunnel, if any
#[derive(Debug, Clone, Serialize)]
pub struct TunnelStatus {
    pub active: bool,
    pub provider: Option<String>,
    pub public_url: Option<String>,
    pub local_port: Option<u16>,
}

impl TunnelStatus {
    fn inactive() -> Self {
        Self {
            active: false,
            provider: None,
            public_url: None,
            local_port: None,
        }
    }
}

struct ActiveTunnel {
    provider: TunnelProvider,
    port: u16,
    url: String,
    child: Child,
}

/// Manages at most one tunnel process
pub struct TunnelManager {
    config: TunnelConfig,
    active: Mutex<Option<ActiveTunnel>>,
}

impl TunnelManager {
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config,
            active: Mutex::new(None),
        }
    }

    /// Open a tunnel to `local_port`, or return the URL of the one already
    /// open.
    pub async fn open(
        &self,
        provider: TunnelProvider,
        local_port: u16,
    ) -> Result<String, TunnelError> {
        let (program, args) = provider.command(local_port);
        self.open_with_command(provider, local_port, program, &args)
            .await
    }

    async fn open_with_command(
        &self,
        provider: TunnelProvider,
        local_port: u16,
        program: &str,
        args: &[String],
    ) -> Result<String, TunnelError> {
        let mut active = self.active.lock().await;

        if let Some(tunnel) = active.as_mut() {
            match tunnel.child.try_wait() {
                Ok(None) => {
                    debug!("Tunnel already open at {}", tunnel.url);
                    return Ok(tunnel.url.clone());
                }
                _ => {
                    info!("Previous tunnel process exited, reopening");
                    *active = None;
                }
            }
        }

        info!("Opening {} tunnel to local port {}", provider, local_port);
        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => TunnelError::NotInstalled(program.to_string()),
                _ => TunnelError::Spawn(format!("Failed to spawn {}: {}", program, e)),
            })?;

        let url = match timeout(self.config.url_timeout, watch_for_url(provider, &mut child)).await
        {
            Ok(Some(url)) => url,
            Ok(None) => {
                let _ = child.kill().await;
                return Err(TunnelError::Process(format!(
                    "{} exited before announcing a public URL",
                    program
                )));
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(TunnelError::UrlTimeout(self.config.url_timeout));
            }
        };

        info!("Tunnel open: {}", url);
        *active = Some(ActiveTunnel {
            provider,
            port: local_port,
            url: url.clone(),
            child,
        });
        Ok(url)
    }

    /// Close the tunnel if one is open. Closing with no tunnel open is a
    /// no-op.
    pub async fn close(&self) -> Result<(), TunnelError> {
        let mut active = self.active.lock().await;
        let Some(tunnel) = active.take() else {
            debug!("No tunnel open, nothing to close");
            return Ok(());
        };

        info!("Closing {} tunnel at {}", tunnel.provider, tunnel.url);
        self.shutdown(tunnel.child).await
    }

    /// Current tunnel state
    pub async fn status(&self) -> TunnelStatus {
        let mut active = self.active.lock().await;
        match active.as_mut() {
            Some(tunnel) => {
                if matches!(tunnel.child.try_wait(), Ok(None)) {
                    TunnelStatus {
                        active: true,
                        provider: Some(tunnel.provider.to_string()),
                        public_url: Some(tunnel.url.clone()),
                        local_port: Some(tunnel.port),
                    }
                } else {
                    // Tunnel process exited on its own
                    *active = None;
                    TunnelStatus::inactive()
                }
            }
            None => TunnelStatus::inactive(),
        }
    }

    async fn shutdown(&self, mut child: Child) -> Result<(), TunnelError> {
        if matches!(child.try_wait(), Ok(Some(_))) {
            return Ok(());
        }

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            // Providers deregister their public endpoint on SIGTERM
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);

            match timeout(self.config.shutdown_timeout, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!("Tunnel process exited with {}", status);
                    return Ok(());
                }
                Ok(Err(e)) => {
                    return Err(TunnelError::Process(format!(
                        "Failed to reap tunnel process: {}",
                        e
                    )))
                }
                Err(_) => warn!(
                    "Tunnel did not exit within {:?}, killing",
                    self.config.shutdown_timeout
                ),
            }
        }

        child
            .kill()
            .await
            .map_err(|e| TunnelError::Process(format!("Failed to kill tunnel process: {}", e)))
    }
}

/// Read the child's output until a line announces the provider's public URL.
/// Both streams keep draining in the background afterwards.
async fn watch_for_url(provider: TunnelProvider, child: &mut Child) -> Option<String> {
    let (tx, mut rx) = mpsc::channel::<String>(64);

    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("tunnel stdout: {}", line);
                let _ = tx.send(line).await;
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("tunnel stderr: {}", line);
                let _ = tx.send(line).await;
            }
        });
    }
    drop(tx);

    while let Some(line) = rx.recv().await {
        if provider.announces_url(&line) {
            if let Some(url) = extract_https_url(&line) {
                return Some(url);
            }
        }
    }
    None
}

/// Pull the first https URL token out of an output line
fn extract_https_url(line: &str) -> Option<String> {
    let start = line.find("https://")?;
    let token = line[start..].split_whitespace().next()?;
    let url = token.trim_end_matches(|c| matches!(c, '"' | '\'' | ',' | ')'));
    Some(url.to_string())
}
