//! Service supervision
//!
//! Owns the runtime's lifecycle state machine and the health snapshot behind
//! it. The snapshot is an immutable value replaced wholesale on each poll:
//! readers clone a handle under a briefly held lock and never wait on network
//! I/O. A failed poll is routine while the runtime warms up, so polling never
//! returns errors; failures fold into `Degraded` and, after a sustained run,
//! `Stopped`.

use crate::arbiter::PortArbiter;
use crate::client::{HealthInfo, RuntimeClient};
use crate::retry::RetrySchedule;
use crate::{ArbiterError, Result, RuntimeError};

use async_trait::async_trait;
use berth_core::OrchestratorConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tracing::{debug, info, warn};

/// Cadence of the still-running checks during a graceful stop
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors that can occur while starting or stopping the runtime
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Startup timed out after {attempts} attempt(s) in {elapsed:?}")]
    StartupTimeout { attempts: u32, elapsed: Duration },

    #[error("Stop timed out: {0}")]
    StopTimeout(String),

    #[error("Port arbitration failed: {0}")]
    Arbiter(#[from] ArbiterError),

    #[error("Runtime operation failed: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Lifecycle state of the supervised runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    Unknown,
    Starting,
    Healthy,
    Degraded,
    Stopping,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Unknown => write!(f, "unknown"),
            ServiceState::Starting => write!(f, "starting"),
            ServiceState::Healthy => write!(f, "healthy"),
            ServiceState::Degraded => write!(f, "degraded"),
            ServiceState::Stopping => write!(f, "stopping"),
            ServiceState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Immutable point-in-time view of service health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub state: ServiceState,

    /// When the snapshot was installed
    pub last_checked_at: DateTime<Utc>,

    /// Message from the most recent failed check, cleared on success
    pub last_error: Option<String>,

    pub base_url: String,
}

/// Control surface the supervisor needs from the runtime
#[async_trait]
pub trait RuntimeControl: Send + Sync {
    async fn health_check(&self) -> Result<HealthInfo>;
    async fn start_service(&self) -> Result<()>;
    async fn stop_service(&self) -> Result<()>;
}

#[async_trait]
impl RuntimeControl for RuntimeClient {
    async fn health_check(&self) -> Result<HealthInfo> {
        RuntimeClient::health_check(self).await
    }

    async fn start_service(&self) -> Result<()> {
        RuntimeClient::start_service(self).await
    }

    async fn stop_service(&self) -> Result<()> {
        RuntimeClient::stop_service(self).await
    }
}

/// Supervises the runtime service: startup, health polling, shutdown.
///
/// The supervisor exclusively owns the snapshot; collaborators read it
/// through [`Supervisor::current`] and never mutate state directly.
pub struct Supervisor {
    config: OrchestratorConfig,
    control: Arc<dyn RuntimeControl>,
    arbiter: PortArbiter,
    snapshot: RwLock<Arc<HealthSnapshot>>,
    consecutive_failures: AtomicU32,
}

impl Supervisor {
    /// Create a supervisor over the real runtime client
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        let control = Arc::new(RuntimeClient::new(config.clone())?);
        let arbiter = PortArbiter::new(config.arbiter.clone());
        Ok(Self::with_parts(config, control, arbiter))
    }

    /// Create a supervisor over explicit collaborators
    pub fn with_parts(
        config: OrchestratorConfig,
        control: Arc<dyn RuntimeControl>,
        arbiter: PortArbiter,
    ) -> Self {
        let snapshot = HealthSnapshot {
            state: ServiceState::Unknown,
            last_checked_at: Utc::now(),
            last_error: None,
            base_url: config.base_url.to_string(),
        };

        Self {
            config,
            control,
            arbiter,
            snapshot: RwLock::new(Arc::new(snapshot)),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Last cached snapshot. Never triggers network I/O.
    pub async fn current(&self) -> Arc<HealthSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Perform one health check and atomically replace the snapshot.
    ///
    /// Never returns an error: a failed check is folded into the state
    /// machine instead.
    pub async fn poll_once(&self) -> Arc<HealthSnapshot> {
        let observed = self.control.health_check().await;
        let previous = self.current().await.state;

        let (state, last_error) = match observed {
            Ok(health) if health.healthy => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                let next = match previous {
                    ServiceState::Stopping => ServiceState::Stopping,
                    ServiceState::Stopped => ServiceState::Stopped,
                    _ => ServiceState::Healthy,
                };
                (next, None)
            }
            Ok(health) => {
                self.fold_failure(previous, format!("runtime reported {}", health.status))
            }
            Err(e) => self.fold_failure(previous, e.to_string()),
        };

        self.install(state, last_error).await
    }

    fn fold_failure(
        &self,
        previous: ServiceState,
        message: String,
    ) -> (ServiceState, Option<String>) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Health check failed ({} consecutive): {}", failures, message);

        let next = match previous {
            ServiceState::Healthy => ServiceState::Degraded,
            ServiceState::Degraded if failures >= self.config.health.failure_threshold => {
                ServiceState::Stopped
            }
            ServiceState::Degraded => ServiceState::Degraded,
            other => other,
        };
        (next, Some(message))
    }

    /// Bring the runtime from stopped to healthy.
    ///
    /// Frees the service port, asks the CLI to start the service, then polls
    /// health until ready. Gives up when the attempt budget or the startup
    /// deadline runs out, whichever comes first.
    pub async fn start(&self) -> std::result::Result<(), SupervisorError> {
        info!("Starting runtime service on port {}", self.config.service_port);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.install(ServiceState::Starting, None).await;

        if let Err(e) = self.arbiter.ensure_port_free(self.config.service_port).await {
            self.install(ServiceState::Stopped, Some(e.to_string())).await;
            return Err(SupervisorError::Arbiter(e));
        }

        if let Err(e) = self.control.start_service().await {
            self.install(ServiceState::Stopped, Some(e.to_string())).await;
            return Err(SupervisorError::Runtime(e));
        }

        let started = Instant::now();
        let deadline = started + self.config.health.startup_deadline;
        let mut schedule = RetrySchedule::new(&self.config.health.startup);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let snapshot = self.poll_once().await;
            if snapshot.state == ServiceState::Healthy {
                info!("Runtime became healthy after {} attempt(s)", attempts);
                return Ok(());
            }

            match schedule.next() {
                Some(delay) if Instant::now() + delay < deadline => sleep(delay).await,
                _ => break,
            }
        }

        let elapsed = started.elapsed();
        self.install(
            ServiceState::Stopped,
            Some("startup deadline exceeded".to_string()),
        )
        .await;
        Err(SupervisorError::StartupTimeout { attempts, elapsed })
    }

    /// Stop the runtime, first gracefully through the CLI, then by freeing
    /// its port if it keeps answering past the grace window.
    pub async fn stop(&self) -> std::result::Result<(), SupervisorError> {
        info!("Stopping runtime service");
        self.install(ServiceState::Stopping, None).await;

        if let Err(e) = self.control.stop_service().await {
            warn!("Graceful stop request failed: {}", e);
        }

        let deadline = Instant::now() + self.config.health.stop_grace;
        loop {
            if self.control.health_check().await.is_err() {
                debug!("Runtime no longer answering, stop confirmed");
                break;
            }

            if Instant::now() >= deadline {
                warn!(
                    "Runtime still answering after {:?}, forcing its port free",
                    self.config.health.stop_grace
                );
                if let Err(e) = self.arbiter.ensure_port_free(self.config.service_port).await {
                    let message = e.to_string();
                    self.install(ServiceState::Stopping, Some(message.clone()))
                        .await;
                    return Err(SupervisorError::StopTimeout(message));
                }
                break;
            }

            sleep(STOP_POLL_INTERVAL).await;
        }

        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.install(ServiceState::Stopped, None).await;
        Ok(())
    }

    /// Spawn a background task polling health on the configured interval
    pub fn spawn_polling(self: &Arc<Self>) -> JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(supervisor.config.health.interval);
            loop {
                ticker.tick().await;
                supervisor.poll_once().await;
            }
        })
    }

    async fn install(&self, state: ServiceState, last_error: Option<String>) -> Arc<HealthSnapshot> {
        let snapshot = Arc::new(HealthSnapshot {
            state,
            last_checked_at: Utc::now(),
            last_error,
            base_url: self.config.base_url.to_string(),
        });

        let previous = {
            let mut guard = self.snapshot.write().await;
            std::mem::replace(&mut *guard, snapshot.clone())
        };
        if previous.state != state {
            info!("Service state: {} -> {}", previous.state, state);
        }

        snapshot
    }
}
