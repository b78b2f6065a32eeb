//! Orchestrator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Resolved configuration for the orchestrator.
///
/// Callers are expected to resolve values from their own sources (flags,
/// environment, files) before constructing this; nothing here reads the
/// environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Base URL of the runtime's HTTP API
    pub base_url: Url,

    /// TCP port the runtime binds locally
    pub service_port: u16,

    /// Name or path of the runtime's operator CLI
    pub cli_command: String,

    /// Timeout applied to each HTTP request
    pub request_timeout: Duration,

    /// Timeout applied to each CLI invocation
    pub cli_timeout: Duration,

    /// Health polling and lifecycle configuration
    pub health: HealthConfig,

    /// Retry policy for transient HTTP failures
    pub retry: RetryPolicy,

    /// Port arbitration configuration
    pub arbiter: ArbiterConfig,

    /// Tunnel exposure configuration
    pub tunnel: TunnelConfig,

    /// Whether a retrieval index is attached
    pub rag_enabled: bool,
}

/// Health polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Interval between background health polls
    pub interval: Duration,

    /// Timeout for a single health probe
    pub probe_timeout: Duration,

    /// Consecutive failures before a degraded runtime is declared stopped
    pub failure_threshold: u32,

    /// Attempt budget and pacing for startup health polling
    pub startup: RetryPolicy,

    /// Overall deadline for startup, independent of per-attempt timeouts
    pub startup_deadline: Duration,

    /// Grace window for a requested stop before forced termination
    pub stop_grace: Duration,
}

/// Bounded-attempt retry policy with exponential backoff.
///
/// `max_attempts` counts the initial attempt; a policy with `max_attempts: 3`
/// performs at most two retries, delayed by `base_delay` and then
/// `base_delay * multiplier`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Factor applied to the delay after each retry
    pub multiplier: f64,
}

/// Port arbitration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Timeout for each platform enumeration or termination command
    pub command_timeout: Duration,

    /// Wait before confirming that a terminated process released its socket
    pub confirm_wait: Duration,

    /// Auxiliary ports associated with the runtime, freed together on sweep
    pub sweep_ports: Vec<u16>,
}

/// Tunnel exposure configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// How long to wait for the tunnel process to announce its public URL
    pub url_timeout: Duration,

    /// Grace window for the tunnel process on close before a forced kill
    pub shutdown_timeout: Duration,
}

impl OrchestratorConfig {
    /// Set the runtime API base URL
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, url::ParseError> {
        self.base_url = Url::parse(base_url)?;
        Ok(self)
    }

    /// Set the runtime's local service port
    pub fn with_service_port(mut self, port: u16) -> Self {
        self.service_port = port;
        self
    }

    /// Set the runtime's operator CLI command
    pub fn with_cli_command(mut self, command: impl Into<String>) -> Self {
        self.cli_command = command.into();
        self
    }

    /// Set the HTTP request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry policy for transient HTTP failures
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enable or disable the retrieval index
    pub fn with_rag(mut self, enabled: bool) -> Self {
        self.rag_enabled = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.scheme() != "http" && self.base_url.scheme() != "https" {
            return Err("Base URL must use HTTP or HTTPS scheme".to_string());
        }

        if self.service_port == 0 {
            return Err("Service port must be non-zero".to_string());
        }

        if self.cli_command.trim().is_empty() {
            return Err("CLI command must not be empty".to_string());
        }

        if self.request_timeout.is_zero() || self.cli_timeout.is_zero() {
            return Err("Timeouts must be greater than zero".to_string());
        }

        if self.health.probe_timeout >= self.health.interval {
            return Err("Health probe timeout must be less than poll interval".to_string());
        }

        if self.health.failure_threshold == 0 {
            return Err("Failure threshold must be at least 1".to_string());
        }

        if self.health.startup_deadline.is_zero() {
            return Err("Startup deadline must be greater than zero".to_string());
        }

        self.retry.validate()?;
        self.health.startup.validate()?;

        Ok(())
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
        }
    }

    /// Validate the policy values
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("Retry policy must allow at least one attempt".to_string());
        }

        if self.multiplier < 1.0 {
            return Err("Retry multiplier must be at least 1.0".to_string());
        }

        Ok(())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://127.0.0.1:62171/v1").unwrap(),
            service_port: 62171,
            cli_command: "foundry".to_string(),
            request_timeout: Duration::from_secs(30),
            cli_timeout: Duration::from_secs(15),
            health: HealthConfig::default(),
            retry: RetryPolicy::default(),
            arbiter: ArbiterConfig::default(),
            tunnel: TunnelConfig::default(),
            rag_enabled: false,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            failure_threshold: 3,
            startup: RetryPolicy::new(30, Duration::from_secs(2), 1.0),
            startup_deadline: Duration::from_secs(120),
            stop_grace: Duration::from_secs(10),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(5),
            confirm_wait: Duration::from_secs(1),
            sweep_ports: vec![62171, 50477, 58130, 51601],
        }
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            url_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.base_url.as_str(), "http://127.0.0.1:62171/v1");
        assert_eq!(config.service_port, 62171);
        assert_eq!(config.cli_command, "foundry");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(!config.rag_enabled);
    }

    #[test]
    fn test_config_builder() {
        let config = OrchestratorConfig::default()
            .with_base_url("http://localhost:9000/v1")
            .unwrap()
            .with_service_port(9000)
            .with_cli_command("runtimectl")
            .with_request_timeout(Duration::from_secs(60))
            .with_rag(true);

        assert_eq!(config.base_url.as_str(), "http://localhost:9000/v1");
        assert_eq!(config.service_port, 9000);
        assert_eq!(config.cli_command, "runtimectl");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert!(config.rag_enabled);
    }

    #[test]
    fn test_config_validation() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());

        let mut config = OrchestratorConfig::default();
        config.service_port = 0;
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::default();
        config.cli_command = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::default();
        config.health.probe_timeout = Duration::from_secs(60);
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::default();
        config.request_timeout = Duration::from_secs(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_scheme_rejected() {
        let config = OrchestratorConfig::default()
            .with_base_url("ftp://example.com")
            .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.multiplier, 2.0);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_retry_policy_validation() {
        let policy = RetryPolicy::new(0, Duration::from_millis(100), 2.0);
        assert!(policy.validate().is_err());

        let policy = RetryPolicy::new(3, Duration::from_millis(100), 0.5);
        assert!(policy.validate().is_err());

        let policy = RetryPolicy::new(1, Duration::ZERO, 1.0);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_health_config_defaults() {
        let health = HealthConfig::default();
        assert_eq!(health.interval, Duration::from_secs(30));
        assert_eq!(health.probe_timeout, Duration::from_secs(5));
        assert_eq!(health.failure_threshold, 3);
        assert_eq!(health.startup.max_attempts, 30);
        assert_eq!(health.stop_grace, Duration::from_secs(10));
    }

    #[test]
    fn test_arbiter_config_defaults() {
        let arbiter = ArbiterConfig::default();
        assert_eq!(arbiter.command_timeout, Duration::from_secs(5));
        assert_eq!(arbiter.confirm_wait, Duration::from_secs(1));
        assert_eq!(arbiter.sweep_ports, vec![62171, 50477, 58130, 51601]);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = OrchestratorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: OrchestratorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.base_url, config.base_url);
        assert_eq!(back.service_port, config.service_port);
        assert_eq!(back.health.failure_threshold, config.health.failure_threshold);
    }
}
