//! # berth-runtime
//!
//! Orchestration layer for a locally hosted model inference runtime.
//!
//! This crate provides:
//! - HTTP client for the runtime's OpenAI-compatible API with bounded retries
//! - Bridge to the runtime's operator CLI for service and catalog commands
//! - Health-polling supervisor with an explicit service state machine
//! - Port arbitration that frees a TCP port held by stale processes
//! - Catalog parsing for the CLI's model and loaded-model tables
//! - Tunnel management for exposing the local runtime publicly
//!
//! ## Example
//!
//! ```rust,no_run
//! use berth_core::OrchestratorConfig;
//! use berth_runtime::{RuntimeClient, Supervisor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OrchestratorConfig::default();
//!     config.validate().map_err(berth_runtime::RuntimeError::Configuration)?;
//!
//!     let supervisor = Arc::new(Supervisor::new(config.clone())?);
//!     supervisor.start().await?;
//!
//!     let client = RuntimeClient::new(config)?;
//!     let health = client.health_check().await?;
//!     println!("Runtime health: {:?}", health);
//!
//!     supervisor.stop().await?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

pub mod arbiter;
pub mod catalog;
pub mod client;
pub mod retry;
pub mod supervisor;
pub mod tunnel;

// Re-export main types
pub use arbiter::{ArbiterError, FreeOutcome, LeaseState, PortArbiter, PortInspector, PortLease};
pub use catalog::{parse_catalog, parse_loaded_set, LoadedModelRef, ModelRecord, ModelVariant};
pub use client::{ChatMessage, ChatRequest, ChatResponse, HealthInfo, RuntimeClient};
pub use retry::{retry_with, RetryPolicy, RetrySchedule};
pub use supervisor::{HealthSnapshot, RuntimeControl, ServiceState, Supervisor, SupervisorError};
pub use tunnel::{TunnelError, TunnelManager, TunnelProvider, TunnelStatus};

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur during runtime operations
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Runtime unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RuntimeError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RuntimeError::Connection(_)
                | RuntimeError::Timeout(_)
                | RuntimeError::Unavailable(_)
                | RuntimeError::Http(_)
        )
    }
}
