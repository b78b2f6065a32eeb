//! # berth-core
//!
//! Shared configuration and collaborator interfaces for the berth
//! orchestrator.
//!
//! This crate provides:
//! - Orchestrator configuration with validation and sensible defaults
//! - Retry policy values shared by the runtime client and supervisor
//! - The retrieval index interface and its disabled stand-in
//!
//! ## Example
//!
//! ```rust
//! use berth_core::OrchestratorConfig;
//!
//! let config = OrchestratorConfig::default()
//!     .with_service_port(62171)
//!     .with_cli_command("foundry");
//! assert!(config.validate().is_ok());
//! ```

pub mod config;
pub mod rag;

pub use config::{
    ArbiterConfig, HealthConfig, OrchestratorConfig, RetryPolicy, TunnelConfig,
};
pub use rag::{DisabledRag, Passage, RagError, RagIndex, RagStatus};
