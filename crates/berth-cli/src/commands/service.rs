//! Service lifecycle commands

use crate::output::{OutputFormat, OutputFormatter};
use anyhow::Result;
use berth_core::OrchestratorConfig;
use berth_runtime::Supervisor;

/// Free the service port, start the runtime, and wait until it is healthy
pub async fn start_service(config: &OrchestratorConfig, output_format: OutputFormat) -> Result<()> {
    let formatter = OutputFormatter::new(output_format);
    let supervisor = Supervisor::new(config.clone())?;

    formatter.print_progress(&format!(
        "Starting runtime service on port {}",
        config.service_port
    ));
    let result = supervisor.start().await;
    formatter.clear_progress();
    result?;

    let snapshot = supervisor.current().await;
    formatter.print_success(&format!(
        "Runtime service is healthy at {}",
        snapshot.base_url
    ))?;
    Ok(())
}

/// Stop the runtime, forcing its port free if it outlives the grace window
pub async fn stop_service(config: &OrchestratorConfig, output_format: OutputFormat) -> Result<()> {
    let formatter = OutputFormatter::new(output_format);
    let supervisor = Supervisor::new(config.clone())?;

    formatter.print_progress("Stopping runtime service");
    let result = supervisor.stop().await;
    formatter.clear_progress();
    result?;

    formatter.print_success("Runtime service stopped")?;
    Ok(())
}
