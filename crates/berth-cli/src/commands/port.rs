//! Port management commands

use crate::output::{colorize_status, Formattable, OutputFormat, OutputFormatter};
use anyhow::Result;
use berth_core::OrchestratorConfig;
use berth_runtime::{FreeOutcome, PortArbiter};
use colored::Colorize;
use serde::Serialize;

/// Per-port result of a free sweep
#[derive(Serialize)]
struct PortRow {
    port: u16,
    outcome: String,
}

impl Formattable for PortRow {
    fn table_headers() -> Vec<String> {
        vec!["Port".to_string(), "Outcome".to_string()]
    }

    fn table_row(&self) -> Vec<String> {
        let outcome = if self.outcome.starts_with("error") {
            self.outcome.red().to_string()
        } else {
            colorize_status(&self.outcome).to_string()
        };
        vec![self.port.to_string(), outcome]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("Port".to_string(), self.port.to_string()),
            ("Outcome".to_string(), self.outcome.clone()),
        ]
    }
}

/// Free each port, terminating any listener processes found. The sweep is
/// best-effort: failed ports are reported, not fatal.
pub async fn free_ports(
    config: &OrchestratorConfig,
    ports: Vec<u16>,
    output_format: OutputFormat,
) -> Result<()> {
    let formatter = OutputFormatter::new(output_format);
    let arbiter = PortArbiter::new(config.arbiter.clone());

    // No ports requested means the configured sweep list
    let ports = if ports.is_empty() {
        config.arbiter.sweep_ports.clone()
    } else {
        ports
    };

    formatter.print_progress(&format!("Freeing {} port(s)", ports.len()));
    let results = arbiter.ensure_ports_free(&ports).await;
    formatter.clear_progress();

    let mut failures = 0;
    let rows: Vec<PortRow> = results
        .into_iter()
        .map(|(port, result)| PortRow {
            port,
            outcome: match result {
                Ok(outcome) => describe_outcome(outcome),
                Err(e) => {
                    failures += 1;
                    format!("error: {}", e)
                }
            },
        })
        .collect();

    formatter.print_list(&rows)?;
    if failures > 0 {
        formatter.print_error(&format!("{} port(s) could not be freed", failures))?;
    }
    Ok(())
}

fn describe_outcome(outcome: FreeOutcome) -> String {
    match outcome {
        FreeOutcome::AlreadyFree => "already free".to_string(),
        FreeOutcome::Freed => "freed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_outcome() {
        assert_eq!(describe_outcome(FreeOutcome::AlreadyFree), "already free");
        assert_eq!(describe_outcome(FreeOutcome::Freed), "freed");
    }

    #[test]
    fn test_port_row_formatting() {
        let row = PortRow {
            port: 62171,
            outcome: "freed".to_string(),
        };
        assert_eq!(row.key_value_pairs()[0].1, "62171");
        assert!(row.table_row()[1].contains("freed"));
    }
}
