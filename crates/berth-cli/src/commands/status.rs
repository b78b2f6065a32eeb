//! Service status command

use crate::output::{colorize_status, Formattable, OutputFormat, OutputFormatter};
use anyhow::Result;
use berth_core::{DisabledRag, OrchestratorConfig, RagIndex, RagStatus};
use berth_runtime::Supervisor;
use serde::Serialize;

/// One-shot status view assembled from a fresh health poll
#[derive(Serialize)]
struct StatusView {
    state: String,
    endpoint: String,
    checked_at: String,
    last_error: Option<String>,
    retrieval_index: String,
}

impl Formattable for StatusView {
    fn table_headers() -> Vec<String> {
        vec![
            "State".to_string(),
            "Endpoint".to_string(),
            "Checked At".to_string(),
            "Last Error".to_string(),
            "Retrieval Index".to_string(),
        ]
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            colorize_status(&self.state).to_string(),
            self.endpoint.clone(),
            self.checked_at.clone(),
            self.last_error.clone().unwrap_or_else(|| "-".to_string()),
            self.retrieval_index.clone(),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            (
                "State".to_string(),
                colorize_status(&self.state).to_string(),
            ),
            ("Endpoint".to_string(), self.endpoint.clone()),
            ("Checked At".to_string(), self.checked_at.clone()),
            (
                "Last Error".to_string(),
                self.last_error.clone().unwrap_or_else(|| "-".to_string()),
            ),
            ("Retrieval Index".to_string(), self.retrieval_index.clone()),
        ]
    }
}

/// Probe the runtime once and show the resulting status
pub async fn show_status(config: &OrchestratorConfig, output_format: OutputFormat) -> Result<()> {
    let formatter = OutputFormatter::new(output_format);

    let supervisor = Supervisor::new(config.clone())?;

    formatter.print_progress("Probing runtime health");
    let snapshot = supervisor.poll_once().await;
    formatter.clear_progress();

    // Only the disabled index ships with the CLI; a real one would slot in
    // through the RagIndex seam.
    let retrieval_index = if config.rag_enabled {
        describe_retrieval(&DisabledRag.status().await)
    } else {
        "disabled".to_string()
    };

    let view = StatusView {
        state: snapshot.state.to_string(),
        endpoint: snapshot.base_url.clone(),
        checked_at: snapshot.last_checked_at.to_rfc3339(),
        last_error: snapshot.last_error.clone(),
        retrieval_index,
    };

    formatter.print_item(&view)?;
    Ok(())
}

fn describe_retrieval(status: &RagStatus) -> String {
    if !status.available {
        "unavailable".to_string()
    } else if status.loaded {
        format!("ready ({} chunks)", status.chunk_count)
    } else {
        "available, not loaded".to_string()
    }
}
