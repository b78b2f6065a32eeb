//! Model catalog commands

use crate::output::{Formattable, OutputFormat, OutputFormatter};
use anyhow::Result;
use berth_core::OrchestratorConfig;
use berth_runtime::{ModelRecord, RuntimeClient};
use colored::Colorize;
use serde::Serialize;

/// One catalog variant, flattened for display
#[derive(Serialize)]
struct CatalogRow {
    alias: String,
    device: String,
    task: String,
    size: String,
    license: String,
    model_id: String,
    loaded: bool,
}

impl Formattable for CatalogRow {
    fn table_headers() -> Vec<String> {
        vec![
            "Alias".to_string(),
            "Device".to_string(),
            "Task".to_string(),
            "Size".to_string(),
            "License".to_string(),
            "Model ID".to_string(),
            "Loaded".to_string(),
        ]
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.alias.clone(),
            self.device.clone(),
            self.task.clone(),
            self.size.clone(),
            self.license.clone(),
            self.model_id.clone(),
            if self.loaded {
                "yes".green().to_string()
            } else {
                String::new()
            },
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("Alias".to_string(), self.alias.clone()),
            ("Device".to_string(), self.device.clone()),
            ("Task".to_string(), self.task.clone()),
            ("Size".to_string(), self.size.clone()),
            ("License".to_string(), self.license.clone()),
            ("Model ID".to_string(), self.model_id.clone()),
            ("Loaded".to_string(), self.loaded.to_string()),
        ]
    }
}

/// One running model from the service's loaded set
#[derive(Serialize)]
struct LoadedRow {
    alias: String,
    model_id: String,
}

impl Formattable for LoadedRow {
    fn table_headers() -> Vec<String> {
        vec!["Alias".to_string(), "Model ID".to_string()]
    }

    fn table_row(&self) -> Vec<String> {
        vec![self.alias.clone(), self.model_id.clone()]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("Alias".to_string(), self.alias.clone()),
            ("Model ID".to_string(), self.model_id.clone()),
        ]
    }
}

/// Flatten catalog records to one row per variant. The loaded flag is
/// record-level: every variant row of a loaded alias carries it.
fn catalog_rows(records: &[ModelRecord]) -> Vec<CatalogRow> {
    records
        .iter()
        .flat_map(|record| {
            record.variants.iter().map(move |variant| CatalogRow {
                alias: record.alias.clone(),
                device: variant.device.clone(),
                task: variant.task.clone(),
                size: variant.size.clone(),
                license: variant.license.clone(),
                model_id: variant.model_id.clone(),
                loaded: record.is_loaded,
            })
        })
        .collect()
}

/// List the model catalog, or only the models currently running
pub async fn list_models(
    config: &OrchestratorConfig,
    loaded_only: bool,
    output_format: OutputFormat,
) -> Result<()> {
    let formatter = OutputFormatter::new(output_format);
    let client = RuntimeClient::new(config.clone())?;

    if loaded_only {
        formatter.print_progress("Fetching loaded models");
        let loaded = client.loaded_models().await?;
        formatter.clear_progress();

        let rows: Vec<LoadedRow> = loaded
            .iter()
            .map(|m| LoadedRow {
                alias: m.alias.clone(),
                model_id: m.model_id.clone(),
            })
            .collect();
        formatter.print_list(&rows)?;
        return Ok(());
    }

    formatter.print_progress("Fetching model catalog");
    let records = client.list_models().await?;
    formatter.clear_progress();

    formatter.print_list(&catalog_rows(&records))?;
    Ok(())
}

/// Load a model into the runtime by id
pub async fn run_model(
    config: &OrchestratorConfig,
    model_id: String,
    output_format: OutputFormat,
) -> Result<()> {
    let formatter = OutputFormatter::new(output_format);
    let client = RuntimeClient::new(config.clone())?;

    formatter.print_progress(&format!("Loading model {}", model_id));
    client.run_model(&model_id).await?;
    formatter.clear_progress();

    formatter.print_success(&format!("Model '{}' loaded", model_id))?;
    Ok(())
}
