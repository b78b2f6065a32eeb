//! Output formatting for the berth CLI

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON format
    Json,
    /// Compact text format
    Text,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Table
    }
}

/// Trait for types that can be formatted for output
pub trait Formattable {
    /// Format as a table row
    fn table_headers() -> Vec<String>;
    fn table_row(&self) -> Vec<String>;

    /// Format as key-value pairs for detailed view
    fn key_value_pairs(&self) -> Vec<(String, String)>;
}

/// Output formatter
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Format and print a single item
    pub fn print_item<T>(&self, item: &T) -> Result<()>
    where
        T: Serialize + Formattable,
    {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(item)?;
                println!("{}", json);
            }
            OutputFormat::Table | OutputFormat::Text => {
                // For single items, show as key-value pairs
                let pairs = item.key_value_pairs();
                for (key, value) in pairs {
                    match self.format {
                        OutputFormat::Table => {
                            println!("{}: {}", key.bold().cyan(), value);
                        }
                        OutputFormat::Text => {
                            println!("{}: {}", key, value);
                        }
                        _ => unreachable!(),
                    }
                }
            }
        }
        Ok(())
    }

    /// Format and print a list of items
    pub fn print_list<T>(&self, items: &[T]) -> Result<()>
    where
        T: Serialize + Formattable,
    {
        if items.is_empty() {
            match self.format {
                OutputFormat::Json => println!("[]"),
                OutputFormat::Table | OutputFormat::Text => {
                    println!("{}", "No items found".dimmed());
                }
            }
            return Ok(());
        }

        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(items)?;
                println!("{}", json);
            }
            OutputFormat::Table => {
                self.print_table(items)?;
            }
            OutputFormat::Text => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        println!();
                    }
                    let pairs = item.key_value_pairs();
                    for (key, value) in pairs {
                        println!("{}: {}", key, value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Print items as a table
    fn print_table<T>(&self, items: &[T]) -> Result<()>
    where
        T: Formattable,
    {
        if items.is_empty() {
            return Ok(());
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        // Add headers
        let headers = T::table_headers();
        let header_cells: Vec<Cell> = headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan))
            .collect();
        table.set_header(header_cells);

        // Add rows
        for item in items {
            let row = item.table_row();
            table.add_row(row);
        }

        println!("{}", table);
        Ok(())
    }

    /// Print a success message
    pub fn print_success(&self, message: &str) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let result = serde_json::json!({
                    "status": "success",
                    "message": message
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            OutputFormat::Table | OutputFormat::Text => {
                println!("{} {}", "✓".green().bold(), message.green());
            }
        }
        Ok(())
    }

    /// Print an error message
    pub fn print_error(&self, message: &str) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let result = serde_json::json!({
                    "status": "error",
                    "message": message
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            OutputFormat::Table | OutputFormat::Text => {
                eprintln!("{} {}", "✗".red().bold(), message.red());
            }
        }
        Ok(())
    }

    /// Print a warning message
    pub fn print_warning(&self, message: &str) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let result = serde_json::json!({
                    "status": "warning",
                    "message": message
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            OutputFormat::Table | OutputFormat::Text => {
                eprintln!("{} {}", "⚠".yellow().bold(), message.yellow());
            }
        }
        Ok(())
    }

    /// Print an info message
    pub fn print_info(&self, message: &str) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let result = serde_json::json!({
                    "status": "info",
                    "message": message
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            OutputFormat::Table | OutputFormat::Text => {
                println!("{} {}", "ℹ".blue().bold(), message.blue());
            }
        }
        Ok(())
    }

    /// Print a progress message (only for interactive formats)
    pub fn print_progress(&self, message: &str) {
        match self.format {
            OutputFormat::Table | OutputFormat::Text => {
                eprint!("{} {}...\r", "⏳".yellow(), message);
            }
            _ => {
                // Don't print progress for structured formats
            }
        }
    }

    /// Clear progress message (only for interactive formats)
    pub fn clear_progress(&self) {
        match self.format {
            OutputFormat::Table | OutputFormat::Text => {
                eprint!("\r{}\r", " ".repeat(80));
            }
            _ => {
                // Don't clear progress for structured formats
            }
        }
    }
}

/// Helper function to colorize status
pub fn colorize_status(status: &str) -> ColoredString {
    match status.to_lowercase().as_str() {
        "healthy" | "running" | "free" | "freed" | "already free" | "just freed" => status.green(),
        "unhealthy" | "stopped" | "error" | "occupied" => status.red(),
        "degraded" | "starting" | "stopping" => status.yellow(),
        "unknown" | "inactive" => status.dimmed(),
        _ => status.normal(),
    }
}
