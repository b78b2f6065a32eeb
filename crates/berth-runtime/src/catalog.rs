//! Parsers for the runtime CLI's catalog tables
//!
//! `model list` prints a two-level table: a primary row introduces a model
//! alias together with its first variant, and indented continuation rows add
//! further variants of the same alias. `service list` prints the loaded-model
//! table, marking running models with a green dot.
//!
//! Parsing is total: malformed rows are skipped, never reported as errors.

use serde::{Deserialize, Serialize};

/// One deployable variant of a catalog model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVariant {
    /// Target device, e.g. `GPU` or `CPU`
    pub device: String,

    /// Task the variant serves, e.g. `chat-completion`
    pub task: String,

    /// Human-readable size, e.g. `8.37 GB`
    pub size: String,

    /// License identifier
    pub license: String,

    /// Identifier used to load the variant
    pub model_id: String,
}

/// A catalog model: an alias grouping one or more variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Alias shown in the catalog's primary rows
    pub alias: String,

    /// Variants in catalog order, the primary row's variant first
    pub variants: Vec<ModelVariant>,

    /// Whether any variant is currently loaded in the service
    pub is_loaded: bool,
}

/// A model reported as running by the loaded-model table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedModelRef {
    pub alias: String,
    pub model_id: String,
}

/// Marker the loaded-model table prints in front of running models
const LOADED_MARKER: char = '\u{1F7E2}';

enum ParserState {
    NoCurrentModel,
    HasCurrentModel(ModelRecord),
}

/// Parse the output of the CLI's model catalog command.
///
/// A raw line starting with whitespace is a continuation row and extends the
/// model introduced by the most recent primary row. Continuation rows with no
/// preceding primary row are skipped, as are headers, rules, blank lines, and
/// rows with too few columns.
pub fn parse_catalog(output: &str) -> Vec<ModelRecord> {
    let mut records = Vec::new();
    let mut state = ParserState::NoCurrentModel;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("Alias") || trimmed.starts_with('-') {
            continue;
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();

        if line.starts_with(char::is_whitespace) {
            if let ParserState::HasCurrentModel(record) = &mut state {
                if parts.len() >= 6 {
                    record.variants.push(ModelVariant {
                        device: parts[0].to_string(),
                        task: parts[1].to_string(),
                        size: format!("{} {}", parts[2], parts[3]),
                        license: parts[4].to_string(),
                        model_id: parts[5..].join(" "),
                    });
                }
            }
            continue;
        }

        if parts.len() < 5 {
            continue;
        }

        if let ParserState::HasCurrentModel(record) =
            std::mem::replace(&mut state, ParserState::NoCurrentModel)
        {
            records.push(record);
        }

        state = ParserState::HasCurrentModel(ModelRecord {
            alias: parts[0].to_string(),
            variants: vec![ModelVariant {
                device: parts[1].to_string(),
                task: parts[2].to_string(),
                size: format!("{} {}", parts[3], parts[4]),
                license: parts.get(5).unwrap_or(&"").to_string(),
                model_id: if parts.len() > 6 {
                    parts[6..].join(" ")
                } else {
                    String::new()
                },
            }],
            is_loaded: false,
        });
    }

    if let ParserState::HasCurrentModel(record) = state {
        records.push(record);
    }

    records
}

/// Parse the output of the CLI's loaded-model command.
///
/// Only lines carrying the green marker count; the table header repeats the
/// `Model ID` caption and is excluded explicitly.
pub fn parse_loaded_set(output: &str) -> Vec<LoadedModelRef> {
    let mut loaded = Vec::new();

    for line in output.lines() {
        if !line.contains(LOADED_MARKER) || line.contains("Model ID") {
            continue;
        }

        let cleaned = line.replace(LOADED_MARKER, "");
        let parts: Vec<&str> = cleaned.split_whitespace().collect();
        if parts.len() >= 2 {
            loaded.push(LoadedModelRef {
                alias: parts[0].to_string(),
                model_id: parts[1..].join(" "),
            });
        }
    }

    loaded
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = "\
Alias                          Device     Task               File Size    License      Model ID
-----------------------------------------------------------------------------------------------
phi-4                          GPU        chat-completion    8.37 GB      MIT          Phi-4-generic-gpu
                               CPU        chat-completion    10.16 GB     MIT          Phi-4-generic-cpu
qwen2.5-0.5b                   GPU        chat-completion    0.68 GB      apache-2.0   qwen2.5-0.5b-instruct-generic-gpu
";

    #[test]
    fn test_parse_groups_continuation_rows() {
        let records = parse_catalog(CATALOG);
        assert_eq!(records.len(), 2);

        let phi = &records[0];
        assert_eq!(phi.alias, "phi-4");
        assert_eq!(phi.variants.len(), 2);
        assert_eq!(phi.variants[0].device, "GPU");
        assert_eq!(phi.variants[0].size, "8.37 GB");
        assert_eq!(phi.variants[0].license, "MIT");
        assert_eq!(phi.variants[0].model_id, "Phi-4-generic-gpu");
        assert_eq!(phi.variants[1].device, "CPU");
        assert_eq!(phi.variants[1].size, "10.16 GB");
        assert_eq!(phi.variants[1].model_id, "Phi-4-generic-cpu");
        assert!(!phi.is_loaded);

        let qwen = &records[1];
        assert_eq!(qwen.alias, "qwen2.5-0.5b");
        assert_eq!(qwen.variants.len(), 1);
        assert_eq!(qwen.variants[0].model_id, "qwen2.5-0.5b-instruct-generic-gpu");
    }

    #[test]
    fn test_parse_preserves_catalog_order() {
        let records = parse_catalog(CATALOG);
        let aliases: Vec<&str> = records.iter().map(|r| r.alias.as_str()).collect();
        assert_eq!(aliases, vec!["phi-4", "qwen2.5-0.5b"]);
    }

    #[test]
    fn test_orphan_continuation_is_skipped() {
        let output = "   CPU        chat-completion    10.16 GB     MIT          Phi-4-generic-cpu
phi-4                          GPU        chat-completion    8.37 GB      MIT          Phi-4-generic-gpu
";
        let records = parse_catalog(output);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].variants.len(), 1);
        assert_eq!(records[0].variants[0].model_id, "Phi-4-generic-gpu");
    }

    #[test]
    fn test_short_rows_are_skipped() {
        let output = "\
phi-4                          GPU        chat-completion    8.37 GB      MIT          Phi-4-generic-gpu
broken row
   short continuation
";
        let records = parse_catalog(output);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].variants.len(), 1);
    }

    #[test]
    fn test_model_id_with_spaces_is_rejoined() {
        let output =
            "deepseek-r1    GPU    chat-completion    10.3 GB    MIT    deepseek r1 distilled\n";
        let records = parse_catalog(output);
        assert_eq!(records[0].variants[0].model_id, "deepseek r1 distilled");
    }

    #[test]
    fn test_primary_row_without_id_columns() {
        let records = parse_catalog("mistral-7b    GPU    chat-completion    4.07 GB\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].alias, "mistral-7b");
        assert_eq!(records[0].variants[0].license, "");
        assert_eq!(records[0].variants[0].model_id, "");
    }

    #[test]
    fn test_empty_and_garbage_input() {
        assert!(parse_catalog("").is_empty());
        assert!(parse_catalog("\n\n\n").is_empty());
        assert!(parse_catalog("-----\nAlias Device\nnonsense\n").is_empty());
    }

    #[test]
    fn test_parse_loaded_set() {
        let output = "\
Models running in service:
    Alias                          Model ID
\u{1F7E2}  phi-4                          Phi-4-generic-gpu
\u{1F7E2}  qwen2.5-0.5b                   qwen2.5-0.5b-instruct-generic-gpu
";
        let loaded = parse_loaded_set(output);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].alias, "phi-4");
        assert_eq!(loaded[0].model_id, "Phi-4-generic-gpu");
        assert_eq!(loaded[1].alias, "qwen2.5-0.5b");
    }

    #[test]
    fn test_loaded_set_ignores_header_and_plain_lines() {
        let output = "\
Service running on port 62171
    Alias                          Model ID
\u{1F7E2}
";
        assert!(parse_loaded_set(output).is_empty());
    }

    #[test]
    fn test_loaded_set_empty_output() {
        assert!(parse_loaded_set("").is_empty());
        assert!(parse_loaded_set("No models running\n").is_empty());
    }
}
