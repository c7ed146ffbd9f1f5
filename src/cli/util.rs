//! CLI Utilities
//!
//! Shared setup for commands: engine construction and console output.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use console::style;

use crate::ai::create_provider;
use crate::config::{Config, ConfigLoader};
use crate::report::{NoopNotifier, ReportEngine};
use crate::storage::Database;
use crate::types::{Document, PhotoNote, ReportInput, Result, RunStatus, ScribeError};

/// Fail early when the working directory has no project initialization.
pub fn require_initialized() -> Result<()> {
    if !ConfigLoader::is_project_initialized() {
        return Err(ScribeError::Config(
            "Not initialized. Run 'fieldscribe init' first.".to_string(),
        ));
    }
    Ok(())
}

/// Build the engine from the effective configuration.
pub fn build_engine() -> Result<(ReportEngine, Config)> {
    let config = ConfigLoader::load()?;
    let db = Arc::new(Database::open(ConfigLoader::database_path(&config))?);
    let provider = create_provider(&config.llm.to_provider_config())?;
    let engine = ReportEngine::new(db, provider, Arc::new(NoopNotifier))
        .with_generation_timeout(std::time::Duration::from_secs(config.llm.timeout_secs))
        .with_retry_attempts(config.workflow.max_generation_attempts);
    Ok((engine, config))
}

/// Read photo notes from a JSON file: `[{"photo_id": "...", "note": "..."}]`.
pub fn read_report_input(notes_path: &Path, structure_rules: Option<&str>) -> Result<ReportInput> {
    let raw = fs::read_to_string(notes_path)?;
    let photo_notes: Vec<PhotoNote> = serde_json::from_str(&raw)?;
    Ok(ReportInput {
        photo_notes,
        structure_rules: structure_rules.unwrap_or_default().to_string(),
    })
}

/// Print a status snapshot.
pub fn print_status(status: &RunStatus) {
    println!(
        "{} {}",
        style("Report:").bold(),
        style(&status.report_id).cyan()
    );
    println!("{} {}", style("State:").bold(), status.state);
    if let Some(plan) = &status.plan {
        println!("{} {}", style("Sections:").bold(), plan.section_count());
        for (section, depth) in plan.ordered_sections() {
            let indent = "  ".repeat(usize::from(depth));
            println!("{}- {} [{}]", indent, section.title, section.section_id);
        }
    }
    println!(
        "{} {}",
        style("Updated:").bold(),
        status.updated_at.to_rfc3339()
    );
}

/// Print the document with per-block section ids for edit targeting.
pub fn print_document(document: &Document) {
    for block in &document.blocks {
        let marker = "#".repeat(usize::from(block.level));
        println!(
            "{} {}  {}",
            style(&marker).dim(),
            style(&block.heading).bold(),
            style(format!("[{}]", block.section_id)).dim()
        );
        if block.body.is_empty() {
            println!("{}", style("(not yet drafted)").dim().italic());
        } else {
            println!("{}", block.body);
        }
        println!();
    }
}
