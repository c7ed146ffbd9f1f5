//! Generate Command
//!
//! Start or resume a report generation run. Safe to re-run: a suspended or
//! finished report just prints its status.

use std::path::Path;

use console::style;

use crate::cli::util::{build_engine, print_status, read_report_input, require_initialized};
use crate::types::{ReportInput, Result, RunState, ScribeError};

pub async fn run(
    report_id: &str,
    notes_path: Option<&Path>,
    structure_rules: Option<&str>,
) -> Result<()> {
    require_initialized()?;
    let (engine, _config) = build_engine()?;

    let input = match notes_path {
        Some(path) => read_report_input(path, structure_rules)?,
        None => ReportInput::default(),
    };
    if input.photo_notes.is_empty() && engine.get_status(report_id).is_err() {
        return Err(ScribeError::Config(
            "A new report needs photo notes: pass --notes <file.json>".to_string(),
        ));
    }

    println!("{}", style("Generating report...").bold());
    let status = engine.start_or_resume(report_id, input).await?;
    println!();
    print_status(&status);

    if status.state == RunState::AwaitingApproval {
        println!();
        println!(
            "Review with 'fieldscribe export {0}', then 'fieldscribe approve {0}' \
             or 'fieldscribe revise {0} --feedback ...'",
            report_id
        );
    }
    Ok(())
}
