//! Status Command
//!
//! Display a run's current state, or list suspended runs that have gone
//! stale waiting for a decision.

use crate::cli::util::{build_engine, print_status, require_initialized};
use crate::types::{Result, ScribeError};

pub fn run(report_id: Option<&str>, format: &str, stale: bool) -> Result<()> {
    require_initialized()?;
    let (engine, config) = build_engine()?;
    let json_output = format == "json";

    if stale {
        let threshold = chrono::Duration::seconds(config.workflow.stale_after_secs);
        let runs = engine.list_stale_runs(threshold)?;
        if json_output {
            let entries: Vec<_> = runs
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "report_id": r.report_id,
                        "state": r.state,
                        "suspended_since": r.updated_at.to_rfc3339(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        } else if runs.is_empty() {
            println!("No stale runs.");
        } else {
            println!("Runs awaiting approval past the staleness threshold:");
            for run in runs {
                println!("  {} (since {})", run.report_id, run.updated_at.to_rfc3339());
            }
        }
        return Ok(());
    }

    let report_id = report_id.ok_or_else(|| {
        ScribeError::Config("Pass a report id, or --stale to list stale runs".to_string())
    })?;
    let status = engine.get_status(report_id)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }
    Ok(())
}
