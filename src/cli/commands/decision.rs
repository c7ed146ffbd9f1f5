//! Approval Decision Commands
//!
//! approve / revise / cancel a run suspended for review.

use console::style;

use crate::cli::util::{build_engine, print_status, require_initialized};
use crate::types::{ApprovalDecision, Result, RunState};

pub async fn approve(report_id: &str) -> Result<()> {
    submit(report_id, ApprovalDecision::Approve).await
}

pub async fn revise(report_id: &str, feedback: &str) -> Result<()> {
    submit(
        report_id,
        ApprovalDecision::RequestRevision {
            feedback: feedback.to_string(),
        },
    )
    .await
}

pub async fn cancel(report_id: &str) -> Result<()> {
    submit(report_id, ApprovalDecision::Cancel).await
}

async fn submit(report_id: &str, decision: ApprovalDecision) -> Result<()> {
    require_initialized()?;
    let (engine, _config) = build_engine()?;

    let status = engine.submit_decision(report_id, decision).await?;
    print_status(&status);

    match status.state {
        RunState::Completed => {
            println!();
            println!(
                "{} Export with 'fieldscribe export {}'",
                style("Report finalized.").green().bold(),
                report_id
            );
        }
        RunState::AwaitingApproval => {
            println!();
            println!("Revision applied; the report awaits approval again.");
        }
        RunState::Cancelled => {
            println!();
            println!("Run cancelled.");
        }
        _ => {}
    }
    Ok(())
}
