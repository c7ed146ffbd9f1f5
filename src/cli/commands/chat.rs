//! Chat Commands
//!
//! Converse about a report: send a message, then accept or reject any
//! suggestion it staged.

use console::style;
use uuid::Uuid;

use crate::cli::util::{build_engine, print_document, require_initialized};
use crate::report::MessageOutcome;
use crate::types::Result;

pub async fn send(report_id: &str, message: &str) -> Result<()> {
    require_initialized()?;
    let (engine, _config) = build_engine()?;

    let message_id = Uuid::new_v4().to_string();
    match engine.handle_message(report_id, &message_id, message).await? {
        MessageOutcome::SuggestionStaged(suggestion) => {
            println!(
                "{} in section [{}]",
                style("Suggested edit").yellow().bold(),
                suggestion.section_id
            );
            println!("  {} {}", style("-").red(), suggestion.original_text);
            println!("  {} {}", style("+").green(), suggestion.suggested_text);
            println!();
            println!(
                "Apply with 'fieldscribe accept {report_id} {message_id}' or discard \
                 with 'fieldscribe reject {report_id} {message_id}'"
            );
        }
        MessageOutcome::Reply(text) => {
            println!("{}", text);
        }
    }
    Ok(())
}

pub async fn accept(report_id: &str, message_id: &str) -> Result<()> {
    require_initialized()?;
    let (engine, _config) = build_engine()?;

    let document = engine.accept_suggestion(report_id, message_id).await?;
    println!("✓ Suggestion applied");
    println!();
    print_document(&document);
    Ok(())
}

pub async fn reject(report_id: &str, message_id: &str) -> Result<()> {
    require_initialized()?;
    let (engine, _config) = build_engine()?;

    engine.reject_suggestion(report_id, message_id).await?;
    println!("✓ Suggestion rejected; the report is unchanged");
    Ok(())
}
