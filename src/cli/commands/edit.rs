//! Edit Command
//!
//! Apply a direct edit to one section.

use crate::cli::util::{build_engine, print_document, require_initialized};
use crate::report::SectionEdit;
use crate::types::Result;

pub async fn run(
    report_id: &str,
    section_id: &str,
    content: Option<&str>,
    heading: Option<&str>,
    expected_version: Option<i64>,
) -> Result<()> {
    require_initialized()?;
    let (engine, _config) = build_engine()?;

    let edit = SectionEdit {
        content: content.map(String::from),
        heading: heading.map(String::from),
    };
    let document = engine
        .update_section(report_id, section_id, edit, expected_version)
        .await?;

    println!("✓ Section updated");
    println!();
    print_document(&document);
    Ok(())
}
