//! Export Command
//!
//! Render the report's current document as markdown, to stdout or a file.

use std::fs;
use std::path::Path;

use crate::cli::util::{build_engine, require_initialized};
use crate::types::Result;

pub fn run(report_id: &str, output: Option<&Path>) -> Result<()> {
    require_initialized()?;
    let (engine, _config) = build_engine()?;

    let markdown = engine.document(report_id)?.to_markdown();
    match output {
        Some(path) => {
            fs::write(path, &markdown)?;
            println!("✓ Wrote {}", path.display());
        }
        None => print!("{}", markdown),
    }
    Ok(())
}
