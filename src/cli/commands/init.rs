//! Init Command
//!
//! Initialize FieldScribe in the current directory.

use crate::config::ConfigLoader;
use crate::storage::Database;
use crate::types::{Result, ScribeError};

pub fn run(force: bool) -> Result<()> {
    let root = std::env::current_dir()?;
    let data_dir = root.join(".fieldscribe");

    if data_dir.exists() && !force {
        return Err(ScribeError::Config(
            "Already initialized. Use --force to overwrite.".to_string(),
        ));
    }

    let project_name = root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("project")
        .to_string();

    ConfigLoader::init_project(Some(&project_name))?;

    // Opening creates the schema
    let config = ConfigLoader::load()?;
    Database::open(ConfigLoader::database_path(&config))?;

    println!("✓ Initialized FieldScribe in .fieldscribe/");
    println!("  Project: {}", project_name);
    println!();
    println!("Next steps:");
    println!("  1. Export OPENAI_API_KEY");
    println!("  2. Run 'fieldscribe generate <report-id> --notes photos.json'");

    Ok(())
}
