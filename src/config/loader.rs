//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/fieldscribe/config.toml)
//! 3. Project config (.fieldscribe/config.toml)
//! 4. Environment variables (FIELDSCRIBE_* prefix)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::{debug, info};

use super::types::Config;
use crate::constants::storage;
use crate::types::{Result, ScribeError};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // e.g. FIELDSCRIBE_LLM_MODEL -> llm.model
        figment = figment.merge(Env::prefixed("FIELDSCRIBE_").split('_').lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| ScribeError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| ScribeError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/fieldscribe/)
    pub fn global_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "fieldscribe").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".fieldscribe/config.toml")
    }

    /// Get project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".fieldscribe")
    }

    /// Resolve the database path: explicit config wins, otherwise the
    /// project data directory.
    pub fn database_path(config: &Config) -> PathBuf {
        config
            .storage
            .db_path
            .clone()
            .unwrap_or_else(|| Self::project_dir().join(storage::DEFAULT_DB_FILE))
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize project configuration
    pub fn init_project(name: Option<&str>) -> Result<PathBuf> {
        let project_dir = Self::project_dir();
        fs::create_dir_all(&project_dir)?;

        let config_path = project_dir.join("config.toml");
        if !config_path.exists() {
            fs::write(&config_path, Self::default_project_config(name))?;
            info!("Created project config: {}", config_path.display());
        }

        Ok(project_dir)
    }

    /// Check if project is initialized
    pub fn is_project_initialized() -> bool {
        Self::project_dir().exists()
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Generate default project config content (TOML)
    fn default_project_config(name: Option<&str>) -> String {
        let project_name = name.unwrap_or("project");
        format!(
            r#"# FieldScribe Project Configuration
# Project-specific settings that override global defaults.

version = "1.0"

[project]
name = "{}"

# Generation provider (API key comes from OPENAI_API_KEY)
[llm]
provider = "openai"
timeout_secs = 300
temperature = 0.2

[workflow]
max_generation_attempts = 3
"#,
            project_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_file_merges_over_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[llm]
model = "gpt-4o"
temperature = 0.0
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.llm.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.llm.temperature, 0.0);
        // Untouched sections keep defaults
        assert_eq!(config.llm.provider, "openai");
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[llm]\ntemperature = 9.0\n").unwrap();
        assert!(ConfigLoader::load_from_file(&path).is_err());
    }

    #[test]
    fn test_database_path_prefers_explicit_setting() {
        let mut config = Config::default();
        assert!(
            ConfigLoader::database_path(&config)
                .ends_with(".fieldscribe/fieldscribe.db")
        );

        config.storage.db_path = Some(PathBuf::from("/tmp/custom.db"));
        assert_eq!(
            ConfigLoader::database_path(&config),
            PathBuf::from("/tmp/custom.db")
        );
    }
}
