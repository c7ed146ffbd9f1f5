//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/fieldscribe/) and project (.fieldscribe/)
//! level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ai::ProviderConfig;
use crate::constants::{generation, retry, workflow};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Project-specific settings
    pub project: ProjectConfig,

    /// Storage settings
    pub storage: StorageConfig,

    /// Generation provider settings
    pub llm: LlmConfig,

    /// Workflow tuning
    pub workflow: WorkflowConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            project: ProjectConfig::default(),
            storage: StorageConfig::default(),
            llm: LlmConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ScribeError::Config` on validation failure.
    pub fn validate(&self) -> crate::types::Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(crate::types::ScribeError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(crate::types::ScribeError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.workflow.max_generation_attempts == 0 {
            return Err(crate::types::ScribeError::Config(
                "Workflow max_generation_attempts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Project Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project name (defaults to directory name)
    pub name: Option<String>,
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path; defaults to the project data directory
    pub db_path: Option<PathBuf>,
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider type: "openai"
    pub provider: String,

    /// Model name (provider default when unset)
    pub model: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Generation temperature (0.0 = deterministic)
    pub temperature: f32,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Maximum tokens per generation
    pub max_tokens: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            timeout_secs: generation::DEFAULT_TIMEOUT_SECS,
            temperature: 0.2,
            api_base: None,
            max_tokens: 4096,
        }
    }
}

impl LlmConfig {
    /// Build the runtime provider config. The API key comes from the
    /// environment, never from config files.
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: self.provider.clone(),
            model: self.model.clone(),
            timeout_secs: self.timeout_secs,
            temperature: self.temperature,
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            api_base: self.api_base.clone(),
            max_tokens: self.max_tokens,
        }
    }
}

// =============================================================================
// Workflow Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Attempts per generation call before the run fails
    pub max_generation_attempts: usize,

    /// Suspended runs idle longer than this many seconds are listed as stale
    pub stale_after_secs: i64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_generation_attempts: retry::MAX_ATTEMPTS,
            stale_after_secs: workflow::STALE_RUN_THRESHOLD_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_bad_temperature_rejected() {
        let mut config = Config::default();
        config.llm.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.llm.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_config_round_trip() {
        let llm = LlmConfig {
            model: Some("gpt-4o".to_string()),
            temperature: 0.0,
            ..Default::default()
        };
        let provider = llm.to_provider_config();
        assert_eq!(provider.provider, "openai");
        assert_eq!(provider.model.as_deref(), Some("gpt-4o"));
        assert_eq!(provider.temperature, 0.0);
    }
}
