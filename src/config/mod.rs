//! Configuration Layer
//!
//! Layered configuration: defaults, global file, project file, environment.

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{Config, LlmConfig, ProjectConfig, StorageConfig, WorkflowConfig};
