//! FieldScribe - AI-Assisted Field Inspection Report Generator
//!
//! A durable, resumable workflow engine that turns field photos and notes
//! into a structured inspection report with a human approval loop.
//!
//! ## Core Features
//!
//! - **Phased Pipeline**: plan the section structure, draft each section,
//!   suspend for human review, revise on feedback
//! - **Durable Suspension**: runs persist in SQLite and survive restarts;
//!   a report can wait days for approval
//! - **Staged Suggestions**: conversational edit requests become reversible
//!   accept/reject proposals, never silent changes
//! - **Conflict Safety**: per-report locking plus versioned writes keep
//!   concurrent edits from clobbering each other
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use fieldscribe::{Database, ReportEngine};
//! use fieldscribe::ai::create_provider;
//! use fieldscribe::report::NoopNotifier;
//!
//! let db = Arc::new(Database::open(".fieldscribe/fieldscribe.db")?);
//! let provider = create_provider(&config.llm.to_provider_config())?;
//! let engine = ReportEngine::new(db, provider, Arc::new(NoopNotifier));
//! let status = engine.start_or_resume("report-42", input).await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: generation provider abstraction, output validation, timeouts
//! - [`report`]: the workflow engine and its stages
//! - [`storage`]: SQLite persistence with connection pooling
//! - [`config`]: layered configuration
//! - [`types`]: domain model and error taxonomy

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod report;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{Result, ResultExt, ScribeError};

// Storage
pub use storage::database::PoolConfig;
pub use storage::{Database, SharedDatabase};

// =============================================================================
// Engine Re-exports
// =============================================================================

pub use report::{
    BroadcastNotifier, MessageOutcome, NoopNotifier, ReportEngine, SectionEdit, StatusNotifier,
};

pub use types::{
    ApprovalDecision, Document, ReportInput, ReportPlan, RunState, RunStatus, WorkflowRun,
};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    GenerationProvider, LlmResponse, OpenAiProvider, ProviderConfig, SharedProvider,
    create_provider, with_timeout,
};
