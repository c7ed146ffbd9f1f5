//! Persistence Layer
//!
//! Pooled SQLite storage for runs, sections, and suggestions.

pub mod database;

pub use database::{Database, PlanEntry, PoolConfig, SectionRecord, SharedDatabase};
