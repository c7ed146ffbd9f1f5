//! Database Layer with Connection Pooling and Safe Transactions
//!
//! SQLite persistence for workflow runs, section content, and suggestions:
//! - Connection pooling via r2d2 for concurrent access
//! - Compare-and-set writes on version columns (stale writes fail, never
//!   silently overwrite)
//! - Version-tracked migrations
//! - WAL mode for optimal read/write performance
//!
//! The consistency contract: the transition into `awaiting_approval`
//! persists the plan and all completed drafts in this database before the
//! state column changes, so a suspended run survives process restarts.
//! Suggestion acceptance resolves the suggestion and rewrites the target
//! section in one transaction - no partial effect.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};

use crate::types::{
    ConflictKind, ReportInput, Result, ResultExt, RunState, ScribeError, Suggestion,
    SuggestionStatus, ValidationError, WorkflowRun,
};

/// Shared database handle for async contexts.
pub type SharedDatabase = Arc<Database>;

const SCHEMA: &str = include_str!("schema.sql");

/// Current schema version for migration tracking
const SCHEMA_VERSION: u32 = 2;

/// Migration definitions
struct Migration {
    version: u32,
    description: &'static str,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Add final_document column",
        up: "ALTER TABLE workflow_runs ADD COLUMN final_document TEXT",
    },
    Migration {
        version: 2,
        description: "Add suggestion lookup index",
        up: "CREATE INDEX IF NOT EXISTS idx_suggestions_report ON suggestions(report_id, status)",
    },
];

/// One stored section row. `content` is `None` until the section is
/// drafted; an empty string never stands in for "pending".
#[derive(Debug, Clone)]
pub struct SectionRecord {
    pub section_id: String,
    pub heading: String,
    pub level: u8,
    pub content: Option<String>,
    /// Optimistic concurrency token, bumped on every write
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl SectionRecord {
    pub fn is_drafted(&self) -> bool {
        self.content.is_some()
    }
}

/// One plan section flattened for storage sync.
///
/// `retitled` marks sections whose title actually changed in the plan
/// producing this entry; only those overwrite a stored heading. A heading
/// edited by hand survives revisions that never touched its section.
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub section_id: String,
    pub heading: String,
    pub level: u8,
    pub retitled: bool,
}

/// Connection pool configuration
///
/// Pool size is dynamically calculated based on CPU cores.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: u32,
    /// Minimum idle connections to keep ready
    pub min_idle: u32,
    /// Timeout for acquiring a connection (seconds)
    pub connection_timeout_secs: u64,
}

impl PoolConfig {
    /// Minimum pool size regardless of CPU count
    const MIN_POOL_SIZE: u32 = 4;
    /// Maximum pool size regardless of CPU count
    const MAX_POOL_SIZE: u32 = 32;
    /// Multiplier for CPU cores to pool size
    const POOL_SIZE_MULTIPLIER: f32 = 2.0;

    /// Calculate optimal pool size based on available CPU cores
    pub fn optimal_pool_size() -> u32 {
        let cores = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(4);

        let calculated = (cores as f32 * Self::POOL_SIZE_MULTIPLIER) as u32;
        calculated.clamp(Self::MIN_POOL_SIZE, Self::MAX_POOL_SIZE)
    }

    /// Create config with automatic pool sizing based on CPU cores
    pub fn auto() -> Self {
        let max_size = Self::optimal_pool_size();
        Self {
            max_size,
            min_idle: (max_size / 4).max(2),
            connection_timeout_secs: 30,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::auto()
    }
}

/// Thread-safe database with connection pooling.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open database with connection pooling at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, PoolConfig::default())
    }

    /// Open database with custom pool configuration.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: PoolConfig) -> Result<Self> {
        let manager =
            SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure_connection);

        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(std::time::Duration::from_secs(
                config.connection_timeout_secs,
            ))
            .build(manager)
            .map_err(|e| {
                ScribeError::Storage(format!("Failed to create connection pool: {}", e))
            })?;

        let db = Self { pool };
        db.initialize()?;
        Ok(db)
    }

    /// Open an in-memory database for testing or temporary use.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| ScribeError::Storage(format!("Failed to create in-memory pool: {}", e)))?;

        let db = Self { pool };
        db.initialize()?;
        Ok(db)
    }

    /// Configure a new connection with production-ready settings.
    fn configure_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA cache_size = -64000;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;
        Ok(())
    }

    /// Get a connection from the pool.
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            ScribeError::Storage(format!("Failed to acquire database connection: {}", e))
        })
    }

    /// Initialize database schema.
    fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;
        let existing_version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        conn.execute_batch(SCHEMA)
            .with_context("Failed to initialize database schema")?;

        if existing_version == 0 {
            // Fresh database: schema.sql already includes every migration
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .with_context("Failed to set schema version")?;
            return Ok(());
        }

        drop(conn);
        self.migrate()
    }

    /// Run version-tracked migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;

        let current_version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        for migration in MIGRATIONS {
            if migration.version > current_version {
                conn.execute_batch(migration.up).with_context_fn(|| {
                    format!(
                        "Failed to apply migration {}: {}",
                        migration.version, migration.description
                    )
                })?;

                tracing::info!(
                    "Applied migration {}: {}",
                    migration.version,
                    migration.description
                );
            }
        }

        if current_version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .with_context("Failed to update schema version")?;
        }

        Ok(())
    }

    // =========================================================================
    // Workflow Runs
    // =========================================================================

    /// Insert a fresh run. The primary key enforces at most one live run
    /// per report.
    pub fn create_run(&self, run: &WorkflowRun) -> Result<()> {
        let conn = self.conn()?;
        let plan_json = run
            .plan
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let input_json = serde_json::to_string(&run.input)?;

        conn.execute(
            "INSERT INTO workflow_runs
                 (report_id, state, plan_json, input_json, feedback, final_document,
                  last_error, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run.report_id,
                run.state.as_str(),
                plan_json,
                input_json,
                run.feedback,
                run.final_document,
                run.last_error,
                run.version,
                run.created_at.to_rfc3339(),
                run.updated_at.to_rfc3339(),
            ],
        )?;
        tracing::debug!(report_id = %run.report_id, "Created workflow run");
        Ok(())
    }

    /// Load a run by report id. Safe to call at any time; a plain snapshot
    /// read that never blocks on an in-flight workflow step.
    pub fn load_run(&self, report_id: &str) -> Result<Option<WorkflowRun>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT report_id, state, plan_json, input_json, feedback, final_document,
                    last_error, version, created_at, updated_at
             FROM workflow_runs WHERE report_id = ?1",
            [report_id],
            Self::row_to_run,
        )
        .optional()
        .map_err(Into::into)
        .and_then(|opt| opt.transpose())
    }

    /// Persist a run with compare-and-set on its version. On success the
    /// in-memory run's version and timestamp are advanced to match the row.
    /// A concurrent writer makes this fail with a stale-write conflict.
    pub fn save_run(&self, run: &mut WorkflowRun) -> Result<()> {
        let conn = self.conn()?;
        let plan_json = run
            .plan
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = Utc::now();

        let updated = conn.execute(
            "UPDATE workflow_runs
             SET state = ?2, plan_json = ?3, feedback = ?4, final_document = ?5,
                 last_error = ?6, version = version + 1, updated_at = ?7
             WHERE report_id = ?1 AND version = ?8",
            params![
                run.report_id,
                run.state.as_str(),
                plan_json,
                run.feedback,
                run.final_document,
                run.last_error,
                now.to_rfc3339(),
                run.version,
            ],
        )?;

        if updated == 0 {
            let actual: i64 = conn
                .query_row(
                    "SELECT version FROM workflow_runs WHERE report_id = ?1",
                    [&run.report_id],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(-1);
            return Err(ConflictKind::StaleWrite {
                expected: run.version,
                actual,
            }
            .into());
        }

        run.version += 1;
        run.updated_at = now;
        Ok(())
    }

    /// Suspended runs idle longer than the threshold, oldest first.
    /// Surfaces abandoned approvals to operators; suspension has no timeout.
    pub fn list_stale_runs(&self, threshold: chrono::Duration) -> Result<Vec<WorkflowRun>> {
        let cutoff = (Utc::now() - threshold).to_rfc3339();
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT report_id, state, plan_json, input_json, feedback, final_document,
                    last_error, version, created_at, updated_at
             FROM workflow_runs
             WHERE state = ?1 AND updated_at < ?2
             ORDER BY updated_at ASC",
        )?;
        let rows = stmt.query_map(
            params![RunState::AwaitingApproval.as_str(), cutoff],
            Self::row_to_run,
        )?;
        rows.map(|r| r.map_err(Into::into).and_then(|v| v))
            .collect()
    }

    fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<WorkflowRun>> {
        let report_id: String = row.get(0)?;
        let state_str: String = row.get(1)?;
        let plan_json: Option<String> = row.get(2)?;
        let input_json: String = row.get(3)?;
        let feedback: Option<String> = row.get(4)?;
        let final_document: Option<String> = row.get(5)?;
        let last_error: Option<String> = row.get(6)?;
        let version: i64 = row.get(7)?;
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;

        Ok(build_run(
            report_id,
            state_str,
            plan_json,
            input_json,
            feedback,
            final_document,
            last_error,
            version,
            created_at,
            updated_at,
        ))
    }

    // =========================================================================
    // Report Sections
    // =========================================================================

    /// Bring the section rows in line with a plan's section set:
    /// insert rows for new sections (undrafted), refresh level on
    /// survivors without touching their content, and delete rows whose
    /// sections were removed. A survivor's stored heading is only replaced
    /// when its entry is marked `retitled`.
    pub fn sync_sections_to_plan(&self, report_id: &str, entries: &[PlanEntry]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        for entry in entries {
            let upsert = if entry.retitled {
                "INSERT INTO report_sections
                     (report_id, section_id, heading, level, content, version, updated_at)
                 VALUES (?1, ?2, ?3, ?4, NULL, 0, ?5)
                 ON CONFLICT(report_id, section_id) DO UPDATE SET
                     heading = excluded.heading,
                     level = excluded.level,
                     version = report_sections.version + 1,
                     updated_at = excluded.updated_at"
            } else {
                "INSERT INTO report_sections
                     (report_id, section_id, heading, level, content, version, updated_at)
                 VALUES (?1, ?2, ?3, ?4, NULL, 0, ?5)
                 ON CONFLICT(report_id, section_id) DO UPDATE SET
                     level = excluded.level,
                     version = report_sections.version + 1,
                     updated_at = excluded.updated_at"
            };
            tx.execute(
                upsert,
                params![report_id, entry.section_id, entry.heading, entry.level, now],
            )?;
        }

        // Remove rows for sections the plan no longer contains
        let keep_ids: Vec<&str> = entries.iter().map(|e| e.section_id.as_str()).collect();
        if keep_ids.is_empty() {
            tx.execute(
                "DELETE FROM report_sections WHERE report_id = ?1",
                [report_id],
            )?;
        } else {
            let placeholders = std::iter::repeat_n("?", keep_ids.len())
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "DELETE FROM report_sections WHERE report_id = ? AND section_id NOT IN ({})",
                placeholders
            );
            let mut sql_params: Vec<&dyn rusqlite::ToSql> = vec![&report_id];
            for id in &keep_ids {
                sql_params.push(id);
            }
            tx.execute(&sql, sql_params.as_slice())?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Clear a section's draft so the next drafting pass regenerates it.
    pub fn invalidate_section(&self, report_id: &str, section_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE report_sections
             SET content = NULL, version = version + 1, updated_at = ?3
             WHERE report_id = ?1 AND section_id = ?2",
            params![report_id, section_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Load all section rows for a report, keyed lookup left to the caller.
    pub fn load_sections(&self, report_id: &str) -> Result<Vec<SectionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT section_id, heading, level, content, version, updated_at
             FROM report_sections WHERE report_id = ?1",
        )?;
        let rows = stmt.query_map([report_id], Self::row_to_section)?;
        rows.map(|r| r.map_err(Into::into).and_then(|v| v))
            .collect()
    }

    /// Load one section row.
    pub fn load_section(&self, report_id: &str, section_id: &str) -> Result<Option<SectionRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT section_id, heading, level, content, version, updated_at
             FROM report_sections WHERE report_id = ?1 AND section_id = ?2",
            params![report_id, section_id],
            Self::row_to_section,
        )
        .optional()
        .map_err(Into::into)
        .and_then(|opt| opt.transpose())
    }

    /// Update a section's content and/or heading with compare-and-set.
    ///
    /// `expected_version` is the version the caller read; when it no longer
    /// matches the row, the write fails with a stale-write conflict and the
    /// row is left untouched. Returns the updated record.
    pub fn update_section(
        &self,
        report_id: &str,
        section_id: &str,
        content: Option<&str>,
        heading: Option<&str>,
        expected_version: i64,
    ) -> Result<SectionRecord> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE report_sections
             SET content = COALESCE(?3, content),
                 heading = COALESCE(?4, heading),
                 version = version + 1,
                 updated_at = ?5
             WHERE report_id = ?1 AND section_id = ?2 AND version = ?6",
            params![
                report_id,
                section_id,
                content,
                heading,
                Utc::now().to_rfc3339(),
                expected_version,
            ],
        )?;
        drop(conn);

        if updated == 0 {
            return match self.load_section(report_id, section_id)? {
                Some(record) => Err(ConflictKind::StaleWrite {
                    expected: expected_version,
                    actual: record.version,
                }
                .into()),
                None => Err(ValidationError::section_not_found(section_id).into()),
            };
        }

        self.load_section(report_id, section_id)?
            .ok_or_else(|| ValidationError::section_not_found(section_id).into())
    }

    fn row_to_section(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<SectionRecord>> {
        let section_id: String = row.get(0)?;
        let heading: String = row.get(1)?;
        let level: i64 = row.get(2)?;
        let content: Option<String> = row.get(3)?;
        let version: i64 = row.get(4)?;
        let updated_at: String = row.get(5)?;

        Ok(parse_ts(&updated_at).map(|updated_at| SectionRecord {
            section_id,
            heading,
            level: level.clamp(1, 2) as u8,
            content,
            version,
            updated_at,
        }))
    }

    // =========================================================================
    // Suggestions
    // =========================================================================

    /// Append a newly staged suggestion.
    pub fn insert_suggestion(&self, suggestion: &Suggestion) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO suggestions
                 (message_id, report_id, section_id, original_text, suggested_text,
                  status, created_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                suggestion.message_id,
                suggestion.report_id,
                suggestion.section_id,
                suggestion.original_text,
                suggestion.suggested_text,
                suggestion.status.as_str(),
                suggestion.created_at.to_rfc3339(),
                suggestion.resolved_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Load a suggestion by the message that produced it.
    pub fn load_suggestion(&self, message_id: &str) -> Result<Option<Suggestion>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT message_id, report_id, section_id, original_text, suggested_text,
                    status, created_at, resolved_at
             FROM suggestions WHERE message_id = ?1",
            [message_id],
            Self::row_to_suggestion,
        )
        .optional()
        .map_err(Into::into)
        .and_then(|opt| opt.transpose())
    }

    /// Mark a proposed suggestion rejected. Fails with already-resolved if
    /// it has left `proposed`, and message-not-found if it never existed.
    pub fn reject_suggestion(&self, message_id: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE suggestions SET status = ?2, resolved_at = ?3
             WHERE message_id = ?1 AND status = ?4",
            params![
                message_id,
                SuggestionStatus::Rejected.as_str(),
                Utc::now().to_rfc3339(),
                SuggestionStatus::Proposed.as_str(),
            ],
        )?;
        drop(conn);

        if updated == 0 {
            return match self.load_suggestion(message_id)? {
                Some(_) => Err(ConflictKind::AlreadyResolved.into()),
                None => Err(ValidationError::message_not_found(message_id).into()),
            };
        }
        Ok(())
    }

    /// Accept a suggestion and rewrite the target section in one
    /// transaction. Either both writes land or neither does. The section
    /// write carries the same compare-and-set guard as `update_section`.
    pub fn apply_accepted_suggestion(
        &self,
        message_id: &str,
        report_id: &str,
        section_id: &str,
        new_content: &str,
        expected_section_version: i64,
    ) -> Result<SectionRecord> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        let resolved = tx.execute(
            "UPDATE suggestions SET status = ?2, resolved_at = ?3
             WHERE message_id = ?1 AND status = ?4",
            params![
                message_id,
                SuggestionStatus::Accepted.as_str(),
                now,
                SuggestionStatus::Proposed.as_str(),
            ],
        )?;
        if resolved == 0 {
            let exists: bool = tx
                .query_row(
                    "SELECT 1 FROM suggestions WHERE message_id = ?1",
                    [message_id],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            // tx dropped without commit rolls everything back
            return if exists {
                Err(ConflictKind::AlreadyResolved.into())
            } else {
                Err(ValidationError::message_not_found(message_id).into())
            };
        }

        let updated = tx.execute(
            "UPDATE report_sections
             SET content = ?3, version = version + 1, updated_at = ?4
             WHERE report_id = ?1 AND section_id = ?2 AND version = ?5",
            params![
                report_id,
                section_id,
                new_content,
                now,
                expected_section_version,
            ],
        )?;
        if updated == 0 {
            let actual: Option<i64> = tx
                .query_row(
                    "SELECT version FROM report_sections
                     WHERE report_id = ?1 AND section_id = ?2",
                    params![report_id, section_id],
                    |row| row.get(0),
                )
                .optional()?;
            return match actual {
                Some(actual) => Err(ConflictKind::StaleWrite {
                    expected: expected_section_version,
                    actual,
                }
                .into()),
                None => Err(ValidationError::section_not_found(section_id).into()),
            };
        }

        tx.commit()?;
        drop(conn);
        self.load_section(report_id, section_id)?
            .ok_or_else(|| ValidationError::section_not_found(section_id).into())
    }

    fn row_to_suggestion(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Suggestion>> {
        let message_id: String = row.get(0)?;
        let report_id: String = row.get(1)?;
        let section_id: String = row.get(2)?;
        let original_text: String = row.get(3)?;
        let suggested_text: String = row.get(4)?;
        let status_str: String = row.get(5)?;
        let created_at: String = row.get(6)?;
        let resolved_at: Option<String> = row.get(7)?;

        Ok(build_suggestion(
            message_id,
            report_id,
            section_id,
            original_text,
            suggested_text,
            status_str,
            created_at,
            resolved_at,
        ))
    }
}

// =============================================================================
// Row Assembly Helpers
// =============================================================================

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ScribeError::Storage(format!("Invalid stored timestamp '{}': {}", raw, e)))
}

#[allow(clippy::too_many_arguments)]
fn build_run(
    report_id: String,
    state_str: String,
    plan_json: Option<String>,
    input_json: String,
    feedback: Option<String>,
    final_document: Option<String>,
    last_error: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
) -> Result<WorkflowRun> {
    let state = RunState::parse(&state_str)
        .ok_or_else(|| ScribeError::Storage(format!("Unknown run state '{}'", state_str)))?;
    let plan = plan_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;
    let input: ReportInput = serde_json::from_str(&input_json)?;

    Ok(WorkflowRun {
        report_id,
        state,
        plan,
        feedback,
        input,
        final_document,
        last_error,
        version,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

#[allow(clippy::too_many_arguments)]
fn build_suggestion(
    message_id: String,
    report_id: String,
    section_id: String,
    original_text: String,
    suggested_text: String,
    status_str: String,
    created_at: String,
    resolved_at: Option<String>,
) -> Result<Suggestion> {
    let status = SuggestionStatus::parse(&status_str).ok_or_else(|| {
        ScribeError::Storage(format!("Unknown suggestion status '{}'", status_str))
    })?;

    Ok(Suggestion {
        message_id,
        report_id,
        section_id,
        original_text,
        suggested_text,
        status,
        created_at: parse_ts(&created_at)?,
        resolved_at: resolved_at.as_deref().map(parse_ts).transpose()?,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PhotoNote, ReportPlan, ReportSection};

    fn test_run(report_id: &str) -> WorkflowRun {
        WorkflowRun::new(
            report_id,
            ReportInput {
                photo_notes: vec![PhotoNote {
                    photo_id: "p1".to_string(),
                    note: "cracked beam".to_string(),
                }],
                structure_rules: "standard residential".to_string(),
            },
        )
    }

    fn test_plan() -> ReportPlan {
        ReportPlan {
            strategy: "by area".to_string(),
            sections: vec![ReportSection {
                section_id: "a".to_string(),
                title: "Roof".to_string(),
                report_order: 1,
                purpose: None,
                photo_context: vec![],
                subsections: vec![],
            }],
        }
    }

    fn entry(section_id: &str, heading: &str, level: u8) -> PlanEntry {
        PlanEntry {
            section_id: section_id.to_string(),
            heading: heading.to_string(),
            level,
            retitled: true,
        }
    }

    #[test]
    fn test_run_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let mut run = test_run("r1");
        run.plan = Some(test_plan());
        db.create_run(&run).unwrap();

        let loaded = db.load_run("r1").unwrap().unwrap();
        assert_eq!(loaded.state, RunState::Planning);
        assert_eq!(loaded.plan, run.plan);
        assert_eq!(loaded.input, run.input);
        assert_eq!(loaded.version, 0);

        assert!(db.load_run("missing").unwrap().is_none());
    }

    #[test]
    fn test_save_run_cas_bumps_version() {
        let db = Database::open_in_memory().unwrap();
        let mut run = test_run("r1");
        db.create_run(&run).unwrap();

        run.state = RunState::Drafting;
        db.save_run(&mut run).unwrap();
        assert_eq!(run.version, 1);

        let loaded = db.load_run("r1").unwrap().unwrap();
        assert_eq!(loaded.state, RunState::Drafting);
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn test_save_run_stale_version_conflicts() {
        let db = Database::open_in_memory().unwrap();
        let mut run = test_run("r1");
        db.create_run(&run).unwrap();

        let mut stale = run.clone();
        db.save_run(&mut run).unwrap();

        stale.state = RunState::Cancelled;
        let err = db.save_run(&mut stale).unwrap_err();
        assert!(matches!(
            err,
            ScribeError::Conflict(ConflictKind::StaleWrite { .. })
        ));

        // Loser's write never landed
        let loaded = db.load_run("r1").unwrap().unwrap();
        assert_eq!(loaded.state, RunState::Planning);
    }

    #[test]
    fn test_duplicate_run_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_run(&test_run("r1")).unwrap();
        assert!(db.create_run(&test_run("r1")).is_err());
    }

    #[test]
    fn test_sync_sections_inserts_and_prunes() {
        let db = Database::open_in_memory().unwrap();
        db.sync_sections_to_plan("r1", &[entry("a", "Roof", 1), entry("b", "Walls", 1)])
            .unwrap();

        let sections = db.load_sections("r1").unwrap();
        assert_eq!(sections.len(), 2);
        assert!(sections.iter().all(|s| !s.is_drafted()));

        // Draft one, then re-sync with "b" removed and "c" added
        db.update_section("r1", "a", Some("drafted"), None, 0).unwrap();
        db.sync_sections_to_plan("r1", &[entry("a", "Roof", 1), entry("c", "Foundation", 1)])
            .unwrap();

        let sections = db.load_sections("r1").unwrap();
        let ids: Vec<&str> = sections.iter().map(|s| s.section_id.as_str()).collect();
        assert!(ids.contains(&"a") && ids.contains(&"c") && !ids.contains(&"b"));

        // Surviving section keeps its draft
        let a = db.load_section("r1", "a").unwrap().unwrap();
        assert_eq!(a.content.as_deref(), Some("drafted"));
    }

    #[test]
    fn test_sync_keeps_stored_heading_unless_retitled() {
        let db = Database::open_in_memory().unwrap();
        db.sync_sections_to_plan("r1", &[entry("a", "Roof", 1)])
            .unwrap();
        db.update_section("r1", "a", None, Some("Roof Condition"), 0)
            .unwrap();

        // Entry not marked retitled: the hand-edited heading stays
        let mut unchanged = entry("a", "Roof", 1);
        unchanged.retitled = false;
        db.sync_sections_to_plan("r1", &[unchanged]).unwrap();
        let row = db.load_section("r1", "a").unwrap().unwrap();
        assert_eq!(row.heading, "Roof Condition");

        // Retitled entry replaces it
        db.sync_sections_to_plan("r1", &[entry("a", "Roof and Gutters", 1)])
            .unwrap();
        let row = db.load_section("r1", "a").unwrap().unwrap();
        assert_eq!(row.heading, "Roof and Gutters");
    }

    #[test]
    fn test_update_section_stale_write() {
        let db = Database::open_in_memory().unwrap();
        db.sync_sections_to_plan("r1", &[entry("a", "Roof", 1)])
            .unwrap();

        let first = db.update_section("r1", "a", Some("one"), None, 0).unwrap();
        assert_eq!(first.version, 1);

        // Second write with the same stale version fails
        let err = db.update_section("r1", "a", Some("two"), None, 0).unwrap_err();
        assert!(matches!(
            err,
            ScribeError::Conflict(ConflictKind::StaleWrite {
                expected: 0,
                actual: 1
            })
        ));
        let row = db.load_section("r1", "a").unwrap().unwrap();
        assert_eq!(row.content.as_deref(), Some("one"));
    }

    #[test]
    fn test_update_missing_section_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.update_section("r1", "ghost", Some("x"), None, 0).unwrap_err();
        assert!(matches!(err, ScribeError::Validation(_)));
    }

    #[test]
    fn test_invalidate_section_clears_draft() {
        let db = Database::open_in_memory().unwrap();
        db.sync_sections_to_plan("r1", &[entry("a", "Roof", 1)])
            .unwrap();
        db.update_section("r1", "a", Some("drafted"), None, 0).unwrap();

        db.invalidate_section("r1", "a").unwrap();
        let row = db.load_section("r1", "a").unwrap().unwrap();
        assert!(!row.is_drafted());
    }

    #[test]
    fn test_suggestion_single_use_accept() {
        let db = Database::open_in_memory().unwrap();
        db.sync_sections_to_plan("r1", &[entry("a", "Roof", 1)])
            .unwrap();
        let section = db.update_section("r1", "a", Some("old text here"), None, 0).unwrap();

        let suggestion = Suggestion::proposed("m1", "r1", "a", "old text", "new text");
        db.insert_suggestion(&suggestion).unwrap();

        let updated = db
            .apply_accepted_suggestion("m1", "r1", "a", "new text here", section.version)
            .unwrap();
        assert_eq!(updated.content.as_deref(), Some("new text here"));

        // Second accept fails with already-resolved and leaves the section alone
        let err = db
            .apply_accepted_suggestion("m1", "r1", "a", "other", updated.version)
            .unwrap_err();
        assert!(matches!(
            err,
            ScribeError::Conflict(ConflictKind::AlreadyResolved)
        ));
        let row = db.load_section("r1", "a").unwrap().unwrap();
        assert_eq!(row.content.as_deref(), Some("new text here"));
    }

    #[test]
    fn test_accept_rolls_back_on_stale_section() {
        let db = Database::open_in_memory().unwrap();
        db.sync_sections_to_plan("r1", &[entry("a", "Roof", 1)])
            .unwrap();
        db.update_section("r1", "a", Some("current"), None, 0).unwrap();

        let suggestion = Suggestion::proposed("m1", "r1", "a", "current", "replacement");
        db.insert_suggestion(&suggestion).unwrap();

        // Stale section version: whole operation fails, suggestion stays proposed
        let err = db
            .apply_accepted_suggestion("m1", "r1", "a", "replacement", 0)
            .unwrap_err();
        assert!(matches!(
            err,
            ScribeError::Conflict(ConflictKind::StaleWrite { .. })
        ));
        let loaded = db.load_suggestion("m1").unwrap().unwrap();
        assert_eq!(loaded.status, SuggestionStatus::Proposed);
    }

    #[test]
    fn test_reject_unknown_message_distinct() {
        let db = Database::open_in_memory().unwrap();
        let err = db.reject_suggestion("ghost").unwrap_err();
        assert!(matches!(err, ScribeError::Validation(_)));
    }

    #[test]
    fn test_reject_then_reject_already_resolved() {
        let db = Database::open_in_memory().unwrap();
        let suggestion = Suggestion::proposed("m1", "r1", "a", "x", "y");
        db.insert_suggestion(&suggestion).unwrap();

        db.reject_suggestion("m1").unwrap();
        let err = db.reject_suggestion("m1").unwrap_err();
        assert!(matches!(
            err,
            ScribeError::Conflict(ConflictKind::AlreadyResolved)
        ));
    }

    #[test]
    fn test_list_stale_runs() {
        let db = Database::open_in_memory().unwrap();
        let mut run = test_run("r1");
        db.create_run(&run).unwrap();
        run.state = RunState::AwaitingApproval;
        db.save_run(&mut run).unwrap();

        // Fresh suspension is not stale yet
        let stale = db.list_stale_runs(chrono::Duration::hours(1)).unwrap();
        assert!(stale.is_empty());

        // Negative threshold treats everything as stale
        let stale = db.list_stale_runs(chrono::Duration::seconds(-10)).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].report_id, "r1");
    }

    #[test]
    fn test_on_disk_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fieldscribe.db");

        {
            let db = Database::open(&path).unwrap();
            let mut run = test_run("r1");
            db.create_run(&run).unwrap();
            run.state = RunState::AwaitingApproval;
            run.plan = Some(test_plan());
            db.save_run(&mut run).unwrap();
        }

        let db = Database::open(&path).unwrap();
        let loaded = db.load_run("r1").unwrap().unwrap();
        assert_eq!(loaded.state, RunState::AwaitingApproval);
        assert!(loaded.plan.is_some());
    }
}
