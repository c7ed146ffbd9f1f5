pub mod document;
pub mod error;
pub mod plan;
pub mod run;
pub mod suggestion;

pub use document::{Document, DocumentBlock};
pub use error::{
    ConflictKind, FailureClassifier, GenerationError, GenerationFailureKind, Result, ResultExt,
    ScribeError, ValidationError, ValidationKind,
};
pub use plan::{PhotoNote, ReportPlan, ReportSection};
pub use run::{ApprovalDecision, ReportInput, RunState, RunStatus, WorkflowRun};
pub use suggestion::{Suggestion, SuggestionStatus};
