//! Report Generation Pipeline
//!
//! The workflow engine and its stages: planning, drafting, document
//! synchronization, staged suggestions, and status notification.

pub mod drafter;
pub mod notify;
pub mod planner;
pub mod suggestion;
pub mod sync;
pub mod workflow;

pub use drafter::SectionDrafter;
pub use notify::{BroadcastNotifier, NoopNotifier, StatusEvent, StatusNotifier};
pub use planner::{PlanGenerator, PlanRequest};
pub use suggestion::{MessageIntent, SuggestionEngine};
pub use sync::{SectionContent, SectionEdit, join_plan_with_sections, sections_to_document};
pub use workflow::{MessageOutcome, ReportEngine};
