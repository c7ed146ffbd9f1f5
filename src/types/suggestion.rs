//! Staged Edit Suggestions
//!
//! A suggestion is a reversible proposal to replace a span of one section's
//! content. It is keyed to the conversational message that produced it and
//! transitions out of `proposed` exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a staged suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Proposed,
    Accepted,
    Rejected,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "proposed" => Some(Self::Proposed),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A staged replacement proposal for a span of a section's content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    /// Id of the conversational message that produced this suggestion.
    /// Accept/reject requests must name this id.
    pub message_id: String,
    pub report_id: String,
    pub section_id: String,
    /// Exact span of the section's content the proposal replaces
    pub original_text: String,
    pub suggested_text: String,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Suggestion {
    pub fn proposed(
        message_id: impl Into<String>,
        report_id: impl Into<String>,
        section_id: impl Into<String>,
        original_text: impl Into<String>,
        suggested_text: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            report_id: report_id.into(),
            section_id: section_id.into(),
            original_text: original_text.into(),
            suggested_text: suggested_text.into(),
            status: SuggestionStatus::Proposed,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == SuggestionStatus::Proposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            SuggestionStatus::Proposed,
            SuggestionStatus::Accepted,
            SuggestionStatus::Rejected,
        ] {
            assert_eq!(SuggestionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SuggestionStatus::parse("stale"), None);
    }

    #[test]
    fn test_proposed_is_pending() {
        let s = Suggestion::proposed("m1", "r1", "a", "old", "new");
        assert!(s.is_pending());
        assert!(s.resolved_at.is_none());
    }
}
