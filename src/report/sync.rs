//! Document Synchronizer
//!
//! The single component that turns the section set into the canonical
//! document and applies section edits back onto it. Regeneration is a pure
//! function of the current plan and section rows, so the document never
//! drifts from the discrete sections it mirrors.

use crate::storage::SectionRecord;
use crate::types::{
    Document, DocumentBlock, ReportPlan, Result, ValidationError, ValidationKind,
};

/// Flat view of one section ready for document assembly: plan metadata
/// joined with the stored draft (if any).
#[derive(Debug, Clone)]
pub struct SectionContent {
    pub section_id: String,
    pub heading: String,
    pub level: u8,
    pub position: usize,
    pub body: Option<String>,
}

/// Join a plan's ordered sections with their stored rows.
///
/// The plan supplies ordering and nesting; the rows supply drafted text.
/// Sections without a row (or with a NULL draft) appear with an empty body.
pub fn join_plan_with_sections(
    plan: &ReportPlan,
    records: &[SectionRecord],
) -> Vec<SectionContent> {
    plan.ordered_sections()
        .into_iter()
        .enumerate()
        .map(|(position, (section, depth))| {
            let record = records.iter().find(|r| r.section_id == section.section_id);
            SectionContent {
                section_id: section.section_id.clone(),
                heading: record
                    .map(|r| r.heading.clone())
                    .unwrap_or_else(|| section.title.clone()),
                level: depth,
                position,
                body: record.and_then(|r| r.content.clone()),
            }
        })
        .collect()
}

/// Rebuild the canonical document from section content. Pure and
/// deterministic: equal input always yields an equal document.
pub fn sections_to_document(mut sections: Vec<SectionContent>) -> Document {
    sections.sort_by_key(|s| s.position);
    Document {
        blocks: sections
            .into_iter()
            .map(|s| DocumentBlock {
                section_id: s.section_id,
                heading: s.heading,
                level: s.level,
                body: s.body.unwrap_or_default(),
            })
            .collect(),
    }
}

/// A direct edit against one section. At least one field must be set.
#[derive(Debug, Clone, Default)]
pub struct SectionEdit {
    pub content: Option<String>,
    pub heading: Option<String>,
}

impl SectionEdit {
    /// An edit that names neither content nor heading is a caller mistake,
    /// reported distinctly rather than treated as a no-op.
    pub fn validate(&self) -> Result<()> {
        if self.content.is_none() && self.heading.is_none() {
            return Err(ValidationError::new(
                ValidationKind::MissingField,
                "section update must supply new content, a new heading, or both",
            )
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::types::{ReportSection, ScribeError};

    fn plan_section(id: &str, title: &str, order: u32) -> ReportSection {
        ReportSection {
            section_id: id.to_string(),
            title: title.to_string(),
            report_order: order,
            purpose: None,
            photo_context: vec![],
            subsections: vec![],
        }
    }

    fn record(id: &str, heading: &str, content: Option<&str>) -> SectionRecord {
        SectionRecord {
            section_id: id.to_string(),
            heading: heading.to_string(),
            level: 1,
            content: content.map(String::from),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_document_follows_plan_order() {
        let mut exterior = plan_section("ext", "Exterior", 2);
        exterior.subsections = vec![plan_section("roof", "Roof", 1)];
        let plan = ReportPlan {
            strategy: "by area".to_string(),
            sections: vec![plan_section("summary", "Summary", 1), exterior],
        };
        let records = vec![
            record("roof", "Roof", Some("Shingles curling at ridge.")),
            record("summary", "Summary", None),
        ];

        let doc = sections_to_document(join_plan_with_sections(&plan, &records));
        let ids: Vec<&str> = doc.blocks.iter().map(|b| b.section_id.as_str()).collect();
        assert_eq!(ids, vec!["summary", "ext", "roof"]);

        // Undrafted section renders with an empty body, drafted one with text
        assert_eq!(doc.block_for("summary").unwrap().body, "");
        assert_eq!(doc.block_for("ext").unwrap().body, "");
        assert!(doc.block_for("roof").unwrap().body.contains("Shingles"));
        assert_eq!(doc.block_for("roof").unwrap().level, 2);
    }

    #[test]
    fn test_stored_heading_wins_over_plan_title() {
        let plan = ReportPlan {
            strategy: "s".to_string(),
            sections: vec![plan_section("a", "Original Title", 1)],
        };
        let records = vec![record("a", "Edited Title", Some("body"))];
        let doc = sections_to_document(join_plan_with_sections(&plan, &records));
        assert_eq!(doc.blocks[0].heading, "Edited Title");
    }

    #[test]
    fn test_regeneration_is_deterministic() {
        let plan = ReportPlan {
            strategy: "s".to_string(),
            sections: vec![plan_section("b", "B", 2), plan_section("a", "A", 1)],
        };
        let records = vec![record("a", "A", Some("one")), record("b", "B", Some("two"))];
        let first = sections_to_document(join_plan_with_sections(&plan, &records));
        let second = sections_to_document(join_plan_with_sections(&plan, &records));
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_edit_rejected() {
        let err = SectionEdit::default().validate().unwrap_err();
        match err {
            ScribeError::Validation(v) => assert_eq!(v.kind, ValidationKind::MissingField),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_partial_edits_accepted() {
        assert!(SectionEdit {
            content: Some("new text".to_string()),
            heading: None,
        }
        .validate()
        .is_ok());
        assert!(SectionEdit {
            content: None,
            heading: Some("New Heading".to_string()),
        }
        .validate()
        .is_ok());
    }
}
