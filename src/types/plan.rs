//! Report Plan Model
//!
//! Pure data structures describing a report's section/subsection tree,
//! ordering, and photo associations. A plan is replaced wholesale on each
//! planning pass and never partially mutated in place.
//!
//! The set of photo ids assigned to a section is a computed projection of
//! `photo_context`; it is never stored as an independent field, so the two
//! views cannot diverge.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::error::{ValidationError, ValidationKind};

/// A photo reference with the inspector's field note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoNote {
    pub photo_id: String,
    pub note: String,
}

/// One section of a report plan.
///
/// `section_id` is assigned once and never changes across planning passes;
/// `report_order` is the sole ordering key within a nesting level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub section_id: String,
    pub title: String,
    pub report_order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default)]
    pub photo_context: Vec<PhotoNote>,
    /// One nesting level only; subsections may not have subsections
    #[serde(default)]
    pub subsections: Vec<ReportSection>,
}

impl ReportSection {
    /// Derived view of the photo ids assigned to this section.
    ///
    /// Always computed from `photo_context`, never cached.
    pub fn assigned_photo_ids(&self) -> BTreeSet<&str> {
        self.photo_context
            .iter()
            .map(|p| p.photo_id.as_str())
            .collect()
    }

    /// The inputs that determine this section's draft. Two sections with
    /// equal drafting inputs produce the same draft request, so a revision
    /// that leaves them unchanged keeps the existing draft.
    pub fn drafting_inputs(&self) -> (&str, Option<&str>, &[PhotoNote]) {
        (
            self.title.as_str(),
            self.purpose.as_deref(),
            self.photo_context.as_slice(),
        )
    }

    fn validate_photo_context(&self) -> Result<(), ValidationError> {
        let mut seen = BTreeSet::new();
        for photo in &self.photo_context {
            if !seen.insert(photo.photo_id.as_str()) {
                return Err(ValidationError::new(
                    ValidationKind::DuplicatePhotoId,
                    format!(
                        "photo '{}' listed twice in section '{}'",
                        photo.photo_id, self.section_id
                    ),
                )
                .with_field(&self.section_id));
            }
        }
        Ok(())
    }
}

/// The hierarchical structure and ordering for a report, independent of
/// drafted content. Owned by a single report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPlan {
    /// Free-text rationale for the chosen structure
    pub strategy: String,
    pub sections: Vec<ReportSection>,
}

impl ReportPlan {
    /// Iterate all sections and subsections in document order:
    /// top-level sections by `report_order`, each followed by its
    /// subsections by `report_order`. Returns `(section, depth)`.
    pub fn ordered_sections(&self) -> Vec<(&ReportSection, u8)> {
        let mut top: Vec<&ReportSection> = self.sections.iter().collect();
        top.sort_by_key(|s| s.report_order);

        let mut out = Vec::new();
        for section in top {
            out.push((section, 1));
            let mut subs: Vec<&ReportSection> = section.subsections.iter().collect();
            subs.sort_by_key(|s| s.report_order);
            for sub in subs {
                out.push((sub, 2));
            }
        }
        out
    }

    /// Find a section or subsection by id
    pub fn find_section(&self, section_id: &str) -> Option<&ReportSection> {
        self.ordered_sections()
            .into_iter()
            .map(|(s, _)| s)
            .find(|s| s.section_id == section_id)
    }

    /// Total number of sections including subsections
    pub fn section_count(&self) -> usize {
        self.sections
            .iter()
            .map(|s| 1 + s.subsections.len())
            .sum()
    }

    /// Validate the plan invariants:
    /// - every `section_id` distinct across the whole tree
    /// - `report_order` unique among siblings (ties are invalid)
    /// - no duplicate photo ids within one section
    /// - at most one nesting level
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut ids = BTreeSet::new();
        Self::validate_siblings(&self.sections, &mut ids, true)?;
        Ok(())
    }

    fn validate_siblings<'a>(
        siblings: &'a [ReportSection],
        ids: &mut BTreeSet<&'a str>,
        allow_nesting: bool,
    ) -> Result<(), ValidationError> {
        let mut orders = BTreeSet::new();
        for section in siblings {
            if section.section_id.is_empty() {
                return Err(ValidationError::new(
                    ValidationKind::Schema,
                    "section with empty id",
                ));
            }
            if !ids.insert(section.section_id.as_str()) {
                return Err(ValidationError::new(
                    ValidationKind::Schema,
                    format!("duplicate section id '{}'", section.section_id),
                )
                .with_field(&section.section_id));
            }
            if !orders.insert(section.report_order) {
                return Err(ValidationError::new(
                    ValidationKind::DuplicateOrder,
                    format!(
                        "report_order {} assigned to more than one sibling",
                        section.report_order
                    ),
                )
                .with_field(&section.section_id));
            }
            section.validate_photo_context()?;

            if !section.subsections.is_empty() {
                if !allow_nesting {
                    return Err(ValidationError::new(
                        ValidationKind::Schema,
                        format!(
                            "subsection '{}' may not have subsections of its own",
                            section.section_id
                        ),
                    )
                    .with_field(&section.section_id));
                }
                Self::validate_siblings(&section.subsections, ids, false)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn section(id: &str, order: u32) -> ReportSection {
        ReportSection {
            section_id: id.to_string(),
            title: format!("Section {}", id),
            report_order: order,
            purpose: None,
            photo_context: vec![],
            subsections: vec![],
        }
    }

    fn plan(sections: Vec<ReportSection>) -> ReportPlan {
        ReportPlan {
            strategy: "test".to_string(),
            sections,
        }
    }

    #[test]
    fn test_valid_plan() {
        let p = plan(vec![section("a", 1), section("b", 2)]);
        assert!(p.validate().is_ok());
        assert_eq!(p.section_count(), 2);
    }

    #[test]
    fn test_duplicate_order_rejected() {
        let p = plan(vec![section("a", 1), section("b", 1)]);
        let err = p.validate().unwrap_err();
        assert_eq!(err.kind, ValidationKind::DuplicateOrder);
    }

    #[test]
    fn test_duplicate_section_id_rejected() {
        let p = plan(vec![section("a", 1), section("a", 2)]);
        let err = p.validate().unwrap_err();
        assert_eq!(err.kind, ValidationKind::Schema);
    }

    #[test]
    fn test_duplicate_photo_id_rejected() {
        let mut s = section("a", 1);
        s.photo_context = vec![
            PhotoNote {
                photo_id: "p1".to_string(),
                note: "crack".to_string(),
            },
            PhotoNote {
                photo_id: "p1".to_string(),
                note: "crack again".to_string(),
            },
        ];
        let err = plan(vec![s]).validate().unwrap_err();
        assert_eq!(err.kind, ValidationKind::DuplicatePhotoId);
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let mut inner = section("c", 1);
        inner.subsections = vec![section("d", 1)];
        let mut outer = section("a", 1);
        outer.subsections = vec![inner];
        let err = plan(vec![outer]).validate().unwrap_err();
        assert_eq!(err.kind, ValidationKind::Schema);
    }

    #[test]
    fn test_ordered_sections_flattening() {
        let mut a = section("a", 2);
        a.subsections = vec![section("a2", 2), section("a1", 1)];
        let b = section("b", 1);
        let p = plan(vec![a, b]);

        let order: Vec<&str> = p
            .ordered_sections()
            .into_iter()
            .map(|(s, _)| s.section_id.as_str())
            .collect();
        assert_eq!(order, vec!["b", "a", "a1", "a2"]);
    }

    #[test]
    fn test_find_section_in_subsections() {
        let mut a = section("a", 1);
        a.subsections = vec![section("a1", 1)];
        let p = plan(vec![a]);
        assert!(p.find_section("a1").is_some());
        assert!(p.find_section("missing").is_none());
    }

    #[test]
    fn test_assigned_photo_ids_is_projection() {
        let mut s = section("a", 1);
        s.photo_context = vec![
            PhotoNote {
                photo_id: "p2".to_string(),
                note: "north wall".to_string(),
            },
            PhotoNote {
                photo_id: "p1".to_string(),
                note: "roof".to_string(),
            },
        ];
        let ids = s.assigned_photo_ids();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["p1", "p2"]);
    }

    proptest! {
        /// For any valid plan, the derived photo-id set of every section
        /// equals the set of ids in its photo_context, and report_order
        /// values are unique within the plan.
        #[test]
        fn prop_plan_invariants(
            orders in proptest::collection::btree_set(0u32..100, 1..8),
            photo_ids in proptest::collection::btree_set("[a-z]{1,6}", 0..5),
        ) {
            let sections: Vec<ReportSection> = orders
                .iter()
                .enumerate()
                .map(|(i, order)| {
                    let mut s = section(&format!("s{}", i), *order);
                    if i == 0 {
                        s.photo_context = photo_ids
                            .iter()
                            .map(|id| PhotoNote { photo_id: id.clone(), note: String::new() })
                            .collect();
                    }
                    s
                })
                .collect();
            let p = plan(sections);

            prop_assert!(p.validate().is_ok());
            let derived: BTreeSet<String> = p.sections[0]
                .assigned_photo_ids()
                .into_iter()
                .map(String::from)
                .collect();
            prop_assert_eq!(derived, photo_ids);
        }
    }
}
