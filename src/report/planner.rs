//! Plan Generator
//!
//! Produces a complete report plan from photo notes and structure rules via
//! one schema-validated generation call. Revision passes feed the prior plan
//! and the human feedback back in; the provider echoes the ids of sections
//! it keeps, so section identity survives replanning.
//!
//! Every pass returns a whole new plan. Output that fails schema or model
//! validation is an invalid-output generation failure and retried within
//! the bounded policy.

use std::collections::BTreeMap;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::ai::{SharedProvider, with_timeout};
use crate::constants::{generation, retry};
use crate::types::{
    GenerationError, PhotoNote, ReportInput, ReportPlan, ReportSection, Result,
};

/// Inputs for one planning pass
#[derive(Debug)]
pub struct PlanRequest<'a> {
    pub input: &'a ReportInput,
    /// Plan from the previous pass, present on revision
    pub prior_plan: Option<&'a ReportPlan>,
    /// Human revision instruction, present on revision
    pub feedback: Option<&'a str>,
}

// Wire shape the provider is asked to produce. `section_id` is only set
// for sections carried over from the prior plan.
#[derive(Debug, Deserialize)]
struct WirePlan {
    strategy: String,
    sections: Vec<WireSection>,
}

#[derive(Debug, Deserialize)]
struct WireSection {
    #[serde(default)]
    section_id: Option<String>,
    title: String,
    #[serde(default)]
    purpose: Option<String>,
    #[serde(default)]
    photo_ids: Vec<String>,
    #[serde(default)]
    subsections: Vec<WireSection>,
}

/// Generates and revises report plans through the provider
pub struct PlanGenerator {
    provider: SharedProvider,
    timeout: Duration,
    max_attempts: usize,
}

impl PlanGenerator {
    pub fn new(provider: SharedProvider) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(generation::DEFAULT_TIMEOUT_SECS),
            max_attempts: retry::MAX_ATTEMPTS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Run one planning pass and return a validated plan.
    #[instrument(skip_all, fields(provider = self.provider.name(), revision = request.prior_plan.is_some()))]
    pub async fn generate(&self, request: &PlanRequest<'_>) -> Result<ReportPlan> {
        let prompt = self.build_prompt(request);
        let schema = Self::plan_schema();

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(retry::BASE_DELAY_MS))
            .with_max_delay(Duration::from_secs(retry::MAX_DELAY_SECS))
            .with_max_times(self.max_attempts.saturating_sub(1));

        let plan = (|| async {
            let response = with_timeout(
                self.timeout,
                self.provider.generate(&prompt, &schema),
                "plan generation",
            )
            .await?;
            debug!(tokens = response.usage.total(), "Plan generation call completed");
            self.parse_plan(response.content, request)
        })
        .retry(backoff)
        .when(|e| e.is_recoverable())
        .notify(|err, delay| {
            warn!(error = %err, delay_ms = delay.as_millis() as u64, "Retrying plan generation");
        })
        .await?;

        debug!(sections = plan.section_count(), "Plan accepted");
        Ok(plan)
    }

    fn build_prompt(&self, request: &PlanRequest<'_>) -> String {
        let mut prompt = String::from(
            "You are planning the section structure of a field inspection report.\n\
             Group the photos below into a coherent report outline. Every photo id \
             must be assigned to exactly the sections where its observation belongs; \
             do not invent photo ids. Subsections may not nest further.\n\n",
        );

        prompt.push_str("## Photo notes\n");
        for photo in &request.input.photo_notes {
            prompt.push_str(&format!("- {}: {}\n", photo.photo_id, photo.note));
        }

        if !request.input.structure_rules.is_empty() {
            prompt.push_str("\n## Structure rules\n");
            prompt.push_str(&request.input.structure_rules);
            prompt.push('\n');
        }

        if let Some(prior) = request.prior_plan {
            prompt.push_str("\n## Current plan\n");
            for (section, depth) in prior.ordered_sections() {
                let indent = if depth > 1 { "  " } else { "" };
                prompt.push_str(&format!(
                    "{}- [{}] {}\n",
                    indent, section.section_id, section.title
                ));
            }
            prompt.push_str(
                "\nRevise the current plan according to the feedback below. For every \
                 section you keep, copy its bracketed section_id unchanged; leave \
                 section_id out for sections you add.\n",
            );
        }

        if let Some(feedback) = request.feedback {
            prompt.push_str("\n## Revision feedback\n");
            prompt.push_str(feedback);
            prompt.push('\n');
        }

        prompt
    }

    fn plan_schema() -> Value {
        let section_props = json!({
            "section_id": { "type": "string" },
            "title": { "type": "string" },
            "purpose": { "type": "string" },
            "photo_ids": { "type": "array", "items": { "type": "string" } }
        });
        json!({
            "type": "object",
            "required": ["strategy", "sections"],
            "properties": {
                "strategy": {
                    "type": "string",
                    "description": "One paragraph explaining how the report is organized"
                },
                "sections": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["title"],
                        "properties": {
                            "section_id": section_props["section_id"],
                            "title": section_props["title"],
                            "purpose": section_props["purpose"],
                            "photo_ids": section_props["photo_ids"],
                            "subsections": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "required": ["title"],
                                    "properties": section_props
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    /// Turn wire output into a validated domain plan.
    fn parse_plan(&self, content: Value, request: &PlanRequest<'_>) -> Result<ReportPlan> {
        let wire: WirePlan = serde_json::from_value(content)
            .map_err(|e| GenerationError::invalid_output(format!("plan did not match schema: {e}")))?;

        if wire.sections.is_empty() {
            return Err(GenerationError::invalid_output("plan contains no sections").into());
        }
        let total: usize = wire
            .sections
            .iter()
            .map(|s| 1 + s.subsections.len())
            .sum();
        if total > generation::MAX_PLAN_SECTIONS {
            return Err(GenerationError::invalid_output(format!(
                "plan has {total} sections, limit is {}",
                generation::MAX_PLAN_SECTIONS
            ))
            .into());
        }

        let notes: BTreeMap<&str, &PhotoNote> = request
            .input
            .photo_notes
            .iter()
            .map(|p| (p.photo_id.as_str(), p))
            .collect();

        let sections = wire
            .sections
            .into_iter()
            .enumerate()
            .map(|(i, s)| Self::convert_section(s, i as u32 + 1, &notes, request.prior_plan, true))
            .collect::<Result<Vec<_>>>()?;

        let plan = ReportPlan {
            strategy: wire.strategy,
            sections,
        };
        plan.validate().map_err(|e| {
            GenerationError::invalid_output(format!("plan failed validation: {e}"))
        })?;
        Ok(plan)
    }

    fn convert_section(
        wire: WireSection,
        order: u32,
        notes: &BTreeMap<&str, &PhotoNote>,
        prior_plan: Option<&ReportPlan>,
        allow_nesting: bool,
    ) -> Result<ReportSection> {
        if wire.title.trim().is_empty() {
            return Err(GenerationError::invalid_output("section with empty title").into());
        }
        if !allow_nesting && !wire.subsections.is_empty() {
            return Err(
                GenerationError::invalid_output("subsection nested below a subsection").into(),
            );
        }

        // An echoed id must name a section of the prior plan; anything else
        // is treated as a new section.
        let section_id = wire
            .section_id
            .filter(|id| prior_plan.is_some_and(|p| p.find_section(id).is_some()))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let photo_context = wire
            .photo_ids
            .iter()
            .map(|id| {
                notes.get(id.as_str()).map(|p| (*p).clone()).ok_or_else(|| {
                    GenerationError::invalid_output(format!(
                        "plan references unknown photo id '{id}'"
                    ))
                    .into()
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let subsections = wire
            .subsections
            .into_iter()
            .enumerate()
            .map(|(i, s)| Self::convert_section(s, i as u32 + 1, notes, prior_plan, false))
            .collect::<Result<Vec<_>>>()?;

        Ok(ReportSection {
            section_id,
            title: wire.title,
            report_order: order,
            purpose: wire.purpose,
            photo_context,
            subsections,
        })
    }
}
