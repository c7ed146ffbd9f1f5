//! Section Drafter
//!
//! Produces prose for one section from its title, purpose, and photo
//! context. Sections are independent: each draft call carries only its own
//! section's inputs plus the plan strategy, so drafting order never changes
//! the result and failed sections retry without touching finished ones.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::ai::{SharedProvider, with_timeout};
use crate::constants::{generation, retry};
use crate::types::{GenerationError, ReportSection, Result};

/// Drafts individual section content through the provider
pub struct SectionDrafter {
    provider: SharedProvider,
    timeout: Duration,
    max_attempts: usize,
}

impl SectionDrafter {
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

    /// Draft one section and return its prose.
    #[instrument(skip_all, fields(section_id = %section.section_id))]
    pub async fn draft(&self, section: &ReportSection, strategy: &str) -> Result<String> {
        let prompt = Self::build_prompt(section, strategy);
        let schema = json!({
            "type": "object",
            "required": ["content"],
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The section prose, plain paragraphs without headings"
                }
            }
        });

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(retry::BASE_DELAY_MS))
            .with_max_delay(Duration::from_secs(retry::MAX_DELAY_SECS))
            .with_max_times(self.max_attempts.saturating_sub(1));

        let content = (|| async {
            let response = with_timeout(
                self.timeout,
                self.provider.generate(&prompt, &schema),
                "section drafting",
            )
            .await?;
            Self::extract_content(response.content)
        })
        .retry(backoff)
        .when(|e| e.is_recoverable())
        .notify(|err, delay| {
            warn!(error = %err, delay_ms = delay.as_millis() as u64, "Retrying section draft");
        })
        .await?;

        debug!(chars = content.len(), "Section drafted");
        Ok(content)
    }

    fn build_prompt(section: &ReportSection, strategy: &str) -> String {
        let mut prompt = format!(
            "You are drafting one section of a field inspection report.\n\
             Report strategy: {strategy}\n\n\
             ## Section\nTitle: {}\n",
            section.title
        );
        if let Some(purpose) = &section.purpose {
            prompt.push_str(&format!("Purpose: {purpose}\n"));
        }
        if section.photo_context.is_empty() {
            prompt.push_str(
                "\nNo photos are assigned to this section; write a brief connective passage.\n",
            );
        } else {
            prompt.push_str("\n## Photo observations\n");
            for photo in &section.photo_context {
                prompt.push_str(&format!("- {}: {}\n", photo.photo_id, photo.note));
            }
        }
        prompt.push_str(
            "\nWrite the section body only. Describe the observations factually; \
             do not repeat the section title or invent findings not supported by \
             the photo notes.\n",
        );
        prompt
    }

    fn extract_content(content: Value) -> Result<String> {
        let text = content
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| GenerationError::invalid_output("draft missing 'content' field"))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::invalid_output("draft content is empty").into());
        }
        Ok(text.to_string())
    }
}
