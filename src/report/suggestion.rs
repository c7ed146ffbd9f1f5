//! Suggestion Engine
//!
//! Interprets conversational messages sent against a completed report.
//! A message proposing an edit to a section's text becomes a staged
//! suggestion for explicit accept/reject; research requests, tool
//! requests, and everything else resolve to a conversational answer.
//! The report content is never modified at classification time.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::ai::{SharedProvider, with_timeout};
use crate::constants::generation;
use crate::types::{Document, GenerationError, Result};
use std::time::Duration;

/// Interpreted intent of one conversational message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageIntent {
    /// The message asks for a concrete text change in one section
    EditProposal {
        section_id: String,
        /// Exact span of the current section text to replace
        original_text: String,
        suggested_text: String,
    },
    /// The message asks for information not contained in the report
    Research { query: String },
    /// The message asks to run an external action on the user's behalf
    ToolInvocation { tool: String },
    /// Anything else gets a conversational answer
    Reply(String),
}

#[derive(Debug, Deserialize)]
struct WireIntent {
    kind: String,
    #[serde(default)]
    section_id: Option<String>,
    #[serde(default)]
    original_text: Option<String>,
    #[serde(default)]
    suggested_text: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    reply: Option<String>,
}

/// Classifies messages against the current document state
pub struct SuggestionEngine {
    provider: SharedProvider,
    timeout: Duration,
}

impl SuggestionEngine {
    pub fn new(provider: SharedProvider) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(generation::DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Interpret one message. Edit proposals are only returned when the
    /// quoted original text actually appears in the named section, so a
    /// staged suggestion always starts out applicable.
    #[instrument(skip_all)]
    pub async fn classify(&self, message: &str, document: &Document) -> Result<MessageIntent> {
        let prompt = Self::build_prompt(message, document);
        let schema = Self::intent_schema();

        let response = with_timeout(
            self.timeout,
            self.provider.generate(&prompt, &schema),
            "message classification",
        )
        .await?;

        let wire: WireIntent = serde_json::from_value(response.content).map_err(|e| {
            GenerationError::invalid_output(format!("intent did not match schema: {e}"))
        })?;

        let intent = match wire.kind.as_str() {
            "edit" => {
                let section_id = wire.section_id.unwrap_or_default();
                let original_text = wire.original_text.unwrap_or_default();
                let suggested_text = wire.suggested_text.unwrap_or_default();
                if section_id.is_empty() || original_text.is_empty() || suggested_text.is_empty() {
                    return Err(GenerationError::invalid_output(
                        "edit intent missing section_id, original_text, or suggested_text",
                    )
                    .into());
                }
                let block = document.block_for(&section_id).ok_or_else(|| {
                    GenerationError::invalid_output(format!(
                        "edit intent names unknown section '{section_id}'"
                    ))
                })?;
                if !block.body.contains(&original_text) {
                    return Err(GenerationError::invalid_output(
                        "edit intent quotes text not present in the section",
                    )
                    .into());
                }
                MessageIntent::EditProposal {
                    section_id,
                    original_text,
                    suggested_text,
                }
            }
            "research" => MessageIntent::Research {
                query: wire.query.or(wire.reply).unwrap_or_default(),
            },
            "tool" => {
                let tool = wire.tool.unwrap_or_default();
                if tool.is_empty() {
                    return Err(
                        GenerationError::invalid_output("tool intent missing tool name").into(),
                    );
                }
                MessageIntent::ToolInvocation { tool }
            }
            "reply" => MessageIntent::Reply(wire.reply.unwrap_or_default()),
            other => {
                return Err(GenerationError::invalid_output(format!(
                    "unknown intent kind '{other}'"
                ))
                .into());
            }
        };

        debug!(edit = matches!(intent, MessageIntent::EditProposal { .. }), "Message classified");
        Ok(intent)
    }

    fn build_prompt(message: &str, document: &Document) -> String {
        let mut prompt = String::from(
            "A user sent a message about their finished inspection report. Classify \
             its intent:\n\
             - kind \"edit\": a concrete text change is requested. Include the \
             section_id, the exact current text span to replace (quoted verbatim \
             from the section body), and the replacement text.\n\
             - kind \"research\": the message asks for information the report does \
             not contain. Include the lookup as \"query\".\n\
             - kind \"tool\": the message asks to perform an external action. \
             Include the action name as \"tool\".\n\
             - kind \"reply\": anything else. Include a helpful answer as \"reply\".\n\n\
             ## Report sections\n",
        );
        for block in &document.blocks {
            prompt.push_str(&format!(
                "### [{}] {}\n{}\n\n",
                block.section_id, block.heading, block.body
            ));
        }
        prompt.push_str("## Message\n");
        prompt.push_str(message);
        prompt.push('\n');
        prompt
    }

    fn intent_schema() -> Value {
        json!({
            "type": "object",
            "required": ["kind"],
            "properties": {
                "kind": { "type": "string", "enum": ["edit", "research", "tool", "reply"] },
                "section_id": { "type": "string" },
                "original_text": { "type": "string" },
                "suggested_text": { "type": "string" },
                "query": { "type": "string" },
                "tool": { "type": "string" },
                "reply": { "type": "string" }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{GenerationProvider, LlmResponse};
    use crate::types::DocumentBlock;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedProvider(Value);

    #[async_trait]
    impl GenerationProvider for FixedProvider {
        async fn generate(&self, _prompt: &str, _schema: &Value) -> Result<LlmResponse> {
            Ok(LlmResponse::content_only(self.0.clone()))
        }

        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed-model"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn engine(response: Value) -> SuggestionEngine {
        SuggestionEngine::new(Arc::new(FixedProvider(response)))
    }

    fn document() -> Document {
        Document {
            blocks: vec![DocumentBlock {
                section_id: "roof".to_string(),
                heading: "Roof".to_string(),
                level: 1,
                body: "The ridge cap is cracked in two places.".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_edit_intent_staged() {
        let engine = engine(json!({
            "kind": "edit",
            "section_id": "roof",
            "original_text": "cracked in two places",
            "suggested_text": "cracked in three places"
        }));
        let intent = engine.classify("it was three cracks", &document()).await.unwrap();
        assert_eq!(
            intent,
            MessageIntent::EditProposal {
                section_id: "roof".to_string(),
                original_text: "cracked in two places".to_string(),
                suggested_text: "cracked in three places".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_reply_intent() {
        let engine = engine(json!({"kind": "reply", "reply": "The roof section covers that."}));
        let intent = engine
            .classify("where do you mention the ridge?", &document())
            .await
            .unwrap();
        assert_eq!(
            intent,
            MessageIntent::Reply("The roof section covers that.".to_string())
        );
    }

    #[tokio::test]
    async fn test_research_intent() {
        let engine = engine(json!({"kind": "research", "query": "local building code for ridge caps"}));
        let intent = engine
            .classify("what does code say about ridge caps?", &document())
            .await
            .unwrap();
        assert_eq!(
            intent,
            MessageIntent::Research {
                query: "local building code for ridge caps".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_tool_intent_requires_name() {
        let engine = engine(json!({"kind": "tool"}));
        let err = engine
            .classify("email this to the client", &document())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tool"));
    }

    #[tokio::test]
    async fn test_edit_quoting_absent_text_rejected() {
        let engine = engine(json!({
            "kind": "edit",
            "section_id": "roof",
            "original_text": "text that is not there",
            "suggested_text": "replacement"
        }));
        let err = engine.classify("change it", &document()).await.unwrap_err();
        assert!(err.to_string().contains("not present"));
    }

    #[tokio::test]
    async fn test_edit_against_unknown_section_rejected() {
        let engine = engine(json!({
            "kind": "edit",
            "section_id": "basement",
            "original_text": "x",
            "suggested_text": "y"
        }));
        let err = engine.classify("change it", &document()).await.unwrap_err();
        assert!(err.to_string().contains("basement"));
    }
}
