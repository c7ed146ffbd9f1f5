//! Generation Output Validation
//!
//! Extracts structured JSON from provider responses before the callers
//! deserialize it into domain types. Providers wrap JSON in markdown fences
//! or prose often enough that a tolerant extraction pass is required; an
//! unextractable response is an invalid-output generation failure, which is
//! retryable but never accepted into the model.

use serde_json::Value;
use tracing::debug;

use crate::types::{GenerationError, Result};

/// Extract and parse JSON from a raw provider response.
///
/// Handles clean JSON, fenced ```json blocks, and JSON embedded in
/// surrounding prose. Fails with an invalid-output generation error when no
/// parseable JSON object or array can be found.
pub fn extract_json_from_response(content: &str) -> Result<Value> {
    let trimmed = content.trim();

    // Direct parse first
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    // Fenced code block
    if let Some(fenced) = extract_fenced_block(trimmed)
        && let Ok(value) = serde_json::from_str::<Value>(&fenced)
    {
        debug!("JSON extracted from fenced code block");
        return Ok(value);
    }

    // JSON embedded in prose: take the outermost balanced object or array
    if let Some(embedded) = extract_balanced_json(trimmed)
        && let Ok(value) = serde_json::from_str::<Value>(&embedded)
    {
        debug!("JSON extracted from mixed content");
        return Ok(value);
    }

    Err(GenerationError::invalid_output(format!(
        "response did not contain parseable JSON (first 80 chars: {:?})",
        trimmed.chars().take(80).collect::<String>()
    ))
    .into())
}

/// Pull the body of the first ``` fence, stripping an optional language tag
fn extract_fenced_block(content: &str) -> Option<String> {
    let start = content.find("```")?;
    let after_fence = &content[start + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim().to_string())
}

/// Find the outermost balanced `{...}` or `[...]` span, respecting strings
fn extract_balanced_json(content: &str) -> Option<String> {
    let open = content.find(['{', '['])?;
    let bytes = content.as_bytes();
    let (open_ch, close_ch) = if bytes[open] == b'{' {
        (b'{', b'}')
    } else {
        (b'[', b']')
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b if b == open_ch => depth += 1,
            b if b == close_ch => {
                depth -= 1;
                if depth == 0 {
                    return Some(content[open..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GenerationFailureKind, ScribeError};

    #[test]
    fn test_clean_json() {
        let value = extract_json_from_response(r#"{"title": "Roof"}"#).unwrap();
        assert_eq!(value["title"], "Roof");
    }

    #[test]
    fn test_fenced_json() {
        let raw = "Here is the plan:\n```json\n{\"sections\": []}\n```\nDone.";
        let value = extract_json_from_response(raw).unwrap();
        assert!(value["sections"].is_array());
    }

    #[test]
    fn test_json_in_prose() {
        let raw = "The result is {\"ok\": true, \"note\": \"has {braces} inside\"} as requested.";
        let value = extract_json_from_response(raw).unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn test_array_in_prose() {
        let raw = "Sections: [1, 2, 3]";
        let value = extract_json_from_response(raw).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_string_with_escaped_quote() {
        let raw = r#"{"note": "a \"quoted\" word"}"#;
        let value = extract_json_from_response(raw).unwrap();
        assert_eq!(value["note"], "a \"quoted\" word");
    }

    #[test]
    fn test_no_json_is_invalid_output() {
        let err = extract_json_from_response("no structured content here").unwrap_err();
        match err {
            ScribeError::Generation(e) => {
                assert_eq!(e.kind, GenerationFailureKind::InvalidOutput)
            }
            other => panic!("expected generation error, got {:?}", other),
        }
    }
}
