//! JSON extraction from mixed LLM response content.
//!
//! Model replies frequently wrap the requested JSON object in markdown
//! fences or explanatory prose. The extraction tries, in order:
//!
//! 1. Direct JSON (content starts with '{')
//! 2. JSON inside a ```json or generic ``` code block
//! 3. The first balanced JSON object found anywhere in the content
//!
//! Truncated objects (opened but never closed) are reported distinctly so
//! callers can tell a cut-off completion from a reply with no JSON at all.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors from JSON extraction.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    /// A JSON object started but never closed.
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces. Partial: {partial_preview}...")]
    Truncated {
        /// First characters of the partial object.
        partial_preview: String,
        /// How many braces were left open.
        unclosed_braces: usize,
    },

    /// No JSON object found anywhere in the content.
    #[error("No JSON content found in response. Content starts with: '{content_preview}'")]
    NotFound {
        /// First characters of the content.
        content_preview: String,
    },
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fence regex is valid")
    })
}

/// Extracts a JSON object from response content.
///
/// # Example
///
/// ```
/// use archforge::utils::json_extraction::extract_json_object;
///
/// let response = "Here is the result: {\"name\": \"example\", \"value\": 42}";
/// let json = extract_json_object(response).unwrap();
/// assert!(json.contains("example"));
/// ```
pub fn extract_json_object(content: &str) -> Result<String, JsonExtractionError> {
    let trimmed = content.trim();

    // Strategy 1: the content is the object.
    if trimmed.starts_with('{') {
        return balanced_object(trimmed);
    }

    // Strategy 2: fenced code block.
    if let Some(captures) = fence_regex().captures(trimmed) {
        if let Some(inner) = captures.get(1) {
            if let Ok(json) = balanced_object(inner.as_str()) {
                return Ok(json);
            }
        }
    }

    // Strategy 3: first '{' anywhere.
    if let Some(start) = trimmed.find('{') {
        return balanced_object(&trimmed[start..]);
    }

    Err(JsonExtractionError::NotFound {
        content_preview: preview(trimmed),
    })
}

/// Scans from the leading '{' to its matching close brace, respecting
/// strings and escapes.
fn balanced_object(content: &str) -> Result<String, JsonExtractionError> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in content.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Ok(content[..=idx].to_string());
                }
            }
            _ => {}
        }
    }

    Err(JsonExtractionError::Truncated {
        partial_preview: preview(content),
        unclosed_braces: depth,
    })
}

fn preview(content: &str) -> String {
    content.chars().take(60).collect()
}
