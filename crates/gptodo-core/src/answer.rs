//! Interpretation of the model's final answer.
//!
//! The answer is a JSON array of `{ "text": "..." }` objects, produced under
//! a response schema. Streaming and non-streaming responses both end here.

use serde_json::Value;

use crate::error::ExtractError;
use crate::models::{items_from_segments, ProcessingResult};

/// Extract the ordered text segments from an answer payload.
///
/// Elements that are not objects, or whose `text` is not a non-blank string,
/// are dropped. Anything that is not a JSON array is a parse error.
pub fn parse_segments(answer: &str) -> Result<Vec<String>, ExtractError> {
    let value: Value = serde_json::from_str(answer.trim())
        .map_err(|e| ExtractError::ResponseParse(e.to_string()))?;

    let Value::Array(elements) = value else {
        return Err(ExtractError::ResponseParse(
            "expected a JSON array of {text} objects".to_string(),
        ));
    };

    Ok(elements
        .iter()
        .filter_map(|el| el.get("text").and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect())
}

/// Parse an answer payload straight into checklist items.
pub fn parse_answer(answer: &str) -> Result<ProcessingResult, ExtractError> {
    parse_segments(answer).map(items_from_segments)
}
