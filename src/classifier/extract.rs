use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ClassifyError;
use super::result::ClassificationResult;

/// How the verdict object is pulled out of the model's free-text reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Parse everything between the first `{` and the last `}`.
    #[default]
    Lenient,
    /// The reply must be a JSON object, optionally inside a Markdown fence.
    Strict,
}

/// Pull `output.choices[0].message.content[0].text` out of a response body.
pub fn reply_text(body: &Value) -> Result<&str, ClassifyError> {
    let Some(output) = body.get("output") else {
        return Err(api_error(body).unwrap_or(ClassifyError::UnexpectedShape));
    };
    output
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.get(0))
        .and_then(|part| part.get("text"))
        .and_then(Value::as_str)
        .ok_or(ClassifyError::UnexpectedShape)
}

/// Error bodies carry `code` and `message` at the top level.
pub fn api_error(body: &Value) -> Option<ClassifyError> {
    let code = body.get("code").and_then(Value::as_str)?;
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(ClassifyError::Api {
        code: code.to_string(),
        message: message.to_string(),
    })
}

/// Slice from the first `{` through the last `}`.
///
/// A stray brace inside an issue string can widen or break the slice; the
/// parse step reports that as invalid JSON.
pub fn locate_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

pub fn parse_reply(text: &str, mode: ExtractionMode) -> Result<ClassificationResult, ClassifyError> {
    let candidate = match mode {
        ExtractionMode::Lenient => locate_json(text).ok_or(ClassifyError::NoJsonObject)?,
        ExtractionMode::Strict => strip_fence(text),
    };
    let value: Value = serde_json::from_str(candidate).map_err(ClassifyError::InvalidJson)?;
    match value {
        Value::Object(object) => Ok(ClassificationResult::from_json_object(&object)),
        _ => Err(ClassifyError::NotAnObject),
    }
}
