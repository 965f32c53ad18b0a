use codereview_core::Suggestion;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::generator::GenerationError;

lazy_static! {
    static ref FENCE: Regex = Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*\n(.*?)\n?```\s*$").unwrap();
    static ref LIST_ITEM: Regex = Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s+(.+)$").unwrap();
}

/// Fields accepted as the suggestion text when the model returns objects.
const TEXT_FIELDS: [&str; 4] = ["message", "suggestion", "text", "description"];

/// Turn raw model output into an ordered suggestion list.
///
/// Accepted shapes, tried in order:
/// - a JSON array of strings, or of objects with a text field
/// - a JSON object holding such an array under `suggestions`
/// - a numbered or bulleted plain-text list
/// - a non-empty JSON array of suggestions surrounded by prose
///
/// Only a reply that is entirely JSON may yield an empty list. Brackets
/// quoted inside list items never replace the list.
pub fn parse_suggestions(content: &str) -> Result<Vec<Suggestion>, GenerationError> {
    let trimmed = content.trim();
    let body = FENCE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);

    if let Some(value) = whole_json(body) {
        return suggestions_from_json(&value);
    }

    let items = parse_list(body);
    if !items.is_empty() {
        return Ok(items);
    }

    if let Some(items) = embedded_array(body) {
        return Ok(items);
    }

    Err(GenerationError::Format(format!(
        "expected a JSON array or list of suggestions, got: {}",
        excerpt(trimmed)
    )))
}

fn whole_json(body: &str) -> Option<Value> {
    serde_json::from_str::<Value>(body)
        .ok()
        .filter(|value| value.is_array() || value.is_object())
}

/// A JSON array inside prose, accepted only when it is non-empty and every
/// element carries suggestion text.
fn embedded_array(body: &str) -> Option<Vec<Suggestion>> {
    let start = body.find('[')?;
    let end = body.rfind(']')?;
    if end <= start {
        return None;
    }
    let value = serde_json::from_str::<Value>(&body[start..=end]).ok()?;
    let items = value.as_array().filter(|items| !items.is_empty())?;

    let texts = items
        .iter()
        .map(suggestion_text)
        .collect::<Option<Vec<&str>>>()?;
    Some(
        texts
            .into_iter()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(Suggestion::new)
            .collect(),
    )
}

fn suggestion_text(item: &Value) -> Option<&str> {
    match item {
        Value::String(text) => Some(text.as_str()),
        Value::Object(map) => TEXT_FIELDS
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str)),
        _ => None,
    }
}

fn suggestions_from_json(value: &Value) -> Result<Vec<Suggestion>, GenerationError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("suggestions") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(GenerationError::Format(
                    "JSON object has no `suggestions` array".to_string(),
                ))
            }
        },
        _ => {
            return Err(GenerationError::Format(
                "JSON response is neither an array nor an object".to_string(),
            ))
        }
    };

    let mut suggestions = Vec::with_capacity(items.len());
    for item in items {
        let text = suggestion_text(item).ok_or_else(|| {
            GenerationError::Format(format!(
                "unexpected suggestion element: {}",
                excerpt(&item.to_string())
            ))
        })?;
        let text = text.trim();
        if !text.is_empty() {
            suggestions.push(Suggestion::new(text));
        }
    }
    Ok(suggestions)
}

/// Numbered or bulleted items; indented lines continue the previous item.
fn parse_list(body: &str) -> Vec<Suggestion> {
    let mut items: Vec<String> = Vec::new();
    let mut in_list = false;

    for line in body.lines() {
        if let Some(caps) = LIST_ITEM.captures(line) {
            items.push(caps[1].trim().to_string());
            in_list = true;
        } else if line.trim().is_empty() {
            in_list = false;
        } else if in_list && line.starts_with(char::is_whitespace) {
            if let Some(last) = items.last_mut() {
                last.push(' ');
                last.push_str(line.trim());
            }
        }
    }

    items
        .into_iter()
        .filter(|item| !item.is_empty())
        .map(Suggestion::new)
        .collect()
}

fn excerpt(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    }
}
