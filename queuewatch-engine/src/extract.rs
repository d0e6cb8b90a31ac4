//! Response-body parsing and record extraction.
//!
//! Everything here is pure: no I/O, no clocks. The poll cycle feeds it the
//! body text and the monitor's filter key.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::PollError;

/// Matches `window.queueFair.settings = { ... };` and captures the object
/// literal. Non-greedy so the capture ends at the first `};` closing the
/// outermost brace.
static SETTINGS_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)window\.queueFair\.settings\s*=\s*(\{.*?\})\s*;").expect("valid pattern")
});

/// Parse a response body: strict JSON first, then the queueFair settings
/// literal fallback. Both failing is `PollError::UnsupportedFormat`.
pub fn parse_body(text: &str) -> Result<Value, PollError> {
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }
    if let Some(captures) = SETTINGS_LITERAL.captures(text) {
        let literal = captures.get(1).expect("capture group 1").as_str();
        if let Ok(value) = serde_json::from_str(literal) {
            return Ok(value);
        }
    }
    Err(PollError::UnsupportedFormat)
}

/// The record selected out of a parsed body: either one structured record or
/// a list of them (when no filter narrows the response down).
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Record(Map<String, Value>),
    List(Vec<Value>),
}

impl Extracted {
    /// The change-detection key: `slug`, else `name`. Lists carry no slug.
    pub fn slug(&self) -> Option<&str> {
        match self {
            Extracted::Record(record) => string_field(record, &["slug", "name"]),
            Extracted::List(_) => None,
        }
    }

    /// Human-facing label: `name`, else `displayName`, else `title`.
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Extracted::Record(record) => string_field(record, &["name", "displayName", "title"]),
            Extracted::List(_) => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Extracted::Record(record) => Value::Object(record),
            Extracted::List(items) => Value::Array(items),
        }
    }
}

/// Select the relevant record from a parsed body.
///
/// - Body with a `queues` array: the entry whose `name` equals the filter,
///   or the whole list when no filter is set.
/// - Body that is an array: the entry whose `id` or `name` equals the
///   filter, or the whole list when no filter is set.
/// - Body that is an object: the object itself when no filter is set or its
///   `id`/`name` matches; `None` otherwise.
/// - Anything else: `None`.
pub fn extract_record(body: &Value, filter_key: Option<&str>) -> Option<Extracted> {
    if let Some(queues) = body.get("queues").and_then(Value::as_array) {
        return match filter_key {
            Some(filter) => find_in_list(queues, filter, &["name"]),
            None => Some(Extracted::List(queues.clone())),
        };
    }

    match body {
        Value::Array(items) => match filter_key {
            Some(filter) => find_in_list(items, filter, &["id", "name"]),
            None => Some(Extracted::List(items.clone())),
        },
        Value::Object(record) => {
            let matches = match filter_key {
                Some(filter) => field_equals(record, &["id", "name"], filter),
                None => true,
            };
            matches.then(|| Extracted::Record(record.clone()))
        }
        _ => None,
    }
}

/// Slug derived from a stored snapshot, identically to [`Extracted::slug`].
pub fn slug_of_value(snapshot: &Value) -> Option<String> {
    match snapshot {
        Value::Object(record) => string_field(record, &["slug", "name"]).map(str::to_owned),
        _ => None,
    }
}

fn find_in_list(items: &[Value], filter: &str, keys: &[&str]) -> Option<Extracted> {
    items
        .iter()
        .filter_map(Value::as_object)
        .find(|record| field_equals(record, keys, filter))
        .map(|record| Extracted::Record(record.clone()))
}

fn field_equals(record: &Map<String, Value>, keys: &[&str], expected: &str) -> bool {
    keys.iter()
        .any(|key| record.get(*key).and_then(Value::as_str) == Some(expected))
}

fn string_field<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| record.get(*key).and_then(Value::as_str))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
