//! Error payload canonicalization for grouping.

use serde_json::Value;

/// When the volatile `path` field is removed from a structured error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PathStripPolicy {
    /// Only objects that also carry a `code` (transport errors and other
    /// classified failures). Other objects keep their text verbatim.
    #[default]
    CodedOnly,
    /// Every JSON object.
    Always,
}

/// How an embedded error payload takes part in grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Canonical {
    /// The payload wraps an already-reported result; it is not grouped.
    Wrapper,
    /// Grouping key.
    Key(String),
}

/// Canonicalize a string-encoded error. `None` when it is not valid JSON.
pub fn canonicalize(error: &str, policy: PathStripPolicy) -> Option<Canonical> {
    let parsed: Value = serde_json::from_str(error).ok()?;

    let Value::Object(mut fields) = parsed else {
        return Some(Canonical::Key(error.to_string()));
    };

    if fields.contains_key("success") {
        return Some(Canonical::Wrapper);
    }

    let strip = match policy {
        PathStripPolicy::CodedOnly => fields.contains_key("code"),
        PathStripPolicy::Always => true,
    };
    if !strip {
        return Some(Canonical::Key(error.to_string()));
    }

    fields.remove("path");
    Some(Canonical::Key(Value::Object(fields).to_string()))
}
