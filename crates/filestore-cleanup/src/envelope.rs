//! Classification of error envelopes returned by the control API.
//!
//! The node reports failures inside the response body rather than through the
//! HTTP status, so every body is probed for an envelope. Success bodies are not
//! required to look like one: anything that fails to decode, or decodes with
//! no text, is a success.

use serde::Deserialize;

/// Error envelope as sent by the node. At most one text field is expected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "Error", default)]
    pub error: String,
    #[serde(rename = "Code", default)]
    pub code: Option<i64>,
    #[serde(rename = "Type", default)]
    pub kind: Option<String>,
}

impl ErrorEnvelope {
    /// First non-empty text field, or "" when the envelope carries no error.
    pub fn error_text(&self) -> &str {
        if !self.message.is_empty() {
            &self.message
        } else {
            &self.error
        }
    }
}

/// Returns the error text carried by `body`, or `None` when it is not an error.
pub fn classify(body: &[u8]) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_slice(body).ok()?;
    non_empty(envelope.error_text())
}

/// Same as [`classify`] for an already decoded JSON value.
pub fn classify_value(value: &serde_json::Value) -> Option<String> {
    let envelope = ErrorEnvelope::deserialize(value).ok()?;
    non_empty(envelope.error_text())
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
