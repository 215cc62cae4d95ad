use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Methods that are allowed to travel without a payload.
const METHODS_WITHOUT_PAYLOAD: [&str; 2] = ["GET", "DELETE"];

/// An opaque request body: either a JSON value or pre-serialized text.
///
/// The engine never interprets bodies; it only writes them onto the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationValue {
    // Raw first: a JSON string input is pre-serialized text, not a value.
    Raw(String),
    Json(serde_json::Value),
}

impl OperationValue {
    /// Serialize the body for the wire. Raw text passes through verbatim,
    /// JSON values are rendered compact.
    pub fn to_wire_string(&self) -> String {
        match self {
            OperationValue::Raw(s) => s.clone(),
            OperationValue::Json(v) => v.to_string(),
        }
    }
}

impl From<serde_json::Value> for OperationValue {
    fn from(value: serde_json::Value) -> Self {
        OperationValue::Json(value)
    }
}

impl From<String> for OperationValue {
    fn from(value: String) -> Self {
        OperationValue::Raw(value)
    }
}

/// The atomic unit of work: one HTTP request destined for a change set.
///
/// `content_id` correlates the request with its part in the batch response
/// (wire-level `Content-ID`); when absent, the codec assigns a 1-based
/// sequential id at serialization time. `run_count` tracks how many times
/// the operation has been attempted, for caller-driven resubmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<OperationValue>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub run_count: u32,
}

fn default_method() -> String {
    "GET".to_string()
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl Operation {
    /// A payload-less GET against a (usually relative) URI.
    pub fn get(uri: impl Into<String>) -> Self {
        Operation {
            content_id: None,
            method: "GET".to_string(),
            uri: uri.into(),
            headers: None,
            value: None,
            run_count: 0,
        }
    }

    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Operation {
            content_id: None,
            method: method.into(),
            uri: uri.into(),
            headers: None,
            value: None,
            run_count: 0,
        }
    }

    pub fn with_content_id(mut self, id: impl Into<String>) -> Self {
        self.content_id = Some(id.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<OperationValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Validate the descriptor before admission: any method outside the
    /// payload-less set must carry a body.
    pub fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(Error::validation("Operation has an empty Uri."));
        }
        let payload_less = METHODS_WITHOUT_PAYLOAD
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&self.method));
        if !payload_less && !self.has_value() {
            return Err(Error::validation(format!(
                "Operation does not have a 'Value' but it has a {} method. \
                 All operations with non-GET method should have a value.",
                self.method
            )));
        }
        Ok(())
    }

    /// The entity set the operation targets, extracted from the URI.
    ///
    /// For `$ref` association URIs the entity is the segment before the
    /// navigation property, e.g. `accounts(1)/owner/$ref` -> `accounts`.
    pub fn entity_name(&self) -> &str {
        let segments: Vec<&str> = self.uri.split('/').collect();
        let entity_segment = if segments.last() == Some(&"$ref") && segments.len() >= 3 {
            segments[segments.len() - 3]
        } else {
            segments.last().copied().unwrap_or("")
        };
        match entity_segment.find('(') {
            Some(end) => &entity_segment[..end],
            None => entity_segment,
        }
    }
}

impl From<&str> for Operation {
    /// A bare string is treated as a relative URI for a default GET.
    fn from(uri: &str) -> Self {
        Operation::get(uri)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ContentID: {}, Method: {}, Url: {}",
            self.content_id.as_deref().unwrap_or(""),
            self.method,
            self.uri
        )
    }
}
