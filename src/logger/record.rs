//! The input record handed over by the host framework and the document derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys of a host error which describe the error itself rather than its payload.
const RESERVED_ERROR_KEYS: [&str; 5] = ["code", "message", "statusCode", "stack", "date"];

/// One completed request/response cycle as reported by the host framework.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub status_code: u16,
    pub method: String,
    /// The concrete request path, e.g. `/user/1`.
    pub path: String,
    /// The route template the path matched, e.g. `/user/:id`.
    pub spec: String,
    #[serde(default)]
    pub body: Map<String, Value>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub query: Map<String, Value>,
    #[serde(default)]
    pub headers: Map<String, Value>,
    /// Duration in milliseconds. Hosts may omit it for no-content responses.
    #[serde(default)]
    pub took: Option<u64>,
    #[serde(default)]
    pub response: ResponseEnvelope,
}

/// What the host sent back to the client.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
    #[serde(default, rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// An error reported by the host, with whatever extra fields it carried.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub code: String,
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorDescriptor {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            extra: Map::new(),
        }
    }

    /// Attaches an additional payload field.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// The error's payload: all extra fields except the ones describing the error itself.
    pub fn payload(&self) -> Map<String, Value> {
        self.extra
            .iter()
            .filter(|(key, _)| !RESERVED_ERROR_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// The `error` sub-object of a [`LogDocument`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoggedError {
    pub code: String,
    pub message: String,
    pub payload: Map<String, Value>,
}

impl From<&ErrorDescriptor> for LoggedError {
    fn from(error: &ErrorDescriptor) -> Self {
        Self {
            code: error.code.clone(),
            message: error.message.clone(),
            payload: error.payload(),
        }
    }
}

/// The document persisted for a request.
///
/// The fixed fields are serialized as declared, `custom` is merged in afterwards by
/// [`LogDocument::to_value`] and wins on name clashes.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDocument {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub app_name: String,
    pub body: Map<String, Value>,
    pub error: Option<LoggedError>,
    pub headers: Map<String, Value>,
    pub method: String,
    pub params: Map<String, Value>,
    pub path: String,
    pub query: Map<String, Value>,
    pub route: String,
    pub spec: String,
    pub status_code: u16,
    pub took: Option<u64>,
    pub version: String,
    #[serde(skip)]
    pub custom: Map<String, Value>,
}

impl LogDocument {
    /// Renders the document as JSON, including the custom fields.
    pub fn to_value(&self) -> anyhow::Result<Value> {
        let mut document = match serde_json::to_value(self)? {
            Value::Object(fields) => fields,
            other => anyhow::bail!("Log document serialized into a non-object: {}", other),
        };
        document.extend(
            self.custom
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );

        Ok(Value::Object(document))
    }
}
