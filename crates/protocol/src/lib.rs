//! Wire types for the intent service HTTP boundary.
//!
//! Every route parses its body into one of these validated structures before
//! any business logic runs. Optional fields carry their documented defaults;
//! unknown fields are ignored.

use serde::{Deserialize, Serialize};

fn default_label() -> String {
    "unknown".to_string()
}

/// `POST /classify` body. A missing `transcript` deserializes to the empty
/// string and is rejected by the handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    #[serde(default)]
    pub transcript: String,
}

/// `POST /classify` success body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub intent: String,
    pub confidence: f64,
}

/// `POST /log` body. Only `transcript` is meaningful on its own; everything
/// else defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRequest {
    #[serde(default)]
    pub transcript: String,
    #[serde(default = "default_label")]
    pub user_label: String,
    #[serde(default = "default_label")]
    pub predicted: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub was_overridden: bool,
}

/// `POST /log` success body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogResponse {
    pub logged: bool,
}

/// `GET /health` body: liveness plus the identity of the loaded model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
}

impl HealthResponse {
    #[must_use]
    pub fn ok(model: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            model: model.into(),
        }
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
