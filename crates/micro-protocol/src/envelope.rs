//! The `{success, data}` envelope written by every adapter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CallError;

/// Response envelope. Failures carry an [`ErrorBody`] in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub data: Value,
}

/// Failure payload inside an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Envelope {
    /// Success envelope. A `null` result is reported as `{}`.
    pub fn success(data: Value) -> Self {
        let data = if data.is_null() {
            Value::Object(Default::default())
        } else {
            data
        };
        Self { success: true, data }
    }

    pub fn failure(error: &CallError) -> Self {
        let body = ErrorBody::from(error);
        Self {
            success: false,
            data: serde_json::to_value(body).unwrap_or(Value::Null),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

impl From<&CallError> for ErrorBody {
    fn from(error: &CallError) -> Self {
        Self {
            code: error.code,
            message: error.message.clone(),
            details: error.details.clone(),
        }
    }
}
