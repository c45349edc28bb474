//! Canonical call payload shared by every transport.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CallError;
use crate::names::is_valid_segment;

/// Which transport produced a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Api,
    Socket,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Socket => "socket",
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// The one call contract every adapter normalizes into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPayload {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(rename = "from")]
    pub origin: Origin,
    /// Allow-listed header-like fields other than the three above.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, Value>,
}

impl CallPayload {
    /// Empty payload: null credentials, `{}` data.
    pub fn new(origin: Origin) -> Self {
        Self {
            token: None,
            access_key: None,
            signature: None,
            data: empty_object(),
            origin,
            headers: Map::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = if data.is_null() { empty_object() } else { data };
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set a header-like field by its wire name. Names other than `token`,
    /// `accessKey` and `signature` land in `headers`.
    pub fn set_header(&mut self, name: &str, value: Option<String>) {
        match name {
            "token" => self.token = value,
            "accessKey" => self.access_key = value,
            "signature" => self.signature = value,
            other => {
                self.headers
                    .insert(other.to_string(), value.map_or(Value::Null, Value::String));
            }
        }
    }

    /// Look up a top-level field of `data`.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Deserialize `data` into a typed shape, mapping mismatches to
    /// `ValidationFailed`.
    pub fn parse_data<T: DeserializeOwned>(&self) -> Result<T, CallError> {
        serde_json::from_value(self.data.clone()).map_err(|e| CallError::from_schema(&e))
    }
}

/// A `service/logic/function` triple as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallTarget {
    pub service: String,
    pub logic: String,
    pub function: String,
}

impl CallTarget {
    pub fn new(
        service: impl Into<String>,
        logic: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            logic: logic.into(),
            function: function.into(),
        }
    }

    /// Split a `service/logic/function` path. Anything other than exactly
    /// three segments is rejected.
    pub fn parse(path: &str) -> Result<Self, CallError> {
        let mut parts = path.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(service), Some(logic), Some(function), None) => {
                Ok(Self::new(service, logic, function))
            }
            _ => Err(CallError::invalid_request()),
        }
    }

    /// All three segments pass the strict runtime identifier rule.
    pub fn is_valid(&self) -> bool {
        [&self.service, &self.logic, &self.function]
            .iter()
            .all(|s| is_valid_segment(s))
    }
}

impl std::fmt::Display for CallTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.service, self.logic, self.function)
    }
}
