//! Job envelope wire format.
//!
//! A job is `<function_id>::<payload>`; the payload is a JSON object checked
//! against the function's schema. A response is either `{"value": ...}` or
//! `{"error_type": "...", "error": "..."}`.

mod schema;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{WorkerError, WorkerResult};

pub use schema::{BuiltinSchemas, FunctionSchema, SchemaRegistry};

/// Separator between function id and payload.
pub const DELIMITER: &[u8] = b"::";

/// Raw job split on the first delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobEnvelope<'a> {
    pub function_id: &'a str,
    pub payload: &'a [u8],
}

impl<'a> JobEnvelope<'a> {
    pub fn split(raw: &'a [u8]) -> WorkerResult<Self> {
        let position = raw
            .windows(DELIMITER.len())
            .position(|window| window == DELIMITER)
            .ok_or_else(|| WorkerError::Decode {
                function_id: String::new(),
                reason: "missing '::' delimiter".to_string(),
            })?;

        let function_id =
            std::str::from_utf8(&raw[..position]).map_err(|e| WorkerError::Decode {
                function_id: String::new(),
                reason: format!("function id is not UTF-8: {}", e),
            })?;

        Ok(Self {
            function_id,
            payload: &raw[position + DELIMITER.len()..],
        })
    }

    /// Build the wire form of a job.
    pub fn to_bytes(function_id: &str, payload: &[u8]) -> Vec<u8> {
        let mut raw = Vec::with_capacity(function_id.len() + DELIMITER.len() + payload.len());
        raw.extend_from_slice(function_id.as_bytes());
        raw.extend_from_slice(DELIMITER);
        raw.extend_from_slice(payload);
        raw
    }
}

/// Decoded payload fields (name → value) of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFields {
    function_id: String,
    fields: Map<String, Value>,
}

impl RequestFields {
    pub fn new(function_id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            function_id: function_id.into(),
            fields,
        }
    }

    pub fn function_id(&self) -> &str {
        &self.function_id
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    fn field(&self, name: &str) -> WorkerResult<&Value> {
        self.fields
            .get(name)
            .ok_or_else(|| self.decode_error(format!("missing field {}", name)))
    }

    pub fn str(&self, name: &str) -> WorkerResult<&str> {
        self.field(name)?
            .as_str()
            .ok_or_else(|| self.decode_error(format!("field {} must be a string", name)))
    }

    /// Base64-encoded binary field.
    pub fn bytes(&self, name: &str) -> WorkerResult<Vec<u8>> {
        BASE64
            .decode(self.str(name)?)
            .map_err(|e| self.decode_error(format!("field {} is not base64: {}", name, e)))
    }

    pub fn u64(&self, name: &str) -> WorkerResult<u64> {
        self.field(name)?
            .as_u64()
            .ok_or_else(|| self.decode_error(format!("field {} must be an unsigned integer", name)))
    }

    pub fn object(&self, name: &str) -> WorkerResult<&Value> {
        let value = self.field(name)?;
        if value.is_object() {
            Ok(value)
        } else {
            Err(self.decode_error(format!("field {} must be an object", name)))
        }
    }

    fn decode_error(&self, reason: String) -> WorkerError {
        WorkerError::Decode {
            function_id: self.function_id.clone(),
            reason,
        }
    }
}

/// Outcome of a job as sent back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Success { value: Value },
    Failure { error_type: String, error: String },
}

impl Response {
    pub fn success(value: impl Into<Value>) -> Self {
        Self::Success {
            value: value.into(),
        }
    }

    pub fn failure(error_type: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Failure {
            error_type: error_type.into(),
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn from_slice(bytes: &[u8]) -> WorkerResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| WorkerError::Decode {
            function_id: String::new(),
            reason: format!("invalid response: {}", e),
        })
    }
}
