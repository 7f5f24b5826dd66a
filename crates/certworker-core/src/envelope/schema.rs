//! Per-function payload schemas.

use std::collections::HashMap;
use std::fmt;

use jsonschema::Draft;
use serde_json::{json, Value};

use super::{RequestFields, Response};
use crate::dispatch::Function;
use crate::error::{WorkerError, WorkerResult};

/// Validation errors quoted in a decode failure.
const MAX_REPORTED_ERRORS: usize = 5;

/// Lookup of the schema pair for a function id.
pub trait SchemaRegistry: Send + Sync + fmt::Debug {
    fn schema_for(&self, function_id: &str) -> Option<&FunctionSchema>;
}

/// Request schema plus the shape of a successful response value.
pub struct FunctionSchema {
    request: Value,
    request_validator: jsonschema::Validator,
    value_validator: Option<jsonschema::Validator>,
}

impl fmt::Debug for FunctionSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSchema")
            .field("request", &self.request)
            .field("has_value_schema", &self.value_validator.is_some())
            .finish()
    }
}

impl FunctionSchema {
    /// Compile a request schema and an optional success-value schema.
    pub fn new(request: Value, value: Option<Value>) -> WorkerResult<Self> {
        let request_validator = compile(&request)?;
        let value_validator = value.as_ref().map(compile).transpose()?;

        Ok(Self {
            request,
            request_validator,
            value_validator,
        })
    }

    /// Parse and validate a payload into named fields.
    pub fn decode(&self, function_id: &str, payload: &[u8]) -> WorkerResult<RequestFields> {
        let decode_error = |reason: String| WorkerError::Decode {
            function_id: function_id.to_string(),
            reason,
        };

        let instance: Value = serde_json::from_slice(payload)
            .map_err(|e| decode_error(format!("payload is not JSON: {}", e)))?;

        if !self.request_validator.is_valid(&instance) {
            let errors: Vec<String> = self
                .request_validator
                .iter_errors(&instance)
                .take(MAX_REPORTED_ERRORS)
                .map(|e| e.to_string())
                .collect();
            return Err(decode_error(errors.join("; ")));
        }

        match instance {
            Value::Object(fields) => Ok(RequestFields::new(function_id, fields)),
            _ => Err(decode_error("payload must be a JSON object".to_string())),
        }
    }

    /// Serialize a response, checking success values against the value schema.
    pub fn encode(&self, response: &Response) -> WorkerResult<Vec<u8>> {
        if let (Response::Success { value }, Some(validator)) = (response, &self.value_validator) {
            if !validator.is_valid(value) {
                return Err(WorkerError::Encode {
                    message: format!("response value {} does not match schema", value),
                });
            }
        }

        serde_json::to_vec(response).map_err(|e| WorkerError::Encode {
            message: e.to_string(),
        })
    }
}

fn compile(schema: &Value) -> WorkerResult<jsonschema::Validator> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|e| WorkerError::Config {
            message: format!("failed to compile schema: {}", e),
        })
}

/// Schemas for every function the worker exposes.
#[derive(Debug)]
pub struct BuiltinSchemas {
    schemas: HashMap<String, FunctionSchema>,
}

impl BuiltinSchemas {
    pub fn new() -> WorkerResult<Self> {
        let mut schemas = HashMap::new();
        for (id, function) in Function::REGISTRY {
            let (request, value) = builtin_schema(function);
            schemas.insert(id.to_string(), FunctionSchema::new(request, value)?);
        }
        Ok(Self { schemas })
    }

    /// Register or replace the schema of a function id.
    pub fn insert(&mut self, function_id: impl Into<String>, schema: FunctionSchema) {
        self.schemas.insert(function_id.into(), schema);
    }
}

impl SchemaRegistry for BuiltinSchemas {
    fn schema_for(&self, function_id: &str) -> Option<&FunctionSchema> {
        self.schemas.get(function_id)
    }
}

fn builtin_schema(function: Function) -> (Value, Option<Value>) {
    let base64 = json!({"type": "string", "contentEncoding": "base64"});
    let hex = json!({"type": "string", "pattern": "^([0-9a-fA-F]{2})*$"});
    let hash_names = crate::crypto::HashAlgorithm::NAMES;

    match function {
        Function::CheckSignature => (
            json!({
                "type": "object",
                "required": ["hostname", "signed_data", "signature", "algorithm"],
                "properties": {
                    "hostname": {"type": "string", "minLength": 1},
                    "signed_data": base64,
                    "signature": base64,
                    "algorithm": {"type": "string", "minLength": 1},
                },
                "additionalProperties": false,
            }),
            Some(json!({"type": "boolean"})),
        ),
        Function::CheckSignatureWithCert => (
            json!({
                "type": "object",
                "required": ["cert", "signed_data", "signature", "algorithm"],
                "properties": {
                    "cert": {"type": "object"},
                    "signed_data": base64,
                    "signature": base64,
                    "algorithm": {"type": "string", "minLength": 1},
                },
                "additionalProperties": false,
            }),
            Some(json!({"type": "boolean"})),
        ),
        Function::DeriveKey => (
            json!({
                "type": "object",
                "required": ["ikm", "salt", "info", "length", "hash_algorithm"],
                "properties": {
                    "ikm": hex,
                    "salt": hex,
                    "info": hex,
                    "length": {"type": "integer", "minimum": 0},
                    "hash_algorithm": {"enum": hash_names},
                },
                "additionalProperties": false,
            }),
            Some(hex),
        ),
        Function::Error => (
            json!({
                "type": "object",
                "required": ["message"],
                "properties": {"message": {"type": "string"}},
                "additionalProperties": false,
            }),
            None,
        ),
    }
}
