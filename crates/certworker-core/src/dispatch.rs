//! Function registry and dispatch.
//!
//! Function ids are resolved to a [`Function`] once, when the dispatcher is
//! built. Only domain errors are turned into a failure [`Response`]; anything
//! else propagates to the job supervisor.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::crypto::{HashAlgorithm, KeyMaterial};
use crate::envelope::{JobEnvelope, RequestFields, Response, SchemaRegistry};
use crate::error::{WorkerError, WorkerResult};
use crate::handlers::Handlers;

/// Functions a worker can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    CheckSignature,
    CheckSignatureWithCert,
    DeriveKey,
    Error,
}

impl Function {
    /// Wire ids and the function each one selects.
    pub const REGISTRY: [(&'static str, Function); 5] = [
        ("check_signature", Function::CheckSignature),
        ("check_signature_with_cert", Function::CheckSignatureWithCert),
        ("derive_key", Function::DeriveKey),
        ("derivate_key", Function::DeriveKey),
        ("error", Function::Error),
    ];

    pub fn from_id(function_id: &str) -> Option<Self> {
        Self::REGISTRY
            .iter()
            .find(|(id, _)| *id == function_id)
            .map(|(_, function)| *function)
    }
}

/// Routes decoded jobs to handlers.
#[derive(Debug)]
pub struct Dispatcher {
    routes: HashMap<String, Function>,
    handlers: Handlers,
    schemas: Arc<dyn SchemaRegistry>,
}

impl Dispatcher {
    /// Register every known function.
    ///
    /// Fails with a configuration error if a registered id has no schema.
    pub fn new(handlers: Handlers, schemas: Arc<dyn SchemaRegistry>) -> WorkerResult<Self> {
        Self::with_routes(handlers, schemas, Function::REGISTRY)
    }

    /// Register only the given routes.
    pub fn with_routes(
        handlers: Handlers,
        schemas: Arc<dyn SchemaRegistry>,
        routes: impl IntoIterator<Item = (&'static str, Function)>,
    ) -> WorkerResult<Self> {
        let routes: HashMap<String, Function> = routes
            .into_iter()
            .map(|(id, function)| (id.to_string(), function))
            .collect();

        if let Some(id) = routes.keys().find(|id| schemas.schema_for(id).is_none()) {
            return Err(WorkerError::Config {
                message: format!("function {} is registered without a schema", id),
            });
        }

        Ok(Self {
            routes,
            handlers,
            schemas,
        })
    }

    pub fn handlers(&self) -> &Handlers {
        &self.handlers
    }

    pub fn function_ids(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Split a raw job and decode its payload with the function's schema.
    pub fn decode(&self, raw: &[u8]) -> WorkerResult<RequestFields> {
        let envelope = JobEnvelope::split(raw)?;
        let schema = self.schemas.schema_for(envelope.function_id).ok_or_else(|| {
            WorkerError::UnknownFunction {
                function_id: envelope.function_id.to_string(),
            }
        })?;

        schema.decode(envelope.function_id, envelope.payload)
    }

    /// Run the handler registered under `function_id`.
    pub async fn dispatch(&self, function_id: &str, fields: &RequestFields) -> WorkerResult<Response> {
        let function = *self
            .routes
            .get(function_id)
            .ok_or_else(|| WorkerError::UnknownFunction {
                function_id: function_id.to_string(),
            })?;

        debug!(function_id, ?function, "dispatching job");

        match self.invoke(function, fields).await {
            Ok(value) => Ok(Response::success(value)),
            Err(e) => match e.error_type() {
                Some(error_type) => {
                    warn!(function_id, error = %e, "job failed with a domain error");
                    Ok(Response::failure(error_type, e.to_string()))
                }
                None => Err(e),
            },
        }
    }

    /// Serialize a response with the function's schema.
    pub fn encode(&self, function_id: &str, response: &Response) -> WorkerResult<Vec<u8>> {
        let schema =
            self.schemas
                .schema_for(function_id)
                .ok_or_else(|| WorkerError::UnknownFunction {
                    function_id: function_id.to_string(),
                })?;
        schema.encode(response)
    }

    async fn invoke(&self, function: Function, fields: &RequestFields) -> WorkerResult<Value> {
        let handlers = &self.handlers;

        match function {
            Function::CheckSignature => {
                let valid = handlers
                    .check_signature(
                        fields.str("hostname")?,
                        &fields.bytes("signed_data")?,
                        &fields.bytes("signature")?,
                        fields.str("algorithm")?,
                    )
                    .await?;
                Ok(Value::Bool(valid))
            }
            Function::CheckSignatureWithCert => {
                let cert = KeyMaterial::new(fields.object("cert")?.clone());
                let valid = handlers.check_signature_with_cert(
                    &cert,
                    &fields.bytes("signed_data")?,
                    &fields.bytes("signature")?,
                    fields.str("algorithm")?,
                )?;
                Ok(Value::Bool(valid))
            }
            Function::DeriveKey => {
                let hash_algorithm: HashAlgorithm = fields.str("hash_algorithm")?.parse()?;
                let derived = handlers.derive_key(
                    fields.str("ikm")?,
                    fields.str("salt")?,
                    fields.str("info")?,
                    fields.u64("length")?,
                    hash_algorithm,
                )?;
                Ok(Value::String(derived))
            }
            Function::Error => handlers.error(fields.str("message")?),
        }
    }
}
