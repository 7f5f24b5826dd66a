//! Error types for the crypto worker.

/// Error tag carried by structured error responses.
///
/// Existing consumers match on this exact string, so it stays `connection_error`
/// even though the failure it reports is a verification failure.
pub const VERIFICATION_ERROR_TYPE: &str = "connection_error";

/// Worker errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    /// Job bytes or payload do not match the function's schema.
    #[error("could not decode job for {function_id}: {reason}")]
    Decode { function_id: String, reason: String },

    /// No handler or schema is registered under the function id.
    #[error("the function {function_id} does not exist")]
    UnknownFunction { function_id: String },

    /// Certificate or signature could not be processed by the crypto primitives.
    #[error("verification failed: {reason}")]
    Verification { reason: String },

    /// Origin fetch of a public key failed.
    #[error("could not fetch public key for {hostname}: {message}")]
    Fetch { hostname: String, message: String },

    /// Shared cache I/O failed.
    #[error("shared cache error: {message}")]
    SharedCache { message: String },

    /// Handler argument is well-typed but unusable (bad hex, oversized length, ...).
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// Raised on purpose by the `error` function.
    #[error("{message}")]
    Handler { message: String },

    /// Configuration error (fatal at construction time).
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Response could not be serialized.
    #[error("could not encode response: {message}")]
    Encode { message: String },
}

impl WorkerError {
    /// Whether the error is the domain kind converted into a structured response.
    ///
    /// Every other kind propagates to the job supervisor.
    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Verification { .. })
    }

    /// Error type tag for structured responses, if this error is a domain error.
    pub fn error_type(&self) -> Option<&'static str> {
        match self {
            Self::Verification { .. } => Some(VERIFICATION_ERROR_TYPE),
            _ => None,
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Configuration / wiring
            Self::Config { .. } => 1,
            Self::UnknownFunction { .. } => 1,

            // Bad job input
            Self::Decode { .. } => 2,
            Self::InvalidArgument { .. } => 2,

            // Domain
            Self::Verification { .. } => 3,

            // Network / transient
            Self::Fetch { .. } => 4,
            Self::SharedCache { .. } => 4,

            // Other
            Self::Handler { .. } => 5,
            Self::Encode { .. } => 5,
        }
    }

    pub(crate) fn verification(reason: impl Into<String>) -> Self {
        Self::Verification {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_argument(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<redis::RedisError> for WorkerError {
    fn from(err: redis::RedisError) -> Self {
        Self::SharedCache {
            message: err.to_string(),
        }
    }
}

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_verification_is_domain() {
        let domain = WorkerError::verification("bad key");
        assert!(domain.is_domain());
        assert_eq!(domain.error_type(), Some(VERIFICATION_ERROR_TYPE));

        let fatal = [
            WorkerError::UnknownFunction {
                function_id: "nope".into(),
            },
            WorkerError::Decode {
                function_id: "check_signature".into(),
                reason: "missing field".into(),
            },
            WorkerError::Fetch {
                hostname: "example.com".into(),
                message: "timeout".into(),
            },
            WorkerError::Handler {
                message: "boom".into(),
            },
        ];
        for err in fatal {
            assert!(!err.is_domain(), "{err} must not be a domain error");
            assert_eq!(err.error_type(), None);
        }
    }

    #[test]
    fn test_messages() {
        let err = WorkerError::UnknownFunction {
            function_id: "nope".into(),
        };
        assert_eq!(err.to_string(), "the function nope does not exist");

        let err = WorkerError::Handler {
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.exit_code(), 5);
    }
}
