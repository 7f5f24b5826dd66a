//! Origin fetch of issuer public keys.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::crypto::KeyMaterial;
use crate::error::{WorkerError, WorkerResult};

const USER_AGENT_VALUE: &str = concat!("certworker/", env!("CARGO_PKG_VERSION"));

/// Path of the issuer support document.
pub const SUPPORT_DOCUMENT_PATH: &str = "/.well-known/browserid";

/// Support documents larger than this are refused.
const MAX_DOCUMENT_BYTES: u64 = 512 * 1024;

/// Slow path of the certificate cache: ask the issuer itself.
#[async_trait]
pub trait OriginFetcher: Send + Sync + Debug {
    async fn fetch_public_key(&self, hostname: &str) -> WorkerResult<KeyMaterial>;
}

#[derive(Debug, Deserialize)]
struct SupportDocument {
    #[serde(rename = "public-key")]
    public_key: Option<serde_json::Value>,
}

/// Fetches `<scheme>://<hostname>/.well-known/browserid`.
#[derive(Debug, Clone)]
pub struct HttpOriginFetcher {
    client: Client,
    scheme: String,
}

impl HttpOriginFetcher {
    pub fn new(timeout: Duration) -> WorkerResult<Self> {
        Self::with_scheme("https", timeout)
    }

    /// Use a different scheme (plain `http` for local issuers and tests).
    pub fn with_scheme(scheme: &str, timeout: Duration) -> WorkerResult<Self> {
        if scheme != "https" && scheme != "http" {
            return Err(WorkerError::Config {
                message: format!("unsupported fetch scheme {}", scheme),
            });
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT_VALUE)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WorkerError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            scheme: scheme.to_string(),
        })
    }

    fn document_url(&self, hostname: &str) -> WorkerResult<String> {
        validate_hostname(hostname)?;
        Ok(format!("{}://{}{}", self.scheme, hostname, SUPPORT_DOCUMENT_PATH))
    }
}

#[async_trait]
impl OriginFetcher for HttpOriginFetcher {
    async fn fetch_public_key(&self, hostname: &str) -> WorkerResult<KeyMaterial> {
        let fetch_error = |message: String| WorkerError::Fetch {
            hostname: hostname.to_string(),
            message,
        };

        let url = self.document_url(hostname)?;
        debug!(url = %url, "fetching support document");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("unexpected status {}", status)));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_DOCUMENT_BYTES {
                return Err(fetch_error(format!("support document too large: {} bytes", len)));
            }
        }

        let document: SupportDocument = response
            .json()
            .await
            .map_err(|e| fetch_error(format!("invalid support document: {}", e)))?;

        match document.public_key {
            Some(key) if key.is_object() => Ok(KeyMaterial::new(key)),
            Some(_) => Err(fetch_error("public-key is not an object".to_string())),
            None => Err(fetch_error("support document has no public-key".to_string())),
        }
    }
}

/// Hostnames go straight into a URL authority, so only allow authority characters.
fn validate_hostname(hostname: &str) -> WorkerResult<()> {
    let valid = !hostname.is_empty()
        && hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'));

    if valid {
        Ok(())
    } else {
        Err(WorkerError::Fetch {
            hostname: hostname.to_string(),
            message: "invalid hostname".to_string(),
        })
    }
}
