//! Worker configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{WorkerError, WorkerResult};

/// Section name accepted as a wrapper in configuration files.
pub const CONFIG_SECTION: &str = "crypto-worker";

/// Construction-time settings of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Memory-tier TTL in seconds (0 = never expire).
    #[serde(default = "default_memory_ttl")]
    pub memory_ttl: u64,

    /// Keep a process-local memory tier.
    #[serde(default = "default_memory_cache")]
    pub memory_cache: bool,

    /// Shared-tier address; absent disables the shared tier.
    #[serde(default)]
    pub memcache_host: Option<String>,

    /// Shared-tier TTL in seconds. Required when `memcache_host` is set.
    #[serde(default)]
    pub memcache_ttl: Option<u64>,

    /// Seed the load-test certificate.
    #[serde(default)]
    pub loadtest_mode: bool,

    /// Origin fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Origin fetch scheme (`https`, or `http` for local issuers).
    #[serde(default = "default_fetch_scheme")]
    pub fetch_scheme: String,
}

fn default_memory_ttl() -> u64 {
    10 * 60
}

fn default_memory_cache() -> bool {
    true
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_fetch_scheme() -> String {
    "https".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            memory_ttl: default_memory_ttl(),
            memory_cache: default_memory_cache(),
            memcache_host: None,
            memcache_ttl: None,
            loadtest_mode: false,
            fetch_timeout_secs: default_fetch_timeout(),
            fetch_scheme: default_fetch_scheme(),
        }
    }
}

impl WorkerConfig {
    /// Load from a YAML file. Settings may sit at the top level or under a
    /// `crypto-worker` section.
    pub fn from_file(path: impl AsRef<Path>) -> WorkerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| WorkerError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> WorkerResult<Self> {
        let parse_error = |e: serde_yaml::Error| WorkerError::Config {
            message: format!("invalid configuration: {}", e),
        };

        let mut document: serde_yaml::Value = serde_yaml::from_str(text).map_err(parse_error)?;
        if document.is_null() {
            return Ok(Self::default());
        }
        if let Some(section) = document.get(CONFIG_SECTION) {
            document = section.clone();
        }
        serde_yaml::from_value(document).map_err(parse_error)
    }

    /// Defaults overridden by the environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `CERTWORKER_MEMORY_TTL` | `memory_ttl` |
    /// | `CERTWORKER_MEMORY_CACHE` | `memory_cache` |
    /// | `CERTWORKER_MEMCACHE_HOST` | `memcache_host` |
    /// | `CERTWORKER_MEMCACHE_TTL` | `memcache_ttl` |
    /// | `CERTWORKER_LOADTEST_MODE` | `loadtest_mode` |
    /// | `CERTWORKER_FETCH_TIMEOUT` | `fetch_timeout_secs` |
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ttl) = env_parse("CERTWORKER_MEMORY_TTL") {
            self.memory_ttl = ttl;
        }
        if let Some(enabled) = env_flag("CERTWORKER_MEMORY_CACHE") {
            self.memory_cache = enabled;
        }
        if let Ok(host) = std::env::var("CERTWORKER_MEMCACHE_HOST") {
            if !host.is_empty() {
                self.memcache_host = Some(host);
            }
        }
        if let Some(ttl) = env_parse("CERTWORKER_MEMCACHE_TTL") {
            self.memcache_ttl = Some(ttl);
        }
        if let Some(enabled) = env_flag("CERTWORKER_LOADTEST_MODE") {
            self.loadtest_mode = enabled;
        }
        if let Some(timeout) = env_parse("CERTWORKER_FETCH_TIMEOUT") {
            self.fetch_timeout_secs = timeout;
        }
        self
    }

    /// Reject combinations the worker cannot start with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.memcache_host.is_some() && self.memcache_ttl.is_none() {
            return Err(WorkerError::Config {
                message: "memcache_ttl is required when memcache_host is set".to_string(),
            });
        }
        if self.loadtest_mode && !self.memory_cache {
            return Err(WorkerError::Config {
                message: "loadtest_mode requires the memory cache".to_string(),
            });
        }
        if self.fetch_scheme != "https" && self.fetch_scheme != "http" {
            return Err(WorkerError::Config {
                message: format!("unsupported fetch_scheme {}", self.fetch_scheme),
            });
        }
        Ok(())
    }

    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl)
    }

    pub fn memcache_ttl(&self) -> Option<Duration> {
        self.memcache_ttl.map(Duration::from_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn with_memory_ttl(mut self, seconds: u64) -> Self {
        self.memory_ttl = seconds;
        self
    }

    /// Enable the shared tier.
    pub fn with_memcache(mut self, host: impl Into<String>, ttl_seconds: u64) -> Self {
        self.memcache_host = Some(host.into());
        self.memcache_ttl = Some(ttl_seconds);
        self
    }

    pub fn with_memory_cache(mut self, enabled: bool) -> Self {
        self.memory_cache = enabled;
        self
    }

    pub fn with_loadtest_mode(mut self, enabled: bool) -> Self {
        self.loadtest_mode = enabled;
        self
    }

    pub fn with_fetch_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.fetch_scheme = scheme.into();
        self
    }
}

fn env_parse(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.memory_ttl(), Duration::from_secs(600));
        assert!(config.memcache_host.is_none());
        assert!(!config.loadtest_mode);
        config.validate().unwrap();
    }

    #[test]
    fn test_yaml_with_section() {
        let config = WorkerConfig::from_yaml(
            "crypto-worker:\n  memory_ttl: 60\n  memcache_host: cache:6379\n  memcache_ttl: 300\n  loadtest_mode: true\n",
        )
        .unwrap();

        assert_eq!(config.memory_ttl, 60);
        assert_eq!(config.memcache_host.as_deref(), Some("cache:6379"));
        assert_eq!(config.memcache_ttl(), Some(Duration::from_secs(300)));
        assert!(config.loadtest_mode);
    }

    #[test]
    fn test_yaml_top_level_and_empty() {
        let config = WorkerConfig::from_yaml("memory_ttl: 5\n").unwrap();
        assert_eq!(config.memory_ttl, 5);
        assert_eq!(WorkerConfig::from_yaml("").unwrap(), WorkerConfig::default());
    }

    #[test]
    fn test_yaml_rejects_unknown_keys() {
        assert!(matches!(
            WorkerConfig::from_yaml("memory_tll: 5\n"),
            Err(WorkerError::Config { .. })
        ));
    }

    #[test]
    fn test_shared_tier_requires_ttl() {
        let config = WorkerConfig {
            memcache_host: Some("cache:6379".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(WorkerError::Config { .. })));

        WorkerConfig::default()
            .with_memcache("cache:6379", 300)
            .validate()
            .unwrap();
    }

    #[test]
    fn test_memory_cache_can_be_disabled() {
        let config = WorkerConfig::from_yaml("memory_cache: false\n").unwrap();
        assert!(!config.memory_cache);
        config.validate().unwrap();

        let loadtest = config.with_loadtest_mode(true);
        assert!(matches!(loadtest.validate(), Err(WorkerError::Config { .. })));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.yaml");
        std::fs::write(&path, "memory_ttl: 42\nfetch_scheme: http\n").unwrap();

        let config = WorkerConfig::from_file(&path).unwrap();
        assert_eq!(config.memory_ttl, 42);
        assert_eq!(config.fetch_scheme, "http");

        assert!(WorkerConfig::from_file(dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("CERTWORKER_MEMORY_TTL", "7");
        std::env::set_var("CERTWORKER_LOADTEST_MODE", "true");
        std::env::set_var("CERTWORKER_MEMCACHE_TTL", "not-a-number");

        let config = WorkerConfig::from_env();

        std::env::remove_var("CERTWORKER_MEMORY_TTL");
        std::env::remove_var("CERTWORKER_LOADTEST_MODE");
        std::env::remove_var("CERTWORKER_MEMCACHE_TTL");

        assert_eq!(config.memory_ttl, 7);
        assert!(config.loadtest_mode);
        assert_eq!(config.memcache_ttl, None);
    }
}
