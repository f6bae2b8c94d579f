//! Store configuration.
//!
//! # Example
//! ```rust,ignore
//! use ouroboros_redis::RedisConfig;
//!
//! // From environment
//! let config = RedisConfig::from_env()?;
//!
//! // From the deployment YAML
//! let config = RedisConfig::from_yaml_str("hosts: [\"10.0.0.1:6379\"]\npoolSize: 20\n")?;
//!
//! // Or explicit configuration
//! let config = RedisConfig::new(["127.0.0.1:6379"]).pool_size(4).db(2);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::topology::{parse_host, Topology};
use crate::StoreError;

/// Redis store configuration
///
/// Field names follow the camelCase keys of the YAML files the services
/// already ship (`masterName`, `poolSize`, ...).
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RedisConfig {
    /// Sentinel master name; empty disables failover resolution
    pub master_name: String,
    /// Password for the data nodes (empty = no AUTH)
    pub password: String,
    /// Maximum pooled connections
    pub pool_size: usize,
    /// Logical database index
    pub db: i64,
    /// Node addresses as `host:port`
    pub hosts: Vec<String>,
    /// Per-call timeout in milliseconds (none = calls may block indefinitely)
    pub call_timeout_ms: Option<u64>,
    /// Maximum concurrently running subscriber callbacks
    pub subscriber_workers: usize,
    /// COUNT hint for each SSCAN page
    pub scan_count: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            master_name: String::new(),
            password: String::new(),
            pool_size: 10,
            db: 0,
            hosts: vec!["127.0.0.1:6379".to_string()],
            call_timeout_ms: None,
            subscriber_workers: 16,
            scan_count: 100,
        }
    }
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("master_name", &self.master_name)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("pool_size", &self.pool_size)
            .field("db", &self.db)
            .field("hosts", &self.hosts)
            .field("call_timeout_ms", &self.call_timeout_ms)
            .field("subscriber_workers", &self.subscriber_workers)
            .field("scan_count", &self.scan_count)
            .finish()
    }
}

impl RedisConfig {
    /// Create a config for the given node addresses
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the sentinel master name
    pub fn master_name(mut self, name: impl Into<String>) -> Self {
        self.master_name = name.into();
        self
    }

    /// Set the password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set maximum pool size
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the logical database
    pub fn db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// Set the default per-call timeout
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the subscriber worker pool size
    pub fn subscriber_workers(mut self, workers: usize) -> Self {
        self.subscriber_workers = workers;
        self
    }

    /// Set the SSCAN page hint
    pub fn scan_count(mut self, count: usize) -> Self {
        self.scan_count = count;
        self
    }

    /// Default per-call timeout
    pub fn call_timeout_duration(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, StoreError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| StoreError::Configuration(format!("Invalid YAML config: {}", e)))
    }

    /// Load a YAML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Create configuration from environment variables.
    ///
    /// Reads `REDIS_HOSTS` (comma separated), `REDIS_MASTER_NAME`,
    /// `REDIS_PASSWORD`, `REDIS_DB`, `REDIS_POOL_SIZE`,
    /// `REDIS_CALL_TIMEOUT_MS`, `REDIS_SUBSCRIBER_WORKERS` and
    /// `REDIS_SCAN_COUNT`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`RedisConfig::from_env`] with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(hosts) = lookup("REDIS_HOSTS") {
            config.hosts = hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(name) = lookup("REDIS_MASTER_NAME") {
            config.master_name = name;
        }
        if let Some(password) = lookup("REDIS_PASSWORD") {
            config.password = password;
        }
        if let Some(db) = lookup("REDIS_DB") {
            config.db = parse_var("REDIS_DB", &db)?;
        }
        if let Some(size) = lookup("REDIS_POOL_SIZE") {
            config.pool_size = parse_var("REDIS_POOL_SIZE", &size)?;
        }
        if let Some(ms) = lookup("REDIS_CALL_TIMEOUT_MS") {
            config.call_timeout_ms = Some(parse_var("REDIS_CALL_TIMEOUT_MS", &ms)?);
        }
        if let Some(workers) = lookup("REDIS_SUBSCRIBER_WORKERS") {
            config.subscriber_workers = parse_var("REDIS_SUBSCRIBER_WORKERS", &workers)?;
        }
        if let Some(count) = lookup("REDIS_SCAN_COUNT") {
            config.scan_count = parse_var("REDIS_SCAN_COUNT", &count)?;
        }

        Ok(config)
    }

    /// Check the configuration before any connection is attempted
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.hosts.is_empty() {
            return Err(StoreError::Configuration(
                "At least one host is required".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(StoreError::Configuration(
                "poolSize must be greater than zero".to_string(),
            ));
        }
        if self.subscriber_workers == 0 {
            return Err(StoreError::Configuration(
                "subscriberWorkers must be greater than zero".to_string(),
            ));
        }
        if self.scan_count == 0 {
            return Err(StoreError::Configuration(
                "scanCount must be greater than zero".to_string(),
            ));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(StoreError::Configuration(
                "callTimeoutMs must be greater than zero".to_string(),
            ));
        }
        if self.db < 0 {
            return Err(StoreError::Configuration(format!(
                "db must not be negative, got {}",
                self.db
            )));
        }
        for host in &self.hosts {
            parse_host(host)?;
        }
        if matches!(self.topology()?, Topology::Cluster { .. }) && self.db != 0 {
            return Err(StoreError::Configuration(
                "Cluster mode only supports db 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Derive the deployment topology from master name and host count
    pub fn topology(&self) -> Result<Topology, StoreError> {
        Topology::from_config(self)
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        StoreError::Configuration(format!("Invalid value for {}: '{}' ({})", name, value, e))
    })
}
