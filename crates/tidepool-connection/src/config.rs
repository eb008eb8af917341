//! Manager configuration

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tidepool_core::{Result, TidepoolError};

use crate::pool::PoolConfig;
use crate::reaper::ReapPolicy;
use crate::retry::RetryPolicy;

/// Where and as whom to connect
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    /// Database user; also the user whose sessions the reaper inspects
    pub user: String,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 3306,
            user: "root".into(),
            password: None,
            database: None,
        }
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("database", &self.database)
            .finish()
    }
}

/// Configuration for a `ConnectionManager`
///
/// Loaded from TOML; every field is optional and falls back to its default.
///
/// ```toml
/// keep_alive = 2
/// conn_utilization = 0.75
///
/// [connection]
/// host = "db.internal"
/// user = "app"
///
/// [pool]
/// max_size = 20
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    connection: ConnectionParams,
    pool: PoolConfig,
    /// Total acquisition attempts
    max_retries: u32,
    /// Delay between acquisition attempts
    retry_delay_ms: u64,
    /// Idle connections a flush leaves in place
    keep_alive: usize,
    /// Whether flush reaps zombie sessions on the server
    zombie_cleanup: bool,
    /// Server-side utilization above which sessions are reaped aggressively
    conn_utilization: f64,
    /// How long the connection ceiling is cached
    max_conns_freq_ms: u64,
    /// How long the usage snapshot is cached
    used_conns_freq_ms: u64,
    zombie_min_timeout_secs: u64,
    zombie_max_timeout_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionParams::default(),
            pool: PoolConfig::default(),
            max_retries: 3,
            retry_delay_ms: 100,
            keep_alive: 0,
            zombie_cleanup: true,
            conn_utilization: 0.8,
            max_conns_freq_ms: 15_000,
            used_conns_freq_ms: 0,
            zombie_min_timeout_secs: 3,
            zombie_max_timeout_secs: 900,
        }
    }
}

impl ManagerConfig {
    pub fn new(connection: ConnectionParams) -> Self {
        Self {
            connection,
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading manager configuration");
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Reject combinations the manager cannot run with
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;

        if self.max_retries == 0 {
            return Err(TidepoolError::Configuration(
                "max_retries must be at least 1".into(),
            ));
        }
        if self.keep_alive > self.pool.max_size() {
            return Err(TidepoolError::Configuration(format!(
                "keep_alive ({}) cannot exceed pool.max_size ({})",
                self.keep_alive,
                self.pool.max_size()
            )));
        }
        if !(self.conn_utilization > 0.0 && self.conn_utilization <= 1.0) {
            return Err(TidepoolError::Configuration(format!(
                "conn_utilization must be in (0, 1], got {}",
                self.conn_utilization
            )));
        }
        if self.zombie_min_timeout_secs > self.zombie_max_timeout_secs {
            return Err(TidepoolError::Configuration(format!(
                "zombie_min_timeout_secs ({}) cannot exceed zombie_max_timeout_secs ({})",
                self.zombie_min_timeout_secs, self.zombie_max_timeout_secs
            )));
        }
        if self.connection.user.is_empty() {
            return Err(TidepoolError::Configuration(
                "connection.user must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: usize) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_zombie_cleanup(mut self, enabled: bool) -> Self {
        self.zombie_cleanup = enabled;
        self
    }

    pub fn with_conn_utilization(mut self, threshold: f64) -> Self {
        self.conn_utilization = threshold;
        self
    }

    pub fn with_max_conns_freq_ms(mut self, ttl_ms: u64) -> Self {
        self.max_conns_freq_ms = ttl_ms;
        self
    }

    pub fn with_used_conns_freq_ms(mut self, ttl_ms: u64) -> Self {
        self.used_conns_freq_ms = ttl_ms;
        self
    }

    pub fn with_zombie_timeouts_secs(mut self, min_secs: u64, max_secs: u64) -> Self {
        self.zombie_min_timeout_secs = min_secs;
        self.zombie_max_timeout_secs = max_secs;
        self
    }

    pub fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn keep_alive(&self) -> usize {
        self.keep_alive
    }

    pub fn zombie_cleanup(&self) -> bool {
        self.zombie_cleanup
    }

    pub fn conn_utilization(&self) -> f64 {
        self.conn_utilization
    }

    pub fn max_conns_freq(&self) -> Duration {
        Duration::from_millis(self.max_conns_freq_ms)
    }

    pub fn used_conns_freq(&self) -> Duration {
        Duration::from_millis(self.used_conns_freq_ms)
    }

    pub fn zombie_min_timeout(&self) -> Duration {
        Duration::from_secs(self.zombie_min_timeout_secs)
    }

    pub fn zombie_max_timeout(&self) -> Duration {
        Duration::from_secs(self.zombie_max_timeout_secs)
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay())
    }

    pub(crate) fn reap_policy(&self) -> ReapPolicy {
        ReapPolicy::new(
            self.conn_utilization,
            self.zombie_min_timeout_secs,
            self.zombie_max_timeout_secs,
        )
    }
}
