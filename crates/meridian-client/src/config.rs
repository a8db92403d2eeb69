//! Client configuration.
//!
//! Loads and saves client configuration from TOML files.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::database::Api;
use crate::error::{ClientError, ClientResult};
use crate::pool::PoolConfig;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Project id.
    #[serde(default)]
    pub project: String,

    /// Instance id.
    #[serde(default)]
    pub instance: String,

    /// Database id.
    #[serde(default)]
    pub database: String,

    /// Sessions created up front by `DatabaseHandle::open`.
    #[serde(default)]
    pub min_sessions: usize,

    /// Maximum sessions checked out at once.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// How long to wait for a session, in milliseconds.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Idle time before a session is discarded, in seconds.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Maximum session lifetime, in seconds.
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
}

fn default_max_sessions() -> usize {
    100
}

fn default_acquire_timeout_ms() -> u64 {
    30_000
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_max_lifetime_secs() -> u64 {
    60 * 60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            instance: String::new(),
            database: String::new(),
            min_sessions: 0,
            max_sessions: default_max_sessions(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_lifetime_secs: default_max_lifetime_secs(),
        }
    }
}

impl ClientConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a file.
    pub fn save(&self, path: &Path) -> ClientResult<()> {
        let content = self.to_toml_string()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Serializes the configuration to TOML.
    pub fn to_toml_string(&self) -> ClientResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ClientResult<()> {
        for (field, value) in [
            ("project", &self.project),
            ("instance", &self.instance),
            ("database", &self.database),
        ] {
            if value.is_empty() {
                return Err(ClientError::InvalidConfig(format!("{} must be set", field)));
            }
        }
        self.pool_config().validate()
    }

    /// Returns the resource identity of the configured database.
    pub fn api(&self) -> Api {
        Api::new(&self.project, &self.instance, &self.database)
    }

    /// Returns the session pool configuration.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new()
            .min_sessions(self.min_sessions)
            .max_sessions(self.max_sessions)
            .acquire_timeout(Duration::from_millis(self.acquire_timeout_ms))
            .idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(self.max_lifetime_secs))
    }

    /// Returns a builder for configuration.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }
}

/// Builder for client configuration.
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the project.
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.config.project = project.into();
        self
    }

    /// Sets the instance.
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.config.instance = instance.into();
        self
    }

    /// Sets the database.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    /// Sets the minimum sessions.
    pub fn min_sessions(mut self, min: usize) -> Self {
        self.config.min_sessions = min;
        self
    }

    /// Sets the maximum sessions.
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config.max_sessions = max;
        self
    }

    /// Sets the acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquire_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
