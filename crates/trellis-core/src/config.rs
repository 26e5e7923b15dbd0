//! Driver configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default MySQL port.
pub const DEFAULT_PORT: u16 = 3306;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings consumed by storage-driver implementations.
///
/// The read replica, when set, receives statements executed with
/// `Intent::Read`; everything else goes to the primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Primary server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database (schema) name.
    pub database: String,
    /// Authentication user.
    pub username: String,
    /// Authentication password.
    pub password: String,
    /// Optional read-replica host for read-intent statements.
    pub read_replica: Option<String>,
    /// Maximum pooled connections per host.
    pub pool_size: u32,
    /// Connect timeout.
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    /// Create a configuration for the given database on the default host.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: database.into(),
            username: "root".to_string(),
            password: String::new(),
            read_replica: None,
            pool_size: 10,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the primary host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Route read-intent statements to a replica host.
    pub fn with_read_replica(mut self, host: impl Into<String>) -> Self {
        self.read_replica = Some(host.into());
        self
    }

    /// Set the pool size.
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }
}

mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
