// SPDX-License-Identifier: Apache-2.0

//! Configuration for YDB connections

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{YdbError, YdbResult};

/// Prefix of every URL accepted by the driver
pub const JDBC_YDB_PREFIX: &str = "jdbc:ydb:";

/// Default gRPC port of a YDB endpoint
pub const DEFAULT_PORT: u16 = 2135;

/// Complete configuration of a YDB connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YdbConfig {
    /// Where and how to connect
    #[serde(default)]
    pub connection: ConnectionProperties,

    /// Table client settings
    #[serde(default)]
    pub client: ClientProperties,

    /// Per-operation settings
    #[serde(default)]
    pub operation: OperationProperties,
}

/// Transport level connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionProperties {
    /// gRPC endpoint (e.g., "grpc://localhost:2135")
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Database path (e.g., "/local")
    #[serde(default)]
    pub database: String,

    /// Use TLS for the transport
    #[serde(default)]
    pub secure: bool,

    /// Access token, never serialized
    #[serde(skip_serializing, default)]
    pub token: Option<String>,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            database: String::new(),
            secure: false,
            token: None,
        }
    }
}

impl ConnectionProperties {
    /// Whether a token is configured
    pub fn has_auth(&self) -> bool {
        self.token.is_some()
    }
}

// Implement Debug manually to avoid printing the token
impl std::fmt::Debug for ConnectionProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProperties")
            .field("endpoint", &self.endpoint)
            .field("database", &self.database)
            .field("secure", &self.secure)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Table client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientProperties {
    /// Minimum number of sessions kept by the table client
    #[serde(default = "default_session_pool_size_min")]
    pub session_pool_size_min: u32,

    /// Maximum number of sessions kept by the table client
    #[serde(default = "default_session_pool_size_max")]
    pub session_pool_size_max: u32,

    /// Keep-alive interval for idle sessions in milliseconds
    #[serde(default = "default_session_keep_alive")]
    pub session_keep_alive_ms: u64,

    /// Idle time after which a session is dropped, in milliseconds
    #[serde(default = "default_session_max_idle")]
    pub session_max_idle_ms: u64,
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            session_pool_size_min: default_session_pool_size_min(),
            session_pool_size_max: default_session_pool_size_max(),
            session_keep_alive_ms: default_session_keep_alive(),
            session_max_idle_ms: default_session_max_idle(),
        }
    }
}

impl ClientProperties {
    pub fn session_keep_alive(&self) -> Duration {
        Duration::from_millis(self.session_keep_alive_ms)
    }

    pub fn session_max_idle(&self) -> Duration {
        Duration::from_millis(self.session_max_idle_ms)
    }
}

/// Per-operation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationProperties {
    /// Timeout for obtaining a session in milliseconds
    #[serde(default = "default_session_timeout")]
    pub session_timeout_ms: u64,

    /// Cumulative deadline of a single operation in milliseconds
    #[serde(default = "default_deadline_timeout")]
    pub deadline_timeout_ms: u64,

    /// Cumulative deadline of a scan query in milliseconds
    #[serde(default = "default_scan_query_timeout")]
    pub scan_query_timeout_ms: u64,

    /// Maximum number of retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Share transport and clients between connections with equal settings
    #[serde(default = "default_cache_connections")]
    pub cache_connections_in_driver: bool,

    /// Raise an error when reading past the end of a truncated result
    #[serde(default = "default_fail_on_truncated")]
    pub fail_on_truncated_result: bool,

    /// Row cap the server applies to a single data query result
    #[serde(default = "default_result_row_limit")]
    pub result_row_limit: usize,

    /// Name of the list parameter carrying batched rows
    #[serde(default = "default_batch_parameter")]
    pub batch_parameter: String,

    /// Commit every data query on its own; otherwise queries share a
    /// transaction until commit or rollback
    #[serde(default = "default_auto_commit")]
    pub auto_commit: bool,
}

impl Default for OperationProperties {
    fn default() -> Self {
        Self {
            session_timeout_ms: default_session_timeout(),
            deadline_timeout_ms: default_deadline_timeout(),
            scan_query_timeout_ms: default_scan_query_timeout(),
            max_retries: default_max_retries(),
            cache_connections_in_driver: default_cache_connections(),
            fail_on_truncated_result: default_fail_on_truncated(),
            result_row_limit: default_result_row_limit(),
            batch_parameter: default_batch_parameter(),
            auto_commit: default_auto_commit(),
        }
    }
}

impl OperationProperties {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn deadline_timeout(&self) -> Duration {
        Duration::from_millis(self.deadline_timeout_ms)
    }

    pub fn scan_query_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_query_timeout_ms)
    }
}

/// Connection URL after parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    /// `grpcs://` was requested
    pub secure: bool,
    /// Lowercased host name
    pub host: String,
    pub port: u16,
    /// Database path with a leading `/`, empty when not given
    pub database: String,
    /// Properties from the URL merged with the explicit ones
    pub properties: BTreeMap<String, String>,
}

impl ParsedUrl {
    /// Normalized address, `grpc[s]://host:port/database`
    pub fn address(&self) -> String {
        let scheme = if self.secure { "grpcs" } else { "grpc" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, self.database)
    }
}

impl YdbConfig {
    /// Whether `url` addresses a YDB database
    pub fn accepts_url(url: &str) -> bool {
        url.starts_with(JDBC_YDB_PREFIX)
    }

    /// Parse a `jdbc:ydb:` URL, merging its query string with `properties`.
    ///
    /// Explicit properties take precedence over the query string.
    pub fn parse_url<'a, I>(url: &str, properties: I) -> YdbResult<ParsedUrl>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let rest = url
            .strip_prefix(JDBC_YDB_PREFIX)
            .ok_or_else(|| YdbError::InvalidUrl(format!("expected {} prefix: {}", JDBC_YDB_PREFIX, url)))?;

        let with_scheme = if rest.contains("://") {
            rest.to_string()
        } else {
            format!("grpc://{}", rest)
        };
        let parsed = Url::parse(&with_scheme)?;

        let scheme = parsed.scheme();
        if scheme != "grpc" && scheme != "grpcs" {
            return Err(YdbError::InvalidUrl(format!(
                "expected grpc:// or grpcs:// scheme, got: {}",
                scheme
            )));
        }
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| YdbError::InvalidUrl("missing host in URL".to_string()))?;

        let mut merged: BTreeMap<String, String> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        for (key, value) in properties {
            merged.insert(key.clone(), value.clone());
        }

        let database = match merged.get("database") {
            Some(database) => normalize_database(database),
            None => normalize_database(parsed.path()),
        };

        Ok(ParsedUrl {
            secure: scheme == "grpcs",
            host: host.to_ascii_lowercase(),
            port: parsed.port().unwrap_or(DEFAULT_PORT),
            database,
            properties: merged,
        })
    }

    /// Build the configuration described by a parsed URL
    pub fn from_parsed(parsed: &ParsedUrl) -> YdbResult<Self> {
        let mut config = YdbConfig::default();
        config.connection.secure = parsed.secure;
        config.connection.database = parsed.database.clone();

        for (key, value) in &parsed.properties {
            config.apply_property(key, value)?;
        }

        let scheme = if config.connection.secure { "grpcs" } else { "grpc" };
        config.connection.endpoint = format!("{}://{}:{}", scheme, parsed.host, parsed.port);
        Ok(config)
    }

    fn apply_property(&mut self, key: &str, value: &str) -> YdbResult<()> {
        let connection = &mut self.connection;
        let client = &mut self.client;
        let operation = &mut self.operation;
        match key {
            "token" => connection.token = Some(value.to_string()),
            "secureConnection" => connection.secure = parse_bool(key, value)?,
            "database" => connection.database = normalize_database(value),
            "autoCommit" => operation.auto_commit = parse_bool(key, value)?,
            "cacheConnectionsInDriver" => {
                operation.cache_connections_in_driver = parse_bool(key, value)?
            }
            "sessionTimeout" => operation.session_timeout_ms = parse_duration_ms(key, value)?,
            "deadlineTimeout" => operation.deadline_timeout_ms = parse_duration_ms(key, value)?,
            "scanQueryTimeout" => operation.scan_query_timeout_ms = parse_duration_ms(key, value)?,
            "maxRetries" => operation.max_retries = parse_number(key, value)?,
            "failOnTruncatedResult" => operation.fail_on_truncated_result = parse_bool(key, value)?,
            "resultRowLimit" => operation.result_row_limit = parse_number(key, value)?,
            "batchParameter" => operation.batch_parameter = value.to_string(),
            "sessionPoolSizeMin" => client.session_pool_size_min = parse_number(key, value)?,
            "sessionPoolSizeMax" => client.session_pool_size_max = parse_number(key, value)?,
            "sessionKeepAliveTime" => client.session_keep_alive_ms = parse_duration_ms(key, value)?,
            "sessionMaxIdleTime" => client.session_max_idle_ms = parse_duration_ms(key, value)?,
            other => debug!("Ignoring unknown YDB property: {}", other),
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> YdbResult<()> {
        if self.client.session_pool_size_min > self.client.session_pool_size_max {
            return Err(YdbError::InvalidConfig(format!(
                "sessionPoolSizeMin ({}) must not exceed sessionPoolSizeMax ({})",
                self.client.session_pool_size_min, self.client.session_pool_size_max
            )));
        }
        if self.operation.result_row_limit == 0 {
            return Err(YdbError::InvalidConfig(
                "resultRowLimit must be > 0".to_string(),
            ));
        }
        if self.operation.batch_parameter.trim_start_matches('$').is_empty() {
            return Err(YdbError::InvalidConfig(
                "batchParameter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Database path with exactly one leading `/` and no trailing one
fn normalize_database(path: &str) -> String {
    let path = path.trim().trim_matches('/');
    if path.is_empty() {
        String::new()
    } else {
        format!("/{}", path)
    }
}

fn parse_bool(key: &str, value: &str) -> YdbResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(YdbError::InvalidConfig(format!(
            "invalid boolean for {}: {}",
            key, value
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> YdbResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| YdbError::InvalidConfig(format!("invalid number for {}: {}", key, value)))
}

/// Parse `150ms`, `5s`, `2m` or a bare millisecond count
fn parse_duration_ms(key: &str, value: &str) -> YdbResult<u64> {
    let value = value.trim();
    let (digits, factor) = if let Some(v) = value.strip_suffix("ms") {
        (v, 1)
    } else if let Some(v) = value.strip_suffix('s') {
        (v, 1_000)
    } else if let Some(v) = value.strip_suffix('m') {
        (v, 60_000)
    } else {
        (value, 1)
    };
    let amount: u64 = parse_number(key, digits)?;
    amount
        .checked_mul(factor)
        .ok_or_else(|| YdbError::InvalidConfig(format!("duration too large for {}: {}", key, value)))
}

fn default_endpoint() -> String {
    format!("grpc://localhost:{}", DEFAULT_PORT)
}

// Default value functions for the table client
fn default_session_pool_size_min() -> u32 {
    0
}

fn default_session_pool_size_max() -> u32 {
    50
}

fn default_session_keep_alive() -> u64 {
    300_000 // 5 minutes
}

fn default_session_max_idle() -> u64 {
    60_000 // 1 minute
}

// Default value functions for operations
fn default_session_timeout() -> u64 {
    5_000 // 5 seconds
}

fn default_deadline_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_scan_query_timeout() -> u64 {
    300_000 // 5 minutes
}

fn default_max_retries() -> u32 {
    3
}

fn default_cache_connections() -> bool {
    true
}

fn default_fail_on_truncated() -> bool {
    true
}

fn default_result_row_limit() -> usize {
    1000
}

fn default_batch_parameter() -> String {
    "$values".to_string()
}

fn default_auto_commit() -> bool {
    true
}
