//! Immutable connection settings for the SSO ticket service.
//!
//! # Design
//! Everything the client needs to reach the service lives in one value that
//! is handed to `SsoClient` at construction and never mutated afterwards.
//! `ClientConfig::from_env` is the only place the process environment is
//! read; tests go through `from_lookup` with a closure instead.

use std::time::Duration;

use crate::error::ConfigError;

/// Path of the ticket lookup endpoint on the SSO service.
pub const DEFAULT_FETCH_PATH: &str = "/bms-sso/fetch-by-ticket";

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound for a single chunk and for a whole body.
pub const DEFAULT_MAX_BODY_SIZE: u64 = 100 * 1024 * 1024;

/// Upper bound for a status, header or chunk-size line, terminator included.
pub const DEFAULT_MAX_LINE_LEN: usize = 8 * 1024;

/// Where the SSO service lives.
///
/// `host` is what the socket connects to (often a bare IP), `host_header`
/// is what goes into the `Host:` header so a virtual-host front end routes
/// the request correctly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub host_header: String,
    pub request_path: String,
}

impl Endpoint {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            host_header: host.to_string(),
            request_path: DEFAULT_FETCH_PATH.to_string(),
        }
    }

    pub fn with_host_header(mut self, host_header: &str) -> Self {
        self.host_header = host_header.to_string();
        self
    }

    pub fn with_request_path(mut self, path: &str) -> Self {
        self.request_path = path.to_string();
        self
    }

    /// `host:port`, as passed to address resolution.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Full client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub connect_timeout: Duration,
    /// Per-read and per-write socket timeout.
    pub io_timeout: Duration,
    /// Bound on a whole exchange, from the first write to the last body byte.
    pub deadline: Option<Duration>,
    pub max_body_size: u64,
    pub max_line_len: usize,
}

impl ClientConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            deadline: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Load from `SSO_*` environment variables.
    ///
    /// | variable                 | default                     |
    /// |--------------------------|-----------------------------|
    /// | `SSO_HOST`               | `127.0.0.1`                 |
    /// | `SSO_PORT`               | `80`                        |
    /// | `SSO_HOST_HEADER`        | value of `SSO_HOST`         |
    /// | `SSO_FETCH_PATH`         | `/bms-sso/fetch-by-ticket`  |
    /// | `SSO_CONNECT_TIMEOUT_MS` | `3000`                      |
    /// | `SSO_IO_TIMEOUT_MS`      | `3000`                      |
    /// | `SSO_DEADLINE_MS`        | unset (no overall deadline) |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("SSO_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        if host.trim().is_empty() {
            return Err(ConfigError::Empty("SSO_HOST"));
        }
        let port = match lookup("SSO_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "SSO_PORT",
                expected: "port number",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let mut endpoint = Endpoint::new(host.trim(), port);
        if let Some(host_header) = lookup("SSO_HOST_HEADER") {
            endpoint = endpoint.with_host_header(host_header.trim());
        }
        if let Some(path) = lookup("SSO_FETCH_PATH") {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid {
                    name: "SSO_FETCH_PATH",
                    expected: "absolute path",
                    value: path,
                });
            }
            endpoint = endpoint.with_request_path(&path);
        }

        let mut config = ClientConfig::new(endpoint);
        if let Some(ms) = millis(&lookup, "SSO_CONNECT_TIMEOUT_MS")? {
            config.connect_timeout = ms;
        }
        if let Some(ms) = millis(&lookup, "SSO_IO_TIMEOUT_MS")? {
            config.io_timeout = ms;
        }
        config.deadline = millis(&lookup, "SSO_DEADLINE_MS")?;
        Ok(config)
    }
}

fn millis<F>(lookup: &F, name: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Some(Duration::from_millis(ms))),
        _ => Err(ConfigError::Invalid {
            name,
            expected: "positive millisecond count",
            value: raw,
        }),
    }
}
