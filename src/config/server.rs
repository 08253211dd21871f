//! HTTP server configuration types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

use crate::error::LegoError;

const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// HTTP server configuration (`httpserver` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpServerSetting {
    /// Listen host.
    pub http_host: String,

    /// Listen port. Zero picks a free port.
    pub http_port: u16,

    /// Middleware names, applied in order (`cors`, `requestid`, `accesslog`).
    pub middleware: Vec<String>,

    /// Seconds granted to in-flight requests on graceful shutdown; zero
    /// falls back to the default. Accepts `30` or `1m30s`.
    #[serde(deserialize_with = "super::deserialize_seconds")]
    pub shutdown_timeout: u64,
}

impl Default for HttpServerSetting {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            middleware: Vec::new(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl HttpServerSetting {
    /// Resolves the listen address.
    pub fn socket_addr(&self) -> Result<SocketAddr, LegoError> {
        (self.http_host.as_str(), self.http_port)
            .to_socket_addrs()
            .map_err(|e| {
                LegoError::config_with_source(
                    format!("Invalid listen address {}:{}", self.http_host, self.http_port),
                    e,
                )
            })?
            .next()
            .ok_or_else(|| {
                LegoError::config(format!(
                    "Listen address {}:{} resolved to nothing",
                    self.http_host, self.http_port
                ))
            })
    }

    /// Graceful shutdown budget.
    pub fn shutdown_timeout(&self) -> Duration {
        match self.shutdown_timeout {
            0 => Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    /// Parses the middleware list, returning unknown names separately.
    pub fn middlewares(&self) -> (Vec<Middleware>, Vec<String>) {
        let mut known = Vec::new();
        let mut unknown = Vec::new();
        for name in &self.middleware {
            match name.parse::<Middleware>() {
                Ok(mw) if !known.contains(&mw) => known.push(mw),
                Ok(_) => {}
                Err(_) => unknown.push(name.clone()),
            }
        }
        (known, unknown)
    }
}

/// Middleware selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Middleware {
    /// Permissive CORS headers.
    Cors,
    /// Generates and propagates a request id header.
    RequestId,
    /// Writes one JSON access-log line per request.
    AccessLog,
}

impl fmt::Display for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Middleware::Cors => write!(f, "cors"),
            Middleware::RequestId => write!(f, "requestid"),
            Middleware::AccessLog => write!(f, "accesslog"),
        }
    }
}

impl FromStr for Middleware {
    type Err = LegoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cors" => Ok(Middleware::Cors),
            "requestid" | "request_id" => Ok(Middleware::RequestId),
            "accesslog" | "access_log" | "ydlogger" => Ok(Middleware::AccessLog),
            _ => Err(LegoError::config(format!("Unknown middleware: {}", s))),
        }
    }
}
