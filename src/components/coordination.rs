//! Coordination-service client interface and the default connector.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::split_host_port;
use crate::config::CoordinationSetting;
use crate::error::{LegoError, Result};

/// A session with a coordination ensemble.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    fn name(&self) -> &str;

    /// Ensemble members as `host:port`.
    fn hosts(&self) -> &[String];

    fn session_timeout(&self) -> Duration;

    /// Ends the session. Calling it again is a no-op.
    async fn stop(&self) -> Result<()>;

    fn is_stopped(&self) -> bool;
}

/// Builds coordination clients from settings.
#[async_trait]
pub trait CoordinationConnector: Send + Sync {
    async fn connect(
        &self,
        instance: &str,
        setting: &CoordinationSetting,
    ) -> Result<Arc<dyn CoordinationClient>>;
}

/// Client that validates the ensemble list and opens its session on first
/// use.
#[derive(Debug)]
pub struct LazyCoordinationClient {
    name: String,
    hosts: Vec<String>,
    session_timeout: Duration,
    stopped: AtomicBool,
}

impl LazyCoordinationClient {
    pub fn new(name: &str, setting: &CoordinationSetting) -> Result<Self> {
        if setting.hosts.is_empty() {
            return Err(LegoError::config("coordination client requires hosts"));
        }
        if let Some(bad) = setting.hosts.iter().find(|h| split_host_port(h).is_none()) {
            return Err(LegoError::config(format!(
                "invalid coordination host '{}', expected host:port",
                bad
            )));
        }

        Ok(Self {
            name: name.to_string(),
            hosts: setting.hosts.clone(),
            session_timeout: setting.session_timeout(),
            stopped: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl CoordinationClient for LazyCoordinationClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn hosts(&self) -> &[String] {
        &self.hosts
    }

    fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    async fn stop(&self) -> Result<()> {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            info!(instance = %self.name, "coordination session stopped");
        }
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Connector producing [`LazyCoordinationClient`] handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCoordinationConnector;

#[async_trait]
impl CoordinationConnector for DefaultCoordinationConnector {
    async fn connect(
        &self,
        instance: &str,
        setting: &CoordinationSetting,
    ) -> Result<Arc<dyn CoordinationClient>> {
        Ok(Arc::new(LazyCoordinationClient::new(instance, setting)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setting(hosts: &[&str]) -> CoordinationSetting {
        CoordinationSetting {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connect_and_stop() {
        let client = DefaultCoordinationConnector
            .connect("zk", &setting(&["zk1:2181", "zk2:2181"]))
            .await
            .unwrap();

        assert_eq!(client.name(), "zk");
        assert_eq!(client.hosts().len(), 2);
        assert_eq!(client.session_timeout(), Duration::from_secs(5));

        client.stop().await.unwrap();
        client.stop().await.unwrap();
        assert!(client.is_stopped());
    }

    #[test]
    fn test_invalid_hosts() {
        assert!(LazyCoordinationClient::new("zk", &setting(&[])).is_err());
        assert!(LazyCoordinationClient::new("zk", &setting(&["zk1"])).is_err());
        assert!(LazyCoordinationClient::new("zk", &setting(&["zk1:port"])).is_err());
    }
}
