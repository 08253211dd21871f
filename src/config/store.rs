//! Data-store and coordination-service client settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default coordination session timeout in seconds.
const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 5;

/// Settings of one document-store instance.
///
/// Either `uri` or `hosts` must be present; `hosts` is a comma-separated
/// `host:port` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentStoreSetting {
    /// Full connection URI.
    pub uri: Option<String>,

    /// Comma-separated host list.
    pub hosts: Option<String>,

    /// Replica set name.
    pub replset: Option<String>,

    /// User name.
    pub username: Option<String>,

    /// Password.
    pub password: Option<String>,

    /// Upper bound of pooled connections.
    pub max_pool_size: Option<u64>,

    /// Lower bound of pooled connections.
    pub min_pool_size: Option<u64>,

    /// Seconds an idle pooled connection is kept.
    pub max_idle_time: Option<u64>,

    /// Read preference (`primary`, `secondary`, ...).
    pub read_preference: Option<String>,
}

impl DocumentStoreSetting {
    /// Host entries from `hosts`.
    pub fn host_list(&self) -> Vec<String> {
        self.hosts
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Idle timeout as a duration.
    pub fn max_idle(&self) -> Option<Duration> {
        self.max_idle_time.map(Duration::from_secs)
    }
}

/// Settings of one coordination-service client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationSetting {
    /// Ensemble members as `host:port`.
    pub hosts: Vec<String>,

    /// Session timeout in seconds; zero falls back to the default.
    #[serde(deserialize_with = "super::deserialize_seconds")]
    pub session_timeout: u64,
}

impl Default for CoordinationSetting {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            session_timeout: DEFAULT_SESSION_TIMEOUT_SECS,
        }
    }
}

impl CoordinationSetting {
    /// Effective session timeout.
    pub fn session_timeout(&self) -> Duration {
        if self.session_timeout == 0 {
            Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.session_timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_store_host_list() {
        let setting = DocumentStoreSetting {
            hosts: Some("db1:27017, db2:27017,".to_string()),
            ..Default::default()
        };
        assert_eq!(setting.host_list(), vec!["db1:27017", "db2:27017"]);
        assert!(DocumentStoreSetting::default().host_list().is_empty());
    }

    #[test]
    fn test_document_store_from_yaml() {
        let yaml = r#"
uri: "mongodb://db1:27017/orders"
max_pool_size: 20
min_pool_size: 2
max_idle_time: 30
read_preference: secondary
"#;
        let setting: DocumentStoreSetting = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(setting.uri.as_deref(), Some("mongodb://db1:27017/orders"));
        assert_eq!(setting.max_pool_size, Some(20));
        assert_eq!(setting.max_idle(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_coordination_session_timeout() {
        let setting = CoordinationSetting::default();
        assert_eq!(setting.session_timeout(), Duration::from_secs(5));

        let setting = CoordinationSetting {
            session_timeout: 0,
            ..Default::default()
        };
        assert_eq!(setting.session_timeout(), Duration::from_secs(5));

        let setting: CoordinationSetting =
            serde_yaml::from_str("hosts: [\"zk1:2181\"]\nsession_timeout: 12\n").unwrap();
        assert_eq!(setting.hosts, vec!["zk1:2181"]);
        assert_eq!(setting.session_timeout(), Duration::from_secs(12));

        let setting: CoordinationSetting =
            serde_yaml::from_str("hosts: [\"zk1:2181\"]\nsession_timeout: 1m\n").unwrap();
        assert_eq!(setting.session_timeout(), Duration::from_secs(60));
        assert!(serde_yaml::from_str::<CoordinationSetting>("session_timeout: soon\n").is_err());
    }
}
