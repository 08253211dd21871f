//! Configuration module for lego.
//!
//! The configuration provider keeps the parsed YAML document behind an
//! [`ArcSwap`] so that a file watcher can replace it while request handlers
//! and scheduled jobs keep reading. Values are addressed by dotted key paths
//! (`httpserver.http_port`) and converted on read; whole sections can be
//! deserialized into the typed settings structs re-exported here.
//!
//! Environment variables prefixed with `LEGO__` override file values, with
//! `__` separating path segments: `LEGO__APP__NAME=billing` sets `app.name`.

mod logging;
mod server;
mod store;
mod watcher;

pub use logging::{LogFormat, LogLevel, LogOutput, LogRotation, LogSetting};
pub use server::{HttpServerSetting, Middleware};
pub use store::{CoordinationSetting, DocumentStoreSetting};
pub use watcher::ConfigWatcher;

use arc_swap::ArcSwap;
use notify::RecommendedWatcher;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::env::Environment;
use crate::error::{LegoError, Result};

/// Prefix of environment variables that override configuration values.
pub const ENV_PREFIX: &str = "LEGO__";

/// Value of `<kind>.type` that switches a component kind to named instances.
pub const MULTI_INSTANCE_SIGN: &str = "multi";

/// One configured instance of a component kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceEntry {
    /// Instance name; empty in single-instance mode.
    pub name: String,
    /// Key path of the instance's settings section.
    pub key: String,
}

/// Hot-reloadable application configuration.
pub struct Config {
    path: Option<PathBuf>,
    root: Arc<ArcSwap<Value>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("watching", &self.is_watching())
            .finish()
    }
}

impl Config {
    /// Loads configuration from a YAML file and applies environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let root = read_document(path)?;

        Ok(Self {
            path: Some(path.to_path_buf()),
            root: Arc::new(ArcSwap::from_pointee(root)),
            watcher: Mutex::new(None),
        })
    }

    /// Loads configuration from a YAML string. Environment overrides are not
    /// applied.
    pub fn load_from_str(content: &str) -> Result<Self> {
        let root = parse_document(content)?;
        Ok(Self::from_value(root))
    }

    /// Wraps an already parsed document.
    pub fn from_value(root: Value) -> Self {
        Self {
            path: None,
            root: Arc::new(ArcSwap::from_pointee(root)),
            watcher: Mutex::new(None),
        }
    }

    /// Returns the file this configuration was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the current document.
    pub fn snapshot(&self) -> Arc<Value> {
        self.root.load_full()
    }

    /// Re-reads the backing file and swaps the document in place.
    pub fn reload(&self) -> Result<()> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| LegoError::config("Configuration was not loaded from a file"))?;
        let root = read_document(path)?;
        self.root.store(Arc::new(root));
        tracing::info!(path = %path.display(), "Configuration reloaded");
        Ok(())
    }

    /// Starts watching the backing file; changes are reloaded automatically.
    ///
    /// Calling this more than once keeps the first watcher.
    pub fn watch(&self) -> Result<()> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| LegoError::config("Configuration was not loaded from a file"))?;

        let mut guard = self.watcher.lock();
        if guard.is_some() {
            return Ok(());
        }

        let watcher = ConfigWatcher::new(path, Arc::clone(&self.root))
            .run()
            .map_err(|e| {
                LegoError::config_with_source(
                    format!("Failed to watch config file: {}", path.display()),
                    e,
                )
            })?;
        *guard = Some(watcher);
        Ok(())
    }

    /// Returns true while a file watcher is attached.
    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Looks up a value by dotted key path.
    pub fn get(&self, key: &str) -> Option<Value> {
        let root = self.root.load();
        lookup(&root, key).cloned()
    }

    /// Returns true when the key exists and is not null.
    pub fn is_set(&self, key: &str) -> bool {
        let root = self.root.load();
        lookup(&root, key).is_some_and(|v| !v.is_null())
    }

    /// Returns a scalar value rendered as a string.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Returns a boolean, accepting `true`/`false` strings.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns a signed integer, accepting numeric strings.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns an unsigned integer, accepting numeric strings.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns a duration. Bare numbers are seconds; strings accept `ms`,
    /// `s`, `m` and `h` units, optionally combined (`1m30s`).
    pub fn get_duration(&self, key: &str) -> Option<Duration> {
        match self.get(key)? {
            Value::Number(n) => n
                .as_f64()
                .filter(|secs| *secs >= 0.0)
                .map(Duration::from_secs_f64),
            Value::String(s) => parse_duration(&s),
            _ => None,
        }
    }

    /// Returns a list of strings. A scalar string is split on commas.
    pub fn get_string_slice(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the entries of a mapping keyed by their string names.
    pub fn get_string_map(&self, key: &str) -> BTreeMap<String, Value> {
        match self.get(key) {
            Some(Value::Mapping(map)) => map
                .into_iter()
                .filter_map(|(k, v)| scalar_to_string(&k).map(|k| (k, v)))
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    /// Deserializes a section into a typed settings struct.
    ///
    /// Fails with `ConfigurationMissing` when the key is absent.
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .get(key)
            .ok_or_else(|| LegoError::configuration_missing(key))?;
        let value = match value {
            Value::Null => Value::Mapping(Mapping::new()),
            other => other,
        };
        serde_yaml::from_value(value).map_err(|e| {
            LegoError::config_with_source(format!("Invalid configuration section '{}'", key), e)
        })
    }

    /// Like [`Config::section`], returning the default settings when absent.
    pub fn section_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        if self.is_set(key) {
            self.section(key)
        } else {
            Ok(T::default())
        }
    }

    /// Returns true when `<kind>.type` selects named instances.
    pub fn is_multi_instance(&self, kind: &str) -> bool {
        self.get_string(&format!("{}.type", kind))
            .is_some_and(|sign| sign == MULTI_INSTANCE_SIGN)
    }

    /// Lists the configured instances of a component kind.
    ///
    /// In multi-instance mode every key under `<kind>.instance` is one
    /// instance, in name order. Otherwise the whole `<kind>` section is a
    /// single unnamed instance.
    pub fn instances(&self, kind: &str) -> Vec<InstanceEntry> {
        if !self.is_multi_instance(kind) {
            return vec![InstanceEntry {
                name: String::new(),
                key: kind.to_string(),
            }];
        }

        self.get_string_map(&format!("{}.instance", kind))
            .into_keys()
            .map(|name| InstanceEntry {
                key: format!("{}.instance.{}", kind, name),
                name,
            })
            .collect()
    }

    /// Renders the current document as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        let root = self.root.load();
        Ok(serde_yaml::to_string(&**root)?)
    }

    /// Checks every section the init pipeline reads, returning the first
    /// problem found.
    pub fn validate(&self) -> Result<()> {
        if let Some(env) = self.get_string("app.env").filter(|v| !v.trim().is_empty()) {
            env.parse::<Environment>()?;
        }

        let multi_log = self.is_multi_instance("log");
        for entry in self.instances("log") {
            let setting: LogSetting = if multi_log {
                self.section(&entry.key)?
            } else {
                self.section_or_default(&entry.key)?
            };
            setting.validate()?;
        }

        if self.is_set("httpserver.http_host") {
            let setting: HttpServerSetting = self.section("httpserver")?;
            setting.socket_addr()?;
        }
        if self.is_set("document_store") {
            for entry in self.instances("document_store") {
                self.section::<DocumentStoreSetting>(&entry.key)?;
            }
        }
        if self.is_set("coordination") {
            for entry in self.instances("coordination") {
                self.section::<CoordinationSetting>(&entry.key)?;
            }
        }
        Ok(())
    }
}

/// Reads, parses and applies environment overrides to a config file.
pub(crate) fn read_document(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        LegoError::config_with_source(
            format!("Failed to read config file: {}", path.display()),
            e,
        )
    })?;
    let mut root = parse_document(&content).map_err(|e| {
        LegoError::config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;
    apply_env_overrides(&mut root, std::env::vars());
    Ok(root)
}

fn parse_document(content: &str) -> Result<Value> {
    let root: Value = serde_yaml::from_str(content)
        .map_err(|e| LegoError::config_with_source("Failed to parse config", e))?;
    match root {
        Value::Mapping(_) => Ok(root),
        Value::Null => Ok(Value::Mapping(Mapping::new())),
        _ => Err(LegoError::config("Config root must be a mapping")),
    }
}

/// Applies `LEGO__A__B=value` style overrides. Values are parsed as YAML
/// scalars so numbers and booleans keep their types.
pub(crate) fn apply_env_overrides<I>(root: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (name, raw) in vars {
        let Some(path) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let parts: Vec<String> = path
            .split("__")
            .filter(|part| !part.is_empty())
            .map(str::to_lowercase)
            .collect();
        if parts.is_empty() {
            continue;
        }

        let value = if raw.is_empty() {
            Value::String(raw)
        } else {
            serde_yaml::from_str::<Value>(&raw).unwrap_or(Value::String(raw))
        };
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        set_path(root, &parts, value);
    }
}

fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return Some(root);
    }
    key.split('.').try_fold(root, |node, part| match node {
        Value::Mapping(map) => map.get(part),
        _ => None,
    })
}

fn set_path(node: &mut Value, parts: &[&str], value: Value) {
    let Some((head, rest)) = parts.split_first() else {
        *node = value;
        return;
    };
    if !node.is_mapping() {
        *node = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(map) = node {
        let child = map
            .entry(Value::String((*head).to_string()))
            .or_insert(Value::Null);
        set_path(child, rest, value);
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Deserializes whole seconds from either a number or a duration string.
pub(crate) fn deserialize_seconds<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    match <Raw as serde::Deserialize>::deserialize(deserializer)? {
        Raw::Secs(secs) => Ok(secs),
        Raw::Text(text) => parse_duration(&text)
            .map(|d| d.as_secs())
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration '{}'", text))),
    }
}

/// Parses `500ms`, `5s`, `2m`, `1h`, `1m30s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let amount: f64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total += Duration::from_secs_f64(amount * scale);
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
app:
  name: "billing"
  pidfile: "/tmp/billing.pid"

log:
  level: debug
  format: text

httpserver:
  http_host: "127.0.0.1"
  http_port: 9090
  middleware:
    - cors
    - requestid
  shutdown_timeout: "1m30s"

document_store:
  type: multi
  instance:
    replica:
      uri: "mongodb://replica:27017"
    primary:
      hosts: "primary:27017"
"#;

    #[test]
    fn test_key_path_lookup() {
        let config = Config::load_from_str(SAMPLE).unwrap();

        assert_eq!(config.get_string("app.name"), Some("billing".to_string()));
        assert_eq!(config.get_i64("httpserver.http_port"), Some(9090));
        assert_eq!(config.get_u64("httpserver.http_port"), Some(9090));
        assert_eq!(
            config.get_string("httpserver.http_port"),
            Some("9090".to_string())
        );
        assert_eq!(config.get_string("app.missing"), None);
        assert_eq!(config.get_string("app.name.deeper"), None);
    }

    #[test]
    fn test_is_set() {
        let config = Config::load_from_str(SAMPLE).unwrap();

        assert!(config.is_set("httpserver"));
        assert!(config.is_set("httpserver.http_host"));
        assert!(!config.is_set("coordination"));
        assert!(!config.is_set("crontab.enable"));
    }

    #[test]
    fn test_string_slice_and_map() {
        let config = Config::load_from_str(SAMPLE).unwrap();

        assert_eq!(
            config.get_string_slice("httpserver.middleware"),
            vec!["cors", "requestid"]
        );

        let instances = config.get_string_map("document_store.instance");
        assert_eq!(
            instances.keys().cloned().collect::<Vec<_>>(),
            vec!["primary", "replica"]
        );
    }

    #[test]
    fn test_comma_separated_slice() {
        let config = Config::load_from_str("hosts: \"a:1, b:2,,c:3\"").unwrap();
        assert_eq!(config.get_string_slice("hosts"), vec!["a:1", "b:2", "c:3"]);
    }

    #[test]
    fn test_get_duration() {
        let config = Config::load_from_str(SAMPLE).unwrap();
        assert_eq!(
            config.get_duration("httpserver.shutdown_timeout"),
            Some(Duration::from_secs(90))
        );

        let config = Config::load_from_str("timeout: 5").unwrap();
        assert_eq!(config.get_duration("timeout"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("ten seconds"), None);
        assert_eq!(parse_duration("5d"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_instances_multi() {
        let config = Config::load_from_str(SAMPLE).unwrap();

        assert!(config.is_multi_instance("document_store"));
        let instances = config.instances("document_store");
        assert_eq!(
            instances,
            vec![
                InstanceEntry {
                    name: "primary".to_string(),
                    key: "document_store.instance.primary".to_string(),
                },
                InstanceEntry {
                    name: "replica".to_string(),
                    key: "document_store.instance.replica".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_instances_single() {
        let config = Config::load_from_str(SAMPLE).unwrap();

        assert!(!config.is_multi_instance("log"));
        assert_eq!(
            config.instances("log"),
            vec![InstanceEntry {
                name: String::new(),
                key: "log".to_string(),
            }]
        );
    }

    #[test]
    fn test_section_typed() {
        let config = Config::load_from_str(SAMPLE).unwrap();

        let server: HttpServerSetting = config.section("httpserver").unwrap();
        assert_eq!(server.http_host, "127.0.0.1");
        assert_eq!(server.http_port, 9090);
        assert_eq!(server.shutdown_timeout(), Duration::from_secs(90));

        let missing = config.section::<HttpServerSetting>("nothing");
        assert_eq!(
            missing.unwrap_err().kind(),
            crate::error::ErrorKind::ConfigurationMissing
        );

        let defaulted: CoordinationSetting = config.section_or_default("coordination").unwrap();
        assert!(defaulted.hosts.is_empty());
    }

    #[test]
    fn test_null_section_uses_defaults() {
        let config = Config::load_from_str("log:\n").unwrap();
        let setting: LogSetting = config.section("log").unwrap();
        assert_eq!(setting.level, LogLevel::Info);
    }

    #[test]
    fn test_non_mapping_root_rejected() {
        assert!(Config::load_from_str("- a\n- b\n").is_err());
        assert!(Config::load_from_str("just a string").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut root: Value = serde_yaml::from_str("app:\n  name: billing\n").unwrap();
        apply_env_overrides(
            &mut root,
            vec![
                ("LEGO__APP__NAME".to_string(), "orders".to_string()),
                ("LEGO__HTTPSERVER__HTTP_PORT".to_string(), "8081".to_string()),
                ("LEGO__CRONTAB__ENABLE".to_string(), "true".to_string()),
                ("UNRELATED".to_string(), "x".to_string()),
            ],
        );
        let config = Config::from_value(root);

        assert_eq!(config.get_string("app.name"), Some("orders".to_string()));
        assert_eq!(config.get_u64("httpserver.http_port"), Some(8081));
        assert_eq!(config.get_bool("crontab.enable"), Some(true));
        assert!(!config.is_set("unrelated"));
    }

    #[test]
    fn test_load_and_reload_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"app:\n  name: first\n").unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.get_string("app.name"), Some("first".to_string()));
        assert_eq!(config.path(), Some(file.path()));

        std::fs::write(file.path(), "app:\n  name: second\n").unwrap();
        config.reload().unwrap();
        assert_eq!(config.get_string("app.name"), Some("second".to_string()));
    }

    #[test]
    fn test_reload_keeps_document_on_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"app:\n  name: first\n").unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        std::fs::write(file.path(), "app: [unclosed\n").unwrap();

        assert!(config.reload().is_err());
        assert_eq!(config.get_string("app.name"), Some("first".to_string()));
    }

    #[test]
    fn test_reload_without_file() {
        let config = Config::load_from_str(SAMPLE).unwrap();
        assert!(config.reload().is_err());
        assert!(config.watch().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load_from_path("/nonexistent/lego.yaml");
        assert_eq!(
            result.unwrap_err().kind(),
            crate::error::ErrorKind::ConfigInvalid
        );
    }

    #[test]
    fn test_validate() {
        let config = Config::load_from_str(SAMPLE).unwrap();
        assert!(config.validate().is_ok());

        let config = Config::load_from_str("app:\n  env: staging\n").unwrap();
        assert!(config.validate().is_err());

        let config = Config::load_from_str("log:\n  output: file\n").unwrap();
        assert!(config.validate().is_err());

        let config = Config::load_from_str("httpserver:\n  http_host: 127.0.0.1\n  http_port: many\n").unwrap();
        assert!(config.validate().is_err());

        let config = Config::load_from_str("coordination:\n  hosts: zk1\n  session_timeout: soon\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_yaml() {
        let config = Config::load_from_str(SAMPLE).unwrap();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("http_port: 9090"));
    }
}
