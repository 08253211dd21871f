//! Logging configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::LegoError;

/// Settings of one logger instance (`log` or `log.instance.<name>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSetting {
    /// Log level.
    pub level: LogLevel,

    /// Log format.
    pub format: LogFormat,

    /// Log output destination.
    pub output: LogOutput,

    /// Directory holding the log files (when output = file).
    pub path: Option<String>,

    /// Log file name (when output = file).
    pub filename: Option<String>,

    /// Separate file receiving only error events.
    pub errfilename: Option<String>,

    /// Rotation period of the log files (`minute`, `hour`, `day`, `never`).
    pub split: LogRotation,

    /// Rotation period given as a duration (`1h`, `86400`). Used when
    /// `split` is `never`; rounded up to the nearest supported period.
    #[serde(deserialize_with = "super::deserialize_seconds")]
    pub rotation: u64,

    /// How long rotated files are kept; zero keeps them all.
    #[serde(deserialize_with = "super::deserialize_seconds")]
    pub lifetime: u64,

    /// Adds the source file and line of each event.
    pub report_caller: bool,

    /// Adds a `hostname` field to each event.
    pub report_hostname: bool,
}

impl Default for LogSetting {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
            output: LogOutput::Stdout,
            path: None,
            filename: None,
            errfilename: None,
            split: LogRotation::Never,
            rotation: 0,
            lifetime: 0,
            report_caller: true,
            report_hostname: true,
        }
    }
}

impl LogSetting {
    /// Validates the setting.
    pub fn validate(&self) -> Result<(), LegoError> {
        if self.output == LogOutput::File && self.filename.is_none() {
            return Err(LegoError::config(
                "log filename is required when output is file",
            ));
        }
        Ok(())
    }

    /// Full path of the main log file, if any.
    pub fn file_path(&self) -> Option<PathBuf> {
        if self.output != LogOutput::File {
            return None;
        }
        self.filename.as_deref().map(|name| self.join(name))
    }

    /// Full path of the error log file, if any.
    pub fn error_file_path(&self) -> Option<PathBuf> {
        self.errfilename.as_deref().map(|name| self.join(name))
    }

    /// Effective rotation period: `split` when set, else derived from
    /// `rotation`.
    pub fn rotation_period(&self) -> LogRotation {
        match (self.split, self.rotation) {
            (LogRotation::Never, 0) => LogRotation::Never,
            (LogRotation::Never, secs) if secs <= 60 => LogRotation::Minutely,
            (LogRotation::Never, secs) if secs <= 3600 => LogRotation::Hourly,
            (LogRotation::Never, _) => LogRotation::Daily,
            (split, _) => split,
        }
    }

    /// Number of rotated files covering `lifetime`, if bounded.
    pub fn max_log_files(&self) -> Option<usize> {
        let period = self.rotation_period().period()?;
        if self.lifetime == 0 {
            return None;
        }
        let files = self.lifetime.div_ceil(period.as_secs());
        Some(files.max(1) as usize)
    }

    fn join(&self, name: &str) -> PathBuf {
        match &self.path {
            Some(dir) => PathBuf::from(dir).join(name),
            None => PathBuf::from(name),
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warn level.
    #[serde(alias = "warning")]
    Warn,
    /// Error level.
    Error,
}

impl FromStr for LogLevel {
    type Err = LegoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(LegoError::config(format!("Unknown log level: {}", s))),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format.
    Json,
    /// Text format.
    #[default]
    Text,
}

impl FromStr for LogFormat {
    type Err = LegoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            _ => Err(LegoError::config(format!("Unknown log format: {}", s))),
        }
    }
}

/// Time-based rotation of file output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[serde(alias = "minute")]
    Minutely,
    #[serde(alias = "hour")]
    Hourly,
    #[serde(alias = "day")]
    Daily,
    #[default]
    #[serde(alias = "none")]
    Never,
}

impl LogRotation {
    /// Length of one period; `None` for `Never`.
    pub fn period(self) -> Option<Duration> {
        match self {
            LogRotation::Minutely => Some(Duration::from_secs(60)),
            LogRotation::Hourly => Some(Duration::from_secs(3600)),
            LogRotation::Daily => Some(Duration::from_secs(86_400)),
            LogRotation::Never => None,
        }
    }
}

/// Log output destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
    /// File output.
    File,
}

impl FromStr for LogOutput {
    type Err = LegoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            "file" => Ok(LogOutput::File),
            _ => Err(LegoError::config(format!("Unknown log output: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_setting_default() {
        let setting = LogSetting::default();
        assert_eq!(setting.level, LogLevel::Info);
        assert_eq!(setting.format, LogFormat::Text);
        assert_eq!(setting.output, LogOutput::Stdout);
        assert!(setting.file_path().is_none());
        assert!(setting.validate().is_ok());
    }

    #[test]
    fn test_log_setting_file_paths() {
        let setting = LogSetting {
            output: LogOutput::File,
            path: Some("/var/log/lego".to_string()),
            filename: Some("app.log".to_string()),
            errfilename: Some("error.log".to_string()),
            ..Default::default()
        };

        assert_eq!(
            setting.file_path(),
            Some(PathBuf::from("/var/log/lego/app.log"))
        );
        assert_eq!(
            setting.error_file_path(),
            Some(PathBuf::from("/var/log/lego/error.log"))
        );
    }

    #[test]
    fn test_file_output_requires_filename() {
        let setting = LogSetting {
            output: LogOutput::File,
            ..Default::default()
        };
        assert!(setting.validate().is_err());
    }

    #[test]
    fn test_log_setting_from_yaml() {
        let yaml = r#"
level: warning
format: json
output: file
filename: app.log
"#;
        let setting: LogSetting = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(setting.level, LogLevel::Warn);
        assert_eq!(setting.format, LogFormat::Json);
        assert_eq!(setting.file_path(), Some(PathBuf::from("app.log")));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("Info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("invalid".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_format_and_output_parse() {
        assert_eq!("TEXT".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!("stderr".parse::<LogOutput>().unwrap(), LogOutput::Stderr);
        assert!("syslog".parse::<LogOutput>().is_err());
    }

    #[test]
    fn test_log_level_to_tracing() {
        assert_eq!(tracing::Level::from(LogLevel::Trace), tracing::Level::TRACE);
        assert_eq!(tracing::Level::from(LogLevel::Warn), tracing::Level::WARN);
        assert_eq!(tracing::Level::from(LogLevel::Error), tracing::Level::ERROR);
    }

    #[test]
    fn test_rotation_settings() {
        assert!(serde_yaml::from_str::<LogSetting>("lifetime: 7d\n").is_err());

        let setting: LogSetting = serde_yaml::from_str(
            "output: file\nfilename: app.log\nsplit: day\nlifetime: 168h\n",
        )
        .unwrap();
        assert_eq!(setting.rotation_period(), LogRotation::Daily);
        assert_eq!(setting.max_log_files(), Some(7));
        assert!(setting.report_caller);
        assert!(setting.report_hostname);

        let setting: LogSetting =
            serde_yaml::from_str("rotation: 30m\nlifetime: 3h\n").unwrap();
        assert_eq!(setting.rotation_period(), LogRotation::Hourly);
        assert_eq!(setting.max_log_files(), Some(3));

        let setting = LogSetting {
            lifetime: 3600,
            ..Default::default()
        };
        assert_eq!(setting.rotation_period(), LogRotation::Never);
        assert_eq!(setting.max_log_files(), None);
    }
}
