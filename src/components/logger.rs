//! Logger component built on `tracing-subscriber`.
//!
//! A [`Logger`] owns a [`tracing::Dispatch`] rather than installing a global
//! subscriber, so several named loggers can coexist with whatever subscriber
//! the host process installed. Pipeline steps run inside the default
//! logger's dispatch; the HTTP access log writes straight to its
//! [`LogWriter`].

use parking_lot::Mutex;
use std::fmt::{self, Write as _};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{Dispatch, Event, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::{format, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::config::{LogFormat, LogOutput, LogRotation, LogSetting};
use crate::error::Result;

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Raw writer fanning every write out to one or more sinks.
#[derive(Clone)]
pub struct LogWriter {
    sinks: Vec<Sink>,
}

impl LogWriter {
    /// Wraps an arbitrary writer.
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sinks: vec![Arc::new(Mutex::new(Box::new(writer)))],
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Opens `path` for appending, creating parent directories.
    pub fn file(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file: File = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }

    /// Opens a time-rotated file `<dir>/<prefix>.<period suffix>`, keeping at
    /// most `max_files` rotated files when given.
    pub fn rolling(
        dir: &Path,
        prefix: &str,
        rotation: LogRotation,
        max_files: Option<usize>,
    ) -> io::Result<Self> {
        let rotation = match rotation {
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        };
        let mut builder = RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(prefix);
        if let Some(max_files) = max_files {
            builder = builder.max_log_files(max_files);
        }
        let appender = builder.build(dir).map_err(io::Error::other)?;
        Ok(Self::new(appender))
    }

    /// Returns a writer that also copies everything to stdout.
    pub fn tee_stdout(&self) -> Self {
        self.tee(io::stdout())
    }

    /// Returns a writer that also copies everything to `writer`.
    pub fn tee<W: Write + Send + 'static>(&self, writer: W) -> Self {
        let mut sinks = self.sinks.clone();
        sinks.push(Arc::new(Mutex::new(Box::new(writer))));
        Self { sinks }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for sink in &self.sinks {
            sink.lock().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in &self.sinks {
            sink.lock().flush()?;
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

/// One configured logger instance.
pub struct Logger {
    setting: LogSetting,
    dispatch: Dispatch,
    writer: LogWriter,
}

impl Logger {
    /// Builds a logger writing to the destination named in `setting`.
    pub fn new(setting: &LogSetting) -> Result<Self> {
        setting.validate()?;

        let writer = match setting.output {
            LogOutput::Stdout => LogWriter::stdout(),
            LogOutput::Stderr => LogWriter::stderr(),
            LogOutput::File => match setting.file_path() {
                Some(path) => open_log_file(setting, &path)?,
                None => LogWriter::stdout(),
            },
        };
        let error_writer = match setting.error_file_path() {
            Some(path) => Some(open_log_file(setting, &path)?),
            None => None,
        };
        let ansi = setting.output != LogOutput::File;

        Ok(Self::build(setting, writer, error_writer, ansi))
    }

    /// Builds a logger writing to the given writers, without colors.
    pub fn with_writer(
        setting: &LogSetting,
        writer: LogWriter,
        error_writer: Option<LogWriter>,
    ) -> Self {
        Self::build(setting, writer, error_writer, false)
    }

    fn build(
        setting: &LogSetting,
        writer: LogWriter,
        error_writer: Option<LogWriter>,
        ansi: bool,
    ) -> Self {
        let level = LevelFilter::from_level(setting.level.into());
        let hostname = if setting.report_hostname {
            hostname::get().ok().and_then(|name| name.into_string().ok())
        } else {
            None
        };

        let mut layers: Vec<BoxedLayer> = vec![format_layer(
            setting,
            hostname.clone(),
            writer.clone(),
            ansi,
            level,
        )];
        if let Some(error_writer) = error_writer {
            layers.push(format_layer(
                setting,
                hostname,
                error_writer,
                false,
                LevelFilter::ERROR,
            ));
        }

        let subscriber = tracing_subscriber::registry().with(layers);

        Self {
            setting: setting.clone(),
            dispatch: Dispatch::new(subscriber),
            writer,
        }
    }

    /// Dispatch to scope work under this logger.
    pub fn dispatch(&self) -> Dispatch {
        self.dispatch.clone()
    }

    /// Raw writer of the main output.
    pub fn writer(&self) -> LogWriter {
        self.writer.clone()
    }

    pub fn setting(&self) -> &LogSetting {
        &self.setting
    }

    /// Runs `f` with this logger as the current subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("setting", &self.setting)
            .finish()
    }
}

/// Opens a plain or rotated log file depending on `setting`.
fn open_log_file(setting: &LogSetting, path: &Path) -> io::Result<LogWriter> {
    let rotation = setting.rotation_period();
    if rotation == LogRotation::Never {
        return LogWriter::file(path);
    }

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "log file name is not valid UTF-8")
        })?;
    LogWriter::rolling(dir, prefix, rotation, setting.max_log_files())
}

fn format_layer(
    setting: &LogSetting,
    hostname: Option<String>,
    writer: LogWriter,
    ansi: bool,
    level: LevelFilter,
) -> BoxedLayer {
    let caller = setting.report_caller;
    match setting.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .event_format(HostnameFormat::new(
                hostname,
                true,
                format().json().with_file(caller).with_line_number(caller),
            ))
            .with_writer(writer)
            .with_filter(level)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_ansi(ansi)
            .event_format(HostnameFormat::new(
                hostname,
                false,
                format().with_target(true).with_file(caller).with_line_number(caller),
            ))
            .with_writer(writer)
            .with_filter(level)
            .boxed(),
    }
}

/// Event format adding the host name to every line: a leading
/// `hostname=<name>` in text, a `hostname` key in JSON.
struct HostnameFormat<F> {
    hostname: Option<String>,
    json: bool,
    inner: F,
}

impl<F> HostnameFormat<F> {
    fn new(hostname: Option<String>, json: bool, inner: F) -> Self {
        Self {
            hostname,
            json,
            inner,
        }
    }
}

impl<S, N, F> FormatEvent<S, N> for HostnameFormat<F>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    F: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let Some(hostname) = &self.hostname else {
            return self.inner.format_event(ctx, writer, event);
        };

        if !self.json {
            write!(writer, "hostname={} ", hostname)?;
            return self.inner.format_event(ctx, writer, event);
        }

        let mut line = String::new();
        self.inner.format_event(ctx, Writer::new(&mut line), event)?;
        match line.strip_prefix('{') {
            Some(rest) => {
                let key = serde_json::to_string(hostname).map_err(|_| fmt::Error)?;
                write!(writer, "{{\"hostname\":{},{}", key, rest)
            }
            None => writer.write_str(&line),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::LogLevel;

    /// In-memory sink shared between the logger and the assertions.
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_level_filter_applies() {
        let buf = SharedBuf::default();
        let setting = LogSetting {
            level: LogLevel::Warn,
            ..Default::default()
        };
        let logger = Logger::with_writer(&setting, LogWriter::new(buf.clone()), None);

        logger.in_scope(|| {
            tracing::info!("quiet message");
            tracing::warn!("loud message");
        });

        let out = buf.contents();
        assert!(out.contains("loud message"));
        assert!(!out.contains("quiet message"));
    }

    #[test]
    fn test_json_format() {
        let buf = SharedBuf::default();
        let setting = LogSetting {
            format: LogFormat::Json,
            ..Default::default()
        };
        let logger = Logger::with_writer(&setting, LogWriter::new(buf.clone()), None);

        logger.in_scope(|| tracing::info!(order_id = 42, "order placed"));

        let out = buf.contents();
        let line: serde_json::Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(line["fields"]["message"], "order placed");
        assert_eq!(line["fields"]["order_id"], 42);
    }

    #[test]
    fn test_error_writer_only_gets_errors() {
        let main = SharedBuf::default();
        let errors = SharedBuf::default();
        let logger = Logger::with_writer(
            &LogSetting::default(),
            LogWriter::new(main.clone()),
            Some(LogWriter::new(errors.clone())),
        );

        logger.in_scope(|| {
            tracing::info!("routine");
            tracing::error!("broken");
        });

        assert!(main.contents().contains("routine"));
        assert!(main.contents().contains("broken"));
        assert!(!errors.contents().contains("routine"));
        assert!(errors.contents().contains("broken"));
    }

    #[test]
    fn test_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let setting = LogSetting {
            output: LogOutput::File,
            path: Some(dir.path().join("nested").to_string_lossy().into_owned()),
            filename: Some("app.log".to_string()),
            errfilename: Some("error.log".to_string()),
            ..Default::default()
        };
        let logger = Logger::new(&setting).unwrap();

        logger.in_scope(|| tracing::error!("disk full"));

        let main = fs::read_to_string(dir.path().join("nested/app.log")).unwrap();
        let errors = fs::read_to_string(dir.path().join("nested/error.log")).unwrap();
        assert!(main.contains("disk full"));
        assert!(errors.contains("disk full"));
    }

    #[test]
    fn test_file_output_without_filename_fails() {
        let setting = LogSetting {
            output: LogOutput::File,
            ..Default::default()
        };
        assert!(Logger::new(&setting).is_err());
    }

    #[test]
    fn test_tee_writes_to_every_sink() {
        let a = SharedBuf::default();
        let b = SharedBuf::default();
        let mut writer = LogWriter::new(a.clone()).tee(b.clone());

        writer.write_all(b"line\n").unwrap();

        assert_eq!(writer.sink_count(), 2);
        assert_eq!(a.contents(), "line\n");
        assert_eq!(b.contents(), "line\n");
    }

    #[test]
    fn test_text_line_reports_host_and_caller() {
        let buf = SharedBuf::default();
        let logger = Logger::with_writer(&LogSetting::default(), LogWriter::new(buf.clone()), None);

        logger.in_scope(|| tracing::info!("with context"));

        let out = buf.contents();
        assert!(out.starts_with("hostname="), "{}", out);
        assert!(out.contains("logger.rs:"), "{}", out);
        assert!(out.contains("with context"));
    }

    #[test]
    fn test_json_line_reports_host_and_caller() {
        let buf = SharedBuf::default();
        let setting = LogSetting {
            format: LogFormat::Json,
            ..Default::default()
        };
        let logger = Logger::with_writer(&setting, LogWriter::new(buf.clone()), None);

        logger.in_scope(|| tracing::warn!("with context"));

        let out = buf.contents();
        let line: serde_json::Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert!(line["hostname"].is_string());
        assert!(line["filename"].as_str().unwrap().ends_with("logger.rs"));
        assert!(line["line_number"].is_u64());
        assert_eq!(line["fields"]["message"], "with context");
    }

    #[test]
    fn test_caller_and_host_can_be_turned_off() {
        let buf = SharedBuf::default();
        let setting = LogSetting {
            report_caller: false,
            report_hostname: false,
            ..Default::default()
        };
        let logger = Logger::with_writer(&setting, LogWriter::new(buf.clone()), None);

        logger.in_scope(|| tracing::info!("bare"));

        let out = buf.contents();
        assert!(!out.contains("hostname="));
        assert!(!out.contains("logger.rs:"));
        assert!(out.contains("bare"));
    }

    #[test]
    fn test_rotated_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let setting = LogSetting {
            output: LogOutput::File,
            path: Some(dir.path().to_string_lossy().into_owned()),
            filename: Some("app.log".to_string()),
            split: LogRotation::Hourly,
            lifetime: 24 * 3600,
            ..Default::default()
        };
        let logger = Logger::new(&setting).unwrap();

        logger.in_scope(|| tracing::info!("rotated line"));

        let files: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 1, "{:?}", files);
        assert!(files[0].starts_with("app.log."), "{:?}", files);
        let contents = fs::read_to_string(dir.path().join(&files[0])).unwrap();
        assert!(contents.contains("rotated line"));
    }
}
