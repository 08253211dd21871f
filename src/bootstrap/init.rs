//! Initialization pipeline.
//!
//! Built-in steps populate the registry from configuration in a fixed order;
//! steps appended through the builder run after them. The first failing
//! step aborts the run and its error is returned to the caller.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::step::Step;
use super::in_scope;
use crate::components::{
    CoordinationConnector, CrontabTask, DocumentStoreConnector, HttpServer, Logger,
    RouteRegistration, Scheduler,
};
use crate::config::{
    Config, CoordinationSetting, DocumentStoreSetting, HttpServerSetting, LogOutput, LogSetting,
};
use crate::env::Environment;
use crate::error::{LegoError, Result};
use crate::registry::{resolve_instance, Registry, DEFAULT_INSTANCE};

/// Composition-time inputs of the built-in steps.
pub(crate) struct InitOptions {
    pub watch_config: bool,
    pub routes: Vec<RouteRegistration>,
    pub tasks: Vec<CrontabTask>,
    pub document_store: Arc<dyn DocumentStoreConnector>,
    pub coordination: Arc<dyn CoordinationConnector>,
}

/// Ordered init steps.
#[derive(Debug, Clone)]
pub struct InitPipeline {
    steps: Vec<Step>,
}

impl InitPipeline {
    pub(crate) fn new(options: InitOptions, extra: Vec<Step>) -> Self {
        let options = Arc::new(options);
        let watch = options.watch_config;

        let mut steps = vec![
            Step::new("config", move |registry| init_config(registry, watch)),
            Step::new("log", init_log),
            Step::new("app", init_app),
            Step::new("pid", init_pid),
            {
                let options = Arc::clone(&options);
                Step::new("scheduler", move |registry| {
                    init_scheduler(registry, Arc::clone(&options))
                })
            },
            {
                let options = Arc::clone(&options);
                Step::new("http_server", move |registry| {
                    init_http_server(registry, Arc::clone(&options))
                })
            },
            {
                let options = Arc::clone(&options);
                Step::new("document_store", move |registry| {
                    init_document_store(registry, Arc::clone(&options))
                })
            },
            {
                let options = Arc::clone(&options);
                Step::new("coordination", move |registry| {
                    init_coordination(registry, Arc::clone(&options))
                })
            },
        ];
        steps.extend(extra);

        Self { steps }
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(Step::name).collect()
    }

    /// Runs every step in order and returns the elapsed time.
    pub async fn run(&self, registry: &Arc<Registry>) -> Result<Duration> {
        let started = Instant::now();

        for step in &self.steps {
            // The logger may be replaced by the `log` step, so re-read it.
            let dispatch = registry.log_dispatch();
            if let Err(e) = step.run(registry, dispatch).await {
                in_scope(registry.log_dispatch(), || {
                    error!(step = %step.name(), error = %e, "init step failed")
                });
                return Err(e);
            }
        }

        let elapsed = started.elapsed();
        in_scope(registry.log_dispatch(), || {
            info!(
                name = %registry.name(),
                env = %registry.environment(),
                elapsed_ms = elapsed.as_millis() as u64,
                "init complete"
            )
        });
        Ok(elapsed)
    }
}

async fn init_config(registry: Arc<Registry>, watch: bool) -> Result<()> {
    let path = registry
        .cfg_file()
        .ok_or_else(|| LegoError::configuration_missing("cfg_file"))?;
    let config = Config::load_from_path(path)?;

    if watch {
        if let Err(e) = config.watch() {
            warn!(error = %e, "config hot reload disabled");
        }
    }

    registry.config().set(DEFAULT_INSTANCE, Arc::new(config));
    info!(path = %path.display(), "config initialized");
    Ok(())
}

async fn init_log(registry: Arc<Registry>) -> Result<()> {
    let config = registry.configuration()?;
    let multi = config.is_multi_instance("log");

    for entry in config.instances("log") {
        let instance = resolve_instance(&entry.name).to_string();
        let setting: Result<LogSetting> = if multi {
            config.section(&entry.key)
        } else {
            config.section_or_default(&entry.key)
        };
        let setting = setting.map_err(|e| LegoError::construction("log", &instance, e))?;

        let logger =
            Logger::new(&setting).map_err(|e| LegoError::construction("log", &instance, e))?;
        registry.log().set(&instance, Arc::new(logger));
    }

    in_scope(registry.log_dispatch(), || {
        info!(instances = ?registry.log().instance_names(), "log initialized")
    });
    Ok(())
}

async fn init_app(registry: Arc<Registry>) -> Result<()> {
    let config = registry.configuration()?;

    let name = non_empty(config.get_string("app.name")).unwrap_or_else(host_name);
    let env = non_empty(config.get_string("app.env"))
        .map(|raw| raw.parse::<Environment>())
        .transpose()?;
    let request_id = non_empty(config.get_string("app.request_id"));

    registry.update_identity(|identity| {
        identity.name = name;
        if let Some(env) = env {
            identity.env = env;
        }
        if let Some(header) = request_id {
            identity.request_id = header;
        }
    });

    info!(
        name = %registry.name(),
        env = %registry.environment(),
        request_id = %registry.request_id(),
        "app identity initialized"
    );
    Ok(())
}

async fn init_pid(registry: Arc<Registry>) -> Result<()> {
    let config = registry.configuration()?;
    let Some(path) = non_empty(config.get_string("app.pidfile")) else {
        return Ok(());
    };

    match write_pid_file(Path::new(&path)).await {
        Ok(pid) => info!(path = %path, pid, "pid file written"),
        Err(e) => warn!(path = %path, error = %e, "failed to write pid file"),
    }
    Ok(())
}

/// Writes the process id as ASCII decimal, replacing prior content.
pub(crate) async fn write_pid_file(path: &Path) -> std::io::Result<u32> {
    let pid = std::process::id();
    tokio::fs::write(path, pid.to_string()).await?;
    Ok(pid)
}

async fn init_scheduler(registry: Arc<Registry>, options: Arc<InitOptions>) -> Result<()> {
    let config = registry.configuration()?;
    if !config.get_bool("crontab.enable").unwrap_or(false) {
        debug!("crontab disabled");
        return Ok(());
    }

    let scheduler = Scheduler::new();
    scheduler
        .add_task_func(
            options
                .tasks
                .iter()
                .map(|task| move |scheduler: &Scheduler| task(scheduler)),
        )
        .map_err(|e| LegoError::construction("scheduler", DEFAULT_INSTANCE, e))?;

    info!(jobs = scheduler.job_count(), "scheduler initialized");
    registry.scheduler().set(DEFAULT_INSTANCE, Arc::new(scheduler));
    Ok(())
}

async fn init_http_server(registry: Arc<Registry>, options: Arc<InitOptions>) -> Result<()> {
    let config = registry.configuration()?;
    if !config.is_set("httpserver.http_host") {
        debug!("httpserver not configured");
        return Ok(());
    }

    let setting: HttpServerSetting = config
        .section("httpserver")
        .map_err(|e| LegoError::construction("http_server", DEFAULT_INSTANCE, e))?;

    // Develop mirrors a file-backed access log to stdout.
    let access_log = registry.default_logger().ok().map(|logger| {
        if registry.environment() == Environment::Develop
            && logger.setting().output != LogOutput::Stdout
        {
            logger.writer().tee_stdout()
        } else {
            logger.writer()
        }
    });

    let server = HttpServer::new(&setting, &registry.request_id(), access_log)
        .map_err(|e| LegoError::construction("http_server", DEFAULT_INSTANCE, e))?;
    for routes in &options.routes {
        server.register_routes(|router| routes(router));
    }

    info!(
        address = %server.addr(),
        middleware = ?server.middlewares(),
        "http server initialized"
    );
    registry.http_server().set(DEFAULT_INSTANCE, Arc::new(server));
    Ok(())
}

async fn init_document_store(registry: Arc<Registry>, options: Arc<InitOptions>) -> Result<()> {
    let config = registry.configuration()?;
    if !config.is_set("document_store") {
        return Ok(());
    }

    for entry in config.instances("document_store") {
        let instance = resolve_instance(&entry.name).to_string();
        let setting = match config.section::<DocumentStoreSetting>(&entry.key) {
            Ok(setting) => setting,
            Err(e) => {
                error!(instance = %instance, error = %e, "invalid document store settings, skipped");
                continue;
            }
        };
        match options.document_store.connect(&instance, &setting).await {
            Ok(store) => {
                registry.document_store().set(&instance, store);
                info!(instance = %instance, "document store initialized");
            }
            Err(e) => {
                error!(instance = %instance, error = %e, "document store unavailable, skipped");
            }
        }
    }
    Ok(())
}

async fn init_coordination(registry: Arc<Registry>, options: Arc<InitOptions>) -> Result<()> {
    let config = registry.configuration()?;
    if !config.is_set("coordination") {
        return Ok(());
    }

    for entry in config.instances("coordination") {
        let instance = resolve_instance(&entry.name).to_string();
        let setting = match config.section::<CoordinationSetting>(&entry.key) {
            Ok(setting) => setting,
            Err(e) => {
                error!(instance = %instance, error = %e, "invalid coordination settings, skipped");
                continue;
            }
        };
        match options.coordination.connect(&instance, &setting).await {
            Ok(client) => {
                registry.coordination().set(&instance, client);
                info!(instance = %instance, "coordination client initialized");
            }
            Err(e) => {
                error!(instance = %instance, error = %e, "coordination client unavailable, skipped");
            }
        }
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "lego".to_string())
}
