//! Composition-time configuration of a [`Bootstrap`].

use axum::Router;
use std::borrow::Cow;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use super::init::{InitOptions, InitPipeline};
use super::shutdown::ShutdownPipeline;
use super::step::Step;
use super::Bootstrap;
use crate::components::{
    CoordinationConnector, CrontabTask, DefaultCoordinationConnector,
    DefaultDocumentStoreConnector, DocumentStoreConnector, RouteRegistration, Scheduler,
};
use crate::env::Environment;
use crate::error::Result;
use crate::registry::Registry;

/// Collects extra steps, registrations and connectors, then builds an
/// immutable [`Bootstrap`].
pub struct BootstrapBuilder {
    cfg_file: Option<PathBuf>,
    env: Environment,
    watch_config: bool,
    init_steps: Vec<Step>,
    shutdown_steps: Vec<Step>,
    routes: Vec<RouteRegistration>,
    tasks: Vec<CrontabTask>,
    document_store: Arc<dyn DocumentStoreConnector>,
    coordination: Arc<dyn CoordinationConnector>,
}

impl Default for BootstrapBuilder {
    fn default() -> Self {
        Self {
            cfg_file: None,
            env: Environment::default(),
            watch_config: true,
            init_steps: Vec::new(),
            shutdown_steps: Vec::new(),
            routes: Vec::new(),
            tasks: Vec::new(),
            document_store: Arc::new(DefaultDocumentStoreConnector),
            coordination: Arc::new(DefaultCoordinationConnector),
        }
    }
}

impl BootstrapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration file loaded by the `config` step.
    pub fn cfg_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cfg_file = Some(path.into());
        self
    }

    /// Environment used unless `app.env` overrides it.
    pub fn env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Enables or disables hot reload of the configuration file.
    pub fn watch_config(mut self, enabled: bool) -> Self {
        self.watch_config = enabled;
        self
    }

    /// Appends an init step, run after the built-in ones.
    pub fn init_step<F, Fut>(mut self, name: impl Into<Cow<'static, str>>, func: F) -> Self
    where
        F: Fn(Arc<Registry>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.init_steps.push(Step::new(name, func));
        self
    }

    /// Appends a shutdown step, run after the built-in ones.
    pub fn shutdown_step<F, Fut>(mut self, name: impl Into<Cow<'static, str>>, func: F) -> Self
    where
        F: Fn(Arc<Registry>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.shutdown_steps.push(Step::new(name, func));
        self
    }

    /// Adds routes to every HTTP server the init pipeline builds.
    pub fn http_routes<F>(mut self, f: F) -> Self
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        self.routes.push(Arc::new(f));
        self
    }

    /// Adds jobs to every scheduler the init pipeline builds.
    pub fn crontab_task<F>(mut self, f: F) -> Self
    where
        F: Fn(&Scheduler) -> Result<()> + Send + Sync + 'static,
    {
        self.tasks.push(Arc::new(f));
        self
    }

    pub fn document_store_connector(mut self, connector: impl DocumentStoreConnector + 'static) -> Self {
        self.document_store = Arc::new(connector);
        self
    }

    pub fn coordination_connector(mut self, connector: impl CoordinationConnector + 'static) -> Self {
        self.coordination = Arc::new(connector);
        self
    }

    pub fn build(self) -> Arc<Bootstrap> {
        let registry = Arc::new(Registry::new(self.cfg_file, self.env));
        let init = InitPipeline::new(
            InitOptions {
                watch_config: self.watch_config,
                routes: self.routes,
                tasks: self.tasks,
                document_store: self.document_store,
                coordination: self.coordination,
            },
            self.init_steps,
        );
        let shutdown = ShutdownPipeline::new(self.shutdown_steps);

        Arc::new(Bootstrap::new(registry, init, shutdown))
    }
}
