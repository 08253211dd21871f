//! Process-wide component registry.
//!
//! The [`Registry`] owns one [`ComponentHandle`] per component kind together
//! with the process identity. It is created once at process entry, shared as
//! `Arc<Registry>` with every pipeline step and background task, and emptied
//! by [`Registry::close`] at the end of the shutdown pipeline.

mod handle;

pub use handle::{resolve_instance, ComponentHandle, DEFAULT_INSTANCE};

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::components::{CoordinationClient, DocumentStore, HttpServer, Logger, Scheduler};
use crate::config::Config;
use crate::env::Environment;
use crate::error::Result;

/// Default request-id header name.
pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-request-id";

/// Process identity, filled in by the `app` init step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Application name.
    pub name: String,
    /// Active environment.
    pub env: Environment,
    /// Request-id header name.
    pub request_id: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: String::new(),
            env: Environment::default(),
            request_id: DEFAULT_REQUEST_ID_HEADER.to_string(),
        }
    }
}

/// Holds every component kind of the process.
#[derive(Debug)]
pub struct Registry {
    cfg_file: Option<PathBuf>,
    identity: RwLock<Identity>,
    config: ComponentHandle<Config>,
    log: ComponentHandle<Logger>,
    scheduler: ComponentHandle<Scheduler>,
    http_server: ComponentHandle<HttpServer>,
    document_store: ComponentHandle<dyn DocumentStore>,
    coordination: ComponentHandle<dyn CoordinationClient>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new(cfg_file: Option<PathBuf>, env: Environment) -> Self {
        Self {
            cfg_file,
            identity: RwLock::new(Identity {
                env,
                ..Identity::default()
            }),
            config: ComponentHandle::new("config"),
            log: ComponentHandle::new("log"),
            scheduler: ComponentHandle::new("scheduler"),
            http_server: ComponentHandle::new("http_server"),
            document_store: ComponentHandle::new("document_store"),
            coordination: ComponentHandle::new("coordination"),
        }
    }

    /// Configuration file the `config` step loads.
    pub fn cfg_file(&self) -> Option<&Path> {
        self.cfg_file.as_deref()
    }

    pub fn config(&self) -> &ComponentHandle<Config> {
        &self.config
    }

    pub fn log(&self) -> &ComponentHandle<Logger> {
        &self.log
    }

    pub fn scheduler(&self) -> &ComponentHandle<Scheduler> {
        &self.scheduler
    }

    pub fn http_server(&self) -> &ComponentHandle<HttpServer> {
        &self.http_server
    }

    pub fn document_store(&self) -> &ComponentHandle<dyn DocumentStore> {
        &self.document_store
    }

    pub fn coordination(&self) -> &ComponentHandle<dyn CoordinationClient> {
        &self.coordination
    }

    /// The loaded configuration.
    pub fn configuration(&self) -> Result<Arc<Config>> {
        self.config.get(DEFAULT_INSTANCE)
    }

    /// The default logger instance.
    pub fn default_logger(&self) -> Result<Arc<Logger>> {
        self.log.get(DEFAULT_INSTANCE)
    }

    /// Tracing dispatch of the default logger, if one is built.
    pub fn log_dispatch(&self) -> Option<tracing::Dispatch> {
        self.default_logger().ok().map(|logger| logger.dispatch())
    }

    /// Snapshot of the identity.
    pub fn identity(&self) -> Identity {
        self.identity.read().clone()
    }

    pub(crate) fn update_identity(&self, f: impl FnOnce(&mut Identity)) {
        f(&mut *self.identity.write());
    }

    pub fn name(&self) -> String {
        self.identity.read().name.clone()
    }

    pub fn environment(&self) -> Environment {
        self.identity.read().env
    }

    /// Request-id header name.
    pub fn request_id(&self) -> String {
        self.identity.read().request_id.clone()
    }

    /// Empties every component handle. Does not tear anything down; the
    /// config file path and identity are kept for the next init.
    pub fn close(&self) {
        self.config.reset();
        self.log.reset();
        self.scheduler.reset();
        self.http_server.reset();
        self.document_store.reset();
        self.coordination.reset();
    }

    /// Kinds that currently hold at least one instance.
    #[cfg(test)]
    pub(crate) fn enabled_kinds(&self) -> Vec<&'static str> {
        [
            (self.config.kind(), self.config.is_enabled()),
            (self.log.kind(), self.log.is_enabled()),
            (self.scheduler.kind(), self.scheduler.is_enabled()),
            (self.http_server.kind(), self.http_server.is_enabled()),
            (self.document_store.kind(), self.document_store.is_enabled()),
            (self.coordination.kind(), self.coordination.is_enabled()),
        ]
        .into_iter()
        .filter_map(|(kind, enabled)| enabled.then_some(kind))
        .collect()
    }
}
