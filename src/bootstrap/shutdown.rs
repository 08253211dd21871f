//! Shutdown pipeline.
//!
//! Every built-in step is a no-op for a kind that is not initialized, so the
//! pipeline can run any number of times. A failing step is logged and the
//! remaining steps still run.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use super::in_scope;
use super::step::Step;
use crate::error::{LegoError, Result};
use crate::registry::{Registry, DEFAULT_INSTANCE};

/// Ordered shutdown steps.
#[derive(Debug, Clone)]
pub struct ShutdownPipeline {
    steps: Vec<Step>,
}

impl ShutdownPipeline {
    pub(crate) fn new(extra: Vec<Step>) -> Self {
        let mut steps = vec![
            Step::new("http_server", shutdown_http_server),
            Step::new("scheduler", shutdown_scheduler),
            Step::new("document_store", shutdown_document_store),
            Step::new("coordination", shutdown_coordination),
            Step::new("registry", close_registry),
        ];
        steps.extend(extra);
        Self { steps }
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(Step::name).collect()
    }

    /// Runs every step and returns the number of steps that failed.
    pub async fn run(&self, registry: &Arc<Registry>) -> (Duration, usize) {
        let started = Instant::now();
        // Captured up front: the registry step drops the logger.
        let dispatch = registry.log_dispatch();
        let mut failed = 0;

        for step in &self.steps {
            if let Err(e) = step.run(registry, dispatch.clone()).await {
                failed += 1;
                in_scope(dispatch.clone(), || {
                    error!(step = %step.name(), error = %e, "shutdown step failed")
                });
            }
        }

        let elapsed = started.elapsed();
        in_scope(dispatch, || {
            info!(
                elapsed_ms = elapsed.as_millis() as u64,
                failed, "shutdown complete"
            )
        });
        (elapsed, failed)
    }
}

async fn shutdown_http_server(registry: Arc<Registry>) -> Result<()> {
    let Ok(server) = registry.http_server().get(DEFAULT_INSTANCE) else {
        return Ok(());
    };
    server.graceful_shutdown().await
}

async fn shutdown_scheduler(registry: Arc<Registry>) -> Result<()> {
    let Ok(scheduler) = registry.scheduler().get(DEFAULT_INSTANCE) else {
        return Ok(());
    };
    scheduler.clear();
    scheduler.stop().await;
    Ok(())
}

async fn shutdown_document_store(registry: Arc<Registry>) -> Result<()> {
    let Ok(stores) = registry.document_store().get_all() else {
        return Ok(());
    };

    let mut failed = Vec::new();
    for (instance, store) in stores {
        match store.close().await {
            Ok(()) => info!(instance = %instance, "document store shut down"),
            Err(e) => {
                error!(instance = %instance, error = %e, "failed to close document store");
                failed.push(instance);
            }
        }
    }
    all_closed("document store", failed)
}

async fn shutdown_coordination(registry: Arc<Registry>) -> Result<()> {
    let Ok(clients) = registry.coordination().get_all() else {
        return Ok(());
    };

    let mut failed = Vec::new();
    for (instance, client) in clients {
        match client.stop().await {
            Ok(()) => info!(instance = %instance, "coordination client shut down"),
            Err(e) => {
                error!(instance = %instance, error = %e, "failed to stop coordination client");
                failed.push(instance);
            }
        }
    }
    all_closed("coordination client", failed)
}

async fn close_registry(registry: Arc<Registry>) -> Result<()> {
    registry.close();
    Ok(())
}

fn all_closed(kind: &str, mut failed: Vec<String>) -> Result<()> {
    if failed.is_empty() {
        return Ok(());
    }
    failed.sort();
    Err(LegoError::component(format!(
        "{} instances failed to close: {}",
        kind,
        failed.join(", ")
    )))
}
