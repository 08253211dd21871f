//! Lifecycle controller.
//!
//! [`Bootstrap`] composes the init and shutdown pipelines with a
//! [`StopSignal`] gate and a [`SignalWatcher`]:
//!
//! - `init` populates the registry from configuration,
//! - `start` binds the HTTP server and starts the scheduler,
//! - `run` starts and then parks until `stop(true)` releases the gate,
//! - `restart` is `stop(false)`, `init` and `start` back to back.
//!
//! Pipeline runs and start/stop never overlap; they are serialized on an
//! async mutex.

mod builder;
mod init;
mod shutdown;
mod step;
mod stop;


pub use builder::BootstrapBuilder;
pub use init::InitPipeline;
pub use shutdown::ShutdownPipeline;
pub use step::{Step, StepFn};
pub use stop::StopSignal;

use axum::Router;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Dispatch};

use crate::components::Scheduler;
use crate::error::Result;
use crate::registry::{Registry, DEFAULT_INSTANCE};
use crate::signal::SignalWatcher;

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Running,
    ShuttingDown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "idle"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}

/// Runs `f` with `dispatch` as the default subscriber when given.
pub(crate) fn in_scope<T>(dispatch: Option<Dispatch>, f: impl FnOnce() -> T) -> T {
    match dispatch {
        Some(dispatch) => tracing::dispatcher::with_default(&dispatch, f),
        None => f(),
    }
}

/// Owns the registry and drives its lifecycle.
pub struct Bootstrap {
    registry: Arc<Registry>,
    init: InitPipeline,
    shutdown: ShutdownPipeline,
    stop_signal: StopSignal,
    signals: SignalWatcher,
    signals_armed: AtomicBool,
    state: Mutex<LifecycleState>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl Bootstrap {
    pub fn builder() -> BootstrapBuilder {
        BootstrapBuilder::new()
    }

    fn new(registry: Arc<Registry>, init: InitPipeline, shutdown: ShutdownPipeline) -> Self {
        Self {
            registry,
            init,
            shutdown,
            stop_signal: StopSignal::new(),
            signals: SignalWatcher::new(),
            signals_armed: AtomicBool::new(false),
            state: Mutex::new(LifecycleState::Idle),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Gate `run` waits on.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop_signal.clone()
    }

    pub fn signals(&self) -> &SignalWatcher {
        &self.signals
    }

    /// Runs the init pipeline. On error the registry may be partially
    /// populated; `shutdown` releases whatever was built.
    pub async fn init(&self) -> Result<Duration> {
        let _guard = self.lifecycle.lock().await;
        self.init.run(&self.registry).await
    }

    /// Starts the HTTP server and the scheduler, whichever are present.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.start_locked().await
    }

    async fn start_locked(&self) -> Result<()> {
        let dispatch = self.registry.log_dispatch();
        if self.state() == LifecycleState::Running {
            in_scope(dispatch, || debug!("already running"));
            return Ok(());
        }

        if let Ok(server) = self.registry.http_server().get(DEFAULT_INSTANCE) {
            server.run().await?;
        }
        if let Ok(scheduler) = self.registry.scheduler().get(DEFAULT_INSTANCE) {
            scheduler.start();
        }

        *self.state.lock() = LifecycleState::Running;
        in_scope(dispatch, || {
            info!(name = %self.registry.name(), "started")
        });
        Ok(())
    }

    /// Runs the shutdown pipeline. Safe to call in any state and repeatedly.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;
        self.shutdown_locked().await;
    }

    async fn shutdown_locked(&self) {
        *self.state.lock() = LifecycleState::ShuttingDown;
        self.shutdown.run(&self.registry).await;
        *self.state.lock() = LifecycleState::Idle;
    }

    /// Shuts down; with `terminate` also releases the stop gate.
    pub async fn stop(&self, terminate: bool) {
        self.shutdown().await;
        if terminate {
            self.stop_signal.send();
        }
    }

    /// Shuts down, re-runs init and starts again, without letting another
    /// lifecycle call interleave.
    pub async fn restart(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.shutdown_locked().await;
        self.init.run(&self.registry).await?;
        self.start_locked().await
    }

    /// Starts, then waits until the stop gate is released.
    pub async fn run(&self) -> Result<()> {
        self.start().await?;
        self.stop_signal.wait().await;
        Ok(())
    }

    /// Registers `shutdown` as the first termination callback and starts the
    /// signal watcher. Later calls do nothing.
    pub fn watch_signals(self: &Arc<Self>) -> Result<()> {
        if self.signals_armed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let this = Arc::downgrade(self);
        self.signals.on_terminate_first(move || {
            let this = this.clone();
            async move {
                if let Some(bootstrap) = this.upgrade() {
                    bootstrap.shutdown().await;
                }
            }
        });
        self.signals.watch()
    }

    /// Adds routes to the live HTTP server.
    pub fn register_http_routes<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(Router) -> Router,
    {
        let server = self.registry.http_server().get(DEFAULT_INSTANCE)?;
        server.register_routes(f);
        Ok(())
    }

    /// Adds jobs to the live scheduler.
    pub fn register_crontab_task<I, F>(&self, callbacks: I) -> Result<()>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce(&Scheduler) -> Result<()>,
    {
        let scheduler = self.registry.scheduler().get(DEFAULT_INSTANCE)?;
        scheduler.add_task_func(callbacks)
    }

    /// Adds a termination callback.
    pub fn register_signal_func<F, Fut>(&self, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.signals.on_terminate(f);
    }

    /// Adds a reload callback.
    pub fn register_reload_func<F, Fut>(&self, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.signals.on_reload(f);
    }
}

impl fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrap")
            .field("state", &self.state())
            .field("registry", &self.registry)
            .finish()
    }
}
