//! OS signal watcher.
//!
//! SIGTERM, SIGINT and SIGQUIT map to [`Signal::Terminate`]; SIGHUP maps to
//! [`Signal::Reload`]. Callbacks registered for a kind run one after another
//! in registration order on the watcher task.

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info};

use crate::error::Result;

/// Async signal callback.
pub type SignalFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Signal categories callbacks can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Terminate,
    Reload,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Terminate => write!(f, "terminate"),
            Signal::Reload => write!(f, "reload"),
        }
    }
}

#[derive(Default)]
struct Callbacks {
    terminate: RwLock<Vec<SignalFn>>,
    reload: RwLock<Vec<SignalFn>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Callbacks {
    fn list(&self, kind: Signal) -> &RwLock<Vec<SignalFn>> {
        match kind {
            Signal::Terminate => &self.terminate,
            Signal::Reload => &self.reload,
        }
    }
}

/// Invokes registered callbacks when the process receives a signal.
#[derive(Clone, Default)]
pub struct SignalWatcher {
    inner: Arc<Callbacks>,
}

fn boxed<F, Fut>(f: F) -> SignalFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

impl SignalWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a termination callback after the existing ones.
    pub fn on_terminate<F, Fut>(&self, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.terminate.write().push(boxed(f));
    }

    /// Adds a termination callback ahead of the existing ones.
    pub fn on_terminate_first<F, Fut>(&self, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.terminate.write().insert(0, boxed(f));
    }

    /// Adds a reload callback after the existing ones.
    pub fn on_reload<F, Fut>(&self, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.reload.write().push(boxed(f));
    }

    /// Number of callbacks registered for `kind`.
    pub fn callback_count(&self, kind: Signal) -> usize {
        self.inner.list(kind).read().len()
    }

    /// Runs every callback for `kind` in registration order.
    pub async fn dispatch(&self, kind: Signal) {
        let callbacks: Vec<SignalFn> = self.inner.list(kind).read().clone();
        debug!(signal = %kind, callbacks = callbacks.len(), "dispatching signal");
        for callback in callbacks {
            callback().await;
        }
    }

    /// Starts the watcher task. A second call keeps the running task.
    pub fn watch(&self) -> Result<()> {
        let mut task = self.inner.task.lock();
        if task.is_some() {
            return Ok(());
        }

        let watcher = self.clone();
        *task = Some(spawn_listener(watcher)?);
        info!("signal watcher started");
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.inner.task.lock().is_some()
    }

    /// Stops the watcher task; registered callbacks are kept.
    pub fn stop(&self) {
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
            debug!("signal watcher stopped");
        }
    }
}

impl fmt::Debug for SignalWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalWatcher")
            .field("terminate", &self.callback_count(Signal::Terminate))
            .field("reload", &self.callback_count(Signal::Reload))
            .field("watching", &self.is_watching())
            .finish()
    }
}

#[cfg(unix)]
fn spawn_listener(watcher: SignalWatcher) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigquit = signal(SignalKind::quit())?;
    let mut sighup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(
        async move {
            loop {
                let kind = tokio::select! {
                    _ = sigterm.recv() => Signal::Terminate,
                    _ = sigint.recv() => Signal::Terminate,
                    _ = sigquit.recv() => Signal::Terminate,
                    _ = sighup.recv() => Signal::Reload,
                };
                info!(signal = %kind, "signal received");
                watcher.dispatch(kind).await;
            }
        }
        .with_current_subscriber(),
    ))
}

#[cfg(not(unix))]
fn spawn_listener(watcher: SignalWatcher) -> Result<JoinHandle<()>> {
    Ok(tokio::spawn(
        async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "ctrl-c listener failed");
                    break;
                }
                info!(signal = %Signal::Terminate, "signal received");
                watcher.dispatch(Signal::Terminate).await;
            }
        }
        .with_current_subscriber(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_dispatch_runs_in_registration_order() {
        let watcher = SignalWatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let order = Arc::clone(&order);
            watcher.on_terminate(move || {
                let order = Arc::clone(&order);
                async move { order.lock().push(tag) }
            });
        }
        let first = Arc::clone(&order);
        watcher.on_terminate_first(move || {
            let order = Arc::clone(&first);
            async move { order.lock().push("first") }
        });

        watcher.dispatch(Signal::Terminate).await;

        assert_eq!(*order.lock(), vec!["first", "a", "b"]);
    }

    #[tokio::test]
    async fn test_kinds_are_separate() {
        let watcher = SignalWatcher::new();
        let reloads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reloads);
        watcher.on_reload(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        watcher.dispatch(Signal::Terminate).await;
        assert_eq!(reloads.load(Ordering::SeqCst), 0);

        watcher.dispatch(Signal::Reload).await;
        assert_eq!(reloads.load(Ordering::SeqCst), 1);
        assert_eq!(watcher.callback_count(Signal::Reload), 1);
        assert_eq!(watcher.callback_count(Signal::Terminate), 0);
    }

    #[tokio::test]
    async fn test_watch_and_stop() {
        let watcher = SignalWatcher::new();
        watcher.watch().unwrap();
        watcher.watch().unwrap();
        assert!(watcher.is_watching());

        watcher.stop();
        assert!(!watcher.is_watching());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sighup_triggers_reload_callbacks() {
        let watcher = SignalWatcher::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        watcher.on_reload(move || {
            let tx = Arc::clone(&tx);
            async move {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(());
                }
            }
        });
        watcher.watch().unwrap();

        let pid = std::process::id();
        std::process::Command::new("sh")
            .args(["-c", &format!("kill -HUP {}", pid)])
            .status()
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        watcher.stop();
    }
}
