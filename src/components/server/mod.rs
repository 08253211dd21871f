//! HTTP server component.
//!
//! Wraps an axum [`Router`] that hosts register routes on, and owns the
//! serve task between [`HttpServer::run`] and
//! [`HttpServer::graceful_shutdown`].

pub mod middleware;

use axum::http::HeaderName;
use axum::Router;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::instrument::WithSubscriber;
use tracing::{info, warn};

use crate::components::logger::LogWriter;
use crate::config::{HttpServerSetting, Middleware};
use crate::error::{LegoError, Result};

/// Route registration replayed against a fresh server on every init.
pub type RouteRegistration = Arc<dyn Fn(Router) -> Router + Send + Sync>;

struct Serving {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

/// HTTP server built from the `httpserver` section.
pub struct HttpServer {
    addr: SocketAddr,
    shutdown_timeout: Duration,
    middlewares: Vec<Middleware>,
    request_id: HeaderName,
    access_log: Option<LogWriter>,
    router: Mutex<Router>,
    serving: Mutex<Option<Serving>>,
}

impl HttpServer {
    /// Builds a server. Fails on an unresolvable address or an invalid
    /// request-id header name; unknown middleware names are skipped.
    pub fn new(
        setting: &HttpServerSetting,
        request_id: &str,
        access_log: Option<LogWriter>,
    ) -> Result<Self> {
        let addr = setting.socket_addr()?;
        let request_id = HeaderName::from_str(request_id).map_err(|e| {
            LegoError::config_with_source(format!("invalid request id header '{}'", request_id), e)
        })?;

        let (middlewares, unknown) = setting.middlewares();
        for name in unknown {
            warn!(middleware = %name, "ignoring unknown middleware");
        }

        Ok(Self {
            addr,
            shutdown_timeout: setting.shutdown_timeout(),
            middlewares,
            request_id,
            access_log,
            router: Mutex::new(Router::new()),
            serving: Mutex::new(None),
        })
    }

    /// Configured listen address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bound address while serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.serving.lock().as_ref().map(|s| s.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.serving.lock().is_some()
    }

    pub fn middlewares(&self) -> &[Middleware] {
        &self.middlewares
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Applies a route registration. Routes added while serving take effect
    /// on the next `run`.
    pub fn register_routes<F>(&self, f: F)
    where
        F: FnOnce(Router) -> Router,
    {
        let mut router = self.router.lock();
        let current = std::mem::replace(&mut *router, Router::new());
        *router = f(current);
    }

    /// The router with tracing and the configured middleware applied.
    pub fn app(&self) -> Router {
        let router = self.router.lock().clone().layer(TraceLayer::new_for_http());
        middleware::apply(
            router,
            &self.middlewares,
            &self.request_id,
            self.access_log.as_ref(),
        )
    }

    /// Binds the listener and spawns the serve task. Returns the bound
    /// address; a second call while serving returns the current one.
    pub async fn run(&self) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }

        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            LegoError::component_with_source(format!("Failed to bind to {}", self.addr), e)
        })?;
        let local_addr = listener.local_addr()?;
        let app = self.app();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(
            async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await
            }
            .with_current_subscriber(),
        );

        *self.serving.lock() = Some(Serving {
            local_addr,
            shutdown_tx,
            handle,
        });
        info!(address = %local_addr, "HTTP server started");
        Ok(local_addr)
    }

    /// Stops accepting connections and waits for in-flight requests up to
    /// the shutdown timeout, after which the serve task is aborted.
    pub async fn graceful_shutdown(&self) -> Result<()> {
        let Some(serving) = self.serving.lock().take() else {
            return Ok(());
        };
        let _ = serving.shutdown_tx.send(());

        let mut handle = serving.handle;
        match tokio::time::timeout(self.shutdown_timeout, &mut handle).await {
            Ok(Ok(Ok(()))) => {
                info!(address = %serving.local_addr, "HTTP server stopped");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(LegoError::component_with_source("HTTP server failed", e)),
            Ok(Err(e)) => Err(LegoError::component_with_source("HTTP server task failed", e)),
            Err(_) => {
                handle.abort();
                Err(LegoError::component(format!(
                    "HTTP server did not stop within {:?}, aborted",
                    self.shutdown_timeout
                )))
            }
        }
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("addr", &self.addr)
            .field("middlewares", &self.middlewares)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}
