//! lego - Application bootstrap framework
//!
//! This crate assembles the infrastructure of a long-running service
//! (configuration, logging, scheduled jobs, an HTTP server, document store
//! and coordination clients) inside one process and drives it through an
//! ordered init/shutdown lifecycle.
//!
//! # Overview
//!
//! A [`BootstrapBuilder`] collects extra pipeline steps, route and job
//! registrations and connectors, then builds a [`Bootstrap`]. Its `init`
//! populates a shared [`Registry`] from the configuration file; `run` starts
//! the server and scheduler and parks until a stop is requested, typically by
//! a termination signal.
//!
//! ```no_run
//! use axum::routing::get;
//!
//! # async fn example() -> lego::Result<()> {
//! let bootstrap = lego::Bootstrap::builder()
//!     .cfg_file("config/app.yaml")
//!     .http_routes(|router| router.route("/health", get(|| async { "ok" })))
//!     .build();
//!
//! bootstrap.init().await?;
//! bootstrap.watch_signals()?;
//! let stop = bootstrap.stop_signal();
//! bootstrap.register_signal_func(move || {
//!     let stop = stop.clone();
//!     async move { stop.send() }
//! });
//! bootstrap.run().await
//! # }
//! ```
//!
//! # Modules
//!
//! - [`bootstrap`] - Lifecycle controller and init/shutdown pipelines
//! - [`registry`] - Component registry and per-kind handles
//! - [`components`] - Logger, scheduler, HTTP server and store clients
//! - [`config`] - Configuration file parsing, typed sections and hot reload
//! - [`signal`] - Process signal notifier
//! - [`cli`] - Command-line interface definitions
//! - [`error`] - Error types and error handling

pub mod bootstrap;
pub mod cli;
pub mod components;
pub mod config;
pub mod env;
pub mod error;
pub mod registry;
pub mod signal;

// Re-exports for convenience
pub use bootstrap::{Bootstrap, BootstrapBuilder, LifecycleState, StopSignal};
pub use cli::Cli;
pub use config::Config;
pub use env::Environment;
pub use error::{ErrorKind, LegoError, Result};
pub use registry::{ComponentHandle, Registry, DEFAULT_INSTANCE};
pub use signal::{Signal, SignalWatcher};
