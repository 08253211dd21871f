//! lego - Application bootstrap framework
//!
//! Entry point for the lego application.

use clap::Parser;
use lego::cli::{Cli, Commands, ConfigCommands, RunArgs};
use lego::config::Config;
use lego::error::exit_code;
use lego::{Bootstrap, LegoError};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on CLI flags
    if let Err(e) = init_logging(&cli) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(exit_code::GENERAL_ERROR as u8);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = %e.kind(), "{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Initialize the process-wide tracing subscriber from CLI options.
///
/// Components log through the loggers built from the configuration file;
/// this subscriber receives everything logged outside of them.
fn init_logging(cli: &Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (level, _is_quiet) = cli.log_level();

    // RUST_LOG wins over the verbosity flags.
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .try_init()?;

    Ok(())
}

/// Main application logic.
fn run(cli: Cli) -> lego::Result<()> {
    match &cli.command {
        Commands::Run(args) => cmd_run(&cli, args),
        Commands::Config(subcmd) => cmd_config(&cli, subcmd),
    }
}

/// Handle the `run` command.
fn cmd_run(cli: &Cli, args: &RunArgs) -> lego::Result<()> {
    let config_path = require_config_path(cli)?;

    tracing::info!(
        config = %config_path.display(),
        env = %args.env,
        watch = !args.no_watch,
        "Starting lego"
    );

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| LegoError::component_with_source("Failed to create async runtime", e))?;

    runtime.block_on(async {
        let bootstrap = Bootstrap::builder()
            .cfg_file(config_path)
            .env(args.env)
            .watch_config(!args.no_watch)
            .build();

        if let Err(e) = bootstrap.init().await {
            // Release whatever the failed run managed to build.
            bootstrap.shutdown().await;
            return Err(e);
        }

        bootstrap.watch_signals()?;

        // Shutdown is registered first by watch_signals; this runs after it.
        let stop = bootstrap.stop_signal();
        bootstrap.register_signal_func(move || {
            let stop = stop.clone();
            async move { stop.send() }
        });

        let weak = Arc::downgrade(&bootstrap);
        bootstrap.register_reload_func(move || {
            let weak = weak.clone();
            async move {
                let Some(bootstrap) = weak.upgrade() else {
                    return;
                };
                match bootstrap.restart().await {
                    Ok(()) => tracing::info!("Restarted after reload signal"),
                    Err(e) => {
                        tracing::error!(error = %e, "Restart failed, stopping");
                        bootstrap.stop(true).await;
                    }
                }
            }
        });

        let result = bootstrap.run().await;
        bootstrap.signals().stop();
        tracing::info!("lego stopped");
        result
    })
}

/// Handle the `config` subcommand.
fn cmd_config(cli: &Cli, subcmd: &ConfigCommands) -> lego::Result<()> {
    let config_path = require_config_path(cli)?;

    match subcmd {
        ConfigCommands::Validate => match load_config(config_path) {
            Ok(config) => {
                println!("✓ Configuration is valid");
                tracing::debug!(?config, "Validated configuration");
                Ok(())
            }
            Err(e) => {
                println!("✗ Configuration is invalid: {}", e);
                Err(e)
            }
        },
        ConfigCommands::Show => {
            let config = Config::load_from_path(config_path)?;
            println!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

/// Load and validate the configuration file.
fn load_config(path: &Path) -> lego::Result<Config> {
    let config = Config::load_from_path(path)?;
    config.validate()?;
    Ok(config)
}

fn require_config_path(cli: &Cli) -> lego::Result<&Path> {
    cli.config
        .as_deref()
        .ok_or_else(|| LegoError::configuration_missing("--config"))
}
