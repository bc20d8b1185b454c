//! zkcir-infra - Typed infrastructure for the zkcir service
//!
//! This is the main entry point for the zkcir-infra CLI.

mod cli;

use anyhow::Result;
use cli::commands::CommandContext;
use cli::{Cli, Commands};
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zkcir_infra::config::{Config, LoggingConfig};

fn main() {
    // Parse command line arguments
    let cli = Cli::parse_args();

    let exit_code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            report_error(&cli, &err);
            exit_code_for(&err)
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> Result<i32> {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        // completions never need the configuration
        Err(_) if matches!(cli.command, Commands::Completions(_)) => Config::default(),
        Err(err) => {
            init_logging(cli.verbosity(), &LoggingConfig::default());
            return Err(err.into());
        }
    };

    // Initialize logging based on verbosity
    init_logging(cli.verbosity(), &config.logging);
    tracing::debug!(version = zkcir_infra::version(), "starting");
    if cli.verbosity() >= 2 {
        eprintln!("{}", zkcir_infra::version_info());
    }

    // Create command context
    let mut ctx = CommandContext::new(cli, config);

    // Execute the appropriate command
    match &cli.command {
        Commands::Synth(args) => args.execute(&mut ctx),
        Commands::Print(args) => args.execute(&mut ctx, cli.output),
        Commands::List(args) => args.execute(&mut ctx),
        Commands::Graph(args) => args.execute(&mut ctx),
        Commands::Validate(args) => args.execute(&mut ctx),
        Commands::Completions(args) => args.execute(&mut ctx),
    }
}

/// Initialize logging based on verbosity level
///
/// `-v` flags win over the configured level; `RUST_LOG` wins over both.
fn init_logging(verbosity: u8, logging: &LoggingConfig) {
    let filter = match verbosity {
        0 => logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if logging.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(verbosity >= 3)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    if let Err(err) = result {
        eprintln!("failed to initialize logging: {}", err);
    }
}

fn report_error(cli: &Cli, err: &anyhow::Error) {
    let use_color = !cli.no_color && std::env::var("NO_COLOR").is_err();
    if use_color {
        eprintln!("{} {:#}", "ERROR:".red().bold(), err);
    } else {
        eprintln!("ERROR: {:#}", err);
    }
}

/// Map the first library error in the chain to its exit code.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<zkcir_infra::error::Error>())
        .map(zkcir_infra::error::Error::exit_code)
        .unwrap_or(1)
}
