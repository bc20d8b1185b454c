//! Subcommands for the zkcir-infra CLI

pub mod graph;
pub mod list;
pub mod print;
pub mod synth;
pub mod validate;

use crate::cli::output::OutputFormatter;
use anyhow::{Context, Result};
use zkcir_infra::config::Config;
use zkcir_infra::zkcir::ZkcirStack;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, config: Config) -> Self {
        let use_color = !cli.no_color && config.output.color;
        let output = OutputFormatter::new(use_color, cli.output, cli.verbosity());

        Self { config, output }
    }

    /// Declare the zkcir stack from the loaded configuration
    pub fn build_stack(&self) -> Result<ZkcirStack> {
        self.output.debug(&format!(
            "Build context: {}",
            self.config.build.context.display()
        ));
        let stack = ZkcirStack::build(&self.config).with_context(|| {
            format!("failed to declare stack '{}'", self.config.stack.name)
        })?;
        self.output.info(&format!(
            "Declared {} resources in {}",
            stack.stack().resource_count(),
            stack.stack().name()
        ));
        Ok(stack)
    }
}
