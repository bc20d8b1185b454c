//! CLI module for zkcir-infra
//!
//! Argument parsing and subcommand dispatch for the `zkcir-infra` binary.

pub mod commands;
pub mod completions;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// zkcir-infra - Typed infrastructure for the zkcir service
///
/// Synthesizes the zkcir AWS stack into a CloudFormation cloud assembly.
#[derive(Parser, Debug, Clone)]
#[command(name = "zkcir-infra")]
#[command(author = "zkcir contributors")]
#[command(version)]
#[command(about = "Synthesize the zkcir AWS stack", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short = 'o', long, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "ZKCIR_INFRA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
    /// YAML output
    Yaml,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Write the cloud assembly
    Synth(commands::synth::SynthArgs),

    /// Print the synthesized template
    Print(commands::print::PrintArgs),

    /// List resources in deploy order
    List(commands::list::ListArgs),

    /// Print the dependency graph in DOT format
    Graph(commands::graph::GraphArgs),

    /// Check the configuration and the synthesized template
    Validate(commands::validate::ValidateArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    /// Check if output should be in JSON format
    pub fn is_json(&self) -> bool {
        matches!(self.output, OutputFormat::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let cli = Cli::try_parse_from(["zkcir-infra", "synth", "-vv", "--no-color", "-o", "json"])
            .unwrap();
        assert_eq!(cli.verbosity(), 2);
        assert!(cli.no_color);
        assert!(cli.is_json());
        assert!(matches!(cli.command, Commands::Synth(_)));
    }

    #[test]
    fn test_output_defaults_to_human() {
        let cli = Cli::try_parse_from(["zkcir-infra", "list"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Human);
    }

    #[test]
    fn test_unknown_output_format_is_rejected() {
        assert!(Cli::try_parse_from(["zkcir-infra", "list", "-o", "minimal"]).is_err());
    }
}
