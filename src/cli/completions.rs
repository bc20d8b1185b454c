//! Shell completions
//!
//! Completion scripts for bash, zsh, fish, powershell and elvish.

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use std::io::{self, Write};

use super::commands::CommandContext;
use crate::cli::Cli;

const BIN_NAME: &str = "zkcir-infra";

/// Arguments for the completions command
#[derive(Parser, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,

    /// Print installation instructions instead of the script
    #[arg(long)]
    pub instructions: bool,
}

impl CompletionsArgs {
    /// Execute the completions command
    pub fn execute(&self, _ctx: &mut CommandContext) -> Result<i32> {
        if self.instructions {
            print_installation_instructions(self.shell);
        } else {
            generate_completions(self.shell);
        }
        Ok(0)
    }
}

/// Generate shell completions and write to stdout
pub fn generate_completions(shell: Shell) {
    print!("{}", get_completions(shell));
    let _ = io::stdout().flush();
}

/// Get completions as a string
pub fn get_completions(shell: Shell) -> String {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut buf);
    String::from_utf8(buf).unwrap_or_default()
}

/// Print installation instructions for completions
pub fn print_installation_instructions(shell: Shell) {
    match shell {
        Shell::Bash => {
            println!("# Add to ~/.bashrc:");
            println!("eval \"$(zkcir-infra completions bash)\"");
            println!();
            println!("# Or save to a file:");
            println!(
                "zkcir-infra completions bash > ~/.local/share/bash-completion/completions/zkcir-infra"
            );
        }
        Shell::Zsh => {
            println!("# Save into a directory on your fpath:");
            println!("mkdir -p ~/.zsh/completions");
            println!("zkcir-infra completions zsh > ~/.zsh/completions/_zkcir-infra");
        }
        Shell::Fish => {
            println!(
                "zkcir-infra completions fish > ~/.config/fish/completions/zkcir-infra.fish"
            );
        }
        Shell::PowerShell => {
            println!("# Add to your PowerShell profile:");
            println!("Invoke-Expression (& zkcir-infra completions powershell | Out-String)");
        }
        Shell::Elvish => {
            println!("# Add to ~/.elvish/rc.elv:");
            println!("eval (zkcir-infra completions elvish | slurp)");
        }
        _ => {
            println!("# Refer to your shell's documentation for completion installation.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bash_completions() {
        let completions = get_completions(Shell::Bash);
        assert!(completions.contains("zkcir-infra"));
        assert!(completions.contains("synth"));
    }

    #[test]
    fn test_fish_completions() {
        let completions = get_completions(Shell::Fish);
        assert!(completions.contains("complete"));
        assert!(completions.contains("validate"));
    }
}
