//! Graph command
//!
//! Prints the resource dependency graph as Graphviz DOT.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;

/// Arguments for the graph command
#[derive(Parser, Debug, Clone)]
pub struct GraphArgs {}

impl GraphArgs {
    /// Execute the graph command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let zkcir = ctx.build_stack()?;
        let dot = zkcir.stack().to_dot()?;
        println!("{}", dot.trim_end());
        ctx.output.flush();
        Ok(0)
    }
}
