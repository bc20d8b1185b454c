//! Synth command
//!
//! Writes the cloud assembly for the deployment engine.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use zkcir_infra::assembly::CloudAssembly;

/// Arguments for the synth command
#[derive(Parser, Debug, Clone)]
pub struct SynthArgs {
    /// Output directory (defaults to output.outdir, usually cdk.out)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Serialize)]
struct SynthSummary<'a> {
    stack: &'a str,
    outdir: &'a PathBuf,
    resources: usize,
    assets: usize,
    files: &'a [PathBuf],
}

impl SynthArgs {
    /// Execute the synth command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let outdir = self
            .out
            .clone()
            .unwrap_or_else(|| ctx.config.output.outdir.clone());

        ctx.output.banner("ZKCIR-INFRA SYNTH");
        let zkcir = ctx.build_stack()?;
        let stack = zkcir.stack();
        let files = CloudAssembly::write(&outdir, stack)?;

        if ctx.output.is_structured() {
            ctx.output.document(&SynthSummary {
                stack: stack.name(),
                outdir: &outdir,
                resources: stack.resource_count(),
                assets: stack.assets().len(),
                files: &files,
            })?;
            return Ok(0);
        }

        ctx.output.section("Written");
        for file in &files {
            println!("  {}", file.display());
        }
        ctx.output.success(&format!(
            "{} ({} resources, {} assets) synthesized to {}",
            stack.name(),
            stack.resource_count(),
            stack.assets().len(),
            outdir.display()
        ));
        ctx.output.elapsed("Synthesis took");
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synth_args_default_out() {
        let args = SynthArgs::try_parse_from(["synth"]).unwrap();
        assert!(args.out.is_none());
    }

    #[test]
    fn test_synth_args_with_out() {
        let args = SynthArgs::try_parse_from(["synth", "--out", "build/assembly"]).unwrap();
        assert_eq!(args.out, Some(PathBuf::from("build/assembly")));
    }
}
