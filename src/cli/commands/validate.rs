//! Validate command
//!
//! Checks the configuration, synthesizes the stack and runs the template
//! rules. Exits 1 when any rule reports an error.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use zkcir_infra::validate::{validate, Severity};

/// Arguments for the validate command
#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

impl ValidateArgs {
    /// Execute the validate command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        ctx.output.banner("ZKCIR-INFRA VALIDATE");

        ctx.config.validate()?;
        ctx.output.info("Configuration is valid");

        let zkcir = ctx.build_stack()?;
        let template = zkcir.stack().synth()?;
        let report = validate(&template);

        let errors = report.count(Severity::Error);
        let warnings = report.count(Severity::Warning);
        let failed = errors > 0 || (self.strict && warnings > 0);

        if ctx.output.is_structured() {
            ctx.output.document(&report)?;
            return Ok(i32::from(failed));
        }

        if !report.is_clean() {
            ctx.output.section("Findings");
            for finding in &report.findings {
                ctx.output.finding(finding);
            }
        }

        if failed {
            ctx.output.error(&format!(
                "validation failed: {} errors, {} warnings",
                errors, warnings
            ));
            Ok(1)
        } else {
            if warnings > 0 {
                ctx.output
                    .warning(&format!("{} warnings, rerun with --strict to fail on them", warnings));
            }
            ctx.output.success(&format!(
                "{} resources checked, {} warnings",
                template.resources.len(),
                warnings
            ));
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_args_strict() {
        let args = ValidateArgs::try_parse_from(["validate", "--strict"]).unwrap();
        assert!(args.strict);
    }
}
