//! Print command
//!
//! Writes the synthesized template to stdout without touching the disk.

use super::CommandContext;
use crate::cli::OutputFormat;
use anyhow::Result;
use clap::{Parser, ValueEnum};

/// Template serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TemplateFormat {
    /// CloudFormation JSON
    Json,
    /// CloudFormation YAML
    Yaml,
}

/// Arguments for the print command
#[derive(Parser, Debug, Clone)]
pub struct PrintArgs {
    /// Template format (defaults to yaml under `-o yaml`, json otherwise)
    #[arg(long)]
    pub format: Option<TemplateFormat>,
}

impl PrintArgs {
    /// Execute the print command
    pub fn execute(&self, ctx: &mut CommandContext, global: OutputFormat) -> Result<i32> {
        let format = self.format.unwrap_or(match global {
            OutputFormat::Yaml => TemplateFormat::Yaml,
            OutputFormat::Json | OutputFormat::Human => TemplateFormat::Json,
        });

        let zkcir = ctx.build_stack()?;
        let template = zkcir.stack().synth()?;
        let rendered = match format {
            TemplateFormat::Json => template.to_json_pretty()?,
            TemplateFormat::Yaml => template.to_yaml()?,
        };

        println!("{}", rendered.trim_end());
        ctx.output.flush();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_args_format() {
        let args = PrintArgs::try_parse_from(["print", "--format", "yaml"]).unwrap();
        assert_eq!(args.format, Some(TemplateFormat::Yaml));

        let args = PrintArgs::try_parse_from(["print"]).unwrap();
        assert!(args.format.is_none());
    }
}
