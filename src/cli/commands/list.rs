//! List command
//!
//! Prints every resource in the order the engine can create them.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use serde::Serialize;

/// Arguments for the list command
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Only list resources of this CloudFormation type
    #[arg(long = "type", short = 't')]
    pub resource_type: Option<String>,
}

#[derive(Serialize)]
struct ListedResource {
    logical_id: String,
    #[serde(rename = "type")]
    resource_type: String,
}

impl ListArgs {
    /// Execute the list command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let zkcir = ctx.build_stack()?;
        let stack = zkcir.stack();
        let graph = stack.dependency_graph()?;

        let listed: Vec<ListedResource> = graph
            .deploy_order()?
            .into_iter()
            .filter_map(|id| {
                let resource_type = graph.get_node(&id)?.resource_type.clone();
                Some(ListedResource {
                    logical_id: id,
                    resource_type,
                })
            })
            .filter(|r| {
                self.resource_type
                    .as_deref()
                    .is_none_or(|wanted| r.resource_type == wanted)
            })
            .collect();

        if ctx.output.is_structured() {
            ctx.output.document(&listed)?;
            return Ok(0);
        }

        ctx.output.section(&format!("{} ({} resources)", stack.name(), listed.len()));
        let rows: Vec<Vec<String>> = listed
            .iter()
            .enumerate()
            .map(|(i, r)| {
                vec![
                    (i + 1).to_string(),
                    r.logical_id.clone(),
                    r.resource_type.clone(),
                ]
            })
            .collect();
        ctx.output.table(&["#", "LOGICAL ID", "TYPE"], &rows);
        Ok(0)
    }
}
