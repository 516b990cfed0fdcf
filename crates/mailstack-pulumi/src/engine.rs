//! [`ProvisioningEngine`] backed by the pulumi CLI
//!
//! Each stack gets a work directory `<stacks>/<stack_id>/` holding the
//! rendered `Pulumi.yaml`. State lives in the shared local backend.

use crate::cli::PulumiCli;
use crate::error::{PulumiError, Result};
use crate::program::{self, PROGRAM_FILE};
use async_trait::async_trait;
use mailstack_cloud::graph::FlatOutputs;
use mailstack_cloud::{ProvisioningEngine, ResourceGraph, ResourceGroup};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;

pub struct PulumiEngine {
    cli: PulumiCli,
    stacks_dir: PathBuf,
}

impl PulumiEngine {
    pub fn new(cli: PulumiCli, stacks_dir: impl Into<PathBuf>) -> Self {
        Self {
            cli,
            stacks_dir: stacks_dir.into(),
        }
    }

    pub fn work_dir(&self, stack_id: &str) -> PathBuf {
        self.stacks_dir.join(stack_id)
    }

    /// Work directory with a program in it
    ///
    /// Commands other than `up` only need the project file, so an empty
    /// program is written when the directory was lost.
    async fn prepare(&self, stack_id: &str, graph: Option<&ResourceGraph>) -> Result<PathBuf> {
        let dir = self.work_dir(stack_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(PROGRAM_FILE);

        match graph {
            Some(graph) => {
                tokio::fs::write(&path, program::render(graph)?).await?;
                tracing::debug!("Wrote {} ({} resources)", path.display(), graph.nodes.len());
            }
            None if !path.exists() => {
                let empty = ResourceGraph::new(String::new());
                tokio::fs::write(&path, program::render(&empty)?).await?;
                tracing::debug!("Wrote empty program {}", path.display());
            }
            None => {}
        }
        Ok(dir)
    }

    async fn apply_graph(
        &self,
        stack_id: &str,
        graph: &ResourceGraph,
        targets: Option<&BTreeSet<ResourceGroup>>,
    ) -> Result<FlatOutputs> {
        let dir = self.prepare(stack_id, Some(graph)).await?;
        self.cli.select_stack(&dir, stack_id, true).await?;
        self.cli
            .set_config(&dir, stack_id, "aws:region", &graph.region)
            .await?;

        let urns: Vec<String> = match targets {
            Some(groups) => graph
                .nodes
                .iter()
                .filter(|n| groups.contains(&n.group))
                .filter_map(|n| program::urn(stack_id, n))
                .chain(std::iter::once(program::stack_urn(stack_id)))
                .collect(),
            None => Vec::new(),
        };
        if urns.is_empty() {
            tracing::info!("pulumi up {} ({} resources)", stack_id, graph.nodes.len());
        } else {
            tracing::info!(
                "pulumi up {} ({} of {} resources targeted)",
                stack_id,
                urns.len() - 1,
                graph.nodes.len()
            );
        }
        self.cli.up(&dir, stack_id, &urns).await?;
        self.read_outputs(stack_id).await
    }

    async fn read_outputs(&self, stack_id: &str) -> Result<FlatOutputs> {
        let dir = self.prepare(stack_id, None).await?;
        match self.cli.stack_output(&dir, stack_id).await? {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(PulumiError::CommandFailed {
                command: "stack output".to_string(),
                stderr: format!("expected a JSON object, got {}", other),
            }),
        }
    }

    async fn destroy_stack(&self, stack_id: &str) -> Result<()> {
        let dir = self.prepare(stack_id, None).await?;
        tracing::info!("pulumi destroy {}", stack_id);
        self.cli.destroy(&dir, stack_id).await?;
        self.cli.remove_stack(&dir, stack_id).await?;

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            tracing::warn!("Could not remove {}: {}", dir.display(), e);
        }
        Ok(())
    }
}

#[async_trait]
impl ProvisioningEngine for PulumiEngine {
    fn name(&self) -> &str {
        "pulumi"
    }

    async fn apply(&self, stack_id: &str, graph: &ResourceGraph) -> mailstack_cloud::Result<FlatOutputs> {
        Ok(self.apply_graph(stack_id, graph, None).await?)
    }

    async fn apply_targeted(
        &self,
        stack_id: &str,
        graph: &ResourceGraph,
        targets: &BTreeSet<ResourceGroup>,
    ) -> mailstack_cloud::Result<FlatOutputs> {
        Ok(self.apply_graph(stack_id, graph, Some(targets)).await?)
    }

    async fn destroy(&self, stack_id: &str) -> mailstack_cloud::Result<()> {
        Ok(self.destroy_stack(stack_id).await?)
    }

    async fn outputs(&self, stack_id: &str) -> mailstack_cloud::Result<FlatOutputs> {
        Ok(self.read_outputs(stack_id).await?)
    }
}
