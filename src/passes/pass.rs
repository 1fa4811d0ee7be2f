// Partition Pass Infrastructure

use crate::core::context::CompileContext;
use crate::core::error::Result;
use crate::ir::Graph;
use crate::passes::{CopyEliminationPass, LoweringPass, PlacementPass};

/// Partition pass trait
pub trait PartitionPass {
    /// Run the pass on a graph
    /// Returns true if the graph was modified
    fn run(&mut self, graph: &mut Graph, ctx: &mut CompileContext) -> Result<bool>;

    /// Get pass name
    fn name(&self) -> &str;
}

/// Runs passes in order, each over the whole graph
pub struct PassManager {
    passes: Vec<Box<dyn PartitionPass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Placement, copy elimination, lowering
    pub fn standard() -> Self {
        let mut pm = Self::new();
        pm.add_pass(Box::new(PlacementPass::new()));
        pm.add_pass(Box::new(CopyEliminationPass::new()));
        pm.add_pass(Box::new(LoweringPass::new()));
        pm
    }

    pub fn add_pass(&mut self, pass: Box<dyn PartitionPass>) {
        self.passes.push(pass);
    }

    pub fn run_all(&mut self, graph: &mut Graph, ctx: &mut CompileContext) -> Result<()> {
        for pass in &mut self.passes {
            log::debug!("Running partition pass: {}", pass.name());
            let changed = pass.run(graph, ctx)?;
            if changed {
                log::debug!("Pass '{}' modified the graph", pass.name());
            } else {
                log::trace!("Pass '{}' made no changes", pass.name());
            }
            if ctx.options.dump_intermediates {
                let dump = graph.to_string();
                log::debug!("After {}:\n{}", pass.name(), dump);
                ctx.intermediates.push((pass.name().to_string(), dump));
            }
        }
        Ok(())
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}
