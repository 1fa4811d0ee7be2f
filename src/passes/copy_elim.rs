// Copy Elimination Pass
//
// Removes transfers that do not move a value across sites. A transfer is
// eliminable when:
// - its source already lives on its destination (no-op), or
// - every live user is a transfer straight back to the source's site (round
//   trip); the users are re-pointed at the original producer first.
//
// Eliminated transfers stay in the store, marked elided, and their consumers
// are spliced onto the transfer's input.

use crate::core::context::CompileContext;
use crate::core::diagnostics::RemarkKind;
use crate::core::error::{PartitionError, Result};
use crate::ir::{Graph, NodeId, NodeState, Site};
use crate::passes::pass::PartitionPass;

/// Copy elimination pass
pub struct CopyEliminationPass {
    elided: usize,
}

impl CopyEliminationPass {
    pub fn new() -> Self {
        Self { elided: 0 }
    }

    /// Transfers elided over the lifetime of this pass instance
    pub fn elided(&self) -> usize {
        self.elided
    }

    fn source_site(graph: &Graph, transfer: NodeId) -> Site {
        let edge = &graph.node(transfer).inputs[0];
        graph.node(edge.source).site
    }

    /// Splice every user of `transfer` onto its input and mark it elided
    fn elide(graph: &mut Graph, ctx: &mut CompileContext, transfer: NodeId) -> Result<()> {
        let input = graph.node(transfer).inputs[0].clone();
        for (user, slot) in graph.users(transfer) {
            let expected = graph.edge(user, slot).kind;
            if expected != input.kind {
                return Err(PartitionError::ValueKindMismatch {
                    node: graph.node(user).name.clone(),
                    expected,
                    found: input.kind,
                });
            }
            graph.set_input(user, slot, input.source, input.output);
        }

        let producer = graph.node(input.source).name.clone();
        let node = graph.node_mut(transfer);
        node.elided = true;
        node.advance(NodeState::CopyElided);
        let message = format!(
            "copy of '{}' to the {} elided",
            producer,
            match node.site {
                Site::Device => "accelerator",
                _ => "host",
            }
        );
        let name = node.name.clone();
        ctx.diagnostics
            .note(RemarkKind::CopyElided, transfer, &name, message);
        Ok(())
    }

    /// Live users of a transfer if they all send the value back to `site`
    fn round_trip_users(graph: &Graph, transfer: NodeId, site: Site) -> Option<Vec<NodeId>> {
        let users = graph.users(transfer);
        if users.is_empty() {
            return None;
        }
        users
            .iter()
            .all(|&(u, _)| {
                let user = graph.node(u);
                user.is_transfer() && user.site == site
            })
            .then(|| users.into_iter().map(|(u, _)| u).collect())
    }
}

impl Default for CopyEliminationPass {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionPass for CopyEliminationPass {
    fn run(&mut self, graph: &mut Graph, ctx: &mut CompileContext) -> Result<bool> {
        let mut changed = false;
        let mut elided = 0;

        // Each rewrite elides one live transfer, so this terminates.
        loop {
            let mut rewrote = false;
            let transfers: Vec<NodeId> = graph
                .live_nodes()
                .filter(|n| n.is_transfer())
                .map(|n| n.id)
                .collect();

            for id in transfers {
                if !graph.node(id).is_live() {
                    continue;
                }
                let own = graph.node(id).site;
                let source = Self::source_site(graph, id);

                if source == own {
                    Self::elide(graph, ctx, id)?;
                    elided += 1;
                    rewrote = true;
                } else if let Some(users) = Self::round_trip_users(graph, id, source) {
                    let input = graph.node(id).inputs[0].clone();
                    for user in users {
                        graph.set_input(user, 0, input.source, input.output);
                    }
                    Self::elide(graph, ctx, id)?;
                    elided += 1;
                    rewrote = true;
                }
            }

            if !rewrote {
                break;
            }
            changed = true;
        }

        let survivors: Vec<NodeId> = graph
            .live_nodes()
            .filter(|n| n.is_transfer())
            .map(|n| n.id)
            .collect();
        for id in &survivors {
            let node = graph.node_mut(*id);
            if node.state < NodeState::CopyInserted {
                node.advance(NodeState::CopyInserted);
            }
        }

        self.elided += elided;
        log::debug!(
            "Copy elimination on '{}': {} elided, {} transfer(s) remain",
            graph.name(),
            elided,
            survivors.len()
        );
        Ok(changed)
    }

    fn name(&self) -> &str {
        "CopyElimination"
    }
}
