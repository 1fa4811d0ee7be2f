// Placement Pass
//
// Assigns every node to the host or the accelerator and inserts transfers on
// edges whose endpoints disagree.
//
// Placement rules:
// - Explicit transfers sit on their destination; arguments on their hint or the host
// - Hinted nodes keep their hint
// - A node whose every input is on the device (or is a hoistable constant) moves
//   to the device; this propagates forward to a fixpoint
// - Anything left unassigned falls back to the host
// - Constants follow their consumers: device when every consumer is on the
//   device, otherwise their hint or the host
// - Identity passthroughs of a multi-output op always share the op's site
// - A loop-carried edge whose endpoints disagree pins the loop body to the host

use crate::core::context::CompileContext;
use crate::core::diagnostics::RemarkKind;
use crate::core::error::{PartitionError, Result};
use crate::ir::{Edge, Graph, Node, NodeId, NodeState, OpKind, Site};
use crate::passes::pass::PartitionPass;
use std::collections::{BTreeSet, HashMap};

/// Site assignment from one placement round
struct Solution {
    sites: Vec<Site>,
    /// Nodes that fell back to the host
    defaulted: Vec<NodeId>,
}

/// Host/accelerator placement pass
pub struct PlacementPass {
    /// Upper bound on loop-pinning rounds
    max_rounds: usize,
}

impl PlacementPass {
    pub fn new() -> Self {
        Self { max_rounds: 16 }
    }

    pub fn with_max_rounds(max_rounds: usize) -> Self {
        Self {
            max_rounds: max_rounds.max(1),
        }
    }

    /// The multi-output op an identity passthrough is linked to
    fn linked_primitive(graph: &Graph, node: &Node) -> Option<NodeId> {
        if node.op != OpKind::Identity {
            return None;
        }
        let source = node.inputs.first()?.source;
        (graph.node(source).op.output_arity() > 1).then_some(source)
    }

    /// Identity passthroughs hanging off a multi-output op
    fn linked_outputs(graph: &Graph, primitive: NodeId) -> Vec<NodeId> {
        graph
            .users(primitive)
            .into_iter()
            .map(|(user, _)| user)
            .filter(|&user| graph.node(user).op == OpKind::Identity)
            .collect()
    }

    fn seed(graph: &Graph, hoist: bool) -> Vec<Site> {
        let mut seeds = vec![Site::Unassigned; graph.len()];
        for node in graph.live_nodes() {
            seeds[node.id] = match node.op {
                OpKind::Transfer { to, .. } => to,
                OpKind::Argument => node.hint.unwrap_or(Site::Host),
                OpKind::Constant if hoist => Site::Unassigned,
                OpKind::Constant => node.hint.unwrap_or(Site::Host),
                _ if Self::linked_primitive(graph, node).is_some() => Site::Unassigned,
                _ => node.hint.unwrap_or(Site::Unassigned),
            };
        }
        seeds
    }

    fn solve(graph: &Graph, seeds: &[Site], pinned: &BTreeSet<NodeId>, hoist: bool) -> Solution {
        let mut sites = seeds.to_vec();
        for &id in pinned {
            sites[id] = Site::Host;
        }

        let movable: Vec<NodeId> = graph
            .live_nodes()
            .filter(|n| !(hoist && n.is_constant()))
            .map(|n| n.id)
            .collect();

        // Forward propagation to a fixpoint
        loop {
            let mut changed = false;
            for &id in &movable {
                if sites[id] != Site::Unassigned {
                    continue;
                }
                let ready = graph.node(id).inputs.iter().all(|e| {
                    (hoist && graph.node(e.source).is_constant())
                        || sites[e.source] == Site::Device
                        || (e.backedge && sites[e.source] == Site::Unassigned)
                });
                if ready {
                    sites[id] = Site::Device;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut defaulted = Vec::new();
        let mut linked = Vec::new();
        for &id in &movable {
            if let Some(primitive) = Self::linked_primitive(graph, graph.node(id)) {
                linked.push((id, primitive));
            } else if sites[id] == Site::Unassigned {
                sites[id] = Site::Host;
                defaulted.push(id);
            }
        }
        for (id, primitive) in linked {
            sites[id] = sites[primitive];
        }

        if hoist {
            for node in graph.live_nodes().filter(|n| n.is_constant()) {
                let users = graph.users(node.id);
                let all_device = !users.is_empty()
                    && users.iter().all(|&(u, _)| sites[u] == Site::Device);
                sites[node.id] = if all_device {
                    Site::Device
                } else {
                    node.hint.unwrap_or(Site::Host)
                };
            }
        }

        Solution { sites, defaulted }
    }

    /// First loop-carried edge whose endpoints ended up on different sites
    fn find_conflict(graph: &Graph, sites: &[Site]) -> Option<(NodeId, NodeId)> {
        graph.live_nodes().find_map(|node| {
            node.inputs
                .iter()
                .find(|e| e.backedge && sites[e.source] != sites[node.id])
                .map(|e| (node.id, e.source))
        })
    }

    /// Loop body closed by a backedge, grown to whole multi-output groups
    fn pin_region(graph: &Graph, head: NodeId, tail: NodeId) -> BTreeSet<NodeId> {
        let mut region = graph.loop_region(head, tail);
        region.insert(head);
        region.insert(tail);

        for id in region.clone() {
            let node = graph.node(id);
            let primitive = match Self::linked_primitive(graph, node) {
                Some(p) => Some(p),
                None if node.op.output_arity() > 1 => Some(id),
                None => None,
            };
            if let Some(p) = primitive {
                region.insert(p);
                region.extend(Self::linked_outputs(graph, p));
            }
        }

        region.retain(|&id| {
            let node = graph.node(id);
            !node.is_transfer() && !node.is_constant()
        });
        region
    }

    /// Hints on passthroughs may not pull them away from their primitive
    fn check_linked(graph: &Graph, sites: &[Site]) -> Result<()> {
        for node in graph.live_nodes() {
            if let Some(primitive) = Self::linked_primitive(graph, node) {
                match node.hint {
                    Some(hint) if hint != sites[primitive] => {
                        return Err(PartitionError::MultiOutputSplit {
                            node: node.name.clone(),
                            primitive: graph.node(primitive).name.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Insert a synthetic transfer on every edge whose endpoints disagree.
    ///
    /// One copy per (producer output, destination); explicit transfers
    /// never get a copy in front of them.
    fn insert_copies(graph: &mut Graph, ctx: &mut CompileContext) -> Result<usize> {
        let mut copies: HashMap<(NodeId, usize, Site), NodeId> = HashMap::new();
        let mut anchors: HashMap<NodeId, NodeId> = HashMap::new();

        let consumers: Vec<NodeId> = graph
            .live_nodes()
            .filter(|n| !n.is_transfer())
            .map(|n| n.id)
            .collect();

        for consumer in consumers {
            let site = graph.node(consumer).site;
            for slot in 0..graph.node(consumer).inputs.len() {
                let edge = graph.edge(consumer, slot).clone();
                let producer = graph.node(edge.source);
                if producer.site == site {
                    continue;
                }

                let key = (edge.source, edge.output, site);
                let copy = match copies.get(&key) {
                    Some(&copy) => copy,
                    None => {
                        let producer_name = producer.name.clone();
                        let name = if edge.output == 0 {
                            format!("{}.{}", producer_name, site.transfer_name())
                        } else {
                            format!("{}#{}.{}", producer_name, edge.output, site.transfer_name())
                        };
                        let node = Node::new(name, OpKind::Transfer { to: site, synthetic: true })
                            .with_inputs(vec![Edge {
                                source: edge.source,
                                output: edge.output,
                                kind: edge.kind,
                                backedge: false,
                            }])
                            .with_results(vec![edge.kind]);

                        let anchor = anchors.get(&edge.source).copied().unwrap_or(edge.source);
                        let id = graph.insert_after(anchor, node)?;
                        let copy_node = graph.node_mut(id);
                        copy_node.site = site;
                        copy_node.advance(NodeState::CopyInserted);

                        anchors.insert(edge.source, id);
                        copies.insert(key, id);

                        let (destination, method) = match site {
                            Site::Device => ("accelerator", "toDevice"),
                            _ => ("host", "toHost"),
                        };
                        ctx.diagnostics.warning(
                            RemarkKind::ImplicitCopy,
                            edge.source,
                            &producer_name,
                            format!(
                                "'{}' implicitly copied to the {}, use .{}",
                                edge.kind, destination, method
                            ),
                        );
                        id
                    }
                };
                graph.set_input(consumer, slot, copy, 0);
            }
        }

        Ok(copies.len())
    }
}

impl Default for PlacementPass {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionPass for PlacementPass {
    fn run(&mut self, graph: &mut Graph, ctx: &mut CompileContext) -> Result<bool> {
        if graph
            .live_nodes()
            .all(|n| n.state >= NodeState::PlacementResolved)
        {
            return Ok(false);
        }

        let hoist = ctx.options.hoist_constants;
        let seeds = Self::seed(graph, hoist);
        for id in graph.program_order().to_vec() {
            let state = if seeds[id].is_assigned() {
                NodeState::PlacementSeeded
            } else {
                NodeState::Unassigned
            };
            graph.node_mut(id).advance(state);
        }

        let mut pinned = BTreeSet::new();
        let mut warned = BTreeSet::new();
        let mut round = 0;
        let solution = loop {
            round += 1;
            let solution = Self::solve(graph, &seeds, &pinned, hoist);
            let Some((head, tail)) = Self::find_conflict(graph, &solution.sites) else {
                break solution;
            };

            if warned.insert(head) {
                let head_node = graph.node(head);
                let message = PartitionError::UnsatisfiablePlacement {
                    node: head_node.name.clone(),
                }
                .to_string();
                ctx.diagnostics.warning(
                    RemarkKind::UnsatisfiableConvergence,
                    head,
                    &head_node.name,
                    message,
                );
            }

            let before = pinned.len();
            pinned.extend(Self::pin_region(graph, head, tail));
            if pinned.len() == before || round >= self.max_rounds {
                // Out of rounds: keep every pin made so far, copies cover the rest
                log::debug!("Loop pinning stopped after {} round(s)", round);
                break Self::solve(graph, &seeds, &pinned, hoist);
            }
            log::debug!(
                "Pinned {} loop node(s) to the host, re-running placement",
                pinned.len() - before
            );
        };

        Self::check_linked(graph, &solution.sites)?;

        for &id in &solution.defaulted {
            let name = graph.node(id).name.clone();
            ctx.diagnostics.note(
                RemarkKind::FallbackPlacement,
                id,
                &name,
                "no device placement evidence, placed on the host",
            );
        }

        for id in graph.program_order().to_vec() {
            let node = graph.node_mut(id);
            if node.is_live() {
                node.site = solution.sites[id];
                node.advance(NodeState::PlacementResolved);
            }
        }

        let copies = Self::insert_copies(graph, ctx)?;
        log::debug!(
            "Placement of '{}' settled after {} round(s), {} copy node(s) inserted",
            graph.name(),
            round,
            copies
        );
        Ok(true)
    }

    fn name(&self) -> &str {
        "Placement"
    }
}
