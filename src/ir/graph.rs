// IR Partition Graph
//
// Node store plus program order. Nodes are never removed: elided transfers
// stay in the store so node ids remain stable for diagnostics.

use crate::core::error::{PartitionError, Result};
use crate::ir::node::{Edge, Node, NodeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Dataflow graph of one compilation unit
#[derive(Debug, Clone)]
pub struct Graph {
    name: String,
    /// Nodes indexed by id
    nodes: Vec<Node>,
    /// Program order; synthetic nodes are spliced in without renumbering
    order: Vec<NodeId>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a node at the end of program order
    pub fn add_node(&mut self, node: Node) -> Result<NodeId> {
        let id = self.validate(node)?;
        self.order.push(id);
        Ok(id)
    }

    /// Insert a node directly after `anchor` in program order
    pub fn insert_after(&mut self, anchor: NodeId, node: Node) -> Result<NodeId> {
        let pos = self
            .order
            .iter()
            .position(|&id| id == anchor)
            .ok_or_else(|| PartitionError::malformed(&node.name, "insertion anchor not in graph"))?;
        let id = self.validate(node)?;
        self.order.insert(pos + 1, id);
        Ok(id)
    }

    fn validate(&mut self, mut node: Node) -> Result<NodeId> {
        for edge in node.inputs.iter().filter(|e| !e.backedge) {
            let producer = self.nodes.get(edge.source).ok_or_else(|| {
                PartitionError::malformed(&node.name, format!("input node #{} does not exist", edge.source))
            })?;
            if edge.output >= producer.results.len() {
                return Err(PartitionError::malformed(
                    &node.name,
                    format!(
                        "'{}' has no output {} ({} declared)",
                        producer.name,
                        edge.output,
                        producer.results.len()
                    ),
                ));
            }
        }
        let id = self.nodes.len();
        node.id = id;
        self.nodes.push(node);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// All nodes in id order, elided ones included
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn program_order(&self) -> &[NodeId] {
        &self.order
    }

    /// Non-elided nodes in program order
    pub fn live_nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.order
            .iter()
            .map(move |&id| &self.nodes[id])
            .filter(|n| n.is_live())
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.name == name).map(|n| n.id)
    }

    /// Live consumers of `id` as (consumer, input slot), in program order
    pub fn users(&self, id: NodeId) -> Vec<(NodeId, usize)> {
        let mut users = Vec::new();
        for node in self.live_nodes() {
            for (slot, edge) in node.inputs.iter().enumerate() {
                if edge.source == id {
                    users.push((node.id, slot));
                }
            }
        }
        users
    }

    /// Re-point one input slot, keeping its kind and backedge flag
    pub fn set_input(&mut self, consumer: NodeId, slot: usize, source: NodeId, output: usize) {
        let edge = &mut self.nodes[consumer].inputs[slot];
        edge.source = source;
        edge.output = output;
    }

    pub fn edge(&self, consumer: NodeId, slot: usize) -> &Edge {
        &self.nodes[consumer].inputs[slot]
    }

    /// Live transfer nodes
    pub fn transfer_count(&self) -> usize {
        self.live_nodes().filter(|n| n.is_transfer()).count()
    }

    /// Live nodes sorted so producers precede consumers, ignoring backedges
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut visited = HashMap::new();
        let mut order = Vec::new();
        for &id in &self.order {
            if self.nodes[id].is_live() {
                self.dfs_topo(id, &mut visited, &mut order)?;
            }
        }
        Ok(order)
    }

    fn dfs_topo(
        &self,
        id: NodeId,
        visited: &mut HashMap<NodeId, bool>,
        order: &mut Vec<NodeId>,
    ) -> Result<()> {
        if let Some(&in_progress) = visited.get(&id) {
            if in_progress {
                return Err(PartitionError::malformed(
                    &self.nodes[id].name,
                    "cycle without a backedge",
                ));
            }
            return Ok(());
        }

        visited.insert(id, true);
        for edge in self.nodes[id].inputs.iter().filter(|e| !e.backedge) {
            self.dfs_topo(edge.source, visited, order)?;
        }
        visited.insert(id, false);
        order.push(id);
        Ok(())
    }

    /// Nodes on forward (non-backedge) paths from `head` to `tail`, both included.
    ///
    /// For a backedge `tail -> head` this is the body of the loop it closes.
    pub fn loop_region(&self, head: NodeId, tail: NodeId) -> BTreeSet<NodeId> {
        let mut forward = BTreeSet::new();
        let mut stack = vec![head];
        while let Some(id) = stack.pop() {
            if !forward.insert(id) {
                continue;
            }
            for node in self.live_nodes() {
                if node
                    .inputs
                    .iter()
                    .any(|e| !e.backedge && e.source == id)
                {
                    stack.push(node.id);
                }
            }
        }

        let mut backward = BTreeSet::new();
        let mut stack = vec![tail];
        while let Some(id) = stack.pop() {
            if !backward.insert(id) {
                continue;
            }
            for edge in self.nodes[id].inputs.iter().filter(|e| !e.backedge) {
                stack.push(edge.source);
            }
        }

        forward.intersection(&backward).copied().collect()
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph {} {{", self.name)?;
        for &id in &self.order {
            let node = &self.nodes[id];
            let inputs = node
                .inputs
                .iter()
                .map(|e| {
                    let mut s = self.nodes[e.source].name.clone();
                    if e.output > 0 {
                        s.push_str(&format!("#{}", e.output));
                    }
                    if e.backedge {
                        s.push('^');
                    }
                    s
                })
                .collect::<Vec<_>>()
                .join(", ");
            write!(
                f,
                "  {} = {}({}) @{} [{:?}]",
                node.name,
                node.op.tf_name(),
                inputs,
                node.site,
                node.state
            )?;
            if node.elided {
                write!(f, " elided")?;
            }
            if let Some(instr) = &node.lowered {
                write!(f, " => \"{}\"", instr.tag)?;
            }
            writeln!(f)?;
        }
        write!(f, "}}")
    }
}
