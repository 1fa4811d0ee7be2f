// Graph Emitter
//
// Serializes a lowered graph into two sections: the accelerator function
// (device ops as builtins, attribute operands materialised as literal
// instructions right before their use) and the host remainder.

use crate::core::error::{PartitionError, Result};
use crate::ir::{Edge, Graph, Literal, LoweredInstr, Node, NodeId, OpKind, Operand, Site, ValueKind};
use std::collections::HashMap;
use std::fmt::Write;

/// `$T` or `$(A, B)` for multi-output nodes
fn result_type(results: &[ValueKind]) -> String {
    match results {
        [single] => format!("${}", single),
        many => format!(
            "$({})",
            many.iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn literal_line(lit: &Literal) -> String {
    match lit {
        Literal::Bool(b) => format!("integer_literal $Builtin.Int1, {}", *b as i32),
        Literal::Int32(v) => format!("integer_literal $Builtin.Int32, {}", v),
        Literal::Int64(v) => format!("integer_literal $Builtin.Int64, {}", v),
        Literal::Float(v) => format!(
            "float_literal $Builtin.FPIEEE32, 0x{:08X} // {}",
            v.to_bits(),
            v
        ),
        Literal::Double(v) => format!(
            "float_literal $Builtin.FPIEEE64, 0x{:016X} // {}",
            v.to_bits(),
            v
        ),
    }
}

/// Instruction materialising a non-input operand, plus its type
fn operand_line(operand: &Operand) -> Option<(String, String)> {
    match operand {
        Operand::Input(_) => None,
        Operand::Metatype(d) => {
            let kind = ValueKind::TypeDescriptor(*d);
            Some((format!("metatype ${}", kind), format!("${}", kind)))
        }
        Operand::Literal(lit) => Some((
            literal_line(lit),
            format!("${}", ValueKind::Scalar(lit.dtype())),
        )),
        Operand::Str(s) => Some((
            format!("string_literal utf8 {:?}", s),
            format!("${}", ValueKind::RawPointer),
        )),
    }
}

fn lowered(node: &Node) -> Result<&LoweredInstr> {
    node.lowered
        .as_ref()
        .ok_or_else(|| PartitionError::malformed(&node.name, "not lowered before emission"))
}

/// Value numbering for one section
struct Numbering {
    prefix: &'static str,
    values: HashMap<NodeId, usize>,
}

impl Numbering {
    fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            values: HashMap::new(),
        }
    }

    fn reference(&self, graph: &Graph, edge: &Edge) -> Option<String> {
        let n = self.values.get(&edge.source)?;
        let mut s = format!("%{}{}", self.prefix, n);
        if graph.node(edge.source).results.len() > 1 {
            let _ = write!(s, "#{}", edge.output);
        }
        Some(s)
    }
}

/// Emits the accelerator and host sections of a lowered graph
pub struct Emitter<'g> {
    graph: &'g Graph,
    device: Numbering,
}

impl<'g> Emitter<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            device: Numbering::new(""),
        }
    }

    fn is_block_argument(node: &Node) -> bool {
        node.site == Site::Device && (node.is_transfer() || node.op == OpKind::Argument)
    }

    fn device_ref(&self, consumer: &Node, edge: &Edge) -> Result<String> {
        self.device.reference(self.graph, edge).ok_or_else(|| {
            PartitionError::malformed(
                &consumer.name,
                format!(
                    "accelerator op reads host value '{}' without a transfer",
                    self.graph.node(edge.source).name
                ),
            )
        })
    }

    pub fn emit(mut self) -> Result<String> {
        let graph = self.graph;
        for node in graph.live_nodes() {
            lowered(node)?;
            if !node.site.is_assigned() {
                return Err(PartitionError::malformed(&node.name, "emitted without a site"));
            }
        }

        let instrs: Vec<&Node> = graph
            .live_nodes()
            .filter(|n| n.site == Site::Device && !Self::is_block_argument(n))
            .collect();

        // Block arguments, numbered by first use
        let mut args: Vec<NodeId> = Vec::new();
        for node in &instrs {
            for edge in &node.inputs {
                let source = graph.node(edge.source);
                if Self::is_block_argument(source) && !args.contains(&source.id) {
                    args.push(source.id);
                }
            }
        }
        for node in graph.live_nodes().filter(|n| Self::is_block_argument(n)) {
            if !args.contains(&node.id) {
                args.push(node.id);
            }
        }
        for (i, &id) in args.iter().enumerate() {
            self.device.values.insert(id, i);
        }

        // Attribute operands take numbers ahead of their instruction
        let mut next = args.len();
        let mut operand_numbers: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for node in &instrs {
            let instr = lowered(node)?;
            let count = instr
                .operands
                .iter()
                .filter(|o| !matches!(o, Operand::Input(_)))
                .count();
            operand_numbers.insert(node.id, (next..next + count).collect());
            next += count;
            self.device.values.insert(node.id, next);
            next += 1;
        }

        // Values returned to the host
        let mut returns: Vec<&Edge> = Vec::new();
        for node in graph.live_nodes() {
            if node.is_transfer() && node.site == Site::Host {
                let edge = &node.inputs[0];
                let on_device = graph.node(edge.source).site == Site::Device;
                let seen = returns
                    .iter()
                    .any(|e| e.source == edge.source && e.output == edge.output);
                if on_device && !seen {
                    returns.push(edge);
                }
            }
        }

        let mut out = String::new();
        let arg_types: Vec<String> = args
            .iter()
            .map(|&id| graph.node(id).results[0].to_string())
            .collect();
        let ret_type = match returns.as_slice() {
            [] => "()".to_string(),
            [single] => single.kind.to_string(),
            many => format!(
                "({})",
                many.iter()
                    .map(|e| e.kind.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };

        let _ = writeln!(out, "--- Partition Accelerator Result: {}", graph.name());
        let _ = writeln!(
            out,
            "accelerator @{} : ({}) -> {} {{",
            graph.name(),
            arg_types.join(", "),
            ret_type
        );
        if args.is_empty() {
            let _ = writeln!(out, "bb0:");
        } else {
            let params: Vec<String> = args
                .iter()
                .zip(&arg_types)
                .enumerate()
                .map(|(i, (_, ty))| format!("%{} : ${}", i, ty))
                .collect();
            let _ = writeln!(out, "bb0({}):", params.join(", "));
        }

        for node in &instrs {
            let instr = lowered(node)?;
            let numbers = operand_numbers.get(&node.id).cloned().unwrap_or_default();
            let mut literals = numbers.iter();
            let mut operands = Vec::with_capacity(instr.operands.len());

            for operand in &instr.operands {
                match operand {
                    Operand::Input(slot) => {
                        let edge = &node.inputs[*slot];
                        operands.push(format!("{} : ${}", self.device_ref(node, edge)?, edge.kind));
                    }
                    other => {
                        let (line, ty) = operand_line(other).unwrap_or_default();
                        let n = literals.next().copied().unwrap_or_default();
                        let _ = writeln!(out, "  %{} = {}", n, line);
                        operands.push(format!("%{} : {}", n, ty));
                    }
                }
            }

            let _ = writeln!(
                out,
                "  %{} = builtin \"__tfop_{}\"({}) : {}",
                self.device.values[&node.id],
                instr.tag,
                operands.join(", "),
                result_type(&node.results)
            );
        }

        match returns.as_slice() {
            [] => {
                let _ = writeln!(out, "  return");
            }
            [single] => {
                let value = self.device.reference(graph, single).unwrap_or_default();
                let _ = writeln!(out, "  return {} : ${}", value, single.kind);
            }
            many => {
                let parts: Vec<String> = many
                    .iter()
                    .map(|e| {
                        format!(
                            "{} : ${}",
                            self.device.reference(graph, e).unwrap_or_default(),
                            e.kind
                        )
                    })
                    .collect();
                let _ = writeln!(out, "  %{} = tuple ({})", next, parts.join(", "));
                let _ = writeln!(out, "  return %{} : ${}", next, ret_type);
            }
        }
        let _ = writeln!(out, "}}");

        self.emit_host(&mut out)?;
        Ok(out)
    }

    /// Host ops, every live transfer and the graph arguments
    fn emit_host(&self, out: &mut String) -> Result<()> {
        let graph = self.graph;
        let mut host = Numbering::new("h");
        let listed: Vec<&Node> = graph
            .live_nodes()
            .filter(|n| {
                n.site == Site::Host || n.is_transfer() || n.op == OpKind::Argument
            })
            .collect();
        for (i, node) in listed.iter().enumerate() {
            host.values.insert(node.id, i);
        }

        let _ = writeln!(out, "--- Partition Host Result: {}", graph.name());
        for node in listed {
            let instr = lowered(node)?;
            let mut operands = Vec::new();
            for operand in &instr.operands {
                if let Operand::Input(slot) = operand {
                    let edge = &node.inputs[*slot];
                    let value = match host.reference(graph, edge) {
                        Some(v) => v,
                        None => self.device_ref(node, edge)?,
                    };
                    operands.push(format!("{} : ${}", value, edge.kind));
                }
            }
            let _ = write!(
                out,
                "  %h{} = \"{}\"({}) : {}",
                host.values[&node.id],
                instr.tag,
                operands.join(", "),
                result_type(&node.results)
            );
            if node.op == OpKind::Argument {
                let _ = write!(out, " // {}", node.name);
            }
            let _ = writeln!(out);
        }
        Ok(())
    }
}

/// Emit the canonical text of a fully lowered graph
pub fn emit(graph: &Graph) -> Result<String> {
    Emitter::new(graph).emit()
}
