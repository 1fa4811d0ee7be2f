// Op Lowering Pass
//
// Rewrites device-placed nodes into canonical instructions whose tag spells
// out every operand role:
//
//   Conv2D,$in,$in,strides$array,$elt,$elt,$elt,$elt,padding
//
// Tensor inputs come first, then attributes in declaration order. Array
// attributes expand inline: a `name$array` marker (the element metatype)
// followed by one `$elt` per element. Tensor literals expand to
// `name$tensor` + elements, then `name$shape` + one `$elt` per dimension
// in the shape element type.

use crate::core::context::CompileContext;
use crate::core::error::Result;
use crate::ir::{
    AttrValue, Attribute, DType, Graph, Literal, LoweredInstr, Node, NodeId, NodeState, OpKind,
    Operand, Site,
};
use crate::passes::pass::PartitionPass;

/// Op lowering pass
pub struct LoweringPass;

impl LoweringPass {
    pub fn new() -> Self {
        Self
    }

    /// Canonical instruction for a device op
    pub fn lower_device(node: &Node) -> LoweredInstr {
        let mut tag = node.op.tf_name().to_string();
        let mut operands = Vec::new();

        for slot in 0..node.inputs.len() {
            tag.push_str(",$in");
            operands.push(Operand::Input(slot));
        }
        for attr in &node.attributes {
            lower_attribute(attr, &mut tag, &mut operands);
        }

        LoweredInstr { tag, operands }
    }

    /// Host ops, arguments and surviving transfers keep their plain name
    pub fn lower_plain(node: &Node) -> LoweredInstr {
        LoweredInstr {
            tag: node.op.tf_name().to_string(),
            operands: (0..node.inputs.len()).map(Operand::Input).collect(),
        }
    }
}

fn push_elements(elems: &[Literal], tag: &mut String, operands: &mut Vec<Operand>) {
    for lit in elems {
        tag.push_str(",$elt");
        operands.push(Operand::Literal(*lit));
    }
}

fn lower_attribute(attr: &Attribute, tag: &mut String, operands: &mut Vec<Operand>) {
    match &attr.value {
        AttrValue::Scalar(lit) => {
            tag.push_str(&format!(",{}", attr.name));
            operands.push(Operand::Literal(*lit));
        }
        AttrValue::Str(s) => {
            tag.push_str(&format!(",{}", attr.name));
            operands.push(Operand::Str(s.clone()));
        }
        AttrValue::Type(d) => {
            tag.push_str(&format!(",{}", attr.name));
            operands.push(Operand::Metatype(*d));
        }
        AttrValue::Array { elem, elems } => {
            tag.push_str(&format!(",{}$array", attr.name));
            operands.push(Operand::Metatype(*elem));
            push_elements(elems, tag, operands);
        }
        AttrValue::Tensor {
            elem,
            elems,
            shape_elem,
            shape,
        } => {
            tag.push_str(&format!(",{}$tensor", attr.name));
            operands.push(Operand::Metatype(*elem));
            push_elements(elems, tag, operands);

            tag.push_str(&format!(",{}$shape", attr.name));
            operands.push(Operand::Metatype(*shape_elem));
            // Dimensions were range-checked against `shape_elem` by the builder
            let dims: Vec<Literal> = shape
                .iter()
                .map(|&d| Literal::Int64(d).cast(*shape_elem).unwrap_or(Literal::Int64(d)))
                .collect();
            push_elements(&dims, tag, operands);
        }
    }
}

impl Default for LoweringPass {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionPass for LoweringPass {
    fn run(&mut self, graph: &mut Graph, _ctx: &mut CompileContext) -> Result<bool> {
        let pending: Vec<NodeId> = graph
            .live_nodes()
            .filter(|n| n.state < NodeState::Lowered)
            .map(|n| n.id)
            .collect();

        for &id in &pending {
            let node = graph.node(id);
            let instr = match (node.site, node.op) {
                (_, OpKind::Transfer { .. }) | (_, OpKind::Argument) => Self::lower_plain(node),
                (Site::Device, _) => Self::lower_device(node),
                _ => Self::lower_plain(node),
            };
            log::trace!("Lowered '{}' to \"{}\"", node.name, instr.tag);

            let node = graph.node_mut(id);
            node.lowered = Some(instr);
            node.advance(NodeState::Lowered);
        }

        Ok(!pending.is_empty())
    }

    fn name(&self) -> &str {
        "Lowering"
    }
}
