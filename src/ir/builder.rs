// Graph Builder
//
// Turns an ordered list of op declarations into a validated Graph

use crate::core::error::{PartitionError, Result};
use crate::ir::graph::Graph;
use crate::ir::node::{AttrValue, Attribute, Edge, Literal, Node, NodeId, OpKind, Site};
use crate::ir::registry::lookup_op;
use crate::ir::types::{DType, ValueKind};
use std::collections::{HashMap, HashSet};

/// Reference to an output of a declared op
#[derive(Debug, Clone, PartialEq)]
pub struct InputRef {
    pub name: String,
    pub output: usize,
    /// Loop-carried; may name an op declared later
    pub backedge: bool,
}

impl InputRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: 0,
            backedge: false,
        }
    }

    pub fn output(name: impl Into<String>, output: usize) -> Self {
        Self {
            output,
            ..Self::new(name)
        }
    }

    pub fn backedge(name: impl Into<String>) -> Self {
        Self {
            backedge: true,
            ..Self::new(name)
        }
    }
}

/// One op declaration
#[derive(Debug, Clone, PartialEq)]
pub struct OpDecl {
    pub name: String,
    pub op: String,
    pub inputs: Vec<InputRef>,
    pub attributes: Vec<Attribute>,
    pub hint: Option<Site>,
}

impl OpDecl {
    pub fn new(name: impl Into<String>, op: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: op.into(),
            inputs: Vec::new(),
            attributes: Vec::new(),
            hint: None,
        }
    }

    pub fn input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(InputRef::new(name));
        self
    }

    pub fn input_ref(mut self, input: InputRef) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    pub fn on_device(mut self) -> Self {
        self.hint = Some(Site::Device);
        self
    }

    pub fn on_host(mut self) -> Self {
        self.hint = Some(Site::Host);
        self
    }
}

/// A named, ordered list of declarations
#[derive(Debug, Clone, PartialEq)]
pub struct GraphDecl {
    pub name: String,
    pub ops: Vec<OpDecl>,
}

impl GraphDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: Vec::new(),
        }
    }

    pub fn op(mut self, decl: OpDecl) -> Self {
        self.ops.push(decl);
        self
    }
}

/// Backedge waiting for its producer to be declared
struct PendingBackedge {
    consumer: NodeId,
    slot: usize,
    input: InputRef,
}

/// Incremental graph builder
pub struct GraphBuilder {
    graph: Graph,
    names: HashMap<String, NodeId>,
    pending: Vec<PendingBackedge>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            graph: Graph::new(name),
            names: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Add one declaration; its forward inputs must already be declared
    pub fn declare(&mut self, decl: &OpDecl) -> Result<NodeId> {
        if self.names.contains_key(&decl.name) {
            return Err(PartitionError::malformed(&decl.name, "declared twice"));
        }
        let op = lookup_op(&decl.op).ok_or_else(|| {
            PartitionError::malformed(&decl.name, format!("unknown op '{}'", decl.op))
        })?;

        match op.arity() {
            Some(n) if n != decl.inputs.len() => {
                return Err(PartitionError::malformed(
                    &decl.name,
                    format!("{} takes {} input(s), got {}", decl.op, n, decl.inputs.len()),
                ));
            }
            None if decl.inputs.is_empty() => {
                return Err(PartitionError::malformed(
                    &decl.name,
                    format!("{} needs at least one input", decl.op),
                ));
            }
            _ => {}
        }
        if op != OpKind::Merge && decl.inputs.iter().any(|i| i.backedge) {
            return Err(PartitionError::malformed(
                &decl.name,
                "only Merge may take loop-carried inputs",
            ));
        }

        validate_attributes(&decl.name, &decl.attributes)?;

        // Forward inputs first; backedge kinds follow the result kind.
        let mut forward = Vec::new();
        for input in decl.inputs.iter().filter(|i| !i.backedge) {
            forward.push(self.resolve(&decl.name, input)?);
        }
        let results = infer_results(&decl.name, op, &forward, &decl.attributes)?;

        let mut forward = forward.into_iter();
        let mut inputs = Vec::with_capacity(decl.inputs.len());
        let mut backedges = Vec::new();
        for (slot, input) in decl.inputs.iter().enumerate() {
            if input.backedge {
                inputs.push(Edge {
                    source: 0,
                    output: input.output,
                    kind: results[0],
                    backedge: true,
                });
                backedges.push((slot, input.clone()));
            } else if let Some(edge) = forward.next() {
                inputs.push(edge);
            }
        }

        let node = Node::new(&decl.name, op)
            .with_inputs(inputs)
            .with_attributes(decl.attributes.clone())
            .with_results(results)
            .with_hint(decl.hint);
        let id = self.graph.add_node(node)?;
        self.names.insert(decl.name.clone(), id);

        for (slot, input) in backedges {
            self.pending.push(PendingBackedge {
                consumer: id,
                slot,
                input,
            });
        }

        log::trace!("Declared '{}' ({}) as node {}", decl.name, decl.op, id);
        Ok(id)
    }

    fn resolve(&self, consumer: &str, input: &InputRef) -> Result<Edge> {
        let source = *self.names.get(&input.name).ok_or_else(|| {
            PartitionError::malformed(consumer, format!("undeclared input '{}'", input.name))
        })?;
        let producer = self.graph.node(source);
        let kind = producer.results.get(input.output).copied().ok_or_else(|| {
            PartitionError::malformed(
                consumer,
                format!(
                    "'{}' has no output {} ({} declared)",
                    input.name,
                    input.output,
                    producer.results.len()
                ),
            )
        })?;
        Ok(Edge {
            source,
            output: input.output,
            kind,
            backedge: input.backedge,
        })
    }

    /// Resolve pending backedges and check the result for stray cycles
    pub fn finish(mut self) -> Result<Graph> {
        for pending in std::mem::take(&mut self.pending) {
            let consumer_name = self.graph.node(pending.consumer).name.clone();
            let edge = self.resolve(&consumer_name, &pending.input)?;
            let expected = self.graph.edge(pending.consumer, pending.slot).kind;
            if edge.kind != expected {
                return Err(PartitionError::ValueKindMismatch {
                    node: consumer_name,
                    expected,
                    found: edge.kind,
                });
            }
            self.graph.set_input(pending.consumer, pending.slot, edge.source, edge.output);
        }

        self.graph.topological_order()?;
        log::debug!(
            "Built graph '{}' with {} node(s)",
            self.graph.name(),
            self.graph.len()
        );
        Ok(self.graph)
    }
}

/// Build a graph from a full declaration list
pub fn build_graph(decl: &GraphDecl) -> Result<Graph> {
    let mut builder = GraphBuilder::new(&decl.name);
    for op in &decl.ops {
        builder.declare(op)?;
    }
    builder.finish()
}

fn validate_attributes(node: &str, attributes: &[Attribute]) -> Result<()> {
    let mut seen = HashSet::new();
    for attr in attributes {
        if !seen.insert(attr.name.as_str()) {
            return Err(PartitionError::invalid_attribute(
                node,
                &attr.name,
                "declared twice",
            ));
        }
        match &attr.value {
            AttrValue::Array { elem, elems } => check_homogeneous(node, &attr.name, *elem, elems)?,
            AttrValue::Tensor {
                elem,
                elems,
                shape_elem,
                shape,
            } => {
                check_homogeneous(node, &attr.name, *elem, elems)?;
                if !shape_elem.is_integer() {
                    return Err(PartitionError::invalid_attribute(
                        node,
                        &attr.name,
                        format!("shape dimensions must be integers, not {}", shape_elem),
                    ));
                }
                if let Some(d) = shape.iter().find(|&&d| d < 0) {
                    return Err(PartitionError::invalid_attribute(
                        node,
                        &attr.name,
                        format!("negative dimension {}", d),
                    ));
                }
                if let Some(d) = shape
                    .iter()
                    .find(|&&d| Literal::Int64(d).cast(*shape_elem).is_none())
                {
                    return Err(PartitionError::invalid_attribute(
                        node,
                        &attr.name,
                        format!("dimension {} does not fit in {}", d, shape_elem),
                    ));
                }
                let expected = shape
                    .iter()
                    .try_fold(1usize, |acc, &d| acc.checked_mul(usize::try_from(d).ok()?))
                    .ok_or_else(|| {
                        PartitionError::invalid_attribute(
                            node,
                            &attr.name,
                            "shape describes more elements than can be addressed",
                        )
                    })?;
                if expected != elems.len() {
                    return Err(PartitionError::AttributeShapeMismatch {
                        node: node.to_string(),
                        attribute: attr.name.clone(),
                        expected,
                        found: elems.len(),
                    });
                }
            }
            AttrValue::Scalar(_) | AttrValue::Str(_) | AttrValue::Type(_) => {}
        }
    }
    Ok(())
}

fn check_homogeneous(
    node: &str,
    attribute: &str,
    elem: DType,
    elems: &[Literal],
) -> Result<()> {
    match elems.iter().find(|l| l.dtype() != elem) {
        Some(bad) => Err(PartitionError::invalid_attribute(
            node,
            attribute,
            format!("element {} is {}, array holds {}", bad, bad.dtype(), elem),
        )),
        None => Ok(()),
    }
}

fn expect_kind(node: &str, expected: ValueKind, found: ValueKind) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(PartitionError::ValueKindMismatch {
            node: node.to_string(),
            expected,
            found,
        })
    }
}

/// Result kinds of a node, one per output
fn infer_results(
    node: &str,
    op: OpKind,
    inputs: &[Edge],
    attributes: &[Attribute],
) -> Result<Vec<ValueKind>> {
    let attr = |name: &str| attributes.iter().find(|a| a.name == name).map(|a| &a.value);
    let bool_tensor = ValueKind::TensorHandle(DType::Bool);

    let kind = match op {
        OpKind::Argument => match attr("dtype") {
            Some(AttrValue::Type(d)) => ValueKind::TensorHandle(*d),
            _ => {
                return Err(PartitionError::invalid_attribute(
                    node,
                    "dtype",
                    "arguments need a dtype type attribute",
                ))
            }
        },
        OpKind::Constant => match (attr("dtype"), attr("value")) {
            (Some(AttrValue::Type(d)), _) => ValueKind::TensorHandle(*d),
            (_, Some(AttrValue::Scalar(lit))) => ValueKind::TensorHandle(lit.dtype()),
            (_, Some(AttrValue::Array { elem, .. }))
            | (_, Some(AttrValue::Tensor { elem, .. })) => ValueKind::TensorHandle(*elem),
            _ => {
                return Err(PartitionError::invalid_attribute(
                    node,
                    "value",
                    "constants need a dtype or a literal value",
                ))
            }
        },
        OpKind::Arithmetic(arith) => {
            if let [lhs, rhs] = inputs {
                expect_kind(node, lhs.kind, rhs.kind)?;
            }
            if arith.is_comparison() && inputs[0].kind.is_tensor() {
                bool_tensor
            } else if arith.is_comparison() {
                ValueKind::Scalar(DType::Bool)
            } else {
                inputs[0].kind
            }
        }
        OpKind::Select => {
            expect_kind(node, bool_tensor, inputs[0].kind)?;
            expect_kind(node, inputs[1].kind, inputs[2].kind)?;
            inputs[1].kind
        }
        OpKind::Branch => {
            expect_kind(node, bool_tensor, inputs[0].kind)?;
            bool_tensor
        }
        OpKind::Switch => {
            expect_kind(node, bool_tensor, inputs[1].kind)?;
            return Ok(vec![inputs[0].kind; op.output_arity()]);
        }
        OpKind::Merge => {
            let first = inputs.first().ok_or_else(|| {
                PartitionError::malformed(node, "Merge needs a non-loop-carried input")
            })?;
            for other in &inputs[1..] {
                expect_kind(node, first.kind, other.kind)?;
            }
            first.kind
        }
        OpKind::TensorToScalar | OpKind::ScalarToTensor => {
            let found = inputs[0].kind;
            let dtype = found.dtype().unwrap_or(DType::Float);
            let (expected, result) = if op == OpKind::TensorToScalar {
                (ValueKind::TensorHandle(dtype), ValueKind::Scalar(dtype))
            } else {
                (ValueKind::Scalar(dtype), ValueKind::TensorHandle(dtype))
            };
            expect_kind(node, expected, found)?;
            result
        }
        OpKind::Reduction(_)
        | OpKind::Convolution
        | OpKind::Identity
        | OpKind::Transfer { .. } => inputs[0].kind,
    };
    Ok(vec![kind])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_arg(name: &str) -> OpDecl {
        OpDecl::new(name, "Argument").attr("dtype", AttrValue::Type(DType::Float))
    }

    #[test]
    fn test_build_simple_graph() {
        let decl = GraphDecl::new("g")
            .op(float_arg("x"))
            .op(OpDecl::new("y", "Sigmoid").input("x"))
            .op(OpDecl::new("z", "Add").input("x").input("y"));
        let graph = build_graph(&decl).unwrap();

        assert_eq!(graph.len(), 3);
        let z = graph.node(graph.lookup("z").unwrap());
        assert_eq!(z.results, vec![ValueKind::TensorHandle(DType::Float)]);
        assert_eq!(z.inputs[1].source, graph.lookup("y").unwrap());
    }

    #[test]
    fn test_undeclared_input() {
        let decl = GraphDecl::new("g").op(OpDecl::new("y", "Neg").input("nope"));
        match build_graph(&decl) {
            Err(PartitionError::MalformedGraph { node, reason }) => {
                assert_eq!(node, "y");
                assert!(reason.contains("nope"));
            }
            other => panic!("expected malformed graph, got {:?}", other),
        }
    }

    #[test]
    fn test_forward_reference_without_backedge_is_rejected() {
        let decl = GraphDecl::new("g")
            .op(OpDecl::new("a", "Neg").input("b"))
            .op(float_arg("b"));
        assert!(matches!(
            build_graph(&decl),
            Err(PartitionError::MalformedGraph { .. })
        ));
    }

    #[test]
    fn test_backedge_resolved_on_finish() {
        let decl = GraphDecl::new("loop")
            .op(OpDecl::new("init", "Const").attr("value", AttrValue::Scalar(Literal::Float(1.0))))
            .op(OpDecl::new("x", "Merge")
                .input("init")
                .input_ref(InputRef::backedge("next")))
            .op(OpDecl::new("next", "Square").input("x"));
        let graph = build_graph(&decl).unwrap();

        let merge = graph.node(graph.lookup("x").unwrap());
        assert!(merge.inputs[1].backedge);
        assert_eq!(merge.inputs[1].source, graph.lookup("next").unwrap());
    }

    #[test]
    fn test_unresolved_backedge() {
        let decl = GraphDecl::new("loop")
            .op(float_arg("init"))
            .op(OpDecl::new("x", "Merge")
                .input("init")
                .input_ref(InputRef::backedge("missing")));
        assert!(matches!(
            build_graph(&decl),
            Err(PartitionError::MalformedGraph { .. })
        ));
    }

    #[test]
    fn test_tensor_shape_mismatch() {
        let decl = GraphDecl::new("g").op(OpDecl::new("c", "Const").attr(
            "value",
            AttrValue::Tensor {
                elem: DType::Double,
                elems: vec![Literal::Double(1.0), Literal::Double(2.0)],
                shape_elem: DType::Int64,
                shape: vec![3],
            },
        ));
        assert_eq!(
            build_graph(&decl).unwrap_err(),
            PartitionError::AttributeShapeMismatch {
                node: "c".to_string(),
                attribute: "value".to_string(),
                expected: 3,
                found: 2,
            }
        );
    }

    #[test]
    fn test_tensor_shape_overflow() {
        let decl = GraphDecl::new("g").op(OpDecl::new("c", "Const").attr(
            "value",
            AttrValue::Tensor {
                elem: DType::Float,
                elems: vec![],
                shape_elem: DType::Int64,
                shape: vec![1 << 32, 1 << 32],
            },
        ));
        match build_graph(&decl) {
            Err(PartitionError::InvalidAttribute { node, attribute, .. }) => {
                assert_eq!(node, "c");
                assert_eq!(attribute, "value");
            }
            other => panic!("expected invalid attribute, got {:?}", other),
        }
    }

    #[test]
    fn test_shape_dimensions_must_be_integers() {
        let decl = GraphDecl::new("g").op(OpDecl::new("c", "Const").attr(
            "value",
            AttrValue::Tensor {
                elem: DType::Float,
                elems: vec![Literal::Float(1.0)],
                shape_elem: DType::Float,
                shape: vec![1],
            },
        ));
        assert!(matches!(
            build_graph(&decl),
            Err(PartitionError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_empty_tensor_with_zero_dimension() {
        let decl = GraphDecl::new("g").op(OpDecl::new("c", "Const")
            .attr("dtype", AttrValue::Type(DType::Int32))
            .attr(
                "value",
                AttrValue::Tensor {
                    elem: DType::Int32,
                    elems: vec![],
                    shape_elem: DType::Int32,
                    shape: vec![0, 20, 30],
                },
            ));
        assert!(build_graph(&decl).is_ok());
    }

    #[test]
    fn test_select_condition_must_be_bool() {
        let decl = GraphDecl::new("g")
            .op(float_arg("a"))
            .op(OpDecl::new("s", "Select").input("a").input("a").input("a"));
        assert!(matches!(
            build_graph(&decl),
            Err(PartitionError::ValueKindMismatch { .. })
        ));
    }

    #[test]
    fn test_scalar_conversions() {
        let decl = GraphDecl::new("g")
            .op(OpDecl::new("a", "Argument").attr("dtype", AttrValue::Type(DType::Int32)))
            .op(OpDecl::new("s", "TensorToScalar").input("a"))
            .op(OpDecl::new("lt", "Less").input("s").input("s"))
            .op(OpDecl::new("t", "ScalarToTensor").input("s"));
        let graph = build_graph(&decl).unwrap();
        let kind = |name: &str| graph.node(graph.lookup(name).unwrap()).results[0];

        assert_eq!(kind("s"), ValueKind::Scalar(DType::Int32));
        assert_eq!(kind("lt"), ValueKind::Scalar(DType::Bool));
        assert_eq!(kind("t"), ValueKind::TensorHandle(DType::Int32));

        let wrapped_twice = GraphDecl::new("g")
            .op(float_arg("x"))
            .op(OpDecl::new("t", "ScalarToTensor").input("x"));
        assert_eq!(
            build_graph(&wrapped_twice).unwrap_err(),
            PartitionError::ValueKindMismatch {
                node: "t".to_string(),
                expected: ValueKind::Scalar(DType::Float),
                found: ValueKind::TensorHandle(DType::Float),
            }
        );
    }

    #[test]
    fn test_switch_has_two_outputs() {
        let decl = GraphDecl::new("g")
            .op(float_arg("d"))
            .op(OpDecl::new("c", "Argument").attr("dtype", AttrValue::Type(DType::Bool)))
            .op(OpDecl::new("s", "Switch").input("d").input("c"))
            .op(OpDecl::new("y", "Identity").input_ref(InputRef::output("s", 1)))
            .op(OpDecl::new("bad", "Identity").input_ref(InputRef::output("s", 2)));
        match build_graph(&decl) {
            Err(PartitionError::MalformedGraph { node, .. }) => assert_eq!(node, "bad"),
            other => panic!("expected malformed graph, got {:?}", other),
        }
    }
}
