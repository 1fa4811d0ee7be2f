// IR Node Types
//
// Nodes, edges, attributes and the per-node lifecycle state

use crate::ir::types::{DType, ValueKind};
use std::fmt;

/// Unique node identifier in a partition graph
pub type NodeId = usize;

/// Execution site of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Site {
    Host,
    Device,
    Unassigned,
}

impl Site {
    pub fn is_assigned(&self) -> bool {
        !matches!(self, Site::Unassigned)
    }

    /// Name of the explicit transfer that moves a value onto this site
    pub fn transfer_name(&self) -> &'static str {
        match self {
            Site::Device => "toDevice",
            _ => "toHost",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Site::Host => write!(f, "host"),
            Site::Device => write!(f, "device"),
            Site::Unassigned => write!(f, "unassigned"),
        }
    }
}

/// Typed scalar literal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
}

impl Literal {
    pub fn dtype(&self) -> DType {
        match self {
            Literal::Bool(_) => DType::Bool,
            Literal::Int32(_) => DType::Int32,
            Literal::Int64(_) => DType::Int64,
            Literal::Float(_) => DType::Float,
            Literal::Double(_) => DType::Double,
        }
    }

    /// Convert to another element type.
    ///
    /// Integers widen or narrow (when the value fits) and promote to floats;
    /// floats only convert between float widths.
    pub fn cast(&self, to: DType) -> Option<Literal> {
        if self.dtype() == to {
            return Some(*self);
        }
        match (*self, to) {
            (Literal::Int32(v), DType::Int64) => Some(Literal::Int64(v as i64)),
            (Literal::Int64(v), DType::Int32) => i32::try_from(v).ok().map(Literal::Int32),
            (Literal::Int32(v), DType::Float) => Some(Literal::Float(v as f32)),
            (Literal::Int32(v), DType::Double) => Some(Literal::Double(v as f64)),
            (Literal::Int64(v), DType::Float) => Some(Literal::Float(v as f32)),
            (Literal::Int64(v), DType::Double) => Some(Literal::Double(v as f64)),
            (Literal::Double(v), DType::Float) => Some(Literal::Float(v as f32)),
            (Literal::Float(v), DType::Double) => Some(Literal::Double(v as f64)),
            _ => None,
        }
    }

    /// Integer value, for shape dimensions
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Int32(v) => Some(*v as i64),
            Literal::Int64(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int32(v) => write!(f, "{}", v),
            Literal::Int64(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::Double(v) => write!(f, "{}", v),
        }
    }
}

/// Attribute payload
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Single literal
    Scalar(Literal),
    /// Homogeneous array of literals
    Array { elem: DType, elems: Vec<Literal> },
    /// Tensor literal: elements plus explicit shape
    Tensor {
        elem: DType,
        elems: Vec<Literal>,
        /// Integer type the dimensions are materialised as
        shape_elem: DType,
        shape: Vec<i64>,
    },
    /// String or enum value (e.g. padding mode)
    Str(String),
    /// Type tag
    Type(DType),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(items: &[T]) -> String {
            items
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }
        match self {
            AttrValue::Scalar(lit) => write!(f, "{}", lit),
            AttrValue::Array { elem, elems } => write!(f, "{}[{}]", elem, join(elems)),
            AttrValue::Tensor {
                elem,
                elems,
                shape_elem,
                shape,
            } => write!(
                f,
                "{}[{}] shape {}[{}]",
                elem,
                join(elems),
                shape_elem,
                join(shape)
            ),
            AttrValue::Str(s) => write!(f, "{:?}", s),
            AttrValue::Type(d) => write!(f, "{}.self", d),
        }
    }
}

/// Named attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttrValue,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: AttrValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Element-wise and matrix arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    RealDiv,
    Maximum,
    Minimum,
    MatMul,
    Less,
    Greater,
    Equal,
    Neg,
    Sigmoid,
    Square,
}

impl ArithOp {
    pub fn name(&self) -> &'static str {
        match self {
            ArithOp::Add => "Add",
            ArithOp::Sub => "Sub",
            ArithOp::Mul => "Mul",
            ArithOp::RealDiv => "RealDiv",
            ArithOp::Maximum => "Maximum",
            ArithOp::Minimum => "Minimum",
            ArithOp::MatMul => "MatMul",
            ArithOp::Less => "Less",
            ArithOp::Greater => "Greater",
            ArithOp::Equal => "Equal",
            ArithOp::Neg => "Neg",
            ArithOp::Sigmoid => "Sigmoid",
            ArithOp::Square => "Square",
        }
    }

    pub fn is_unary(&self) -> bool {
        matches!(self, ArithOp::Neg | ArithOp::Sigmoid | ArithOp::Square)
    }

    /// Comparisons produce Bool tensors
    pub fn is_comparison(&self) -> bool {
        matches!(self, ArithOp::Less | ArithOp::Greater | ArithOp::Equal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Sum,
    Mean,
    Max,
    Min,
}

impl ReduceOp {
    pub fn name(&self) -> &'static str {
        match self {
            ReduceOp::Sum => "Sum",
            ReduceOp::Mean => "Mean",
            ReduceOp::Max => "Max",
            ReduceOp::Min => "Min",
        }
    }
}

/// Operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Graph input
    Argument,
    /// Constant tensor (site-agnostic)
    Constant,
    Arithmetic(ArithOp),
    /// Select(cond, a, b)
    Select,
    Reduction(ReduceOp),
    /// Conv2D(input, filter)
    Convolution,
    /// Loop-continuation predicate
    Branch,
    /// Multi-output primitive: Switch(data, pred) -> (false, true)
    Switch,
    /// Passthrough
    Identity,
    /// Join of a loop-carried value
    Merge,
    /// Reads the single element of a tensor as a scalar
    TensorToScalar,
    /// Wraps a scalar into a rank-0 tensor
    ScalarToTensor,
    /// Host/device transfer; `synthetic` copies are inserted by placement
    Transfer { to: Site, synthetic: bool },
}

impl OpKind {
    /// Op name used in lowered tags
    pub fn tf_name(&self) -> &'static str {
        match self {
            OpKind::Argument => "Argument",
            OpKind::Constant => "Const",
            OpKind::Arithmetic(op) => op.name(),
            OpKind::Select => "Select",
            OpKind::Reduction(op) => op.name(),
            OpKind::Convolution => "Conv2D",
            OpKind::Branch => "LoopCond",
            OpKind::Switch => "Switch",
            OpKind::Identity => "Identity",
            OpKind::Merge => "Merge",
            OpKind::TensorToScalar => "TensorToScalar",
            OpKind::ScalarToTensor => "ScalarToTensor",
            OpKind::Transfer { to, .. } => to.transfer_name(),
        }
    }

    /// Exact number of inputs, or `None` for variadic ops
    pub fn arity(&self) -> Option<usize> {
        match self {
            OpKind::Argument | OpKind::Constant => Some(0),
            OpKind::Arithmetic(op) if op.is_unary() => Some(1),
            OpKind::Arithmetic(_) => Some(2),
            OpKind::Select => Some(3),
            OpKind::Reduction(_) | OpKind::Branch | OpKind::Identity => Some(1),
            OpKind::TensorToScalar | OpKind::ScalarToTensor => Some(1),
            OpKind::Convolution | OpKind::Switch => Some(2),
            OpKind::Transfer { .. } => Some(1),
            OpKind::Merge => None,
        }
    }

    pub fn output_arity(&self) -> usize {
        match self {
            OpKind::Switch => 2,
            _ => 1,
        }
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, OpKind::Transfer { .. })
    }
}

/// Directed edge from a producer output into a consumer input slot
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub source: NodeId,
    pub output: usize,
    pub kind: ValueKind,
    /// Loop-carried edge; the only edges allowed to point forward
    pub backedge: bool,
}

/// Node lifecycle, in the order the pipeline advances it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeState {
    Built,
    Unassigned,
    PlacementSeeded,
    PlacementResolved,
    CopyInserted,
    CopyElided,
    Lowered,
    Emitted,
}

/// Operand of a lowered instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// The node's input edge at this slot
    Input(usize),
    /// `metatype $@thin T.Type`
    Metatype(DType),
    Literal(Literal),
    /// `string_literal utf8 "..."`
    Str(String),
}

/// Canonical low-level instruction: role-tagged name plus operands
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredInstr {
    pub tag: String,
    pub operands: Vec<Operand>,
}

/// Graph node
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    /// Declaration name, used in diagnostics
    pub name: String,
    pub op: OpKind,
    pub inputs: Vec<Edge>,
    pub attributes: Vec<Attribute>,
    /// One kind per output
    pub results: Vec<ValueKind>,
    /// Explicit placement request
    pub hint: Option<Site>,
    pub site: Site,
    pub state: NodeState,
    /// Set by copy elimination; elided nodes stay in the store
    pub elided: bool,
    pub lowered: Option<LoweredInstr>,
}

impl Node {
    pub fn new(name: impl Into<String>, op: OpKind) -> Self {
        Self {
            id: 0,
            name: name.into(),
            op,
            inputs: Vec::new(),
            attributes: Vec::new(),
            results: Vec::new(),
            hint: None,
            site: Site::Unassigned,
            state: NodeState::Built,
            elided: false,
            lowered: None,
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<Edge>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<Attribute>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_results(mut self, results: Vec<ValueKind>) -> Self {
        self.results = results;
        self
    }

    pub fn with_hint(mut self, hint: Option<Site>) -> Self {
        self.hint = hint;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    pub fn is_transfer(&self) -> bool {
        self.op.is_transfer()
    }

    pub fn is_constant(&self) -> bool {
        self.op == OpKind::Constant
    }

    pub fn is_live(&self) -> bool {
        !self.elided
    }

    /// Move the node forward in its lifecycle; never backwards
    pub fn advance(&mut self, state: NodeState) {
        debug_assert!(
            state >= self.state,
            "node '{}' cannot move from {:?} back to {:?}",
            self.name,
            self.state,
            state
        );
        if state > self.state {
            self.state = state;
        }
    }
}
