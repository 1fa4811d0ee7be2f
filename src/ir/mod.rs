// IR Module: partition graph representation

pub mod builder;
pub mod graph;
pub mod node;
pub mod registry;
pub mod types;

// Re-exports
pub use builder::{build_graph, GraphBuilder, GraphDecl, InputRef, OpDecl};
pub use graph::Graph;
pub use node::{
    ArithOp, AttrValue, Attribute, Edge, Literal, LoweredInstr, Node, NodeId, NodeState,
    OpKind, Operand, ReduceOp, Site,
};
pub use registry::lookup_op;
pub use types::{DType, ValueKind};
