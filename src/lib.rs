// tfpartition: host/accelerator partitioning for tensor dataflow graphs
//
// Takes an ordered list of op declarations, decides which ops run on the
// accelerator and which stay on the host, removes transfers that do not
// cross sites, lowers accelerator ops to role-tagged builtins and emits the
// result as canonical text.
//
// Architecture:
// - core: errors, compile options/context, diagnostics
// - ir: value kinds, nodes, graph store, op registry, graph builder
// - passes: placement, copy elimination, op lowering
// - compiler: emitter, pipeline driver, partition cache
// - text: s-expression declaration reader

#[macro_use]
extern crate lazy_static;

pub mod compiler;
pub mod core;
pub mod ir;
pub mod passes;
pub mod text;

// Re-export commonly used items for convenience
pub use compiler::{compile_graph, compile_program, CompiledPartition, Compiler};
pub use self::core::{CompileContext, PartitionError, PartitionOptions, Remark, RemarkKind, Result};
pub use ir::{GraphDecl, InputRef, OpDecl};
