// Pipeline Driver
//
// Builder -> placement -> copy elimination -> lowering -> emitter. Emission
// only runs once every pass succeeded, so a failed graph never produces
// partial output.

use crate::compiler::emitter::emit;
use crate::core::context::{CompileContext, PartitionOptions};
use crate::core::diagnostics::Remark;
use crate::core::error::Result;
use crate::ir::{build_graph, Graph, GraphDecl, NodeState, OpKind, Site};
use crate::passes::PassManager;
use crate::text::parse_program;

/// Counts describing a compiled partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionStats {
    pub device_nodes: usize,
    pub host_nodes: usize,
    /// Synthetic copies placement had to insert
    pub copies_inserted: usize,
    pub copies_elided: usize,
    /// Transfers still present in the output
    pub live_transfers: usize,
}

impl PartitionStats {
    fn collect(graph: &Graph) -> Self {
        let mut stats = Self::default();
        for node in graph.nodes() {
            if let OpKind::Transfer { synthetic, .. } = node.op {
                if synthetic {
                    stats.copies_inserted += 1;
                }
                if node.elided {
                    stats.copies_elided += 1;
                } else {
                    stats.live_transfers += 1;
                }
                continue;
            }
            match node.site {
                Site::Device => stats.device_nodes += 1,
                Site::Host => stats.host_nodes += 1,
                Site::Unassigned => {}
            }
        }
        stats
    }
}

/// Result of compiling one graph
#[derive(Debug, Clone)]
pub struct CompiledPartition {
    pub name: String,
    pub graph: Graph,
    pub text: String,
    pub remarks: Vec<Remark>,
    pub stats: PartitionStats,
    /// (pass, graph dump) pairs, when intermediates were requested
    pub intermediates: Vec<(String, String)>,
}

/// Compile one declared graph
pub fn compile_graph(decl: &GraphDecl, ctx: &mut CompileContext) -> Result<CompiledPartition> {
    ctx.reset();
    log::info!("Partitioning graph '{}' ({} op(s))", decl.name, decl.ops.len());

    let mut graph = build_graph(decl)?;
    PassManager::standard().run_all(&mut graph, ctx)?;
    let text = emit(&graph)?;

    for id in graph.program_order().to_vec() {
        let node = graph.node_mut(id);
        if node.is_live() {
            node.advance(NodeState::Emitted);
        }
    }

    let stats = PartitionStats::collect(&graph);
    log::debug!("Partition '{}': {:?}", decl.name, stats);
    Ok(CompiledPartition {
        name: decl.name.clone(),
        graph,
        text,
        remarks: ctx.diagnostics.take(),
        stats,
        intermediates: std::mem::take(&mut ctx.intermediates),
    })
}

/// Parse a declaration file and compile every graph in it.
///
/// A graph that fails does not stop the others; only a parse failure
/// aborts the whole program.
pub fn compile_program(
    source: &str,
    options: PartitionOptions,
) -> Result<Vec<Result<CompiledPartition>>> {
    let decls = parse_program(source)?;
    let mut ctx = CompileContext::new(options);
    Ok(decls
        .iter()
        .map(|decl| compile_graph(decl, &mut ctx))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AttrValue, DType, OpDecl};

    #[test]
    fn test_states_end_emitted() {
        let decl = GraphDecl::new("g")
            .op(OpDecl::new("x", "Argument").attr("dtype", AttrValue::Type(DType::Float)))
            .op(OpDecl::new("d", "toDevice").input("x"))
            .op(OpDecl::new("y", "Neg").input("d"))
            .op(OpDecl::new("r", "toHost").input("y"));
        let mut ctx = CompileContext::default();
        let compiled = compile_graph(&decl, &mut ctx).unwrap();

        assert!(compiled
            .graph
            .live_nodes()
            .all(|n| n.state == NodeState::Emitted));
        assert_eq!(
            compiled.stats,
            PartitionStats {
                device_nodes: 1,
                host_nodes: 1,
                copies_inserted: 0,
                copies_elided: 0,
                live_transfers: 2,
            }
        );
    }

    #[test]
    fn test_dump_intermediates() {
        let decl = GraphDecl::new("g")
            .op(OpDecl::new("x", "Argument").attr("dtype", AttrValue::Type(DType::Float)));
        let mut ctx = CompileContext::new(PartitionOptions::new().with_dump_intermediates(true));
        let compiled = compile_graph(&decl, &mut ctx).unwrap();

        let passes: Vec<_> = compiled.intermediates.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(passes, vec!["Placement", "CopyElimination", "Lowering"]);
        assert!(compiled.intermediates[0].1.starts_with("graph g {"));
    }

    #[test]
    fn test_failed_graph_does_not_stop_program() {
        let source = r#"
            (graph bad (y Neg missing))
            (graph good (x Argument (dtype Float)))
        "#;
        let results = compile_program(source, PartitionOptions::new()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }
}
