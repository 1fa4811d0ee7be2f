// Core Layer: Compile Context
//
// Options and the diagnostics sink, passed explicitly through the pipeline

use crate::core::diagnostics::Diagnostics;

/// Partitioning options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionOptions {
    /// Constants follow their consumers instead of their own hint
    pub hoist_constants: bool,
    /// Dump the graph after every pass
    pub dump_intermediates: bool,
}

impl PartitionOptions {
    pub fn new() -> Self {
        Self {
            hoist_constants: true,
            dump_intermediates: false,
        }
    }

    pub fn with_hoist_constants(mut self, hoist: bool) -> Self {
        self.hoist_constants = hoist;
        self
    }

    pub fn with_dump_intermediates(mut self, dump: bool) -> Self {
        self.dump_intermediates = dump;
        self
    }
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-compilation state shared by the passes
#[derive(Debug, Clone, Default)]
pub struct CompileContext {
    pub options: PartitionOptions,
    pub diagnostics: Diagnostics,
    /// (pass name, graph dump) when `dump_intermediates` is set
    pub intermediates: Vec<(String, String)>,
}

impl CompileContext {
    pub fn new(options: PartitionOptions) -> Self {
        Self {
            options,
            diagnostics: Diagnostics::new(),
            intermediates: Vec::new(),
        }
    }

    /// Clear per-graph state before the next compilation
    pub fn reset(&mut self) {
        self.diagnostics.take();
        self.intermediates.clear();
    }
}
