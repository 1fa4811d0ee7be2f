// Compiler Module: pipeline driver, emitter and partition cache

pub mod cache;
pub mod emitter;
pub mod pipeline;

// Re-exports
pub use cache::{CacheKey, CacheStats, CachedPartition, Compiler, PartitionCache};
pub use emitter::{emit, Emitter};
pub use pipeline::{compile_graph, compile_program, CompiledPartition, PartitionStats};
