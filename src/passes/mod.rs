// Partition passes: placement, copy elimination, lowering

pub mod copy_elim;
pub mod lowering;
pub mod pass;
pub mod placement;

// Re-exports
pub use copy_elim::CopyEliminationPass;
pub use lowering::LoweringPass;
pub use pass::{PartitionPass, PassManager};
pub use placement::PlacementPass;
