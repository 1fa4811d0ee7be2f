// Core Layer: errors, compile context and diagnostics

pub mod context;
pub mod diagnostics;
pub mod error;

// Re-export commonly used types
pub use context::{CompileContext, PartitionOptions};
pub use diagnostics::{Diagnostics, Remark, RemarkKind, Severity};
pub use error::{PartitionError, Result};
