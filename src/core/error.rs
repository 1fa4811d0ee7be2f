// Core Layer: Error Types
//
// Every error names the node (by declaration name) it was raised for, so a
// failed compilation can always be traced back to the offending declaration.

use crate::ir::types::ValueKind;
use std::fmt;

/// Errors raised while building, partitioning, lowering or emitting a graph
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionError {
    /// Unresolvable reference, illegal cycle or otherwise ill-formed node
    MalformedGraph { node: String, reason: String },
    /// Loop-carried value that cannot settle on one site.
    ///
    /// Recovered by falling back to the host; only ever reported as a remark.
    UnsatisfiablePlacement { node: String },
    /// Array attribute whose element count disagrees with its declared shape
    AttributeShapeMismatch {
        node: String,
        attribute: String,
        expected: usize,
        found: usize,
    },
    /// Attribute missing or unusable for the op
    InvalidAttribute {
        node: String,
        attribute: String,
        reason: String,
    },
    /// Edge value kind does not match what the consumer expects
    ValueKindMismatch {
        node: String,
        expected: ValueKind,
        found: ValueKind,
    },
    /// A multi-output primitive's passthrough was forced onto another site
    MultiOutputSplit { node: String, primitive: String },
    /// Declaration text could not be read
    Parse(String),
}

impl PartitionError {
    pub fn malformed(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedGraph {
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_attribute(
        node: impl Into<String>,
        attribute: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidAttribute {
            node: node.into(),
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error aborts compilation of the current graph
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnsatisfiablePlacement { .. })
    }

    /// Name of the node the error was reported against, if any
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::MalformedGraph { node, .. }
            | Self::UnsatisfiablePlacement { node }
            | Self::AttributeShapeMismatch { node, .. }
            | Self::InvalidAttribute { node, .. }
            | Self::ValueKindMismatch { node, .. }
            | Self::MultiOutputSplit { node, .. } => Some(node),
            Self::Parse(_) => None,
        }
    }
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedGraph { node, reason } => {
                write!(f, "malformed graph at '{}': {}", node, reason)
            }
            Self::UnsatisfiablePlacement { node } => write!(
                f,
                "loop-carried value '{}' alternates between host and accelerator; \
                 falling back to the host",
                node
            ),
            Self::AttributeShapeMismatch {
                node,
                attribute,
                expected,
                found,
            } => write!(
                f,
                "attribute '{}' of '{}' declares {} element(s) but carries {}",
                attribute, node, expected, found
            ),
            Self::InvalidAttribute {
                node,
                attribute,
                reason,
            } => write!(f, "invalid attribute '{}' on '{}': {}", attribute, node, reason),
            Self::ValueKindMismatch {
                node,
                expected,
                found,
            } => write!(
                f,
                "value kind mismatch at '{}': expected ${}, found ${}",
                node, expected, found
            ),
            Self::MultiOutputSplit { node, primitive } => write!(
                f,
                "'{}' would split the outputs of multi-output op '{}' across sites",
                node, primitive
            ),
            Self::Parse(msg) => write!(f, "parse error: {}", msg),
        }
    }
}

impl std::error::Error for PartitionError {}

/// Result type for partitioning operations
pub type Result<T> = std::result::Result<T, PartitionError>;
