// Core Layer: Diagnostics
//
// Structured remarks produced while partitioning. Remarks are collected on
// the compile context and mirrored to the log.

use crate::ir::node::NodeId;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemarkKind {
    /// A transfer was removed by copy elimination
    CopyElided,
    /// A node had no placement evidence and defaulted to the host
    FallbackPlacement,
    /// A loop-carried value could not settle on one site
    UnsatisfiableConvergence,
    /// Placement had to insert a transfer the program did not ask for
    ImplicitCopy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Note,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A diagnostic attached to one node
#[derive(Debug, Clone, PartialEq)]
pub struct Remark {
    pub kind: RemarkKind,
    pub severity: Severity,
    pub node: NodeId,
    pub node_name: String,
    pub message: String,
}

impl fmt::Display for Remark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.node_name, self.severity, self.message)
    }
}

/// Remark sink for one compilation
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    remarks: Vec<Remark>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&mut self, kind: RemarkKind, node: NodeId, node_name: &str, message: impl Into<String>) {
        self.push(kind, Severity::Note, node, node_name, message.into());
    }

    pub fn warning(&mut self, kind: RemarkKind, node: NodeId, node_name: &str, message: impl Into<String>) {
        self.push(kind, Severity::Warning, node, node_name, message.into());
    }

    fn push(&mut self, kind: RemarkKind, severity: Severity, node: NodeId, node_name: &str, message: String) {
        let remark = Remark {
            kind,
            severity,
            node,
            node_name: node_name.to_string(),
            message,
        };
        match severity {
            Severity::Warning => log::warn!("{}", remark),
            Severity::Note => log::debug!("{}", remark),
        }
        self.remarks.push(remark);
    }

    pub fn remarks(&self) -> &[Remark] {
        &self.remarks
    }

    pub fn count(&self, kind: RemarkKind) -> usize {
        self.remarks.iter().filter(|r| r.kind == kind).count()
    }

    pub fn has_warnings(&self) -> bool {
        self.remarks.iter().any(|r| r.severity == Severity::Warning)
    }

    /// Drain the collected remarks
    pub fn take(&mut self) -> Vec<Remark> {
        std::mem::take(&mut self.remarks)
    }
}
