// IR Type System
//
// Element types and the value kinds carried on graph edges

use std::fmt;

/// Tensor element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DType {
    Bool,
    Int32,
    Int64,
    Float,
    Double,
}

impl DType {
    /// Parse a dtype name as written in declarations
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Bool" => Some(DType::Bool),
            "Int32" => Some(DType::Int32),
            "Int" | "Int64" => Some(DType::Int64),
            "Float" => Some(DType::Float),
            "Double" => Some(DType::Double),
            _ => None,
        }
    }

    /// Source-level type name (used in metatypes and handle types)
    pub fn name(&self) -> &'static str {
        match self {
            DType::Bool => "Bool",
            DType::Int32 => "Int32",
            DType::Int64 => "Int",
            DType::Float => "Float",
            DType::Double => "Double",
        }
    }

    /// Builtin machine type a literal of this dtype is materialised as
    pub fn builtin(&self) -> &'static str {
        match self {
            DType::Bool => "Builtin.Int1",
            DType::Int32 => "Builtin.Int32",
            DType::Int64 => "Builtin.Int64",
            DType::Float => "Builtin.FPIEEE32",
            DType::Double => "Builtin.FPIEEE64",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, DType::Int32 | DType::Int64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Kind of value flowing along an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Tensor handle with element type
    TensorHandle(DType),
    /// Scalar literal of a builtin type
    Scalar(DType),
    /// Untyped pointer (string payloads)
    RawPointer,
    /// Thin metatype of an element type
    TypeDescriptor(DType),
}

impl ValueKind {
    pub fn is_tensor(&self) -> bool {
        matches!(self, ValueKind::TensorHandle(_))
    }

    /// Element type, when the kind has one
    pub fn dtype(&self) -> Option<DType> {
        match self {
            ValueKind::TensorHandle(d) | ValueKind::Scalar(d) | ValueKind::TypeDescriptor(d) => {
                Some(*d)
            }
            ValueKind::RawPointer => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::TensorHandle(d) => write!(f, "TensorHandle<{}>", d.name()),
            ValueKind::Scalar(d) => write!(f, "{}", d.builtin()),
            ValueKind::RawPointer => write!(f, "Builtin.RawPointer"),
            ValueKind::TypeDescriptor(d) => write!(f, "@thin {}.Type", d.name()),
        }
    }
}
