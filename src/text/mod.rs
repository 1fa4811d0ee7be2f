// Text Module: s-expression graph declarations

pub mod parser;

pub use parser::{parse_graph, parse_program};
