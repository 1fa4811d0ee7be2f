// Op Registry
//
// Static table from declared op names to op kinds

use crate::ir::node::{ArithOp, OpKind, ReduceOp, Site};
use std::collections::HashMap;

lazy_static! {
    static ref OP_TABLE: HashMap<&'static str, OpKind> = {
        let mut m = HashMap::new();
        m.insert("Argument", OpKind::Argument);
        m.insert("Const", OpKind::Constant);

        for op in [
            ArithOp::Add,
            ArithOp::Sub,
            ArithOp::Mul,
            ArithOp::RealDiv,
            ArithOp::Maximum,
            ArithOp::Minimum,
            ArithOp::MatMul,
            ArithOp::Less,
            ArithOp::Greater,
            ArithOp::Equal,
            ArithOp::Neg,
            ArithOp::Sigmoid,
            ArithOp::Square,
        ] {
            m.insert(op.name(), OpKind::Arithmetic(op));
        }
        m.insert("Div", OpKind::Arithmetic(ArithOp::RealDiv));

        m.insert("Select", OpKind::Select);
        for op in [ReduceOp::Sum, ReduceOp::Mean, ReduceOp::Max, ReduceOp::Min] {
            m.insert(op.name(), OpKind::Reduction(op));
        }
        m.insert("Conv2D", OpKind::Convolution);
        m.insert("LoopCond", OpKind::Branch);
        m.insert("Switch", OpKind::Switch);
        m.insert("Identity", OpKind::Identity);
        m.insert("Merge", OpKind::Merge);
        m.insert("TensorToScalar", OpKind::TensorToScalar);
        m.insert("ScalarToTensor", OpKind::ScalarToTensor);

        let to_device = OpKind::Transfer { to: Site::Device, synthetic: false };
        let to_host = OpKind::Transfer { to: Site::Host, synthetic: false };
        m.insert("toDevice", to_device);
        m.insert("ToDevice", to_device);
        m.insert("toHost", to_host);
        m.insert("ToHost", to_host);
        m
    };
}

/// Resolve a declared op name
pub fn lookup_op(name: &str) -> Option<OpKind> {
    OP_TABLE.get(name).copied()
}

/// All registered op names, sorted
pub fn op_names() -> Vec<&'static str> {
    let mut names: Vec<_> = OP_TABLE.keys().copied().collect();
    names.sort_unstable();
    names
}
