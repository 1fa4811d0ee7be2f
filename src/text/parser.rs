// S-expression reader for graph declarations
//
//   (graph testSelect
//     (x1 Argument (dtype Float))
//     (x toDevice x1)
//     (s Switch x c)
//     (y Identity (out s 1))
//     (m Merge init (back next))
//     (k Const (value (tensor Double (1.0 2.0) (2))) (device device))
//     (e Const (value (tensor Int32 () (Int32 0 20 30)))))
//
// Bare symbols after the op name are inputs. Two-element lists are
// attributes unless their head is one of the reserved words `out`, `back`
// or `device`.

use crate::core::error::{PartitionError, Result};
use crate::ir::{AttrValue, DType, GraphDecl, InputRef, Literal, OpDecl, Site};
use lexpr::Value;

/// Helper: Convert a cons list to a vector of values
fn cons_to_vec(cons: &lexpr::Cons) -> Vec<Value> {
    let mut result = Vec::new();
    let mut current = cons;

    loop {
        result.push(current.car().clone());

        match current.cdr() {
            Value::Cons(next_cons) => current = next_cons,
            _ => break,
        }
    }

    result
}

fn list(value: &Value, context: &str) -> Result<Vec<Value>> {
    match value {
        Value::Cons(cons) => Ok(cons_to_vec(cons)),
        Value::Nil | Value::Null => Ok(Vec::new()),
        _ => Err(PartitionError::Parse(format!(
            "{}: expected a list, found {}",
            context, value
        ))),
    }
}

fn symbol<'a>(value: &'a Value, context: &str) -> Result<&'a str> {
    value.as_symbol().ok_or_else(|| {
        PartitionError::Parse(format!("{}: expected a symbol, found {}", context, value))
    })
}

/// Parse every `(graph ...)` form in `source`
pub fn parse_program(source: &str) -> Result<Vec<GraphDecl>> {
    let mut graphs = Vec::new();
    let mut parser = lexpr::Parser::from_str(source);

    while let Some(value) = parser
        .next_value()
        .map_err(|e| PartitionError::Parse(e.to_string()))?
    {
        log::trace!("Parsing S-expression: {}", value);
        graphs.push(parse_graph(&value)?);
    }

    log::debug!("Parsed {} graph declaration(s)", graphs.len());
    Ok(graphs)
}

/// Parse a single `(graph NAME OP...)` form
pub fn parse_graph(value: &Value) -> Result<GraphDecl> {
    let items = list(value, "graph")?;
    match items.first().and_then(|v| v.as_symbol()) {
        Some("graph") => {}
        _ => {
            return Err(PartitionError::Parse(format!(
                "expected (graph NAME ...), found {}",
                value
            )))
        }
    }
    let name = items
        .get(1)
        .ok_or_else(|| PartitionError::Parse("graph without a name".to_string()))
        .and_then(|v| symbol(v, "graph name"))?;

    let mut decl = GraphDecl::new(name);
    for item in &items[2..] {
        decl.ops.push(parse_op(name, item)?);
    }
    Ok(decl)
}

fn parse_op(graph: &str, value: &Value) -> Result<OpDecl> {
    let context = format!("graph '{}'", graph);
    let items = list(value, &context)?;
    if items.len() < 2 {
        return Err(PartitionError::Parse(format!(
            "{}: expected (NAME OP ...), found {}",
            context, value
        )));
    }
    let name = symbol(&items[0], &context)?;
    let context = format!("op '{}'", name);
    let mut decl = OpDecl::new(name, symbol(&items[1], &context)?);

    for item in &items[2..] {
        match item {
            Value::Symbol(input) => decl.inputs.push(InputRef::new(input.as_ref())),
            Value::Cons(cons) => {
                let parts = cons_to_vec(cons);
                let head = symbol(&parts[0], &context)?;
                match (head, parts.len()) {
                    ("out", 3) => {
                        let source = symbol(&parts[1], &context)?;
                        let index = parts[2]
                            .as_u64()
                            .ok_or_else(|| {
                                PartitionError::Parse(format!(
                                    "{}: output index must be a non-negative integer",
                                    context
                                ))
                            })?;
                        decl.inputs.push(InputRef::output(source, index as usize));
                    }
                    ("back", 2) => {
                        decl.inputs
                            .push(InputRef::backedge(symbol(&parts[1], &context)?));
                    }
                    ("device", 2) => {
                        decl.hint = Some(match symbol(&parts[1], &context)? {
                            "host" => Site::Host,
                            "device" => Site::Device,
                            other => {
                                return Err(PartitionError::Parse(format!(
                                    "{}: unknown device '{}'",
                                    context, other
                                )))
                            }
                        });
                    }
                    (attr, 2) => {
                        let value = parse_value(&parts[1], &format!("{} attribute '{}'", context, attr))?;
                        decl = decl.attr(attr, value);
                    }
                    _ => {
                        return Err(PartitionError::Parse(format!(
                            "{}: malformed item {}",
                            context, item
                        )))
                    }
                }
            }
            other => {
                return Err(PartitionError::Parse(format!(
                    "{}: unexpected {}",
                    context, other
                )))
            }
        }
    }
    Ok(decl)
}

/// Parse a number literal
fn parse_number(n: &lexpr::Number) -> Option<Literal> {
    if let Some(i) = n.as_i64() {
        // Check if it fits in i32
        if i >= i32::MIN as i64 && i <= i32::MAX as i64 {
            Some(Literal::Int32(i as i32))
        } else {
            Some(Literal::Int64(i))
        }
    } else {
        n.as_f64().map(Literal::Double)
    }
}

fn parse_literal(value: &Value, elem: Option<DType>, context: &str) -> Result<Literal> {
    let lit = match value {
        Value::Number(n) => parse_number(n),
        Value::Bool(b) => Some(Literal::Bool(*b)),
        Value::Symbol(s) => match s.as_ref() {
            "true" => Some(Literal::Bool(true)),
            "false" => Some(Literal::Bool(false)),
            _ => None,
        },
        _ => None,
    }
    .ok_or_else(|| PartitionError::Parse(format!("{}: expected a literal, found {}", context, value)))?;

    match elem {
        Some(d) => lit.cast(d).ok_or_else(|| {
            PartitionError::Parse(format!("{}: {} is not a valid {}", context, lit, d))
        }),
        None => Ok(lit),
    }
}

/// Optional leading dtype symbol of an `(array ...)` / `(tensor ...)` body
fn leading_dtype(items: &[Value]) -> (Option<DType>, &[Value]) {
    match items.first().and_then(|v| v.as_symbol()).and_then(DType::from_name) {
        Some(d) => (Some(d), &items[1..]),
        None => (None, items),
    }
}

fn parse_elements(items: &[Value], elem: Option<DType>, context: &str) -> Result<(DType, Vec<Literal>)> {
    let mut elems = Vec::with_capacity(items.len());
    for item in items {
        elems.push(parse_literal(item, elem, context)?);
    }
    let dtype = match (elem, elems.first()) {
        (Some(d), _) => d,
        (None, Some(first)) => first.dtype(),
        (None, None) => {
            return Err(PartitionError::Parse(format!(
                "{}: empty literal needs an element type",
                context
            )))
        }
    };
    Ok((dtype, elems))
}

fn parse_value(value: &Value, context: &str) -> Result<AttrValue> {
    match value {
        Value::String(s) => Ok(AttrValue::Str(s.to_string())),
        Value::Symbol(s) => Ok(match s.as_ref() {
            "true" => AttrValue::Scalar(Literal::Bool(true)),
            "false" => AttrValue::Scalar(Literal::Bool(false)),
            name => match DType::from_name(name) {
                Some(d) => AttrValue::Type(d),
                None => AttrValue::Str(name.to_string()),
            },
        }),
        Value::Cons(cons) => {
            let items = cons_to_vec(cons);
            let head = symbol(&items[0], context)?;
            let rest = &items[1..];
            match head {
                "array" => {
                    let (elem, body) = leading_dtype(rest);
                    let (elem, elems) = parse_elements(body, elem, context)?;
                    Ok(AttrValue::Array { elem, elems })
                }
                "tensor" => {
                    let (elem, body) = leading_dtype(rest);
                    let [scalars, dims] = body else {
                        return Err(PartitionError::Parse(format!(
                            "{}: expected (tensor [DTYPE] (ELEMENTS...) (DIMS...))",
                            context
                        )));
                    };
                    let (elem, elems) = parse_elements(&list(scalars, context)?, elem, context)?;
                    let dims = list(dims, context)?;
                    let (shape_elem, dims) = leading_dtype(&dims);
                    let mut shape = Vec::with_capacity(dims.len());
                    for dim in dims {
                        shape.push(dim.as_i64().ok_or_else(|| {
                            PartitionError::Parse(format!("{}: dimension {} is not an integer", context, dim))
                        })?);
                    }
                    Ok(AttrValue::Tensor {
                        elem,
                        elems,
                        shape_elem: shape_elem.unwrap_or(DType::Int64),
                        shape,
                    })
                }
                dtype => match (DType::from_name(dtype), rest) {
                    (Some(d), [literal]) => Ok(AttrValue::Scalar(parse_literal(literal, Some(d), context)?)),
                    _ => Err(PartitionError::Parse(format!(
                        "{}: unknown literal form {}",
                        context, value
                    ))),
                },
            }
        }
        other => Ok(AttrValue::Scalar(parse_literal(other, None, context)?)),
    }
}
