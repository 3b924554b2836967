//! Resolved formula tree and its evaluation
//!
//! Values follow JavaScript number semantics: everything is an `f64`,
//! bitwise operators go through ToInt32 (ToUint32 for `>>>`), comparisons
//! yield 1 or 0, and `&&`/`||` return one of their operands.
//!
//! One departure: a final value of NaN or ±Infinity is not sent through
//! ToInt32, which would give amplitude 0. [`evaluate`] reports it as
//! [`EvalError::NonFinite`] and the sample plays as silence (128), so a
//! bare `t/0` is silent rather than 0. Intermediate NaN and Infinity values
//! still follow ToInt32, so `(t/0) & 255` evaluates to 0.

use super::parser::{BinOp, Expr, UnOp};
use crate::error::{CompileError, EvalError};

/// Most nodes a compiled formula may contain.
pub const MAX_NODES: usize = 4096;
/// Deepest tree a compiled formula may have.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func1 {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sqrt,
    Abs,
    Floor,
    Ceil,
    Round,
    Trunc,
    Log,
    Exp,
    Sign,
    Int,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func2 {
    Pow,
    Atan2,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Const(f64),
    Time,
    Unary(UnOp, Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Conditional(Box<Node>, Box<Node>, Box<Node>),
    Call1(Func1, Box<Node>),
    Call2(Func2, Box<Node>, Box<Node>),
}

/// Resolve names, check arity and enforce the complexity budget.
pub fn resolve(expr: &Expr) -> Result<(Node, usize), CompileError> {
    let mut nodes = 0;
    let node = resolve_at(expr, 1, &mut nodes)?;
    Ok((node, nodes))
}

fn resolve_at(expr: &Expr, depth: usize, nodes: &mut usize) -> Result<Node, CompileError> {
    if depth > MAX_DEPTH {
        return Err(CompileError::TooComplex(format!(
            "expression nested deeper than {MAX_DEPTH}"
        )));
    }
    *nodes += 1;
    if *nodes > MAX_NODES {
        return Err(CompileError::TooComplex(format!(
            "more than {MAX_NODES} terms"
        )));
    }

    let child = |e: &Expr, nodes: &mut usize| resolve_at(e, depth + 1, nodes).map(Box::new);

    Ok(match expr {
        Expr::Number(v) => Node::Const(*v),
        Expr::Ident(name) => resolve_ident(name)?,
        Expr::Unary { op, expr } => Node::Unary(*op, child(expr, nodes)?),
        Expr::Binary { op, left, right } => {
            Node::Binary(*op, child(left, nodes)?, child(right, nodes)?)
        }
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => Node::Conditional(
            child(cond, nodes)?,
            child(then, nodes)?,
            child(otherwise, nodes)?,
        ),
        Expr::Call { name, args } => {
            let bare = name.strip_prefix("Math.").unwrap_or(name);
            if let Some(func) = func1(bare) {
                check_arity(name, 1, args.len())?;
                Node::Call1(func, child(&args[0], nodes)?)
            } else if let Some(func) = func2(bare) {
                check_arity(name, 2, args.len())?;
                Node::Call2(func, child(&args[0], nodes)?, child(&args[1], nodes)?)
            } else {
                return Err(CompileError::UnknownFunction(name.clone()));
            }
        }
    })
}

fn resolve_ident(name: &str) -> Result<Node, CompileError> {
    match name {
        "t" => Ok(Node::Time),
        "PI" | "Math.PI" => Ok(Node::Const(std::f64::consts::PI)),
        "E" | "Math.E" => Ok(Node::Const(std::f64::consts::E)),
        _ => Err(CompileError::UnknownIdentifier(name.to_string())),
    }
}

fn check_arity(name: &str, expected: usize, found: usize) -> Result<(), CompileError> {
    if expected == found {
        Ok(())
    } else {
        Err(CompileError::Arity {
            name: name.to_string(),
            expected,
            found,
        })
    }
}

fn func1(name: &str) -> Option<Func1> {
    Some(match name {
        "sin" => Func1::Sin,
        "cos" => Func1::Cos,
        "tan" => Func1::Tan,
        "asin" => Func1::Asin,
        "acos" => Func1::Acos,
        "atan" => Func1::Atan,
        "sqrt" => Func1::Sqrt,
        "abs" => Func1::Abs,
        "floor" => Func1::Floor,
        "ceil" => Func1::Ceil,
        "round" => Func1::Round,
        "trunc" => Func1::Trunc,
        "log" => Func1::Log,
        "exp" => Func1::Exp,
        "sign" => Func1::Sign,
        "int" => Func1::Int,
        _ => return None,
    })
}

fn func2(name: &str) -> Option<Func2> {
    Some(match name {
        "pow" => Func2::Pow,
        "atan2" => Func2::Atan2,
        "min" => Func2::Min,
        "max" => Func2::Max,
        _ => return None,
    })
}

// ============================================================================
// Evaluation
// ============================================================================

/// Evaluate at time `t`, reducing the result with ToInt32.
pub fn evaluate(root: &Node, t: f64) -> Result<i64, EvalError> {
    let value = eval(root, t);
    if value.is_finite() {
        Ok(to_int32(value) as i64)
    } else {
        Err(EvalError::NonFinite { value })
    }
}

fn eval(node: &Node, t: f64) -> f64 {
    match node {
        Node::Const(v) => *v,
        Node::Time => t,
        Node::Unary(op, inner) => {
            let v = eval(inner, t);
            match op {
                UnOp::Neg => -v,
                UnOp::Plus => v,
                UnOp::BitNot => !to_int32(v) as f64,
                UnOp::Not => bool_value(!truthy(v)),
            }
        }
        Node::Binary(BinOp::And, left, right) => {
            let l = eval(left, t);
            if truthy(l) {
                eval(right, t)
            } else {
                l
            }
        }
        Node::Binary(BinOp::Or, left, right) => {
            let l = eval(left, t);
            if truthy(l) {
                l
            } else {
                eval(right, t)
            }
        }
        Node::Binary(op, left, right) => binary(*op, eval(left, t), eval(right, t)),
        Node::Conditional(cond, then, otherwise) => {
            if truthy(eval(cond, t)) {
                eval(then, t)
            } else {
                eval(otherwise, t)
            }
        }
        Node::Call1(func, arg) => call1(*func, eval(arg, t)),
        Node::Call2(func, a, b) => call2(*func, eval(a, t), eval(b, t)),
    }
}

fn binary(op: BinOp, l: f64, r: f64) -> f64 {
    match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => l / r,
        BinOp::Rem => l % r,
        BinOp::Pow => l.powf(r),
        BinOp::BitAnd => (to_int32(l) & to_int32(r)) as f64,
        BinOp::BitOr => (to_int32(l) | to_int32(r)) as f64,
        BinOp::BitXor => (to_int32(l) ^ to_int32(r)) as f64,
        BinOp::Shl => to_int32(l).wrapping_shl(to_uint32(r) & 31) as f64,
        BinOp::Shr => to_int32(l).wrapping_shr(to_uint32(r) & 31) as f64,
        BinOp::UShr => (to_uint32(l) >> (to_uint32(r) & 31)) as f64,
        BinOp::Eq => bool_value(l == r),
        BinOp::Ne => bool_value(l != r),
        BinOp::Lt => bool_value(l < r),
        BinOp::Le => bool_value(l <= r),
        BinOp::Gt => bool_value(l > r),
        BinOp::Ge => bool_value(l >= r),
        // short-circuited in eval
        BinOp::And | BinOp::Or => f64::NAN,
    }
}

fn call1(func: Func1, x: f64) -> f64 {
    match func {
        Func1::Sin => x.sin(),
        Func1::Cos => x.cos(),
        Func1::Tan => x.tan(),
        Func1::Asin => x.asin(),
        Func1::Acos => x.acos(),
        Func1::Atan => x.atan(),
        Func1::Sqrt => x.sqrt(),
        Func1::Abs => x.abs(),
        Func1::Floor | Func1::Int => x.floor(),
        Func1::Ceil => x.ceil(),
        // JS rounds halves towards +Infinity
        Func1::Round => (x + 0.5).floor(),
        Func1::Trunc => x.trunc(),
        Func1::Log => x.ln(),
        Func1::Exp => x.exp(),
        Func1::Sign => {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                x
            }
        }
    }
}

fn call2(func: Func2, a: f64, b: f64) -> f64 {
    match func {
        Func2::Pow => a.powf(b),
        Func2::Atan2 => a.atan2(b),
        Func2::Min if a.is_nan() || b.is_nan() => f64::NAN,
        Func2::Max if a.is_nan() || b.is_nan() => f64::NAN,
        Func2::Min => a.min(b),
        Func2::Max => a.max(b),
    }
}

#[inline]
fn truthy(v: f64) -> bool {
    v != 0.0 && !v.is_nan()
}

#[inline]
fn bool_value(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// ECMAScript ToInt32
#[inline]
pub fn to_int32(v: f64) -> i32 {
    to_uint32(v) as i32
}

/// ECMAScript ToUint32
#[inline]
pub fn to_uint32(v: f64) -> u32 {
    if !v.is_finite() {
        return 0;
    }
    v.trunc().rem_euclid(4_294_967_296.0) as u32
}
