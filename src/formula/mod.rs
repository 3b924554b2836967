//! Formula compilation
//!
//! The scheduler only sees the [`ProgramCompiler`] and [`Program`] traits.
//! [`BytebeatCompiler`] is the built-in implementation: a single
//! JavaScript-flavoured integer expression over the time index `t`.
//!
//! Every compiled [`Formula`] is bounded at compile time (see
//! [`program::MAX_NODES`] and [`program::MAX_DEPTH`]) and contains no loops,
//! so one `evaluate` call is a bounded tree walk.

pub mod parser;
pub mod program;

use crate::error::{CompileError, EvalError};
use program::Node;

/// An immutable compiled formula.
pub trait Program: Send + Sync + 'static {
    /// Amplitude at logical time `t`. The caller reduces it to 8 bits.
    fn evaluate(&self, t: u64) -> Result<i64, EvalError>;
}

/// Turns formula source text into a [`Program`]. Stateless between calls.
pub trait ProgramCompiler: Send + Sync + 'static {
    type Program: Program;

    fn compile(&self, source: &str) -> Result<Self::Program, CompileError>;
}

/// Built-in bytebeat expression compiler
#[derive(Debug, Clone, Copy, Default)]
pub struct BytebeatCompiler;

impl ProgramCompiler for BytebeatCompiler {
    type Program = Formula;

    fn compile(&self, source: &str) -> Result<Formula, CompileError> {
        let expr = parser::parse_formula(source)?;
        let (root, nodes) = program::resolve(&expr)?;
        Ok(Formula { root, nodes })
    }
}

/// A compiled bytebeat expression
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    root: Node,
    nodes: usize,
}

impl Formula {
    /// Number of terms in the compiled tree
    pub fn node_count(&self) -> usize {
        self.nodes
    }
}

impl Program for Formula {
    #[inline]
    fn evaluate(&self, t: u64) -> Result<i64, EvalError> {
        program::evaluate(&self.root, t as f64)
    }
}
