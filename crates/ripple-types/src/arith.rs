//! Arithmetic and comparison tests attached to conditions.
//!
//! Operands are numbers, symbolic constants or variables. Variables resolve
//! to field values at evaluation time through a caller-supplied lookup, so
//! the same test can run against a single fact (alpha network) or against a
//! token plus a fact (join node).

use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl ArithOp {
    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            ArithOp::Add => lhs + rhs,
            ArithOp::Sub => lhs - rhs,
            ArithOp::Mul => lhs * rhs,
            ArithOp::Div => lhs / rhs,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompOp {
    fn symbol(self) -> &'static str {
        match self {
            CompOp::Eq => "=",
            CompOp::Ne => "<>",
            CompOp::Lt => "<",
            CompOp::Le => "<=",
            CompOp::Gt => ">",
            CompOp::Ge => ">=",
        }
    }
}

/// An arithmetic expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArithExpr {
    /// Numeric literal.
    Number(f64),
    /// Symbolic constant, compared by text.
    Symbol(String),
    /// Variable bound by a condition field.
    Var(String),
    /// Binary arithmetic.
    Binary {
        /// Operator.
        op: ArithOp,
        /// Left operand.
        lhs: Box<ArithExpr>,
        /// Right operand.
        rhs: Box<ArithExpr>,
    },
}

impl ArithExpr {
    /// Variable reference.
    pub fn var(name: impl Into<String>) -> Self {
        ArithExpr::Var(name.into())
    }

    /// Symbolic constant.
    pub fn symbol(text: impl Into<String>) -> Self {
        ArithExpr::Symbol(text.into())
    }

    /// Binary expression.
    pub fn binary(op: ArithOp, lhs: ArithExpr, rhs: ArithExpr) -> Self {
        ArithExpr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            ArithExpr::Var(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            ArithExpr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            ArithExpr::Number(_) | ArithExpr::Symbol(_) => {}
        }
    }

    fn rename_vars(&self, rename: &dyn Fn(&str) -> String) -> ArithExpr {
        match self {
            ArithExpr::Var(name) => ArithExpr::Var(rename(name)),
            ArithExpr::Binary { op, lhs, rhs } => {
                ArithExpr::binary(*op, lhs.rename_vars(rename), rhs.rename_vars(rename))
            }
            other => other.clone(),
        }
    }

    fn evaluate<F>(&self, lookup: &F) -> Result<Option<Operand>, ArithError>
    where
        F: Fn(&str) -> Option<FieldValue>,
    {
        Ok(match self {
            ArithExpr::Number(n) => Some(Operand::Number(*n)),
            ArithExpr::Symbol(s) => Some(Operand::Symbol(s.clone())),
            ArithExpr::Var(name) => {
                let value = lookup(name)
                    .ok_or_else(|| ArithError::UnboundVariable { variable: name.clone() })?;
                Some(match value.as_number() {
                    Some(n) => Operand::Number(n),
                    None => Operand::Symbol(value.to_string()),
                })
            }
            ArithExpr::Binary { op, lhs, rhs } => {
                match (lhs.evaluate(lookup)?, rhs.evaluate(lookup)?) {
                    (Some(Operand::Number(l)), Some(Operand::Number(r))) => {
                        Some(Operand::Number(op.apply(l, r)))
                    }
                    _ => None,
                }
            }
        })
    }
}

impl fmt::Display for ArithExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithExpr::Number(n) => write!(f, "{n}"),
            ArithExpr::Symbol(s) => write!(f, "{s}"),
            ArithExpr::Var(name) => write!(f, "<{name}>"),
            ArithExpr::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
        }
    }
}

/// Evaluated operand.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Number(f64),
    Symbol(String),
}

/// Failure while evaluating an arithmetic test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArithError {
    /// The lookup had no value for a variable.
    UnboundVariable {
        /// Name of the variable.
        variable: String,
    },
}

impl fmt::Display for ArithError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithError::UnboundVariable { variable } => write!(f, "unbound variable <{variable}>"),
        }
    }
}

impl std::error::Error for ArithError {}

/// `lhs op rhs` comparison.
///
/// Numbers compare numerically. `=` and `<>` also accept symbols and
/// compare their text; ordering comparisons on a symbol never hold, and
/// neither does arithmetic on one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArithTest {
    /// Left side.
    pub lhs: ArithExpr,
    /// Comparison.
    pub op: CompOp,
    /// Right side.
    pub rhs: ArithExpr,
}

impl ArithTest {
    /// Creates a comparison.
    pub fn new(lhs: ArithExpr, op: CompOp, rhs: ArithExpr) -> Self {
        Self { lhs, op, rhs }
    }

    /// Variables referenced by either side, in first-seen order.
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.lhs.collect_variables(&mut out);
        self.rhs.collect_variables(&mut out);
        out
    }

    /// Copy with every variable renamed.
    pub fn rename_vars(&self, rename: &dyn Fn(&str) -> String) -> ArithTest {
        ArithTest {
            lhs: self.lhs.rename_vars(rename),
            op: self.op,
            rhs: self.rhs.rename_vars(rename),
        }
    }

    /// Evaluates the comparison, resolving variables through `lookup`.
    pub fn evaluate<F>(&self, lookup: F) -> Result<bool, ArithError>
    where
        F: Fn(&str) -> Option<FieldValue>,
    {
        let lhs = self.lhs.evaluate(&lookup)?;
        let rhs = self.rhs.evaluate(&lookup)?;
        let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
            return Ok(false);
        };
        Ok(match (lhs, rhs) {
            (Operand::Number(l), Operand::Number(r)) => match self.op {
                CompOp::Eq => l == r,
                CompOp::Ne => l != r,
                CompOp::Lt => l < r,
                CompOp::Le => l <= r,
                CompOp::Gt => l > r,
                CompOp::Ge => l >= r,
            },
            (l, r) => {
                let same = render(&l) == render(&r);
                match self.op {
                    CompOp::Eq => same,
                    CompOp::Ne => !same,
                    _ => false,
                }
            }
        })
    }
}

fn render(operand: &Operand) -> String {
    match operand {
        Operand::Number(n) => n.to_string(),
        Operand::Symbol(s) => s.clone(),
    }
}

impl fmt::Display for ArithTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op.symbol(), self.rhs)
    }
}
