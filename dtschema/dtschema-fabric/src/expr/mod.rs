//! Size and condition expressions.
//!
//! Expressions are parsed once ([`parser::parse_expression`]) and linked by
//! the resolver, which replaces every [`Expr::Name`] with an [`Expr::Field`]
//! reference or a constant and every [`Expr::SizeOf`] with a literal. A linked
//! expression never contains `Name` or `SizeOf` nodes.

mod eval;
mod parser;

use std::fmt;

pub use eval::{Bindings, EvalError, Scalar};
pub use parser::parse_expression;

use crate::model::StructId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    BitNot,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i128),
    Bool(bool),
    /// Unlinked dotted name as written.
    Name(Vec<String>),
    /// Unlinked `SIZEOF(type)`.
    SizeOf(String),
    Field(FieldRef),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Self::Unary(op, Box::new(operand))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Rebuild the tree, replacing leaves with `f`.
    pub fn try_map_leaves<E>(
        self,
        f: &mut impl FnMut(Expr) -> Result<Expr, E>,
    ) -> Result<Expr, E> {
        match self {
            Expr::Unary(op, operand) => Ok(Expr::unary(op, operand.try_map_leaves(f)?)),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = lhs.try_map_leaves(f)?;
                let rhs = rhs.try_map_leaves(f)?;
                Ok(Expr::binary(op, lhs, rhs))
            }
            leaf => f(leaf),
        }
    }
}

/// A linked reference to a previously decoded field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRef {
    /// Earlier field of the structure being decoded, optionally followed by
    /// member names inside that field's record.
    Sibling {
        index: usize,
        path: Vec<String>,
        text: String,
    },
    /// Field of the innermost enclosing frame decoding `structure`.
    Enclosing {
        structure: StructId,
        index: usize,
        path: Vec<String>,
        text: String,
    },
    /// Bare name not declared in the current structure; resolved against the
    /// nearest enclosing frame that declares it.
    Nearest { name: String },
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Sibling { text, .. } | FieldRef::Enclosing { text, .. } => f.write_str(text),
            FieldRef::Nearest { name } => f.write_str(name),
        }
    }
}

/// A parsed expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    pub fn new(source: impl Into<String>, root: Expr) -> Self {
        Self {
            source: source.into(),
            root,
        }
    }

    /// Parse without linking.
    pub fn parse(source: &str) -> Result<Self, String> {
        Ok(Self::new(source, parse_expression(source)?))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    pub fn into_root(self) -> Expr {
        self.root
    }

    /// Evaluate where an integer is required (counts, sizes).
    pub fn evaluate_integer(&self, bindings: &dyn Bindings) -> Result<i128, EvalError> {
        match eval::evaluate(&self.root, bindings)? {
            Scalar::Int(v) => Ok(v),
            Scalar::Bool(_) => Err(EvalError::TypeMismatch(format!(
                "'{}' yields a boolean where an integer is required",
                self.source
            ))),
        }
    }

    /// Evaluate where a boolean is required (conditions).
    pub fn evaluate_condition(&self, bindings: &dyn Bindings) -> Result<bool, EvalError> {
        match eval::evaluate(&self.root, bindings)? {
            Scalar::Bool(v) => Ok(v),
            Scalar::Int(_) => Err(EvalError::TypeMismatch(format!(
                "'{}' yields an integer where a condition is required",
                self.source
            ))),
        }
    }

    pub fn evaluate(&self, bindings: &dyn Bindings) -> Result<Scalar, EvalError> {
        eval::evaluate(&self.root, bindings)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
