//! Pure evaluation of linked expressions.

use dtschema_core::{DecodeError, Value};

use super::{BinaryOp, Expr, FieldRef, UnaryOp};
use crate::model::StructId;

/// Result of evaluating an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Int(i128),
    Bool(bool),
}

/// Source of field values visible to an expression.
pub trait Bindings {
    /// Value of field `index` of the innermost structure, if decoded.
    fn sibling(&self, index: usize) -> Option<&Value>;

    /// Value of field `index` of the innermost enclosing frame decoding
    /// `structure`.
    fn enclosing(&self, structure: StructId, index: usize) -> Option<&Value>;

    /// Value of the field called `name` in the nearest enclosing frame that
    /// declares it.
    fn nearest(&self, name: &str) -> Option<&Value>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("'{0}' is not bound")]
    UnresolvedReference(String),
    #[error("{0}")]
    TypeMismatch(String),
    #[error("{0}")]
    Arithmetic(String),
}

pub(super) fn evaluate(expr: &Expr, bindings: &dyn Bindings) -> Result<Scalar, EvalError> {
    match expr {
        Expr::Int(v) => Ok(Scalar::Int(*v)),
        Expr::Bool(v) => Ok(Scalar::Bool(*v)),
        Expr::Field(field) => lookup(field, bindings),
        Expr::Name(parts) => Err(EvalError::UnresolvedReference(parts.join("."))),
        Expr::SizeOf(name) => Err(EvalError::UnresolvedReference(format!("SIZEOF({name})"))),
        Expr::Unary(op, operand) => unary(*op, evaluate(operand, bindings)?),
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            // Short-circuit so `has_x and x > 0` works when `x` was skipped.
            if !as_bool(evaluate(lhs, bindings)?, "and")? {
                return Ok(Scalar::Bool(false));
            }
            Ok(Scalar::Bool(as_bool(evaluate(rhs, bindings)?, "and")?))
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            if as_bool(evaluate(lhs, bindings)?, "or")? {
                return Ok(Scalar::Bool(true));
            }
            Ok(Scalar::Bool(as_bool(evaluate(rhs, bindings)?, "or")?))
        }
        Expr::Binary(op, lhs, rhs) => {
            binary(*op, evaluate(lhs, bindings)?, evaluate(rhs, bindings)?)
        }
    }
}

fn lookup(field: &FieldRef, bindings: &dyn Bindings) -> Result<Scalar, EvalError> {
    let (value, path) = match field {
        FieldRef::Sibling { index, path, .. } => (bindings.sibling(*index), path.as_slice()),
        FieldRef::Enclosing {
            structure,
            index,
            path,
            ..
        } => (bindings.enclosing(*structure, *index), path.as_slice()),
        FieldRef::Nearest { name } => (bindings.nearest(name), &[][..]),
    };
    let mut value = value.ok_or_else(|| EvalError::UnresolvedReference(field.to_string()))?;
    for member in path {
        value = match value {
            Value::Struct(record) => record
                .get(member)
                .ok_or_else(|| EvalError::UnresolvedReference(field.to_string()))?,
            other => {
                return Err(EvalError::TypeMismatch(format!(
                    "'{field}' navigates into a {} value",
                    other.variant_name()
                )));
            }
        };
    }
    scalar_of(value).ok_or_else(|| {
        EvalError::TypeMismatch(format!(
            "'{field}' is a {} value, not a number or boolean",
            value.variant_name()
        ))
    })
}

fn scalar_of(value: &Value) -> Option<Scalar> {
    match value {
        Value::Bool(v) => Some(Scalar::Bool(*v)),
        Value::Char(c) => Some(Scalar::Int(i128::from(u32::from(*c)))),
        other => other.as_integer().map(Scalar::Int),
    }
}

fn as_bool(value: Scalar, op: &str) -> Result<bool, EvalError> {
    match value {
        Scalar::Bool(v) => Ok(v),
        Scalar::Int(_) => Err(EvalError::TypeMismatch(format!(
            "operator '{op}' requires boolean operands"
        ))),
    }
}

fn as_int(value: Scalar, op: &str) -> Result<i128, EvalError> {
    match value {
        Scalar::Int(v) => Ok(v),
        Scalar::Bool(_) => Err(EvalError::TypeMismatch(format!(
            "operator '{op}' requires integer operands"
        ))),
    }
}

fn unary(op: UnaryOp, operand: Scalar) -> Result<Scalar, EvalError> {
    match op {
        UnaryOp::Not => Ok(Scalar::Bool(!as_bool(operand, "not")?)),
        UnaryOp::Neg => as_int(operand, "-")?
            .checked_neg()
            .map(Scalar::Int)
            .ok_or_else(|| EvalError::Arithmetic("negation overflow".to_string())),
        UnaryOp::BitNot => Ok(Scalar::Int(!as_int(operand, "~")?)),
    }
}

fn binary(op: BinaryOp, lhs: Scalar, rhs: Scalar) -> Result<Scalar, EvalError> {
    let symbol = op_symbol(op);
    match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (lhs, rhs) {
                (Scalar::Int(a), Scalar::Int(b)) => a == b,
                (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
                _ => {
                    return Err(EvalError::TypeMismatch(format!(
                        "operator '{symbol}' compares an integer with a boolean"
                    )));
                }
            };
            Ok(Scalar::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let a = as_int(lhs, symbol)?;
            let b = as_int(rhs, symbol)?;
            Ok(Scalar::Bool(match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            }))
        }
        BinaryOp::And | BinaryOp::Or => {
            let a = as_bool(lhs, symbol)?;
            let b = as_bool(rhs, symbol)?;
            Ok(Scalar::Bool(if op == BinaryOp::And { a && b } else { a || b }))
        }
        _ => {
            let a = as_int(lhs, symbol)?;
            let b = as_int(rhs, symbol)?;
            arithmetic(op, a, b).map(Scalar::Int)
        }
    }
}

fn arithmetic(op: BinaryOp, a: i128, b: i128) -> Result<i128, EvalError> {
    let overflow = || EvalError::Arithmetic(format!("overflow in {a} {} {b}", op_symbol(op)));
    match op {
        BinaryOp::Add => a.checked_add(b).ok_or_else(overflow),
        BinaryOp::Sub => a.checked_sub(b).ok_or_else(overflow),
        BinaryOp::Mul => a.checked_mul(b).ok_or_else(overflow),
        BinaryOp::Div | BinaryOp::Rem if b == 0 => {
            Err(EvalError::Arithmetic("division by zero".to_string()))
        }
        BinaryOp::Div => a.checked_div(b).ok_or_else(overflow),
        BinaryOp::Rem => a.checked_rem(b).ok_or_else(overflow),
        BinaryOp::BitAnd => Ok(a & b),
        BinaryOp::BitOr => Ok(a | b),
        BinaryOp::BitXor => Ok(a ^ b),
        BinaryOp::Shl | BinaryOp::Shr => {
            let amount = u32::try_from(b)
                .ok()
                .filter(|n| *n < 128)
                .ok_or_else(|| EvalError::Arithmetic(format!("shift amount {b} out of range")))?;
            if op == BinaryOp::Shl {
                a.checked_shl(amount).ok_or_else(overflow)
            } else {
                Ok(a >> amount)
            }
        }
        _ => unreachable!("{op:?} is not an arithmetic operator"),
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
    }
}

impl EvalError {
    /// Attach the position of the field being decoded.
    pub fn at(self, path: &str, offset: usize) -> DecodeError {
        let path = path.to_string();
        match self {
            EvalError::UnresolvedReference(reference) => DecodeError::UnresolvedReference {
                path,
                offset,
                reference,
            },
            EvalError::TypeMismatch(detail) => DecodeError::TypeMismatch {
                path,
                offset,
                detail,
            },
            EvalError::Arithmetic(detail) => DecodeError::Arithmetic {
                path,
                offset,
                detail,
            },
        }
    }
}
