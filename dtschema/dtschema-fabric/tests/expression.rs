use std::collections::HashMap;

use dtschema_core::Value;
use dtschema_fabric::{
    StructId,
    expr::{BinaryOp, Bindings, EvalError, Expr, Expression, FieldRef, Scalar, parse_expression},
};

/// Binds bare names directly, without any structure frames.
#[derive(Default)]
struct Names(HashMap<String, Value>);

impl Names {
    fn with(mut self, name: &str, value: Value) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }
}

impl Bindings for Names {
    fn sibling(&self, _index: usize) -> Option<&Value> {
        None
    }

    fn enclosing(&self, _structure: StructId, _index: usize) -> Option<&Value> {
        None
    }

    fn nearest(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

/// Parse and link every name as a nearest-frame reference.
fn linked(source: &str) -> Expression {
    let root = parse_expression(source)
        .expect("parse")
        .try_map_leaves(&mut |leaf| {
            Ok::<_, ()>(match leaf {
                Expr::Name(parts) => Expr::Field(FieldRef::Nearest {
                    name: parts.join("."),
                }),
                other => other,
            })
        })
        .expect("link");
    Expression::new(source, root)
}

fn eval(source: &str, names: &Names) -> Result<Scalar, EvalError> {
    linked(source).evaluate(names)
}

#[test]
fn comparison_binds_looser_than_bitwise() {
    let parsed = parse_expression("flags & 0x0001 != 0").expect("parse");
    assert_eq!(
        parsed,
        Expr::binary(
            BinaryOp::Ne,
            Expr::binary(
                BinaryOp::BitAnd,
                Expr::Name(vec!["flags".to_string()]),
                Expr::Int(1)
            ),
            Expr::Int(0)
        )
    );

    let names = Names::default().with("flags", Value::U16(0x0003));
    assert_eq!(eval("flags & 0x0001 != 0", &names), Ok(Scalar::Bool(true)));
    assert_eq!(eval("flags & 0x0004 != 0", &names), Ok(Scalar::Bool(false)));
}

#[test]
fn arithmetic_precedence_and_literals() {
    let names = Names::default().with("size", Value::U32(20));
    assert_eq!(eval("size - 4 * 2", &names), Ok(Scalar::Int(12)));
    assert_eq!(eval("(size - 4) * 2", &names), Ok(Scalar::Int(32)));
    assert_eq!(eval("0x10 + 0X0f", &names), Ok(Scalar::Int(31)));
    assert_eq!(eval("1 << 4 | 1", &names), Ok(Scalar::Int(17)));
    assert_eq!(eval("~0 & 0xff", &names), Ok(Scalar::Int(0xff)));
    assert_eq!(eval("size % 7", &names), Ok(Scalar::Int(6)));
}

#[test]
fn division_truncates_toward_zero() {
    let names = Names::default();
    assert_eq!(eval("7 / 2", &names), Ok(Scalar::Int(3)));
    assert_eq!(eval("-7 / 2", &names), Ok(Scalar::Int(-3)));
}

#[test]
fn logical_operators_in_both_spellings() {
    let names = Names::default()
        .with("a", Value::U8(1))
        .with("b", Value::U8(0))
        .with("flag", Value::Bool(true));
    assert_eq!(eval("a == 1 and b == 0", &names), Ok(Scalar::Bool(true)));
    assert_eq!(eval("a == 1 && b == 1", &names), Ok(Scalar::Bool(false)));
    assert_eq!(eval("a == 2 || b == 0", &names), Ok(Scalar::Bool(true)));
    assert_eq!(eval("not flag", &names), Ok(Scalar::Bool(false)));
    assert_eq!(eval("!flag or a != 1", &names), Ok(Scalar::Bool(false)));
    assert_eq!(eval("flag == True", &names), Ok(Scalar::Bool(true)));
}

#[test]
fn short_circuit_skips_unbound_operand() {
    let names = Names::default().with("has_extra", Value::Bool(false));
    assert_eq!(
        eval("has_extra and extra > 0", &names),
        Ok(Scalar::Bool(false))
    );
    assert_eq!(
        eval("has_extra or extra > 0", &names),
        Err(EvalError::UnresolvedReference("extra".to_string()))
    );
}

#[test]
fn operands_are_never_coerced() {
    let names = Names::default()
        .with("count", Value::U8(2))
        .with("flag", Value::Bool(true));
    assert!(matches!(eval("count + flag", &names), Err(EvalError::TypeMismatch(_))));
    assert!(matches!(eval("count and flag", &names), Err(EvalError::TypeMismatch(_))));
    assert!(matches!(eval("count == flag", &names), Err(EvalError::TypeMismatch(_))));
    assert!(matches!(
        linked("count").evaluate_condition(&names),
        Err(EvalError::TypeMismatch(_))
    ));
    assert!(matches!(
        linked("count > 1").evaluate_integer(&names),
        Err(EvalError::TypeMismatch(_))
    ));
}

#[test]
fn non_numeric_field_is_type_mismatch() {
    let names = Names::default().with("name", Value::string("abc"));
    assert!(matches!(eval("name + 1", &names), Err(EvalError::TypeMismatch(_))));
}

#[test]
fn arithmetic_errors() {
    let names = Names::default().with("zero", Value::U8(0));
    assert!(matches!(eval("1 / zero", &names), Err(EvalError::Arithmetic(_))));
    assert!(matches!(eval("1 % zero", &names), Err(EvalError::Arithmetic(_))));
    assert!(matches!(eval("1 << 200", &names), Err(EvalError::Arithmetic(_))));
    assert!(matches!(eval("1 << -1", &names), Err(EvalError::Arithmetic(_))));
    assert!(matches!(
        eval("0x7fffffffffffffffffffffffffffffff + 1", &names),
        Err(EvalError::Arithmetic(_))
    ));
}

#[test]
fn unlinked_names_are_unresolved() {
    let expr = Expression::parse("size - 4").expect("parse");
    assert_eq!(
        expr.evaluate(&Names::default()),
        Err(EvalError::UnresolvedReference("size".to_string()))
    );
}

#[test]
fn malformed_expressions_are_rejected() {
    for source in ["size -", "(size", "a < b < c", "1 +* 2", "", "size.", "0x"] {
        assert!(parse_expression(source).is_err(), "{source:?} should not parse");
    }
}

#[test]
fn dotted_names_and_sizeof() {
    assert_eq!(
        parse_expression("header.size - SIZEOF(header)").expect("parse"),
        Expr::binary(
            BinaryOp::Sub,
            Expr::Name(vec!["header".to_string(), "size".to_string()]),
            Expr::SizeOf("header".to_string())
        )
    );
}
