//! Expression parser built from nom combinators.
//!
//! Precedence, loosest first: `or`/`||`, `and`/`&&`, `not`/`!`, comparisons
//! (non-associative), `|`, `^`, `&`, shifts, `+ -`, `* / %`, unary `- ~`.
//! Comparisons bind looser than the bitwise operators, so
//! `flags & 0x0001 != 0` reads as `(flags & 0x0001) != 0`.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{alpha1, alphanumeric1, char, digit1, hex_digit1, multispace0, satisfy},
    combinator::{all_consuming, map, map_res, not, recognize, value},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
};

use super::{BinaryOp, Expr, UnaryOp};

type OperandParser = fn(&str) -> IResult<&str, Expr>;
type OperatorParser = fn(&str) -> IResult<&str, BinaryOp>;

/// Parse a complete expression. The whole input must be consumed.
pub fn parse_expression(input: &str) -> Result<Expr, String> {
    match all_consuming(ws(expr))(input) {
        Ok((_, e)) => Ok(e),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            if e.input.is_empty() {
                Err("unexpected end of expression".to_string())
            } else {
                Err(format!("unexpected input at '{}'", e.input))
            }
        }
        Err(nom::Err::Incomplete(_)) => Err("incomplete expression".to_string()),
    }
}

fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, inner, multispace0)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A word that is not the prefix of a longer identifier.
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(kw), not(satisfy(is_ident_char)))
}

fn left_assoc(input: &str, operand: OperandParser, operator: OperatorParser) -> IResult<&str, Expr> {
    let (mut input, mut lhs) = operand(input)?;
    loop {
        match ws(operator)(input) {
            Ok((rest, op)) => {
                let (rest, rhs) = operand(rest)?;
                lhs = Expr::binary(op, lhs, rhs);
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, lhs)),
            Err(e) => return Err(e),
        }
    }
}

fn expr(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, and_expr, or_op)
}

fn or_op(input: &str) -> IResult<&str, BinaryOp> {
    value(BinaryOp::Or, alt((tag("||"), keyword("or"))))(input)
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, not_expr, and_op)
}

fn and_op(input: &str) -> IResult<&str, BinaryOp> {
    value(BinaryOp::And, alt((tag("&&"), keyword("and"))))(input)
}

fn not_expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(
            preceded(
                ws(alt((keyword("not"), terminated(tag("!"), not(char('=')))))),
                not_expr,
            ),
            |e| Expr::unary(UnaryOp::Not, e),
        ),
        comparison,
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = bit_or(input)?;
    match ws(comparison_op)(input) {
        Ok((rest, op)) => {
            let (rest, rhs) = bit_or(rest)?;
            Ok((rest, Expr::binary(op, lhs, rhs)))
        }
        Err(nom::Err::Error(_)) => Ok((input, lhs)),
        Err(e) => Err(e),
    }
}

fn comparison_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Lt, terminated(char('<'), not(char('<')))),
        value(BinaryOp::Gt, terminated(char('>'), not(char('>')))),
    ))(input)
}

fn bit_or(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, bit_xor, |i| {
        value(BinaryOp::BitOr, terminated(char('|'), not(char('|'))))(i)
    })
}

fn bit_xor(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, bit_and, |i| value(BinaryOp::BitXor, char('^'))(i))
}

fn bit_and(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, shift, |i| {
        value(BinaryOp::BitAnd, terminated(char('&'), not(char('&'))))(i)
    })
}

fn shift(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, sum, |i| {
        alt((
            value(BinaryOp::Shl, tag("<<")),
            value(BinaryOp::Shr, tag(">>")),
        ))(i)
    })
}

fn sum(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, term, |i| {
        alt((
            value(BinaryOp::Add, char('+')),
            value(BinaryOp::Sub, char('-')),
        ))(i)
    })
}

fn term(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, unary, |i| {
        alt((
            value(BinaryOp::Mul, char('*')),
            value(BinaryOp::Div, char('/')),
            value(BinaryOp::Rem, char('%')),
        ))(i)
    })
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), |e| {
            Expr::unary(UnaryOp::Neg, e)
        }),
        map(preceded(ws(char('~')), unary), |e| {
            Expr::unary(UnaryOp::BitNot, e)
        }),
        primary,
    ))(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        number,
        boolean,
        size_of,
        name,
        delimited(char('('), expr, char(')')),
    )))(input)
}

fn number(input: &str) -> IResult<&str, Expr> {
    map(
        alt((
            map_res(preceded(tag_no_case("0x"), hex_digit1), |s: &str| {
                i128::from_str_radix(s, 16)
            }),
            map_res(digit1, |s: &str| s.parse::<i128>()),
        )),
        Expr::Int,
    )(input)
}

fn boolean(input: &str) -> IResult<&str, Expr> {
    alt((
        value(Expr::Bool(true), alt((keyword("true"), keyword("True")))),
        value(Expr::Bool(false), alt((keyword("false"), keyword("False")))),
    ))(input)
}

fn size_of(input: &str) -> IResult<&str, Expr> {
    map(
        tuple((
            alt((keyword("SIZEOF"), keyword("sizeof"))),
            ws(char('(')),
            identifier,
            ws(char(')')),
        )),
        |(_, _, type_name, _)| Expr::SizeOf(type_name.to_string()),
    )(input)
}

fn name(input: &str) -> IResult<&str, Expr> {
    map(separated_list1(char('.'), identifier), |parts| {
        Expr::Name(parts.into_iter().map(str::to_string).collect())
    })(input)
}

/// Alphanumeric + underscore, starting with a letter or underscore.
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}
