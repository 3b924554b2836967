//! Formula parser
//!
//! A bytebeat formula is a single JavaScript-flavoured expression over `t`.
//! Precedence (lowest to highest):
//! 1. `?:` (right-associative)
//! 2. `||`
//! 3. `&&`
//! 4. `|`
//! 5. `^`
//! 6. `&`
//! 7. `==`, `!=`, `===`, `!==`
//! 8. `<`, `<=`, `>`, `>=`
//! 9. `<<`, `>>`, `>>>`
//! 10. `+`, `-`
//! 11. `*`, `/`, `%`
//! 12. `**` (right-associative)
//! 13. unary `-`, `+`, `~`, `!`
//! 14. numbers, identifiers, calls, parentheses

use super::program::MAX_DEPTH;
use crate::error::CompileError;
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_till, take_while1},
    character::complete::{alpha1, alphanumeric1, char, digit0, digit1, one_of},
    combinator::{opt, recognize},
    error::ErrorKind,
    multi::{many0, separated_list0, separated_list1},
    sequence::{pair, preceded, tuple},
    IResult,
};

/// Parsed (unresolved) formula
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Ident(String),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    UShr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Plus,
    BitNot,
    Not,
}

/// Longest source accepted by the parser.
pub const MAX_SOURCE_LEN: usize = 64 * 1024;
/// Deepest parenthesis nesting accepted by the parser.
pub const MAX_PAREN_DEPTH: usize = 64;

/// Parse a complete formula. Trailing `;` and `//` comments are allowed.
pub fn parse_formula(source: &str) -> Result<Expr, CompileError> {
    check_nesting(source)?;

    let result = tuple((ws, parse_expr, ws, opt(char(';')), ws))(source);
    match result {
        Ok((rest, (_, expr, _, _, _))) if rest.is_empty() => Ok(expr),
        Ok((rest, _)) => Err(syntax_error(
            source,
            rest,
            format!("unexpected `{}`", preview(rest)),
        )),
        Err(nom::Err::Failure(e)) if e.code == ErrorKind::TooLarge => Err(
            CompileError::TooComplex(format!("expression nested deeper than {MAX_DEPTH}")),
        ),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let message = if e.input.is_empty() {
                "unexpected end of formula".to_string()
            } else {
                format!("cannot parse `{}`", preview(e.input))
            };
            Err(syntax_error(source, e.input, message))
        }
        Err(nom::Err::Incomplete(_)) => Err(syntax_error(
            source,
            "",
            "unexpected end of formula".to_string(),
        )),
    }
}

fn check_nesting(source: &str) -> Result<(), CompileError> {
    if source.len() > MAX_SOURCE_LEN {
        return Err(CompileError::TooComplex(format!(
            "source is {} bytes, limit is {MAX_SOURCE_LEN}",
            source.len()
        )));
    }
    let mut depth = 0usize;
    for c in source.chars() {
        match c {
            '(' => {
                depth += 1;
                if depth > MAX_PAREN_DEPTH {
                    return Err(CompileError::TooComplex(format!(
                        "parentheses nested deeper than {MAX_PAREN_DEPTH}"
                    )));
                }
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

/// Map the unparsed remainder back to a 1-based line/column.
fn syntax_error(source: &str, remaining: &str, message: String) -> CompileError {
    let offset = source.len() - remaining.len();
    let consumed = &source[..offset];
    let line = consumed.matches('\n').count() + 1;
    let column = match consumed.rfind('\n') {
        Some(pos) => consumed[pos + 1..].chars().count() + 1,
        None => consumed.chars().count() + 1,
    };
    CompileError::Syntax {
        line,
        column,
        message,
    }
}

fn preview(rest: &str) -> String {
    let first_line = rest.lines().next().unwrap_or("").trim();
    if first_line.chars().count() > 24 {
        format!("{}...", first_line.chars().take(24).collect::<String>())
    } else {
        first_line.to_string()
    }
}

// ============================================================================
// Whitespace and tokens
// ============================================================================

/// Skip whitespace and `//` line comments
fn ws(input: &str) -> IResult<&str, ()> {
    let mut current = input;
    loop {
        let start_len = current.len();

        if let Ok((rest, _)) =
            take_while1::<_, _, nom::error::Error<&str>>(|c: char| c.is_whitespace())(current)
        {
            current = rest;
        }

        if let Ok((rest, _)) = preceded(
            tag::<_, _, nom::error::Error<&str>>("//"),
            take_till(|c: char| c == '\n'),
        )(current)
        {
            current = rest;
        }

        if current.len() == start_len {
            break;
        }
    }
    Ok((current, ()))
}

/// Lex the longest binary operator at the head of the input
fn operator(input: &str) -> IResult<&str, &str> {
    alt((
        alt((
            tag("==="),
            tag("!=="),
            tag(">>>"),
            tag("**"),
            tag("<<"),
            tag(">>"),
            tag("<="),
            tag(">="),
            tag("=="),
            tag("!="),
            tag("&&"),
            tag("||"),
        )),
        alt((
            tag("+"),
            tag("-"),
            tag("*"),
            tag("/"),
            tag("%"),
            tag("&"),
            tag("|"),
            tag("^"),
            tag("<"),
            tag(">"),
        )),
    ))(input)
}

// ============================================================================
// Expressions
// ============================================================================

pub fn parse_expr(input: &str) -> IResult<&str, Expr> {
    expr_at(input, 0)
}

/// Fail once a subexpression at `depth` could no longer fit under
/// [`MAX_DEPTH`]. Every recursive step below goes through this check, so the
/// parser's own stack use is bounded no matter what the source contains.
fn within_depth(input: &str, depth: usize) -> Result<(), nom::Err<nom::error::Error<&str>>> {
    if depth >= MAX_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    Ok(())
}

/// `depth` counts the tree nodes known to sit above the expression.
fn expr_at(input: &str, depth: usize) -> IResult<&str, Expr> {
    within_depth(input, depth)?;
    parse_conditional(input, depth)
}

fn parse_conditional(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, cond) = parse_or(input, depth)?;
    let (rest, _) = ws(input)?;
    match char::<_, nom::error::Error<&str>>('?')(rest) {
        Ok((rest, _)) => {
            let (rest, _) = ws(rest)?;
            let (rest, then) = expr_at(rest, depth + 1)?;
            let (rest, _) = ws(rest)?;
            let (rest, _) = char(':')(rest)?;
            let (rest, _) = ws(rest)?;
            let (rest, otherwise) = expr_at(rest, depth + 1)?;
            Ok((
                rest,
                Expr::Conditional {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
            ))
        }
        Err(_) => Ok((input, cond)),
    }
}

type Level = for<'a> fn(&'a str, usize) -> IResult<&'a str, Expr>;

/// One left-associative precedence level
fn binary_level<'a>(
    input: &'a str,
    depth: usize,
    ops: &[(&str, BinOp)],
    next: Level,
) -> IResult<&'a str, Expr> {
    let (input, mut expr) = next(input, depth)?;

    let mut current_input = input;
    let mut links = 0;
    loop {
        let (rest, _) = ws(current_input)?;
        let Ok((after_op, token)) = operator(rest) else {
            break;
        };
        let Some(&(_, op)) = ops.iter().find(|(t, _)| *t == token) else {
            break;
        };

        // each link pushes the leftmost operand one level further down
        links += 1;
        within_depth(rest, depth + links)?;

        let (after_op, _) = ws(after_op)?;
        let (after, right) = next(after_op, depth + 1)?;
        expr = Expr::Binary {
            op,
            left: Box::new(expr),
            right: Box::new(right),
        };
        current_input = after;
    }

    Ok((current_input, expr))
}

fn parse_or(input: &str, depth: usize) -> IResult<&str, Expr> {
    binary_level(input, depth, &[("||", BinOp::Or)], parse_and)
}

fn parse_and(input: &str, depth: usize) -> IResult<&str, Expr> {
    binary_level(input, depth, &[("&&", BinOp::And)], parse_bit_or)
}

fn parse_bit_or(input: &str, depth: usize) -> IResult<&str, Expr> {
    binary_level(input, depth, &[("|", BinOp::BitOr)], parse_bit_xor)
}

fn parse_bit_xor(input: &str, depth: usize) -> IResult<&str, Expr> {
    binary_level(input, depth, &[("^", BinOp::BitXor)], parse_bit_and)
}

fn parse_bit_and(input: &str, depth: usize) -> IResult<&str, Expr> {
    binary_level(input, depth, &[("&", BinOp::BitAnd)], parse_equality)
}

fn parse_equality(input: &str, depth: usize) -> IResult<&str, Expr> {
    binary_level(
        input,
        depth,
        &[
            ("==", BinOp::Eq),
            ("!=", BinOp::Ne),
            ("===", BinOp::Eq),
            ("!==", BinOp::Ne),
        ],
        parse_relational,
    )
}

fn parse_relational(input: &str, depth: usize) -> IResult<&str, Expr> {
    binary_level(
        input,
        depth,
        &[
            ("<", BinOp::Lt),
            ("<=", BinOp::Le),
            (">", BinOp::Gt),
            (">=", BinOp::Ge),
        ],
        parse_shift,
    )
}

fn parse_shift(input: &str, depth: usize) -> IResult<&str, Expr> {
    binary_level(
        input,
        depth,
        &[
            ("<<", BinOp::Shl),
            (">>", BinOp::Shr),
            (">>>", BinOp::UShr),
        ],
        parse_additive,
    )
}

fn parse_additive(input: &str, depth: usize) -> IResult<&str, Expr> {
    binary_level(
        input,
        depth,
        &[("+", BinOp::Add), ("-", BinOp::Sub)],
        parse_multiplicative,
    )
}

fn parse_multiplicative(input: &str, depth: usize) -> IResult<&str, Expr> {
    binary_level(
        input,
        depth,
        &[("*", BinOp::Mul), ("/", BinOp::Div), ("%", BinOp::Rem)],
        parse_exponent,
    )
}

/// `a ** b ** c` groups as `a ** (b ** c)`
fn parse_exponent(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, base) = parse_unary(input, depth)?;
    let (rest, _) = ws(input)?;
    match operator(rest) {
        Ok((after_op, "**")) => {
            let (after_op, _) = ws(after_op)?;
            within_depth(after_op, depth + 1)?;
            let (rest, exponent) = parse_exponent(after_op, depth + 1)?;
            Ok((
                rest,
                Expr::Binary {
                    op: BinOp::Pow,
                    left: Box::new(base),
                    right: Box::new(exponent),
                },
            ))
        }
        _ => Ok((input, base)),
    }
}

/// Prefix operators are collected iteratively so long chains cannot
/// exhaust the stack while parsing.
fn parse_unary(input: &str, depth: usize) -> IResult<&str, Expr> {
    let mut ops = Vec::new();
    let mut current = input;
    loop {
        let (rest, _) = ws(current)?;
        match one_of::<_, _, nom::error::Error<&str>>("-+~!")(rest) {
            Ok((after, c)) => {
                ops.push(match c {
                    '-' => UnOp::Neg,
                    '+' => UnOp::Plus,
                    '~' => UnOp::BitNot,
                    _ => UnOp::Not,
                });
                within_depth(after, depth + ops.len())?;
                current = after;
            }
            Err(_) => {
                current = rest;
                break;
            }
        }
    }

    let (rest, mut expr) = parse_primary(current, depth + ops.len())?;
    for op in ops.into_iter().rev() {
        expr = Expr::Unary {
            op,
            expr: Box::new(expr),
        };
    }
    Ok((rest, expr))
}

fn parse_primary(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, _) = ws(input)?;
    alt((
        parse_number,
        |i| parse_paren(i, depth),
        |i| parse_call_or_ident(i, depth),
    ))(input)
}

/// Parentheses add no node; their nesting is bounded by [`check_nesting`].
fn parse_paren(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, _) = char('(')(input)?;
    let (input, _) = ws(input)?;
    let (input, expr) = expr_at(input, depth)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(')')(input)?;
    Ok((input, expr))
}

/// `name`, `Math.name`, `name(args...)`
fn parse_call_or_ident(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, name) = parse_identifier(input)?;
    let (after_ws, _) = ws(input)?;

    if let Ok((rest, _)) = char::<_, nom::error::Error<&str>>('(')(after_ws) {
        let (rest, _) = ws(rest)?;
        let (rest, args) =
            separated_list0(tuple((ws, char(','), ws)), |i| expr_at(i, depth + 1))(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, _) = char(')')(rest)?;
        return Ok((
            rest,
            Expr::Call {
                name: name.to_string(),
                args,
            },
        ));
    }

    Ok((input, Expr::Ident(name.to_string())))
}

fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(separated_list1(
        char('.'),
        pair(
            alt((alpha1, tag("_"), tag("$"))),
            many0(alt((alphanumeric1, tag("_"), tag("$")))),
        ),
    ))(input)
}

/// Decimal, `0x` hex or `0b` binary literal
fn parse_number(input: &str) -> IResult<&str, Expr> {
    alt((parse_radix_literal, parse_decimal))(input)
}

fn parse_radix_literal(input: &str) -> IResult<&str, Expr> {
    let (rest, prefix) = alt((tag_no_case("0x"), tag_no_case("0b")))(input)?;
    let radix = if prefix.eq_ignore_ascii_case("0x") {
        16
    } else {
        2
    };
    let (rest, digits) = take_while1(|c: char| c.is_digit(radix))(rest)?;
    // Literals wider than u64 lose precision the same way JS numbers do
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0f64, |acc, d| acc * radix as f64 + d as f64);
    Ok((rest, Expr::Number(value)))
}

fn parse_decimal(input: &str) -> IResult<&str, Expr> {
    let (rest, text) = recognize(tuple((
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    match text.parse::<f64>() {
        Ok(value) => Ok((rest, Expr::Number(value))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Float,
        ))),
    }
}
