//! Arithmetic formulas over result columns.
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '//' | '%') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary ('**' unary)?
//! primary := number | '${' column '}' | '(' expr ')'
//! ```
//!
//! Integers stay integers under `+ - * // % **` and `/` always yields a
//! float. Anything else (names, calls, strings) is rejected when the
//! formula is parsed, before any row is evaluated.
//!
//! Parsing runs in two chumsky passes: characters to spanned tokens, then
//! tokens to a [`Node`] tree.

use std::fmt;

use chumsky::input::{Input, ValueInput};
use chumsky::prelude::*;

/// A numeric value during evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Num::Int(i) => i == 0,
            Num::Float(f) => f == 0.0,
        }
    }
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Num::Int(i) => write!(f, "{}", i),
            Num::Float(x) => write!(f, "{}", ryu::Buffer::new().format(*x)),
        }
    }
}

/// The formula text is not valid arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at position {position}")]
pub struct FormulaError {
    pub message: String,
    pub position: usize,
}

/// Evaluation failure for one row.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("numeric overflow")]
    Overflow,
    #[error("column '{0}' is not in the result")]
    UnknownColumn(String),
    #[error("column '{0}' is not numeric")]
    NotNumeric(String),
}

/// A formula token.
#[derive(Debug, Clone, PartialEq)]
enum Token<'src> {
    Number(Num),
    Column(&'src str),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    LParen,
    RParen,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Column(name) => write!(f, "${{{}}}", name),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::DoubleSlash => write!(f, "//"),
            Token::Percent => write!(f, "%"),
            Token::DoubleStar => write!(f, "**"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(Num),
    Column(String),
    Neg(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
}

impl Node {
    fn binary(op: BinaryOp, left: Node, right: Node) -> Self {
        Node::Binary(op, Box::new(left), Box::new(right))
    }
}

/// A parsed formula, ready to evaluate against any number of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    root: Node,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let tokens = lexer().parse(source).into_result().map_err(first_error)?;

        let len = source.len();
        let eoi: SimpleSpan = (len..len).into();
        let token_stream = tokens
            .as_slice()
            .map(eoi, |(tok, span): &(Token<'_>, SimpleSpan)| (tok, span));
        let root = parser()
            .then_ignore(end())
            .parse(token_stream)
            .into_result()
            .map_err(first_error)?;
        Ok(Self { root })
    }

    /// Evaluate with `column` supplying `${name}` values.
    pub fn evaluate<F>(&self, column: F) -> Result<Num, EvalError>
    where
        F: Fn(&str) -> Result<Num, EvalError>,
    {
        eval(&self.root, &column)
    }

    /// Columns referenced by the formula, in order of appearance.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_columns(&self.root, &mut out);
        out
    }
}

fn first_error<T: fmt::Display>(errors: Vec<Rich<'_, T>>) -> FormulaError {
    errors
        .into_iter()
        .next()
        .map(|e| FormulaError {
            message: e.to_string(),
            position: e.span().start,
        })
        .unwrap_or_else(|| FormulaError {
            message: "invalid formula".to_string(),
            position: 0,
        })
}

fn collect_columns<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
    match node {
        Node::Number(_) => {}
        Node::Column(name) => {
            if !out.contains(&name.as_str()) {
                out.push(name);
            }
        }
        Node::Neg(inner) => collect_columns(inner, out),
        Node::Binary(_, left, right) => {
            collect_columns(left, out);
            collect_columns(right, out);
        }
    }
}

/// Characters to spanned tokens; whitespace is skipped.
fn lexer<'src>(
) -> impl Parser<'src, &'src str, Vec<(Token<'src>, SimpleSpan)>, extra::Err<Rich<'src, char>>> {
    // 12, 1.5, 1., .5, 1e3, 2.5E-1
    let mantissa = choice((
        text::digits(10)
            .then(just('.').then(text::digits(10).or_not()).or_not())
            .ignored(),
        just('.').then(text::digits(10)).ignored(),
    ));
    let exponent = one_of("eE")
        .then(one_of("+-").or_not())
        .then(text::digits(10))
        .ignored();
    let number = mantissa
        .then(exponent.or_not())
        .to_slice()
        .try_map(|literal: &str, span| {
            parse_number(literal)
                .map(Token::Number)
                .ok_or_else(|| Rich::custom(span, "malformed number"))
        });

    // ${column name}
    let column = just("${")
        .ignore_then(none_of('}').repeated().to_slice())
        .then_ignore(just('}'))
        .try_map(|name: &str, span| match name.trim() {
            "" => Err(Rich::custom(span, "empty column reference")),
            name => Ok(Token::Column(name)),
        });

    // Symbols (multi-char first, then single-char)
    let symbol = choice((
        just("**").to(Token::DoubleStar),
        just("//").to(Token::DoubleSlash),
        just('*').to(Token::Star),
        just('/').to(Token::Slash),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('%').to(Token::Percent),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
    ));

    let token = choice((number, column, symbol)).map_with(|tok, e| (tok, e.span()));

    token
        .padded()
        .repeated()
        .collect()
        .padded()
        .then_ignore(end())
}

fn parse_number(literal: &str) -> Option<Num> {
    if literal.contains(['.', 'e', 'E']) {
        return literal.parse::<f64>().ok().map(Num::Float);
    }
    match literal.parse::<i64>() {
        Ok(i) => Some(Num::Int(i)),
        Err(_) => literal.parse::<f64>().ok().map(Num::Float),
    }
}

/// Tokens to a formula tree.
///
/// Binary operators fold left; `**` binds tighter than unary minus on its
/// left and takes a signed operand on its right, so `-2 ** 2` is `-4` and
/// `2 ** 3 ** 2` is `512`.
fn parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, Node, extra::Err<Rich<'tokens, Token<'src>, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    recursive(|expr| {
        let atom = select! {
            Token::Number(n) => Node::Number(n),
            Token::Column(name) => Node::Column(name.to_string()),
        }
        .or(expr.delimited_by(just(Token::LParen), just(Token::RParen)))
        .labelled("number, column or '('");

        let unary = recursive(|unary| {
            let power = atom
                .then(just(Token::DoubleStar).ignore_then(unary.clone()).or_not())
                .map(|(base, exponent)| match exponent {
                    Some(exponent) => Node::binary(BinaryOp::Pow, base, exponent),
                    None => base,
                });
            choice((
                just(Token::Minus)
                    .ignore_then(unary.clone())
                    .map(|inner| Node::Neg(Box::new(inner))),
                just(Token::Plus).ignore_then(unary),
                power,
            ))
        });

        let product = unary.clone().foldl(
            select! {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::DoubleSlash => BinaryOp::FloorDiv,
                Token::Percent => BinaryOp::Mod,
            }
            .then(unary)
            .repeated(),
            |left, (op, right)| Node::binary(op, left, right),
        );

        product.clone().foldl(
            select! {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
            }
            .then(product)
            .repeated(),
            |left, (op, right)| Node::binary(op, left, right),
        )
    })
}

fn eval<F>(node: &Node, column: &F) -> Result<Num, EvalError>
where
    F: Fn(&str) -> Result<Num, EvalError>,
{
    match node {
        Node::Number(n) => Ok(*n),
        Node::Column(name) => column(name),
        Node::Neg(inner) => match eval(inner, column)? {
            Num::Int(i) => i.checked_neg().map(Num::Int).ok_or(EvalError::Overflow),
            Num::Float(f) => Ok(Num::Float(-f)),
        },
        Node::Binary(op, left, right) => {
            let left = eval(left, column)?;
            let right = eval(right, column)?;
            apply(*op, left, right)
        }
    }
}

fn apply(op: BinaryOp, left: Num, right: Num) -> Result<Num, EvalError> {
    if matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod) && right.is_zero() {
        return Err(EvalError::DivisionByZero);
    }

    let result = match (left, right) {
        (Num::Int(a), Num::Int(b)) => match op {
            BinaryOp::Add => a.checked_add(b).map(Num::Int),
            BinaryOp::Sub => a.checked_sub(b).map(Num::Int),
            BinaryOp::Mul => a.checked_mul(b).map(Num::Int),
            BinaryOp::Div => Some(Num::Float(a as f64 / b as f64)),
            BinaryOp::FloorDiv => floor_div(a, b).map(Num::Int),
            BinaryOp::Mod => floor_mod(a, b).map(Num::Int),
            BinaryOp::Pow if b >= 0 => u32::try_from(b)
                .ok()
                .and_then(|exp| a.checked_pow(exp))
                .map(Num::Int),
            BinaryOp::Pow if a == 0 => return Err(EvalError::DivisionByZero),
            BinaryOp::Pow => Some(Num::Float((a as f64).powf(b as f64))),
        },
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            let value = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::FloorDiv => (a / b).floor(),
                BinaryOp::Mod => {
                    let r = a % b;
                    if r != 0.0 && (r < 0.0) != (b < 0.0) {
                        r + b
                    } else {
                        r
                    }
                }
                BinaryOp::Pow if a == 0.0 && b < 0.0 => return Err(EvalError::DivisionByZero),
                BinaryOp::Pow => a.powf(b),
            };
            Some(Num::Float(value))
        }
    };

    match result {
        Some(Num::Float(f)) if !f.is_finite() => Err(EvalError::Overflow),
        Some(n) => Ok(n),
        None => Err(EvalError::Overflow),
    }
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}
