//! Derived column expressions
//!
//! A small numexpr-like language evaluated element-wise over `f64` columns:
//! numeric literals, column identifiers (bare, or back-quoted for names with
//! spaces), `+ - * / % **`, unary minus, comparisons (yielding `1.0`/`0.0`),
//! parentheses and a handful of functions.

use polars::prelude::*;

use super::convert::column_to_vec;
use crate::error::{Result, StorageError};

/// Lexical token
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Power,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    LParen,
    RParen,
    Comma,
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        let truth = |c: bool| if c { 1.0 } else { 0.0 };
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a % b,
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Lt => truth(a < b),
            BinaryOp::Le => truth(a <= b),
            BinaryOp::Gt => truth(a > b),
            BinaryOp::Ge => truth(a >= b),
            BinaryOp::Eq => truth(a == b),
            BinaryOp::Ne => truth(a != b),
        }
    }
}

/// Built-in function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Sqrt,
    Exp,
    Log,
    Log10,
    Sin,
    Cos,
    Tanh,
    /// `where(cond, a, b)`: `a` where `cond` is non-zero, else `b`
    Where,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(Function::Abs),
            "sqrt" => Some(Function::Sqrt),
            "exp" => Some(Function::Exp),
            "log" => Some(Function::Log),
            "log10" => Some(Function::Log10),
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "tanh" => Some(Function::Tanh),
            "where" => Some(Function::Where),
            _ => None,
        }
    }

    fn arity(self) -> usize {
        match self {
            Function::Where => 3,
            _ => 1,
        }
    }

    fn apply_unary(self, x: f64) -> f64 {
        match self {
            Function::Abs => x.abs(),
            Function::Sqrt => x.sqrt(),
            Function::Exp => x.exp(),
            Function::Log => x.ln(),
            Function::Log10 => x.log10(),
            Function::Sin => x.sin(),
            Function::Cos => x.cos(),
            Function::Tanh => x.tanh(),
            Function::Where => x,
        }
    }
}

/// Parsed column expression
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnExpr {
    Number(f64),
    Column(String),
    Neg(Box<ColumnExpr>),
    Binary {
        op: BinaryOp,
        left: Box<ColumnExpr>,
        right: Box<ColumnExpr>,
    },
    Call {
        func: Function,
        args: Vec<ColumnExpr>,
    },
}

impl ColumnExpr {
    /// Parse an expression string
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(StorageError::InvalidExpression("empty expression".to_string()));
        }
        let mut pos = 0;
        let expr = Parser { tokens: &tokens }.parse_expression(&mut pos, 0)?;
        if pos != tokens.len() {
            return Err(StorageError::InvalidExpression(format!(
                "unexpected token {:?} in '{}'",
                tokens[pos], input
            )));
        }
        Ok(expr)
    }

    /// Whether the expression is a bare column reference
    pub fn as_column(&self) -> Option<&str> {
        match self {
            ColumnExpr::Column(name) => Some(name),
            _ => None,
        }
    }

    /// Names of all columns referenced by the expression, in first-seen order
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ColumnExpr::Number(_) => {}
            ColumnExpr::Column(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            ColumnExpr::Neg(inner) => inner.collect_columns(out),
            ColumnExpr::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            ColumnExpr::Call { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
        }
    }

    /// Evaluate over every row of `df`; nulls are read as NaN
    pub fn evaluate(&self, df: &DataFrame) -> Result<Vec<f64>> {
        let n = df.height();
        match self {
            ColumnExpr::Number(v) => Ok(vec![*v; n]),
            ColumnExpr::Column(name) => {
                let column = df
                    .column(name)
                    .map_err(|_| StorageError::ColumnNotFound(name.clone()))?;
                column_to_vec(column.as_materialized_series())
            }
            ColumnExpr::Neg(inner) => Ok(inner.evaluate(df)?.into_iter().map(|v| -v).collect()),
            ColumnExpr::Binary { op, left, right } => {
                let a = left.evaluate(df)?;
                let b = right.evaluate(df)?;
                Ok(a.into_iter().zip(b).map(|(x, y)| op.apply(x, y)).collect())
            }
            ColumnExpr::Call { func, args } if args.len() != func.arity() => {
                Err(StorageError::InvalidExpression(format!(
                    "{:?} takes {} argument(s), got {}",
                    func,
                    func.arity(),
                    args.len()
                )))
            }
            ColumnExpr::Call { func, args } => match func {
                Function::Where => {
                    let cond = args[0].evaluate(df)?;
                    let then = args[1].evaluate(df)?;
                    let otherwise = args[2].evaluate(df)?;
                    Ok(cond
                        .into_iter()
                        .zip(then.into_iter().zip(otherwise))
                        .map(|(c, (t, o))| if c != 0.0 && !c.is_nan() { t } else { o })
                        .collect())
                }
                f => Ok(args[0].evaluate(df)?.into_iter().map(|x| f.apply_unary(x)).collect()),
            },
        }
    }

    /// Evaluate into a named `Float64` series
    pub fn evaluate_series(&self, df: &DataFrame, name: &str) -> Result<Series> {
        Ok(Series::new(name.into(), self.evaluate(df)?))
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // exponent part: 1e-3, 2.5E+4
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse::<f64>().map_err(|_| {
                    StorageError::InvalidExpression(format!("bad number literal '{}'", text))
                })?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '`' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == '`')
                    .map(|p| start + p)
                    .ok_or_else(|| {
                        StorageError::InvalidExpression(format!("unterminated quoted name in '{}'", input))
                    })?;
                tokens.push(Token::Ident(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::Power);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '<' | '>' | '=' | '!' => {
                let next_is_eq = chars.get(i + 1) == Some(&'=');
                let token = match (c, next_is_eq) {
                    ('<', true) => Token::LessEqual,
                    ('<', false) => Token::Less,
                    ('>', true) => Token::GreaterEqual,
                    ('>', false) => Token::Greater,
                    ('=', true) => Token::Equal,
                    ('!', true) => Token::NotEqual,
                    _ => {
                        return Err(StorageError::InvalidExpression(format!(
                            "unexpected '{}' in '{}'",
                            c, input
                        )))
                    }
                };
                i += if next_is_eq { 2 } else { 1 };
                tokens.push(token);
            }
            other => {
                return Err(StorageError::InvalidExpression(format!(
                    "unexpected character '{}' in '{}'",
                    other, input
                )))
            }
        }
    }

    Ok(tokens)
}

/// Deepest nesting accepted, counting parentheses, calls, signs and
/// operator chains
const MAX_DEPTH: usize = 128;

/// One level deeper, or an error past `MAX_DEPTH`
fn nested(depth: usize) -> Result<usize> {
    if depth >= MAX_DEPTH {
        return Err(StorageError::InvalidExpression(format!(
            "expression nested deeper than {} levels",
            MAX_DEPTH
        )));
    }
    Ok(depth + 1)
}

/// Recursive-descent parser, lowest precedence first.
///
/// `depth` grows with every nested operand, so both the recursion here and
/// the height of the resulting tree stay bounded.
struct Parser<'t> {
    tokens: &'t [Token],
}

impl<'t> Parser<'t> {
    fn peek(&self, pos: usize) -> Option<&'t Token> {
        self.tokens.get(pos)
    }

    fn parse_expression(&self, pos: &mut usize, depth: usize) -> Result<ColumnExpr> {
        self.parse_comparison(pos, depth)
    }

    fn parse_comparison(&self, pos: &mut usize, depth: usize) -> Result<ColumnExpr> {
        let mut left = self.parse_additive(pos, depth)?;
        let mut depth = depth;

        while let Some(token) = self.peek(*pos) {
            let op = match token {
                Token::Less => BinaryOp::Lt,
                Token::LessEqual => BinaryOp::Le,
                Token::Greater => BinaryOp::Gt,
                Token::GreaterEqual => BinaryOp::Ge,
                Token::Equal => BinaryOp::Eq,
                Token::NotEqual => BinaryOp::Ne,
                _ => break,
            };
            *pos += 1;
            depth = nested(depth)?;
            let right = self.parse_additive(pos, depth)?;
            left = ColumnExpr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_additive(&self, pos: &mut usize, depth: usize) -> Result<ColumnExpr> {
        let mut left = self.parse_multiplicative(pos, depth)?;
        let mut depth = depth;

        while let Some(token) = self.peek(*pos) {
            let op = match token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            *pos += 1;
            depth = nested(depth)?;
            let right = self.parse_multiplicative(pos, depth)?;
            left = ColumnExpr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_multiplicative(&self, pos: &mut usize, depth: usize) -> Result<ColumnExpr> {
        let mut left = self.parse_unary(pos, depth)?;
        let mut depth = depth;

        while let Some(token) = self.peek(*pos) {
            let op = match token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Mod,
                _ => break,
            };
            *pos += 1;
            depth = nested(depth)?;
            let right = self.parse_unary(pos, depth)?;
            left = ColumnExpr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Unary minus binds looser than `**`: `-x**2 == -(x**2)`
    fn parse_unary(&self, pos: &mut usize, depth: usize) -> Result<ColumnExpr> {
        match self.peek(*pos) {
            Some(Token::Minus) => {
                *pos += 1;
                let inner = self.parse_unary(pos, nested(depth)?)?;
                Ok(ColumnExpr::Neg(Box::new(inner)))
            }
            Some(Token::Plus) => {
                *pos += 1;
                self.parse_unary(pos, nested(depth)?)
            }
            _ => self.parse_power(pos, depth),
        }
    }

    /// Right-associative
    fn parse_power(&self, pos: &mut usize, depth: usize) -> Result<ColumnExpr> {
        let base = self.parse_primary(pos, depth)?;
        if let Some(Token::Power) = self.peek(*pos) {
            *pos += 1;
            let exponent = self.parse_unary(pos, nested(depth)?)?;
            return Ok(ColumnExpr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&self, pos: &mut usize, depth: usize) -> Result<ColumnExpr> {
        let token = self.peek(*pos).ok_or_else(|| {
            StorageError::InvalidExpression("unexpected end of expression".to_string())
        })?;
        *pos += 1;

        match token {
            Token::Number(v) => Ok(ColumnExpr::Number(*v)),
            Token::Ident(name) => {
                if let Some(Token::LParen) = self.peek(*pos) {
                    let func = Function::from_name(name).ok_or_else(|| {
                        StorageError::InvalidExpression(format!("unknown function '{}'", name))
                    })?;
                    *pos += 1;
                    let args = self.parse_arguments(pos, nested(depth)?)?;
                    if args.len() != func.arity() {
                        return Err(StorageError::InvalidExpression(format!(
                            "{}() takes {} argument(s), got {}",
                            name,
                            func.arity(),
                            args.len()
                        )));
                    }
                    Ok(ColumnExpr::Call { func, args })
                } else {
                    Ok(ColumnExpr::Column(name.clone()))
                }
            }
            Token::LParen => {
                let inner = self.parse_expression(pos, nested(depth)?)?;
                match self.peek(*pos) {
                    Some(Token::RParen) => {
                        *pos += 1;
                        Ok(inner)
                    }
                    _ => Err(StorageError::InvalidExpression("missing ')'".to_string())),
                }
            }
            other => Err(StorageError::InvalidExpression(format!(
                "unexpected token {:?}",
                other
            ))),
        }
    }

    /// Arguments after an opening parenthesis, consuming the closing one
    fn parse_arguments(&self, pos: &mut usize, depth: usize) -> Result<Vec<ColumnExpr>> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek(*pos) {
            *pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression(pos, depth)?);
            match self.peek(*pos) {
                Some(Token::Comma) => *pos += 1,
                Some(Token::RParen) => {
                    *pos += 1;
                    return Ok(args);
                }
                _ => {
                    return Err(StorageError::InvalidExpression(
                        "expected ',' or ')' in argument list".to_string(),
                    ))
                }
            }
        }
    }
}
