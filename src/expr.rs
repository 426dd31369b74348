//! Condition expressions for `if`/`elif`.
//!
//! Operands arrive already resolved (dataset lookups and filter chains are
//! done by the processor), so this module only sees values and operator
//! words. The grammar is closed: boolean logic, comparison, membership,
//! identity, bitwise and arithmetic operators with the usual precedence,
//! plus parentheses.

use std::cmp::Ordering;

use serde_json::Value;
use thiserror::Error;

use crate::data::{self, ValueType};

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Op(String),
    Value(Value),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("expression is empty")]
    Empty,
    #[error("expression ended early")]
    UnexpectedEnd,
    #[error("unexpected `{0}`")]
    Unexpected(String),
    #[error("unsupported operand types for {op}: {left} and {right}")]
    Types {
        op: &'static str,
        left: ValueType,
        right: ValueType,
    },
    #[error("bad operand type for unary {op}: {operand}")]
    Unary { op: &'static str, operand: ValueType },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("repeated sequence would exceed {limit} elements")]
    TooLarge { limit: usize },
}

/// Upper bound on the length of a `*`-repeated string (in bytes) or list.
pub const MAX_REPEAT_LEN: usize = 1 << 20;

/// Repeat count for a sequence of `len` elements, bounded by
/// [`MAX_REPEAT_LEN`]. Negative counts repeat zero times.
fn repeat_count(len: usize, n: i64) -> Result<usize, ExprError> {
    let times = usize::try_from(n).unwrap_or(0);
    match len.checked_mul(times) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
        _ => Err(ExprError::TooLarge { limit: MAX_REPEAT_LEN }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum UnOp {
    Neg,
    Pos,
    Invert,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Value(Value),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Unary(UnOp, Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    /// `a < b <= c`: each link compares neighbours.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
}

/// Parses and evaluates `operands`, returning the resulting value.
pub fn evaluate(operands: &[Operand]) -> Result<Value, ExprError> {
    if operands.is_empty() {
        return Err(ExprError::Empty);
    }
    let mut parser = ExprParser { operands, pos: 0 };
    let expr = parser.parse_or()?;
    if let Some(extra) = parser.peek() {
        return Err(ExprError::Unexpected(describe(extra)));
    }
    eval(&expr)
}

fn describe(operand: &Operand) -> String {
    match operand {
        Operand::Op(op) => op.clone(),
        Operand::Value(value) => data::display(value),
    }
}

struct ExprParser<'a> {
    operands: &'a [Operand],
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn peek(&self) -> Option<&'a Operand> {
        self.operands.get(self.pos)
    }

    fn peek_op(&self) -> Option<&'a str> {
        match self.peek() {
            Some(Operand::Op(op)) => Some(op.as_str()),
            _ => None,
        }
    }

    fn peek_op_at(&self, offset: usize) -> Option<&'a str> {
        match self.operands.get(self.pos + offset) {
            Some(Operand::Op(op)) => Some(op.as_str()),
            _ => None,
        }
    }

    fn consume(&mut self) -> Option<&'a Operand> {
        let operand = self.operands.get(self.pos);
        if operand.is_some() {
            self.pos += 1;
        }
        operand
    }

    fn expect_op(&mut self, op: &str) -> Result<(), ExprError> {
        match self.consume() {
            Some(Operand::Op(found)) if found == op => Ok(()),
            Some(other) => Err(ExprError::Unexpected(describe(other))),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.peek_op() == Some("or") {
            self.consume();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_not()?;
        while self.peek_op() == Some("and") {
            self.consume();
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.peek_op() == Some("not") {
            self.consume();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match (self.peek_op()?, self.peek_op_at(1)) {
            ("not", Some("in")) => {
                self.pos += 2;
                return Some(CmpOp::NotIn);
            }
            ("is", Some("not")) => {
                self.pos += 2;
                return Some(CmpOp::IsNot);
            }
            ("==", _) => CmpOp::Eq,
            ("!=", _) => CmpOp::Ne,
            ("<", _) => CmpOp::Lt,
            ("<=", _) => CmpOp::Le,
            (">", _) => CmpOp::Gt,
            (">=", _) => CmpOp::Ge,
            ("in", _) => CmpOp::In,
            ("is", _) => CmpOp::Is,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let first = self.parse_bitor()?;
        let mut links = Vec::new();
        while let Some(op) = self.comparison_op() {
            links.push((op, self.parse_bitor()?));
        }
        if links.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), links))
        }
    }

    fn parse_binary(
        &mut self,
        ops: &[(&str, BinOp)],
        next: fn(&mut Self) -> Result<Expr, ExprError>,
    ) -> Result<Expr, ExprError> {
        let mut lhs = next(self)?;
        while let Some(&(_, op)) = self
            .peek_op()
            .and_then(|word| ops.iter().find(|(symbol, _)| *symbol == word))
        {
            self.consume();
            let rhs = next(self)?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<Expr, ExprError> {
        self.parse_binary(&[("|", BinOp::BitOr)], Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, ExprError> {
        self.parse_binary(&[("^", BinOp::BitXor)], Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> Result<Expr, ExprError> {
        self.parse_binary(&[("&", BinOp::BitAnd)], Self::parse_shift)
    }

    fn parse_shift(&mut self) -> Result<Expr, ExprError> {
        self.parse_binary(&[("<<", BinOp::Shl), (">>", BinOp::Shr)], Self::parse_arith)
    }

    fn parse_arith(&mut self) -> Result<Expr, ExprError> {
        self.parse_binary(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::parse_term)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        self.parse_binary(
            &[
                ("*", BinOp::Mul),
                ("/", BinOp::Div),
                ("//", BinOp::FloorDiv),
                ("%", BinOp::Mod),
            ],
            Self::parse_factor,
        )
    }

    fn parse_factor(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek_op() {
            Some("-") => UnOp::Neg,
            Some("+") => UnOp::Pos,
            Some("~") => UnOp::Invert,
            _ => return self.parse_power(),
        };
        self.consume();
        let inner = self.parse_factor()?;
        Ok(Expr::Unary(op, Box::new(inner)))
    }

    fn parse_power(&mut self) -> Result<Expr, ExprError> {
        let base = self.parse_atom()?;
        if self.peek_op() == Some("**") {
            self.consume();
            let exponent = self.parse_factor()?;
            return Ok(Expr::Binary(Box::new(base), BinOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Expr, ExprError> {
        match self.consume() {
            Some(Operand::Value(value)) => Ok(Expr::Value(value.clone())),
            Some(Operand::Op(op)) => match op.as_str() {
                "True" => Ok(Expr::Value(Value::Bool(true))),
                "False" => Ok(Expr::Value(Value::Bool(false))),
                "None" => Ok(Expr::Value(Value::Null)),
                "(" => {
                    let inner = self.parse_or()?;
                    self.expect_op(")")?;
                    Ok(inner)
                }
                other => Err(ExprError::Unexpected(other.to_string())),
            },
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

fn eval(expr: &Expr) -> Result<Value, ExprError> {
    match expr {
        Expr::Value(value) => Ok(value.clone()),
        Expr::Not(inner) => Ok(Value::Bool(!data::is_truthy(&eval(inner)?))),
        Expr::And(lhs, rhs) => {
            let left = eval(lhs)?;
            if data::is_truthy(&left) {
                eval(rhs)
            } else {
                Ok(left)
            }
        }
        Expr::Or(lhs, rhs) => {
            let left = eval(lhs)?;
            if data::is_truthy(&left) {
                Ok(left)
            } else {
                eval(rhs)
            }
        }
        Expr::Unary(op, inner) => unary(*op, eval(inner)?),
        Expr::Binary(lhs, op, rhs) => binary(*op, eval(lhs)?, eval(rhs)?),
        Expr::Compare(first, links) => {
            let mut left = eval(first)?;
            for (op, rhs) in links {
                let right = eval(rhs)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Number(n) => match n.as_i64() {
                Some(i) if !n.is_f64() => Some(Num::Int(i)),
                _ => n.as_f64().map(Num::Float),
            },
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn float_value(f: f64) -> Result<Value, ExprError> {
    data::float(f).ok_or(ExprError::Overflow)
}

fn type_error(op: BinOp, left: &Value, right: &Value) -> ExprError {
    ExprError::Types {
        op: op.symbol(),
        left: ValueType::of(left),
        right: ValueType::of(right),
    }
}

fn unary(op: UnOp, value: Value) -> Result<Value, ExprError> {
    let (symbol, num) = match op {
        UnOp::Neg => ("-", Num::of(&value)),
        UnOp::Pos => ("+", Num::of(&value)),
        UnOp::Invert => ("~", Num::of(&value).filter(|n| matches!(n, Num::Int(_)))),
    };
    let Some(num) = num else {
        return Err(ExprError::Unary {
            op: symbol,
            operand: ValueType::of(&value),
        });
    };
    match (op, num) {
        (UnOp::Neg, Num::Int(i)) => i.checked_neg().map(Value::from).ok_or(ExprError::Overflow),
        (UnOp::Neg, Num::Float(f)) => float_value(-f),
        (UnOp::Pos, Num::Int(i)) => Ok(Value::from(i)),
        (UnOp::Pos, Num::Float(f)) => float_value(f),
        (UnOp::Invert, Num::Int(i)) => Ok(Value::from(!i)),
        (UnOp::Invert, Num::Float(_)) => Err(ExprError::Unary {
            op: symbol,
            operand: ValueType::Float,
        }),
    }
}

fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, ExprError> {
    // Sequence operators first: concatenation and repetition.
    match (op, &left, &right) {
        (BinOp::Add, Value::String(a), Value::String(b)) => return Ok(Value::String(format!("{}{}", a, b))),
        (BinOp::Add, Value::Array(a), Value::Array(b)) => {
            return Ok(Value::Array(a.iter().chain(b).cloned().collect()));
        }
        (BinOp::Mul, Value::String(s), other) | (BinOp::Mul, other, Value::String(s)) => {
            if let Some(Num::Int(n)) = Num::of(other) {
                return Ok(Value::String(s.repeat(repeat_count(s.len(), n)?)));
            }
        }
        (BinOp::Mul, Value::Array(items), other) | (BinOp::Mul, other, Value::Array(items)) => {
            if let Some(Num::Int(n)) = Num::of(other) {
                let times = repeat_count(items.len(), n)?;
                let repeated = (0..times).flat_map(|_| items.iter().cloned()).collect();
                return Ok(Value::Array(repeated));
            }
        }
        (BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor, Value::Bool(a), Value::Bool(b)) => {
            let result = match op {
                BinOp::BitAnd => a & b,
                BinOp::BitOr => a | b,
                _ => a ^ b,
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (Num::of(&left), Num::of(&right)) else {
        return Err(type_error(op, &left, &right));
    };

    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_binary(op, x, y, &left, &right),
        _ => float_binary(op, a.as_f64(), b.as_f64(), &left, &right),
    }
}

fn int_binary(op: BinOp, x: i64, y: i64, left: &Value, right: &Value) -> Result<Value, ExprError> {
    let result = match op {
        BinOp::Add => x.checked_add(y),
        BinOp::Sub => x.checked_sub(y),
        BinOp::Mul => x.checked_mul(y),
        BinOp::Div => {
            if y == 0 {
                return Err(ExprError::DivisionByZero);
            }
            return float_value(x as f64 / y as f64);
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(ExprError::DivisionByZero);
            }
            // Euclidean and floor division differ only for a negative
            // divisor with a remainder.
            x.checked_div_euclid(y).and_then(|q| {
                if y < 0 && x.rem_euclid(y) != 0 {
                    q.checked_sub(1)
                } else {
                    Some(q)
                }
            })
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(ExprError::DivisionByZero);
            }
            let r = x % y;
            Some(if r != 0 && (r < 0) != (y < 0) { r + y } else { r })
        }
        BinOp::Pow => {
            if y < 0 {
                return float_value((x as f64).powf(y as f64));
            }
            u32::try_from(y).ok().and_then(|exp| x.checked_pow(exp))
        }
        BinOp::BitAnd => Some(x & y),
        BinOp::BitOr => Some(x | y),
        BinOp::BitXor => Some(x ^ y),
        BinOp::Shl => u32::try_from(y).ok().and_then(|s| x.checked_shl(s)),
        BinOp::Shr => u32::try_from(y).ok().map(|s| if s >= 64 { if x < 0 { -1 } else { 0 } } else { x >> s }),
    };
    match (op, result) {
        (BinOp::Shl | BinOp::Shr, None) if y < 0 => Err(type_error(op, left, right)),
        (_, Some(v)) => Ok(Value::from(v)),
        (_, None) => Err(ExprError::Overflow),
    }
}

fn float_binary(op: BinOp, x: f64, y: f64, left: &Value, right: &Value) -> Result<Value, ExprError> {
    let result = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if y == 0.0 => return Err(ExprError::DivisionByZero),
        BinOp::Div => x / y,
        BinOp::FloorDiv => (x / y).floor(),
        BinOp::Mod => x - y * (x / y).floor(),
        BinOp::Pow => x.powf(y),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
            return Err(type_error(op, left, right));
        }
    };
    float_value(result)
}

/// Equality with numeric cross-type comparison (`1 == 1.0`, `True == 1`).
fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Array(a), Value::Array(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equals(x, y)),
        _ => match (Num::of(left), Num::of(right)) {
            (Some(a), Some(b)) => match (a, b) {
                (Num::Int(x), Num::Int(y)) => x == y,
                _ => a.as_f64() == b.as_f64(),
            },
            _ => left == right,
        },
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b) {
                if !equals(x, y) {
                    return order(x, y);
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => match (Num::of(left), Num::of(right)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => Some(x.cmp(&y)),
            (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            _ => None,
        },
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ExprError> {
    let ordered = |symbol: &'static str, accept: fn(Ordering) -> bool| {
        order(left, right).map(accept).ok_or(ExprError::Types {
            op: symbol,
            left: ValueType::of(left),
            right: ValueType::of(right),
        })
    };
    match op {
        CmpOp::Eq => Ok(equals(left, right)),
        CmpOp::Ne => Ok(!equals(left, right)),
        CmpOp::Lt => ordered("<", Ordering::is_lt),
        CmpOp::Le => ordered("<=", Ordering::is_le),
        CmpOp::Gt => ordered(">", Ordering::is_gt),
        CmpOp::Ge => ordered(">=", Ordering::is_ge),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
        CmpOp::Is => Ok(ValueType::of(left) == ValueType::of(right) && left == right),
        CmpOp::IsNot => Ok(!(ValueType::of(left) == ValueType::of(right) && left == right)),
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool, ExprError> {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => Ok(h.contains(n.as_str())),
        (Value::Array(items), _) => Ok(items.iter().any(|item| equals(item, needle))),
        (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
        _ => Err(ExprError::Types {
            op: "in",
            left: ValueType::of(needle),
            right: ValueType::of(haystack),
        }),
    }
}
