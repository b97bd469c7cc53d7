//! Infix expressions: a small tokenizer, a Shunting-Yard conversion to reverse polish
//! notation and a stack evaluator.

use std::cmp::Ordering;

use crate::{
    Context, Value,
    error::{EvalError, EvalResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub lexeme: &'static str,
    pub kind: OperatorKind,
    pub precedence: u8,
    pub associativity: Associativity,
}

const fn op(
    lexeme: &'static str,
    kind: OperatorKind,
    precedence: u8,
    associativity: Associativity,
) -> Operator {
    Operator {
        lexeme,
        kind,
        precedence,
        associativity,
    }
}

/// Every operator understood by expressions, lowest precedence first.
pub const OPERATORS: &[Operator] = &[
    op("or", OperatorKind::Or, 1, Associativity::Left),
    op("||", OperatorKind::Or, 1, Associativity::Left),
    op("and", OperatorKind::And, 2, Associativity::Left),
    op("&&", OperatorKind::And, 2, Associativity::Left),
    op("==", OperatorKind::Eq, 3, Associativity::Left),
    op("!=", OperatorKind::Ne, 3, Associativity::Left),
    op("<", OperatorKind::Lt, 4, Associativity::Left),
    op(">", OperatorKind::Gt, 4, Associativity::Left),
    op("<=", OperatorKind::Le, 4, Associativity::Left),
    op(">=", OperatorKind::Ge, 4, Associativity::Left),
    op("+", OperatorKind::Add, 5, Associativity::Left),
    op("-", OperatorKind::Sub, 5, Associativity::Left),
    op("*", OperatorKind::Mul, 6, Associativity::Left),
    op("/", OperatorKind::Div, 6, Associativity::Left),
    op("%", OperatorKind::Rem, 6, Associativity::Left),
    op("not", OperatorKind::Not, 7, Associativity::Right),
];

/// Look up an operator by its lexeme.
pub fn operator(lexeme: &str) -> Option<&'static Operator> {
    OPERATORS.iter().find(|op| op.lexeme == lexeme)
}

const TWO_CHAR_OPERATORS: [&str; 6] = ["==", "!=", "<=", ">=", "&&", "||"];
const ONE_CHAR_OPERATORS: [char; 7] = ['<', '>', '+', '-', '*', '/', '%'];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(String),
    String(String),
    Identifier(String),
    Operator(&'static Operator),
    LeftParen,
    RightParen,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    const fn new(input: &'a str) -> Self {
        Lexer { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or_default()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Consume characters while `pred` holds and return them as a slice of the input.
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        self.input.get(start..self.pos).unwrap_or_default()
    }

    fn number(&mut self) -> Token {
        let start = self.pos;
        self.take_while(|c| c.is_ascii_digit());

        let mut lookahead = self.rest().chars();
        if lookahead.next() == Some('.') && lookahead.next().is_some_and(|c| c.is_ascii_digit())
        {
            self.bump();
            self.take_while(|c| c.is_ascii_digit());
        }

        Token::Number(self.input.get(start..self.pos).unwrap_or_default().to_owned())
    }

    /// A double-quoted string; a backslash passes the following character through.
    fn string(&mut self) -> Token {
        self.bump();
        let mut value = String::new();
        while let Some(c) = self.bump() {
            match c {
                '"' => break,
                '\\' => {
                    if let Some(escaped) = self.bump() {
                        value.push(escaped);
                    }
                }
                _ => value.push(c),
            }
        }
        Token::String(value)
    }

    fn next_token(&mut self) -> Option<Token> {
        loop {
            self.take_while(char::is_whitespace);
            let c = self.peek()?;

            match c {
                '(' => {
                    self.bump();
                    return Some(Token::LeftParen);
                }
                ')' => {
                    self.bump();
                    return Some(Token::RightParen);
                }
                '"' => return Some(self.string()),
                c if c.is_ascii_digit() => return Some(self.number()),
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let word =
                        self.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
                    return Some(match word {
                        "and" | "or" | "not" => Token::Operator(operator(word)?),
                        _ => Token::Identifier(word.to_owned()),
                    });
                }
                _ => {}
            }

            let rest = self.rest();
            if let Some(lexeme) = TWO_CHAR_OPERATORS.iter().find(|l| rest.starts_with(**l)) {
                self.pos += lexeme.len();
                return Some(Token::Operator(operator(lexeme)?));
            }

            self.bump();
            if ONE_CHAR_OPERATORS.contains(&c) {
                let mut buf = [0; 4];
                return Some(Token::Operator(operator(c.encode_utf8(&mut buf))?));
            }
            // Anything else is not part of the expression language and is skipped.
        }
    }
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(input);
    std::iter::from_fn(|| lexer.next_token()).collect()
}

/// Reorder infix tokens into reverse polish notation. Unbalanced parentheses are tolerated
/// and dropped.
fn to_rpn(tokens: Vec<Token>) -> Vec<Token> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut stack: Vec<Token> = Vec::new();

    for token in tokens {
        match token {
            Token::Number(_) | Token::String(_) | Token::Identifier(_) => output.push(token),
            Token::Operator(current) => {
                while let Some(Token::Operator(top)) = stack.last() {
                    let pops = match current.associativity {
                        Associativity::Left => current.precedence <= top.precedence,
                        Associativity::Right => current.precedence < top.precedence,
                    };
                    if !pops {
                        break;
                    }
                    output.extend(stack.pop());
                }
                stack.push(token);
            }
            Token::LeftParen => stack.push(token),
            Token::RightParen => {
                while let Some(top) = stack.pop() {
                    if top == Token::LeftParen {
                        break;
                    }
                    output.push(top);
                }
            }
        }
    }

    while let Some(top) = stack.pop() {
        if top != Token::LeftParen {
            output.push(top);
        }
    }

    output
}

/// A parsed expression, stored in reverse polish notation so it can be evaluated many times.
///
/// # Example
/// ```
/// use templet::{Context, Expression, Value};
///
/// let mut context = Context::new();
/// context.insert("a", 2).insert("b", 3).insert("c", 4);
///
/// let expression = Expression::parse("a + b * c");
/// assert_eq!(expression.evaluate_in(&context).unwrap(), Value::Int(14));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    rpn: Vec<Token>,
}

impl Expression {
    pub fn parse(source: &str) -> Self {
        Self {
            rpn: to_rpn(tokenize(source)),
        }
    }

    /// Evaluate the expression, resolving identifiers through `resolve`.
    ///
    /// # Errors
    /// - [`EvalError::NotEnoughOperands`] when an operator is missing an operand.
    /// - [`EvalError::MalformedExpression`] when evaluation does not end with exactly one
    ///   value.
    /// - [`EvalError::DivisionByZero`] / [`EvalError::ModuloByZero`].
    /// - Any error produced by `resolve`.
    pub fn evaluate<F>(&self, mut resolve: F) -> EvalResult<Value>
    where
        F: FnMut(&str) -> EvalResult<Value>,
    {
        let mut stack: Vec<Value> = Vec::new();

        for token in &self.rpn {
            match token {
                Token::Number(text) => stack.push(parse_number(text)),
                Token::String(value) => stack.push(Value::String(value.clone())),
                Token::Identifier(path) => stack.push(resolve(path)?),
                Token::Operator(op) if op.kind == OperatorKind::Not => {
                    let operand = stack
                        .pop()
                        .ok_or_else(|| EvalError::NotEnoughOperands(op.lexeme.to_owned()))?;
                    stack.push(Value::Bool(!operand.is_truthy()));
                }
                Token::Operator(op) => {
                    let (Some(right), Some(left)) = (stack.pop(), stack.pop()) else {
                        return Err(EvalError::NotEnoughOperands(op.lexeme.to_owned()));
                    };
                    stack.push(apply(op.kind, &left, &right)?);
                }
                Token::LeftParen | Token::RightParen => {}
            }
        }

        match (stack.pop(), stack.is_empty()) {
            (Some(value), true) => Ok(value),
            _ => Err(EvalError::MalformedExpression),
        }
    }

    /// Evaluate against a context using dotted-path resolution.
    ///
    /// # Errors
    /// See [`Expression::evaluate`].
    pub fn evaluate_in(&self, context: &Context) -> EvalResult<Value> {
        self.evaluate(|path| context.resolve(path))
    }
}

fn parse_number(text: &str) -> Value {
    if !text.contains('.') {
        if let Ok(int) = text.parse::<i64>() {
            return Value::Int(int);
        }
    }
    text.parse::<f64>().map_or(Value::Null, Value::Float)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(Self::Int(*i)),
            Value::Float(f) => Some(Self::Float(*f)),
            Value::String(s) => s
                .parse::<i64>()
                .map(Self::Int)
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(Self::Float)),
            Value::Null
            | Value::Bool(_)
            | Value::Seq(_)
            | Value::Map(_)
            | Value::Raw(_)
            | Value::Undefined => None,
        }
    }

    fn or_zero(value: &Value) -> Self {
        Self::of(value).unwrap_or(Self::Int(0))
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn truncate(self) -> i64 {
        match self {
            Self::Int(i) => i,
            Self::Float(f) => f as i64,
        }
    }

    /// Integer arithmetic when both sides are integers and the result fits, float otherwise.
    fn combine(
        self,
        other: Self,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Value {
        if let (Self::Int(a), Self::Int(b)) = (self, other) {
            if let Some(result) = int_op(a, b) {
                return Value::Int(result);
            }
        }
        Value::Float(float_op(self.as_f64(), other.as_f64()))
    }
}

/// Compare numerically when both sides are numbers, otherwise compare their text.
fn compare(left: &Value, right: &Value) -> Ordering {
    match (Number::of(left), Number::of(right)) {
        (Some(Number::Int(a)), Some(Number::Int(b))) => a.cmp(&b),
        (Some(a), Some(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => left.to_string().cmp(&right.to_string()),
    }
}

fn apply(kind: OperatorKind, left: &Value, right: &Value) -> EvalResult<Value> {
    let value = match kind {
        OperatorKind::Or => Value::Bool(left.is_truthy() || right.is_truthy()),
        OperatorKind::And => Value::Bool(left.is_truthy() && right.is_truthy()),
        OperatorKind::Eq => Value::Bool(compare(left, right).is_eq()),
        OperatorKind::Ne => Value::Bool(compare(left, right).is_ne()),
        OperatorKind::Lt => Value::Bool(compare(left, right).is_lt()),
        OperatorKind::Gt => Value::Bool(compare(left, right).is_gt()),
        OperatorKind::Le => Value::Bool(compare(left, right).is_le()),
        OperatorKind::Ge => Value::Bool(compare(left, right).is_ge()),
        OperatorKind::Add => match (Number::of(left), Number::of(right)) {
            (Some(a), Some(b)) => a.combine(b, i64::checked_add, |a, b| a + b),
            _ => Value::String(format!("{left}{right}")),
        },
        OperatorKind::Sub => {
            Number::or_zero(left).combine(Number::or_zero(right), i64::checked_sub, |a, b| a - b)
        }
        OperatorKind::Mul => {
            Number::or_zero(left).combine(Number::or_zero(right), i64::checked_mul, |a, b| a * b)
        }
        OperatorKind::Div => {
            let divisor = Number::of(right)
                .map(Number::as_f64)
                .filter(|d| *d != 0.0)
                .ok_or(EvalError::DivisionByZero)?;
            Value::Float(Number::or_zero(left).as_f64() / divisor)
        }
        OperatorKind::Rem => {
            let divisor = Number::of(right)
                .map(Number::truncate)
                .filter(|d| *d != 0)
                .ok_or(EvalError::ModuloByZero)?;
            let dividend = Number::or_zero(left).truncate();
            Value::Int(dividend.checked_rem(divisor).unwrap_or(0))
        }
        OperatorKind::Not => Value::Bool(!right.is_truthy()),
    };

    Ok(value)
}
