//! Tokenizes and evaluates the arithmetic and string expressions used in
//! predicates and update assignments.
//!
//! The grammar is infix arithmetic over `+ - * / % ^` with parentheses,
//! numeric literals, single-quoted string literals, and identifiers
//! (optionally dotted, as in `emp.dept_id`).  Identifiers are resolved
//! against a context map of attribute values; an identifier with no entry
//! stays in the postfix stream unresolved and evaluates to its own name.
//!
//! Parsing is a shunting-yard pass to postfix.  Operators of equal precedence
//! always pop, so every operator is left-associative, `^` included:
//! `2 ^ 3 ^ 2` is `(2 ^ 3) ^ 2 = 64`.

use crate::value::Value;
use enum_as_inner::EnumAsInner;
use std::collections::HashMap;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("unexpected character {0:?} in expression")]
    UnexpectedChar(char),
    #[error("string literal is missing its closing quote")]
    UnterminatedString,
    #[error("mismatched parentheses")]
    MismatchedParens,
    #[error("operator {0} is missing an operand")]
    MissingOperand(char),
    #[error("operator {0} needs numeric operands")]
    NonNumericOperand(char),
    #[error("division by zero")]
    DivisionByZero,
    #[error("expression does not reduce to a single value")]
    NotSingleValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl BinOp {
    fn precedence(self) -> u8 {
        match self {
            BinOp::Add | BinOp::Sub => 1,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 2,
            BinOp::Pow => 3,
        }
    }

    fn symbol(self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
            BinOp::Rem => '%',
            BinOp::Pow => '^',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    Op(BinOp),
    LParen,
    RParen,
}

/// What an expression evaluates to: a number or a raw string.
#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum ExprValue {
    Num(f64),
    Str(String),
}

impl std::fmt::Display for ExprValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExprValue::Num(n) => write!(f, "{}", n),
            ExprValue::Str(s) => write!(f, "{}", s),
        }
    }
}

pub fn tokenize(expression: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = vec![];
    let mut chars = expression.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '0'..='9' => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if chars.peek() == Some(&'.') {
                    text.push('.');
                    chars.next();
                    while let Some(&d) = chars.peek() {
                        if d.is_ascii_digit() {
                            text.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
                // Digits and at most one dot always parse.
                tokens.push(Token::Num(text.parse().map_err(|_| Error::UnexpectedChar(c))?));
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(d) => text.push(d),
                        None => return Err(Error::UnterminatedString),
                    }
                }
                tokens.push(Token::Str(text));
            }
            'a'..='z' | 'A'..='Z' | '_' | '.' => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' || d == '.' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(text));
            }
            '+' => {
                chars.next();
                tokens.push(Token::Op(BinOp::Add));
            }
            '-' => {
                chars.next();
                tokens.push(Token::Op(BinOp::Sub));
            }
            '*' => {
                chars.next();
                tokens.push(Token::Op(BinOp::Mul));
            }
            '/' => {
                chars.next();
                tokens.push(Token::Op(BinOp::Div));
            }
            '%' => {
                chars.next();
                tokens.push(Token::Op(BinOp::Rem));
            }
            '^' => {
                chars.next();
                tokens.push(Token::Op(BinOp::Pow));
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            other => return Err(Error::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

/// Shunting-yard pass from infix tokens to a postfix stream.  Identifiers
/// found in `context` are replaced by their values; the rest pass through
/// unresolved, which makes the stream usable for debugging output.
pub fn to_postfix(
    tokens: Vec<Token>,
    context: &HashMap<String, Value>,
) -> Result<Vec<Token>, Error> {
    let mut output = vec![];
    let mut stack: Vec<Token> = vec![];
    for token in tokens {
        match token {
            Token::Num(_) | Token::Str(_) => output.push(token),
            Token::Ident(name) => match context.get(&name) {
                Some(Value::Int(v)) => output.push(Token::Num(*v as f64)),
                Some(Value::Float(v)) => output.push(Token::Num(*v as f64)),
                Some(Value::Char(v)) => output.push(Token::Str(v.to_string())),
                Some(Value::VarChar(v)) => output.push(Token::Str(v.clone())),
                None => output.push(Token::Ident(name)),
            },
            Token::Op(op) => {
                while let Some(Token::Op(top)) = stack.last() {
                    if top.precedence() >= op.precedence() {
                        output.push(stack.pop().expect("stack top was just inspected"));
                    } else {
                        break;
                    }
                }
                stack.push(Token::Op(op));
            }
            Token::LParen => stack.push(Token::LParen),
            Token::RParen => {
                loop {
                    match stack.pop() {
                        Some(Token::LParen) => break,
                        Some(t) => output.push(t),
                        None => return Err(Error::MismatchedParens),
                    }
                }
            }
        }
    }
    while let Some(t) = stack.pop() {
        if t == Token::LParen {
            return Err(Error::MismatchedParens);
        }
        output.push(t);
    }
    Ok(output)
}

pub fn eval_postfix(postfix: Vec<Token>) -> Result<ExprValue, Error> {
    let mut stack: Vec<ExprValue> = vec![];
    for token in postfix {
        match token {
            Token::Num(n) => stack.push(ExprValue::Num(n)),
            Token::Str(s) => stack.push(ExprValue::Str(s)),
            // Unresolved identifiers evaluate to their own name.
            Token::Ident(name) => stack.push(ExprValue::Str(name)),
            Token::Op(op) => {
                let right = stack.pop().ok_or(Error::MissingOperand(op.symbol()))?;
                let left = stack.pop().ok_or(Error::MissingOperand(op.symbol()))?;
                stack.push(apply(op, left, right)?);
            }
            Token::LParen | Token::RParen => return Err(Error::MismatchedParens),
        }
    }
    if stack.len() == 1 {
        Ok(stack.remove(0))
    } else {
        Err(Error::NotSingleValue)
    }
}

fn apply(op: BinOp, left: ExprValue, right: ExprValue) -> Result<ExprValue, Error> {
    use ExprValue::*;
    if op == BinOp::Add && (matches!(left, Str(_)) || matches!(right, Str(_))) {
        // String concatenation when either side is a string.
        return Ok(Str(format!("{}{}", left, right)));
    }
    let (l, r) = match (left, right) {
        (Num(l), Num(r)) => (l, r),
        _ => return Err(Error::NonNumericOperand(op.symbol())),
    };
    let result = match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div | BinOp::Rem if r == 0.0 => return Err(Error::DivisionByZero),
        BinOp::Div => l / r,
        BinOp::Rem => l % r,
        BinOp::Pow => l.powf(r),
    };
    Ok(Num(result))
}

/// Evaluate an expression with attribute resolution through `context`.
pub fn evaluate(
    expression: &str,
    context: &HashMap<String, Value>,
) -> Result<ExprValue, Error> {
    eval_postfix(to_postfix(tokenize(expression)?, context)?)
}

#[cfg(test)]
fn eval(expression: &str) -> ExprValue {
    evaluate(expression, &HashMap::new()).expect("Should have evaluated expression.")
}

#[test]
fn test_precedence() {
    assert_eq!(eval("1 + 2 * 3"), ExprValue::Num(7.0));
    assert_eq!(eval("(1 + 2) * 3"), ExprValue::Num(9.0));
    assert_eq!(eval("10 - 4 - 3"), ExprValue::Num(3.0));
    assert_eq!(eval("2 ^ 3 * 2"), ExprValue::Num(16.0));
    assert_eq!(eval("7 % 4 + 1"), ExprValue::Num(4.0));
}

#[test]
fn test_pow_is_left_associative() {
    assert_eq!(eval("2 ^ 3 ^ 2"), ExprValue::Num(64.0));
}

#[test]
fn test_string_concat() {
    assert_eq!(eval("'foo' + 'bar'"), ExprValue::Str("foobar".to_string()));
    assert_eq!(eval("'n' + 1"), ExprValue::Str("n1".to_string()));
}

#[test]
fn test_context_resolution() {
    let mut ctx = HashMap::new();
    ctx.insert("age".to_string(), Value::Int(21));
    assert_eq!(
        evaluate("age ^ (5 - 3) - 100", &ctx),
        Ok(ExprValue::Num(341.0))
    );
    ctx.insert("name".to_string(), Value::VarChar("Ann".to_string()));
    assert_eq!(evaluate("name", &ctx), Ok(ExprValue::Str("Ann".to_string())));
}

#[test]
fn test_unresolved_identifier_is_its_own_name() {
    assert_eq!(eval("missing"), ExprValue::Str("missing".to_string()));
}

#[test]
fn test_errors() {
    let ctx = HashMap::new();
    assert_eq!(evaluate("1 / 0", &ctx), Err(Error::DivisionByZero));
    assert_eq!(evaluate("(1 + 2", &ctx), Err(Error::MismatchedParens));
    assert_eq!(evaluate("1 + 2)", &ctx), Err(Error::MismatchedParens));
    assert_eq!(evaluate("1 +", &ctx), Err(Error::MissingOperand('+')));
    assert_eq!(evaluate("1 2", &ctx), Err(Error::NotSingleValue));
    assert_eq!(
        evaluate("'a' * 2", &ctx),
        Err(Error::NonNumericOperand('*'))
    );
    assert_eq!(evaluate("1 ? 2", &ctx), Err(Error::UnexpectedChar('?')));
    assert_eq!(evaluate("'oops", &ctx), Err(Error::UnterminatedString));
}

#[test]
fn test_postfix_stream_keeps_unresolved_identifiers() {
    let tokens = tokenize("emp.id + 1").unwrap();
    let postfix = to_postfix(tokens, &HashMap::new()).unwrap();
    assert_eq!(
        postfix,
        vec![
            Token::Ident("emp.id".to_string()),
            Token::Num(1.0),
            Token::Op(BinOp::Add),
        ]
    );
}
