//! Binary comparisons between two expressions, used as row predicates.

use crate::expr::{self, ExprValue};
use crate::value::Value;
use std::collections::HashMap;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("{0:?} is not a comparison operator")]
    InvalidOperator(String),
    #[error("cannot compare a {left} with a {right}")]
    TypeMismatch {
        left: &'static str,
        right: &'static str,
    },
    #[error("error evaluating expression: {0}")]
    Expr(#[from] expr::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Gt,
    Eq,
    Le,
    Ge,
    Ne,
}

impl FromStr for CompareOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(CompareOp::Lt),
            ">" => Ok(CompareOp::Gt),
            "=" => Ok(CompareOp::Eq),
            "<=" => Ok(CompareOp::Le),
            ">=" => Ok(CompareOp::Ge),
            "!=" => Ok(CompareOp::Ne),
            other => Err(Error::InvalidOperator(other.to_string())),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Eq => "=",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
            CompareOp::Ne => "!=",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A predicate of the form `expression op expression`.  Both operands are
/// expression text evaluated through [`expr::evaluate`] with the same context.
pub struct Condition {
    pub left: String,
    pub op: CompareOp,
    pub right: String,
}

impl Condition {
    pub fn new(
        left: impl Into<String>,
        op: &str,
        right: impl Into<String>,
    ) -> Result<Condition, Error> {
        Ok(Condition {
            left: left.into(),
            op: op.parse()?,
            right: right.into(),
        })
    }

    pub fn evaluate(&self, context: &HashMap<String, Value>) -> Result<bool, Error> {
        let left = expr::evaluate(&self.left, context)?;
        let right = expr::evaluate(&self.right, context)?;
        match (left, right) {
            (ExprValue::Num(l), ExprValue::Num(r)) => Ok(compare(self.op, &l, &r)),
            (ExprValue::Str(l), ExprValue::Str(r)) => Ok(compare(self.op, &l, &r)),
            (ExprValue::Num(_), ExprValue::Str(_)) => Err(Error::TypeMismatch {
                left: "number",
                right: "string",
            }),
            (ExprValue::Str(_), ExprValue::Num(_)) => Err(Error::TypeMismatch {
                left: "string",
                right: "number",
            }),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.left, self.op, self.right)
    }
}

fn compare<T: PartialOrd>(op: CompareOp, left: &T, right: &T) -> bool {
    match op {
        CompareOp::Lt => left < right,
        CompareOp::Gt => left > right,
        CompareOp::Eq => left == right,
        CompareOp::Le => left <= right,
        CompareOp::Ge => left >= right,
        CompareOp::Ne => left != right,
    }
}

#[cfg(test)]
fn age_context() -> HashMap<String, Value> {
    let mut ctx = HashMap::new();
    ctx.insert("age".to_string(), Value::Int(21));
    ctx.insert("name".to_string(), Value::VarChar("Ann".to_string()));
    ctx
}

#[test]
fn test_invalid_operator() {
    assert!(matches!(
        Condition::new("a", "<>", "b"),
        Err(Error::InvalidOperator(_))
    ));
}

#[test]
fn test_numeric_comparisons() {
    let ctx = age_context();
    let cases = [
        ("age", ">=", "20", true),
        ("age", "<", "21", false),
        ("age", "=", "21", true),
        ("age", "!=", "21", false),
        ("age", "<=", "3 * 7", true),
        ("age + 1", ">", "21", true),
    ];
    for (left, op, right, expected) in cases {
        let cond = Condition::new(left, op, right).unwrap();
        assert_eq!(
            cond.evaluate(&ctx).unwrap(),
            expected,
            "condition: {}",
            cond
        );
    }
}

#[test]
fn test_string_comparisons() {
    let ctx = age_context();
    let eq = Condition::new("name", "=", "'Ann'").unwrap();
    assert!(eq.evaluate(&ctx).unwrap());
    let ne = Condition::new("name", "!=", "'Bob'").unwrap();
    assert!(ne.evaluate(&ctx).unwrap());
    let lt = Condition::new("name", "<", "'Bob'").unwrap();
    assert!(lt.evaluate(&ctx).unwrap());
}

#[test]
fn test_type_mismatch() {
    let ctx = age_context();
    let cond = Condition::new("age", "=", "'Ann'").unwrap();
    assert!(matches!(
        cond.evaluate(&ctx),
        Err(Error::TypeMismatch { .. })
    ));
}
