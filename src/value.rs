//! Defines an enum of all the possible values a table field can hold.

use crate::dtype::DataType;
use enum_as_inner::EnumAsInner;

#[derive(Debug, Clone, PartialEq, EnumAsInner)]
/// can hold any value that can be stored in a table field.
/// Varchar and char values are kept as raw strings; the single quotes that
/// appear around string literals in statement text never reach this type.
pub enum Value {
    Int(i32),
    Float(f32),
    Char(char),
    VarChar(String),
}

impl Value {
    pub fn dtype(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::Char(_) => DataType::Char,
            Value::VarChar(_) => DataType::VarChar,
        }
    }

    /// Parse a textual literal into a value of the given column type.
    /// A surrounding pair of single quotes is stripped for char and varchar.
    pub fn parse(dtype: DataType, text: &str) -> Result<Value, ParseValueError> {
        let text = text.trim();
        match dtype {
            DataType::Int => Ok(Value::Int(
                text.parse::<i32>()
                    .map_err(|_| ParseValueError::new(dtype, text))?,
            )),
            DataType::Float => Ok(Value::Float(
                text.parse::<f32>()
                    .map_err(|_| ParseValueError::new(dtype, text))?,
            )),
            DataType::Char => {
                let raw = strip_quotes(text);
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Char(c)),
                    _ => Err(ParseValueError::new(dtype, text)),
                }
            }
            DataType::VarChar => Ok(Value::VarChar(strip_quotes(text).to_string())),
        }
    }
}

/// Strip one surrounding pair of single quotes, if both are present.
pub fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(x) => write!(f, "{}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Char(x) => write!(f, "{}", x),
            Value::VarChar(x) => write!(f, "{}", x),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("{text:?} is not a valid {dtype} value")]
pub struct ParseValueError {
    pub dtype: DataType,
    pub text: String,
}

impl ParseValueError {
    fn new(dtype: DataType, text: &str) -> ParseValueError {
        ParseValueError {
            dtype,
            text: text.to_string(),
        }
    }
}

#[test]
fn test_parse_int() {
    assert_eq!(Value::parse(DataType::Int, "42"), Ok(Value::Int(42)));
    assert_eq!(Value::parse(DataType::Int, "-7"), Ok(Value::Int(-7)));
    // Out of i32 range.
    assert!(Value::parse(DataType::Int, "3000000000").is_err());
    // Quoted numbers are not numbers.
    assert!(Value::parse(DataType::Int, "'2'").is_err());
}

#[test]
fn test_parse_strings() {
    assert_eq!(
        Value::parse(DataType::VarChar, "'Alice'"),
        Ok(Value::VarChar("Alice".to_string()))
    );
    assert_eq!(
        Value::parse(DataType::VarChar, "Alice"),
        Ok(Value::VarChar("Alice".to_string()))
    );
    assert_eq!(Value::parse(DataType::Char, "'x'"), Ok(Value::Char('x')));
    assert!(Value::parse(DataType::Char, "'xy'").is_err());
    assert!(Value::parse(DataType::Char, "''").is_err());
}

#[test]
fn test_display_is_raw() {
    assert_eq!(Value::VarChar("Bob".to_string()).to_string(), "Bob");
    assert_eq!(Value::Int(-3).to_string(), "-3");
    assert_eq!(Value::Float(2.5).to_string(), "2.5");
}
