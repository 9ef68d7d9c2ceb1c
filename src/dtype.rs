//! Defines an enum of the 4 supported column types and routines for conversion to and from string.
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// These are the column types a table schema can declare.
/// `Int` and `Float` are fixed 4-byte types, `Char` is a single character, and
/// `VarChar` is a length-prefixed string with a declared maximum size.
pub enum DataType {
    Int,
    Float,
    Char,
    VarChar,
}

impl DataType {
    /// On-disk size in bytes of one field of this type, for a column declared
    /// with `size`.  A varchar pays two extra bytes for its length prefix.
    pub fn storage_size(&self, size: u16) -> u32 {
        match self {
            DataType::Int | DataType::Float => 4,
            DataType::Char => size as u32,
            DataType::VarChar => 2 + size as u32,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::Char => write!(f, "char"),
            DataType::VarChar => write!(f, "varchar"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseDataTypeError;

impl FromStr for DataType {
    type Err = ParseDataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "int" => Ok(DataType::Int),
            "float" => Ok(DataType::Float),
            "char" => Ok(DataType::Char),
            "varchar" => Ok(DataType::VarChar),
            _ => Err(ParseDataTypeError),
        }
    }
}

#[test]
fn test_from_str() {
    assert_eq!("int".parse(), Ok(DataType::Int));
    assert_eq!("VARCHAR".parse(), Ok(DataType::VarChar));
    assert_eq!("Float".parse(), Ok(DataType::Float));
    assert_eq!("text".parse::<DataType>(), Err(ParseDataTypeError));
}

#[test]
fn test_storage_size() {
    assert_eq!(DataType::Int.storage_size(4), 4);
    assert_eq!(DataType::Float.storage_size(4), 4);
    assert_eq!(DataType::Char.storage_size(1), 1);
    assert_eq!(DataType::VarChar.storage_size(50), 52);
}
