//! Table schemas: ordered attribute lists and their on-disk serialization.
//!
//! A serialized schema is the concatenation of
//! `(name_len u16, name, dtype_len u16, dtype, size u16)` per attribute,
//! all integers little-endian.

use crate::dtype::DataType;
use crate::value::Value;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::str::FromStr;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("serialized schema is truncated")]
    Truncated,
    #[error("schema names an unsupported data type {0:?}")]
    UnsupportedType(String),
    #[error("attribute bytes were not valid utf-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone, PartialEq)]
/// A single column in a table schema.
pub struct Attribute {
    pub name: String,
    pub dtype: DataType,
    pub size: u16,
}

impl Attribute {
    /// The declared `size` only matters for varchar columns; int and float are
    /// forced to 4 bytes and char to 1.
    pub fn new(name: impl Into<String>, dtype: DataType, size: u16) -> Attribute {
        let size = match dtype {
            DataType::Int | DataType::Float => 4,
            DataType::Char => 1,
            DataType::VarChar => size,
        };
        Attribute {
            name: name.into(),
            dtype,
            size,
        }
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}({})", self.name, self.dtype, self.size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new(attributes: Vec<Attribute>) -> Schema {
        Schema { attributes }
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Position of the named attribute, if it exists.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.name.clone()).collect()
    }

    /// Largest possible serialized field payload for one record of this
    /// schema: 4 per int or float, `size` per char, `2 + size` per varchar.
    pub fn max_record_size(&self) -> u32 {
        self.attributes
            .iter()
            .map(|a| a.dtype.storage_size(a.size))
            .sum()
    }

    /// Attribute-name-to-value map used as the evaluation context for
    /// conditions and update expressions over one record.
    pub fn context_for(&self, record: &[Value]) -> HashMap<String, Value> {
        self.attributes
            .iter()
            .zip(record.iter())
            .map(|(a, v)| (a.name.clone(), v.clone()))
            .collect()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![];
        for attr in &self.attributes {
            let name = attr.name.as_bytes();
            let dtype = attr.dtype.to_string();
            // Writing to a Vec cannot fail.
            let _ = out.write_u16::<LittleEndian>(name.len() as u16);
            out.extend_from_slice(name);
            let _ = out.write_u16::<LittleEndian>(dtype.len() as u16);
            out.extend_from_slice(dtype.as_bytes());
            let _ = out.write_u16::<LittleEndian>(attr.size);
        }
        out
    }

    pub fn deserialize(data: &[u8]) -> Result<Schema, Error> {
        let mut c = Cursor::new(data);
        let mut attributes = vec![];
        while (c.position() as usize) < data.len() {
            let name = read_string(&mut c)?;
            let dtype_name = read_string(&mut c)?;
            let dtype = DataType::from_str(&dtype_name)
                .map_err(|_| Error::UnsupportedType(dtype_name))?;
            let size = c.read_u16::<LittleEndian>().map_err(|_| Error::Truncated)?;
            attributes.push(Attribute::new(name, dtype, size));
        }
        Ok(Schema::new(attributes))
    }
}

fn read_string(c: &mut Cursor<&[u8]>) -> Result<String, Error> {
    let len = c.read_u16::<LittleEndian>().map_err(|_| Error::Truncated)? as usize;
    let mut buf = vec![0_u8; len];
    c.read_exact(&mut buf).map_err(|_| Error::Truncated)?;
    Ok(String::from_utf8(buf)?)
}

#[cfg(test)]
fn sample_schema() -> Schema {
    Schema::new(vec![
        Attribute::new("id", DataType::Int, 0),
        Attribute::new("grade", DataType::Char, 9),
        Attribute::new("name", DataType::VarChar, 50),
    ])
}

#[test]
fn test_attribute_size_normalization() {
    assert_eq!(Attribute::new("a", DataType::Int, 99).size, 4);
    assert_eq!(Attribute::new("a", DataType::Float, 99).size, 4);
    assert_eq!(Attribute::new("a", DataType::Char, 9).size, 1);
    assert_eq!(Attribute::new("a", DataType::VarChar, 99).size, 99);
}

#[test]
fn test_serialize_roundtrip() {
    let schema = sample_schema();
    let bytes = schema.serialize();
    let back = Schema::deserialize(&bytes).expect("Should have deserialized schema.");
    assert_eq!(back, schema);
}

#[test]
fn test_serialized_layout() {
    // (2, "id", 3, "int", 4) for the first attribute, all little-endian.
    let schema = Schema::new(vec![Attribute::new("id", DataType::Int, 4)]);
    assert_eq!(
        schema.serialize(),
        vec![2, 0, b'i', b'd', 3, 0, b'i', b'n', b't', 4, 0]
    );
}

#[test]
fn test_deserialize_truncated() {
    let mut bytes = sample_schema().serialize();
    bytes.truncate(bytes.len() - 1);
    assert!(Schema::deserialize(&bytes).is_err());
}

#[test]
fn test_max_record_size() {
    // 4 + 1 + (2 + 50)
    assert_eq!(sample_schema().max_record_size(), 57);
}
