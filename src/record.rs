//! Serializes typed records into their framed on-disk byte form and back.
//!
//! A serialized record is `"RC"`, the concatenated field encodings from
//! [`crate::codec`], then the `0xCC` sentinel.  No field encoding can place a
//! `0xCC` at a field boundary (ints and floats are fixed width, char fields
//! are sized, varchars are length-prefixed), so a scanner may treat `0xCC` as
//! end-of-record.

use crate::codec;
use crate::dtype::DataType;
use crate::schema::Schema;
use crate::value::Value;
use std::io::Cursor;

/// The two-byte marker that opens every serialized record.
pub const RECORD_MARKER: &[u8; 2] = b"RC";
/// The byte that terminates every serialized record and the table header.
pub const RECORD_SENTINEL: u8 = 0xCC;

/// An ordered tuple of typed field values matching some schema.
pub type Record = Vec<Value>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("record has {got} fields but the schema has {want}")]
    ArityMismatch { got: usize, want: usize },
    #[error("column {column} holds {got} but is declared {want}")]
    WrongType {
        column: String,
        got: DataType,
        want: DataType,
    },
    #[error("record bytes do not begin with the RC marker")]
    MissingMarker,
    #[error("record bytes do not end with the 0xCC sentinel")]
    MissingSentinel,
    #[error(transparent)]
    Codec(#[from] codec::Error),
}

pub fn serialize(schema: &Schema, record: &[Value]) -> Result<Vec<u8>, Error> {
    if record.len() != schema.len() {
        return Err(Error::ArityMismatch {
            got: record.len(),
            want: schema.len(),
        });
    }
    let mut out = RECORD_MARKER.to_vec();
    for (attr, value) in schema.attributes.iter().zip(record.iter()) {
        match (attr.dtype, value) {
            (DataType::Int, Value::Int(v)) => codec::encode_int(&mut out, *v),
            (DataType::Float, Value::Float(v)) => codec::encode_float(&mut out, *v),
            (DataType::Char, Value::Char(v)) => codec::encode_char(&mut out, *v, attr.size)?,
            (DataType::VarChar, Value::VarChar(v)) => {
                codec::encode_varchar(&mut out, v, attr.size)?
            }
            (want, got) => {
                return Err(Error::WrongType {
                    column: attr.name.clone(),
                    got: got.dtype(),
                    want,
                })
            }
        }
    }
    out.push(RECORD_SENTINEL);
    Ok(out)
}

pub fn deserialize(schema: &Schema, bytes: &[u8]) -> Result<Record, Error> {
    if bytes.len() < 3 || &bytes[0..2] != RECORD_MARKER {
        return Err(Error::MissingMarker);
    }
    if bytes[bytes.len() - 1] != RECORD_SENTINEL {
        return Err(Error::MissingSentinel);
    }
    let mut c = Cursor::new(&bytes[2..bytes.len() - 1]);
    let mut record = Vec::with_capacity(schema.len());
    for attr in &schema.attributes {
        let value = match attr.dtype {
            DataType::Int => Value::Int(codec::decode_int(&mut c)?),
            DataType::Float => Value::Float(codec::decode_float(&mut c)?),
            DataType::Char => Value::Char(codec::decode_char(&mut c, attr.size)?),
            DataType::VarChar => Value::VarChar(codec::decode_varchar(&mut c)?),
        };
        record.push(value);
    }
    Ok(record)
}

#[cfg(test)]
fn test_schema() -> Schema {
    use crate::schema::Attribute;
    Schema::new(vec![
        Attribute::new("id", DataType::Int, 4),
        Attribute::new("name", DataType::VarChar, 50),
    ])
}

#[test]
fn test_serialized_layout() {
    use hex::FromHex;
    let bytes = serialize(
        &test_schema(),
        &[Value::Int(1), Value::VarChar("Hi".to_string())],
    )
    .expect("Should have serialized record.");
    // "RC" | 1_i32 le | len 2 le, "Hi" | sentinel
    let expected =
        Vec::from_hex("52430100000002004869cc").expect("Should have parsed hex.");
    assert_eq!(bytes, expected);
}

#[test]
fn test_roundtrip() {
    use crate::schema::Attribute;
    let schema = Schema::new(vec![
        Attribute::new("id", DataType::Int, 4),
        Attribute::new("ratio", DataType::Float, 4),
        Attribute::new("grade", DataType::Char, 1),
        Attribute::new("name", DataType::VarChar, 50),
    ]);
    let record = vec![
        Value::Int(-12),
        Value::Float(0.25),
        Value::Char('b'),
        Value::VarChar("Alice".to_string()),
    ];
    let bytes = serialize(&schema, &record).expect("Should have serialized record.");
    assert_eq!(*bytes.last().unwrap(), RECORD_SENTINEL);
    let back = deserialize(&schema, &bytes).expect("Should have deserialized record.");
    assert_eq!(back, record);
}

#[test]
fn test_arity_mismatch() {
    let err = serialize(&test_schema(), &[Value::Int(1)]);
    assert!(matches!(err, Err(Error::ArityMismatch { got: 1, want: 2 })));
}

#[test]
fn test_wrong_type() {
    let err = serialize(
        &test_schema(),
        &[
            Value::VarChar("1".to_string()),
            Value::VarChar("x".to_string()),
        ],
    );
    assert!(matches!(err, Err(Error::WrongType { .. })));
}

#[test]
fn test_bad_framing() {
    let schema = test_schema();
    let good = serialize(&schema, &[Value::Int(1), Value::VarChar("x".to_string())]).unwrap();

    let mut no_marker = good.clone();
    no_marker[0] = b'X';
    assert!(matches!(
        deserialize(&schema, &no_marker),
        Err(Error::MissingMarker)
    ));

    let mut no_sentinel = good;
    *no_sentinel.last_mut().unwrap() = 0;
    assert!(matches!(
        deserialize(&schema, &no_sentinel),
        Err(Error::MissingSentinel)
    ));
}
