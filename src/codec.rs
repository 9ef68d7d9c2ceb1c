//! Encodes and decodes the scalar column types into their on-disk byte forms.
//!
//! All fixed-width integers are little-endian.  Floats are stored as the raw
//! IEEE-754 bits of an `f32`.  Char fields are utf-8 right-padded with zero
//! bytes to the declared size; varchar fields carry a `u16` length prefix.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("field bytes are truncated: {0}")]
    Io(#[from] std::io::Error),
    #[error("string of {len} bytes exceeds the declared varchar size {max}")]
    VarCharTooLong { len: usize, max: u16 },
    #[error("char {0:?} does not fit in a {1}-byte char field")]
    CharTooWide(char, u16),
    #[error("field bytes were not valid utf-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("char field holds {0} characters, expected exactly 1")]
    NotASingleChar(usize),
}

pub fn encode_int(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn decode_int(c: &mut Cursor<&[u8]>) -> Result<i32, Error> {
    Ok(c.read_i32::<LittleEndian>()?)
}

pub fn encode_float(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_bits().to_le_bytes());
}

pub fn decode_float(c: &mut Cursor<&[u8]>) -> Result<f32, Error> {
    Ok(f32::from_bits(c.read_u32::<LittleEndian>()?))
}

pub fn encode_char(out: &mut Vec<u8>, v: char, size: u16) -> Result<(), Error> {
    let mut buf = [0_u8; 4];
    let encoded = v.encode_utf8(&mut buf);
    if encoded.len() > size as usize {
        return Err(Error::CharTooWide(v, size));
    }
    out.extend_from_slice(encoded.as_bytes());
    out.resize(out.len() + size as usize - encoded.len(), 0);
    Ok(())
}

pub fn decode_char(c: &mut Cursor<&[u8]>, size: u16) -> Result<char, Error> {
    let mut buf = vec![0_u8; size as usize];
    c.read_exact(&mut buf)?;
    while buf.last() == Some(&0) {
        buf.pop();
    }
    let s = String::from_utf8(buf)?;
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(ch),
        _ => Err(Error::NotASingleChar(s.chars().count())),
    }
}

pub fn encode_varchar(out: &mut Vec<u8>, v: &str, max_size: u16) -> Result<(), Error> {
    let bytes = v.as_bytes();
    if bytes.len() > max_size as usize {
        return Err(Error::VarCharTooLong {
            len: bytes.len(),
            max: max_size,
        });
    }
    out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

pub fn decode_varchar(c: &mut Cursor<&[u8]>) -> Result<String, Error> {
    let len = c.read_u16::<LittleEndian>()? as usize;
    let mut buf = vec![0_u8; len];
    c.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

#[test]
fn test_int_roundtrip() {
    for v in [0, 1, -1, i32::MIN, i32::MAX] {
        let mut buf = vec![];
        encode_int(&mut buf, v);
        assert_eq!(buf.len(), 4);
        assert_eq!(decode_int(&mut Cursor::new(&buf[..])).unwrap(), v);
    }
}

#[test]
fn test_int_is_little_endian() {
    let mut buf = vec![];
    encode_int(&mut buf, 0x01020304);
    assert_eq!(buf, vec![0x04, 0x03, 0x02, 0x01]);
}

#[test]
fn test_float_roundtrip_is_bit_preserving() {
    for v in [0.0_f32, -0.0, 1.5, f32::MIN, f32::MAX, f32::INFINITY] {
        let mut buf = vec![];
        encode_float(&mut buf, v);
        let back = decode_float(&mut Cursor::new(&buf[..])).unwrap();
        assert_eq!(back.to_bits(), v.to_bits());
    }
}

#[test]
fn test_char_padding() {
    let mut buf = vec![];
    encode_char(&mut buf, 'x', 1).unwrap();
    assert_eq!(buf, vec![b'x']);
    let mut wide = vec![];
    assert!(encode_char(&mut wide, 'é', 1).is_err());
    assert_eq!(decode_char(&mut Cursor::new(&buf[..]), 1).unwrap(), 'x');
}

#[test]
fn test_varchar_roundtrip() {
    let mut buf = vec![];
    encode_varchar(&mut buf, "Alice", 50).unwrap();
    assert_eq!(&buf[..2], &[5, 0]);
    assert_eq!(
        decode_varchar(&mut Cursor::new(&buf[..])).unwrap(),
        "Alice".to_string()
    );
}

#[test]
fn test_varchar_too_long() {
    let mut buf = vec![];
    let err = encode_varchar(&mut buf, "abcdef", 5);
    assert!(matches!(err, Err(Error::VarCharTooLong { len: 6, max: 5 })));
}

#[test]
fn test_decode_truncated() {
    assert!(decode_int(&mut Cursor::new(&[1, 2][..])).is_err());
    // Length prefix promises 10 bytes, only 2 present.
    assert!(decode_varchar(&mut Cursor::new(&[10, 0, b'a', b'b'][..])).is_err());
}
