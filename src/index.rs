//! Hash indexes: key derivation, the bucket container, and its persistence.
//!
//! An index maps a 32-bit key to the physical positions of candidate records.
//! The key is the SHA-256 digest of the column value's key encoding, truncated
//! to the low 32 bits.  Truncation makes collisions possible, so lookups must
//! re-read each candidate and filter by exact equality.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Block number and byte offset (within the block's data area) of a record.
pub type RecordLocation = (u64, u64);

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("error accessing index file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed index file: {0}")]
    Format(#[from] bincode::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HashIndex {
    buckets: HashMap<u32, Vec<RecordLocation>>,
}

impl HashIndex {
    pub fn new() -> HashIndex {
        HashIndex::default()
    }

    pub fn add(&mut self, key: u32, location: RecordLocation) {
        self.buckets.entry(key).or_default().push(location);
    }

    /// Candidate locations for a key, in insertion order.
    pub fn find(&self, key: u32) -> &[RecordLocation] {
        self.buckets.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<HashIndex, Error> {
        let file = File::open(path)?;
        Ok(bincode::deserialize_from(BufReader::new(file))?)
    }
}

/// File name an index for `column` of `table` is persisted under.
pub fn index_file_name(table_name: &str, column: &str) -> String {
    format!("{}-{}-hash.idx", table_name, column)
}

/// Derive the 32-bit index key for a column value: the low four bytes of the
/// SHA-256 digest of its key encoding, read big-endian.
pub fn hash_key(value: &Value) -> u32 {
    let digest = Sha256::digest(key_bytes(value));
    let mut low = [0_u8; 4];
    low.copy_from_slice(&digest[28..]);
    u32::from_be_bytes(low)
}

/// The digest input per type: ints as 4-byte big-endian two's complement
/// (kept for bit-compatibility with existing index files), floats as their
/// little-endian IEEE-754 bytes, strings as raw utf-8.
fn key_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::Int(v) => v.to_be_bytes().to_vec(),
        Value::Float(v) => v.to_le_bytes().to_vec(),
        Value::Char(v) => v.to_string().into_bytes(),
        Value::VarChar(v) => v.as_bytes().to_vec(),
    }
}

#[test]
fn test_hash_key_known_digest() {
    // sha256("abc") ends ...f20015ad; the key is those last four bytes.
    assert_eq!(hash_key(&Value::VarChar("abc".to_string())), 0xf20015ad);
}

#[test]
fn test_hash_key_typed_encodings() {
    // Same digest input for a char and the equal one-character varchar.
    assert_eq!(
        hash_key(&Value::Char('x')),
        hash_key(&Value::VarChar("x".to_string()))
    );
    // An int and the varchar of its decimal form hash differently.
    assert_ne!(
        hash_key(&Value::Int(1)),
        hash_key(&Value::VarChar("1".to_string()))
    );
    assert_eq!(hash_key(&Value::Int(5)), hash_key(&Value::Int(5)));
}

#[test]
fn test_add_and_find() {
    let mut index = HashIndex::new();
    assert!(index.find(7).is_empty());
    index.add(7, (0, 47));
    index.add(7, (2, 110));
    index.add(9, (1, 0));
    assert_eq!(index.find(7), &[(0, 47), (2, 110)]);
    assert_eq!(index.find(9), &[(1, 0)]);
}

#[test]
fn test_save_load_roundtrip() {
    let dir = tempfile::tempdir().expect("Should have created temp dir.");
    let path = dir.path().join(index_file_name("t", "name"));

    let mut index = HashIndex::new();
    index.add(1, (0, 47));
    index.add(u32::MAX, (3, 4000));
    index.save(&path).expect("Should have saved index.");

    let back = HashIndex::load(&path).expect("Should have loaded index.");
    assert_eq!(back.find(1), &[(0, 47)]);
    assert_eq!(back.find(u32::MAX), &[(3, 4000)]);
    assert!(back.find(2).is_empty());
}
