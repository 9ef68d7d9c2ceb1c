//! Fixed-size pages and their on-disk layout.
//!
//! Every table file is a sequence of 4096-byte blocks.  A block starts with a
//! 12-byte little-endian header (`page_id u32 | record_count u32 |
//! free_space_offset u32`) followed by 4084 bytes of record data.  Records
//! are packed from data offset 0 upward; the unused tail stays zeroed.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::OpenOptions;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const BLOCK_SIZE: usize = 4096;
pub const BLOCK_HEADER_SIZE: usize = 12;
/// Bytes of record data one block can hold.
pub const DATA_SIZE: usize = BLOCK_SIZE - BLOCK_HEADER_SIZE;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("page is full: record of {needed} bytes exceeds {available} free bytes")]
    PageFull { needed: usize, available: usize },
    #[error("a serialized block must be {BLOCK_SIZE} bytes, got {0}")]
    WrongLength(usize),
    #[error("error accessing block file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockHeader {
    pub page_id: u32,
    pub record_count: u32,
    pub free_space_offset: u32,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub header: BlockHeader,
    /// Always exactly [`DATA_SIZE`] bytes.
    pub data: Vec<u8>,
    cursor: usize,
}

impl Block {
    pub fn new() -> Block {
        Block {
            header: BlockHeader::default(),
            data: vec![0; DATA_SIZE],
            cursor: 0,
        }
    }

    /// Append serialized record bytes at the free-space offset.
    pub fn add_record(&mut self, record_bytes: &[u8]) -> Result<(), Error> {
        let start = self.header.free_space_offset as usize;
        if start + record_bytes.len() > DATA_SIZE {
            return Err(Error::PageFull {
                needed: record_bytes.len(),
                available: self.capacity(),
            });
        }
        self.data[start..start + record_bytes.len()].copy_from_slice(record_bytes);
        self.header.free_space_offset += record_bytes.len() as u32;
        self.header.record_count += 1;
        Ok(())
    }

    /// Remaining free bytes in the data area.
    pub fn capacity(&self) -> usize {
        DATA_SIZE - self.header.free_space_offset as usize
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BLOCK_SIZE);
        // Writing to a Vec cannot fail.
        let _ = out.write_u32::<LittleEndian>(self.header.page_id);
        let _ = out.write_u32::<LittleEndian>(self.header.record_count);
        let _ = out.write_u32::<LittleEndian>(self.header.free_space_offset);
        out.extend_from_slice(&self.data);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Block, Error> {
        if bytes.len() != BLOCK_SIZE {
            return Err(Error::WrongLength(bytes.len()));
        }
        let mut c = Cursor::new(bytes);
        let header = BlockHeader {
            page_id: c.read_u32::<LittleEndian>()?,
            record_count: c.read_u32::<LittleEndian>()?,
            free_space_offset: c.read_u32::<LittleEndian>()?,
        };
        Ok(Block {
            header,
            data: bytes[BLOCK_HEADER_SIZE..].to_vec(),
            cursor: 0,
        })
    }

    /// Read the `block_num`th block (zero-indexed) of a table file.
    pub fn read_block(path: &Path, block_num: usize) -> Result<Block, Error> {
        let mut f = OpenOptions::new().read(true).open(path)?;
        f.seek(SeekFrom::Start((block_num * BLOCK_SIZE) as u64))?;
        let mut buf = vec![0_u8; BLOCK_SIZE];
        f.read_exact(&mut buf)?;
        Block::from_bytes(&buf)
    }

    /// Overwrite the `block_num`th block of a table file in place.
    pub fn write_block(&self, path: &Path, block_num: usize) -> Result<(), Error> {
        let mut f = OpenOptions::new().write(true).open(path)?;
        f.seek(SeekFrom::Start((block_num * BLOCK_SIZE) as u64))?;
        f.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Reset the sequential read cursor to the start of the data area.
    pub fn init_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Move the sequential read cursor to an absolute data offset.
    pub fn seek_cursor(&mut self, pos: usize) {
        self.cursor = pos;
    }

    /// Read `num_bytes` from the data area at the cursor, advancing it.
    /// Reads past the end of the data area are truncated.
    pub fn read(&mut self, num_bytes: usize) -> &[u8] {
        let start = self.cursor.min(DATA_SIZE);
        let end = (start + num_bytes).min(DATA_SIZE);
        self.cursor = end;
        &self.data[start..end]
    }
}

impl Default for Block {
    fn default() -> Block {
        Block::new()
    }
}

#[test]
fn test_add_record_updates_header() {
    let mut block = Block::new();
    block.add_record(b"RC123\xCC").expect("Should have added record.");
    assert_eq!(block.header.record_count, 1);
    assert_eq!(block.header.free_space_offset, 7);
    assert_eq!(block.capacity(), DATA_SIZE - 7);
    assert_eq!(&block.data[..7], b"RC123\xCC");
}

#[test]
fn test_add_record_page_full() {
    let mut block = Block::new();
    let record = vec![1_u8; 1000];
    for _ in 0..4 {
        block.add_record(&record).expect("Should have had room.");
    }
    let err = block.add_record(&record);
    assert!(matches!(
        err,
        Err(Error::PageFull {
            needed: 1000,
            available: 84
        })
    ));
    // The failed append must not touch the header.
    assert_eq!(block.header.record_count, 4);
    assert_eq!(block.header.free_space_offset, 4000);
}

#[test]
fn test_bytes_roundtrip() {
    let mut block = Block::new();
    block.header.page_id = 7;
    block.add_record(b"RCx\xCC").unwrap();
    let bytes = block.to_bytes();
    assert_eq!(bytes.len(), BLOCK_SIZE);
    let back = Block::from_bytes(&bytes).expect("Should have parsed block.");
    assert_eq!(back.header, block.header);
    assert_eq!(back.data, block.data);
}

#[test]
fn test_from_bytes_wrong_length() {
    assert!(matches!(
        Block::from_bytes(&[0_u8; 100]),
        Err(Error::WrongLength(100))
    ));
}

#[test]
fn test_cursor_reads() {
    let mut block = Block::new();
    block.add_record(b"HEADmore").unwrap();
    block.init_cursor();
    assert_eq!(block.read(4), b"HEAD");
    assert_eq!(block.read(4), b"more");
    block.seek_cursor(4);
    assert_eq!(block.read(4), b"more");
    // Clamped at the end of the data area.
    block.seek_cursor(DATA_SIZE - 2);
    assert_eq!(block.read(8).len(), 2);
}

#[test]
fn test_file_roundtrip() {
    let dir = tempfile::tempdir().expect("Should have created temp dir.");
    let path = dir.path().join("t_table.bin");
    std::fs::File::create(&path).unwrap();

    let mut first = Block::new();
    first.add_record(b"RCa\xCC").unwrap();
    let mut second = Block::new();
    second.header.page_id = 1;
    second.add_record(b"RCbb\xCC").unwrap();

    first.write_block(&path, 0).expect("Should have written block 0.");
    second.write_block(&path, 1).expect("Should have written block 1.");

    let back = Block::read_block(&path, 1).expect("Should have read block 1.");
    assert_eq!(back.header, second.header);
    assert_eq!(back.data, second.data);
    let back0 = Block::read_block(&path, 0).expect("Should have read block 0.");
    assert_eq!(back0.header, first.header);
}
