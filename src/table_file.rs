//! Manages one table's backing file: the block-0 table header, appends with
//! page rollover, scans, the compacting delete pass, and rewriting updates.
//!
//! Block 0 opens with the table header:
//!
//! ```text
//! "HEAD"      4B  magic
//! header_len  4B  total header bytes including the trailing 0xCC
//! record_cnt  4B  records in the table
//! block_cnt   2B  blocks including block 0
//! schema_len  2B  serialized schema bytes
//! attr_cnt    2B  attribute count
//! schema      schema_len B
//! 0xCC        1B  sentinel
//! ```
//!
//! Records follow the header in block 0 and fill the whole data area of every
//! later block.  Deletes and updates rewrite blocks in place without a log;
//! a crash mid-rewrite can leave the file inconsistent.

use crate::block::{self, Block, DATA_SIZE};
use crate::condition::{self, Condition};
use crate::dtype::DataType;
use crate::expr::{self, ExprValue};
use crate::page_cache::PageCache;
use crate::record::{self, Record, RECORD_SENTINEL};
use crate::schema::{self, Schema};
use crate::value::Value;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

pub const TABLE_MAGIC: &[u8; 4] = b"HEAD";
pub const TABLE_FILE_SUFFIX: &str = "_table.bin";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("schema must be provided when creating a new table")]
    NoSchema,
    #[error("invalid table file: missing HEAD magic")]
    BadMagic,
    #[error("invalid table file: missing header sentinel")]
    BadHeaderSentinel,
    #[error("table header names {expected} attributes but the schema has {got}")]
    AttributeCountMismatch { expected: u16, got: usize },
    #[error("record at block {block} offset {offset} is not sentinel-terminated")]
    UnterminatedRecord { block: usize, offset: usize },
    #[error("column {0} does not exist")]
    UnknownColumn(String),
    #[error("cannot assign a {got} to column {column} ({want})")]
    AssignType {
        column: String,
        got: &'static str,
        want: DataType,
    },
    #[error("error evaluating condition: {0}")]
    Condition(#[from] condition::Error),
    #[error("error evaluating assignment expression: {0}")]
    Assignment(#[from] expr::Error),
    #[error(transparent)]
    Schema(#[from] schema::Error),
    #[error(transparent)]
    Record(#[from] record::Error),
    #[error(transparent)]
    Block(#[from] block::Error),
    #[error("error accessing table file: {0}")]
    Io(#[from] std::io::Error),
}

pub struct TableFileManager {
    table_name: String,
    file_path: PathBuf,
    schema: Schema,
    record_count: u32,
    block_count: u16,
}

impl TableFileManager {
    /// Open an existing table file, validating its header, or create a fresh
    /// one when `schema` is given.  Opening a missing file without a schema
    /// fails with [`Error::NoSchema`].
    pub fn open(
        base_path: &Path,
        table_name: &str,
        schema: Option<Schema>,
        cache: &mut PageCache,
    ) -> Result<TableFileManager, Error> {
        let file_path = base_path.join(format!("{}{}", table_name, TABLE_FILE_SUFFIX));
        let mut manager = TableFileManager {
            table_name: table_name.to_string(),
            file_path,
            schema: Schema::new(vec![]),
            record_count: 0,
            block_count: 1,
        };
        if manager.file_path.exists() {
            manager.read_header(cache)?;
        } else if let Some(schema) = schema {
            manager.schema = schema;
            manager.write_header(cache)?;
        } else {
            return Err(Error::NoSchema);
        }
        Ok(manager)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    pub fn block_count(&self) -> u16 {
        self.block_count
    }

    /// Largest serialized payload a record of this schema can need.
    pub fn max_record_size(&self) -> u32 {
        self.schema.max_record_size()
    }

    /// Append records to the file, rolling over to a fresh block whenever the
    /// current one fills up, then persist the new counts to block 0.
    pub fn append(&mut self, records: &[Record], cache: &mut PageCache) -> Result<(), Error> {
        let mut current = self.block_count as usize - 1;
        let mut block = self.get_block(current, cache)?;

        for rec in records {
            let bytes = record::serialize(&self.schema, rec)?;
            match block.add_record(&bytes) {
                Ok(()) => {}
                Err(block::Error::PageFull { .. }) => {
                    self.set_block(current, block, cache)?;
                    block = Block::new();
                    current += 1;
                    block.header.page_id = current as u32;
                    self.block_count += 1;
                    block.add_record(&bytes)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if block.header.record_count > 0 {
            self.set_block(current, block, cache)?;
        }
        self.record_count += records.len() as u32;
        debug!(
            "appended {} records to {} ({} total)",
            records.len(),
            self.table_name,
            self.record_count
        );
        self.update_header(cache)
    }

    /// All records in block order, skipping the table header in block 0.
    pub fn scan(&self, cache: &mut PageCache) -> Result<Vec<Record>, Error> {
        Ok(self
            .scan_with_locations(cache)?
            .into_iter()
            .map(|(rec, _)| rec)
            .collect())
    }

    /// Like [`Self::scan`], but pairs each record with the block number and
    /// data-area offset where its serialized bytes begin.
    pub fn scan_with_locations(
        &self,
        cache: &mut PageCache,
    ) -> Result<Vec<(Record, (usize, usize))>, Error> {
        let mut out = vec![];
        for n in 0..self.block_count as usize {
            let block = self.get_block(n, cache)?;
            let mut offset = if n == 0 {
                LittleEndian::read_u32(&block.data[4..8]) as usize
            } else {
                0
            };
            let limit = block.header.free_space_offset as usize;
            while offset < limit {
                let start = offset;
                let end = record_end(&block, n, start)?;
                let rec = record::deserialize(&self.schema, &block.data[start..end])?;
                out.push((rec, (n, start)));
                offset = end;
            }
        }
        Ok(out)
    }

    /// Re-read one record from its physical position, as found in an index.
    pub fn read_record_at(
        &self,
        block_num: usize,
        offset: usize,
        cache: &mut PageCache,
    ) -> Result<Record, Error> {
        let block = self.get_block(block_num, cache)?;
        let end = record_end(&block, block_num, offset)?;
        Ok(record::deserialize(&self.schema, &block.data[offset..end])?)
    }

    /// Delete every record matching `condition` (or all records when absent)
    /// in a single compacting sweep: survivors are re-packed into rewrite
    /// blocks seeded with the table header, trailing blocks are blanked, and
    /// the header counts are updated.  Returns the number of rows deleted.
    pub fn delete(
        &mut self,
        condition: Option<&Condition>,
        cache: &mut PageCache,
    ) -> Result<u32, Error> {
        let first = self.get_block(0, cache)?;
        let header_len = LittleEndian::read_u32(&first.data[4..8]) as usize;

        let mut rewrite = Block::new();
        rewrite.add_record(&first.data[..header_len])?;
        let mut rewrite_num = 0_usize;
        let mut deleted = 0_u32;

        for n in 0..self.block_count as usize {
            let block = self.get_block(n, cache)?;
            let mut offset = if n == 0 { header_len } else { 0 };
            let limit = block.header.free_space_offset as usize;
            while offset < limit {
                let end = record_end(&block, n, offset)?;
                let rec = record::deserialize(&self.schema, &block.data[offset..end])?;
                offset = end;

                let context = self.schema.context_for(&rec);
                let matched = match condition {
                    Some(c) => c.evaluate(&context)?,
                    None => true,
                };
                if matched {
                    deleted += 1;
                    continue;
                }

                let bytes = record::serialize(&self.schema, &rec)?;
                if rewrite.capacity() < bytes.len() {
                    let full = std::mem::take(&mut rewrite);
                    self.set_block(rewrite_num, full, cache)?;
                    rewrite_num += 1;
                    rewrite.header.page_id = rewrite_num as u32;
                }
                rewrite.add_record(&bytes)?;
            }
        }

        if rewrite.header.record_count > 0 {
            self.set_block(rewrite_num, rewrite, cache)?;
        }
        // Blank out the blocks the survivors no longer need.
        for n in rewrite_num + 1..self.block_count as usize {
            self.set_block(n, Block::new(), cache)?;
        }

        self.block_count = rewrite_num as u16 + 1;
        self.record_count -= deleted;
        self.update_header(cache)?;
        debug!("deleted {} records from {}", deleted, self.table_name);
        Ok(deleted)
    }

    /// Apply `assignments` (column name to expression text) to every record
    /// matching `condition`, then rewrite the whole file from the header on.
    /// Returns the number of rows affected.
    pub fn update(
        &mut self,
        assignments: &HashMap<String, String>,
        condition: Option<&Condition>,
        cache: &mut PageCache,
    ) -> Result<u32, Error> {
        for column in assignments.keys() {
            if self.schema.position_of(column).is_none() {
                return Err(Error::UnknownColumn(column.clone()));
            }
        }

        let records = self.scan(cache)?;
        let mut affected = 0_u32;
        let mut updated = Vec::with_capacity(records.len());

        for mut rec in records {
            let context = self.schema.context_for(&rec);
            let matched = match condition {
                Some(c) => c.evaluate(&context)?,
                None => true,
            };
            if matched {
                for (column, expression) in assignments {
                    // Validated above.
                    if let Some(i) = self.schema.position_of(column) {
                        let result = expr::evaluate(expression, &context)?;
                        rec[i] = assign_value(result, &self.schema.attributes[i])?;
                    }
                }
                affected += 1;
            }
            updated.push(rec);
        }

        // Replace stale cached pages before the file shrinks underneath them.
        for n in 0..self.block_count as usize {
            cache.set(&self.table_name, n, Block::new());
        }
        self.block_count = 1;
        self.record_count = 0;
        self.write_header(cache)?;
        self.append(&updated, cache)?;
        debug!("updated {} records in {}", affected, self.table_name);
        Ok(affected)
    }

    /// Count of distinct values per attribute across the whole table.
    pub fn unique_attr_count(
        &self,
        cache: &mut PageCache,
    ) -> Result<HashMap<String, usize>, Error> {
        let mut distinct: Vec<HashSet<String>> = vec![HashSet::new(); self.schema.len()];
        for rec in self.scan(cache)? {
            for (i, value) in rec.iter().enumerate() {
                distinct[i].insert(value.to_string());
            }
        }
        Ok(self
            .schema
            .attribute_names()
            .into_iter()
            .zip(distinct.into_iter().map(|set| set.len()))
            .collect())
    }

    // ===== block 0 header maintenance =====

    fn write_header(&mut self, cache: &mut PageCache) -> Result<(), Error> {
        let schema_bytes = self.schema.serialize();
        let mut header = TABLE_MAGIC.to_vec();
        // Patched with the real length below; writing to a Vec cannot fail.
        let _ = header.write_u32::<LittleEndian>(0);
        let _ = header.write_u32::<LittleEndian>(self.record_count);
        let _ = header.write_u16::<LittleEndian>(self.block_count);
        let _ = header.write_u16::<LittleEndian>(schema_bytes.len() as u16);
        let _ = header.write_u16::<LittleEndian>(self.schema.len() as u16);
        header.extend_from_slice(&schema_bytes);
        header.push(RECORD_SENTINEL);
        let header_len = header.len() as u32;
        LittleEndian::write_u32(&mut header[4..8], header_len);

        // Truncate (or create) the file, then lay down block 0.
        File::create(&self.file_path)?;
        let mut block = Block::new();
        block.add_record(&header)?;
        self.set_block(0, block, cache)
    }

    fn read_header(&mut self, cache: &mut PageCache) -> Result<(), Error> {
        let mut block = self.get_block(0, cache)?;
        block.init_cursor();

        if block.read(4) != TABLE_MAGIC {
            return Err(Error::BadMagic);
        }
        let _header_len = LittleEndian::read_u32(block.read(4));
        self.record_count = LittleEndian::read_u32(block.read(4));
        self.block_count = LittleEndian::read_u16(block.read(2));
        let schema_len = LittleEndian::read_u16(block.read(2));
        let attr_count = LittleEndian::read_u16(block.read(2));

        self.schema = Schema::deserialize(block.read(schema_len as usize))?;
        if self.schema.len() != attr_count as usize {
            return Err(Error::AttributeCountMismatch {
                expected: attr_count,
                got: self.schema.len(),
            });
        }
        if block.read(1) != [RECORD_SENTINEL] {
            return Err(Error::BadHeaderSentinel);
        }
        Ok(())
    }

    fn update_header(&self, cache: &mut PageCache) -> Result<(), Error> {
        let mut block = self.get_block(0, cache)?;
        LittleEndian::write_u32(&mut block.data[8..12], self.record_count);
        LittleEndian::write_u16(&mut block.data[12..14], self.block_count);
        self.set_block(0, block, cache)
    }

    // ===== page access through the cache =====

    fn get_block(&self, block_num: usize, cache: &mut PageCache) -> Result<Block, Error> {
        if let Some(block) = cache.get(&self.table_name, block_num) {
            return Ok(block.clone());
        }
        let block = Block::read_block(&self.file_path, block_num)?;
        cache.set(&self.table_name, block_num, block.clone());
        Ok(block)
    }

    fn set_block(&self, block_num: usize, block: Block, cache: &mut PageCache) -> Result<(), Error> {
        block.write_block(&self.file_path, block_num)?;
        cache.set(&self.table_name, block_num, block);
        Ok(())
    }
}

/// One past the sentinel of the record starting at `start`, or an error when
/// the data area ends before a sentinel shows up.
fn record_end(block: &Block, block_num: usize, start: usize) -> Result<usize, Error> {
    let mut end = start;
    while end < DATA_SIZE && block.data[end] != RECORD_SENTINEL {
        end += 1;
    }
    if end >= DATA_SIZE {
        return Err(Error::UnterminatedRecord {
            block: block_num,
            offset: start,
        });
    }
    Ok(end + 1)
}

/// Coerce an evaluated update expression into the column's type.  Numeric
/// results truncate into int columns the way the evaluator's float arithmetic
/// expects.
fn assign_value(result: ExprValue, attr: &crate::schema::Attribute) -> Result<Value, Error> {
    let got = match &result {
        ExprValue::Num(_) => "number",
        ExprValue::Str(_) => "string",
    };
    let mismatch = || Error::AssignType {
        column: attr.name.clone(),
        got,
        want: attr.dtype,
    };
    match (attr.dtype, result) {
        (DataType::Int, ExprValue::Num(n)) => Ok(Value::Int(n as i32)),
        (DataType::Float, ExprValue::Num(n)) => Ok(Value::Float(n as f32)),
        (DataType::Char, ExprValue::Str(s)) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Char(c)),
                _ => Err(mismatch()),
            }
        }
        (DataType::VarChar, ExprValue::Str(s)) => Ok(Value::VarChar(s)),
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;

    fn people_schema() -> Schema {
        Schema::new(vec![
            Attribute::new("id", DataType::Int, 4),
            Attribute::new("name", DataType::VarChar, 50),
            Attribute::new("age", DataType::Int, 4),
        ])
    }

    fn person(id: i32, name: &str, age: i32) -> Record {
        vec![
            Value::Int(id),
            Value::VarChar(name.to_string()),
            Value::Int(age),
        ]
    }

    fn people() -> Vec<Record> {
        vec![
            person(1, "Agus", 20),
            person(2, "Bagas", 21),
            person(3, "Ciko", 21),
            person(4, "Dito", 21),
            person(5, "Eko", 19),
        ]
    }

    fn open_with_people(dir: &Path, cache: &mut PageCache) -> TableFileManager {
        let mut table = TableFileManager::open(dir, "people", Some(people_schema()), cache)
            .expect("Should have created table.");
        table
            .append(&people(), cache)
            .expect("Should have appended records.");
        table
    }

    #[test]
    fn test_open_requires_schema_for_new_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::new();
        let err = TableFileManager::open(dir.path(), "missing", None, &mut cache);
        assert!(matches!(err, Err(Error::NoSchema)));
    }

    #[test]
    fn test_block0_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::new();
        let table = open_with_people(dir.path(), &mut cache);

        let block = Block::read_block(table.file_path(), 0).unwrap();
        assert_eq!(&block.data[..4], TABLE_MAGIC);
        let header_len = LittleEndian::read_u32(&block.data[4..8]) as usize;
        assert_eq!(block.data[header_len - 1], RECORD_SENTINEL);
        // Counts persisted behind the magic and length.
        assert_eq!(LittleEndian::read_u32(&block.data[8..12]), 5);
        assert_eq!(LittleEndian::read_u16(&block.data[12..14]), 1);
        // The first record starts right after the table header.
        assert_eq!(&block.data[header_len..header_len + 2], b"RC");
    }

    #[test]
    fn test_scan_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::new();
        open_with_people(dir.path(), &mut cache);

        // Fresh manager and cache, records come back from disk.
        let mut cache = PageCache::new();
        let table = TableFileManager::open(dir.path(), "people", None, &mut cache)
            .expect("Should have opened existing table.");
        assert_eq!(table.record_count(), 5);
        assert_eq!(table.block_count(), 1);
        assert_eq!(table.schema(), &people_schema());
        assert_eq!(table.scan(&mut cache).unwrap(), people());
    }

    #[test]
    fn test_append_rolls_to_new_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::new();
        let mut table =
            TableFileManager::open(dir.path(), "people", Some(people_schema()), &mut cache)
                .unwrap();

        // Each record is 2 + 4 + (2 + 4) + 4 + 1 = 17 bytes; a thousand of
        // them cannot fit in one 4084-byte data area.
        let many: Vec<Record> = (0..1000).map(|i| person(i, "abcd", i % 7)).collect();
        table.append(&many, &mut cache).unwrap();
        assert!(table.block_count() > 1, "expected a multi-block file");
        assert_eq!(table.record_count(), 1000);
        assert_eq!(table.scan(&mut cache).unwrap(), many);

        let on_disk = std::fs::metadata(table.file_path()).unwrap().len();
        assert_eq!(on_disk % crate::block::BLOCK_SIZE as u64, 0);
    }

    #[test]
    fn test_delete_with_condition() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::new();
        let mut table = open_with_people(dir.path(), &mut cache);

        let cond = Condition::new("age", ">=", "20").unwrap();
        let deleted = table.delete(Some(&cond), &mut cache).unwrap();
        assert_eq!(deleted, 4);
        assert_eq!(table.record_count(), 1);
        assert_eq!(table.scan(&mut cache).unwrap(), vec![person(5, "Eko", 19)]);

        // Deleting again with the same condition is a no-op.
        let deleted = table.delete(Some(&cond), &mut cache).unwrap();
        assert_eq!(deleted, 0);
        assert_eq!(table.scan(&mut cache).unwrap(), vec![person(5, "Eko", 19)]);
    }

    #[test]
    fn test_delete_all_without_condition() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::new();
        let mut table = open_with_people(dir.path(), &mut cache);

        assert_eq!(table.delete(None, &mut cache).unwrap(), 5);
        assert_eq!(table.record_count(), 0);
        assert_eq!(table.block_count(), 1);
        assert!(table.scan(&mut cache).unwrap().is_empty());
    }

    #[test]
    fn test_delete_compacts_multi_block_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::new();
        let mut table =
            TableFileManager::open(dir.path(), "people", Some(people_schema()), &mut cache)
                .unwrap();
        let many: Vec<Record> = (0..1000).map(|i| person(i, "abcd", i % 2)).collect();
        table.append(&many, &mut cache).unwrap();
        let blocks_before = table.block_count();

        let cond = Condition::new("age", "=", "1").unwrap();
        assert_eq!(table.delete(Some(&cond), &mut cache).unwrap(), 500);
        assert_eq!(table.record_count(), 500);
        assert!(table.block_count() < blocks_before);

        let survivors = table.scan(&mut cache).unwrap();
        assert_eq!(survivors.len(), 500);
        assert!(survivors.iter().all(|r| r[2] == Value::Int(0)));
    }

    #[test]
    fn test_update_with_arithmetic() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::new();
        let mut table = open_with_people(dir.path(), &mut cache);

        let mut assignments = HashMap::new();
        assignments.insert("age".to_string(), "age ^ (5 - 3) - 100".to_string());
        let cond = Condition::new("id", "=", "4").unwrap();
        let affected = table
            .update(&assignments, Some(&cond), &mut cache)
            .unwrap();
        assert_eq!(affected, 1);

        let records = table.scan(&mut cache).unwrap();
        assert_eq!(records[3], person(4, "Dito", 341));
        // Untouched rows survive the rewrite unchanged.
        assert_eq!(records[0], person(1, "Agus", 20));
        assert_eq!(table.record_count(), 5);
    }

    #[test]
    fn test_update_without_condition_touches_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::new();
        let mut table = open_with_people(dir.path(), &mut cache);

        let mut assignments = HashMap::new();
        assignments.insert("age".to_string(), "age + 1".to_string());
        assert_eq!(table.update(&assignments, None, &mut cache).unwrap(), 5);
        let records = table.scan(&mut cache).unwrap();
        assert_eq!(records[0][2], Value::Int(21));
        assert_eq!(records[4][2], Value::Int(20));
    }

    #[test]
    fn test_update_unknown_column() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::new();
        let mut table = open_with_people(dir.path(), &mut cache);

        let mut assignments = HashMap::new();
        assignments.insert("salary".to_string(), "1".to_string());
        assert!(matches!(
            table.update(&assignments, None, &mut cache),
            Err(Error::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_update_string_column() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::new();
        let mut table = open_with_people(dir.path(), &mut cache);

        let mut assignments = HashMap::new();
        assignments.insert("name".to_string(), "name + '!'".to_string());
        let cond = Condition::new("id", "=", "1").unwrap();
        table.update(&assignments, Some(&cond), &mut cache).unwrap();
        assert_eq!(
            table.scan(&mut cache).unwrap()[0][1],
            Value::VarChar("Agus!".to_string())
        );
    }

    #[test]
    fn test_unique_attr_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::new();
        let table = open_with_people(dir.path(), &mut cache);

        let counts = table.unique_attr_count(&mut cache).unwrap();
        assert_eq!(counts["id"], 5);
        assert_eq!(counts["name"], 5);
        // ages: 20, 21, 21, 21, 19
        assert_eq!(counts["age"], 3);
    }

    #[test]
    fn test_record_count_matches_scan() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::new();
        let mut table = open_with_people(dir.path(), &mut cache);
        table
            .append(&[person(6, "Fifi", 22)], &mut cache)
            .unwrap();
        assert_eq!(
            table.record_count() as usize,
            table.scan(&mut cache).unwrap().len()
        );
    }

    #[test]
    fn test_scan_with_locations_points_at_markers() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::new();
        let table = open_with_people(dir.path(), &mut cache);

        for (_, (block_num, offset)) in table.scan_with_locations(&mut cache).unwrap() {
            let block = table.get_block(block_num, &mut cache).unwrap();
            assert_eq!(&block.data[offset..offset + 2], b"RC");
        }
    }
}
