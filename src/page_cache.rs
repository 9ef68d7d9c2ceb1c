//! In-memory page cache keyed by table name and block number.
//!
//! The cache is owned by the storage manager and lent to each table file
//! manager call.  Reads populate it on miss; writes go through both the cache
//! and the file in the same call, so a cached block is never newer than disk.

use crate::block::Block;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct PageCache {
    pages: HashMap<String, HashMap<usize, Block>>,
}

impl PageCache {
    pub fn new() -> PageCache {
        PageCache::default()
    }

    pub fn get(&self, table_name: &str, block_num: usize) -> Option<&Block> {
        self.pages.get(table_name)?.get(&block_num)
    }

    pub fn set(&mut self, table_name: &str, block_num: usize, block: Block) {
        self.pages
            .entry(table_name.to_string())
            .or_default()
            .insert(block_num, block);
    }

    /// Drop every cached block of a table.  Used when a table file is deleted
    /// so a later table of the same name cannot see stale pages.
    pub fn evict_table(&mut self, table_name: &str) {
        self.pages.remove(table_name);
    }
}

#[test]
fn test_get_set() {
    let mut cache = PageCache::new();
    assert!(cache.get("t", 0).is_none());

    let mut block = Block::new();
    block.header.page_id = 3;
    cache.set("t", 0, block.clone());
    assert_eq!(cache.get("t", 0).map(|b| b.header.page_id), Some(3));
    assert!(cache.get("t", 1).is_none());
    assert!(cache.get("u", 0).is_none());

    block.header.page_id = 9;
    cache.set("t", 0, block);
    assert_eq!(cache.get("t", 0).map(|b| b.header.page_id), Some(9));
}

#[test]
fn test_evict_table() {
    let mut cache = PageCache::new();
    cache.set("t", 0, Block::new());
    cache.set("u", 0, Block::new());
    cache.evict_table("t");
    assert!(cache.get("t", 0).is_none());
    assert!(cache.get("u", 0).is_some());
}
