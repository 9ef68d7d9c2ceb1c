//! The storage manager: the catalog, table lifecycle, selection and
//! projection, equi-joins, statistics, and hash index maintenance.
//!
//! Every storage directory carries the catalog table `information_schema`
//! with one `(table_name)` row per user table.  The catalog is itself an
//! ordinary table file and is re-read on startup to rebuild the in-memory
//! table map.

use crate::condition::{self, Condition};
use crate::dtype::DataType;
use crate::index::{self, HashIndex};
use crate::page_cache::PageCache;
use crate::record::Record;
use crate::schema::{Attribute, Schema};
use crate::table_file::{self, TableFileManager};
use crate::value::Value;
use itertools::Itertools;
use log::info;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Name of the built-in catalog table.
pub const CATALOG_TABLE: &str = "information_schema";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("table {0} already exists")]
    DuplicateTable(String),
    #[error("table {0} not found")]
    TableNotFound(String),
    #[error("column {0} not found")]
    UnknownColumn(String),
    #[error("schema must declare at least one attribute")]
    EmptySchema,
    #[error("schema declares attribute {0} more than once")]
    DuplicateAttribute(String),
    #[error("joining {tables} tables needs {expected} join conditions, got {got}")]
    JoinArity {
        tables: usize,
        expected: usize,
        got: usize,
    },
    #[error("join column {0:?} must be written as table.attribute")]
    BadJoinColumn(String),
    #[error("join {left} = {right} does not connect to the tables joined so far")]
    BadJoinOrder { left: String, right: String },
    #[error("unsupported index type {0:?}; only \"hash\" is implemented")]
    UnsupportedIndexType(String),
    #[error("index probe {value:?} is not a valid {dtype} value")]
    BadProbeValue { value: String, dtype: DataType },
    #[error(transparent)]
    Table(#[from] table_file::Error),
    #[error("error evaluating condition: {0}")]
    Condition(#[from] condition::Error),
    #[error(transparent)]
    Index(#[from] index::Error),
    #[error("error accessing storage directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-table statistics: record count, block count, maximum record size,
/// blocking factor, and distinct values per attribute.
#[derive(Debug, Serialize)]
pub struct TableStats {
    pub n_r: u32,
    pub b_r: u16,
    pub l_r: u32,
    pub f_r: u32,
    pub v_a_r: HashMap<String, usize>,
}

pub struct StorageManager {
    base_path: PathBuf,
    tables: HashMap<String, TableFileManager>,
    cache: PageCache,
}

impl StorageManager {
    /// Open a storage directory, creating it and the catalog table when
    /// missing, then reopen every table the catalog lists.
    pub fn open(base_path: impl Into<PathBuf>) -> Result<StorageManager, Error> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;

        let mut cache = PageCache::new();
        let catalog_schema = Schema::new(vec![Attribute::new("table_name", DataType::VarChar, 50)]);
        let catalog =
            TableFileManager::open(&base_path, CATALOG_TABLE, Some(catalog_schema), &mut cache)?;

        let mut manager = StorageManager {
            base_path,
            tables: HashMap::from([(CATALOG_TABLE.to_string(), catalog)]),
            cache,
        };
        for name in manager.list_tables()? {
            let table = TableFileManager::open(&manager.base_path, &name, None, &mut manager.cache)?;
            manager.tables.insert(name, table);
        }
        info!(
            "opened storage at {:?} with {} user tables",
            manager.base_path,
            manager.tables.len() - 1
        );
        Ok(manager)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Create a table file and record it in the catalog.
    pub fn create_table(&mut self, table_name: &str, schema: Schema) -> Result<(), Error> {
        if self.tables.contains_key(table_name) {
            return Err(Error::DuplicateTable(table_name.to_string()));
        }
        if schema.is_empty() {
            return Err(Error::EmptySchema);
        }
        let mut seen = HashSet::new();
        for attr in &schema.attributes {
            if !seen.insert(attr.name.as_str()) {
                return Err(Error::DuplicateAttribute(attr.name.clone()));
            }
        }

        let table = TableFileManager::open(&self.base_path, table_name, Some(schema), &mut self.cache)?;
        self.tables.insert(table_name.to_string(), table);
        self.catalog_append(table_name)?;
        info!("created table {}", table_name);
        Ok(())
    }

    /// Names of the user tables, as listed by the catalog.
    pub fn list_tables(&mut self) -> Result<Vec<String>, Error> {
        Ok(self
            .get_table_data(CATALOG_TABLE, None, &[])?
            .into_iter()
            .filter_map(|rec| rec.into_iter().next())
            .filter_map(|v| v.into_var_char().ok())
            .collect())
    }

    pub fn get_table_schema(&self, table_name: &str) -> Result<&Schema, Error> {
        Ok(self.table(table_name)?.schema())
    }

    /// Scan a table, filter by an optional condition, and project.  An empty
    /// `projection` returns every column.  Conditions are ignored for the
    /// catalog table.
    pub fn get_table_data(
        &mut self,
        table_name: &str,
        condition: Option<&Condition>,
        projection: &[String],
    ) -> Result<Vec<Record>, Error> {
        let table = Self::lookup(&self.tables, table_name)?;
        let mut records = table.scan(&mut self.cache)?;

        if let Some(cond) = condition {
            if table_name != CATALOG_TABLE {
                let schema = table.schema();
                let mut kept = Vec::with_capacity(records.len());
                for rec in records {
                    if cond.evaluate(&schema.context_for(&rec))? {
                        kept.push(rec);
                    }
                }
                records = kept;
            }
        }

        if !projection.is_empty() {
            let schema = table.schema();
            let positions = projection
                .iter()
                .map(|col| {
                    schema
                        .position_of(col)
                        .ok_or_else(|| Error::UnknownColumn(col.clone()))
                })
                .collect::<Result<Vec<usize>, Error>>()?;
            records = records
                .into_iter()
                .map(|rec| positions.iter().map(|&i| rec[i].clone()).collect())
                .collect();
        }
        Ok(records)
    }

    /// Inner equi-join over two or more tables.
    ///
    /// `join_attrs[i]` names two dotted columns (`t.a`, `u.b`); there must be
    /// exactly one fewer than there are tables, and each one must connect a
    /// new table to the set joined so far.  Rows are the filtered cross
    /// products where the joined columns are equal; columns are named
    /// `table.attribute` throughout.  Returns the rows and the column names
    /// (the projection, when one is given).
    pub fn get_joined_table(
        &mut self,
        tables: &[String],
        join_attrs: &[(String, String)],
        per_table_conditions: &[Option<Condition>],
        global_condition: Option<&Condition>,
        projection: &[String],
    ) -> Result<(Vec<Record>, Vec<String>), Error> {
        if tables.len() < 2 || join_attrs.len() != tables.len() - 1 {
            return Err(Error::JoinArity {
                tables: tables.len(),
                expected: tables.len().saturating_sub(1),
                got: join_attrs.len(),
            });
        }

        let mut fetched: Vec<Vec<Record>> = vec![];
        let mut dotted_names: Vec<Vec<String>> = vec![];
        for (i, name) in tables.iter().enumerate() {
            let cond = per_table_conditions.get(i).and_then(|c| c.as_ref());
            fetched.push(self.get_table_data(name, cond, &[])?);
            dotted_names.push(
                self.table(name)?
                    .schema()
                    .attribute_names()
                    .into_iter()
                    .map(|attr| format!("{}.{}", name, attr))
                    .collect(),
            );
        }

        let mut processed: HashSet<&str> = HashSet::from([tables[0].as_str()]);
        let mut rows = fetched[0].clone();
        let mut columns = dotted_names[0].clone();

        for (a, b) in join_attrs {
            let (table_a, _) = split_dotted(a)?;
            let (table_b, attr_b) = split_dotted(b)?;

            // Flip the pair so the already-joined side is on the left.
            let (left_name, right_table, right_attr) =
                match (processed.contains(table_a), processed.contains(table_b)) {
                    (true, false) => (a, table_b, attr_b),
                    (false, true) => (b, table_a, split_dotted(a)?.1),
                    _ => {
                        return Err(Error::BadJoinOrder {
                            left: a.clone(),
                            right: b.clone(),
                        })
                    }
                };

            let left_pos = columns
                .iter()
                .position(|c| c == left_name)
                .ok_or_else(|| Error::UnknownColumn(left_name.clone()))?;
            let right_index = tables
                .iter()
                .position(|t| t == right_table)
                .ok_or_else(|| Error::TableNotFound(right_table.to_string()))?;
            let right_pos = self
                .table(right_table)?
                .schema()
                .position_of(right_attr)
                .ok_or_else(|| Error::UnknownColumn(right_attr.to_string()))?;

            rows = rows
                .iter()
                .cartesian_product(fetched[right_index].iter())
                .filter(|(left, right)| left[left_pos] == right[right_pos])
                .map(|(left, right)| left.iter().chain(right.iter()).cloned().collect())
                .collect();
            columns.extend(dotted_names[right_index].iter().cloned());
            processed.insert(right_table);
        }

        if let Some(cond) = global_condition {
            let mut kept = Vec::with_capacity(rows.len());
            for row in rows {
                let context: HashMap<String, Value> = columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                if cond.evaluate(&context)? {
                    kept.push(row);
                }
            }
            rows = kept;
        }

        if projection.is_empty() {
            return Ok((rows, columns));
        }
        let positions = projection
            .iter()
            .map(|col| {
                columns
                    .iter()
                    .position(|c| c == col)
                    .ok_or_else(|| Error::UnknownColumn(col.clone()))
            })
            .collect::<Result<Vec<usize>, Error>>()?;
        let rows = rows
            .into_iter()
            .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok((rows, projection.to_vec()))
    }

    /// Insert tuples into a table and rebuild any indexes it already has.
    /// Returns the number of rows inserted.
    pub fn insert_into_table(
        &mut self,
        table_name: &str,
        values: Vec<Record>,
    ) -> Result<usize, Error> {
        let inserted = values.len();
        let table = Self::lookup_mut(&mut self.tables, table_name)?;
        table.append(&values, &mut self.cache)?;
        self.update_index(table_name)?;
        Ok(inserted)
    }

    /// Drop a table: its index files, its catalog row, its in-memory state,
    /// and finally the table file itself.
    pub fn delete_table(&mut self, table_name: &str) -> Result<(), Error> {
        let columns = self.table(table_name)?.schema().attribute_names();
        for column in columns {
            let path = self.index_path(table_name, &column);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }

        let cond = Condition::new("table_name", "=", format!("'{}'", table_name))?;
        self.delete_table_record(CATALOG_TABLE, Some(&cond))?;

        if let Some(table) = self.tables.remove(table_name) {
            std::fs::remove_file(table.file_path())?;
        }
        self.cache.evict_table(table_name);
        info!("deleted table {}", table_name);
        Ok(())
    }

    /// Delete matching records, then rebuild the table's indexes.
    /// Returns the number of rows deleted.
    pub fn delete_table_record(
        &mut self,
        table_name: &str,
        condition: Option<&Condition>,
    ) -> Result<u32, Error> {
        let table = Self::lookup_mut(&mut self.tables, table_name)?;
        let deleted = table.delete(condition, &mut self.cache)?;
        self.update_index(table_name)?;
        Ok(deleted)
    }

    /// Update matching records, then rebuild the table's indexes so lookups
    /// keep pointing at live offsets.  Returns the number of rows affected.
    pub fn update_table(
        &mut self,
        table_name: &str,
        assignments: &HashMap<String, String>,
        condition: Option<&Condition>,
    ) -> Result<u32, Error> {
        let table = Self::lookup_mut(&mut self.tables, table_name)?;
        let affected = table.update(assignments, condition, &mut self.cache)?;
        self.update_index(table_name)?;
        Ok(affected)
    }

    /// Statistics for every user table.
    pub fn get_stats(&mut self) -> Result<HashMap<String, TableStats>, Error> {
        let names: Vec<String> = self
            .tables
            .keys()
            .filter(|name| name.as_str() != CATALOG_TABLE)
            .cloned()
            .collect();
        let mut stats = HashMap::new();
        for name in names {
            let table = Self::lookup(&self.tables, &name)?;
            let n_r = table.record_count();
            let b_r = table.block_count();
            let l_r = table.max_record_size();
            let f_r = (n_r + b_r as u32 - 1) / b_r as u32;
            let v_a_r = table.unique_attr_count(&mut self.cache)?;
            stats.insert(
                name,
                TableStats {
                    n_r,
                    b_r,
                    l_r,
                    f_r,
                    v_a_r,
                },
            );
        }
        Ok(stats)
    }

    /// Build (or rebuild) a hash index over one column, persisting it next to
    /// the table file.
    pub fn set_index(
        &mut self,
        table_name: &str,
        column: &str,
        index_type: &str,
    ) -> Result<(), Error> {
        if index_type != "hash" {
            return Err(Error::UnsupportedIndexType(index_type.to_string()));
        }
        let table = Self::lookup(&self.tables, table_name)?;
        let position = table
            .schema()
            .position_of(column)
            .ok_or_else(|| Error::UnknownColumn(column.to_string()))?;

        let mut index = HashIndex::new();
        for (rec, (block_num, offset)) in table.scan_with_locations(&mut self.cache)? {
            index.add(
                index::hash_key(&rec[position]),
                (block_num as u64, offset as u64),
            );
        }
        index.save(&self.index_path(table_name, column))?;
        info!("built hash index on {}.{}", table_name, column);
        Ok(())
    }

    /// Point lookup through a hash index.  Returns `None` when the column has
    /// no index file; otherwise the records whose column value equals the
    /// probe, in insertion order, after filtering out hash collisions.
    pub fn get_index(
        &mut self,
        table_name: &str,
        column: &str,
        value: &str,
        dtype: DataType,
    ) -> Result<Option<Vec<Record>>, Error> {
        let path = self.index_path(table_name, column);
        if !path.exists() {
            return Ok(None);
        }
        let table = Self::lookup(&self.tables, table_name)?;
        let position = table
            .schema()
            .position_of(column)
            .ok_or_else(|| Error::UnknownColumn(column.to_string()))?;
        let probe = Value::parse(dtype, value).map_err(|_| Error::BadProbeValue {
            value: value.to_string(),
            dtype,
        })?;

        let index = HashIndex::load(&path)?;
        let mut records = vec![];
        for &(block_num, offset) in index.find(index::hash_key(&probe)) {
            let rec = table.read_record_at(block_num as usize, offset as usize, &mut self.cache)?;
            // Truncated keys collide; keep only exact matches.
            if rec[position] == probe {
                records.push(rec);
            }
        }
        Ok(Some(records))
    }

    /// Rebuild from scratch every index file that exists for this table.
    pub fn update_index(&mut self, table_name: &str) -> Result<(), Error> {
        let columns = self.table(table_name)?.schema().attribute_names();
        for column in columns {
            if self.index_path(table_name, &column).exists() {
                self.set_index(table_name, &column, "hash")?;
            }
        }
        Ok(())
    }

    // ===== helpers =====

    fn table(&self, table_name: &str) -> Result<&TableFileManager, Error> {
        Self::lookup(&self.tables, table_name)
    }

    // Field-scoped lookups so callers can borrow the page cache alongside.
    fn lookup<'a>(
        tables: &'a HashMap<String, TableFileManager>,
        table_name: &str,
    ) -> Result<&'a TableFileManager, Error> {
        tables
            .get(table_name)
            .ok_or_else(|| Error::TableNotFound(table_name.to_string()))
    }

    fn lookup_mut<'a>(
        tables: &'a mut HashMap<String, TableFileManager>,
        table_name: &str,
    ) -> Result<&'a mut TableFileManager, Error> {
        tables
            .get_mut(table_name)
            .ok_or_else(|| Error::TableNotFound(table_name.to_string()))
    }

    fn catalog_append(&mut self, table_name: &str) -> Result<(), Error> {
        let catalog = Self::lookup_mut(&mut self.tables, CATALOG_TABLE)?;
        catalog
            .append(
                &[vec![Value::VarChar(table_name.to_string())]],
                &mut self.cache,
            )
            .map_err(Error::from)
    }

    fn index_path(&self, table_name: &str, column: &str) -> PathBuf {
        self.base_path.join(index::index_file_name(table_name, column))
    }
}

/// Split a `table.attribute` name at its first dot.
fn split_dotted(name: &str) -> Result<(&str, &str), Error> {
    name.split_once('.')
        .filter(|(table, attr)| !table.is_empty() && !attr.is_empty())
        .ok_or_else(|| Error::BadJoinColumn(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_manager() -> (tempfile::TempDir, StorageManager) {
        let dir = tempfile::tempdir().expect("Should have created temp dir.");
        let manager = StorageManager::open(dir.path()).expect("Should have opened storage.");
        (dir, manager)
    }

    fn id_name_schema() -> Schema {
        Schema::new(vec![
            Attribute::new("id", DataType::Int, 4),
            Attribute::new("name", DataType::VarChar, 50),
        ])
    }

    #[test]
    fn test_catalog_file_exists_after_open() {
        let (dir, _manager) = open_manager();
        assert!(dir.path().join("information_schema_table.bin").exists());
    }

    #[test]
    fn test_create_table_rejects_duplicates_and_bad_schemas() {
        let (_dir, mut manager) = open_manager();
        manager.create_table("t", id_name_schema()).unwrap();
        assert!(matches!(
            manager.create_table("t", id_name_schema()),
            Err(Error::DuplicateTable(_))
        ));
        assert!(matches!(
            manager.create_table("u", Schema::new(vec![])),
            Err(Error::EmptySchema)
        ));
        let dup = Schema::new(vec![
            Attribute::new("a", DataType::Int, 4),
            Attribute::new("a", DataType::Int, 4),
        ]);
        assert!(matches!(
            manager.create_table("u", dup),
            Err(Error::DuplicateAttribute(_))
        ));
    }

    #[test]
    fn test_list_tables_tracks_catalog() {
        let (_dir, mut manager) = open_manager();
        assert!(manager.list_tables().unwrap().is_empty());
        manager.create_table("emp", id_name_schema()).unwrap();
        manager.create_table("dept", id_name_schema()).unwrap();
        assert_eq!(
            manager.list_tables().unwrap(),
            vec!["emp".to_string(), "dept".to_string()]
        );
    }

    #[test]
    fn test_projection_and_unknown_column() {
        let (_dir, mut manager) = open_manager();
        manager.create_table("t", id_name_schema()).unwrap();
        manager
            .insert_into_table(
                "t",
                vec![vec![Value::Int(1), Value::VarChar("Alice".to_string())]],
            )
            .unwrap();

        let names = manager
            .get_table_data("t", None, &["name".to_string()])
            .unwrap();
        assert_eq!(names, vec![vec![Value::VarChar("Alice".to_string())]]);

        assert!(matches!(
            manager.get_table_data("t", None, &["salary".to_string()]),
            Err(Error::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_join_requires_connected_order() {
        let (_dir, mut manager) = open_manager();
        manager.create_table("a", id_name_schema()).unwrap();
        manager.create_table("b", id_name_schema()).unwrap();
        manager.create_table("c", id_name_schema()).unwrap();

        // b.id = c.id joins two tables neither of which is processed yet.
        let err = manager.get_joined_table(
            &["a".to_string(), "b".to_string(), "c".to_string()],
            &[
                ("b.id".to_string(), "c.id".to_string()),
                ("a.id".to_string(), "b.id".to_string()),
            ],
            &[None, None, None],
            None,
            &[],
        );
        assert!(matches!(err, Err(Error::BadJoinOrder { .. })));
    }

    #[test]
    fn test_split_dotted() {
        assert_eq!(split_dotted("emp.id").unwrap(), ("emp", "id"));
        assert!(split_dotted("emp").is_err());
        assert!(split_dotted(".id").is_err());
        assert!(split_dotted("emp.").is_err());
    }
}
