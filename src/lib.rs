//! A small paged relational storage engine.
//!
//! Tables persist as sequences of 4 KiB blocks in per-table `.bin` files,
//! with a catalog table (`information_schema`) listing every user table.
//! The [`storage::StorageManager`] is the public surface: table lifecycle,
//! selection and projection, inner equi-joins, statistics, and hash indexes.
//! A thin textual frontend ([`parser`] plus the `pagedb` binary) translates
//! statements into those calls.

// System layers, leaves first:
// "block" - fixed-size pages and their file I/O.
pub mod block;
// "codec" / "record" - scalar field encodings and the framed record form.
pub mod codec;
pub mod record;
// "dtype" / "value" / "schema" - the type system tables are declared in.
pub mod dtype;
pub mod schema;
pub mod value;
// "expr" / "condition" - the predicate language evaluated over records.
pub mod condition;
pub mod expr;
// "page_cache" - in-memory page cache shared across table managers.
pub mod page_cache;
// "index" - hash index containers and key derivation.
pub mod index;
// "table_file" - one table's backing file.
pub mod table_file;
// "storage" - the catalog and the public operation surface.
pub mod storage;
// "parser" - statement parsing for the textual frontend, using pest.
pub mod parser;

extern crate pest;
#[macro_use]
extern crate pest_derive;

pub use condition::{CompareOp, Condition};
pub use dtype::DataType;
pub use record::Record;
pub use schema::{Attribute, Schema};
pub use storage::{StorageManager, TableStats, CATALOG_TABLE};
pub use value::Value;
